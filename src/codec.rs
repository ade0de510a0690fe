//! Measurement encodings
//!
//! - JSON: the storage payload, the HTTP representation and the sensor stream
//! - Protobuf: one measurement per UDP datagram
//!
//! Every decode path validates that the measurement names a check, since the
//! check id is the partition key for storage and fan-out.

use prost::Message;
use serde_json::Value;
use thiserror::Error;

use crate::{Check, Measurement};

/// Errors produced while turning an input unit into a [`Measurement`]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed datagram: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

/// Wire form of [`Check`]
#[derive(Clone, PartialEq, Message)]
pub struct WireCheck {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub url: String,
}

/// Wire form of [`Measurement`]
#[derive(Clone, PartialEq, Message)]
pub struct WireMeasurement {
    #[prost(message, optional, tag = "1")]
    pub check: Option<WireCheck>,
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(string, tag = "3")]
    pub location: String,
    #[prost(int64, tag = "4")]
    pub t: i64,
    #[prost(int32, tag = "5")]
    pub exit_status: i32,
    #[prost(uint32, optional, tag = "6")]
    pub http_status: Option<u32>,
    #[prost(string, optional, tag = "7")]
    pub local_ip: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub primary_ip: Option<String>,
    #[prost(double, optional, tag = "9")]
    pub namelookup_time: Option<f64>,
    #[prost(double, optional, tag = "10")]
    pub connect_time: Option<f64>,
    #[prost(double, optional, tag = "11")]
    pub starttransfer_time: Option<f64>,
    #[prost(double, optional, tag = "12")]
    pub total_time: Option<f64>,
    #[prost(double, optional, tag = "13")]
    pub size_download: Option<f64>,
}

impl From<&Measurement> for WireMeasurement {
    fn from(m: &Measurement) -> Self {
        Self {
            check: Some(WireCheck {
                id: m.check.id.clone(),
                url: m.check.url.clone(),
            }),
            id: m.id.clone(),
            location: m.location.clone(),
            t: m.t,
            exit_status: m.exit_status,
            http_status: m.http_status.map(u32::from),
            local_ip: m.local_ip.clone(),
            primary_ip: m.primary_ip.clone(),
            namelookup_time: m.namelookup_time,
            connect_time: m.connect_time,
            starttransfer_time: m.starttransfer_time,
            total_time: m.total_time,
            size_download: m.size_download,
        }
    }
}

impl TryFrom<WireMeasurement> for Measurement {
    type Error = DecodeError;

    fn try_from(wire: WireMeasurement) -> Result<Self, Self::Error> {
        let check = wire.check.ok_or(DecodeError::MissingField("check"))?;

        let http_status = wire
            .http_status
            .map(|status| {
                u16::try_from(status).map_err(|_| DecodeError::OutOfRange {
                    field: "http_status",
                    value: i64::from(status),
                })
            })
            .transpose()?;

        validate(Measurement {
            check: Check {
                id: check.id,
                url: check.url,
            },
            id: wire.id,
            location: wire.location,
            t: wire.t,
            exit_status: wire.exit_status,
            http_status,
            local_ip: wire.local_ip,
            primary_ip: wire.primary_ip,
            namelookup_time: wire.namelookup_time,
            connect_time: wire.connect_time,
            starttransfer_time: wire.starttransfer_time,
            total_time: wire.total_time,
            size_download: wire.size_download,
        })
    }
}

fn validate(measurement: Measurement) -> Result<Measurement, DecodeError> {
    if measurement.check.id.is_empty() {
        return Err(DecodeError::MissingField("check.id"));
    }
    Ok(measurement)
}

/// Encode a measurement as a single datagram payload
pub fn encode_datagram(measurement: &Measurement) -> Vec<u8> {
    WireMeasurement::from(measurement).encode_to_vec()
}

/// Decode one datagram payload
pub fn decode_datagram(bytes: &[u8]) -> Result<Measurement, DecodeError> {
    WireMeasurement::decode(bytes)?.try_into()
}

/// Serialize a measurement to its storage/HTTP representation
pub fn to_json(measurement: &Measurement) -> Result<String, serde_json::Error> {
    serde_json::to_string(measurement)
}

/// Parse a stored or received JSON payload
pub fn from_json(payload: &str) -> Result<Measurement, DecodeError> {
    validate(serde_json::from_str(payload)?)
}

/// Convert an already parsed JSON value
pub fn from_value(value: Value) -> Result<Measurement, DecodeError> {
    validate(serde_json::from_value(value)?)
}

/// Incremental decoder for a body made of concatenated JSON values
///
/// Bytes are buffered until a value is complete. A syntax error poisons the
/// stream: it is yielded once and the buffer is discarded, since there is no
/// reliable way to resynchronize on the next value.
#[derive(Debug, Default)]
pub struct JsonStreamDecoder {
    buf: Vec<u8>,
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every value it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Value, DecodeError>> {
        self.buf.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        let mut consumed = 0;
        let mut poisoned = false;

        {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        consumed = stream.byte_offset();
                        decoded.push(Ok(value));
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        decoded.push(Err(DecodeError::Json(e)));
                        poisoned = true;
                        break;
                    }
                    None => {
                        consumed = stream.byte_offset();
                        break;
                    }
                }
            }
        }

        if poisoned {
            self.buf.clear();
        } else {
            self.buf.drain(..consumed);
        }

        decoded
    }

    /// Bytes buffered for an incomplete value
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
