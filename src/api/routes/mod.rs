pub mod health;
pub mod measurements;
pub mod stats;
