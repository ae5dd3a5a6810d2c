pub mod entities;
pub mod seed;

pub use entities::{Record, RESET_ORDER};
pub use seed::{default_records, SeedRecord};
