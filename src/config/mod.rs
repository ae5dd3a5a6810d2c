pub mod database;
pub mod environment;

pub use database::DatabaseSettings;
pub use environment::Environment;
