pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::WorkError;
pub use types::*;
