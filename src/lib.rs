//! Extract, transform and load public utility data from FERC Form 1,
//! EIA-923 and EIA-860 into staging databases and one integrated database.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod schema;
pub mod session;
pub mod tables;
pub mod transform;
pub mod years;

pub use error::{ConfigError, EtlError, Result};
