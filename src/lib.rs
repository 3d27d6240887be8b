//! Pull a table out of PostgreSQL into a CSV file, using connection
//! parameters from a YAML credentials file.

pub mod config;
pub mod db;
pub mod error;
pub mod export;

pub use config::{load_credentials, CredentialSet, Credentials, ExportConfig};
pub use db::postgres::PostgresDriver;
pub use db::{Connector, QueryResult};
pub use error::{ExtractError, Result};
pub use export::{save_to_csv, ExportStats, Exporter};
