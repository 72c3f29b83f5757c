pub mod config;
pub mod error;
pub mod schema;
pub mod store;
pub mod time;
pub mod writer;

pub use config::{default_config_toml, load_config, parse_config};
pub use error::{Result, StoreError};
pub use store::{ARCHIVE_FILE, RunArchive, RunRecord, StoredRun, default_data_dir};
pub use writer::{check_label, export_run};
