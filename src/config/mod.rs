//! Service configuration
//!
//! TOML configuration with kebab-case keys, loaded and validated at
//! startup. Every section has sensible defaults; an empty file is a valid
//! config.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{
    Config, FetchConfig, LimitsConfig, NormalizeConfig, RobotsConfig, ServiceConfig,
    StorageConfig,
};
pub use validation::validate;
