// Configuration loading
// Loaded from a TOML file; every field has a default matching a stock inForm export

pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{
    HaloConfig, KeyColumn, MissingKeyPolicy, ReferenceConfig, ReferencePolicy, SampleTablesConfig,
    SanitizeConfig, SplitConfig, SyncConfig, TileLayoutConfig,
};
