//! Configuration file and layered settings.
//!
//! `.compute-engine.toml` is discovered from the working directory upwards
//! (or given explicitly) and turned into [`Settings`], the typed key/value
//! view the pipeline and the purge read, with per-project overrides.

mod core;
mod loader;
mod settings;
pub mod validation;

pub use self::core::{
    ActiveRuleConfig, CeConfig, ProjectConfig, PurgeConfig, WorkersConfig,
    DELETE_CLOSED_ISSUES_DAYS_KEY, KEEP_HISTORY_DAYS_KEY, PURGE_PROFILING_KEY,
};
pub use loader::{
    directory_ancestors, discover_config, load_config, load_config_from,
    parse_and_validate_config, CONFIG_FILE_NAME,
};
pub use settings::Settings;
