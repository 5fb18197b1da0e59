//! TOML settings for the binary.

mod defaults;
mod io;
mod types;

pub use io::{config_path, load_from_path, load_or_default, save, save_to_path};
pub use types::{
    AppSettings, BackendSettings, ConfigError, LiveDataSettings, PanelSettings, SessionSection,
    TrainingSettings,
};
