//! Configuration module

mod settings;

pub use settings::{
    DeviceSelection, EnhancerConfig, GenerationConfig, LogFormat, LoggingConfig, ServerConfig,
    Settings, Transport, CONFIG_PATH_VAR, ENV_PREFIX,
};
