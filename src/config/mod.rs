pub mod load;
pub mod save;
pub mod types;

pub use types::{
    Codec, Config, DetectionMethod, Language, OutputFormat, RawSettings, SETTING_KEYS, Settings,
    SettingsBuilder,
};
