pub mod state;

pub use state::{EndpointSettings, Settings, SettingsError, SettingsStore, extract_settings};
