pub mod error;
pub mod loader;
pub mod settings;

pub use error::ConfigError;
pub use loader::load;
pub use settings::Settings;
