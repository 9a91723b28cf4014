pub mod config;
pub mod error;
pub mod toggles;

pub use config::{Config, FeatureFlags};
pub use error::{AegisError, AegisResult};
pub use toggles::LiveToggles;
