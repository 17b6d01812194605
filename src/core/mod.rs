pub mod config;
pub mod errors;
pub mod paths;

pub use config::EngineConfig;
pub use errors::EngineError;
pub use paths::AppPaths;
