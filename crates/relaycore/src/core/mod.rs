//! Core utilities, configuration, and common functionality

pub mod config;
pub mod cookies;
pub mod error;
pub mod logging;
pub mod process;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use logging::{init_logger, log_runtime_configuration};
pub use process::{CapturedOutput, ProcessControl, ProcessEvent, ProcessGateway, StreamingProcess, SystemGateway};
