pub mod correlation_id;
pub mod logging;

pub use correlation_id::CorrelationIdLayer;
pub use logging::LoggingLayer;
