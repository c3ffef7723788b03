//! Middleware module

pub mod correlation;

pub use correlation::{CorrelationId, CorrelationIdLayer, CORRELATION_ID_HEADER};
