//! The Capture Handler: the transactional boundary between a decoded
//! capture and durable storage.
//!
//! `epcis-capture` owns nothing about wire formats (`epcis-codec` decodes
//! bytes into a `epcis_core::Capture` before this crate ever sees it) or
//! transport (`epcis-api` calls `CaptureHandler::store` and maps the result
//! onto HTTP/SOAP status codes).

pub mod error;
pub mod handler;

pub use epcis_core::cancel::CancellationToken;
pub use error::{CaptureError, CaptureResult};
pub use handler::CaptureHandler;
