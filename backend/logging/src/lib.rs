//! Structured logging for the extension runtime host.
//!
//! Console + rolling NDJSON file output, payload redaction, and an audit
//! listener that records every dispatched runtime event.

pub mod audit;
pub mod logger;
pub mod redact;

pub use audit::{AuditEntry, AuditListener};
pub use logger::init_logger;
pub use redact::{redact_sensitive_data, redact_value};
