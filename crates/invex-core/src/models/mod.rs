//! Data models and configuration.

pub mod config;
pub mod invoice;

pub use config::InvexConfig;
pub use invoice::{BatchSummary, InvoiceField, InvoiceRecord, SOURCE_FILE_KEY};
