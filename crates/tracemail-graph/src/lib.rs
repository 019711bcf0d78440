//! Microsoft Graph API email client for Tracemail
//!
//! Correlates application conversations with provider mail threads: an
//! opaque reference code is written onto the first message of a thread as
//! a single-value extended property, and later operations (reply, unread
//! lookup, thread fetch) locate the thread by querying that property back.

pub mod client;
pub mod error;
pub mod query;
pub mod types;

pub use client::GraphMailClient;
pub use error::{GraphError, GraphResult};
pub use query::{ThreadOrder, DEFAULT_UNREAD_TOP, REF_CODE_PROPERTY};
pub use types::*;
