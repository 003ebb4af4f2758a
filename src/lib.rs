//! Postfix mail.log parser
//!
//! Reconstructs one delivery record per queue id from scattered mail.log
//! lines, stores them in a document store and answers filtered, paginated
//! queries over them (CLI and optional HTTP API).

pub mod core;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;
