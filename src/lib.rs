//! Test client for the `StringOperations` JSON-RPC service
//!
//! This crate connects to a line-delimited JSON-RPC 2.0 server, sends
//! `StringOperations.CountString` requests, and can open many clients at
//! once to exercise the server's concurrent request handling.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod repl;
pub mod session;
pub mod stress;
pub mod transport;

pub use client::ClientHandle;
pub use config::{Cli, ClientConfig, StressConfig};
pub use dispatcher::{count_string, COUNT_STRING_METHOD};
pub use error::{ClientError, Result};
pub use protocol::{Framer, Message};
pub use session::{LogSink, NotificationSink, Session};
pub use stress::StressReport;
pub use transport::Connection;
