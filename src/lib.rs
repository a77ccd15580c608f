//! An error monitoring client for [Checkend].
//!
//! [Checkend]: https://checkend.io
//!
//! # Usage
//!
//! Create one [`Checkend`] notifier per process and report errors through it:
//!
//! ```rust,no_run
//! use checkend::{Checkend, Config, NotifyOptions};
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let checkend = Checkend::new(
//!         Config::from_env()
//!             .with_api_key("your-ingestion-key")
//!             .with_environment("production"),
//!     )?;
//!
//!     if let Err(err) = std::fs::read_to_string("config.toml") {
//!         let context = json!({"path": "config.toml"});
//!         checkend.notify(
//!             &err,
//!             NotifyOptions::new()
//!                 .with_context(context.as_object().cloned().unwrap_or_default())
//!                 .with_tags(["startup"]),
//!         );
//!     }
//!
//!     // Deliver what is still queued before the process exits.
//!     checkend.flush();
//!     Ok(())
//! }
//! ```
//!
//! # What gets sent
//!
//! Every reported error becomes a [`Notice`] with:
//!
//! - the error class, which is the fully qualified Rust type name of the error (`Box<T>` and
//!   references resolve to `T`, type-erased errors are reported as `Error` unless they are one
//!   of the common standard library errors),
//! - the `Display` message, truncated to 10 000 characters,
//! - a backtrace of up to 100 frames formatted as `path:line in function`, without the frames
//!   of this crate,
//! - context, user and request data, with every field whose name contains one of the
//!   [filter keys](Config::with_filter_keys) replaced by `[FILTERED]`,
//! - the environment, application name, revision and host name.
//!
//! Errors can be suppressed up front with [ignore patterns](Config::with_ignored_errors) and
//! notices can be inspected or dropped with [before-notify hooks](Config::with_before_notify).
//!
//! # Delivery
//!
//! By default notices are queued and delivered by a background thread. A failed delivery is
//! retried twice with exponential backoff starting at 100ms. When the queue is full new notices
//! are dropped. [`Checkend::stop`], which also runs on drop, delivers what is still queued
//! within the shutdown timeout.
//!
//! Delivery failures are never returned to the application. They are logged through
//! [`tracing`] with the target `checkend`; debug lines only appear with
//! [`Config::with_debug`].
//!
//! # Testing
//!
//! Turn on [`Testing`] capture to assert on notices without sending them:
//!
//! ```rust
//! # use checkend::{Checkend, Config, NotifyOptions};
//! # fn main() -> Result<(), checkend::Error> {
//! let checkend = Checkend::new(Config::new("key").with_enabled(true))?;
//! checkend.testing().setup();
//! checkend.notify(&std::fmt::Error, NotifyOptions::new().with_fingerprint("fmt"));
//! assert_eq!(Some("fmt"), checkend.testing().last_notice().unwrap().fingerprint());
//! # Ok(())
//! # }
//! ```
//!
//! # HTTP client
//!
//! Notices are sent with [`reqwest`] by default. Pick the TLS backend with one of the
//! `reqwest-client`, `reqwest-client-vendored-tls` or `reqwest-client-rustls` features, or
//! disable default features and pass your own [`HttpClient`] to [`Checkend::with_client`].
#![doc(html_root_url = "https://docs.rs/checkend/0.1.0")]
#![deny(missing_docs, unreachable_pub, missing_debug_implementations)]

mod checkend;
mod client;
mod config;
mod diagnostics;
mod error;
pub mod filters;
mod http_client;
mod models;
mod notice_builder;
mod testing;
mod worker;

pub use checkend::{Checkend, NotifyOptions};
pub use client::Client;
pub use config::{
    BeforeNotify, Config, DEFAULT_CONNECT_TIMEOUT, DEFAULT_ENDPOINT, DEFAULT_ENVIRONMENT,
    DEFAULT_FILTER_KEYS, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TIMEOUT,
};
pub use error::Error;
pub use http_client::{HttpClient, HttpError};
pub use models::{ApiResponse, ErrorPayload, Notice, NotifierInfo, Payload, ServerInfo};
pub use testing::Testing;
pub use worker::Worker;

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const USER_AGENT: &str = concat!("checkend-rust/", env!("CARGO_PKG_VERSION"));
