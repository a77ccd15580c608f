use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Identifies this notifier to the Checkend API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotifierInfo {
    /// Notifier name, `checkend-rust`.
    pub name: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Always `rust`.
    pub language: &'static str,
    /// Version of the compiler this crate was built with.
    pub language_version: &'static str,
}

impl NotifierInfo {
    /// Metadata of this build.
    pub const CURRENT: NotifierInfo = NotifierInfo {
        name: "checkend-rust",
        version: env!("CARGO_PKG_VERSION"),
        language: "rust",
        language_version: env!("CHECKEND_RUSTC_VERSION"),
    };
}

/// One reported error, sanitized and ready to be delivered.
///
/// Notices are built by the notifier and cannot be changed afterwards. Before-notify hooks and
/// the test capture only get to read them.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub(crate) error_class: String,
    pub(crate) message: String,
    pub(crate) backtrace: Vec<String>,
    pub(crate) fingerprint: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) context: Map<String, Value>,
    pub(crate) user: Option<Map<String, Value>>,
    pub(crate) request: Option<Map<String, Value>>,
    pub(crate) environment: String,
    pub(crate) occurred_at: DateTime<Utc>,
    pub(crate) notifier: NotifierInfo,
    pub(crate) app_name: Option<String>,
    pub(crate) revision: Option<String>,
    pub(crate) hostname: String,
}

impl Notice {
    /// Fully qualified type name of the error.
    pub fn error_class(&self) -> &str {
        &self.error_class
    }

    /// Error message, at most 10 000 characters.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack frames formatted as `path:line in function`, innermost first.
    pub fn backtrace(&self) -> &[String] {
        &self.backtrace
    }

    /// Grouping key chosen by the caller.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Tags chosen by the caller.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Sanitized context.
    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Sanitized user data.
    pub fn user(&self) -> Option<&Map<String, Value>> {
        self.user.as_ref()
    }

    /// Sanitized request data.
    pub fn request(&self) -> Option<&Map<String, Value>> {
        self.request.as_ref()
    }

    /// Environment name.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// When the notice was built.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Notifier metadata.
    pub fn notifier(&self) -> &NotifierInfo {
        &self.notifier
    }

    /// Application name.
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    /// Code revision.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Host the error occurred on. Empty if it could not be determined.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}
