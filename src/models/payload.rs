use crate::models::{Notice, NotifierInfo};
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value};

const ENVIRONMENT_KEY: &str = "environment";

/// Request body of `POST /ingest/v1/errors`.
#[derive(Debug, Serialize)]
pub struct Payload<'a> {
    /// The error itself.
    pub error: ErrorPayload<'a>,
    /// Context including the environment name.
    pub context: Map<String, Value>,
    /// Request data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<&'a Map<String, Value>>,
    /// User data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<&'a Map<String, Value>>,
    /// Notifier metadata.
    pub notifier: &'a NotifierInfo,
    /// Host metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerInfo<'a>>,
}

/// Error part of the [`Payload`].
#[derive(Debug, Serialize)]
pub struct ErrorPayload<'a> {
    /// Error class.
    pub class: &'a str,
    /// Error message.
    pub message: &'a str,
    /// Formatted stack frames.
    pub backtrace: &'a [String],
    /// Grouping key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<&'a str>,
    /// Tags.
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub tags: &'a [String],
    /// RFC 3339 UTC timestamp with second precision.
    pub occurred_at: String,
}

/// Host part of the [`Payload`].
#[derive(Debug, Serialize)]
pub struct ServerInfo<'a> {
    /// Application name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<&'a str>,
    /// Code revision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<&'a str>,
    /// Host name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<&'a str>,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

impl Notice {
    /// Wire representation of this notice.
    pub fn payload(&self) -> Payload<'_> {
        let mut context = Map::with_capacity(self.context.len() + 1);
        context.insert(ENVIRONMENT_KEY.into(), self.environment.clone().into());
        for (key, value) in &self.context {
            context.insert(key.clone(), value.clone());
        }

        let server = ServerInfo {
            app_name: non_empty(self.app_name.as_deref()),
            revision: non_empty(self.revision.as_deref()),
            hostname: non_empty(Some(self.hostname.as_str())),
        };
        let has_server_info =
            server.app_name.is_some() || server.revision.is_some() || server.hostname.is_some();

        Payload {
            error: ErrorPayload {
                class: &self.error_class,
                message: &self.message,
                backtrace: &self.backtrace,
                fingerprint: non_empty(self.fingerprint.as_deref()),
                tags: &self.tags,
                occurred_at: self
                    .occurred_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            context,
            request: self.request.as_ref().filter(|request| !request.is_empty()),
            user: self.user.as_ref().filter(|user| !user.is_empty()),
            notifier: &self.notifier,
            server: has_server_info.then_some(server),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn notice() -> Notice {
        Notice {
            error_class: "app::PaymentError".into(),
            message: "card declined".into(),
            backtrace: vec!["src/payments.rs:42 in app::payments::charge".into()],
            fingerprint: None,
            tags: Vec::new(),
            context: Map::new(),
            user: None,
            request: None,
            environment: "production".into(),
            occurred_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            notifier: NotifierInfo {
                name: "checkend-rust",
                version: "0.1.0",
                language: "rust",
                language_version: "1.80.0",
            },
            app_name: None,
            revision: None,
            hostname: String::new(),
        }
    }

    #[test]
    fn serialization_format() {
        let serialized = serde_json::to_value(notice().payload()).unwrap();
        let expected = json!({
            "error": {
                "class": "app::PaymentError",
                "message": "card declined",
                "backtrace": ["src/payments.rs:42 in app::payments::charge"],
                "occurred_at": "2024-01-15T10:30:00Z",
            },
            "context": {"environment": "production"},
            "notifier": {
                "name": "checkend-rust",
                "version": "0.1.0",
                "language": "rust",
                "language_version": "1.80.0",
            },
        });
        assert_eq!(expected, serialized);
    }

    #[test]
    fn serialization_format_all_fields() {
        let mut notice = notice();
        notice.fingerprint = Some("payments-declined".into());
        notice.tags = vec!["payments".into(), "critical".into()];
        notice.context = json!({"order_id": 7}).as_object().cloned().unwrap();
        notice.user = json!({"id": 1}).as_object().cloned();
        notice.request = json!({"url": "/checkout"}).as_object().cloned();
        notice.app_name = Some("shop".into());
        notice.hostname = "web-1".into();

        let serialized = serde_json::to_value(notice.payload()).unwrap();
        assert_eq!(json!("payments-declined"), serialized["error"]["fingerprint"]);
        assert_eq!(json!(["payments", "critical"]), serialized["error"]["tags"]);
        assert_eq!(
            json!({"environment": "production", "order_id": 7}),
            serialized["context"]
        );
        assert_eq!(json!({"id": 1}), serialized["user"]);
        assert_eq!(json!({"url": "/checkout"}), serialized["request"]);
        assert_eq!(json!({"app_name": "shop", "hostname": "web-1"}), serialized["server"]);
    }

    #[test]
    fn caller_context_overrides_environment() {
        let mut notice = notice();
        notice.context = json!({"environment": "canary"}).as_object().cloned().unwrap();
        assert_eq!(json!("canary"), notice.payload().context["environment"]);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let mut notice = notice();
        notice.user = Some(Map::new());
        notice.request = Some(Map::new());
        notice.fingerprint = Some(String::new());
        notice.app_name = Some(String::new());
        let serialized = serde_json::to_value(notice.payload()).unwrap();
        let object = serialized.as_object().unwrap();
        assert!(!object.contains_key("user"));
        assert!(!object.contains_key("request"));
        assert!(!object.contains_key("server"));
        assert!(!serialized["error"].as_object().unwrap().contains_key("fingerprint"));
    }
}
