use crate::{
    filters::{truncate, ErrorRef, SanitizeFilter},
    models::{Notice, NotifierInfo},
    Config,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::{env, path::Path, sync::Arc};

const MAX_BACKTRACE_LINES: usize = 100;
const MAX_MESSAGE_LENGTH: usize = 10_000;
const ENV_CONTEXT_KEY: &str = "env";
const SESSION_KEY: &str = "session";
const UNKNOWN: &str = "unknown";
const SENSITIVE_ENV_PATTERNS: &[&str] = &[
    "SECRET",
    "PASSWORD",
    "KEY",
    "TOKEN",
    "CREDENTIAL",
    "AUTH",
    "PRIVATE",
];
const SKIPPED_CRATES: &[&str] = &[env!("CARGO_CRATE_NAME"), "backtrace"];

static HOSTNAME: Lazy<String> = Lazy::new(|| {
    hostname::get()
        .ok()
        .and_then(|hostname| hostname.into_string().ok())
        .unwrap_or_default()
});

/// Turns a raised error and its surroundings into a [`Notice`].
#[derive(Debug, Clone)]
pub(crate) struct NoticeBuilder {
    config: Arc<Config>,
    sanitize_filter: SanitizeFilter,
}

impl NoticeBuilder {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        let sanitize_filter = SanitizeFilter::new(&config.filter_keys);
        NoticeBuilder {
            config,
            sanitize_filter,
        }
    }

    pub(crate) fn build(
        &self,
        error: &ErrorRef<'_>,
        context: Option<&Map<String, Value>>,
        user: Option<&Map<String, Value>>,
        request: Option<&Map<String, Value>>,
        fingerprint: Option<String>,
        tags: Vec<String>,
    ) -> Notice {
        let mut context = self.sanitize_filter.filter(context).unwrap_or_default();
        if self.config.send_environment {
            context.insert(ENV_CONTEXT_KEY.into(), Value::Object(environment_vars()));
        }

        let user = user
            .filter(|user| self.config.send_user_data && !user.is_empty())
            .and_then(|user| self.sanitize_filter.filter(Some(user)));

        let request = request
            .filter(|request| self.config.send_request_data && !request.is_empty())
            .and_then(|request| {
                if self.config.send_session_data || !request.contains_key(SESSION_KEY) {
                    self.sanitize_filter.filter(Some(request))
                } else {
                    let mut request = request.clone();
                    request.remove(SESSION_KEY);
                    self.sanitize_filter.filter(Some(&request))
                }
            });

        Notice {
            error_class: error.class().into(),
            message: truncate(&error.error().to_string(), MAX_MESSAGE_LENGTH),
            backtrace: capture_backtrace(self.config.root_path.as_deref()),
            fingerprint: fingerprint.filter(|fingerprint| !fingerprint.is_empty()),
            tags,
            context,
            user,
            request,
            environment: self.config.environment.clone(),
            occurred_at: Utc::now(),
            notifier: NotifierInfo::CURRENT,
            app_name: self.config.app_name.clone(),
            revision: self.config.revision.clone(),
            hostname: HOSTNAME.clone(),
        }
    }
}

/// Frames of the calling thread as `path:line in function`, innermost first. Frames from the
/// notifier itself and from the unwinder are left out.
fn capture_backtrace(root_path: Option<&str>) -> Vec<String> {
    let own_src = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut frames = Vec::new();

    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            if frames.len() >= MAX_BACKTRACE_LINES {
                return;
            }
            let function = symbol.name().map(|name| format!("{name:#}"));
            let file = symbol.filename();
            if function.is_none() && file.is_none() {
                return;
            }
            if function.as_deref().map_or(false, is_skipped_symbol)
                || file.map_or(false, |file| file.is_absolute() && file.starts_with(&own_src))
            {
                return;
            }

            let path = file.map(|file| file.to_string_lossy());
            frames.push(format!(
                "{}:{} in {}",
                path.as_deref()
                    .map_or(UNKNOWN, |path| clean_path(path, root_path)),
                symbol.lineno().unwrap_or(0),
                function.as_deref().unwrap_or(UNKNOWN),
            ));
        });
        frames.len() < MAX_BACKTRACE_LINES
    });

    frames
}

fn is_skipped_symbol(symbol: &str) -> bool {
    let symbol = symbol.trim_start_matches('<');
    SKIPPED_CRATES.iter().any(|krate| {
        symbol
            .strip_prefix(krate)
            .map_or(false, |rest| rest.starts_with("::"))
    })
}

fn clean_path<'a>(path: &'a str, root_path: Option<&str>) -> &'a str {
    match root_path.filter(|root| !root.is_empty()) {
        Some(root) => path
            .strip_prefix(root)
            .map_or(path, |rest| rest.strip_prefix('/').unwrap_or(rest)),
        None => path,
    }
}

fn environment_vars() -> Map<String, Value> {
    env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
        .filter(|(name, _)| !is_sensitive_env_var(name))
        .map(|(name, value)| (name, Value::String(value)))
        .collect()
}

fn is_sensitive_env_var(name: &str) -> bool {
    let name = name.to_uppercase();
    SENSITIVE_ENV_PATTERNS
        .iter()
        .any(|pattern| name.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FILTERED_VALUE;
    use serde_json::json;
    use std::{error::Error as StdError, fmt};
    use test_case::test_case;

    #[derive(Debug)]
    struct PaymentError(String);

    impl fmt::Display for PaymentError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl StdError for PaymentError {}

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("value is an object")
    }

    fn builder(config: Config) -> NoticeBuilder {
        NoticeBuilder::new(Arc::new(config))
    }

    fn build_with(
        config: Config,
        context: Option<Value>,
        user: Option<Value>,
        request: Option<Value>,
    ) -> Notice {
        let error = PaymentError("card declined".into());
        builder(config).build(
            &ErrorRef::new(&error),
            context.map(object).as_ref(),
            user.map(object).as_ref(),
            request.map(object).as_ref(),
            None,
            Vec::new(),
        )
    }

    #[test]
    fn builds_notice() {
        let config = Config::new("key")
            .with_environment("production")
            .with_app_name("shop")
            .with_revision("abc123");
        let error = PaymentError("card declined".into());
        let notice = builder(config).build(
            &ErrorRef::new(&error),
            None,
            None,
            None,
            Some("payments".into()),
            vec!["billing".into(), "critical".into()],
        );

        assert_eq!(
            "checkend::notice_builder::tests::PaymentError",
            notice.error_class()
        );
        assert_eq!("card declined", notice.message());
        assert_eq!(Some("payments"), notice.fingerprint());
        assert_eq!(2, notice.tags().len());
        assert_eq!("production", notice.environment());
        assert_eq!(Some("shop"), notice.app_name());
        assert_eq!(Some("abc123"), notice.revision());
        assert_eq!(&NotifierInfo::CURRENT, notice.notifier());
        assert_eq!("checkend-rust", notice.notifier().name);
        assert_eq!("rust", notice.notifier().language);
        assert!(notice.context().is_empty());
        assert!(notice.user().is_none());
        assert!(notice.request().is_none());
    }

    #[test]
    fn empty_fingerprint_is_none() {
        let error = PaymentError("x".into());
        let notice = builder(Config::new("key")).build(
            &ErrorRef::new(&error),
            None,
            None,
            None,
            Some(String::new()),
            Vec::new(),
        );
        assert_eq!(None, notice.fingerprint());
    }

    #[test]
    fn long_messages_are_truncated() {
        let error = PaymentError("x".repeat(20_000));
        let notice = builder(Config::new("key")).build(
            &ErrorRef::new(&error),
            None,
            None,
            None,
            None,
            Vec::new(),
        );
        assert_eq!(MAX_MESSAGE_LENGTH, notice.message().chars().count());
        assert!(notice.message().ends_with("..."));
    }

    #[test]
    fn backtrace_leaves_out_own_frames() {
        let notice = build_with(Config::new("key"), None, None, None);
        assert!(notice.backtrace().len() <= MAX_BACKTRACE_LINES);
        for frame in notice.backtrace() {
            assert!(!frame.contains(" in checkend::"), "{}", frame);
            assert!(!frame.contains(" in backtrace::"), "{}", frame);
            assert!(frame.contains(" in "), "{}", frame);
        }
    }

    #[test]
    fn sanitizes_all_sections() {
        let notice = build_with(
            Config::new("key"),
            Some(json!({"order_id": 1, "api_key": "k"})),
            Some(json!({"id": 7, "password": "p"})),
            Some(json!({"url": "/pay", "headers": {"Authorization": "Bearer x"}})),
        );
        assert_eq!(json!(FILTERED_VALUE), notice.context()["api_key"]);
        assert_eq!(json!(1), notice.context()["order_id"]);
        assert_eq!(json!(FILTERED_VALUE), notice.user().unwrap()["password"]);
        assert_eq!(
            json!(FILTERED_VALUE),
            notice.request().unwrap()["headers"]["Authorization"]
        );
    }

    #[test]
    fn respects_send_flags() {
        let config = Config::new("key")
            .with_send_user_data(false)
            .with_send_request_data(false);
        let notice = build_with(
            config,
            None,
            Some(json!({"id": 7})),
            Some(json!({"url": "/pay"})),
        );
        assert!(notice.user().is_none());
        assert!(notice.request().is_none());
    }

    #[test]
    fn empty_user_and_request_are_none() {
        let notice = build_with(Config::new("key"), None, Some(json!({})), Some(json!({})));
        assert!(notice.user().is_none());
        assert!(notice.request().is_none());
    }

    #[test]
    fn session_data_can_be_left_out() {
        let request = json!({"url": "/pay", "session": {"cart": 3}});
        let with_session = build_with(Config::new("key"), None, None, Some(request.clone()));
        assert_eq!(json!({"cart": 3}), with_session.request().unwrap()["session"]);

        let config = Config::new("key").with_send_session_data(false);
        let without_session = build_with(config, None, None, Some(request));
        let request = without_session.request().unwrap();
        assert!(!request.contains_key("session"));
        assert_eq!(json!("/pay"), request["url"]);
    }

    #[test]
    fn environment_vars_in_context() {
        let notice = build_with(
            Config::new("key").with_send_environment(true),
            Some(json!({"order_id": 1})),
            None,
            None,
        );
        let env = notice.context()["env"]
            .as_object()
            .expect("env is an object");
        assert!(env.keys().all(|name| !is_sensitive_env_var(name)));
        assert_eq!(json!(1), notice.context()["order_id"]);

        let notice = build_with(Config::new("key"), None, None, None);
        assert!(!notice.context().contains_key("env"));
    }

    #[test_case("AWS_SECRET_ACCESS_KEY", true ; "secret")]
    #[test_case("db_password", true ; "lower case")]
    #[test_case("STRIPE_API_KEY", true ; "key")]
    #[test_case("GITHUB_TOKEN", true ; "token")]
    #[test_case("GOOGLE_APPLICATION_CREDENTIALS", true ; "credential")]
    #[test_case("OAUTH_CLIENT", true ; "auth")]
    #[test_case("PRIVATE_DIR", true ; "private")]
    #[test_case("PATH", false ; "path")]
    #[test_case("HOME", false ; "home")]
    fn sensitive_env_vars(name: &str, sensitive: bool) {
        assert_eq!(sensitive, is_sensitive_env_var(name));
    }

    #[test_case("/srv/app/src/main.rs", Some("/srv/app"), "src/main.rs" ; "root and slash")]
    #[test_case("/srv/app/src/main.rs", Some("/srv/app/"), "src/main.rs" ; "root with slash")]
    #[test_case("/other/src/main.rs", Some("/srv/app"), "/other/src/main.rs" ; "outside root")]
    #[test_case("/srv/app/src/main.rs", None, "/srv/app/src/main.rs" ; "no root")]
    #[test_case("/srv/app/src/main.rs", Some(""), "/srv/app/src/main.rs" ; "empty root")]
    fn cleans_paths(path: &str, root: Option<&str>, expected: &str) {
        assert_eq!(expected, clean_path(path, root));
    }

    #[test_case("checkend::worker::run", true ; "own crate")]
    #[test_case("<checkend::Checkend<C> as core::ops::drop::Drop>::drop", true ; "own impl")]
    #[test_case("backtrace::backtrace::trace", true ; "unwinder")]
    #[test_case("checkendish::run", false ; "prefix only")]
    #[test_case("shop::payments::charge", false ; "application")]
    fn skipped_symbols(symbol: &str, skipped: bool) {
        assert_eq!(skipped, is_skipped_symbol(symbol));
    }
}
