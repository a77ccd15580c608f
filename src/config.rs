use crate::{filters::IgnorePattern, Notice};
use std::{env, fmt, sync::Arc, time::Duration};

/// Default Checkend API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://app.checkend.io";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time budget for draining the queue on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the delivery queue.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Environment used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Field names that are always redacted. Matching is a case-insensitive substring test.
pub const DEFAULT_FILTER_KEYS: &[&str] = &[
    "password",
    "password_confirmation",
    "secret",
    "secret_key",
    "api_key",
    "apikey",
    "access_token",
    "auth_token",
    "authorization",
    "token",
    "credit_card",
    "card_number",
    "cvv",
    "cvc",
    "ssn",
    "social_security",
];

const ENVIRONMENT_VARS: &[&str] = &[
    "CHECKEND_ENVIRONMENT",
    "ENVIRONMENT",
    "ENV",
    "APP_ENV",
    "RUST_ENV",
];

/// Hook run after a notice is built. Returning `false` drops the notice.
pub type BeforeNotify = Arc<dyn Fn(&Notice) -> bool + Send + Sync>;

/// Notifier configuration.
///
/// ```
/// use std::time::Duration;
///
/// let config = checkend::Config::new("your-ingestion-key")
///     .with_environment("production")
///     .with_app_name("billing")
///     .with_timeout(Duration::from_secs(5))
///     .with_filter_keys(["iban"]);
/// assert!(config.is_enabled());
/// ```
#[derive(Clone)]
pub struct Config {
    pub(crate) api_key: String,
    pub(crate) endpoint: String,
    pub(crate) environment: String,
    pub(crate) enabled: Option<bool>,
    pub(crate) async_send: bool,
    pub(crate) max_queue_size: usize,
    pub(crate) timeout: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) filter_keys: Vec<String>,
    pub(crate) ignored_errors: Vec<IgnorePattern>,
    pub(crate) before_notify: Vec<BeforeNotify>,
    pub(crate) debug: bool,
    pub(crate) app_name: Option<String>,
    pub(crate) revision: Option<String>,
    pub(crate) root_path: Option<String>,
    pub(crate) send_request_data: bool,
    pub(crate) send_session_data: bool,
    pub(crate) send_environment: bool,
    pub(crate) send_user_data: bool,
    pub(crate) proxy: Option<String>,
    pub(crate) ssl_verify: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.into(),
            environment: DEFAULT_ENVIRONMENT.into(),
            enabled: None,
            async_send: true,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            filter_keys: DEFAULT_FILTER_KEYS.iter().map(|&key| key.into()).collect(),
            ignored_errors: Vec::new(),
            before_notify: Vec::new(),
            debug: false,
            app_name: None,
            revision: None,
            root_path: None,
            send_request_data: true,
            send_session_data: true,
            send_environment: false,
            send_user_data: true,
            proxy: None,
            ssl_verify: true,
        }
    }
}

impl Config {
    /// Create a configuration with the given ingestion API key and defaults for everything else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Config {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Create a configuration from the process environment.
    ///
    /// | Variable | Setting |
    /// | --- | --- |
    /// | `CHECKEND_API_KEY` | API key |
    /// | `CHECKEND_ENDPOINT` | endpoint |
    /// | `CHECKEND_ENVIRONMENT`, `ENVIRONMENT`, `ENV`, `APP_ENV`, `RUST_ENV` | environment, first one set wins |
    /// | `CHECKEND_DEBUG` | debug mode if `true`, `1` or `yes` |
    /// | `CHECKEND_APP_NAME` | application name |
    /// | `CHECKEND_REVISION`, `GIT_COMMIT` | revision |
    /// | `CHECKEND_ROOT_PATH` | root path stripped from backtraces |
    /// | `HTTPS_PROXY`, `HTTP_PROXY` | proxy |
    /// | `CHECKEND_SSL_VERIFY` | certificate verification is off if `false`, `0` or `no` |
    ///
    /// Everything can still be overridden with the `with_*` methods.
    pub fn from_env() -> Self {
        Config::default().apply_env(|name| env::var(name).ok())
    }

    pub(crate) fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let first = |names: &[&str]| names.iter().find_map(|&name| lookup(name));

        if self.api_key.is_empty() {
            if let Some(api_key) = lookup("CHECKEND_API_KEY") {
                self.api_key = api_key;
            }
        }
        if let Some(endpoint) = lookup("CHECKEND_ENDPOINT") {
            self = self.with_endpoint(endpoint);
        }
        if let Some(environment) = first(ENVIRONMENT_VARS) {
            self.environment = environment;
        }
        if let Some(debug) = lookup("CHECKEND_DEBUG") {
            self.debug |= matches!(debug.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        self.app_name = self.app_name.or_else(|| lookup("CHECKEND_APP_NAME"));
        self.revision = self
            .revision
            .or_else(|| first(&["CHECKEND_REVISION", "GIT_COMMIT"]));
        self.root_path = self.root_path.or_else(|| lookup("CHECKEND_ROOT_PATH"));
        self.proxy = self
            .proxy
            .or_else(|| first(&["HTTPS_PROXY", "HTTP_PROXY"]));
        if let Some(ssl_verify) = lookup("CHECKEND_SSL_VERIFY") {
            if matches!(ssl_verify.to_lowercase().as_str(), "false" | "0" | "no") {
                self.ssl_verify = false;
            }
        }
        self
    }

    /// Set the ingestion API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the API endpoint. A trailing `/` is removed.
    ///
    /// Default: `https://app.checkend.io`
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint = endpoint.trim_end_matches('/').into();
        self
    }

    /// Set the environment name, e.g. `production`.
    ///
    /// Default: `development`
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Turn reporting on or off.
    ///
    /// Default: on in the `production` and `staging` environments, off elsewhere.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Deliver notices from a background queue (`true`) or on the calling thread (`false`).
    ///
    /// Default: `true`
    pub fn with_async_send(mut self, async_send: bool) -> Self {
        self.async_send = async_send;
        self
    }

    /// Set the capacity of the delivery queue. Notices reported while it is full are dropped.
    ///
    /// Default: 1000
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the timeout of one delivery request.
    ///
    /// Default: 15 seconds
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout of one delivery request.
    ///
    /// Default: 5 seconds
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Set how long shutdown may take to deliver what is still queued.
    ///
    /// Default: 5 seconds
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Redact these field names in addition to [`DEFAULT_FILTER_KEYS`].
    pub fn with_filter_keys<I, S>(mut self, filter_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_keys
            .extend(filter_keys.into_iter().map(Into::into));
        self
    }

    /// Never report errors matching these patterns.
    ///
    /// ```
    /// use checkend::{filters::IgnorePattern, Config};
    ///
    /// let config = Config::new("key").with_ignored_errors([
    ///     IgnorePattern::name("NotFound"),
    ///     IgnorePattern::of_type::<std::num::ParseIntError>(),
    /// ]);
    /// ```
    pub fn with_ignored_errors<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<IgnorePattern>,
    {
        self.ignored_errors
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Add a hook run on every notice before it is sent. Hooks run in the order they were
    /// added; the first one returning `false` drops the notice.
    pub fn with_before_notify<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Notice) -> bool + Send + Sync + 'static,
    {
        self.before_notify.push(Arc::new(hook));
        self
    }

    /// Turn on debug diagnostics.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the application name sent with every notice.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Set the code revision sent with every notice.
    ///
    /// ```
    /// let config = checkend::Config::new("...").with_revision(std::env!("CARGO_PKG_VERSION"));
    /// ```
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Set the path stripped from backtrace file names.
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = Some(root_path.into());
        self
    }

    /// Include request data in notices.
    ///
    /// Default: `true`
    pub fn with_send_request_data(mut self, send: bool) -> Self {
        self.send_request_data = send;
        self
    }

    /// Include the `session` entry of request data in notices.
    ///
    /// Default: `true`
    pub fn with_send_session_data(mut self, send: bool) -> Self {
        self.send_session_data = send;
        self
    }

    /// Include process environment variables in the notice context under `env`. Variables
    /// whose names look like credentials are always left out.
    ///
    /// Default: `false`
    pub fn with_send_environment(mut self, send: bool) -> Self {
        self.send_environment = send;
        self
    }

    /// Include user data in notices.
    ///
    /// Default: `true`
    pub fn with_send_user_data(mut self, send: bool) -> Self {
        self.send_user_data = send;
        self
    }

    /// Send requests through this proxy.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Verify TLS certificates.
    ///
    /// Default: `true`
    pub fn with_ssl_verify(mut self, ssl_verify: bool) -> Self {
        self.ssl_verify = ssl_verify;
        self
    }

    /// Ingestion API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// API endpoint without trailing `/`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Environment name.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Whether notices are reported at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
            .unwrap_or_else(|| matches!(self.environment.as_str(), "production" | "staging"))
    }

    /// Whether notices are delivered from a background queue.
    pub fn async_send(&self) -> bool {
        self.async_send
    }

    /// Capacity of the delivery queue.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Shutdown drain budget.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Active filter keys, defaults first.
    pub fn filter_keys(&self) -> &[String] {
        &self.filter_keys
    }

    /// Ignore patterns.
    pub fn ignored_errors(&self) -> &[IgnorePattern] {
        &self.ignored_errors
    }

    /// Debug mode.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Application name.
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    /// Code revision.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Root path stripped from backtraces.
    pub fn root_path(&self) -> Option<&str> {
        self.root_path.as_deref()
    }

    /// Proxy URL.
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Whether TLS certificates are verified.
    pub fn ssl_verify(&self) -> bool {
        self.ssl_verify
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("endpoint", &self.endpoint)
            .field("environment", &self.environment)
            .field("enabled", &self.is_enabled())
            .field("async_send", &self.async_send)
            .field("max_queue_size", &self.max_queue_size)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("filter_keys", &self.filter_keys)
            .field("ignored_errors", &self.ignored_errors)
            .field("before_notify", &self.before_notify.len())
            .field("debug", &self.debug)
            .field("app_name", &self.app_name)
            .field("revision", &self.revision)
            .field("root_path", &self.root_path)
            .field("send_request_data", &self.send_request_data)
            .field("send_session_data", &self.send_session_data)
            .field("send_environment", &self.send_environment)
            .field("send_user_data", &self.send_user_data)
            .field("proxy", &self.proxy)
            .field("ssl_verify", &self.ssl_verify)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn from_vars(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|&(name, value)| (name.into(), value.into()))
            .collect();
        Config::default().apply_env(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = Config::new("key");
        assert_eq!("key", config.api_key());
        assert_eq!(DEFAULT_ENDPOINT, config.endpoint());
        assert_eq!(DEFAULT_ENVIRONMENT, config.environment());
        assert!(!config.is_enabled());
        assert!(config.async_send());
        assert_eq!(1000, config.max_queue_size());
        assert_eq!(Duration::from_secs(15), config.timeout());
        assert_eq!(Duration::from_secs(5), config.connect_timeout());
        assert_eq!(Duration::from_secs(5), config.shutdown_timeout());
        assert_eq!(DEFAULT_FILTER_KEYS.len(), config.filter_keys().len());
        assert!(config.send_request_data);
        assert!(config.send_session_data);
        assert!(!config.send_environment);
        assert!(config.send_user_data);
        assert!(config.ssl_verify());
        assert!(!config.debug());
    }

    #[test_case("production", true ; "production")]
    #[test_case("staging", true ; "staging")]
    #[test_case("development", false ; "development")]
    #[test_case("test", false ; "test")]
    fn enabled_by_environment(environment: &str, enabled: bool) {
        assert_eq!(enabled, Config::new("key").with_environment(environment).is_enabled());
    }

    #[test]
    fn explicit_enabled_wins() {
        let config = Config::new("key")
            .with_environment("production")
            .with_enabled(false);
        assert!(!config.is_enabled());
        assert!(Config::new("key").with_enabled(true).is_enabled());
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let config = Config::new("key").with_endpoint("https://checkend.example.com/");
        assert_eq!("https://checkend.example.com", config.endpoint());
    }

    #[test]
    fn filter_keys_extend_defaults() {
        let config = Config::new("key").with_filter_keys(["iban", "pin"]);
        assert_eq!(DEFAULT_FILTER_KEYS.len() + 2, config.filter_keys().len());
        assert_eq!("password", config.filter_keys()[0]);
        assert_eq!("pin", config.filter_keys()[DEFAULT_FILTER_KEYS.len() + 1]);
    }

    #[test]
    fn env_values() {
        let config = from_vars(&[
            ("CHECKEND_API_KEY", "env-key"),
            ("CHECKEND_ENDPOINT", "http://localhost:3000/"),
            ("CHECKEND_ENVIRONMENT", "production"),
            ("CHECKEND_APP_NAME", "app"),
            ("CHECKEND_REVISION", "abc123"),
            ("GIT_COMMIT", "ignored"),
            ("CHECKEND_ROOT_PATH", "/srv/app"),
            ("HTTP_PROXY", "http://proxy:8080"),
        ]);
        assert_eq!("env-key", config.api_key());
        assert_eq!("http://localhost:3000", config.endpoint());
        assert_eq!("production", config.environment());
        assert!(config.is_enabled());
        assert_eq!(Some("app"), config.app_name());
        assert_eq!(Some("abc123"), config.revision());
        assert_eq!(Some("/srv/app"), config.root_path());
        assert_eq!(Some("http://proxy:8080"), config.proxy());
    }

    #[test]
    fn env_api_key_does_not_override_explicit_key() {
        let config = Config::new("explicit").apply_env(|_| Some("env-key".into()));
        assert_eq!("explicit", config.api_key());
    }

    #[test_case(&[], "development" ; "default")]
    #[test_case(&[("RUST_ENV", "test")], "test" ; "rust env")]
    #[test_case(&[("APP_ENV", "staging"), ("RUST_ENV", "test")], "staging" ; "app env before rust env")]
    #[test_case(&[("ENV", "qa"), ("APP_ENV", "staging")], "qa" ; "env before app env")]
    #[test_case(&[("ENVIRONMENT", "prod"), ("ENV", "qa")], "prod" ; "environment before env")]
    #[test_case(&[("CHECKEND_ENVIRONMENT", "production"), ("ENVIRONMENT", "prod")], "production" ; "checkend first")]
    #[test_case(&[("CHECKEND_ENVIRONMENT", ""), ("ENV", "qa")], "qa" ; "empty is unset")]
    fn env_environment(vars: &[(&str, &str)], expected: &str) {
        assert_eq!(expected, from_vars(vars).environment());
    }

    #[test]
    fn env_revision_falls_back_to_git_commit() {
        assert_eq!(
            Some("deadbeef"),
            from_vars(&[("GIT_COMMIT", "deadbeef")]).revision()
        );
    }

    #[test]
    fn env_proxy_prefers_https() {
        let config = from_vars(&[
            ("HTTPS_PROXY", "http://secure:8443"),
            ("HTTP_PROXY", "http://plain:8080"),
        ]);
        assert_eq!(Some("http://secure:8443"), config.proxy());
    }

    #[test_case("true", true ; "true")]
    #[test_case("1", true ; "one")]
    #[test_case("YES", true ; "yes")]
    #[test_case("false", false ; "false")]
    #[test_case("nope", false ; "other")]
    fn env_debug(value: &str, expected: bool) {
        assert_eq!(expected, from_vars(&[("CHECKEND_DEBUG", value)]).debug());
    }

    #[test_case("false", false ; "false")]
    #[test_case("0", false ; "zero")]
    #[test_case("No", false ; "no")]
    #[test_case("true", true ; "true")]
    fn env_ssl_verify(value: &str, expected: bool) {
        assert_eq!(
            expected,
            from_vars(&[("CHECKEND_SSL_VERIFY", value)]).ssl_verify()
        );
    }

    #[test]
    fn debug_output_hides_api_key() {
        let output = format!("{:?}", Config::new("super-secret-key"));
        assert!(!output.contains("super-secret-key"));
        assert!(output.contains("***"));
    }
}
