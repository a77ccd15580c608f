use crate::diagnostics::Level;
use std::error::Error as StdError;

/// Errors that occurred while setting up the notifier or delivering a notice.
///
/// Delivery failures never reach the instrumented application through `notify`; they are logged
/// and the notice is dropped. [`Client::try_send`](crate::Client::try_send) exposes them for
/// callers that want the cause.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No API key is configured, so there is nothing to authenticate the upload with.
    #[error("Cannot send notice: api_key not configured")]
    MissingApiKey,

    /// The notice failed to serialize to JSON.
    ///
    /// Note: This is an error in this crate. If you spot this, please open an issue.
    #[error("Failed to marshal payload: {0}")]
    UploadSerializeRequest(serde_json::Error),

    /// The upload request could not be assembled, usually because the API key or endpoint
    /// contain characters that are not allowed in an HTTP request.
    #[error("Failed to create request: {0}")]
    UploadBuildRequest(http::Error),

    /// Could not complete the HTTP request to Checkend.
    #[error("Failed to send request: {0}")]
    UploadConnection(Box<dyn StdError + Send + Sync + 'static>),

    /// Checkend accepted the notice but the response body was not understood.
    ///
    /// The notice may have been stored. But since we could not look into the response, we can't
    /// be sure.
    #[error("Failed to parse response: {0}")]
    UploadDeserializeResponse(serde_json::Error),

    /// Checkend rejected the API key (HTTP 401).
    #[error("Authentication failed: invalid API key")]
    Unauthorized,

    /// Checkend rejected the payload as malformed (HTTP 422). Contains the response body.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Checkend is rate limiting this client (HTTP 429).
    #[error("Rate limited by Checkend API")]
    RateLimited,

    /// Checkend failed to process the notice (HTTP 5xx).
    #[error("Server error: {0}")]
    Server(u16),

    /// Any other unexpected HTTP status.
    #[error("HTTP error: {0}")]
    Http(u16),

    /// The HTTP client could not be built from the configuration.
    #[error("building HTTP client failed with {0}")]
    HttpClientBuild(Box<dyn StdError + Send + Sync + 'static>),

    /// The runtime driving deliveries could not be started.
    #[error("starting delivery runtime failed with {0}")]
    Runtime(std::io::Error),
}

impl Error {
    pub(crate) fn level(&self) -> Level {
        match self {
            Error::RateLimited => Level::Warning,
            _ => Level::Error,
        }
    }
}
