use crate::{
    diagnostics::Logger,
    http_client::HttpClient,
    models::{ApiResponse, Notice},
    Config, Error,
};
use bytes::Bytes;
use http::{header, Request, Response};

const INGEST_PATH: &str = "/ingest/v1/errors";
const INGESTION_KEY_HEADER: &str = "checkend-ingestion-key";
const CONTENT_TYPE_JSON: &str = "application/json";

const STATUS_CREATED: u16 = 201;
const STATUS_UNAUTHORIZED: u16 = 401;
const STATUS_UNPROCESSABLE_ENTITY: u16 = 422;
const STATUS_TOO_MANY_REQUESTS: u16 = 429;
const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

/// Delivers one notice per call to the Checkend ingestion API.
///
/// There are no retries here. The background worker retries failed deliveries; direct calls
/// get one attempt.
#[derive(Debug)]
pub struct Client<C> {
    api_key: String,
    endpoint: String,
    http_client: C,
    logger: Logger,
}

impl<C: HttpClient> Client<C> {
    /// Create a client sending to the endpoint configured in `config`.
    pub fn new(config: &Config, http_client: C) -> Self {
        Client {
            api_key: config.api_key.clone(),
            endpoint: append_path(&config.endpoint, INGEST_PATH),
            http_client,
            logger: Logger::new(config.debug),
        }
    }

    /// Send the notice once. Failures are logged and collapsed to `None`.
    pub async fn send(&self, notice: &Notice) -> Option<ApiResponse> {
        match self.try_send(notice).await {
            Ok(response) => {
                self.logger.debug(format_args!(
                    "Notice sent successfully: id={} problem_id={}",
                    response.id, response.problem_id
                ));
                Some(response)
            }
            Err(err) => {
                self.logger.log(err.level(), &err);
                None
            }
        }
    }

    /// Send the notice once and return the cause of a failure.
    pub async fn try_send(&self, notice: &Notice) -> Result<ApiResponse, Error> {
        if self.api_key.is_empty() {
            return Err(Error::MissingApiKey);
        }

        let body = serde_json::to_vec(&notice.payload()).map_err(Error::UploadSerializeRequest)?;
        let request = Request::post(self.endpoint.as_str())
            .header(header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .header(INGESTION_KEY_HEADER, self.api_key.as_str())
            .header(header::USER_AGENT, crate::USER_AGENT)
            .body(body)
            .map_err(Error::UploadBuildRequest)?;

        let response = self
            .http_client
            .send(request)
            .await
            .map_err(Error::UploadConnection)?;
        handle_response(response)
    }

    /// Full URL notices are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn append_path(endpoint: &str, path: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), path)
}

fn handle_response(response: Response<Bytes>) -> Result<ApiResponse, Error> {
    match response.status().as_u16() {
        STATUS_CREATED => {
            serde_json::from_slice(response.body()).map_err(Error::UploadDeserializeResponse)
        }
        STATUS_UNAUTHORIZED => Err(Error::Unauthorized),
        STATUS_UNPROCESSABLE_ENTITY => Err(Error::Validation(
            String::from_utf8_lossy(response.body()).into_owned(),
        )),
        STATUS_TOO_MANY_REQUESTS => Err(Error::RateLimited),
        status if status >= STATUS_INTERNAL_SERVER_ERROR => Err(Error::Server(status)),
        status => Err(Error::Http(status)),
    }
}
