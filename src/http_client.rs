use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use std::{error::Error as StdError, fmt::Debug};

/// Error returned by an [`HttpClient`].
pub type HttpError = Box<dyn StdError + Send + Sync + 'static>;

/// Transport used to deliver notices.
///
/// Implemented for [`reqwest::Client`] when the `reqwest-client` feature (on by default) or one
/// of the other `reqwest-client-*` features is enabled. Implement it yourself to route notices
/// through a different HTTP stack.
///
/// Non-success status codes must be returned as a normal response, not as an error. Errors are
/// reserved for requests that did not produce a response at all.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    /// Send the request and return the response with its full body.
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError> {
        (**self).send(request).await
    }
}

#[cfg(feature = "reqwest")]
mod reqwest_client {
    use super::{async_trait, Bytes, HttpClient, HttpError, Request, Response};
    use crate::{diagnostics::Logger, Config, Error};
    use std::convert::TryInto;

    #[async_trait]
    impl HttpClient for reqwest::Client {
        async fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Bytes>, HttpError> {
            let request: reqwest::Request = request.try_into()?;
            let response = self.execute(request).await?;
            Ok(Response::builder()
                .status(response.status())
                .body(response.bytes().await?)?)
        }
    }

    /// Build a reqwest client with the transport settings of `config`.
    pub(crate) fn build_client(config: &Config, logger: &Logger) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout);
        if let Some(proxy) = config.proxy.as_deref().filter(|proxy| !proxy.is_empty()) {
            match reqwest::Proxy::all(proxy) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(err) => logger.warning(format!("Ignoring invalid proxy URL: {}", err)),
            }
        }
        if !config.ssl_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder
            .build()
            .map_err(|err| Error::HttpClientBuild(err.into()))
    }
}

#[cfg(feature = "reqwest")]
pub(crate) use reqwest_client::build_client;
