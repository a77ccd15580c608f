use crate::{
    client::Client,
    diagnostics::Logger,
    filters::{ErrorRef, IgnoreFilter},
    http_client::HttpClient,
    models::{ApiResponse, Notice},
    notice_builder::NoticeBuilder,
    testing::Testing,
    worker::Worker,
    Config, Error,
};
use serde_json::{Map, Value};
use std::{error::Error as StdError, sync::mpsc::sync_channel, sync::Arc};
use tokio::runtime::{Builder, Runtime};

const WORKER_THREAD_NAME: &str = "checkend-worker";

/// Data attached to a single notice.
///
/// ```
/// use checkend::NotifyOptions;
/// use serde_json::json;
///
/// let user = json!({"id": 42, "email": "jane@example.com"});
/// let options = NotifyOptions::new()
///     .with_user(user.as_object().cloned().unwrap_or_default())
///     .with_fingerprint("checkout-timeout")
///     .with_tags(["checkout", "payments"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct NotifyOptions {
    context: Option<Map<String, Value>>,
    user: Option<Map<String, Value>>,
    request: Option<Map<String, Value>>,
    fingerprint: Option<String>,
    tags: Vec<String>,
}

impl NotifyOptions {
    /// No extra data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Free-form context.
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// The user who ran into the error.
    pub fn with_user(mut self, user: Map<String, Value>) -> Self {
        self.user = Some(user);
        self
    }

    /// The request that failed, e.g. `url`, `method`, `headers`, `params` and `session`.
    pub fn with_request(mut self, request: Map<String, Value>) -> Self {
        self.request = Some(request);
        self
    }

    /// Group notices by this key instead of letting Checkend decide.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Tags shown with the notice.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Reports errors to Checkend.
///
/// Create one per process and share it, e.g. in an `Arc` or a `static`. Each reported error goes
/// through the ignore filter, is turned into a sanitized [`Notice`], passed to the before-notify
/// hooks and then queued for delivery on a background thread (or sent right away if async
/// sending is off).
///
/// Dropping it stops the worker, which delivers what is still queued within the shutdown
/// timeout.
#[derive(Debug)]
pub struct Checkend<C> {
    config: Arc<Config>,
    ignore_filter: IgnoreFilter,
    notice_builder: NoticeBuilder,
    client: Arc<Client<C>>,
    worker: Option<Worker<C>>,
    testing: Testing,
    logger: Logger,
    runtime: Option<Runtime>,
}

#[cfg(feature = "reqwest")]
impl Checkend<reqwest::Client> {
    /// Create a notifier delivering over a [`reqwest::Client`] built from `config`.
    pub fn new(config: Config) -> Result<Self, Error> {
        let http_client = crate::http_client::build_client(&config, &Logger::new(config.debug))?;
        Self::with_client(config, http_client)
    }
}

impl<C: HttpClient + 'static> Checkend<C> {
    /// Create a notifier delivering over a custom HTTP client.
    ///
    /// Starts the delivery worker if reporting is enabled and async sending is on.
    pub fn with_client(config: Config, http_client: C) -> Result<Self, Error> {
        let config = Arc::new(config);
        let logger = Logger::new(config.debug);
        let client = Arc::new(Client::new(&config, http_client));

        let runtime = if config.is_enabled() {
            Some(
                Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name(WORKER_THREAD_NAME)
                    .enable_all()
                    .build()
                    .map_err(Error::Runtime)?,
            )
        } else {
            None
        };

        let worker = match &runtime {
            Some(runtime) if config.async_send => {
                let worker = Worker::new(&config, client.clone());
                worker.start(runtime.handle());
                Some(worker)
            }
            _ => None,
        };

        logger.debug(format_args!(
            "Configured for {} (enabled: {}, async: {})",
            config.environment,
            config.is_enabled(),
            worker.is_some()
        ));

        Ok(Checkend {
            ignore_filter: IgnoreFilter::new(config.ignored_errors.iter().cloned()),
            notice_builder: NoticeBuilder::new(config.clone()),
            config,
            client,
            worker,
            testing: Testing::default(),
            logger,
            runtime,
        })
    }
}

impl<C: HttpClient + 'static> Checkend<C> {
    /// Report an error. Never blocks on the network when async sending is on.
    pub fn notify<E>(&self, error: &E, options: NotifyOptions)
    where
        E: StdError + 'static,
    {
        self.notify_ref(&ErrorRef::new(error), options);
    }

    /// Report a type-erased error, e.g. from a `Box<dyn Error>`.
    pub fn notify_dyn(&self, error: &(dyn StdError + 'static), options: NotifyOptions) {
        self.notify_ref(&ErrorRef::from_dyn(error), options);
    }

    /// Report an error and wait for Checkend's answer, bypassing the queue. There is exactly one
    /// delivery attempt.
    ///
    /// Returns `None` if the error was not sent for any reason. With test capture on, the notice
    /// is captured and a response with zero ids is returned.
    ///
    /// Blocks the calling thread for one round trip. The request runs on the notifier's own
    /// runtime, so this can be called from inside an async task as well, at the cost of
    /// blocking that task's thread.
    pub fn notify_sync<E>(&self, error: &E, options: NotifyOptions) -> Option<ApiResponse>
    where
        E: StdError + 'static,
    {
        self.notify_sync_ref(&ErrorRef::new(error), options)
    }

    /// Like [`notify_sync`](Checkend::notify_sync) for a type-erased error.
    pub fn notify_sync_dyn(
        &self,
        error: &(dyn StdError + 'static),
        options: NotifyOptions,
    ) -> Option<ApiResponse> {
        self.notify_sync_ref(&ErrorRef::from_dyn(error), options)
    }

    fn notify_ref(&self, error: &ErrorRef<'_>, options: NotifyOptions) {
        let Some(notice) = self.prepare(error, options) else {
            return;
        };
        let Err(notice) = self.testing.try_record(notice) else {
            return;
        };
        match &self.worker {
            Some(worker) => {
                if !worker.push(notice) {
                    self.logger.debug("Queue full or worker stopped, notice dropped");
                }
            }
            None => {
                self.send_now(notice);
            }
        }
    }

    fn notify_sync_ref(&self, error: &ErrorRef<'_>, options: NotifyOptions) -> Option<ApiResponse> {
        let notice = self.prepare(error, options)?;
        match self.testing.try_record(notice) {
            Ok(()) => Some(ApiResponse {
                id: 0,
                problem_id: 0,
            }),
            Err(notice) => self.send_now(notice),
        }
    }

    fn prepare(&self, error: &ErrorRef<'_>, options: NotifyOptions) -> Option<Notice> {
        if !self.config.is_enabled() {
            return None;
        }
        if self.ignore_filter.should_ignore(Some(error)) {
            self.logger.debug(format_args!("Ignoring {}", error.class()));
            return None;
        }

        let notice = self.notice_builder.build(
            error,
            options.context.as_ref(),
            options.user.as_ref(),
            options.request.as_ref(),
            options.fingerprint,
            options.tags,
        );
        if !self.config.before_notify.iter().all(|hook| hook(&notice)) {
            self.logger.debug(format_args!(
                "Notice for {} skipped by hook",
                notice.error_class()
            ));
            return None;
        }
        Some(notice)
    }

    fn send_now(&self, notice: Notice) -> Option<ApiResponse> {
        let runtime = self.runtime.as_ref()?;
        let client = self.client.clone();
        let (response_tx, response_rx) = sync_channel(1);
        runtime.spawn(async move {
            let _ = response_tx.send(client.send(&notice).await);
        });
        // Never `block_on` here: the caller may already be inside a runtime.
        response_rx.recv().ok().flatten()
    }
}

impl<C> Checkend<C> {
    /// Block until every queued notice has been delivered or given up on.
    pub fn flush(&self) {
        if let Some(worker) = &self.worker {
            worker.flush();
        }
    }

    /// Stop the worker, delivering what is queued within the shutdown timeout. Later notices
    /// are dropped.
    pub fn stop(&self) {
        if let Some(worker) = &self.worker {
            worker.stop();
        }
    }

    /// The configuration this notifier was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Test capture.
    pub fn testing(&self) -> &Testing {
        &self.testing
    }

    /// The delivery worker, if async sending is on.
    pub fn worker(&self) -> Option<&Worker<C>> {
        self.worker.as_ref()
    }

    /// The delivery client.
    pub fn client(&self) -> &Client<C> {
        &self.client
    }
}

impl<C> Drop for Checkend<C> {
    fn drop(&mut self) {
        self.stop();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
