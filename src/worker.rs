use crate::{
    client::Client,
    diagnostics::{Level, Logger},
    http_client::HttpClient,
    models::Notice,
    Config, Error,
};
use backon::{ExponentialBuilder, Retryable};
use std::{
    sync::{
        mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};
use tokio::{runtime::Handle, sync::mpsc, sync::oneshot};

/// Attempts per notice on the queue path, including the first one.
const MAX_ATTEMPTS: usize = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

type FlushAck = SyncSender<()>;

/// Deadline for the drain and the notice whose delivery was cut short, if any.
type Shutdown = (Instant, Option<Notice>);

#[derive(Debug)]
struct Channels {
    queue: mpsc::Receiver<Notice>,
    flush: mpsc::UnboundedReceiver<FlushAck>,
}

#[derive(Debug)]
enum State {
    Created(Channels),
    Running {
        done: oneshot::Sender<Instant>,
        /// Whether every queued notice got its attempt before the deadline.
        exited: Receiver<bool>,
    },
    Stopped,
}

/// Delivers notices from a bounded queue on a background task.
///
/// The worker goes through `created → running → stopped` exactly once. One task sends the queued
/// notices one after another, retrying failed deliveries with exponential backoff. [`flush`]
/// waits for the queue to empty; [`stop`] drains what is left within the shutdown timeout.
///
/// [`flush`]: Worker::flush
/// [`stop`]: Worker::stop
#[derive(Debug)]
pub struct Worker<C> {
    client: Arc<Client<C>>,
    queue: mpsc::Sender<Notice>,
    flush: mpsc::UnboundedSender<FlushAck>,
    state: Mutex<State>,
    shutdown_timeout: Duration,
    logger: Logger,
}

impl<C: HttpClient + 'static> Worker<C> {
    /// Create a stopped worker with the queue size and shutdown timeout of `config`.
    pub fn new(config: &Config, client: Arc<Client<C>>) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.max_queue_size.max(1));
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        Worker {
            client,
            queue: queue_tx,
            flush: flush_tx,
            state: Mutex::new(State::Created(Channels {
                queue: queue_rx,
                flush: flush_rx,
            })),
            shutdown_timeout: config.shutdown_timeout,
            logger: Logger::new(config.debug),
        }
    }

    /// Spawn the processing task on `handle`. Does nothing if the worker is already running or
    /// has been stopped.
    pub fn start(&self, handle: &Handle) {
        let mut state = self.lock();
        let channels = match std::mem::replace(&mut *state, State::Stopped) {
            State::Created(channels) => channels,
            other => {
                *state = other;
                return;
            }
        };

        let (done_tx, done_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = sync_channel(1);
        let task = Task {
            client: self.client.clone(),
            queue: channels.queue,
            flush: channels.flush,
            shutdown_timeout: self.shutdown_timeout,
            logger: self.logger,
        };
        handle.spawn(async move {
            let drained = task.run(done_rx).await;
            let _ = exited_tx.send(drained);
        });
        *state = State::Running {
            done: done_tx,
            exited: exited_rx,
        };
    }
}

impl<C> Worker<C> {
    /// Queue a notice without blocking. Returns `false` if the worker is not running or the
    /// queue is full.
    pub fn push(&self, notice: Notice) -> bool {
        let state = self.lock();
        if !matches!(*state, State::Running { .. }) {
            return false;
        }
        self.queue.try_send(notice).is_ok()
    }

    /// Block until every notice queued before this call has been processed, including one that
    /// is being delivered right now. Returns immediately if the worker is not running.
    ///
    /// Must not be called from within the runtime the worker runs on.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = sync_channel(1);
        {
            let state = self.lock();
            if !matches!(*state, State::Running { .. }) {
                return;
            }
            if self.flush.send(ack_tx).is_err() {
                return;
            }
        }
        // The sender is dropped without an ack if the task exits first.
        let _ = ack_rx.recv();
    }

    /// Stop accepting notices and deliver what is queued, one attempt each. Blocks for at most
    /// the shutdown timeout, and no delivery is started after it elapsed. A delivery in flight
    /// stops retrying and gets one more attempt with the queued notices. Only the first call has
    /// an effect.
    pub fn stop(&self) {
        let (done, exited) = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, State::Stopped) {
                State::Running { done, exited } => (done, exited),
                other => {
                    *state = other;
                    return;
                }
            }
        };

        let deadline = Instant::now() + self.shutdown_timeout;
        let _ = done.send(deadline);
        match exited.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(true) | Err(RecvTimeoutError::Disconnected) => {}
            Ok(false) | Err(RecvTimeoutError::Timeout) => self.logger.verbose(
                Level::Warning,
                "Shutdown timeout reached, some notices may not have been sent",
            ),
        }
    }

    /// Number of notices waiting in the queue. A notice being delivered is not counted.
    pub fn queue_len(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Whether the processing task is running.
    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), State::Running { .. })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Task<C> {
    client: Arc<Client<C>>,
    queue: mpsc::Receiver<Notice>,
    flush: mpsc::UnboundedReceiver<FlushAck>,
    shutdown_timeout: Duration,
    logger: Logger,
}

impl<C: HttpClient> Task<C> {
    async fn run(mut self, mut done: oneshot::Receiver<Instant>) -> bool {
        let (deadline, interrupted) = loop {
            tokio::select! {
                biased;
                // Also fires when the worker is dropped without being stopped.
                deadline = &mut done => break (self.deadline(deadline.ok()), None),
                Some(ack) = self.flush.recv() => {
                    let shutdown = self.flush_queue(&mut done).await;
                    let _ = ack.send(());
                    if let Some(shutdown) = shutdown {
                        break shutdown;
                    }
                }
                notice = self.queue.recv() => match notice {
                    Some(notice) => {
                        if let Some(shutdown) = self.deliver(notice, &mut done).await {
                            break shutdown;
                        }
                    }
                    None => return true,
                },
            }
        };
        self.drain(deadline, interrupted).await
    }

    async fn flush_queue(&mut self, done: &mut oneshot::Receiver<Instant>) -> Option<Shutdown> {
        while let Ok(notice) = self.queue.try_recv() {
            if let Some(shutdown) = self.deliver(notice, done).await {
                return Some(shutdown);
            }
        }
        None
    }

    /// Send with retries unless the worker is stopped first.
    async fn deliver(
        &self,
        notice: Notice,
        done: &mut oneshot::Receiver<Instant>,
    ) -> Option<Shutdown> {
        tokio::select! {
            biased;
            deadline = done => Some((self.deadline(deadline.ok()), Some(notice))),
            _ = self.send_with_retry(&notice) => None,
        }
    }

    fn deadline(&self, deadline: Option<Instant>) -> Instant {
        deadline.unwrap_or_else(|| Instant::now() + self.shutdown_timeout)
    }

    async fn send_with_retry(&self, notice: &Notice) {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(RETRY_BASE_DELAY)
            .with_factor(2.0)
            .with_max_times(MAX_ATTEMPTS - 1);
        let result = (|| self.client.try_send(notice))
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .notify(|err: &Error, delay: Duration| {
                self.logger.log(err.level(), err);
                self.logger
                    .debug(format_args!("Retrying notice in {}ms", delay.as_millis()));
            })
            .await;

        match result {
            Ok(response) => self.logger.debug(format_args!(
                "Notice sent successfully: id={} problem_id={}",
                response.id, response.problem_id
            )),
            Err(err) => {
                self.logger.log(err.level(), &err);
                self.logger.debug(format_args!(
                    "Giving up on notice after {} attempts",
                    MAX_ATTEMPTS
                ));
            }
        }
    }

    async fn drain(&mut self, deadline: Instant, interrupted: Option<Notice>) -> bool {
        let queue = &mut self.queue;
        let client = &self.client;
        let pending = interrupted
            .into_iter()
            .chain(std::iter::from_fn(|| queue.try_recv().ok()));
        let drain = async {
            for notice in pending {
                if Instant::now() >= deadline {
                    return false;
                }
                client.send(&notice).await;
            }
            true
        };
        tokio::time::timeout_at(deadline.into(), drain)
            .await
            .unwrap_or(false)
    }
}
