//! C7 — the public façade: [`SubscriptionWorker`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};

use crate::batch::Batch;
use crate::dispatch::dispatch;
use crate::error::{SubscriberError, SubscriptionWorkerError};
use crate::events::{
    BatchListener, ConnectionRetryListener, EndListener, ErrorListener, EventEmitter,
};
use crate::messages::KeyProfile;
use crate::options::SubscriptionOptions;
use crate::pump::{Pump, PumpOutcome};
use crate::reconnect::{classify, ErroneousWindow, ReconnectAction};
use crate::topology::TopologyClient;
use crate::transport::{connect, negotiate, FramedMessageStream, IoStream};

/// A running subscription. Constructing one does not open a connection; the background task
/// starts lazily, the first time a `batch` listener is registered (section 6).
pub struct SubscriptionWorker {
    database: Arc<str>,
    options: Arc<SubscriptionOptions>,
    topology: Arc<dyn TopologyClient>,
    profile: KeyProfile,
    events: EventEmitter,
    current_node_tag: Arc<AsyncMutex<Option<String>>>,
    dispose_signal: Arc<Notify>,
    disposed: Arc<AtomicBool>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionWorker {
    /// Construct a worker for `database`, with the given options and topology collaborator. The
    /// worker does nothing until a `batch` listener is registered.
    pub fn new(
        database: impl Into<String>,
        options: SubscriptionOptions,
        topology: Arc<dyn TopologyClient>,
    ) -> Self {
        let profile = KeyProfile::compiled(options.with_revisions);
        SubscriptionWorker {
            database: Arc::from(database.into()),
            options: Arc::new(options),
            topology,
            profile,
            events: EventEmitter::new(),
            current_node_tag: Arc::new(AsyncMutex::new(None)),
            dispose_signal: Arc::new(Notify::new()),
            disposed: Arc::new(AtomicBool::new(false)),
            task: std::sync::Mutex::new(None),
        }
    }

    pub fn subscription_name(&self) -> &str {
        &self.options.subscription_name
    }

    /// The cluster tag of the node this worker is currently connected to, if any.
    pub async fn current_node_tag(&self) -> Option<String> {
        self.current_node_tag.lock().await.clone()
    }

    /// Register a `batch` listener. The listener reports completion by resolving the future it
    /// returns; the worker waits for that before acknowledging the batch. Registering the first
    /// `batch` listener starts the background connection task.
    pub fn on_batch<F, Fut>(&self, listener: F)
    where
        F: Fn(Arc<Batch>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SubscriberError>> + Send + 'static,
    {
        let listener: BatchListener =
            Box::new(move |batch| Box::pin(listener(batch)) as futures::future::BoxFuture<'static, _>);
        self.events.on_batch(listener);
        self.ensure_started();
    }

    /// Register an `error` listener, invoked whenever a connection attempt ends in a failure
    /// (whether retried, redirected, or fatal).
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&SubscriptionWorkerError) + Send + Sync + 'static,
    {
        let listener: ErrorListener = Box::new(listener);
        self.events.on_error(listener);
    }

    /// Register a `connectionRetry` listener, invoked before each retried (non-fatal, non-
    /// redirect) reconnect attempt.
    pub fn on_connection_retry<F>(&self, listener: F)
    where
        F: Fn(&SubscriptionWorkerError) + Send + Sync + 'static,
    {
        let listener: ConnectionRetryListener = Box::new(listener);
        self.events.on_connection_retry(listener);
    }

    /// Register an `end` listener, invoked exactly once when the worker stops, with the error
    /// that ended it if any.
    pub fn on_end<F>(&self, listener: F)
    where
        F: Fn(Option<&SubscriptionWorkerError>) + Send + Sync + 'static,
    {
        let listener: EndListener = Box::new(listener);
        self.events.on_end(listener);
    }

    pub fn remove_all_listeners(&self) {
        self.events.remove_all_listeners();
    }

    fn ensure_started(&self) {
        let mut task = self.task.lock().unwrap();
        if task.is_some() || !self.events.has_batch_listeners() {
            return;
        }

        let database = self.database.clone();
        let options = self.options.clone();
        let topology = self.topology.clone();
        let profile = self.profile.clone();
        let events = self.events.clone();
        let current_node_tag = self.current_node_tag.clone();
        let disposed = self.disposed.clone();
        let dispose_signal = self.dispose_signal.clone();

        let span = info_span!("subscription_worker", subscription = %options.subscription_name);
        *task = Some(tokio::spawn(
            run_loop(
                database,
                options,
                topology,
                profile,
                events,
                current_node_tag,
                disposed,
                dispose_signal,
            )
            .instrument(span),
        ));
    }

    /// Stop the worker. Signals the background task to end after its current connection attempt,
    /// waits for it to finish, and fires `end` if it had not already fired.
    pub async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.dispose_signal.notify_waiters();

        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.events.emit_end_once(None);
    }
}

async fn run_loop(
    database: Arc<str>,
    options: Arc<SubscriptionOptions>,
    topology: Arc<dyn TopologyClient>,
    profile: KeyProfile,
    events: EventEmitter,
    current_node_tag: Arc<AsyncMutex<Option<String>>>,
    disposed: Arc<AtomicBool>,
    dispose_signal: Arc<Notify>,
) {
    let mut window = ErroneousWindow::new(options.max_erroneous_period);
    let mut redirect_target: Option<String> = None;

    loop {
        if disposed.load(Ordering::SeqCst) {
            break;
        }

        let attempt = tokio::select! {
            _ = dispose_signal.notified() => break,
            result = run_connection(
                &database,
                &options,
                topology.as_ref(),
                &profile,
                &events,
                redirect_target.take(),
                &current_node_tag,
            ) => result,
        };

        match attempt {
            Ok(()) => {
                info!("subscription stream closed by the server");
                break;
            }
            Err(err) => {
                events.emit_error(&err);
                match classify(&err) {
                    ReconnectAction::Fatal => {
                        events.emit_end_once(Some(&err));
                        return;
                    }
                    ReconnectAction::RedirectTo(node) => {
                        redirect_target = Some(node);
                        window.note_success();
                    }
                    ReconnectAction::Retry => {
                        events.emit_connection_retry(&err);
                        if let Some(elapsed) = window.note_failure(Instant::now()) {
                            let fatal = SubscriptionWorkerError::SubscriptionInvalidState {
                                name: options.subscription_name.clone(),
                                reason: format!(
                                    "no successful connection in over {:.0}s ({err})",
                                    elapsed.as_secs_f64()
                                ),
                            };
                            events.emit_end_once(Some(&fatal));
                            return;
                        }
                    }
                }
            }
        }

        tokio::select! {
            _ = dispose_signal.notified() => break,
            _ = tokio::time::sleep(options.time_to_wait_before_connection_retry) => {}
        }
    }

    events.emit_end_once(None);
}

/// Open one connection, negotiate the protocol, and pump batches until the connection ends —
/// either gracefully (`Ok`, the server closed it with nothing more to send) or with an error that
/// the caller classifies to decide what to do next.
async fn run_connection(
    database: &str,
    options: &SubscriptionOptions,
    topology: &dyn TopologyClient,
    profile: &KeyProfile,
    events: &EventEmitter,
    redirect_target: Option<String>,
    current_node_tag: &AsyncMutex<Option<String>>,
) -> Result<(), SubscriptionWorkerError> {
    let info = topology.get_tcp_info(redirect_target.as_deref()).await?;
    *current_node_tag.lock().await = Some(info.requested_node.clone());

    let mut stream: IoStream = connect(&info.url, info.certificate.as_ref()).await?;
    negotiate(&mut stream, database, options, redirect_target.as_deref()).await?;

    let framed = FramedMessageStream::new(stream);
    let mut pump = Pump::new(framed, profile.clone(), options.subscription_name.clone());

    // The batch just dispatched, and the task delivering it to listeners: kept one step behind
    // the read loop so that reading batch N+1 overlaps with dispatching batch N (section 5).
    let mut in_flight: Option<(String, JoinHandle<Result<(), SubscriptionWorkerError>>)> = None;

    loop {
        let mut batch = Batch::new();
        let outcome = pump.read_single_batch(&mut batch).await;

        if let Some((change_vector, dispatch_task)) = in_flight.take() {
            dispatch_task
                .await
                .map_err(|_| SubscriptionWorkerError::protocol_violation("dispatch task panicked"))??;
            pump.acknowledge(change_vector).await?;
        }

        match outcome? {
            PumpOutcome::StreamClosed => return Ok(()),
            PumpOutcome::BatchReady { change_vector } => {
                let batch = Arc::new(batch);
                let events = events.clone();
                let ignore = options.ignore_subscriber_errors;
                let dispatch_task =
                    tokio::spawn(async move { dispatch(&events, batch, ignore).await });
                in_flight = Some((change_vector, dispatch_task));
            }
        }
    }
}
