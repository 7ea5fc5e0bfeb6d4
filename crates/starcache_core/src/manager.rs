//! The cache manager actor.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use starcache_model::{
    BitKey, SegmentBody, SegmentColumn, SegmentHeader, SegmentId, SegmentProvenance,
};
use starcache_provider::{
    CacheEvent, CacheEventKind, CacheFuture, CacheListener, CachePromise, CacheProvider,
    ProviderError, ProviderRegistry,
};

use crate::agg::Aggregator;
use crate::builder;
use crate::config::CacheConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::{CellRequest, SegmentCacheIndex};
use crate::segment::Segment;
use crate::worker::CacheWorker;

/// Active object that maintains the shared segment index and the traffic
/// to external cache providers.
///
/// One manager runs per server instance. A dedicated thread owns the
/// [`SegmentCacheIndex`] and all [`CacheWorker`] dispatch; clients talk
/// to it through a bounded FIFO of messages. A message is either a
/// **command**, which is synchronous from the caller's perspective (the
/// caller blocks until its response arrives), or an **event**, which is
/// fire-and-forget. Events from one producer are observed in that
/// producer's order; nothing is guaranteed between producers.
///
/// The manager registers a listener on every provider so that segments
/// created or deleted by other nodes flow into the index as events.
pub struct CacheManager {
    sender: SyncSender<Message>,
    responses: Arc<ResponseQueue>,
    next_command_id: AtomicU64,
    thread: Option<JoinHandle<()>>,
    listeners: Vec<(Arc<dyn CacheProvider>, Arc<dyn CacheListener>)>,
}

enum Message {
    Command { id: u64, kind: Command },
    Event(Event),
}

enum Command {
    Locate(CellRequest),
    FindRollupCandidates(CellRequest),
    IntersectRegion {
        provenance: SegmentProvenance,
        region: Vec<SegmentColumn>,
    },
    CachedBody(SegmentHeader),
    Rollup {
        inputs: Vec<(SegmentHeader, SegmentBody)>,
        keep_columns: BTreeSet<String>,
        target_bit_key: BitKey,
        aggregator: Aggregator,
    },
    WatchLoad(SegmentHeader),
    Shutdown,
}

enum Event {
    LoadSucceeded { segment: Segment, body: SegmentBody },
    LoadFailed { segment: Segment, message: String },
    SegmentAdd {
        header: SegmentHeader,
        body: Option<SegmentBody>,
    },
    ExternalSegmentCreated(SegmentHeader),
    ExternalSegmentDeleted(SegmentHeader),
}

impl Event {
    fn label(&self) -> &'static str {
        match self {
            Event::LoadSucceeded { .. } => "load-succeeded",
            Event::LoadFailed { .. } => "load-failed",
            Event::SegmentAdd { .. } => "segment-add",
            Event::ExternalSegmentCreated(_) => "external-segment-created",
            Event::ExternalSegmentDeleted(_) => "external-segment-deleted",
        }
    }
}

enum Response {
    Headers(Vec<SegmentHeader>),
    CandidateGroups(Vec<Vec<SegmentHeader>>),
    Body(Option<SegmentBody>),
    Rolled(Box<(SegmentHeader, SegmentBody)>),
    LoadWatch(CacheFuture<()>),
    Unit,
}

/// Pairs command responses with their requesters.
///
/// Responses arrive in the manager's processing order, which is not the
/// order callers collect them in; a response whose requester has not
/// arrived yet is stashed under its command id until collected.
struct ResponseQueue {
    stash: Mutex<ResponseStash>,
    ready: Condvar,
}

struct ResponseStash {
    responses: HashMap<u64, CoreResult<Response>>,
    closed: bool,
}

impl ResponseQueue {
    fn new() -> Self {
        Self {
            stash: Mutex::new(ResponseStash {
                responses: HashMap::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn put(&self, id: u64, outcome: CoreResult<Response>) {
        self.stash.lock().responses.insert(id, outcome);
        self.ready.notify_all();
    }

    fn take(&self, id: u64) -> CoreResult<Response> {
        let mut stash = self.stash.lock();
        loop {
            if let Some(outcome) = stash.responses.remove(&id) {
                return outcome;
            }
            if stash.closed {
                return Err(CoreError::ManagerUnavailable);
            }
            self.ready.wait(&mut stash);
        }
    }

    fn close(&self) {
        self.stash.lock().closed = true;
        self.ready.notify_all();
    }
}

/// Enqueues external cache changes as manager events. Runs on the
/// provider's thread, so it never blocks: a full queue drops the
/// notification.
struct ManagerListener {
    sender: SyncSender<Message>,
}

impl CacheListener for ManagerListener {
    fn handle(&self, event: &CacheEvent) {
        if event.is_local {
            return;
        }
        let message = Message::Event(match event.kind {
            CacheEventKind::EntryCreated => {
                Event::ExternalSegmentCreated(event.source.clone())
            }
            CacheEventKind::EntryDeleted => {
                Event::ExternalSegmentDeleted(event.source.clone())
            }
        });
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("manager queue full; dropping external cache event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

struct ManagerState {
    index: SegmentCacheIndex,
    workers: Vec<CacheWorker>,
    waiters: HashMap<SegmentId, Vec<CachePromise<()>>>,
    density_threshold: f64,
}

impl CacheManager {
    /// Spawns a manager over the given providers.
    ///
    /// # Errors
    ///
    /// Fails when the manager thread cannot be spawned.
    pub fn new(
        config: CacheConfig,
        providers: Vec<Arc<dyn CacheProvider>>,
    ) -> CoreResult<Self> {
        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity);
        let responses = Arc::new(ResponseQueue::new());

        let loop_responses = Arc::clone(&responses);
        let loop_providers = providers.clone();
        let thread = thread::Builder::new()
            .name("starcache-manager".into())
            .spawn(move || run(config, loop_providers, receiver, loop_responses))
            .map_err(|e| {
                CoreError::invariant_violation(format!(
                    "failed to spawn cache manager thread: {e}"
                ))
            })?;

        let mut listeners = Vec::with_capacity(providers.len());
        for provider in providers {
            let listener: Arc<dyn CacheListener> = Arc::new(ManagerListener {
                sender: sender.clone(),
            });
            provider.add_listener(Arc::clone(&listener));
            listeners.push((provider, listener));
        }

        Ok(Self {
            sender,
            responses,
            next_command_id: AtomicU64::new(0),
            thread: Some(thread),
            listeners,
        })
    }

    /// Spawns a manager whose provider comes from `registry`: the
    /// configured implementation name when set, otherwise the first
    /// registered one. With no registered provider at all, the manager
    /// runs with the in-memory index only.
    ///
    /// # Errors
    ///
    /// Fails when the configured name is unknown to the registry or the
    /// manager thread cannot be spawned.
    pub fn from_registry(
        config: CacheConfig,
        registry: &ProviderRegistry,
    ) -> CoreResult<Self> {
        let provider = registry.create(config.provider_impl.as_deref())?;
        Self::new(config, provider.into_iter().collect())
    }

    fn execute(&self, kind: Command) -> CoreResult<Response> {
        let id = self.next_command_id.fetch_add(1, Ordering::Relaxed);
        self.sender
            .send(Message::Command { id, kind })
            .map_err(|_| CoreError::ManagerUnavailable)?;
        self.responses.take(id)
    }

    fn event(&self, event: Event) -> CoreResult<()> {
        self.sender
            .send(Message::Event(event))
            .map_err(|_| CoreError::ManagerUnavailable)
    }

    /// Finds the indexed headers of exactly the requested dimensionality
    /// that can serve the request.
    pub fn locate(&self, request: CellRequest) -> CoreResult<Vec<SegmentHeader>> {
        match self.execute(Command::Locate(request))? {
            Response::Headers(headers) => Ok(headers),
            _ => Err(unexpected_response()),
        }
    }

    /// Finds header groups a rollup could combine to serve the request.
    pub fn find_rollup_candidates(
        &self,
        request: CellRequest,
    ) -> CoreResult<Vec<Vec<SegmentHeader>>> {
        match self.execute(Command::FindRollupCandidates(request))? {
            Response::CandidateGroups(groups) => Ok(groups),
            _ => Err(unexpected_response()),
        }
    }

    /// Finds every header of the fact group overlapping `region`, for
    /// flush targeting.
    pub fn intersect_region(
        &self,
        provenance: SegmentProvenance,
        region: Vec<SegmentColumn>,
    ) -> CoreResult<Vec<SegmentHeader>> {
        match self.execute(Command::IntersectRegion { provenance, region })? {
            Response::Headers(headers) => Ok(headers),
            _ => Err(unexpected_response()),
        }
    }

    /// Fetches a body for `header` from the external caches, trying each
    /// provider in configuration order.
    pub fn cached_body(&self, header: &SegmentHeader) -> CoreResult<Option<SegmentBody>> {
        match self.execute(Command::CachedBody(header.clone()))? {
            Response::Body(body) => Ok(body),
            _ => Err(unexpected_response()),
        }
    }

    /// Rolls the inputs up to `target_bit_key`, admits the result into
    /// the index and the external caches, and returns it.
    pub fn rollup(
        &self,
        inputs: Vec<(SegmentHeader, SegmentBody)>,
        keep_columns: BTreeSet<String>,
        target_bit_key: BitKey,
        aggregator: Aggregator,
    ) -> CoreResult<(SegmentHeader, SegmentBody)> {
        match self.execute(Command::Rollup {
            inputs,
            keep_columns,
            target_bit_key,
            aggregator,
        })? {
            Response::Rolled(result) => Ok(*result),
            _ => Err(unexpected_response()),
        }
    }

    /// Returns a future that completes when a load for `header` succeeds
    /// or fails.
    pub fn watch_load(&self, header: &SegmentHeader) -> CoreResult<CacheFuture<()>> {
        match self.execute(Command::WatchLoad(header.clone()))? {
            Response::LoadWatch(future) => Ok(future),
            _ => Err(unexpected_response()),
        }
    }

    /// Tells the cache that a segment completed loading from SQL.
    ///
    /// Called by a SQL worker. The segment is installed in the index,
    /// waiters are signalled, and the body is written to every external
    /// cache.
    pub fn load_succeeded(&self, segment: Segment, body: SegmentBody) -> CoreResult<()> {
        self.event(Event::LoadSucceeded { segment, body })
    }

    /// Tells the cache that an attempt to load a segment failed.
    ///
    /// Called by a SQL worker. Waiters are signalled; the index is not
    /// touched.
    pub fn load_failed(
        &self,
        segment: Segment,
        message: impl Into<String>,
    ) -> CoreResult<()> {
        self.event(Event::LoadFailed {
            segment,
            message: message.into(),
        })
    }

    /// Adds a header to the index; when a body is supplied, writes it to
    /// every external cache.
    pub fn segment_add(
        &self,
        header: SegmentHeader,
        body: Option<SegmentBody>,
    ) -> CoreResult<()> {
        self.event(Event::SegmentAdd { header, body })
    }

    /// Tells the cache that a segment is newly available in an external
    /// cache; its body stays remote until needed.
    pub fn external_segment_created(&self, header: SegmentHeader) -> CoreResult<()> {
        self.event(Event::ExternalSegmentCreated(header))
    }

    /// Tells the cache that a segment is no longer available in an
    /// external cache.
    pub fn external_segment_deleted(&self, header: SegmentHeader) -> CoreResult<()> {
        self.event(Event::ExternalSegmentDeleted(header))
    }

    /// Stops the manager thread, detaching provider listeners first.
    /// Pending commands fail with [`CoreError::ManagerUnavailable`].
    pub fn shutdown(&mut self) -> CoreResult<()> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };
        for (provider, listener) in self.listeners.drain(..) {
            provider.remove_listener(&listener);
        }
        // The manager may already be gone; that is a successful shutdown.
        match self.execute(Command::Shutdown) {
            Ok(_) | Err(CoreError::ManagerUnavailable) => {}
            Err(e) => return Err(e),
        }
        handle.join().map_err(|_| CoreError::ManagerUnavailable)
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "cache manager shutdown failed");
        }
    }
}

fn unexpected_response() -> CoreError {
    CoreError::invariant_violation("unexpected response variant for command")
}

/// Closes the response queue when the manager loop exits, including by
/// panic, so no command caller is left blocked forever.
struct CloseOnExit(Arc<ResponseQueue>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

fn run(
    config: CacheConfig,
    providers: Vec<Arc<dyn CacheProvider>>,
    receiver: Receiver<Message>,
    responses: Arc<ResponseQueue>,
) {
    let _close_guard = CloseOnExit(Arc::clone(&responses));
    let mut state = ManagerState {
        index: SegmentCacheIndex::new(config.max_index_headers, config.eviction_seed),
        workers: providers
            .into_iter()
            .map(|p| CacheWorker::new(p, &config))
            .collect(),
        waiters: HashMap::new(),
        density_threshold: config.rollup_density_threshold,
    };

    while let Ok(message) = receiver.recv() {
        match message {
            Message::Command { id, kind } => {
                let is_shutdown = matches!(kind, Command::Shutdown);
                let outcome = handle_command(&mut state, kind);
                responses.put(id, outcome);
                if is_shutdown {
                    break;
                }
            }
            Message::Event(event) => {
                debug!(event = event.label(), "cache event");
                // The event loop must not die: event errors are logged
                // and swallowed.
                if let Err(e) = handle_event(&mut state, event) {
                    error!(error = %e, "cache event failed");
                }
            }
        }
    }

    // Release any load waiters still outstanding; the close guard
    // refuses commands that arrived too late.
    for (_, promises) in state.waiters.drain() {
        for promise in promises {
            promise.fail(ProviderError::failed("cache manager shut down"));
        }
    }
}

fn handle_command(state: &mut ManagerState, command: Command) -> CoreResult<Response> {
    match command {
        Command::Locate(request) => state.index.locate(&request).map(Response::Headers),
        Command::FindRollupCandidates(request) => state
            .index
            .find_rollup_candidates(&request)
            .map(Response::CandidateGroups),
        Command::IntersectRegion { provenance, region } => state
            .index
            .intersect_region(&provenance, &region)
            .map(Response::Headers),
        Command::CachedBody(header) => {
            let mut first_error = None;
            for worker in &state.workers {
                match worker.get(&header) {
                    Ok(Some(body)) => return Ok(Response::Body(Some(body))),
                    Ok(None) => {}
                    Err(e) => first_error = first_error.or(Some(e)),
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(Response::Body(None)),
            }
        }
        Command::Rollup {
            inputs,
            keep_columns,
            target_bit_key,
            aggregator,
        } => {
            let (header, body) = builder::rollup(
                &inputs,
                &keep_columns,
                target_bit_key,
                aggregator,
                state.density_threshold,
            )?;
            state.index.add(header.clone())?;
            publish(&state.workers, &header, &body);
            Ok(Response::Rolled(Box::new((header, body))))
        }
        Command::WatchLoad(header) => {
            let (future, promise) = CacheFuture::pending();
            state
                .waiters
                .entry(header.unique_id())
                .or_default()
                .push(promise);
            Ok(Response::LoadWatch(future))
        }
        Command::Shutdown => Ok(Response::Unit),
    }
}

fn handle_event(state: &mut ManagerState, event: Event) -> CoreResult<()> {
    match event {
        Event::LoadSucceeded { segment, body } => {
            let header = segment.to_header();
            state.index.add(header.clone())?;
            if let Some(promises) = state.waiters.remove(&header.unique_id()) {
                for promise in promises {
                    promise.fulfill(());
                }
            }
            // Provider failures do not roll the index back; external
            // consistency is eventual.
            publish(&state.workers, &header, &body);
            Ok(())
        }
        Event::LoadFailed { segment, message } => {
            let header = segment.to_header();
            if let Some(promises) = state.waiters.remove(&header.unique_id()) {
                for promise in promises {
                    promise.fail(ProviderError::failed(message.clone()));
                }
            }
            Ok(())
        }
        Event::SegmentAdd { header, body } => {
            state.index.add(header.clone())?;
            if let Some(body) = body {
                publish(&state.workers, &header, &body);
            }
            Ok(())
        }
        Event::ExternalSegmentCreated(header) => {
            state.index.add(header)?;
            Ok(())
        }
        Event::ExternalSegmentDeleted(header) => state.index.remove(&header),
    }
}

fn publish(workers: &[CacheWorker], header: &SegmentHeader, body: &SegmentBody) {
    for worker in workers {
        if let Err(e) = worker.put(header, body) {
            error!(error = %e, id = %header.unique_id(), "failed to publish segment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn response_queue_out_of_order_retrieval() {
        let queue = Arc::new(ResponseQueue::new());

        let q = Arc::clone(&queue);
        let taker = thread::spawn(move || q.take(2));

        // The response for command 1 arrives first and must be stashed,
        // not handed to the taker of command 2.
        queue.put(1, Ok(Response::Unit));
        queue.put(2, Ok(Response::Unit));

        assert!(matches!(taker.join().unwrap(), Ok(Response::Unit)));
        assert!(matches!(queue.take(1), Ok(Response::Unit)));
    }

    #[test]
    fn response_queue_close_releases_takers() {
        let queue = Arc::new(ResponseQueue::new());
        let q = Arc::clone(&queue);
        let taker = thread::spawn(move || q.take(7));
        thread::sleep(Duration::from_millis(10));
        queue.close();
        assert!(matches!(
            taker.join().unwrap(),
            Err(CoreError::ManagerUnavailable)
        ));
    }
}
