//! Sync controller.
//!
//! One controller per registered remote: validates options, installs the
//! Git remote config, owns the retry loop and the live timer, enqueues
//! worker tasks on the store's serialized queue, and dispatches events to
//! subscribers.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{OptionsError, SyncError};
use crate::git;
use crate::options::{
    CombineDbStrategy, MINIMUM_SYNC_INTERVAL, SyncDirection, SyncOptions,
};
use crate::remote::{ProbeTimeouts, RemoteEngine, encode_to_remote_name, is_reachable};
use crate::store::StoreShared;
use crate::types::{SyncResult, TaskLabel, TaskMetadata};

use super::context::WorkerContext;
use super::events::{EventRegistry, HandlerId, SyncEvent, SyncEventHandler, SyncEventKind};
use super::push_worker::push_worker;
use super::sync_worker::sync_worker;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncerState {
    Idle,
    Initializing,
    RunningTask,
    SleepingRetry,
    LiveWaiting,
    Paused,
    Closed,
}

/// Options accepted by [`Syncer::resume`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumeOptions {
    pub interval: Option<u64>,
    pub retry: Option<u32>,
}

enum Classified {
    Recoverable,
    Fatal,
    Combine,
}

/// Synchronizer for one registered remote.
pub struct Syncer {
    ctx: Arc<WorkerContext>,
    store: Weak<StoreShared>,
    events: Arc<EventRegistry>,
    state: Mutex<SyncerState>,
    live: AtomicBool,
    interval: AtomicU64,
    retry: AtomicU32,
    /// Cancels retry sleeps; pause and close zero the retry budget with it.
    interrupt: Mutex<CancellationToken>,
    live_cancel: Mutex<Option<CancellationToken>>,
    /// Deduplicates live-timer ticks while a task is outstanding.
    task_pending: AtomicBool,
    task_seq: AtomicU64,
}

impl Syncer {
    /// Validate options, derive the remote name and install the remote's
    /// Git config.
    pub fn new(
        store: &Arc<StoreShared>,
        options: SyncOptions,
        engine: Arc<dyn RemoteEngine>,
    ) -> Result<Self, SyncError> {
        options.validate()?;
        let remote_name = encode_to_remote_name(&options.remote_url)?;

        install_remote_config(store, &remote_name, &options.remote_url)?;

        let live = options.live;
        let interval = options.interval;
        let retry = options.retry;
        let ctx = Arc::new(WorkerContext {
            working_dir: store.working_dir.clone(),
            remote_name,
            options,
            engine,
            author: store.author.clone(),
            committer: store.committer.clone(),
            schema: store.schema.clone(),
        });

        Ok(Syncer {
            ctx,
            store: Arc::downgrade(store),
            events: Arc::new(EventRegistry::new()),
            state: Mutex::new(SyncerState::Idle),
            live: AtomicBool::new(live),
            interval: AtomicU64::new(interval),
            retry: AtomicU32::new(retry),
            interrupt: Mutex::new(CancellationToken::new()),
            live_cancel: Mutex::new(None),
            task_pending: AtomicBool::new(false),
            task_seq: AtomicU64::new(0),
        })
    }

    /// The stable remote name derived from the remote URL.
    pub fn remote_name(&self) -> &str {
        &self.ctx.remote_name
    }

    /// The remote URL this controller synchronizes with.
    pub fn remote_url(&self) -> &str {
        &self.ctx.options.remote_url
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SyncerState {
        *self.state.lock().unwrap()
    }

    /// Probe the remote and run the initial push or sync.
    ///
    /// Transient probe failures retry up to the configured budget with
    /// `retry_interval` spacing. Exhausting the budget closes the
    /// controller.
    pub async fn init(self: &Arc<Self>) -> Result<SyncResult, SyncError> {
        self.set_state(SyncerState::Initializing);
        let branch = {
            let repo = git::open(&self.ctx.working_dir)?;
            git::current_branch(&repo)?
        };
        let mut attempts = self.retry.load(Ordering::Relaxed) + 1;
        loop {
            // Probe, then fetch once so the tracking ref reflects the
            // remote before the first push-or-sync decision.
            let probed = self
                .ctx
                .engine
                .check_fetch(&self.ctx.working_dir, &self.ctx.options, &self.ctx.remote_name)
                .await;
            let outcome = match probed {
                Ok(true) => {
                    self.ctx
                        .engine
                        .fetch(
                            &self.ctx.working_dir,
                            &self.ctx.options,
                            &self.ctx.remote_name,
                            &branch,
                            &branch,
                        )
                        .await
                }
                Ok(false) => {
                    // Repository creation is delegated to the remote side;
                    // the first push materializes the branch.
                    tracing::warn!(
                        remote = %self.ctx.remote_name,
                        "Remote repository not found; expecting it to be created"
                    );
                    Ok(())
                }
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => break,
                Err(err) if err.is_transient() && attempts > 1 => {
                    attempts -= 1;
                    tracing::warn!(
                        remote = %self.ctx.remote_name,
                        error = %err,
                        attempts_left = attempts,
                        "Probe failed; retrying"
                    );
                    is_reachable(&self.ctx.options.remote_url, ProbeTimeouts::default()).await;
                    if self.sleep_retry_interval().await.is_err() {
                        return Ok(SyncResult::Canceled);
                    }
                }
                Err(err) => {
                    tracing::error!(remote = %self.ctx.remote_name, error = %err, "Init failed");
                    self.close();
                    return Err(err.into());
                }
            }
        }

        let tracking_exists = {
            let repo = git::open(&self.ctx.working_dir)?;
            let branch = git::current_branch(&repo)?;
            git::resolve_tracking(&repo, &self.ctx.remote_name, &branch).is_some()
        };

        let result = if !tracking_exists {
            self.try_push().await?
        } else if self.ctx.options.sync_direction == SyncDirection::Push {
            self.try_push().await?
        } else {
            self.try_sync().await?
        };

        if self.live.load(Ordering::Relaxed) && self.state() != SyncerState::Closed {
            self.start_live_timer();
            self.set_state(SyncerState::LiveWaiting);
        } else {
            self.settle_state();
        }
        Ok(result)
    }

    /// Enqueue one push task and drain retries.
    pub async fn try_push(self: &Arc<Self>) -> Result<SyncResult, SyncError> {
        if self.ctx.options.sync_direction == SyncDirection::Pull {
            return Err(SyncError::PushNotAllowed);
        }
        self.run_with_retries(TaskLabel::Push).await
    }

    /// Enqueue one sync task and drain retries.
    pub async fn try_sync(self: &Arc<Self>) -> Result<SyncResult, SyncError> {
        self.run_with_retries(TaskLabel::Sync).await
    }

    /// Subscribe to an event kind, optionally scoped to a collection path.
    pub fn on(
        &self,
        kind: SyncEventKind,
        handler: SyncEventHandler,
        collection_path: Option<String>,
    ) -> HandlerId {
        self.events.on(kind, handler, collection_path)
    }

    /// Remove a subscription.
    pub fn off(&self, id: HandlerId) {
        self.events.off(id);
    }

    /// Stop the live timer and zero the retry budget of the task in
    /// flight. Idempotent.
    pub fn pause(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap();
            if *state == SyncerState::Closed {
                return;
            }
            std::mem::replace(&mut *state, SyncerState::Paused)
        };
        self.stop_live_timer();
        self.interrupt.lock().unwrap().cancel();
        if previous != SyncerState::Paused {
            tracing::info!(remote = %self.ctx.remote_name, "Paused");
            self.events.emit(&SyncEvent::Paused);
        }
    }

    /// Restart live synchronization after a pause.
    ///
    /// A new interval is validated against the option invariants. Calling
    /// resume on a closed controller does nothing.
    pub fn resume(self: &Arc<Self>, options: ResumeOptions) -> Result<(), SyncError> {
        {
            let state = self.state.lock().unwrap();
            if *state == SyncerState::Closed {
                return Ok(());
            }
        }
        if let Some(interval) = options.interval {
            if interval < MINIMUM_SYNC_INTERVAL {
                return Err(OptionsError::IntervalTooSmall {
                    interval,
                    minimum: MINIMUM_SYNC_INTERVAL,
                }
                .into());
            }
            if interval <= self.ctx.options.retry_interval {
                return Err(OptionsError::SyncIntervalLessThanOrEqualToRetryInterval {
                    interval,
                    retry_interval: self.ctx.options.retry_interval,
                }
                .into());
            }
            self.interval.store(interval, Ordering::Relaxed);
        }
        if let Some(retry) = options.retry {
            self.retry.store(retry, Ordering::Relaxed);
        }

        *self.interrupt.lock().unwrap() = CancellationToken::new();
        self.live.store(true, Ordering::Relaxed);
        self.start_live_timer();

        let previous = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut *state, SyncerState::LiveWaiting)
        };
        if previous != SyncerState::LiveWaiting {
            tracing::info!(remote = %self.ctx.remote_name, "Resumed");
            self.events.emit(&SyncEvent::Active);
        }
        Ok(())
    }

    /// Stop the timer, drop all listeners and deregister from the store.
    /// Idempotent; further `resume` calls are silently ignored.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SyncerState::Closed {
                return;
            }
            *state = SyncerState::Closed;
        }
        self.stop_live_timer();
        self.interrupt.lock().unwrap().cancel();
        self.events.clear();
        if let Some(store) = self.store.upgrade() {
            store.deregister(&self.ctx.remote_name);
        }
        tracing::info!(remote = %self.ctx.remote_name, "Closed");
    }

    // ---- internals ----

    async fn run_with_retries(self: &Arc<Self>, label: TaskLabel) -> Result<SyncResult, SyncError> {
        let store = match self.store.upgrade() {
            Some(store) => store,
            None => return Ok(SyncResult::Canceled),
        };
        let mut counter = self.retry.load(Ordering::Relaxed) + 1;
        loop {
            if self.state() == SyncerState::Closed {
                return Ok(SyncResult::Canceled);
            }

            let task_id = format!(
                "{}#{}",
                self.ctx.remote_name,
                self.task_seq.fetch_add(1, Ordering::Relaxed)
            );
            let task_metadata = TaskMetadata {
                task_id: task_id.clone(),
                collection_path: None,
                label,
            };

            self.task_pending.store(true, Ordering::SeqCst);
            self.set_state(SyncerState::RunningTask);

            let ctx = Arc::clone(&self.ctx);
            let events = Arc::clone(&self.events);
            let start_metadata = task_metadata.clone();
            let handle = store.queue.enqueue(
                task_id,
                label,
                Box::pin(async move {
                    events.emit(&SyncEvent::Start {
                        task_metadata: start_metadata,
                    });
                    match label {
                        TaskLabel::Sync => sync_worker(ctx).await,
                        TaskLabel::Push => push_worker(ctx, false).await,
                    }
                }),
            );
            let outcome = handle.wait().await;
            self.task_pending.store(false, Ordering::SeqCst);

            match outcome {
                Ok(SyncResult::Canceled) => return Ok(SyncResult::Canceled),
                Ok(result) => {
                    self.emit_result_events(&result, &task_metadata);
                    self.settle_state();
                    return Ok(result);
                }
                Err(err) => match self.classify(&err, label) {
                    Classified::Combine => {
                        tracing::warn!(
                            remote = %self.ctx.remote_name,
                            "No merge base; combining databases"
                        );
                        self.events.emit(&SyncEvent::Combine {
                            task_metadata: task_metadata.clone(),
                        });
                        self.events.emit(&SyncEvent::Complete {
                            task_metadata,
                        });
                        self.settle_state();
                        return Ok(SyncResult::CombineDatabase);
                    }
                    Classified::Fatal => {
                        self.emit_error(&err, task_metadata);
                        self.settle_state();
                        return Err(err);
                    }
                    Classified::Recoverable => {
                        counter -= 1;
                        if counter == 0 {
                            tracing::error!(
                                remote = %self.ctx.remote_name,
                                error = %err,
                                "Retries exhausted"
                            );
                            self.emit_error(&err, task_metadata);
                            self.settle_state();
                            return Err(err);
                        }
                        tracing::warn!(
                            remote = %self.ctx.remote_name,
                            error = %err,
                            retries_left = counter,
                            "Recoverable failure; backing off"
                        );
                        self.set_state(SyncerState::SleepingRetry);
                        let reachable = is_reachable(
                            &self.ctx.options.remote_url,
                            ProbeTimeouts::default(),
                        )
                        .await;
                        if !reachable {
                            tracing::warn!(
                                remote = %self.ctx.remote_name,
                                "Remote unreachable; the retry proceeds and counts"
                            );
                        }
                        if self.sleep_retry_interval().await.is_err() {
                            return Ok(SyncResult::Canceled);
                        }
                    }
                },
            }
        }
    }

    /// Sleep `retry_interval`; `Err` means pause or close interrupted it.
    async fn sleep_retry_interval(&self) -> Result<(), ()> {
        let interrupt = self.interrupt.lock().unwrap().clone();
        tokio::select! {
            _ = interrupt.cancelled() => Err(()),
            _ = tokio::time::sleep(Duration::from_millis(self.ctx.options.retry_interval)) => {
                Ok(())
            }
        }
    }

    fn classify(&self, err: &SyncError, label: TaskLabel) -> Classified {
        match err {
            SyncError::NoMergeBaseFound => match self.ctx.options.combine_db_strategy {
                CombineDbStrategy::CombineHeadWithTheirs => Classified::Combine,
                // replace-with-ours is reserved; it behaves like
                // throw-error here.
                CombineDbStrategy::ThrowError | CombineDbStrategy::ReplaceWithOurs => {
                    Classified::Fatal
                }
            },
            // Classification is by name so engine plug-ins interoperate.
            SyncError::Remote(remote) => match remote.name() {
                "NetworkError" | "CannotConnect" => Classified::Recoverable,
                "UnfetchedCommitExists" => match label {
                    TaskLabel::Sync => Classified::Recoverable,
                    TaskLabel::Push => {
                        let push_direction =
                            self.ctx.options.sync_direction == SyncDirection::Push;
                        let replace_with_ours = self.ctx.options.combine_db_strategy
                            == CombineDbStrategy::ReplaceWithOurs;
                        if push_direction && replace_with_ours {
                            Classified::Recoverable
                        } else {
                            Classified::Fatal
                        }
                    }
                },
                _ => Classified::Fatal,
            },
            _ => Classified::Fatal,
        }
    }

    fn emit_result_events(&self, result: &SyncResult, task_metadata: &TaskMetadata) {
        if let Some(changes) = result.changes() {
            let local = changes.local.clone();
            let remote = changes.remote.clone();
            self.events.emit(&SyncEvent::Change {
                result: result.clone(),
                task_metadata: task_metadata.clone(),
            });
            if !local.is_empty() {
                self.events.emit(&SyncEvent::LocalChange {
                    changes: local,
                    task_metadata: task_metadata.clone(),
                });
            }
            if !remote.is_empty() {
                self.events.emit(&SyncEvent::RemoteChange {
                    changes: remote,
                    task_metadata: task_metadata.clone(),
                });
            }
        }
        self.events.emit(&SyncEvent::Complete {
            task_metadata: task_metadata.clone(),
        });
    }

    fn emit_error(&self, err: &SyncError, task_metadata: TaskMetadata) {
        self.events.emit(&SyncEvent::Error {
            message: err.to_string(),
            task_metadata,
        });
    }

    fn start_live_timer(self: &Arc<Self>) {
        let mut live_cancel = self.live_cancel.lock().unwrap();
        if live_cancel.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *live_cancel = Some(token.clone());
        drop(live_cancel);

        let syncer = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let interval = syncer.interval.load(Ordering::Relaxed);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(interval)) => {}
                }
                match syncer.state() {
                    SyncerState::Closed | SyncerState::Paused => break,
                    _ => {}
                }
                // The queue deduplicates: skip ticks while a task is
                // outstanding.
                if syncer.task_pending.load(Ordering::SeqCst) {
                    continue;
                }
                match syncer.try_sync().await {
                    Ok(_) => {
                        syncer.set_state(SyncerState::LiveWaiting);
                    }
                    Err(err) => {
                        tracing::error!(
                            remote = %syncer.ctx.remote_name,
                            error = %err,
                            "Live sync failed; pausing"
                        );
                        syncer.pause();
                        break;
                    }
                }
            }
        });
    }

    fn stop_live_timer(&self) {
        if let Some(token) = self.live_cancel.lock().unwrap().take() {
            token.cancel();
        }
    }

    fn set_state(&self, next: SyncerState) {
        let mut state = self.state.lock().unwrap();
        if *state != SyncerState::Closed {
            *state = next;
        }
    }

    /// Return to the resting state for the current mode.
    fn settle_state(&self) {
        let mut state = self.state.lock().unwrap();
        match *state {
            SyncerState::Closed | SyncerState::Paused => {}
            _ => {
                *state = if self.live.load(Ordering::Relaxed)
                    && self.live_cancel.lock().unwrap().is_some()
                {
                    SyncerState::LiveWaiting
                } else {
                    SyncerState::Idle
                };
            }
        }
    }
}

impl std::fmt::Debug for Syncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syncer")
            .field("remote_name", &self.ctx.remote_name)
            .field("remote_url", &self.ctx.options.remote_url)
            .field("state", &self.state())
            .finish()
    }
}

/// Install `remote.<name>.url` and the fetch refspec, and point `origin`
/// at the URL when unset.
fn install_remote_config(
    store: &Arc<StoreShared>,
    remote_name: &str,
    remote_url: &str,
) -> Result<(), SyncError> {
    let repo = git::open(&store.working_dir)?;
    let mut config = repo.config()?;
    config.set_str(&format!("remote.{remote_name}.url"), remote_url)?;
    config.set_str(
        &format!("remote.{remote_name}.fetch"),
        &format!("+refs/heads/*:refs/remotes/{remote_name}/*"),
    )?;
    let origin_unset = config.get_string("remote.origin.url").is_err();
    if origin_unset {
        config.set_str("remote.origin.url", remote_url)?;
        config.set_str(
            "remote.origin.fetch",
            "+refs/heads/*:refs/remotes/origin/*",
        )?;
    }
    tracing::debug!(remote = %remote_name, url = %remote_url, "Installed remote config");
    Ok(())
}
