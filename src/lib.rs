pub mod date_util;
pub mod error;
pub mod metrics;
pub mod model;
pub mod offload;
pub mod remote;
pub mod snapshot;
pub mod storage;
pub mod trend;

pub use error::{Error, Result};
pub use metrics::{compute, MetricsResult, ScopedMetrics};
pub use model::{Lookups, NeedKind, Scope, SubStatus, Task};
pub use offload::{Coordinator, Phase, RecomputeTrigger};
pub use remote::RemoteStore;
pub use snapshot::{BucketKey, Snapshot, SnapshotStore, SNAPSHOT_CAPACITY};
pub use storage::Database;
pub use trend::{Trend, TrendDirection, TrendSummary};

use std::sync::Arc;

use chrono::{Local, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use offload::{ComputePayload, ComputeResponse, ComputeWorker};
use storage::repository;

/// One applied refresh round: both scopes' metrics plus the
/// week-over-week trend for the scope the board is showing.
#[derive(Debug, Clone)]
pub struct InsightsUpdate {
    pub metrics: ScopedMetrics,
    pub trend: TrendSummary,
}

/// Main entry point for the insights engine.
///
/// A session owns every piece of state the engine needs: the local
/// database, the optional remote store client, the lookup tables, the
/// weekly snapshot history, the dispatch coordinator, and the background
/// compute unit. Nothing lives in globals; embedders create a session
/// per board and drop it (via [`BoardSession::shutdown`]) when the board
/// closes.
pub struct BoardSession {
    db: Database,
    remote: Option<RemoteStore>,
    lookups: Arc<Lookups>,
    store: SnapshotStore,
    coordinator: Coordinator,
    worker: ComputeWorker,
    responses: UnboundedReceiver<ComputeResponse>,
    persister: JoinHandle<()>,
}

impl BoardSession {
    /// Open a session over an existing database.
    ///
    /// Loads the configured lookups, reads the cached snapshot history,
    /// fetches the remote history when a remote store is configured,
    /// merges the two, and spawns the compute worker and the cache
    /// persister. The remote fetch is best-effort: failures are logged
    /// and the session starts from the local cache alone.
    pub async fn start(db: Database) -> Result<Self> {
        let lookups = db
            .reader()
            .call(|conn| repository::load_lookups(conn))
            .await?;

        let remote = match db
            .reader()
            .call(|conn| repository::get_config(conn, repository::CONFIG_REMOTE_URL))
            .await?
        {
            Some(base) => match RemoteStore::new(&base) {
                Ok(store) => {
                    log::debug!("using remote snapshot store at {}", store.base());
                    Some(store)
                }
                Err(e) => {
                    log::warn!("ignoring configured remote store: {e}");
                    None
                }
            },
            None => None,
        };

        let cached = db
            .reader()
            .call(|conn| repository::read_snapshot_cache(conn))
            .await?;

        let fetched = match &remote {
            Some(store) => match store.fetch().await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    log::warn!("remote snapshot fetch failed: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let (writeback_tx, writeback_rx) = mpsc::unbounded_channel();
        let mut store = SnapshotStore::with_writeback(writeback_tx);
        store.merge(cached, fetched);

        let persister = spawn_persister(db.writer().clone(), writeback_rx);

        let (response_tx, responses) = mpsc::unbounded_channel();
        let worker = ComputeWorker::spawn(response_tx);

        Ok(BoardSession {
            db,
            remote,
            lookups: Arc::new(lookups),
            store,
            coordinator: Coordinator::new(),
            worker,
            responses,
            persister,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    /// The merged weekly history, ascending by capture time.
    pub fn history(&self) -> &[Snapshot] {
        self.store.snapshots()
    }

    /// Result of the most recent applied refresh, if any.
    pub fn insights(&self) -> Option<&ScopedMetrics> {
        self.coordinator.applied()
    }

    /// Run one refresh round for a trigger.
    ///
    /// `all` is the unfiltered task collection; `filtered` carries the
    /// collection matching the board's active filter, or `None` when no
    /// filter is active (both scopes then aggregate the same tasks).
    ///
    /// When the coordinator gates the trigger (changes before the
    /// insights view was first shown, or a repeat view-shown) this
    /// returns `Ok(None)` and nothing is computed. Otherwise the round
    /// dispatches to the background unit, degrades to a synchronous pass
    /// when that unit fails, applies both scopes atomically, records the
    /// unfiltered snapshot for this week (local cache write-back plus
    /// a detached best-effort remote push), and returns the metrics with
    /// the trend for the visible scope. A filtered view always reports
    /// not-comparable trends.
    pub async fn refresh(
        &mut self,
        trigger: RecomputeTrigger,
        all: Vec<Task>,
        filtered: Option<Vec<Task>>,
    ) -> Result<Option<InsightsUpdate>> {
        let now = Utc::now();
        let filter_active = filtered.is_some();

        let all = Arc::new(all);
        let filtered = match filtered {
            Some(tasks) => Arc::new(tasks),
            None => all.clone(),
        };
        let payload = ComputePayload {
            filtered,
            all,
            lookups: self.lookups.clone(),
            today: Local::now().date_naive(),
        };

        let Some(request) = self.coordinator.on_trigger(trigger, payload) else {
            return Ok(None);
        };

        match self.worker.dispatch(request) {
            Ok(()) => self.settle_outstanding().await,
            Err(_) => {
                log::warn!("compute unit unavailable, computing on the session task");
                self.coordinator.fallback();
            }
        }

        let metrics = self
            .coordinator
            .applied()
            .cloned()
            .ok_or_else(|| Error::Other("refresh settled without a result".into()))?;

        let snapshot = Snapshot::from_metrics(&metrics.all, now);
        self.store.upsert(snapshot.clone());
        if let Some(remote) = &self.remote {
            // Detached: the returned result never waits on the network.
            let remote = remote.clone();
            tokio::spawn(async move {
                if let Err(e) = remote.push(&snapshot).await {
                    log::warn!("remote snapshot push failed: {e}");
                }
            });
        }

        let view = if filter_active {
            &metrics.filtered
        } else {
            &metrics.all
        };
        let trend = TrendSummary::against_week_ago(view, &self.store, now, !filter_active);

        Ok(Some(InsightsUpdate { metrics, trend }))
    }

    /// Re-merge the local cache and the remote store into the session's
    /// history. Returns the resulting ordered list.
    ///
    /// Snapshots already held in memory take part in the merge, so a
    /// record whose cache write-back has not landed yet survives.
    pub async fn sync_history(&mut self) -> Result<&[Snapshot]> {
        let cached = self
            .db
            .reader()
            .call(|conn| repository::read_snapshot_cache(conn))
            .await?;
        let mut local = self.store.snapshots().to_vec();
        local.extend(cached);

        let fetched = match &self.remote {
            Some(store) => match store.fetch().await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    log::warn!("remote snapshot fetch failed: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(self.store.merge(local, fetched))
    }

    /// Tear the session down: stop the compute unit and let the cache
    /// persister drain its queue.
    pub async fn shutdown(self) {
        let BoardSession {
            worker,
            persister,
            store,
            responses,
            ..
        } = self;

        drop(responses);
        worker.shutdown().await;

        // Dropping the store closes the write-back channel; the
        // persister writes what is queued and stops.
        drop(store);
        if let Err(e) = persister.await {
            log::warn!("snapshot persister join failed: {e}");
        }
    }

    /// Wait for the response matching the outstanding request, feeding
    /// stale responses to the coordinator for discard along the way.
    async fn settle_outstanding(&mut self) {
        while let Some(response) = self.responses.recv().await {
            if self.coordinator.on_response(response).is_some() {
                return;
            }
        }
        log::warn!("compute unit stopped, computing on the session task");
        self.coordinator.fallback();
    }
}

/// Background task that persists write-back lists to the local cache.
/// Bursts coalesce: when several lists are queued only the newest is
/// written.
fn spawn_persister(
    writer: tokio_rusqlite::Connection,
    mut writeback_rx: UnboundedReceiver<Vec<Snapshot>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(mut snapshots) = writeback_rx.recv().await {
            while let Ok(newer) = writeback_rx.try_recv() {
                snapshots = newer;
            }
            let result = writer
                .call(move |conn| repository::write_snapshot_cache(conn, &snapshots))
                .await;
            if let Err(e) = result {
                log::warn!("snapshot cache write failed: {e}");
            }
        }
        log::debug!("snapshot persister stopped");
    })
}
