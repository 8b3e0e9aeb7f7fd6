pub mod worker;

pub use worker::ComputeWorker;

use std::sync::Arc;

use chrono::NaiveDate;

use crate::metrics::{self, ScopedMetrics};
use crate::model::{Lookups, Task};

/// Discrete events that can require a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeTrigger {
    /// The task collection changed.
    DataChanged,
    /// The active filter changed.
    FilterChanged,
    /// The insights view became visible.
    ViewShown,
}

/// Everything one compute request needs: both scopes' task collections
/// plus the lookup tables, shared immutably so the same payload serves
/// the background unit and the synchronous fallback.
#[derive(Debug, Clone)]
pub struct ComputePayload {
    pub filtered: Arc<Vec<Task>>,
    pub all: Arc<Vec<Task>>,
    pub lookups: Arc<Lookups>,
    pub today: NaiveDate,
}

impl ComputePayload {
    /// Aggregate both scopes. Filtered and unfiltered results always
    /// travel together so they can be applied atomically.
    pub fn run(&self) -> ScopedMetrics {
        ScopedMetrics {
            filtered: metrics::compute(&self.filtered, &self.lookups, self.today),
            all: metrics::compute(&self.all, &self.lookups, self.today),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputeRequest {
    pub request_id: u64,
    pub payload: ComputePayload,
}

#[derive(Debug)]
pub struct ComputeResponse {
    pub request_id: u64,
    pub outcome: Result<ScopedMetrics, String>,
}

/// Where the coordinator currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No computation requested yet this session.
    Idle,
    /// A request with this identifier is outstanding.
    Dispatched(u64),
    /// The background unit failed; computing on the calling thread.
    FallbackComputing,
    /// A result has been applied and nothing is outstanding.
    Settled,
}

/// Decides when to recompute and which responses count.
///
/// Request identifiers are allocated from a monotonic counter and never
/// reused; a response is applied only when its identifier matches the
/// one currently outstanding, which is the sole ordering mechanism.
/// There is no cancellation message: a superseded request is computed
/// anyway and its response simply fails the identifier check. The
/// payload of the outstanding request is retained so a worker failure
/// can degrade to a synchronous pass over the same data.
#[derive(Debug)]
pub struct Coordinator {
    phase: Phase,
    next_request_id: u64,
    insights_seen: bool,
    pending: Option<ComputeRequest>,
    applied: Option<ScopedMetrics>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Coordinator {
            phase: Phase::Idle,
            next_request_id: 1,
            insights_seen: false,
            pending: None,
            applied: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Result of the most recent applied computation.
    pub fn applied(&self) -> Option<&ScopedMetrics> {
        self.applied.as_ref()
    }

    /// Feed in a trigger. Returns the request to hand to the compute
    /// unit when the trigger warrants a dispatch.
    ///
    /// The first view-shown trigger always dispatches; data and filter
    /// changes dispatch only once the view has been shown. A repeat
    /// view-shown trigger is a no-op since changes while the view was
    /// hidden already dispatched.
    pub fn on_trigger(
        &mut self,
        trigger: RecomputeTrigger,
        payload: ComputePayload,
    ) -> Option<ComputeRequest> {
        let should_dispatch = match trigger {
            RecomputeTrigger::ViewShown => {
                let first = !self.insights_seen;
                self.insights_seen = true;
                first
            }
            RecomputeTrigger::DataChanged | RecomputeTrigger::FilterChanged => self.insights_seen,
        };
        if !should_dispatch {
            return None;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = ComputeRequest {
            request_id,
            payload,
        };
        self.pending = Some(request.clone());
        self.phase = Phase::Dispatched(request_id);
        log::debug!("dispatching compute request {request_id} ({trigger:?})");
        Some(request)
    }

    /// Feed in a compute-unit response. Returns the applied result, or
    /// None when the response was stale and discarded.
    ///
    /// An error response from a live worker is not surfaced: the
    /// retained payload is recomputed synchronously instead.
    pub fn on_response(&mut self, response: ComputeResponse) -> Option<&ScopedMetrics> {
        match self.phase() {
            Phase::Dispatched(outstanding) if response.request_id == outstanding => {
                match response.outcome {
                    Ok(result) => {
                        self.settle(result);
                        self.applied.as_ref()
                    }
                    Err(message) => {
                        log::warn!(
                            "compute request {} failed ({message}), falling back",
                            response.request_id
                        );
                        self.run_fallback()
                    }
                }
            }
            _ => {
                // Expected protocol behavior for superseded requests,
                // not a failure.
                log::trace!("discarding stale response {}", response.request_id);
                None
            }
        }
    }

    /// Compute the outstanding request synchronously on the calling
    /// thread. Used when the compute unit cannot be reached at all.
    pub fn fallback(&mut self) -> Option<&ScopedMetrics> {
        match self.phase() {
            Phase::Dispatched(_) => self.run_fallback(),
            _ => None,
        }
    }

    fn run_fallback(&mut self) -> Option<&ScopedMetrics> {
        let pending = self.pending.take()?;
        self.phase = Phase::FallbackComputing;
        let result = pending.payload.run();
        self.settle(result);
        self.applied.as_ref()
    }

    fn settle(&mut self, result: ScopedMetrics) {
        self.applied = Some(result);
        self.pending = None;
        self.phase = Phase::Settled;
    }
}
