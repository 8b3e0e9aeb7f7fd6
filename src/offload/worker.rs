use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ComputeRequest, ComputeResponse};

/// Handle to the one background compute unit of a session.
///
/// The unit is stateless between calls: each request carries its full
/// payload and produces one response on the shared response channel.
/// Requests are processed in arrival order and are never cancelled
/// mid-flight; a superseded request still computes and its response is
/// filtered out by the coordinator.
#[derive(Debug)]
pub struct ComputeWorker {
    requests: UnboundedSender<ComputeRequest>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ComputeWorker {
    /// Spawn the worker task. Responses go to `responses`.
    pub fn spawn(responses: UnboundedSender<ComputeResponse>) -> Self {
        let (requests, mut request_rx) = mpsc::unbounded_channel::<ComputeRequest>();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        log::debug!("compute worker shutting down");
                        break;
                    }
                    request = request_rx.recv() => {
                        let Some(request) = request else { break };
                        let request_id = request.request_id;
                        log::trace!("compute worker handling request {request_id}");
                        let response = ComputeResponse {
                            request_id,
                            outcome: Ok(request.payload.run()),
                        };
                        if responses.send(response).is_err() {
                            log::debug!("response channel closed, stopping worker");
                            break;
                        }
                    }
                }
            }
        });

        ComputeWorker {
            requests,
            cancel,
            handle: Some(handle),
        }
    }

    /// Hand a request to the worker. On failure the request comes back
    /// so the caller can compute it synchronously instead.
    pub fn dispatch(&self, request: ComputeRequest) -> Result<(), ComputeRequest> {
        self.requests.send(request).map_err(|e| e.0)
    }

    /// Tear the worker down and wait for it to stop.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("compute worker join failed: {e}");
            }
        }
    }
}

impl Drop for ComputeWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Lookups, SubStatus, Task};
    use crate::offload::ComputePayload;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn request(request_id: u64, task_count: usize) -> ComputeRequest {
        let tasks: Vec<Task> = (0..task_count)
            .map(|i| Task {
                id: format!("t{i}"),
                status: "pending".to_string(),
                substatus: SubStatus::OnTrack,
                need: None,
                assignee_id: None,
                assignee_label: None,
                due_on: None,
            })
            .collect();
        ComputeRequest {
            request_id,
            payload: ComputePayload {
                filtered: Arc::new(tasks.clone()),
                all: Arc::new(tasks),
                lookups: Arc::new(Lookups::default()),
                today: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = ComputeWorker::spawn(tx);

        worker.dispatch(request(1, 4)).unwrap();
        let response = rx.recv().await.expect("worker replies");

        assert_eq!(response.request_id, 1);
        let result = response.outcome.expect("compute succeeds");
        assert_eq!(result.all.total, 4);
        assert_eq!(result.filtered.total, 4);

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_requests_processed_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = ComputeWorker::spawn(tx);

        worker.dispatch(request(1, 1)).unwrap();
        worker.dispatch(request(2, 2)).unwrap();
        worker.dispatch(request(3, 3)).unwrap();

        for expected in 1..=3u64 {
            let response = rx.recv().await.expect("worker replies");
            assert_eq!(response.request_id, expected);
        }

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_returns_request() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let worker = ComputeWorker::spawn(tx);

        let requests = worker.requests.clone();
        worker.shutdown().await;

        let rejected = requests.send(request(9, 1));
        let returned = rejected.expect_err("worker gone").0;
        assert_eq!(returned.request_id, 9);
    }

    #[tokio::test]
    async fn test_worker_stops_when_response_channel_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut worker = ComputeWorker::spawn(tx);
        drop(rx);

        // First request may race the closed-channel detection; the task
        // must still terminate rather than spin.
        let _ = worker.dispatch(request(1, 1));
        if let Some(handle) = worker.handle.take() {
            handle.await.unwrap();
        }
    }
}
