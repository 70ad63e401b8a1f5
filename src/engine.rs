use crate::model::{DiagnosisModel, RequestMetadata};
use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

/// Default upper bound for a single model call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// Type alias to simplify complex types
type EngineReceiver<M> = Mutex<
    mpsc::UnboundedReceiver<
        EngineResponse<
            <<M as DiagnosisModel>::Request as RequestMetadata>::Metadata,
            <M as DiagnosisModel>::Response,
        >,
    >,
>;

/// Represents the current state of the diagnosis engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineState {
    /// The engine is idle and ready to accept new requests.
    Idle,
    /// The engine is currently running a request.
    Processing,
}

impl EngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Processing => "processing",
        }
    }
}

/// Internal request wrapper used by the engine to track requests.
struct EngineRequest<Req> {
    id: u64,
    request: Req,
}

/// How a scheduled job ended.
#[derive(Debug)]
pub enum EngineOutcome<Res> {
    Completed(Res),
    /// The model returned an error or the job ran past the timeout.
    Failed(String),
    Cancelled,
}

/// Response returned by the engine containing both the outcome and telemetry data.
#[derive(Debug)]
pub struct EngineResponse<Metadata, Res> {
    /// Identifier returned by [`DiagnosisEngine::schedule_inference`].
    pub id: u64,
    /// Timestamp when the job started.
    pub start_time: Instant,
    /// Total time taken by the job.
    pub duration: Duration,
    /// Lightweight metadata extracted from the original request.
    pub request_metadata: Metadata,
    pub outcome: EngineOutcome<Res>,
}

/// Result type returned when polling for responses.
pub enum EngineResult<M: DiagnosisModel>
where
    M::Request: RequestMetadata,
{
    /// A finished job, successful or not.
    Success(EngineResponse<<M::Request as RequestMetadata>::Metadata, M::Response>),
    /// No result available yet, with current engine state.
    Empty(EngineState),
    /// The engine itself is gone.
    Error(String),
}

/// Runs model calls on a background tokio task.
///
/// Requests are queued and executed one at a time, each under the configured
/// timeout. Callers never wait on the model: they schedule a job, keep its id
/// and pick the response up later with [`DiagnosisEngine::try_poll_response`].
/// Must be created from within a tokio runtime.
pub struct DiagnosisEngine<M: DiagnosisModel + Send + 'static>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    state: Arc<Mutex<EngineState>>,
    req_tx: Option<mpsc::UnboundedSender<EngineRequest<M::Request>>>,
    rep_rx: EngineReceiver<M>,
    cancel_tx: watch::Sender<u64>,
    worker: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl<M: DiagnosisModel + Send + 'static> DiagnosisEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new engine that moves `model` onto a background task.
    pub fn new(mut model: M, timeout: Duration) -> Self {
        let (req_tx, mut req_rx) = mpsc::unbounded_channel::<EngineRequest<M::Request>>();
        let (rep_tx, rep_rx) = mpsc::unbounded_channel();
        // Every job with an id at or below this value is cancelled. Ids start at 1.
        let (cancel_tx, mut cancel_rx) = watch::channel(0u64);
        let state = Arc::new(Mutex::new(EngineState::Idle));

        let worker = tokio::spawn({
            let state = state.clone();
            async move {
                while let Some(req) = req_rx.recv().await {
                    let request_metadata = req.request.metadata();
                    let start_time = Instant::now();

                    let cancelled = *cancel_rx.borrow_and_update();
                    let outcome = if cancelled >= req.id {
                        log::debug!("Job {} cancelled before it started", req.id);
                        EngineOutcome::Cancelled
                    } else {
                        log::debug!("Running job {}", req.id);
                        *lock(&state) = EngineState::Processing;

                        tokio::select! {
                            result = tokio::time::timeout(timeout, model.run(req.request)) => match result {
                                Ok(Ok(response)) => EngineOutcome::Completed(response),
                                Ok(Err(e)) => {
                                    log::warn!("Job {} failed: {}", req.id, e);
                                    EngineOutcome::Failed(e.to_string())
                                }
                                Err(_) => {
                                    log::warn!("Job {} timed out after {:?}", req.id, timeout);
                                    EngineOutcome::Failed(format!(
                                        "No response from the model within {timeout:?}"
                                    ))
                                }
                            },
                            _ = cancel_rx.wait_for(|cancelled| *cancelled >= req.id) => {
                                log::debug!("Job {} cancelled", req.id);
                                EngineOutcome::Cancelled
                            }
                        }
                    };

                    log::debug!("Job {} finished in {:?}", req.id, start_time.elapsed());

                    let _ = rep_tx.send(EngineResponse {
                        id: req.id,
                        start_time,
                        duration: start_time.elapsed(),
                        request_metadata,
                        outcome,
                    });

                    *lock(&state) = EngineState::Idle;
                }
            }
        });

        Self {
            state,
            req_tx: Some(req_tx),
            rep_rx: Mutex::new(rep_rx),
            cancel_tx,
            worker: Some(worker),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Returns the current state of the engine.
    pub fn state(&self) -> EngineState {
        lock(&self.state).clone()
    }

    /// Attempts to retrieve a finished job without blocking.
    pub fn try_poll_response(&self) -> EngineResult<M> {
        match lock(&self.rep_rx).try_recv() {
            Ok(response) => EngineResult::Success(response),
            Err(mpsc::error::TryRecvError::Empty) => EngineResult::Empty(self.state()),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                log::debug!("Response channel disconnected");
                EngineResult::Error("Response channel disconnected".to_string())
            }
        }
    }

    /// Queues a request and returns the id its response will carry.
    pub fn schedule_inference(&self, request: M::Request) -> u64 {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed) + 1;
        match &self.req_tx {
            Some(tx) if tx.send(EngineRequest { id, request }).is_ok() => {
                log::debug!("Scheduled job {id}");
            }
            _ => log::error!("Engine stopped, job {id} dropped"),
        }
        id
    }

    /// Cancels the job with this id, queued or running, and every older one.
    pub fn cancel(&self, id: u64) {
        self.cancel_tx.send_modify(|cancelled| *cancelled = (*cancelled).max(id));
    }

    /// Closes the request queue and stops the background task.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl<M: DiagnosisModel + Send + 'static> Drop for DiagnosisEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

/// Locks `mutex`, carrying on with the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct FakeError(String);

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl std::error::Error for FakeError {}

    struct FakeRequest {
        text: &'static str,
        delay: Duration,
    }

    impl RequestMetadata for FakeRequest {
        type Metadata = &'static str;

        fn metadata(&self) -> Self::Metadata {
            self.text
        }
    }

    struct FakeModel;

    impl DiagnosisModel for FakeModel {
        type Request = FakeRequest;
        type Response = String;
        type Error = FakeError;

        async fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
            tokio::time::sleep(request.delay).await;
            match request.text {
                "fail" => Err(FakeError("quota exceeded".to_string())),
                text => Ok(text.to_uppercase()),
            }
        }
    }

    fn request(text: &'static str, delay_ms: u64) -> FakeRequest {
        FakeRequest {
            text,
            delay: Duration::from_millis(delay_ms),
        }
    }

    async fn next_response(
        engine: &DiagnosisEngine<FakeModel>,
    ) -> EngineResponse<&'static str, String> {
        loop {
            match engine.try_poll_response() {
                EngineResult::Success(response) => return response,
                EngineResult::Empty(_) => tokio::time::sleep(Duration::from_millis(5)).await,
                EngineResult::Error(e) => panic!("engine error: {e}"),
            }
        }
    }

    #[tokio::test]
    async fn completes_jobs_in_order() {
        let engine = DiagnosisEngine::new(FakeModel, DEFAULT_TIMEOUT);
        assert!(matches!(engine.try_poll_response(), EngineResult::Empty(EngineState::Idle)));

        let first = engine.schedule_inference(request("leaf", 10));
        let second = engine.schedule_inference(request("root", 0));
        assert_eq!((first, second), (1, 2));

        let response = next_response(&engine).await;
        assert_eq!(response.id, 1);
        assert_eq!(response.request_metadata, "leaf");
        assert!(matches!(response.outcome, EngineOutcome::Completed(ref text) if text == "LEAF"));

        let response = next_response(&engine).await;
        assert_eq!(response.id, 2);
    }

    #[tokio::test]
    async fn failure_does_not_stop_the_worker() {
        let engine = DiagnosisEngine::new(FakeModel, DEFAULT_TIMEOUT);
        engine.schedule_inference(request("fail", 0));
        engine.schedule_inference(request("stem", 0));

        let failed = next_response(&engine).await;
        assert!(matches!(failed.outcome, EngineOutcome::Failed(ref m) if m == "quota exceeded"));

        let ok = next_response(&engine).await;
        assert!(matches!(ok.outcome, EngineOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn times_out_slow_jobs() {
        let engine = DiagnosisEngine::new(FakeModel, Duration::from_millis(20));
        engine.schedule_inference(request("slow", 5_000));

        let response = next_response(&engine).await;
        assert!(matches!(
            response.outcome,
            EngineOutcome::Failed(ref m) if m == "No response from the model within 20ms"
        ));
    }

    #[tokio::test]
    async fn cancels_running_and_queued_jobs() {
        let engine = DiagnosisEngine::new(FakeModel, DEFAULT_TIMEOUT);
        let running = engine.schedule_inference(request("slow", 5_000));
        let queued = engine.schedule_inference(request("queued", 0));
        let kept = engine.schedule_inference(request("kept", 0));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.state(), EngineState::Processing);
        engine.cancel(queued);

        let first = next_response(&engine).await;
        assert_eq!(first.id, running);
        assert!(matches!(first.outcome, EngineOutcome::Cancelled));

        let second = next_response(&engine).await;
        assert_eq!(second.id, queued);
        assert!(matches!(second.outcome, EngineOutcome::Cancelled));

        let third = next_response(&engine).await;
        assert_eq!(third.id, kept);
        assert!(matches!(third.outcome, EngineOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn stop_disconnects_the_response_channel() {
        let mut engine = DiagnosisEngine::new(FakeModel, DEFAULT_TIMEOUT);
        engine.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(engine.try_poll_response(), EngineResult::Error(_)));
    }
}
