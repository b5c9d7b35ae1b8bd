//! Lifecycle of the one analysis currently being streamed.
//!
//! Submission and stream attachment are separate steps. `attach` always
//! replaces the previous channel: the old task is aborted and a generation
//! counter, checked under the same lock that guards the job, ensures that
//! nothing the old channel still has in flight can touch the new job.

use std::sync::{Arc, Mutex, PoisonError};

use clauselens_core::{
    AnalysisJob, AnalysisRequest, AnalysisResult, Finding, StreamEvent, Transition,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AnalysisService, SessionError};

/// Receives state changes of the attached analysis.
///
/// Callbacks run on the channel task while the job is locked. They must not
/// call back into the controller.
pub trait AnalysisObserver: Send + Sync {
    fn on_status(&self, _analysis_id: &str, _message: &str) {}

    fn on_finding_appended(&self, _analysis_id: &str, _finding: &Finding) {}

    fn on_complete(&self, _analysis_id: &str, _result: &AnalysisResult) {}
}

pub struct NoopObserver;

impl AnalysisObserver for NoopObserver {}

#[derive(Default)]
struct Slot {
    generation: u64,
    job: Option<AnalysisJob>,
}

struct Channel {
    analysis_id: String,
    task: JoinHandle<()>,
    joined: bool,
}

pub struct StreamingAnalysisController<S> {
    service: Arc<S>,
    observer: Arc<dyn AnalysisObserver>,
    slot: Arc<Mutex<Slot>>,
    channel: Option<Channel>,
}

impl<S: AnalysisService> StreamingAnalysisController<S> {
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
            observer: Arc::new(NoopObserver),
            slot: Arc::new(Mutex::new(Slot::default())),
            channel: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AnalysisObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate and submit a request. Does not open the stream.
    pub async fn submit(&self, request: &AnalysisRequest) -> Result<String, SessionError> {
        request.validate()?;
        let analysis_id = self.service.create_analysis(request).await?;
        Ok(analysis_id)
    }

    /// Start observing `analysis_id`, closing any channel already open.
    ///
    /// The stream is opened on a background task, so this must be called
    /// within a Tokio runtime. A stream that cannot be opened ends the job
    /// without a result, like any other transport failure.
    pub fn attach(&mut self, analysis_id: &str) {
        let generation = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.generation += 1;
            slot.job = Some(AnalysisJob::new(analysis_id));
            slot.generation
        };
        if let Some(previous) = self.channel.take() {
            info!(
                analysis_id = %previous.analysis_id,
                superseded_by = analysis_id,
                "closing superseded analysis stream"
            );
            previous.task.abort();
        }

        let task = tokio::spawn(pump(
            Arc::clone(&self.service),
            Arc::clone(&self.observer),
            Arc::clone(&self.slot),
            analysis_id.to_string(),
            generation,
        ));
        self.channel = Some(Channel {
            analysis_id: analysis_id.to_string(),
            task,
            joined: false,
        });
    }

    /// Submit, then attach to the new job.
    pub async fn run(&mut self, request: &AnalysisRequest) -> Result<String, SessionError> {
        let analysis_id = self.submit(request).await?;
        self.attach(&analysis_id);
        Ok(analysis_id)
    }

    /// Current state of the attached job.
    pub fn snapshot(&self) -> Option<AnalysisJob> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.job.clone()
    }

    /// Id of the job the controller is attached to.
    pub fn attached(&self) -> Option<&str> {
        self.channel.as_ref().map(|c| c.analysis_id.as_str())
    }

    pub fn is_streaming(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|c| !c.task.is_finished())
    }

    /// Wait for the attached channel to close and return the job as it ended.
    pub async fn wait(&mut self) -> Option<AnalysisJob> {
        if let Some(channel) = self.channel.as_mut()
            && !channel.joined
        {
            let joined = (&mut channel.task).await;
            channel.joined = true;
            if let Err(e) = joined
                && !e.is_cancelled()
            {
                warn!(analysis_id = %channel.analysis_id, error = %e, "analysis stream task failed");
            }
        }
        self.snapshot()
    }
}

impl<S> Drop for StreamingAnalysisController<S> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.task.abort();
        }
    }
}

async fn pump<S: AnalysisService>(
    service: Arc<S>,
    observer: Arc<dyn AnalysisObserver>,
    slot: Arc<Mutex<Slot>>,
    analysis_id: String,
    generation: u64,
) {
    let mut events = match service.open_stream(&analysis_id).await {
        Ok(events) => events,
        Err(e) => {
            warn!(analysis_id = %analysis_id, error = %e, "could not open analysis stream");
            deliver(&slot, observer.as_ref(), generation, StreamEvent::TransportError(e.to_string()));
            return;
        }
    };

    while let Some(event) = events.next().await {
        if !deliver(&slot, observer.as_ref(), generation, event) {
            return;
        }
    }
    deliver(
        &slot,
        observer.as_ref(),
        generation,
        StreamEvent::TransportError("stream ended before a final event".to_string()),
    );
}

/// Apply one event to the job. Returns whether the channel should stay open.
fn deliver(
    slot: &Mutex<Slot>,
    observer: &dyn AnalysisObserver,
    generation: u64,
    event: StreamEvent,
) -> bool {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.generation != generation {
        debug!("dropping event from superseded stream");
        return false;
    }
    let Some(job) = slot.job.as_mut() else {
        return false;
    };

    match job.apply(event) {
        Transition::Ignored => false,
        Transition::StatusChanged { message } => {
            debug!(analysis_id = %job.id(), status = job.status().as_str(), "status");
            if let Some(message) = message {
                observer.on_status(job.id(), &message);
            }
            true
        }
        Transition::FindingAppended(index) => {
            debug!(analysis_id = %job.id(), index, "partial finding");
            observer.on_finding_appended(job.id(), &job.findings()[index]);
            true
        }
        Transition::Completed => {
            info!(
                analysis_id = %job.id(),
                findings = job.findings().len(),
                "analysis completed"
            );
            if let Some(result) = job.result() {
                observer.on_complete(job.id(), result);
            }
            false
        }
        Transition::Stopped => {
            info!(
                analysis_id = %job.id(),
                reason = job.stop_reason().unwrap_or("-"),
                findings = job.findings().len(),
                "analysis stream stopped without a result"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use clauselens_client::{ClientError, EventStream};
    use clauselens_core::{AnalysisKind, AnalysisStatus, RiskLevel, StatusUpdate};
    use futures::channel::mpsc;

    use super::*;

    #[derive(Default)]
    struct FakeService {
        streams: Mutex<HashMap<String, EventStream>>,
        submitted: Mutex<Vec<AnalysisRequest>>,
        reject: bool,
    }

    impl FakeService {
        fn with_stream(self, id: &str, events: Vec<StreamEvent>) -> Self {
            self.streams
                .lock()
                .unwrap()
                .insert(id.to_string(), futures::stream::iter(events).boxed());
            self
        }

        fn with_channel(self, id: &str) -> (Self, mpsc::UnboundedSender<StreamEvent>) {
            let (tx, rx) = mpsc::unbounded();
            self.streams.lock().unwrap().insert(id.to_string(), rx.boxed());
            (self, tx)
        }
    }

    #[async_trait]
    impl AnalysisService for FakeService {
        async fn create_analysis(&self, request: &AnalysisRequest) -> Result<String, ClientError> {
            if self.reject {
                return Err(ClientError::Server {
                    status: 429,
                    body: "rate limited".into(),
                });
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(request.clone());
            Ok(format!("j{}", submitted.len()))
        }

        async fn open_stream(&self, analysis_id: &str) -> Result<EventStream, ClientError> {
            self.streams
                .lock()
                .unwrap()
                .remove(analysis_id)
                .ok_or_else(|| ClientError::Server {
                    status: 404,
                    body: "Analysis not found".into(),
                })
        }
    }

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl AnalysisObserver for Recorder {
        fn on_status(&self, analysis_id: &str, message: &str) {
            self.log.lock().unwrap().push(format!("{analysis_id} status {message}"));
        }

        fn on_finding_appended(&self, analysis_id: &str, finding: &Finding) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{analysis_id} finding {}", finding.clause_type));
        }

        fn on_complete(&self, analysis_id: &str, result: &AnalysisResult) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{analysis_id} complete {}", result.findings.len()));
        }
    }

    fn finding(clause: &str, risk: RiskLevel) -> Finding {
        serde_json::from_value(serde_json::json!({
            "clause_type": clause,
            "risk_level": risk.as_str(),
        }))
        .unwrap()
    }

    fn final_event(findings: Vec<Finding>) -> StreamEvent {
        StreamEvent::Final(AnalysisResult {
            analysis_id: None,
            timestamp: None,
            overall_risk_score: RiskLevel::Medium,
            findings,
            guardrail_warnings: Vec::new(),
            confidence_score: 0.9,
            playbook_version_id: None,
            usage: None,
        })
    }

    async fn until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn request(text: &str) -> AnalysisRequest {
        AnalysisRequest::new(text, AnalysisKind::Risks)
    }

    #[tokio::test]
    async fn empty_document_is_rejected_before_submission() {
        let controller = StreamingAnalysisController::new(FakeService::default());
        let err = controller.submit(&request("   ")).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert!(controller.service.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submission_failure_propagates() {
        let service = FakeService {
            reject: true,
            ..FakeService::default()
        };
        let mut controller = StreamingAnalysisController::new(service);
        let err = controller.run(&request("Term: 12 months")).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Request(ClientError::Server { status: 429, .. })
        ));
        assert!(controller.attached().is_none());
        assert!(controller.snapshot().is_none());
    }

    #[tokio::test]
    async fn submit_does_not_open_a_stream() {
        let controller = StreamingAnalysisController::new(FakeService::default());
        let id = controller.submit(&request("Term: 12 months")).await.unwrap();
        assert_eq!(id, "j1");
        assert!(controller.attached().is_none());
        assert!(!controller.is_streaming());
    }

    #[tokio::test]
    async fn final_replaces_partials_and_closes_channel() {
        let revised = finding("F2", RiskLevel::Critical);
        let service = FakeService::default().with_stream(
            "j1",
            vec![
                StreamEvent::Status(StatusUpdate::new("queued")),
                StreamEvent::PartialFinding(finding("F1", RiskLevel::Low)),
                StreamEvent::PartialFinding(finding("F2", RiskLevel::Medium)),
                final_event(vec![revised.clone()]),
                StreamEvent::PartialFinding(finding("F3", RiskLevel::High)),
                StreamEvent::TransportError("late".into()),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        let mut controller =
            StreamingAnalysisController::new(service).with_observer(recorder.clone());

        controller.attach("j1");
        let job = controller.wait().await.unwrap();

        assert_eq!(job.id(), "j1");
        assert_eq!(job.status(), AnalysisStatus::Completed);
        assert_eq!(job.findings(), [revised]);
        assert!(!controller.is_streaming());
        assert_eq!(
            recorder.entries(),
            [
                "j1 status queued",
                "j1 finding F1",
                "j1 finding F2",
                "j1 complete 1"
            ]
        );
    }

    #[tokio::test]
    async fn run_captures_version_and_streams() {
        let service = FakeService::default().with_stream("j1", vec![final_event(vec![])]);
        let mut controller = StreamingAnalysisController::new(service);

        let req = request("Term: 12 months").with_playbook_version(Some("v2".into()));
        let id = controller.run(&req).await.unwrap();

        assert_eq!(id, "j1");
        assert_eq!(controller.attached(), Some("j1"));
        let job = controller.wait().await.unwrap();
        assert_eq!(job.status(), AnalysisStatus::Completed);
        let submitted = controller.service.submitted.lock().unwrap();
        assert_eq!(submitted[0].playbook_version_id.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn attach_supersedes_previous_channel() {
        let (service, old_tx) = FakeService::default().with_channel("j1");
        let service = service.with_stream(
            "j2",
            vec![
                StreamEvent::PartialFinding(finding("G1", RiskLevel::Low)),
                final_event(vec![finding("G1", RiskLevel::Low)]),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        let mut controller =
            StreamingAnalysisController::new(service).with_observer(recorder.clone());

        controller.attach("j1");
        old_tx
            .unbounded_send(StreamEvent::Status(StatusUpdate::new("running")))
            .unwrap();
        until(|| {
            controller
                .snapshot()
                .is_some_and(|j| j.status() == AnalysisStatus::Running)
        })
        .await;

        controller.attach("j2");
        // The old channel is closed; anything it still delivers is dropped.
        let _ = old_tx.unbounded_send(StreamEvent::PartialFinding(finding("X", RiskLevel::High)));
        let job = controller.wait().await.unwrap();

        assert_eq!(job.id(), "j2");
        assert_eq!(job.status(), AnalysisStatus::Completed);
        assert_eq!(job.findings().len(), 1);
        assert_eq!(job.findings()[0].clause_type, "G1");
        until(|| old_tx.is_closed()).await;
        assert_eq!(
            recorder.entries(),
            ["j1 status running", "j2 finding G1", "j2 complete 1"]
        );
    }

    #[tokio::test]
    async fn attach_replaces_unfinished_job_state() {
        let (service, _tx1) = FakeService::default().with_channel("j1");
        let (service, tx2) = service.with_channel("j2");
        let mut controller = StreamingAnalysisController::new(service);

        controller.attach("j1");
        controller.attach("j2");
        let job = controller.snapshot().unwrap();
        assert_eq!(job.id(), "j2");
        assert_eq!(job.status(), AnalysisStatus::Queued);
        assert!(job.findings().is_empty());

        tx2.unbounded_send(final_event(vec![])).unwrap();
        assert_eq!(controller.wait().await.unwrap().status(), AnalysisStatus::Completed);
    }

    #[tokio::test]
    async fn transport_error_keeps_partials_without_result() {
        let service = FakeService::default().with_stream(
            "j1",
            vec![
                StreamEvent::PartialFinding(finding("F1", RiskLevel::High)),
                StreamEvent::TransportError("connection reset".into()),
                final_event(vec![]),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        let mut controller =
            StreamingAnalysisController::new(service).with_observer(recorder.clone());

        controller.attach("j1");
        let job = controller.wait().await.unwrap();

        assert_eq!(job.status(), AnalysisStatus::Failed);
        assert_eq!(job.findings().len(), 1);
        assert!(job.result().is_none());
        assert_eq!(recorder.entries(), ["j1 finding F1"]);
    }

    #[tokio::test]
    async fn stream_ending_without_final_stops_the_job() {
        let service = FakeService::default().with_stream(
            "j1",
            vec![StreamEvent::Status(StatusUpdate::new("running"))],
        );
        let mut controller = StreamingAnalysisController::new(service);

        controller.attach("j1");
        let job = controller.wait().await.unwrap();

        assert_eq!(job.status(), AnalysisStatus::Failed);
        assert!(job.result().is_none());
        assert!(job.stop_reason().unwrap().contains("ended"));
    }

    #[tokio::test]
    async fn unopenable_stream_stops_the_job() {
        let mut controller = StreamingAnalysisController::new(FakeService::default());

        controller.attach("missing");
        let job = controller.wait().await.unwrap();

        assert_eq!(job.id(), "missing");
        assert_eq!(job.status(), AnalysisStatus::Failed);
        assert!(job.stop_reason().unwrap().contains("404"));
    }
}
