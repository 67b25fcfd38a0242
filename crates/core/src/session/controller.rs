use crate::analysis::{
    AnalysisProvider, AnalyzerOutcome, AudioSignalAnalyzer, SamplingContext, VideoSignalAnalyzer,
};
use crate::bus::{EventBus, SessionStateChanged};
use crate::capture::{CaptureProvider, DeviceLease};
use crate::clock::{Clock, TokioClock};
use crate::config::SessionConfig;
use crate::metrics::MetricSource;
use crate::report::{SessionReport, SubReport};
use crate::rewards::{self, RewardsSink};
use crate::session::context::RecordingTasks;
use crate::session::{SessionContext, SessionError, SessionId, SessionPhase, SessionState};
use crate::transcription::{TranscriptEvent, TranscriptionProvider};
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Drives one practice session at a time through its lifecycle.
pub struct SessionController<C, A, T> {
    capture: Arc<C>,
    analysis: Arc<A>,
    transcription: Arc<T>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    bus: Option<EventBus>,
    rewards: Option<Arc<dyn RewardsSink>>,
    state: SessionState,
    session: Option<SessionContext>,
}

impl<C, A, T> SessionController<C, A, T>
where
    C: CaptureProvider + 'static,
    A: AnalysisProvider + 'static,
    T: TranscriptionProvider + 'static,
{
    pub fn new(
        capture: Arc<C>,
        analysis: Arc<A>,
        transcription: Arc<T>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            capture,
            analysis,
            transcription,
            clock: Arc::new(TokioClock::new()),
            config,
            bus: None,
            rewards: None,
            state: SessionState::Idle,
            session: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_rewards(mut self, rewards: Arc<dyn RewardsSink>) -> Self {
        self.rewards = Some(rewards);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn session(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(SessionContext::id)
    }

    pub fn report(&self) -> Option<Arc<SessionReport>> {
        match &self.state {
            SessionState::Reported(report) => Some(Arc::clone(report)),
            _ => None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Acquires the microphone and camera. Only valid from `Idle`; a device failure
    /// leaves the controller in `Error` until [`reset`](Self::reset).
    pub async fn start_session(&mut self) -> Result<SessionId, SessionError> {
        self.expect_phase(SessionPhase::Idle, "start a session")?;

        let id = SessionId::new();
        self.session = Some(SessionContext::new(id, self.clock.now()));
        self.transition(SessionState::RequestingDevices);

        match self.capture.request_streams().await {
            Ok((audio, video)) => {
                let capture: Arc<dyn CaptureProvider> = self.capture.clone();
                let lease = DeviceLease::new(capture, [audio.id(), video.id()]);
                tracing::debug!(
                    session_id = %id,
                    microphone = audio.label(),
                    camera = video.label(),
                    "devices acquired"
                );
                if let Some(session) = self.session.as_mut() {
                    session.acquired(lease, audio, video);
                }
                self.transition(SessionState::Ready);
                Ok(id)
            }
            Err(e) => {
                let err = SessionError::from(e);
                tracing::error!(session_id = %id, error = %err, "could not acquire devices");
                self.transition(SessionState::Error(err.clone()));
                Err(err)
            }
        }
    }

    /// Starts both analyzers. Must be called from inside a tokio runtime. A track that
    /// already ended while the session sat in `Ready` moves it to `Error` instead.
    pub fn start_recording(&mut self) -> Result<(), SessionError> {
        self.expect_phase(SessionPhase::Ready, "start recording")?;
        let invalid = SessionError::InvalidStateTransition {
            from: SessionPhase::Ready,
            operation: "start recording",
        };
        let session = self.session.as_mut().ok_or_else(|| invalid.clone())?;
        let (audio, video) = session.take_streams().ok_or(invalid)?;
        let id = session.id();

        if !audio.is_live() || !video.is_live() {
            let lost = match (audio.is_live(), video.is_live()) {
                (false, false) => "microphone and camera tracks",
                (false, true) => "microphone track",
                _ => "camera track",
            };
            drop((audio, video));
            session.release_devices();
            let err = SessionError::DeviceUnavailable(format!("{lost} ended before recording"));
            tracing::error!(session_id = %id, error = %err, "cannot start recording");
            self.transition(SessionState::Error(err.clone()));
            return Err(err);
        }

        let transcript = subscribe_transcript(self.transcription.as_ref(), id);
        let (stop, stop_rx) = watch::channel(false);
        let ctx = SamplingContext::new(id, Arc::clone(&self.clock), stop_rx, self.bus.clone());

        let voice = AudioSignalAnalyzer::new(Arc::clone(&self.analysis), transcript, &self.config);
        let facial = VideoSignalAnalyzer::new(Arc::clone(&self.analysis), &self.config);
        let audio_task = tokio::spawn(voice.run(audio, ctx.clone()));
        let video_task = tokio::spawn(facial.run(video, ctx));

        session.recording = Some(RecordingTasks::new(
            stop,
            audio_task,
            video_task,
            self.clock.now(),
        ));
        self.transition(SessionState::Recording);
        Ok(())
    }

    /// Stops both analyzers, waits for their sub-reports up to the join timeout and
    /// builds the session report. Returns `Ok(None)` when the session was already
    /// stopped.
    ///
    /// Dropping the returned future while it waits leaves the session in `Analyzing`;
    /// the next call picks the wait up again with a fresh deadline. When both tracks
    /// ended during the recording there is nothing left to report on and the session
    /// moves to `Error`.
    pub async fn stop_recording(&mut self) -> Result<Option<Arc<SessionReport>>, SessionError> {
        let joining = self
            .session
            .as_ref()
            .is_some_and(|s| s.recording.is_some());
        match self.phase() {
            SessionPhase::Recording if joining => {
                if let Some(tasks) = self.session.as_ref().and_then(|s| s.recording.as_ref()) {
                    let _ = tasks.stop.send(true);
                }
                self.transition(SessionState::Analyzing);
            }
            SessionPhase::Analyzing if joining => {
                tracing::info!(session_id = ?self.session_id(), "resuming interrupted analysis");
            }
            SessionPhase::Analyzing | SessionPhase::Reported => {
                tracing::debug!(session_id = ?self.session_id(), "recording already stopped");
                return Ok(None);
            }
            from => {
                return Err(SessionError::InvalidStateTransition {
                    from,
                    operation: "stop recording",
                })
            }
        }

        let analyzing = SessionError::InvalidStateTransition {
            from: SessionPhase::Analyzing,
            operation: "stop recording",
        };
        let deadline = Instant::now() + self.config.join_timeout;
        let tasks = self
            .session
            .as_mut()
            .and_then(|s| s.recording.as_mut())
            .ok_or_else(|| analyzing.clone())?;
        if tasks.voice.is_none() {
            let outcome = join_analyzer(&mut tasks.audio, deadline, MetricSource::Audio).await;
            tasks.voice = Some(outcome);
        }
        if tasks.facial.is_none() {
            let outcome = join_analyzer(&mut tasks.video, deadline, MetricSource::Video).await;
            tasks.facial = Some(outcome);
        }
        let started_at = tasks.started_at;
        let (Some(voice), Some(facial)) = (tasks.voice.take(), tasks.facial.take()) else {
            return Err(analyzing);
        };

        let now = self.clock.now();
        let recorded_for = now.saturating_sub(started_at);
        let session = self.session.as_mut().ok_or(analyzing)?;
        session.recording = None;
        session.mark_stopped(now);
        session.release_devices();
        let id = session.id();

        if voice.track_lost && facial.track_lost {
            let err = SessionError::DeviceUnavailable(
                "microphone and camera tracks ended during recording".to_owned(),
            );
            tracing::error!(session_id = %id, error = %err, "no device left to report on");
            self.transition(SessionState::Error(err.clone()));
            return Err(err);
        }

        let report = Arc::new(SessionReport::assemble(
            id,
            voice.report,
            facial.report,
            &self.config.weights.balance,
            voice.track_lost || facial.track_lost,
            recorded_for,
        ));
        tracing::info!(
            session_id = %id,
            overall = report.combined.overall_score,
            partial = report.partial,
            secs = recorded_for.as_secs_f64(),
            "session report ready"
        );

        if let Some(sink) = &self.rewards {
            rewards::deliver(&report, sink.as_ref());
        }
        self.transition(SessionState::Reported(Arc::clone(&report)));
        Ok(Some(report))
    }

    /// Tears the current session down from any state: aborts the analyzers, releases
    /// the devices and returns to `Idle`. Any collected data is discarded.
    pub fn reset(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::debug!(session_id = %session.id(), "closing session");
            session.close();
        }
        if self.phase() != SessionPhase::Idle {
            self.transition(SessionState::Idle);
        }
    }

    pub fn stop_session(&mut self) {
        self.reset();
    }

    fn expect_phase(
        &self,
        expected: SessionPhase,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        let from = self.phase();
        if from == expected {
            return Ok(());
        }
        let err = SessionError::InvalidStateTransition { from, operation };
        tracing::warn!(error = %err, "rejected session operation");
        Err(err)
    }

    fn transition(&mut self, next: SessionState) {
        let from = self.state.phase();
        let to = next.phase();
        let report = match &next {
            SessionState::Reported(report) => Some(Arc::clone(report)),
            _ => None,
        };
        let session_id = self.session_id();
        tracing::info!(session_id = ?session_id, %from, %to, "session state changed");
        self.state = next;
        if let Some(bus) = &self.bus {
            bus.publish_state(SessionStateChanged {
                session_id,
                from,
                to,
                report,
            });
        }
    }
}

fn subscribe_transcript<T>(
    transcription: &T,
    session_id: SessionId,
) -> Option<BoxStream<'static, TranscriptEvent>>
where
    T: TranscriptionProvider + ?Sized,
{
    let result = if transcription.is_available() {
        transcription
            .subscribe()
            .map_err(|_| SessionError::TranscriptionUnavailable)
    } else {
        Err(SessionError::TranscriptionUnavailable)
    };
    match result {
        Ok(stream) => Some(stream),
        Err(err) => {
            tracing::warn!(%session_id, error = %err, "continuing with volume-only voice analysis");
            None
        }
    }
}

/// Waits for one analyzer until `deadline`. A late or failed analyzer is aborted and
/// stands in as a missing sub-report, which marks the session report partial.
async fn join_analyzer(
    task: &mut JoinHandle<AnalyzerOutcome>,
    deadline: Instant,
    analyzer: MetricSource,
) -> AnalyzerOutcome {
    let missing = |note: &str| AnalyzerOutcome {
        report: SubReport::missing(analyzer, note),
        track_lost: false,
    };
    match tokio::time::timeout_at(deadline, &mut *task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::error!(?analyzer, error = %e, "analyzer task failed");
            missing("analysis failed")
        }
        Err(_) => {
            task.abort();
            let err = SessionError::AnalysisJoinTimeout { analyzer };
            tracing::warn!(error = %err, "proceeding without late analyzer");
            missing("analysis did not finish in time")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::SlowProvider;
    use crate::analysis::SimulatedAnalysisProvider;
    use crate::bus::BusSubscriptions;
    use crate::capture::{DeviceError, SimulatedCapture, StreamId};
    use crate::metrics::Metric;
    use crate::report::Reliability;
    use crate::rewards::SPEAKING_MASTER;
    use crate::transcription::{ScriptedTranscription, UnavailableTranscription, UtteranceSignals};
    use std::sync::Mutex;
    use std::time::Duration;

    type Controller<T> = SessionController<SimulatedCapture, SimulatedAnalysisProvider, T>;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn script() -> ScriptedTranscription {
        let signals = UtteranceSignals {
            confidence: 85.0,
            clarity: 80.0,
            enthusiasm: 75.0,
        };
        ScriptedTranscription::new(vec![
            TranscriptEvent::final_text("good morning everyone", secs(2)).with_signals(signals),
            TranscriptEvent::interim("today", secs(4)),
            TranscriptEvent::final_text("today I want to share three ideas", secs(5))
                .with_signals(signals),
            TranscriptEvent::final_text("the first one is simple", secs(12)).with_signals(signals),
        ])
    }

    fn controller_with<T: TranscriptionProvider + 'static>(
        capture: Arc<SimulatedCapture>,
        transcription: T,
    ) -> Controller<T> {
        SessionController::new(
            capture,
            Arc::new(SimulatedAnalysisProvider::new(17)),
            Arc::new(transcription),
            SessionConfig::default(),
        )
        .unwrap()
    }

    fn drain_states(subs: &mut BusSubscriptions) -> Vec<SessionStateChanged> {
        let mut out = Vec::new();
        while let Ok(msg) = subs.states.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn full_session_produces_one_report() {
        let capture = Arc::new(SimulatedCapture::new());
        let (bus, mut subs) = EventBus::new(4096);
        let mut controller = controller_with(capture.clone(), script()).with_bus(bus);

        controller.start_session().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::Ready);
        controller.start_recording().unwrap();
        tokio::time::sleep(secs(20)).await;

        let report = controller.stop_recording().await.unwrap().expect("first stop");
        assert_eq!(controller.phase(), SessionPhase::Reported);
        assert!(!report.partial);
        assert_eq!(report.voice.reliability, Reliability::Full);
        assert_eq!(report.voice.metric(Metric::PauseFrequency), Some(2.0));
        assert_eq!(report.voice.metric(Metric::Confidence), Some(85.0));
        assert!(report.combined.overall_score <= 100);

        assert_eq!(controller.stop_recording().await.unwrap(), None);
        assert_eq!(controller.report(), Some(report.clone()));

        let states = drain_states(&mut subs);
        let phases: Vec<_> = states.iter().map(|s| s.to).collect();
        assert_eq!(
            phases,
            vec![
                SessionPhase::RequestingDevices,
                SessionPhase::Ready,
                SessionPhase::Recording,
                SessionPhase::Analyzing,
                SessionPhase::Reported,
            ]
        );
        assert_eq!(states.iter().filter(|s| s.report.is_some()).count(), 1);
        assert!(subs.snapshots.try_recv().is_ok());
        assert_eq!(capture.released().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_session_from_ready_returns_to_idle_without_report() {
        let capture = Arc::new(SimulatedCapture::new());
        let mut controller = controller_with(capture.clone(), script());

        controller.start_session().await.unwrap();
        controller.stop_session();

        assert_eq!(controller.phase(), SessionPhase::Idle);
        assert!(controller.report().is_none());
        assert!(controller.session().is_none());
        assert_eq!(capture.released(), vec![StreamId(1), StreamId(2)]);
    }

    #[tokio::test]
    async fn permission_denied_is_fatal_until_reset() {
        let capture = Arc::new(SimulatedCapture::failing(DeviceError::PermissionDenied));
        let mut controller = controller_with(capture, script());

        let err = controller.start_session().await.unwrap_err();
        assert_eq!(err, SessionError::DevicePermissionDenied);
        assert_eq!(
            controller.state(),
            &SessionState::Error(SessionError::DevicePermissionDenied)
        );
        assert!(controller.report().is_none());

        // a retry without reset is rejected
        assert!(matches!(
            controller.start_session().await,
            Err(SessionError::InvalidStateTransition {
                from: SessionPhase::Error,
                ..
            })
        ));

        controller.reset();
        assert_eq!(controller.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn invalid_transitions_leave_state_alone() {
        let mut controller = controller_with(Arc::new(SimulatedCapture::new()), script());

        let err = controller.start_recording().unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidStateTransition {
                from: SessionPhase::Idle,
                operation: "start recording",
            }
        );
        assert!(controller.stop_recording().await.is_err());
        assert_eq!(controller.phase(), SessionPhase::Idle);

        controller.start_session().await.unwrap();
        assert!(controller.stop_recording().await.is_err());
        assert_eq!(controller.phase(), SessionPhase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn video_loss_mid_recording_gives_partial_report() {
        let capture = Arc::new(SimulatedCapture::new());
        let mut controller = controller_with(capture.clone(), script());
        controller.start_session().await.unwrap();
        controller.start_recording().unwrap();

        let unplug = capture.clone();
        tokio::spawn(async move {
            tokio::time::sleep(secs(10)).await;
            unplug.end_video_track();
        });
        tokio::time::sleep(secs(30)).await;

        let report = controller.stop_recording().await.unwrap().unwrap();
        assert!(report.partial);

        let facial_last = report.facial.coverage.last.unwrap();
        assert!(facial_last <= secs(10));
        assert!(facial_last >= Duration::from_millis(9_900));
        assert_eq!(report.facial.reliability, Reliability::Reduced);

        let voice_last = report.voice.coverage.last.unwrap();
        assert!(voice_last >= Duration::from_millis(29_900));
        assert_eq!(report.recorded_for, secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn track_ended_while_ready_is_an_error() {
        let capture = Arc::new(SimulatedCapture::new());
        let mut controller = controller_with(capture.clone(), script());
        controller.start_session().await.unwrap();
        capture.end_video_track();

        let err = controller.start_recording().unwrap_err();
        assert_eq!(
            err,
            SessionError::DeviceUnavailable("camera track ended before recording".into())
        );
        assert_eq!(controller.state(), &SessionState::Error(err));
        assert_eq!(capture.released(), vec![StreamId(1), StreamId(2)]);

        controller.reset();
        assert_eq!(controller.phase(), SessionPhase::Idle);
        assert_eq!(capture.released().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn losing_both_tracks_while_recording_is_an_error() {
        let capture = Arc::new(SimulatedCapture::new());
        let mut controller = controller_with(capture.clone(), script());
        controller.start_session().await.unwrap();
        controller.start_recording().unwrap();

        let unplug = capture.clone();
        tokio::spawn(async move {
            tokio::time::sleep(secs(5)).await;
            unplug.end_audio_track();
            unplug.end_video_track();
        });
        tokio::time::sleep(secs(10)).await;

        let err = controller.stop_recording().await.unwrap_err();
        assert!(matches!(err, SessionError::DeviceUnavailable(_)));
        assert_eq!(controller.phase(), SessionPhase::Error);
        assert!(controller.report().is_none());
        assert_eq!(capture.released().len(), 2);

        controller.reset();
        assert_eq!(controller.phase(), SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_stop_resumes_on_next_call() {
        // each camera frame takes 300 ms, so one is always in flight when stop arrives
        let provider = SlowProvider::new(Duration::ZERO, Duration::from_millis(300));
        let mut controller = SessionController::new(
            Arc::new(SimulatedCapture::new()),
            Arc::new(provider),
            Arc::new(script()),
            SessionConfig::default(),
        )
        .unwrap();
        controller.start_session().await.unwrap();
        controller.start_recording().unwrap();
        tokio::time::sleep(secs(2)).await;

        let interrupted =
            tokio::time::timeout(Duration::from_millis(50), controller.stop_recording()).await;
        assert!(interrupted.is_err());
        assert_eq!(controller.phase(), SessionPhase::Analyzing);

        let report = controller
            .stop_recording()
            .await
            .unwrap()
            .expect("resumed stop builds the report");
        assert!(!report.partial);
        assert_eq!(report.facial.reliability, Reliability::Full);
        assert_eq!(controller.phase(), SessionPhase::Reported);
        assert_eq!(controller.stop_recording().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_transcription_degrades_voice_only() {
        let capture = Arc::new(SimulatedCapture::new());
        let mut controller = controller_with(capture, UnavailableTranscription);
        controller.start_session().await.unwrap();
        controller.start_recording().unwrap();
        tokio::time::sleep(secs(5)).await;

        let report = controller.stop_recording().await.unwrap().unwrap();
        assert_eq!(report.voice.reliability, Reliability::Reduced);
        assert!(report.voice.metric(Metric::WordsPerMinute).is_none());
        assert!(report.voice.metric(Metric::VolumeLevel).is_some());
        assert_eq!(report.facial.reliability, Reliability::Full);
        // confidence comes from the facial side alone
        assert_eq!(
            f64::from(report.combined.confidence),
            report.facial.metric(Metric::Confidence).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_while_recording_releases_devices() {
        let capture = Arc::new(SimulatedCapture::new());
        let mut controller = controller_with(capture.clone(), script());
        controller.start_session().await.unwrap();
        controller.start_recording().unwrap();
        tokio::time::sleep(secs(1)).await;

        controller.reset();
        assert_eq!(controller.phase(), SessionPhase::Idle);
        assert_eq!(capture.released().len(), 2);

        // a new session starts cleanly
        controller.start_session().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn late_analyzer_is_replaced_by_missing_report() {
        let mut task: JoinHandle<AnalyzerOutcome> = tokio::spawn(futures::future::pending());
        let deadline = Instant::now() + secs(5);

        let outcome = join_analyzer(&mut task, deadline, MetricSource::Video).await;
        assert!(!outcome.track_lost);
        assert_eq!(outcome.report.reliability, Reliability::Missing);
        assert_eq!(Instant::now(), deadline);
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl RewardsSink for RecordingSink {
        fn on_experience_gained(&self, points: u32) {
            self.events.lock().unwrap().push(format!("xp {points}"));
        }

        fn on_achievement_unlocked(&self, name: &str) {
            self.events.lock().unwrap().push(name.to_owned());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rewards_delivered_once_per_report() {
        let sink = Arc::new(RecordingSink::default());
        let mut controller = controller_with(Arc::new(SimulatedCapture::new()), script())
            .with_rewards(sink.clone());
        controller.start_session().await.unwrap();
        controller.start_recording().unwrap();
        tokio::time::sleep(secs(3)).await;
        let report = controller.stop_recording().await.unwrap().unwrap();
        controller.stop_recording().await.unwrap();

        let events = sink.events.lock().unwrap().clone();
        let expected_xp = u32::from(report.combined.overall_score) / 10 + 25;
        assert_eq!(events[0], format!("xp {expected_xp}"));
        assert_eq!(events.iter().filter(|e| e.starts_with("xp")).count(), 1);
        if report.combined.overall_score >= 90 {
            assert!(events.iter().any(|e| e == SPEAKING_MASTER));
        }
    }
}
