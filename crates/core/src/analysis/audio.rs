//! Voice analysis: microphone ticks into a rolling window, finalized utterances into
//! pace, filler and pause counts.

use crate::analysis::{AnalysisProvider, AnalyzerOutcome, AudioTick, SamplingContext};
use crate::capture::AudioHandle;
use crate::config::{SessionConfig, VoiceWeights};
use crate::feedback::FeedbackGenerator;
use crate::metrics::{
    clamp_percent, rounded, weighted_percent, Metric, MetricSnapshot, MetricSource, MetricTotals,
    MetricValues,
};
use crate::report::{Coverage, SubReport, SubReportDetail};
use crate::transcription::TranscriptEvent;
use crate::util::{RollingWindow, WindowError};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Matched case-insensitively as substrings, each counted at most once per utterance.
pub const FILLER_WORDS: [&str; 7] = ["um", "uh", "like", "you know", "so", "well", "actually"];

/// Volume at or above this level counts as fully adequate.
const ADEQUATE_VOLUME: f64 = 50.0;
const FILLER_PENALTY_PER_WORD: f64 = 10.0;

#[derive(Clone, Copy, Debug, Default)]
struct SignalTotals {
    confidence: f64,
    clarity: f64,
    enthusiasm: f64,
    utterances: usize,
}

/// Single-writer state of the voice analyzer. Only read when the recording is finalized.
#[derive(Debug)]
pub struct VoiceAccumulator {
    window: RollingWindow<MetricSnapshot>,
    totals: MetricTotals,
    coverage: Coverage,
    pause_threshold: Duration,
    weights: VoiceWeights,
    feedback: FeedbackGenerator,
    transcribing: bool,
    transcript: Vec<String>,
    words: usize,
    fillers: Vec<String>,
    pauses: u32,
    silence: Duration,
    last_final: Option<Duration>,
    signals: SignalTotals,
}

impl VoiceAccumulator {
    pub fn new(config: &SessionConfig, transcribing: bool) -> Self {
        Self {
            window: RollingWindow::new(config.session_duration),
            totals: MetricTotals::default(),
            coverage: Coverage::default(),
            pause_threshold: config.pause_threshold,
            weights: config.weights.voice,
            feedback: FeedbackGenerator::voice(),
            transcribing,
            transcript: Vec::new(),
            words: 0,
            fillers: Vec::new(),
            pauses: 0,
            silence: Duration::ZERO,
            last_final: None,
            signals: SignalTotals::default(),
        }
    }

    pub fn record_tick(
        &mut self,
        timestamp: Duration,
        tick: &AudioTick,
    ) -> Result<MetricSnapshot, WindowError> {
        let snapshot = MetricSnapshot::new(timestamp, MetricSource::Audio, tick.values());
        self.window.push(snapshot.clone())?;
        self.totals.add(snapshot.values());
        self.coverage.record(timestamp);
        Ok(snapshot)
    }

    /// Recent microphone snapshots, bounded by the session length.
    pub fn window(&self) -> &RollingWindow<MetricSnapshot> {
        &self.window
    }

    /// Folds one recognizer event in. Interim results are ignored; `received` is when the
    /// event arrived relative to the start of recording.
    pub fn record_transcript(&mut self, event: &TranscriptEvent, received: Duration) {
        if !event.is_final {
            return;
        }
        let text = event.text.trim();
        if text.is_empty() {
            return;
        }

        self.words += text.split_whitespace().count();
        let lowered = text.to_lowercase();
        self.fillers.extend(
            FILLER_WORDS
                .iter()
                .filter(|filler| lowered.contains(*filler))
                .map(|filler| (*filler).to_owned()),
        );

        if let Some(previous) = self.last_final {
            let gap = received.saturating_sub(previous);
            if gap > self.pause_threshold {
                self.pauses += 1;
                self.silence += gap;
            }
        }
        self.last_final = Some(received);

        if let Some(signals) = event.signals {
            self.signals.confidence += signals.confidence;
            self.signals.clarity += signals.clarity;
            self.signals.enthusiasm += signals.enthusiasm;
            self.signals.utterances += 1;
        }
        self.transcript.push(text.to_owned());
    }

    pub fn finalize(&self, elapsed: Duration) -> SubReport {
        if self.coverage.samples == 0 && self.transcript.is_empty() {
            let mut report = SubReport::missing(MetricSource::Audio, "no audio was captured");
            report.coverage = self.coverage;
            return report;
        }

        let mut metrics = MetricValues::new();
        for metric in [Metric::VolumeLevel, Metric::AveragePitch] {
            if let Some(mean) = self.totals.mean(metric) {
                metrics.insert(metric, mean);
            }
        }

        let mut components = Vec::new();
        if let Some(volume) = metrics.get(&Metric::VolumeLevel) {
            let adequacy = if *volume >= ADEQUATE_VOLUME {
                100.0
            } else {
                volume * 100.0 / ADEQUATE_VOLUME
            };
            components.push((adequacy, self.weights.volume_adequacy));
        }

        if self.transcribing {
            let minutes = elapsed.as_secs_f64() / 60.0;
            let wpm = if minutes > 0.0 {
                self.words as f64 / minutes
            } else {
                0.0
            };
            let silence = self.silence.min(elapsed);
            metrics.insert(Metric::WordsPerMinute, wpm);
            metrics.insert(Metric::FillerWords, self.fillers.len() as f64);
            metrics.insert(Metric::PauseFrequency, f64::from(self.pauses));
            metrics.insert(Metric::SilenceTime, silence.as_secs_f64());
            metrics.insert(Metric::SpeakingTime, (elapsed - silence).as_secs_f64());
            components.push((
                100.0 - self.fillers.len() as f64 * FILLER_PENALTY_PER_WORD,
                self.weights.filler_penalty,
            ));

            if self.signals.utterances > 0 {
                let n = self.signals.utterances as f64;
                let delivery = [
                    (Metric::Confidence, self.signals.confidence / n, self.weights.confidence),
                    (Metric::Clarity, self.signals.clarity / n, self.weights.clarity),
                    (Metric::Enthusiasm, self.signals.enthusiasm / n, self.weights.enthusiasm),
                ];
                for (metric, value, weight) in delivery {
                    let value = clamp_percent(value);
                    metrics.insert(metric, value);
                    components.push((value, weight));
                }
            }
        }

        let overall = weighted_percent(&components).unwrap_or(0.0);
        let metrics = rounded(metrics);
        let feedback = self.feedback.evaluate(&metrics);
        let mut report = SubReport::scored(MetricSource::Audio, overall, metrics, feedback);
        report.coverage = self.coverage;
        report.detail = Some(SubReportDetail::Voice {
            transcript: self.transcript.join(" "),
            filler_words: self.fillers.clone(),
        });

        if !self.transcribing {
            report.degrade(
                "speech transcription unavailable; voice score reflects volume only",
            );
        } else if self.signals.utterances == 0 {
            report.degrade(
                "no delivery signals received; confidence, clarity and enthusiasm omitted",
            );
        }
        if self.coverage.samples == 0 {
            report.degrade("no microphone samples captured; volume omitted");
        }
        report
    }
}

/// Samples the microphone on a fixed tick and listens to the recognizer until told to
/// stop or the track ends. A tick already in flight when stop arrives is finished and
/// kept; only aborting the task discards it.
pub struct AudioSignalAnalyzer<A: ?Sized> {
    provider: Arc<A>,
    transcript: Option<BoxStream<'static, TranscriptEvent>>,
    tick: Duration,
    acc: VoiceAccumulator,
}

impl<A> AudioSignalAnalyzer<A>
where
    A: AnalysisProvider + ?Sized,
{
    /// `transcript` is `None` when no recognizer could be subscribed.
    pub fn new(
        provider: Arc<A>,
        transcript: Option<BoxStream<'static, TranscriptEvent>>,
        config: &SessionConfig,
    ) -> Self {
        let acc = VoiceAccumulator::new(config, transcript.is_some());
        Self {
            provider,
            transcript,
            tick: config.audio_tick,
            acc,
        }
    }

    pub async fn run(mut self, handle: AudioHandle, mut ctx: SamplingContext) -> AnalyzerOutcome {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut track_lost = false;

        loop {
            tokio::select! {
                biased;

                _ = ctx.stopped() => break,

                event = next_event(&mut self.transcript) => {
                    if let Some(event) = event {
                        self.acc.record_transcript(&event, ctx.elapsed());
                    } else {
                        tracing::debug!(session_id = %ctx.session_id(), "transcript stream ended");
                    }
                }

                _ = ticker.tick() => {
                    match self.provider.sample_audio_tick(&handle).await {
                        Ok(Some(tick)) => match self.acc.record_tick(ctx.elapsed(), &tick) {
                            Ok(snapshot) => ctx.publish(snapshot),
                            Err(e) => tracing::trace!(error = %e, "audio tick skipped"),
                        },
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                session_id = %ctx.session_id(),
                                stream = %handle.id(),
                                error = %e,
                                "microphone lost, stopping voice analysis"
                            );
                            track_lost = true;
                            break;
                        }
                    }
                }
            }
        }

        let mut report = self.acc.finalize(ctx.elapsed());
        if track_lost {
            report.degrade("microphone track ended before recording stopped");
        }
        AnalyzerOutcome { report, track_lost }
    }
}

async fn next_event(
    stream: &mut Option<BoxStream<'static, TranscriptEvent>>,
) -> Option<TranscriptEvent> {
    let Some(events) = stream.as_mut() else {
        return std::future::pending().await;
    };
    let event = events.next().await;
    if event.is_none() {
        *stream = None;
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::SlowProvider;
    use crate::analysis::SimulatedAnalysisProvider;
    use crate::capture::{StreamId, TrackState};
    use crate::clock::TokioClock;
    use crate::report::Reliability;
    use crate::session::SessionId;
    use crate::transcription::{ScriptedTranscription, TranscriptionProvider, UtteranceSignals};
    use tokio::sync::watch;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn tick(volume: f64) -> AudioTick {
        AudioTick {
            volume,
            pitch: 150.0,
        }
    }

    #[test]
    fn fillers_counted_once_per_utterance() {
        let mut acc = VoiceAccumulator::new(&SessionConfig::default(), true);
        acc.record_transcript(
            &TranscriptEvent::final_text("Um, um, I think UM", secs(1)),
            secs(1),
        );
        acc.record_transcript(
            &TranscriptEvent::final_text("you know what", secs(2)),
            secs(2),
        );
        acc.record_transcript(&TranscriptEvent::interim("uh", secs(3)), secs(3));
        assert_eq!(acc.fillers, vec!["um".to_owned(), "you know".to_owned()]);
        assert_eq!(acc.words, 8);
    }

    #[test]
    fn gaps_beyond_threshold_count_as_pauses() {
        let mut acc = VoiceAccumulator::new(&SessionConfig::default(), true);
        for at in [0, 1, 5, 6, 9] {
            acc.record_transcript(
                &TranscriptEvent::final_text("hello there", secs(at)),
                secs(at),
            );
        }
        assert_eq!(acc.pauses, 2);
        assert_eq!(acc.silence, secs(7));
    }

    #[test]
    fn finalize_computes_pace_and_score() {
        let mut acc = VoiceAccumulator::new(&SessionConfig::default(), true);
        acc.record_tick(secs(0), &tick(40.0)).unwrap();
        acc.record_tick(secs(1), &tick(80.0)).unwrap();
        let signals = UtteranceSignals {
            confidence: 80.0,
            clarity: 70.0,
            enthusiasm: 90.0,
        };
        let words = "one two three four five six seven eight nine ten";
        acc.record_transcript(
            &TranscriptEvent::final_text(words, secs(1)).with_signals(signals),
            secs(1),
        );

        let report = acc.finalize(secs(6));
        assert_eq!(report.metric(Metric::WordsPerMinute), Some(100.0));
        assert_eq!(report.metric(Metric::VolumeLevel), Some(60.0));
        assert_eq!(report.metric(Metric::FillerWords), Some(0.0));
        assert_eq!(report.metric(Metric::Confidence), Some(80.0));
        // volume 100, fillers 100, confidence 80, clarity 70, enthusiasm 90
        assert_eq!(report.overall_score, 88);
        assert_eq!(report.reliability, Reliability::Full);
        assert_eq!(report.coverage.samples, 2);
    }

    #[test]
    fn without_transcription_only_volume_is_scored() {
        let mut acc = VoiceAccumulator::new(&SessionConfig::default(), false);
        acc.record_tick(secs(0), &tick(25.0)).unwrap();
        let report = acc.finalize(secs(10));

        assert_eq!(report.reliability, Reliability::Reduced);
        assert!(report.metric(Metric::WordsPerMinute).is_none());
        assert!(report.metric(Metric::Confidence).is_none());
        assert_eq!(report.overall_score, 50);
        assert!(!report.notes.is_empty());
    }

    #[test]
    fn filler_penalty_is_clamped() {
        let mut acc = VoiceAccumulator::new(&SessionConfig::default(), true);
        for (i, text) in ["um uh like", "so well actually", "you know um"].iter().enumerate() {
            let at = secs(i as u64);
            acc.record_transcript(&TranscriptEvent::final_text(*text, at), at);
        }
        let report = acc.finalize(secs(60));
        assert_eq!(report.metric(Metric::FillerWords), Some(8.0));
        // no ticks and no delivery signals, so the filler penalty is the only component
        assert_eq!(report.overall_score, 20);
        assert!(report
            .improvements
            .iter()
            .any(|e| e.metric == Metric::FillerWords));
    }

    #[test]
    fn volume_on_threshold_after_rounding_is_praised() {
        let mut acc = VoiceAccumulator::new(&SessionConfig::default(), false);
        acc.record_tick(secs(0), &tick(49.2)).unwrap();
        acc.record_tick(secs(1), &tick(50.0)).unwrap();
        let report = acc.finalize(secs(2));

        assert_eq!(report.metric(Metric::VolumeLevel), Some(50.0));
        assert!(!report
            .improvements
            .iter()
            .any(|e| e.metric == Metric::VolumeLevel));
        assert!(report
            .strengths
            .iter()
            .any(|e| e.metric == Metric::VolumeLevel && e.text == "Good volume projection"));
    }

    #[test]
    fn volume_averages_the_whole_recording() {
        let config = SessionConfig {
            session_duration: secs(10),
            ..SessionConfig::default()
        };
        let mut acc = VoiceAccumulator::new(&config, false);
        for at in 0..20 {
            let volume = if at < 10 { 20.0 } else { 80.0 };
            acc.record_tick(secs(at), &tick(volume)).unwrap();
        }

        assert!(acc.window().span() <= secs(10));
        let report = acc.finalize(secs(20));
        assert_eq!(report.metric(Metric::VolumeLevel), Some(50.0));
        assert_eq!(report.coverage.samples, 20);
    }

    #[test]
    fn out_of_order_tick_rejected() {
        let mut acc = VoiceAccumulator::new(&SessionConfig::default(), false);
        acc.record_tick(secs(2), &tick(50.0)).unwrap();
        assert!(acc.record_tick(secs(1), &tick(50.0)).is_err());
        assert_eq!(acc.coverage.samples, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_loop_collects_until_stopped() {
        let config = SessionConfig::default();
        let script = ScriptedTranscription::new(vec![
            TranscriptEvent::final_text("welcome everyone", secs(1)),
            TranscriptEvent::final_text("today we talk about rust", secs(5)),
        ]);
        let analyzer = AudioSignalAnalyzer::new(
            Arc::new(SimulatedAnalysisProvider::new(3)),
            Some(script.subscribe().unwrap()),
            &config,
        );
        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = SamplingContext::new(
            SessionId::new(),
            Arc::new(TokioClock::new()),
            stop_rx,
            None,
        );
        let handle = AudioHandle::new(StreamId(1), "mic", TrackState::live());

        let task = tokio::spawn(analyzer.run(handle, ctx));
        tokio::time::sleep(secs(10)).await;
        stop_tx.send(true).unwrap();
        let outcome = task.await.unwrap();

        assert!(!outcome.track_lost);
        let report = outcome.report;
        assert_eq!(report.metric(Metric::PauseFrequency), Some(1.0));
        assert_eq!(report.metric(Metric::WordsPerMinute), Some(42.0));
        assert!(report.coverage.samples >= 190);
        assert!(
            report.coverage.last.unwrap() >= Duration::from_millis(9_900)
        );
        match report.detail {
            Some(SubReportDetail::Voice { transcript, .. }) => {
                assert_eq!(transcript, "welcome everyone today we talk about rust")
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_in_flight_at_stop_is_kept() {
        let config = SessionConfig::default();
        let provider = SlowProvider::new(Duration::from_millis(200), Duration::ZERO);
        let analyzer = AudioSignalAnalyzer::new(Arc::new(provider), None, &config);
        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = SamplingContext::new(
            SessionId::new(),
            Arc::new(TokioClock::new()),
            stop_rx,
            None,
        );
        let handle = AudioHandle::new(StreamId(1), "mic", TrackState::live());

        let task = tokio::spawn(analyzer.run(handle, ctx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(true).unwrap();
        let outcome = task.await.unwrap();

        assert_eq!(outcome.report.coverage.samples, 1);
        assert_eq!(
            outcome.report.coverage.first,
            Some(Duration::from_millis(200))
        );
        assert!(outcome.report.metric(Metric::VolumeLevel).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_track_soft_stops() {
        let config = SessionConfig::default();
        let analyzer =
            AudioSignalAnalyzer::new(Arc::new(SimulatedAnalysisProvider::new(1)), None, &config);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let ctx = SamplingContext::new(
            SessionId::new(),
            Arc::new(TokioClock::new()),
            stop_rx,
            None,
        );
        let track = TrackState::live();
        let handle = AudioHandle::new(StreamId(1), "mic", track.clone());

        let task = tokio::spawn(analyzer.run(handle, ctx));
        tokio::time::sleep(secs(2)).await;
        track.end();
        let outcome = task.await.unwrap();

        assert!(outcome.track_lost);
        assert!(outcome.report.coverage.last.unwrap() <= secs(2));
        assert!(outcome.report.coverage.samples > 0);
    }
}
