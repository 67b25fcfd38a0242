//! Facial and body analysis on a display-rate loop.

use crate::analysis::{AnalysisProvider, AnalyzerOutcome, SamplingContext, VideoFrame};
use crate::capture::VideoHandle;
use crate::config::{FacialWeights, SessionConfig};
use crate::emotion::{EmotionTimeline, EmotionTotals};
use crate::feedback::FeedbackGenerator;
use crate::metrics::{
    rounded, weighted_percent, Metric, MetricSnapshot, MetricSource, MetricTotals, MetricValues,
};
use crate::report::{Coverage, SubReport, SubReportDetail};
use crate::util::{RollingWindow, WindowError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Head movement above half scale drives head stability to 0.
const HEAD_STABILITY_FACTOR: f64 = 2.0;

#[derive(Debug)]
pub struct FacialAccumulator {
    window: RollingWindow<MetricSnapshot>,
    totals: MetricTotals,
    timeline: EmotionTimeline,
    emotions: EmotionTotals,
    coverage: Coverage,
    weights: FacialWeights,
    feedback: FeedbackGenerator,
}

impl FacialAccumulator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            window: RollingWindow::new(config.session_duration),
            totals: MetricTotals::default(),
            timeline: EmotionTimeline::new(config.emotion_horizon),
            emotions: EmotionTotals::default(),
            coverage: Coverage::default(),
            weights: config.weights.facial,
            feedback: FeedbackGenerator::facial(),
        }
    }

    pub fn record_frame(
        &mut self,
        timestamp: Duration,
        frame: &VideoFrame,
    ) -> Result<MetricSnapshot, WindowError> {
        let snapshot = MetricSnapshot::new(timestamp, MetricSource::Video, frame.metrics.values());
        self.window.push(snapshot.clone())?;
        self.timeline.record(timestamp, &frame.emotions)?;
        self.totals.add(snapshot.values());
        self.emotions.add(&frame.emotions);
        self.coverage.record(timestamp);
        Ok(snapshot)
    }

    pub fn timeline(&self) -> &EmotionTimeline {
        &self.timeline
    }

    pub fn finalize(&self) -> SubReport {
        if self.window.is_empty() {
            return SubReport::missing(MetricSource::Video, "no camera frames were captured");
        }

        let metrics: MetricValues = Metric::FACIAL
            .iter()
            .filter_map(|m| self.totals.mean(*m).map(|v| (*m, v)))
            .collect();
        let value = |m: Metric| metrics.get(&m).copied().unwrap_or(0.0);

        let w = self.weights;
        let overall = weighted_percent(&[
            (value(Metric::EyeContact), w.eye_contact),
            (value(Metric::Engagement), w.engagement),
            (value(Metric::Confidence), w.confidence),
            (value(Metric::Naturalness), w.naturalness),
            (
                100.0 - HEAD_STABILITY_FACTOR * value(Metric::HeadMovement),
                w.head_stability,
            ),
        ])
        .unwrap_or(0.0);

        let metrics = rounded(metrics);
        let feedback = self.feedback.evaluate(&metrics);
        let mut report = SubReport::scored(MetricSource::Video, overall, metrics, feedback);
        report.coverage = self.coverage;
        report.detail = Some(SubReportDetail::Facial {
            emotions: self.emotions.profile(),
            recent_emotion: self.timeline.prevailing(),
        });
        report
    }
}

pub struct VideoSignalAnalyzer<A: ?Sized> {
    provider: Arc<A>,
    frame: Duration,
    acc: FacialAccumulator,
}

impl<A> VideoSignalAnalyzer<A>
where
    A: AnalysisProvider + ?Sized,
{
    pub fn new(provider: Arc<A>, config: &SessionConfig) -> Self {
        Self {
            provider,
            frame: config.video_frame,
            acc: FacialAccumulator::new(config),
        }
    }

    /// The first frame is sampled immediately, so a recording that started always has
    /// at least one frame unless the camera was already gone. A frame in flight when stop
    /// arrives is finished and kept.
    pub async fn run(mut self, handle: VideoHandle, mut ctx: SamplingContext) -> AnalyzerOutcome {
        let mut ticker = tokio::time::interval(self.frame);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut track_lost = false;

        loop {
            tokio::select! {
                biased;

                _ = ctx.stopped() => break,

                _ = ticker.tick() => {
                    match self.provider.sample_video_frame(&handle).await {
                        Ok(Some(frame)) => match self.acc.record_frame(ctx.elapsed(), &frame) {
                            Ok(snapshot) => ctx.publish(snapshot),
                            Err(e) => tracing::trace!(error = %e, "video frame skipped"),
                        },
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                session_id = %ctx.session_id(),
                                stream = %handle.id(),
                                error = %e,
                                "camera lost, stopping facial analysis"
                            );
                            track_lost = true;
                            break;
                        }
                    }
                }
            }
        }

        let mut report = self.acc.finalize();
        if track_lost {
            report.degrade("camera track ended before recording stopped");
        }
        AnalyzerOutcome { report, track_lost }
    }
}
