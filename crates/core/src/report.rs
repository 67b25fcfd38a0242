//! Per-source sub-reports and the combined session report.

use crate::config::SourceBalance;
use crate::emotion::{Emotion, EmotionProfile};
use crate::feedback::{Feedback, FeedbackEntry};
use crate::metrics::{rounded, Metric, MetricSource, MetricValues};
use crate::scoring::{combine_with, CombinedScores};
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How much the sub-report's score can be trusted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    Full,
    /// Some inputs were unavailable; the score covers only what was measured.
    Reduced,
    /// The analyzer produced nothing usable.
    Missing,
}

/// Which part of the recording a sub-report was built from.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coverage {
    pub samples: usize,
    pub first: Option<Duration>,
    pub last: Option<Duration>,
}

impl Coverage {
    pub(crate) fn record(&mut self, timestamp: Duration) {
        self.samples += 1;
        self.first.get_or_insert(timestamp);
        self.last = Some(timestamp);
    }

    pub fn span(&self) -> Duration {
        match (self.first, self.last) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubReportDetail {
    Voice {
        transcript: String,
        filler_words: Vec<String>,
    },
    Facial {
        emotions: Option<EmotionProfile>,
        recent_emotion: Option<Emotion>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SubReport {
    pub source: MetricSource,
    pub overall_score: u8,
    pub metrics: MetricValues,
    pub suggestions: Vec<FeedbackEntry>,
    pub strengths: Vec<FeedbackEntry>,
    pub improvements: Vec<FeedbackEntry>,
    pub reliability: Reliability,
    pub notes: Vec<String>,
    pub coverage: Coverage,
    pub detail: Option<SubReportDetail>,
}

impl SubReport {
    /// Placeholder for an analyzer that produced nothing, e.g. one that missed the join
    /// deadline. Carries no metrics so nothing downstream mistakes it for data.
    pub fn missing(source: MetricSource, note: impl Into<String>) -> Self {
        Self {
            source,
            overall_score: 0,
            metrics: MetricValues::new(),
            suggestions: Vec::new(),
            strengths: Vec::new(),
            improvements: Vec::new(),
            reliability: Reliability::Missing,
            notes: vec![note.into()],
            coverage: Coverage::default(),
            detail: None,
        }
    }

    pub(crate) fn scored(
        source: MetricSource,
        overall_score: f64,
        metrics: MetricValues,
        feedback: Feedback,
    ) -> Self {
        Self {
            source,
            overall_score: to_score(overall_score),
            metrics: rounded(metrics),
            suggestions: feedback.suggestions,
            strengths: feedback.strengths,
            improvements: feedback.improvements,
            reliability: Reliability::Full,
            notes: Vec::new(),
            coverage: Coverage::default(),
            detail: None,
        }
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    /// The overall score, unless the analyzer produced nothing.
    pub fn score(&self) -> Option<f64> {
        (self.reliability != Reliability::Missing).then_some(f64::from(self.overall_score))
    }

    pub fn is_missing(&self) -> bool {
        self.reliability == Reliability::Missing
    }

    pub(crate) fn degrade(&mut self, note: impl Into<String>) {
        if self.reliability == Reliability::Full {
            self.reliability = Reliability::Reduced;
        }
        self.notes.push(note.into());
    }

    fn feedback(&self) -> Feedback {
        Feedback {
            strengths: self.strengths.clone(),
            suggestions: self.suggestions.clone(),
            improvements: self.improvements.clone(),
        }
    }
}

pub(crate) fn to_score(value: f64) -> u8 {
    crate::metrics::clamp_percent(value).round() as u8
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub voice: SubReport,
    pub facial: SubReport,
    pub combined: CombinedScores,
    pub recommendations: Vec<FeedbackEntry>,
    pub strengths: Vec<FeedbackEntry>,
    pub improvements: Vec<FeedbackEntry>,
    pub partial: bool,
    pub recorded_for: Duration,
}

impl SessionReport {
    /// Combines the two sub-reports. `partial` is forced on when either sub-report is
    /// missing or a combined score had no input at all.
    pub fn assemble(
        session_id: SessionId,
        voice: SubReport,
        facial: SubReport,
        balance: &SourceBalance,
        partial: bool,
        recorded_for: Duration,
    ) -> Self {
        let combination = combine_with(&voice, &facial, balance);

        let mut feedback = voice.feedback();
        feedback.merge(facial.feedback());

        let partial =
            partial || voice.is_missing() || facial.is_missing() || combination.missing_inputs;

        Self {
            session_id,
            combined: combination.scores,
            recommendations: feedback.suggestions,
            strengths: feedback.strengths,
            improvements: feedback.improvements,
            voice,
            facial,
            partial,
            recorded_for,
        }
    }
}
