use crate::util::Timestamped;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Audio,
    Video,
}

/// Every quantity the analyzers measure or report.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    // voice
    WordsPerMinute,
    FillerWords,
    PauseFrequency,
    VolumeLevel,
    AveragePitch,
    Confidence,
    Clarity,
    Enthusiasm,
    SpeakingTime,
    SilenceTime,
    // face and body
    EyeContact,
    SmileFrequency,
    ExpressionVariety,
    Engagement,
    Naturalness,
    HeadMovement,
    BlinkRate,
}

impl Metric {
    pub const FACIAL: [Metric; 8] = [
        Metric::EyeContact,
        Metric::SmileFrequency,
        Metric::ExpressionVariety,
        Metric::Engagement,
        Metric::Confidence,
        Metric::Naturalness,
        Metric::HeadMovement,
        Metric::BlinkRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::WordsPerMinute => "wordsPerMinute",
            Metric::FillerWords => "fillerWords",
            Metric::PauseFrequency => "pauseFrequency",
            Metric::VolumeLevel => "volumeLevel",
            Metric::AveragePitch => "averagePitch",
            Metric::Confidence => "confidence",
            Metric::Clarity => "clarity",
            Metric::Enthusiasm => "enthusiasm",
            Metric::SpeakingTime => "speakingTime",
            Metric::SilenceTime => "silenceTime",
            Metric::EyeContact => "eyeContact",
            Metric::SmileFrequency => "smileFrequency",
            Metric::ExpressionVariety => "expressionVariety",
            Metric::Engagement => "engagement",
            Metric::Naturalness => "naturalness",
            Metric::HeadMovement => "headMovement",
            Metric::BlinkRate => "blinkRate",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type MetricValues = BTreeMap<Metric, f64>;

/// One timestamped measurement from one sensor source. Timestamps are relative to the
/// start of recording on the producing analyzer's clock.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricSnapshot {
    timestamp: Duration,
    source: MetricSource,
    values: MetricValues,
}

impl MetricSnapshot {
    pub fn new(timestamp: Duration, source: MetricSource, values: MetricValues) -> Self {
        Self {
            timestamp,
            source,
            values,
        }
    }

    pub fn source(&self) -> MetricSource {
        self.source
    }

    pub fn values(&self) -> &MetricValues {
        &self.values
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }
}

impl Timestamped for MetricSnapshot {
    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Weighted mean over `(value, weight)` pairs with each value clamped to [0, 100] first.
/// `None` when nothing carries weight.
pub fn weighted_percent(components: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = components.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }
    let sum: f64 = components
        .iter()
        .map(|(v, w)| clamp_percent(*v) * w)
        .sum();
    Some(clamp_percent(sum / total))
}

/// Values as they appear in a report: rounded to whole units.
pub fn rounded(values: MetricValues) -> MetricValues {
    values.into_iter().map(|(k, v)| (k, v.round())).collect()
}

/// Running sums per metric since recording started. Unlike a rolling window these
/// never evict, so the means cover the whole recording however long it ran.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricTotals {
    sums: BTreeMap<Metric, (f64, usize)>,
}

impl MetricTotals {
    pub fn add(&mut self, values: &MetricValues) {
        for (metric, value) in values {
            let (sum, n) = self.sums.entry(*metric).or_insert((0.0, 0));
            *sum += value;
            *n += 1;
        }
    }

    pub fn mean(&self, metric: Metric) -> Option<f64> {
        self.sums
            .get(&metric)
            .filter(|(_, n)| *n > 0)
            .map(|(sum, n)| sum / *n as f64)
    }
}
