//! Banded threshold rules that turn metric values into strengths, suggestions and
//! improvement notes.
//!
//! Each metric has one [`MetricRule`]: an ordered list of bands whose upper bounds strictly
//! increase and whose last band is unbounded. A value falls into the first band that
//! admits it, so bands never overlap and every value is classified.

use crate::metrics::{Metric, MetricSource, MetricValues};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Upper {
    /// value < x
    Below(f64),
    /// value <= x
    AtMost(f64),
    Unbounded,
}

impl Upper {
    fn admits(&self, value: f64) -> bool {
        match *self {
            Upper::Below(x) => value < x,
            Upper::AtMost(x) => value <= x,
            Upper::Unbounded => true,
        }
    }

    /// Sort key: `Below(x)` ends just before `AtMost(x)`.
    fn position(&self) -> Option<(f64, u8)> {
        match *self {
            Upper::Below(x) => Some((x, 0)),
            Upper::AtMost(x) => Some((x, 1)),
            Upper::Unbounded => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Strength(String),
    Improve {
        suggestion: String,
        improvement: String,
    },
    Unremarkable,
}

impl Verdict {
    pub fn strength(text: &str) -> Self {
        Verdict::Strength(text.to_owned())
    }

    pub fn improve(suggestion: &str, improvement: &str) -> Self {
        Verdict::Improve {
            suggestion: suggestion.to_owned(),
            improvement: improvement.to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Band {
    pub upper: Upper,
    pub verdict: Verdict,
}

impl Band {
    pub fn new(upper: Upper, verdict: Verdict) -> Self {
        Self { upper, verdict }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("rule for {0} has no bands")]
    Empty(Metric),
    #[error("rule for {0} must end with an unbounded band")]
    NotExhaustive(Metric),
    #[error("bands for {0} are not in strictly increasing order")]
    Overlapping(Metric),
    #[error("band bound for {0} is not a number")]
    InvalidBound(Metric),
    #[error("more than one rule for {0}")]
    DuplicateRule(Metric),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricRule {
    metric: Metric,
    bands: Vec<Band>,
}

impl MetricRule {
    pub fn new(metric: Metric, bands: Vec<Band>) -> Result<Self, RuleError> {
        let Some((last, rest)) = bands.split_last() else {
            return Err(RuleError::Empty(metric));
        };
        if last.upper != Upper::Unbounded {
            return Err(RuleError::NotExhaustive(metric));
        }
        let mut previous: Option<(f64, u8)> = None;
        for band in rest {
            let pos = band.upper.position().ok_or(RuleError::Overlapping(metric))?;
            if pos.0.is_nan() {
                return Err(RuleError::InvalidBound(metric));
            }
            if let Some(prev) = previous {
                if pos <= prev {
                    return Err(RuleError::Overlapping(metric));
                }
            }
            previous = Some(pos);
        }
        Ok(Self { metric, bands })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn classify(&self, value: f64) -> &Verdict {
        let value = if value.is_nan() { 0.0 } else { value };
        self.bands
            .iter()
            .find(|band| band.upper.admits(value))
            .map(|band| &band.verdict)
            .unwrap_or(&Verdict::Unremarkable)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackEntry {
    pub source: MetricSource,
    pub metric: Metric,
    pub text: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    pub strengths: Vec<FeedbackEntry>,
    pub suggestions: Vec<FeedbackEntry>,
    pub improvements: Vec<FeedbackEntry>,
}

impl Feedback {
    /// Appends `other`'s entries, keeping at most one entry per source and metric in
    /// each list.
    pub fn merge(&mut self, other: Feedback) {
        extend_unique(&mut self.strengths, other.strengths);
        extend_unique(&mut self.suggestions, other.suggestions);
        extend_unique(&mut self.improvements, other.improvements);
    }

    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty() && self.suggestions.is_empty() && self.improvements.is_empty()
    }
}

fn extend_unique(list: &mut Vec<FeedbackEntry>, entries: Vec<FeedbackEntry>) {
    for entry in entries {
        if !list
            .iter()
            .any(|e| e.source == entry.source && e.metric == entry.metric)
        {
            list.push(entry);
        }
    }
}

#[derive(Clone, Debug)]
pub struct FeedbackGenerator {
    source: MetricSource,
    rules: Vec<MetricRule>,
}

impl FeedbackGenerator {
    pub fn new(source: MetricSource, rules: Vec<MetricRule>) -> Result<Self, RuleError> {
        for (i, rule) in rules.iter().enumerate() {
            if rules[..i].iter().any(|r| r.metric == rule.metric) {
                return Err(RuleError::DuplicateRule(rule.metric));
            }
        }
        Ok(Self { source, rules })
    }

    /// Classifies every monitored metric present in `metrics`. Metrics without a value
    /// are skipped rather than assumed.
    pub fn evaluate(&self, metrics: &MetricValues) -> Feedback {
        let mut feedback = Feedback::default();
        for rule in &self.rules {
            let Some(value) = metrics.get(&rule.metric).copied() else {
                continue;
            };
            let entry = |text: &str| FeedbackEntry {
                source: self.source,
                metric: rule.metric,
                text: text.to_owned(),
            };
            match rule.classify(value) {
                Verdict::Strength(text) => feedback.strengths.push(entry(text)),
                Verdict::Improve {
                    suggestion,
                    improvement,
                } => {
                    feedback.suggestions.push(entry(suggestion));
                    feedback.improvements.push(entry(improvement));
                }
                Verdict::Unremarkable => {}
            }
        }
        feedback
    }

    pub fn voice() -> Self {
        use Upper::*;
        let rules = vec![
            rule(
                Metric::WordsPerMinute,
                vec![
                    Band::new(
                        Below(100.0),
                        Verdict::improve(
                            "Try speaking a bit faster to maintain audience engagement",
                            "Pace - Consider increasing your speaking speed",
                        ),
                    ),
                    Band::new(AtMost(180.0), Verdict::strength("Excellent speaking pace")),
                    Band::new(
                        Unbounded,
                        Verdict::improve(
                            "Slow down slightly to improve clarity and comprehension",
                            "Pace - Consider slowing down for better clarity",
                        ),
                    ),
                ],
            ),
            rule(
                Metric::FillerWords,
                vec![
                    Band::new(
                        AtMost(3.0),
                        Verdict::strength("Good control of filler words"),
                    ),
                    Band::new(
                        Unbounded,
                        Verdict::improve(
                            "Practice reducing filler words like \"um\" and \"uh\"",
                            "Filler words - Practice pausing instead of using filler words",
                        ),
                    ),
                ],
            ),
            rule(
                Metric::PauseFrequency,
                vec![
                    Band::new(
                        Below(2.0),
                        Verdict::improve(
                            "Add more strategic pauses for emphasis and breathing",
                            "Pauses - Use pauses to emphasize key points",
                        ),
                    ),
                    Band::new(Unbounded, Verdict::strength("Good use of pauses")),
                ],
            ),
            rule(
                Metric::VolumeLevel,
                vec![
                    Band::new(
                        Below(50.0),
                        Verdict::improve(
                            "Project your voice more to ensure everyone can hear you",
                            "Volume - Practice projecting your voice",
                        ),
                    ),
                    Band::new(Unbounded, Verdict::strength("Good volume projection")),
                ],
            ),
            rule(
                Metric::Confidence,
                vec![
                    Band::new(
                        Below(70.0),
                        Verdict::improve(
                            "Work on building confidence through practice and preparation",
                            "Confidence - Practice more to build speaking confidence",
                        ),
                    ),
                    Band::new(Unbounded, Verdict::strength("Confident delivery")),
                ],
            ),
        ];
        Self {
            source: MetricSource::Audio,
            rules,
        }
    }

    pub fn facial() -> Self {
        use Upper::*;
        let rules = vec![
            rule(
                Metric::EyeContact,
                vec![
                    Band::new(
                        Below(60.0),
                        Verdict::improve(
                            "Practice maintaining eye contact with your audience",
                            "Eye Contact - Look directly at your audience more often",
                        ),
                    ),
                    Band::new(AtMost(85.0), Verdict::strength("Good eye contact")),
                    Band::new(Unbounded, Verdict::strength("Excellent eye contact")),
                ],
            ),
            rule(
                Metric::SmileFrequency,
                vec![
                    Band::new(
                        Below(20.0),
                        Verdict::improve(
                            "Try smiling more to appear more approachable and engaging",
                            "Facial Expression - Use more smiles to connect with your audience",
                        ),
                    ),
                    Band::new(
                        AtMost(40.0),
                        Verdict::strength("Good use of facial expressions"),
                    ),
                    Band::new(
                        Unbounded,
                        Verdict::improve(
                            "Balance your expressions - too much smiling can seem forced",
                            "Expression Balance - Vary your facial expressions naturally",
                        ),
                    ),
                ],
            ),
            rule(
                Metric::ExpressionVariety,
                vec![
                    Band::new(
                        Below(50.0),
                        Verdict::improve(
                            "Vary your facial expressions to keep your audience engaged",
                            "Expression Variety - Use different facial expressions to emphasize points",
                        ),
                    ),
                    Band::new(
                        Unbounded,
                        Verdict::strength("Good variety in facial expressions"),
                    ),
                ],
            ),
            rule(
                Metric::Engagement,
                vec![
                    Band::new(
                        Below(70.0),
                        Verdict::improve(
                            "Work on appearing more engaged and enthusiastic",
                            "Engagement - Show more enthusiasm and energy",
                        ),
                    ),
                    Band::new(Unbounded, Verdict::strength("High engagement level")),
                ],
            ),
            rule(
                Metric::Confidence,
                vec![
                    Band::new(
                        Below(70.0),
                        Verdict::improve(
                            "Practice confident body language and facial expressions",
                            "Confidence - Work on projecting confidence through your expressions",
                        ),
                    ),
                    Band::new(Unbounded, Verdict::strength("Confident facial expressions")),
                ],
            ),
            rule(
                Metric::Naturalness,
                vec![
                    Band::new(
                        Below(80.0),
                        Verdict::improve(
                            "Relax and be more natural in your expressions",
                            "Naturalness - Practice being more relaxed and authentic",
                        ),
                    ),
                    Band::new(
                        Unbounded,
                        Verdict::strength("Natural and authentic expressions"),
                    ),
                ],
            ),
        ];
        Self {
            source: MetricSource::Video,
            rules,
        }
    }
}

/// Built-in tables are known to be well formed, so they skip validation at runtime;
/// the tests check them.
fn rule(metric: Metric, bands: Vec<Band>) -> MetricRule {
    MetricRule { metric, bands }
}
