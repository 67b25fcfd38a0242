use crate::config::SourceBalance;
use crate::metrics::{clamp_percent, Metric};
use crate::report::{to_score, SubReport};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CombinedScores {
    pub overall_score: u8,
    pub confidence: u8,
    pub engagement: u8,
    pub naturalness: u8,
    pub effectiveness: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combination {
    pub scores: CombinedScores,
    /// At least one combined score had no input from either side and reads 0.
    pub missing_inputs: bool,
}

/// Combines two sub-reports with an even voice/facial balance.
pub fn combine(voice: &SubReport, facial: &SubReport) -> CombinedScores {
    combine_with(voice, facial, &SourceBalance::default()).scores
}

/// Weighted blend of voice and facial values. A side without the value is left out
/// and the other side is used alone.
pub fn combine_with(voice: &SubReport, facial: &SubReport, balance: &SourceBalance) -> Combination {
    let mut missing_inputs = false;
    let mut blend = |v: Option<f64>, f: Option<f64>| -> u8 {
        match (v, f) {
            (Some(v), Some(f)) => to_score(balanced(clamp_percent(v), clamp_percent(f), balance)),
            (Some(x), None) | (None, Some(x)) => to_score(x),
            (None, None) => {
                missing_inputs = true;
                0
            }
        }
    };

    let scores = CombinedScores {
        overall_score: blend(voice.score(), facial.score()),
        confidence: blend(
            voice.metric(Metric::Confidence),
            facial.metric(Metric::Confidence),
        ),
        engagement: blend(
            voice.metric(Metric::Enthusiasm),
            facial.metric(Metric::Engagement),
        ),
        naturalness: blend(None, facial.metric(Metric::Naturalness)),
        effectiveness: blend(
            voice.metric(Metric::Clarity),
            facial.metric(Metric::EyeContact),
        ),
    };
    Combination {
        scores,
        missing_inputs,
    }
}

fn balanced(voice: f64, facial: f64, balance: &SourceBalance) -> f64 {
    let total = balance.voice + balance.facial;
    if total > 0.0 {
        (voice * balance.voice + facial * balance.facial) / total
    } else {
        (voice + facial) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::Feedback;
    use crate::metrics::MetricSource;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn report(source: MetricSource, overall: f64, metrics: &[(Metric, f64)]) -> SubReport {
        SubReport::scored(
            source,
            overall,
            metrics.iter().copied().collect(),
            Feedback::default(),
        )
    }

    #[test]
    fn averages_matching_fields() {
        let voice = report(
            MetricSource::Audio,
            75.0,
            &[
                (Metric::Confidence, 80.0),
                (Metric::Enthusiasm, 71.0),
                (Metric::Clarity, 60.0),
            ],
        );
        let facial = report(
            MetricSource::Video,
            88.0,
            &[
                (Metric::Confidence, 90.0),
                (Metric::Engagement, 70.0),
                (Metric::Naturalness, 84.0),
                (Metric::EyeContact, 95.0),
            ],
        );
        let scores = combine(&voice, &facial);
        assert_eq!(
            scores,
            CombinedScores {
                overall_score: 82,
                confidence: 85,
                engagement: 71,
                naturalness: 84,
                effectiveness: 78,
            }
        );
    }

    #[test]
    fn absent_side_falls_back_to_the_other() {
        let voice = report(MetricSource::Audio, 70.0, &[(Metric::VolumeLevel, 60.0)]);
        let facial = report(
            MetricSource::Video,
            90.0,
            &[(Metric::Confidence, 80.0), (Metric::EyeContact, 70.0)],
        );
        let combination = combine_with(&voice, &facial, &SourceBalance::default());
        assert_eq!(combination.scores.overall_score, 80);
        assert_eq!(combination.scores.confidence, 80);
        assert_eq!(combination.scores.effectiveness, 70);
        // neither side has engagement or naturalness
        assert_eq!(combination.scores.engagement, 0);
        assert!(combination.missing_inputs);
    }

    #[test]
    fn balance_shifts_the_blend() {
        let voice = report(MetricSource::Audio, 60.0, &[]);
        let facial = report(MetricSource::Video, 100.0, &[]);
        let balance = SourceBalance {
            voice: 3.0,
            facial: 1.0,
        };
        let c = combine_with(&voice, &facial, &balance);
        assert_eq!(c.scores.overall_score, 70);
    }

    #[test]
    fn outputs_bounded_and_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let mut pick = || rng.random_range(0.0..=100.0);
            let voice = report(
                MetricSource::Audio,
                pick(),
                &[
                    (Metric::Confidence, pick()),
                    (Metric::Enthusiasm, pick()),
                    (Metric::Clarity, pick()),
                ],
            );
            let facial = report(
                MetricSource::Video,
                pick(),
                &[
                    (Metric::Confidence, pick()),
                    (Metric::Engagement, pick()),
                    (Metric::Naturalness, pick()),
                    (Metric::EyeContact, pick()),
                ],
            );
            let a = combine(&voice, &facial);
            assert_eq!(a, combine(&voice, &facial));
            for v in [a.overall_score, a.confidence, a.engagement, a.naturalness, a.effectiveness] {
                assert!(v <= 100);
            }
        }
    }

    #[test]
    fn missing_report_contributes_nothing() {
        let voice = SubReport::missing(MetricSource::Audio, "timed out");
        let facial = report(MetricSource::Video, 64.0, &[]);
        assert_eq!(combine(&voice, &facial).overall_score, 64);
    }
}
