//! Experience and achievement signals derived from a finished report. The core only
//! computes them; whatever implements [`RewardsSink`] keeps the books.

use crate::report::SessionReport;

pub const BASE_EXPERIENCE: u32 = 25;
pub const SPEAKING_MASTER: &str = "Speaking Master";
pub const CONFIDENCE_KING: &str = "Confidence King";

pub trait RewardsSink: Send + Sync {
    fn on_experience_gained(&self, points: u32);
    fn on_achievement_unlocked(&self, name: &str);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewards {
    pub experience: u32,
    pub achievements: Vec<&'static str>,
}

pub fn evaluate(report: &SessionReport) -> Rewards {
    let combined = &report.combined;
    let mut achievements = Vec::new();
    if combined.overall_score >= 90 {
        achievements.push(SPEAKING_MASTER);
    }
    if combined.confidence >= 85 {
        achievements.push(CONFIDENCE_KING);
    }
    Rewards {
        experience: u32::from(combined.overall_score) / 10 + BASE_EXPERIENCE,
        achievements,
    }
}

pub fn deliver(report: &SessionReport, sink: &dyn RewardsSink) -> Rewards {
    let rewards = evaluate(report);
    sink.on_experience_gained(rewards.experience);
    for name in &rewards.achievements {
        sink.on_achievement_unlocked(name);
    }
    rewards
}

/// Sink that only logs, for runs without a rewards backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingRewards;

impl RewardsSink for LoggingRewards {
    fn on_experience_gained(&self, points: u32) {
        tracing::info!(points, "experience gained");
    }

    fn on_achievement_unlocked(&self, name: &str) {
        tracing::info!(achievement = name, "achievement unlocked");
    }
}
