use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SESSION_SECS: u64 = 120;
pub const DEFAULT_AUDIO_TICK_MS: u64 = 50;
pub const DEFAULT_VIDEO_FRAME_MS: u64 = 16;
pub const DEFAULT_EMOTION_HORIZON_SECS: u64 = 30;
pub const DEFAULT_PAUSE_THRESHOLD_MS: u64 = 2000;
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_SNAPSHOT_BUFFER: usize = 256;
pub const ENV_SESSION_SECS: &str = "SPEECH_COACH_SESSION_SECS";
pub const ENV_JOIN_TIMEOUT_MS: &str = "SPEECH_COACH_JOIN_TIMEOUT_MS";
pub const ENV_AUDIO_TICK_MS: &str = "SPEECH_COACH_AUDIO_TICK_MS";
pub const ENV_VIDEO_FRAME_MS: &str = "SPEECH_COACH_VIDEO_FRAME_MS";

/// Relative weights of the components that make up each sub-report's overall score,
/// plus the balance between the two sources when they are combined.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoringWeights {
    pub voice: VoiceWeights,
    pub facial: FacialWeights,
    pub balance: SourceBalance,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoiceWeights {
    pub confidence: f64,
    pub clarity: f64,
    pub enthusiasm: f64,
    pub filler_penalty: f64,
    pub volume_adequacy: f64,
}

impl Default for VoiceWeights {
    fn default() -> Self {
        Self {
            confidence: 1.0,
            clarity: 1.0,
            enthusiasm: 1.0,
            filler_penalty: 1.0,
            volume_adequacy: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FacialWeights {
    pub eye_contact: f64,
    pub engagement: f64,
    pub confidence: f64,
    pub naturalness: f64,
    pub head_stability: f64,
}

impl Default for FacialWeights {
    fn default() -> Self {
        Self {
            eye_contact: 1.0,
            engagement: 1.0,
            confidence: 1.0,
            naturalness: 1.0,
            head_stability: 1.0,
        }
    }
}

/// How much the voice side counts against the facial side in combined scores.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceBalance {
    pub voice: f64,
    pub facial: f64,
}

impl Default for SourceBalance {
    fn default() -> Self {
        Self {
            voice: 0.5,
            facial: 0.5,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            voice: VoiceWeights::default(),
            facial: FacialWeights::default(),
            balance: SourceBalance::default(),
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let v = self.voice;
        let f = self.facial;
        check_weights(&[
            v.confidence,
            v.clarity,
            v.enthusiasm,
            v.filler_penalty,
            v.volume_adequacy,
        ])?;
        check_weights(&[
            f.eye_contact,
            f.engagement,
            f.confidence,
            f.naturalness,
            f.head_stability,
        ])?;
        check_weights(&[self.balance.voice, self.balance.facial])
    }
}

fn check_weights(weights: &[f64]) -> Result<(), ConfigError> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(ConfigError::NegativeWeight);
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(ConfigError::ZeroWeights);
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Length of a practice session. Also the horizon of the metric windows.
    pub session_duration: Duration,
    pub audio_tick: Duration,
    pub video_frame: Duration,
    pub emotion_horizon: Duration,
    /// Silence between finalized utterances longer than this counts as a pause.
    pub pause_threshold: Duration,
    pub join_timeout: Duration,
    pub snapshot_buffer: usize,
    pub weights: ScoringWeights,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_duration: Duration::from_secs(DEFAULT_SESSION_SECS),
            audio_tick: Duration::from_millis(DEFAULT_AUDIO_TICK_MS),
            video_frame: Duration::from_millis(DEFAULT_VIDEO_FRAME_MS),
            emotion_horizon: Duration::from_secs(DEFAULT_EMOTION_HORIZON_SECS),
            pause_threshold: Duration::from_millis(DEFAULT_PAUSE_THRESHOLD_MS),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
            snapshot_buffer: DEFAULT_SNAPSHOT_BUFFER,
            weights: ScoringWeights::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("session_duration", self.session_duration),
            ("audio_tick", self.audio_tick),
            ("video_frame", self.video_frame),
            ("emotion_horizon", self.emotion_horizon),
            ("pause_threshold", self.pause_threshold),
            ("join_timeout", self.join_timeout),
        ];
        if let Some((name, _)) = named.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration(*name));
        }
        if self.snapshot_buffer == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        self.weights.validate()
    }

    /// Applies the environment overrides on top of `self`.
    pub fn with_env(mut self, env: &impl Env) -> Result<Self, ConfigError> {
        if let Some(secs) = resolve_u64(None, ENV_SESSION_SECS, env)? {
            self.session_duration = Duration::from_secs(secs);
        }
        if let Some(ms) = resolve_u64(None, ENV_JOIN_TIMEOUT_MS, env)? {
            self.join_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = resolve_u64(None, ENV_AUDIO_TICK_MS, env)? {
            self.audio_tick = Duration::from_millis(ms);
        }
        if let Some(ms) = resolve_u64(None, ENV_VIDEO_FRAME_MS, env)? {
            self.video_frame = Duration::from_millis(ms);
        }
        self.validate()?;
        Ok(self)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be > 0")]
    ZeroDuration(&'static str),
    #[error("snapshot buffer must hold at least one message")]
    ZeroBuffer,
    #[error("scoring weights must be finite and non-negative")]
    NegativeWeight,
    #[error("at least one scoring weight must be > 0")]
    ZeroWeights,
    #[error("{key} is not a valid number: {value:?}")]
    InvalidNumber { key: String, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// CLI value first, then the environment. Malformed environment values are an error
/// rather than silently falling back to the default.
pub fn resolve_u64(
    cli_value: Option<u64>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<u64>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(v)),
        None => match env.var(env_key) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidNumber {
                    key: env_key.to_owned(),
                    value: raw,
                }),
            None => Ok(None),
        },
    }
}

pub fn resolve_u64_with_default(
    cli_value: Option<u64>,
    env_key: &str,
    env: &impl Env,
    default: u64,
) -> Result<u64, ConfigError> {
    Ok(resolve_u64(cli_value, env_key, env)?.unwrap_or(default))
}
