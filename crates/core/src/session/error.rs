use crate::capture::DeviceError;
use crate::config::ConfigError;
use crate::metrics::MetricSource;
use crate::session::SessionPhase;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("permission to use the microphone or camera was denied")]
    DevicePermissionDenied,

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("speech transcription unavailable")]
    TranscriptionUnavailable,

    #[error("{analyzer:?} analysis did not finish before the join deadline")]
    AnalysisJoinTimeout { analyzer: MetricSource },

    #[error("cannot {operation} while {from}")]
    InvalidStateTransition {
        from: SessionPhase,
        operation: &'static str,
    },

    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Errors that end the session attempt and need a reset before retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::DevicePermissionDenied | SessionError::DeviceUnavailable(_)
        )
    }
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied => SessionError::DevicePermissionDenied,
            DeviceError::Unavailable(reason) => SessionError::DeviceUnavailable(reason),
            DeviceError::TrackLost => SessionError::DeviceUnavailable(err.to_string()),
        }
    }
}
