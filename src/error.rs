/// Failure taxonomy for the navigation core.
///
/// These travel inside `anyhow::Error`; callers that need to branch on the
/// kind (fatal vs. skip-the-cycle) recover it with `downcast_ref::<NavError>()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavError {
    /// The capture device could not be opened. Fatal at startup, never retried.
    DeviceUnavailable { device: String, reason: String },
    /// A single capture failed. The acquisition loop keeps running.
    TransientCaptureFailure { device: String, reason: String },
    /// The detector model could not be loaded. Fatal.
    ModelLoadFailure { model: String, reason: String },
    /// An action name outside the four canonical actions.
    UnknownAction(String),
}

impl NavError {
    pub fn code(&self) -> &'static str {
        match self {
            NavError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            NavError::TransientCaptureFailure { .. } => "TRANSIENT_CAPTURE_FAILURE",
            NavError::ModelLoadFailure { .. } => "MODEL_LOAD_FAILURE",
            NavError::UnknownAction(_) => "UNKNOWN_ACTION",
        }
    }

    /// Fatal errors halt the orchestrator instead of skipping a cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NavError::DeviceUnavailable { .. } | NavError::ModelLoadFailure { .. }
        )
    }

    /// Returns true when `err` carries a fatal `NavError` anywhere in its chain.
    pub fn is_fatal_error(err: &anyhow::Error) -> bool {
        err.chain()
            .filter_map(|cause| cause.downcast_ref::<NavError>())
            .any(NavError::is_fatal)
    }
}

impl std::fmt::Display for NavError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavError::DeviceUnavailable { device, reason } => {
                write!(f, "{}: cannot open {}: {}", self.code(), device, reason)
            }
            NavError::TransientCaptureFailure { device, reason } => {
                write!(f, "{}: {}: {}", self.code(), device, reason)
            }
            NavError::ModelLoadFailure { model, reason } => {
                write!(f, "{}: {}: {}", self.code(), model, reason)
            }
            NavError::UnknownAction(action) => write!(f, "{}: {}", self.code(), action),
        }
    }
}

impl std::error::Error for NavError {}
