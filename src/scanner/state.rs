use serde::Serialize;

/// Scanner lifecycle.
///
/// ```text
/// Uninitialized -> InitializingModel -> InitializingCamera -> Scanning <-> Capturing
///                        |                     |                 |            |
///                        +------> Error <------+                 +-> Stopped <+
/// ```
///
/// Any non-terminal state may move to `Stopped`. `Error` and `Stopped` are
/// terminal; a new scanner must be built to scan again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ScannerState {
    Uninitialized,
    InitializingModel,
    InitializingCamera,
    Scanning,
    Capturing,
    Stopped,
    Error(String),
}

impl ScannerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScannerState::Stopped | ScannerState::Error(_))
    }

    /// True for states that hold (or are acquiring) the camera.
    pub fn holds_camera(&self) -> bool {
        matches!(
            self,
            ScannerState::InitializingCamera | ScannerState::Scanning | ScannerState::Capturing
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &ScannerState) -> bool {
        use ScannerState::*;
        match (self, next) {
            (Error(_), _) => false,
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Uninitialized, InitializingModel) => true,
            (InitializingModel, InitializingCamera) => true,
            (InitializingModel, Error(_)) => true,
            (InitializingCamera, Scanning) => true,
            (InitializingCamera, Error(_)) => true,
            (Scanning, Capturing) => true,
            (Scanning, Error(_)) => true,
            (Capturing, Scanning) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ScannerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScannerState::Uninitialized => write!(f, "uninitialized"),
            ScannerState::InitializingModel => write!(f, "initializing model"),
            ScannerState::InitializingCamera => write!(f, "initializing camera"),
            ScannerState::Scanning => write!(f, "scanning"),
            ScannerState::Capturing => write!(f, "capturing"),
            ScannerState::Stopped => write!(f, "stopped"),
            ScannerState::Error(reason) => write!(f, "error ({})", reason),
        }
    }
}
