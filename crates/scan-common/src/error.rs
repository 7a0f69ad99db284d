use thiserror::Error;

/// Scan driver error types covering configuration, lifecycle, and timer failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScanError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The external engine rejected initialization.
    #[error("engine init failed with status {code}: {reason}")]
    EngineInit {
        /// Nonzero status reported by the engine.
        code: i32,
        /// Human-readable reason.
        reason: String,
    },

    /// The periodic timer or its tick worker could not be created.
    #[error("timer creation failed: {0}")]
    TimerCreate(String),

    /// Interrupt handler installation failed.
    #[error("signal handler error: {0}")]
    Signal(String),

    /// Real-time setup failed while `fail_fast` was requested.
    #[error("real-time setup failed: {0}")]
    Realtime(String),

    /// Generic runtime fault.
    #[error("runtime fault: {0}")]
    Fault(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl ScanError {
    /// Process status code for this failure. Zero is reserved for success.
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::EngineInit { code, .. } => (*code).max(1),
            Self::Config(_) => 2,
            Self::TimerCreate(_) => 3,
            Self::Realtime(_) => 4,
            Self::InvalidStateTransition { .. } => 5,
            Self::Signal(_) | Self::Fault(_) => 1,
        }
    }
}

/// Convenience type alias for scan driver operations.
pub type ScanResult<T> = Result<T, ScanError>;
