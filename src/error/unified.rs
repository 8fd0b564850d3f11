//! Error classification and recovery hints.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Cancelled,
    Network,
    Server,
    Api,
    Configuration,
    Serialization,
    Unknown,
}

/// Suggested recovery action shown alongside a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    FixInput,
    SignInAgain,
    TryAgain,
    CheckConfiguration,
    ContactSupport,
}

impl RecoverySuggestion {
    /// One-line hint printed under an error.
    pub fn hint(self) -> &'static str {
        match self {
            Self::FixInput => "Check the values you entered and try again.",
            Self::SignInAgain => "Sign in again with `quillpad auth login`.",
            Self::TryAgain => "Try again in a moment.",
            Self::CheckConfiguration => "Check QUILLPAD_* settings in the environment or .env.",
            Self::ContactSupport => "If this keeps happening, report it with the log output (RUST_LOG=debug).",
        }
    }
}
