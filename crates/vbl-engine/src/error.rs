//! Engine-level error: domain failures plus store failures.

use vbl_domain::DomainError;
use vbl_store::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Domain(DomainError),
    Store(StoreError),
}

impl EngineError {
    /// Stable reason code for events and API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain(e) => e.code(),
            Self::Store(_) => "store_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Domain(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<DomainError> for EngineError {
    fn from(e: DomainError) -> Self {
        Self::Domain(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<vbl_domain::BreachReason> for EngineError {
    fn from(r: vbl_domain::BreachReason) -> Self {
        Self::Domain(DomainError::Guardrail(r))
    }
}

impl From<vbl_domain::TransitionError> for EngineError {
    fn from(e: vbl_domain::TransitionError) -> Self {
        Self::Domain(DomainError::Transition(e))
    }
}
