use shared::{
    domain::MemberId,
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderingError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("scope consistency violated: {0}")]
    ScopeConsistency(String),
    #[error("shift cascade interrupted at member {member_id}: {source}")]
    CascadeInterrupted {
        member_id: MemberId,
        source: anyhow::Error,
    },
    #[error("pivot store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl OrderingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::Validation(_) => ErrorCode::Validation,
            Self::ScopeConsistency(_) => ErrorCode::ScopeConsistency,
            Self::CascadeInterrupted { .. } => ErrorCode::CascadeInterrupted,
            Self::Store(_) => ErrorCode::Internal,
        }
    }
}

impl From<OrderingError> for ApiError {
    fn from(value: OrderingError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}
