pub mod audit;
pub mod block;
pub mod events;
pub mod interval;
pub mod repository;
pub mod reservation;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Invalid status value: {0}")]
    InvalidStatus(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
