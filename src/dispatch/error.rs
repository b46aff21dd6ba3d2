use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that stop a dispatch run before any email goes out.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("invalid batch configuration: {0}")]
    InvalidConfig(String),
    #[error("job could not start: {0}")]
    JobConflict(String),
}

/// Rendering failures. Local to one recipient; never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("missing template variables: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
}

/// Failure reported by an [`EmailTransport`](super::EmailTransport). Every
/// variant is treated as transient and retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport rejected message: {0}")]
    Rejected(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),
}
