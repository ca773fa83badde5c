use thiserror::Error;

pub type CollabResult<T> = std::result::Result<T, CollabError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollabError {
    /// A session, participant, or queue item doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    /// The session is private and the access code is missing or wrong
    #[error("Access to this session was denied")]
    AccessDenied,
    /// Someone in the session already goes by this nickname
    #[error("Nickname {0} is already taken in this session")]
    NicknameTaken(String),
    /// No free session code was found within the allowed attempts
    #[error("Could not find a free session code after {attempts} attempts")]
    CodeExhausted { attempts: usize },
    /// The requester is not allowed to perform this action
    #[error("Not allowed to {action}")]
    Forbidden { action: &'static str },
    /// The request was based on host or session state that has since been superseded
    #[error("Request is stale: {reason}")]
    Stale { reason: &'static str },
    /// The input is malformed
    #[error("Invalid input: {0}")]
    Validation(String),
}

impl CollabError {
    pub(crate) fn not_found(resource: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            resource,
            identifier: identifier.to_string(),
        }
    }
}
