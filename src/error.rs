use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::stream::StreamError;

/// Every failure the primers can report.
#[derive(Error, Debug)]
pub enum PrimerError {
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("task was dropped before it produced a result")]
    TaskDropped,

    #[error("timed out after {0:?} waiting for a result")]
    Timeout(Duration),

    #[error("pool '{0}' is shut down and rejects new jobs")]
    PoolShutdown(String),

    #[error("pool '{0}' needs at least one worker")]
    EmptyPool(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("subscriber is gone")]
    SubscriberGone,

    #[error("stream failed: {0}")]
    Stream(#[from] StreamError),

    #[error("invalid object name '{name}': {reason}")]
    InvalidObjectName { name: String, reason: String },

    #[error("object '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no object registered as '{0}'")]
    UnknownObject(String),

    #[error("'{object}' has no attribute '{attribute}'")]
    UnknownAttribute { object: String, attribute: String },

    #[error("attribute '{0}' is read-only")]
    ReadOnlyAttribute(String),

    #[error("'{object}' has no operation '{operation}'")]
    UnknownOperation { object: String, operation: String },

    #[error("invalid argument for '{operation}': {reason}")]
    InvalidArgument { operation: String, reason: String },

    #[error("unknown console command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PrimerError {
    pub fn invalid_argument(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for PrimerError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            PrimerError::TaskFailed("task was cancelled".to_string())
        } else {
            PrimerError::TaskFailed(format!("task panicked: {err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, PrimerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_object() {
        let err = PrimerError::UnknownAttribute {
            object: "primers:type=Greeter".to_string(),
            attribute: "colour".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("primers:type=Greeter"));
        assert!(display.contains("colour"));
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err: PrimerError = ConfigError::invalid("pool.inner_workers", "must be at least 1").into();
        assert_eq!(
            err.to_string(),
            "invalid value for 'pool.inner_workers': must be at least 1"
        );
    }

    #[tokio::test]
    async fn test_join_error_becomes_task_failed() {
        let handle = tokio::spawn(async { panic!("boom") });
        let err: PrimerError = handle.await.unwrap_err().into();
        assert!(matches!(err, PrimerError::TaskFailed(msg) if msg.contains("panicked")));
    }
}
