//! Error types for the onboarding gate.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Profile store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

/// Identity service errors.
///
/// Never fatal to the gate: any of these resolves the session to absent.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity request failed: {0}")]
    RequestFailed(String),

    #[error("Identity service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from identity service: {0}")]
    InvalidResponse(String),
}

/// Leaf screen errors, surfaced inline next to the form.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("{0}")]
    Invalid(String),

    #[error("Finish the earlier setup steps first")]
    OutOfOrder { expected_path: &'static str },

    #[error("No profile exists for this account yet")]
    ProfileMissing,

    #[error("We couldn't save that. Please try again.")]
    SaveFailed(#[source] DatabaseError),
}

impl ScreenError {
    /// Whether the failure came from the user's input rather than the store.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::OutOfOrder { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_errors_read_as_inline_messages() {
        let err = ScreenError::Invalid("Please choose a church.".into());
        assert_eq!(err.to_string(), "Please choose a church.");
        assert!(err.is_user_error());

        let err = ScreenError::SaveFailed(DatabaseError::Query("boom".into()));
        assert_eq!(err.to_string(), "We couldn't save that. Please try again.");
        assert!(!err.is_user_error());
    }

    #[test]
    fn timeout_names_the_operation() {
        let err = DatabaseError::Timeout {
            operation: "get_profile",
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "get_profile timed out after 250ms");
    }
}
