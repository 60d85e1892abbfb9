//! Gate Error Types
//!
//! Gate-specific error variants that integrate with the unified
//! `kernel::error::AppError` system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

use crate::domain::provider::IdentityError;

/// Gate-specific result type alias
pub type GateResult<T> = Result<T, GateError>;

#[derive(Debug, Error)]
pub enum GateError {
    /// Wrong credentials. Deliberately silent about whether the email exists.
    #[error("Invalid credentials")]
    InvalidCredentials { remaining_attempts: u32 },

    /// Sign-in form locked after repeated failures
    #[error("Too many failed attempts, locked for {remaining_seconds}s")]
    Locked { remaining_seconds: u32 },

    /// Identity provider unreachable during sign-in. Counted as a failure.
    #[error("Identity provider unavailable")]
    Network {
        message: String,
        remaining_attempts: u32,
    },

    /// Another sign-in for the same sector is still in flight
    #[error("A sign-in attempt is already in progress")]
    SubmitInFlight,

    /// Malformed email in the sign-in form
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Provider refused or failed to sign out; the session is unchanged
    #[error("Sign-out failed: {0}")]
    SignOut(String),

    /// Session did not become ready in time
    #[error("Session is still loading")]
    SessionLoading,

    #[error("Unknown sector: {0}")]
    UnknownSector(String),

    /// Missing required header
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// Persisted override slot could not be read or written
    #[error("Override store error: {0}")]
    OverrideStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::InvalidCredentials { .. } => ErrorKind::Unauthorized,
            GateError::Locked { .. } => ErrorKind::Locked,
            GateError::Network { .. } | GateError::SignOut(_) | GateError::SessionLoading => {
                ErrorKind::ServiceUnavailable
            }
            GateError::SubmitInFlight => ErrorKind::Conflict,
            GateError::InvalidEmail(_) | GateError::MissingHeader(_) => ErrorKind::BadRequest,
            GateError::UnknownSector(_) => ErrorKind::NotFound,
            GateError::OverrideStore(_) | GateError::Config(_) | GateError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// Attempts left before a lockout, for sign-in failures
    pub fn remaining_attempts(&self) -> Option<u32> {
        match self {
            GateError::InvalidCredentials { remaining_attempts }
            | GateError::Network {
                remaining_attempts, ..
            } => Some(*remaining_attempts),
            _ => None,
        }
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        let err = AppError::new(self.kind(), self.to_string());
        match self {
            GateError::InvalidCredentials { remaining_attempts } => err.with_action(format!(
                "{remaining_attempts} attempt(s) remaining before a temporary lockout"
            )),
            GateError::Locked { remaining_seconds } => err
                .with_action("Wait for the lockout to expire")
                .with_retry_after(*remaining_seconds),
            GateError::Network {
                remaining_attempts, ..
            } => err.with_action(format!(
                "Try again. {remaining_attempts} attempt(s) remaining before a temporary lockout"
            )),
            GateError::SubmitInFlight => err.with_action("Wait for the current attempt to finish"),
            GateError::SessionLoading => err.with_retry_after(1),
            _ => err,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            GateError::OverrideStore(msg) | GateError::Config(msg) | GateError::Internal(msg) => {
                tracing::error!(message = %msg, "Gate internal error");
            }
            GateError::InvalidCredentials { remaining_attempts } => {
                tracing::warn!(remaining_attempts, "Invalid sign-in attempt");
            }
            GateError::Locked { remaining_seconds } => {
                tracing::warn!(remaining_seconds, "Sign-in attempt while locked");
            }
            GateError::Network { message, .. } => {
                tracing::warn!(error = %message, "Identity provider unavailable during sign-in");
            }
            GateError::SignOut(msg) => {
                tracing::warn!(error = %msg, "Sign-out failed");
            }
            _ => {
                tracing::debug!(error = %self, "Gate error");
            }
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<IdentityError> for GateError {
    /// Sign-out failures only. Sign-in failures need the attempt count and are
    /// converted by the login gate.
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::SignOut(msg) | IdentityError::Network(msg) => GateError::SignOut(msg),
            IdentityError::InvalidCredentials => {
                GateError::SignOut("provider rejected the session".to_string())
            }
        }
    }
}

impl From<AppError> for GateError {
    fn from(err: AppError) -> Self {
        GateError::Internal(err.to_string())
    }
}

impl From<platform::client::FingerprintError> for GateError {
    fn from(err: platform::client::FingerprintError) -> Self {
        match err {
            platform::client::FingerprintError::MissingHeader(header) => {
                GateError::MissingHeader(header)
            }
        }
    }
}
