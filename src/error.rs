//! Error types for attendance operations.

use crate::types::{CommunityId, PersonId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which state-machine rule a transition violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateViolation {
    NotCheckedIn,
    AlreadyCheckedIn,
    AlreadyCheckedOut,
}

impl StateViolation {
    pub fn as_str(self) -> &'static str {
        match self {
            StateViolation::NotCheckedIn => "not-checked-in",
            StateViolation::AlreadyCheckedIn => "already-checked-in",
            StateViolation::AlreadyCheckedOut => "already-checked-out",
        }
    }
}

impl fmt::Display for StateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure classification reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InvalidState,
    ConcurrencyConflict,
    Internal,
}

/// Main error type for attendance operations.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Person not found: {0}")]
    PersonNotFound(PersonId),

    #[error("Community not found: {0}")]
    CommunityNotFound(CommunityId),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid state: {0}")]
    InvalidState(StateViolation),

    #[error("Concurrent update conflict on {0}")]
    ConcurrencyConflict(PersonId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Write would break attendance ordering for {0}")]
    OrderingViolation(PersonId),
}

impl AttendanceError {
    /// Classify this error into the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttendanceError::InvalidArgument(_) | AttendanceError::AlreadyExists(_) => {
                ErrorKind::InvalidArgument
            }
            AttendanceError::PersonNotFound(_) | AttendanceError::CommunityNotFound(_) => {
                ErrorKind::NotFound
            }
            AttendanceError::InvalidState(_) => ErrorKind::InvalidState,
            AttendanceError::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            AttendanceError::Io(_)
            | AttendanceError::Serialization(_)
            | AttendanceError::Deserialization(_)
            | AttendanceError::Corruption(_)
            | AttendanceError::InvalidFormat(_)
            | AttendanceError::Locked
            | AttendanceError::NotInitialized
            | AttendanceError::OrderingViolation(_) => ErrorKind::Internal,
        }
    }

    /// The violated rule, if this is a state-machine error.
    pub fn state_violation(&self) -> Option<StateViolation> {
        match self {
            AttendanceError::InvalidState(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<rmp_serde::encode::Error> for AttendanceError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        AttendanceError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for AttendanceError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        AttendanceError::Deserialization(e.to_string())
    }
}

/// Result type for attendance operations.
pub type Result<T> = std::result::Result<T, AttendanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let id = PersonId::parse("P1").unwrap();
        assert_eq!(
            AttendanceError::PersonNotFound(id.clone()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AttendanceError::ConcurrencyConflict(id).kind(),
            ErrorKind::ConcurrencyConflict
        );
        assert_eq!(AttendanceError::Locked.kind(), ErrorKind::Internal);
        assert_eq!(
            AttendanceError::AlreadyExists("C1".into()).kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_state_violation_message() {
        let err = AttendanceError::InvalidState(StateViolation::AlreadyCheckedOut);
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.to_string(), "Invalid state: already-checked-out");
        assert_eq!(
            err.state_violation(),
            Some(StateViolation::AlreadyCheckedOut)
        );
    }
}
