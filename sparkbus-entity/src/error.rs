use thiserror::Error;

/// Why a publish attempt was refused or failed.
///
/// Publish failures never raise beyond this result; the caller is free to fix
/// the precondition and retry.
#[derive(Error, Debug, PartialEq)]
pub enum PublishError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("entity has no metrics registered")]
    EmptyEntity,
    #[error("no birth certificate published since the last connect")]
    BirthRequired,
    #[error("no updated metrics to publish")]
    NoUpdates,
    #[error("no commands provided")]
    NoCommands,
}

/// Errors raised when registering an entity with the router.
#[derive(Error, Debug, PartialEq)]
pub enum RegistrationError {
    #[error("an entity with the same identity is already registered")]
    Duplicate,
    #[error("invalid name: {0}")]
    InvalidName(String),
}
