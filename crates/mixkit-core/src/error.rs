//! Error types for mixkit-core.

use crate::segment::Field;
use thiserror::Error;

/// Error type for mixkit-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unknown sample encoding: {0}")]
    UnknownEncoding(u8),

    #[error("The segment does not implement this operation")]
    NotImplemented,

    #[error("The object has not been started yet")]
    NotInitialized,

    #[error("No input or output port exists at location {0}")]
    InvalidLocation(u32),

    #[error("The segment does not recognise the field {0:?}")]
    InvalidField(Field),

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),

    #[error("The object has already been started")]
    AlreadyStarted,

    #[error("The object has already been ended")]
    AlreadyEnded,

    #[error("A read was requested on a buffer with no committed data")]
    BufferEmpty,

    #[error("A write was requested on a buffer with no free space")]
    BufferFull,

    #[error("More data was committed to the buffer than was reserved")]
    BufferOvercommit,

    #[error("An input or output port is missing its buffer")]
    BufferMissing,

    #[error("Unsupported channel configuration: {0} channels")]
    BadChannelConfiguration(u8),

    #[error("A segment named '{0}' is already registered")]
    DuplicateSegment(String),

    #[error("No segment named '{0}' is registered")]
    UnknownSegment(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
