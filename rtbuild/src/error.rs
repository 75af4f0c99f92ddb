//! Error types for rtbuild

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RtasError {
    #[error("Invalid null handle")]
    InvalidNullHandle,

    #[error("Invalid null pointer: {0}")]
    InvalidNullPointer(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid enumeration: {0}")]
    InvalidEnumeration(String),

    #[error("Operands incompatible: {0}")]
    OperandsIncompatible(String),

    #[error("Handle object in use")]
    HandleObjectInUse,

    #[error("Out of host memory: {0}")]
    OutOfHostMemory(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl RtasError {
    pub(crate) fn null_pointer(what: impl Into<String>) -> Self {
        Self::InvalidNullPointer(what.into())
    }

    pub(crate) fn argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    pub(crate) fn enumeration(what: impl Into<String>) -> Self {
        Self::InvalidEnumeration(what.into())
    }

    /// Returns the public status code for this error.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::InvalidNullHandle => ResultCode::ErrorInvalidNullHandle,
            Self::InvalidNullPointer(_) => ResultCode::ErrorInvalidNullPointer,
            Self::InvalidArgument(_) => ResultCode::ErrorInvalidArgument,
            Self::InvalidEnumeration(_) => ResultCode::ErrorInvalidEnumeration,
            Self::OperandsIncompatible(_) => ResultCode::ErrorOperandsIncompatible,
            Self::HandleObjectInUse => ResultCode::ErrorHandleObjectInUse,
            Self::OutOfHostMemory(_) => ResultCode::ErrorOutOfHostMemory,
            Self::Unknown(_) => ResultCode::ErrorUnknown,
        }
    }
}

/// Flat status taxonomy reported by every entry point.
///
/// `ErrorHandleObjectInUse` doubles as the "accepted, check join" status of an
/// asynchronous build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    ErrorInvalidNullHandle,
    ErrorInvalidNullPointer,
    ErrorInvalidArgument,
    ErrorInvalidEnumeration,
    ErrorOperandsIncompatible,
    ErrorHandleObjectInUse,
    ErrorOutOfHostMemory,
    ErrorUnknown,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl<T> From<&Result<T>> for ResultCode {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.code(),
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

pub type Result<T> = std::result::Result<T, RtasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        assert_eq!(
            RtasError::InvalidNullHandle.code(),
            ResultCode::ErrorInvalidNullHandle
        );
        assert_eq!(
            RtasError::argument("x").code(),
            ResultCode::ErrorInvalidArgument
        );
        assert_eq!(
            RtasError::OutOfHostMemory("rtas".into()).code(),
            ResultCode::ErrorOutOfHostMemory
        );
    }

    #[test]
    fn test_code_from_result() {
        let ok: Result<u32> = Ok(3);
        let err: Result<u32> = Err(RtasError::enumeration("quality"));
        assert!(ResultCode::from(&ok).is_success());
        assert_eq!(ResultCode::from(&err), ResultCode::ErrorInvalidEnumeration);
    }
}
