use fdfs_common::BackendError;

/// Why a facade operation failed.
///
/// The variants separate "never reached a storage node" from "the transfer
/// broke" from "the storage node answered with an error status", so callers
/// can branch on the kind instead of a sentinel.
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("storage connection unavailable: {0}")]
    ConnectionUnavailable(String),
    #[error("{op} transfer failed: {source}")]
    TransferFailed {
        op: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("storage rejected {op} with status {code}")]
    BackendRejected { op: &'static str, code: u8 },
    #[error("invalid {op} request: {reason}")]
    InvalidRequest { op: &'static str, reason: String },
}

impl FacadeError {
    pub fn from_backend(op: &'static str, err: BackendError) -> Self {
        match err {
            BackendError::Status { code } => FacadeError::BackendRejected { op, code },
            BackendError::Unavailable(reason) => FacadeError::ConnectionUnavailable(reason),
            BackendError::InvalidArgument(reason) => FacadeError::InvalidRequest { op, reason },
            source => FacadeError::TransferFailed { op, source },
        }
    }

    /// Result code in the delete convention: the storage status when the
    /// backend answered, `-1` when the request never completed.
    pub fn result_code(&self) -> i32 {
        match self {
            FacadeError::BackendRejected { code, .. } => i32::from(*code),
            _ => -1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("storage discovery failed: {0}")]
    Discovery(#[source] BackendError),
}
