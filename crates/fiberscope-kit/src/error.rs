//! Panel-side error taxonomy.

use fiberscope_codec::DecodeError;
use fiberscope_rpc::RpcError;
use thiserror::Error;

/// Failure of a panel-side operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying RPC call failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The response payload could not be decoded off the wire.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The payload decoded but did not have the expected shape.
    #[error("malformed payload: {message}")]
    Payload {
        /// Description of the shape mismatch.
        message: String,
    },
}

impl ClientError {
    pub(crate) fn payload(message: impl Into<String>) -> Self {
        Self::Payload {
            message: message.into(),
        }
    }
}
