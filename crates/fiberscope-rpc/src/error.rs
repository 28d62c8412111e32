//! RPC error types.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::WireErrorKind;

/// Errors surfaced to the caller of an RPC method.
///
/// Every variant is local to one call: a failed call never affects other
/// in-flight calls or the channel itself, except [`RpcError::ChannelClosed`]
/// which reports that the endpoint was torn down.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No response arrived within the configured deadline.
    #[error("call to '{method}' timed out after {timeout:?}")]
    Timeout {
        /// The method that was invoked.
        method: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The endpoint was torn down; no further calls are accepted.
    #[error("rpc channel closed")]
    ChannelClosed,

    /// The remote side has no handler registered under this name.
    #[error("remote method '{method}' not found")]
    MethodNotFound {
        /// The method that was invoked.
        method: String,
    },

    /// The remote handler ran and reported a failure.
    #[error("remote call to '{method}' failed: {message}")]
    Remote {
        /// The method that was invoked.
        method: String,
        /// The remote failure description.
        message: String,
    },

    /// The outgoing envelope could not be serialised.
    #[error("failed to serialise envelope: {message}")]
    SerializeEnvelope {
        /// Description of the serialisation failure.
        message: String,
    },
}

/// Failure reported by a local handler back to the remote caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    kind: WireErrorKind,
    message: String,
}

impl HandlerError {
    /// Creates a generic handler failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: WireErrorKind::Handler,
            message: message.into(),
        }
    }

    /// Creates a failure describing malformed or missing arguments.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self {
            kind: WireErrorKind::Handler,
            message: format!("invalid arguments: {}", message.into()),
        }
    }

    /// Creates a failure that propagates as [`RpcError::MethodNotFound`].
    ///
    /// Used by dispatching handlers (e.g. plugin method routing) whose
    /// lookup happens inside the handler body.
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self {
            kind: WireErrorKind::MethodNotFound,
            message: message.into(),
        }
    }

    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> WireErrorKind {
        self.kind
    }

    /// Returns the failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
