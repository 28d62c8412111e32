//! Wire envelopes exchanged between RPC endpoints.

use fiberscope_codec::WireValue;
use serde::{Deserialize, Serialize};

/// Method name of the internal subscription call.
pub(crate) const SUBSCRIBE_METHOD: &str = "rpc.subscribe";

/// Method name of the internal unsubscription call.
pub(crate) const UNSUBSCRIBE_METHOD: &str = "rpc.unsubscribe";

/// One RPC message, serialised as a single JSON payload per channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Invocation of a method on the receiving side's handler table.
    Call {
        /// Correlation id, unique per originating side.
        id: u64,
        /// The method to invoke.
        method: String,
        /// Encoded arguments.
        args: Vec<WireValue>,
    },
    /// Outcome of a previously received call.
    Response {
        /// Correlation id of the call this answers.
        id: u64,
        /// The result on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<WireValue>,
        /// The error on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
    /// Fire-and-forget event for a subscribed topic.
    Event {
        /// Topic name (`pluginId:eventName` convention).
        topic: String,
        /// Encoded event payload.
        payload: WireValue,
    },
}

/// Error object carried inside a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Failure classification.
    pub kind: WireErrorKind,
    /// Human-readable failure description.
    pub message: String,
}

/// Classification of a remote call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    /// The call named a method outside the receiving side's table.
    MethodNotFound,
    /// The handler ran and reported a failure.
    Handler,
    /// The receiving side could not decode the arguments.
    Decode,
}
