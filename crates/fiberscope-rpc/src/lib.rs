//! Call/response RPC engine multiplexed over one transport channel.
//!
//! An [`RpcEndpoint`] exposes two symmetric surfaces: a table of locally
//! implemented methods the remote side can invoke, and [`RpcEndpoint::call`]
//! for invoking the remote side's table. Every call carries a
//! process-unique correlation id; responses are matched by id, so any number
//! of calls can be in flight at once and complete in any order. A call exits
//! through exactly one of three paths: a matching response, the configured
//! timeout, or endpoint teardown.
//!
//! Publish/subscribe events ride the same channel as [`Envelope::Event`]
//! messages. Subscribing is a degenerate RPC call (`rpc.subscribe`) that
//! returns a disposer; the remote side forwards matching topics until the
//! disposer unsubscribes or the channel closes.

pub mod endpoint;
pub mod error;
pub mod presets;
pub mod protocol;

pub use self::endpoint::{
    EventCallback, EventSubscription, HandlerFn, HandlerTable, RpcEndpoint, RpcOptions,
};
pub use self::error::{HandlerError, RpcError};
pub use self::protocol::{Envelope, WireError, WireErrorKind};

#[cfg(test)]
mod tests;
