//! Batteries-included assembly of the devtools host and panel.
//!
//! The lower crates each own one concern: the codec for cyclic payloads,
//! the channel and handshake, the RPC engine, tree inspection, and the
//! plugin lifecycle. This crate wires them into the two deliverables an
//! embedding actually uses: a [`HostSession`] running inside the
//! instrumented page and a [`ClientSession`] running in the panel, plus
//! presets for the in-process and iframe embeddings.

pub mod api;
pub mod client;
pub mod error;
pub mod host;
pub mod presets;

pub use self::client::{ClientSession, PluginDescriptor, TreeStore};
pub use self::error::ClientError;
pub use self::host::{HostOptions, HostSession};
pub use self::presets::{DevtoolsPair, IframeHost, IframePanel, linked};

#[cfg(test)]
mod tests;
