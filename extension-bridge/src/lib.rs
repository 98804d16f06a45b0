//! Page-side bridge to the Lunie browser extension.
//!
//! The web page never sees private keys. It asks the extension for accounts
//! and signatures over `window.postMessage`:
//!
//! - [`dispatcher`] posts `GET_WALLETS` and `LUNIE_SIGN_REQUEST` envelopes
//! - [`router`] listens once per window and reacts to extension envelopes
//! - [`correlator`] turns the sign round trip into an awaitable with timeout,
//!   cancellation and supersession
//! - [`store`] holds availability and account state behind a Vuex-style
//!   `commit` / `dispatch` sink

pub mod bridge;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod loopback;
pub mod protocol;
pub mod router;
pub mod store;
mod timer;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use bridge::ExtensionBridge;
pub use config::{BridgeConfig, ConfigFile};
pub use correlator::{CorrelatorState, Signature};
pub use error::{BridgeError, Result};
pub use host::HostWindow;
pub use protocol::{Account, ExtensionMessage, InboundEvent, PageMessage, SignResponse};
pub use store::{Action, ExtensionStore, Mutation, StateSink};
