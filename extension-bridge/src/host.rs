// Host window abstraction
// The browser `Window` in production, an in-process loopback in tests

use serde_json::Value;

use crate::error::Result;
use crate::protocol::InboundEvent;

pub type MessageListener = Box<dyn Fn(InboundEvent)>;

/// The messaging surface of the window the page shares with the extension's
/// content script.
pub trait HostWindow {
    /// `window.postMessage(message, target_origin)`
    fn post_message(&self, message: &Value, target_origin: &str) -> Result<()>;

    /// Install a listener for `message` events. Listeners stay installed for
    /// the lifetime of the window.
    fn add_message_listener(&self, listener: MessageListener) -> Result<()>;

    /// Mark the window as carrying a bridge listener. Returns `false` if
    /// another bridge already claimed it; a window hosts one bridge.
    fn claim_bridge_listener(&self) -> bool;
}
