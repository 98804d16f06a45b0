// Outbound requests from the page to the extension

use std::rc::Rc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::correlator::{self, Correlator, Signature};
use crate::error::Result;
use crate::host::HostWindow;
use crate::protocol::{Envelope, PageMessage, SignRequest};

pub struct Dispatcher<W> {
    window: Rc<W>,
    correlator: Rc<Correlator>,
    target_origin: String,
    sign_timeout: Duration,
}

impl<W: HostWindow> Dispatcher<W> {
    pub fn new(window: Rc<W>, correlator: Rc<Correlator>, config: &BridgeConfig) -> Self {
        Self {
            window,
            correlator,
            target_origin: config.target_origin.clone(),
            sign_timeout: config.sign_timeout(),
        }
    }

    fn post(&self, message: PageMessage) -> Result<()> {
        let envelope = serde_json::to_value(Envelope::outbound(message, false))?;
        self.window.post_message(&envelope, &self.target_origin)
    }

    /// Ask the extension for its wallets.
    ///
    /// Fire-and-forget: the answer arrives later as `GET_WALLETS_RESPONSE`
    /// and lands in the state sink through the router.
    pub fn request_accounts(&self) -> Result<()> {
        log::debug!("Requesting accounts from extension");
        self.post(PageMessage::GetWallets)
    }

    /// Ask the extension to sign `sign_message` with the key for
    /// `sender_address` and wait for the answer.
    pub async fn request_signature(
        &self,
        sign_message: &str,
        sender_address: &str,
        cancel: &CancellationToken,
    ) -> Result<Signature> {
        // Claim the slot before posting so an immediate reply is not lost
        let pending = self.correlator.begin();
        log::info!(
            "Requesting signature #{} for {}",
            pending.id(),
            sender_address
        );

        let posted = self.post(PageMessage::SignRequest(SignRequest {
            sender_address: sender_address.to_string(),
            sign_message: sign_message.to_string(),
        }));
        if let Err(e) = posted {
            pending.discard_unsent();
            return Err(e);
        }

        let response = pending.wait(self.sign_timeout, cancel).await?;
        correlator::into_signature(response)
    }
}
