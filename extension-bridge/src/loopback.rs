// In-process host window
// Stands in for the browser window and, optionally, a scripted extension

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value;

use crate::error::Result;
use crate::host::{HostWindow, MessageListener};
use crate::protocol::{
    Account, Envelope, ExtensionEnvelope, ExtensionMessage, InboundEvent, PageMessage,
    SignResponse, PAGE_ORIGIN,
};

/// How the scripted extension answers sign requests
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignBehaviour {
    Approve {
        signature: Vec<u8>,
        public_key: Vec<u8>,
    },
    Reject,
    /// Never answer
    Ignore,
}

#[derive(Clone, Debug)]
pub struct MockExtension {
    pub accounts: Vec<Account>,
    pub sign: SignBehaviour,
}

impl MockExtension {
    pub fn new(accounts: Vec<Account>, sign: SignBehaviour) -> Self {
        Self { accounts, sign }
    }

    fn respond(&self, message: &PageMessage) -> Option<ExtensionMessage> {
        match message {
            PageMessage::GetWallets => Some(ExtensionMessage::WalletsResponse(self.accounts.clone())),
            PageMessage::SignRequest(request) => {
                log::debug!(
                    "Mock extension received sign request from {}",
                    request.sender_address
                );
                match &self.sign {
                    SignBehaviour::Approve {
                        signature,
                        public_key,
                    } => Some(ExtensionMessage::SignResponse(SignResponse::Approved {
                        signature: hex::encode(signature),
                        public_key: hex::encode(public_key),
                    })),
                    SignBehaviour::Reject => {
                        Some(ExtensionMessage::SignResponse(SignResponse::Rejected))
                    }
                    SignBehaviour::Ignore => None,
                }
            }
        }
    }
}

/// Window whose `postMessage` is queued and delivered on [`LoopbackWindow::pump`].
///
/// Like a real window, the page's own posts are echoed back to its listeners.
pub struct LoopbackWindow {
    origin: String,
    posted: RefCell<Vec<(Value, String)>>,
    listeners: RefCell<Vec<Rc<dyn Fn(InboundEvent)>>>,
    bridge_claimed: Cell<bool>,
    inbox: RefCell<VecDeque<InboundEvent>>,
    extension: RefCell<Option<MockExtension>>,
}

impl LoopbackWindow {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            posted: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            bridge_claimed: Cell::new(false),
            inbox: RefCell::new(VecDeque::new()),
            extension: RefCell::new(None),
        }
    }

    pub fn with_extension(origin: impl Into<String>, extension: MockExtension) -> Self {
        let window = Self::new(origin);
        *window.extension.borrow_mut() = Some(extension);
        window
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn posted(&self) -> Vec<(Value, String)> {
        self.posted.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Queue a message as if the extension's content script posted it
    pub fn emit(&self, message: ExtensionMessage) -> Result<()> {
        let data = serde_json::to_value(ExtensionEnvelope::new(message))?;
        self.enqueue(data);
        Ok(())
    }

    /// Queue the extension's startup announcement
    pub fn announce(&self) -> Result<()> {
        self.emit(ExtensionMessage::InitExtension)
    }

    fn enqueue(&self, data: Value) {
        self.inbox
            .borrow_mut()
            .push_back(InboundEvent::from_same_window(self.origin.clone(), data));
    }

    /// Deliver queued events until the queue is empty. Returns how many were
    /// delivered.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            match next {
                Some(event) => {
                    self.deliver(event);
                    delivered += 1;
                }
                None => return delivered,
            }
        }
    }

    /// Deliver one event to every listener right away
    pub fn deliver(&self, event: InboundEvent) {
        let listeners: Vec<_> = self.listeners.borrow().clone();
        for listener in listeners {
            listener(event.clone());
        }
    }

    fn answer(&self, message: &Value) {
        let envelope: Envelope<PageMessage> = match serde_json::from_value(message.clone()) {
            Ok(envelope) => envelope,
            Err(_) => return,
        };
        if envelope.origin != PAGE_ORIGIN || envelope.skip_response {
            return;
        }

        let reply = self
            .extension
            .borrow()
            .as_ref()
            .and_then(|extension| extension.respond(&envelope.payload));

        if let Some(reply) = reply {
            if let Err(e) = self.emit(reply) {
                log::warn!("Mock extension failed to encode reply: {}", e);
            }
        }
    }
}

impl HostWindow for LoopbackWindow {
    fn post_message(&self, message: &Value, target_origin: &str) -> Result<()> {
        self.posted
            .borrow_mut()
            .push((message.clone(), target_origin.to_string()));
        self.enqueue(message.clone());
        self.answer(message);
        Ok(())
    }

    fn add_message_listener(&self, listener: MessageListener) -> Result<()> {
        self.listeners.borrow_mut().push(Rc::from(listener));
        Ok(())
    }

    fn claim_bridge_listener(&self) -> bool {
        !self.bridge_claimed.replace(true)
    }
}
