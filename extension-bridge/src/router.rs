// Inbound message router
// One listener per window: classify extension envelopes and react to them

use std::cell::Cell;
use std::rc::Rc;

use crate::correlator::Correlator;
use crate::error::{BridgeError, Result};
use crate::host::HostWindow;
use crate::protocol::{decode_inbound, is_extension_envelope, ExtensionMessage, Inbound, InboundEvent};
use crate::store::{Action, Mutation, StateSink};

pub struct Router<S> {
    sink: Rc<S>,
    correlator: Rc<Correlator>,
    trusted_origin: String,
    registered: Cell<bool>,
}

impl<S: StateSink + 'static> Router<S> {
    pub fn new(sink: Rc<S>, correlator: Rc<Correlator>, trusted_origin: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            sink,
            correlator,
            trusted_origin: trusted_origin.into(),
            registered: Cell::new(false),
        })
    }

    /// Install the router's listener on `window`.
    ///
    /// Idempotent: returns `false` without touching the window when the
    /// listener is already installed. A window carries one router; a second
    /// router on the same window gets [`BridgeError::AlreadyListening`].
    pub fn register<W: HostWindow>(self: &Rc<Self>, window: &W) -> Result<bool> {
        if self.registered.get() {
            log::debug!("Extension listener already registered");
            return Ok(false);
        }
        if !window.claim_bridge_listener() {
            log::warn!("Another extension bridge already listens on this window");
            return Err(BridgeError::AlreadyListening);
        }

        let router = Rc::downgrade(self);
        window.add_message_listener(Box::new(move |event| {
            if let Some(router) = router.upgrade() {
                router.handle_event(&event);
            }
        }))?;

        self.registered.set(true);
        log::info!("Listening for extension messages");
        Ok(true)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.get()
    }

    pub fn handle_event(&self, event: &InboundEvent) {
        if !is_extension_envelope(event, &self.trusted_origin) {
            return;
        }

        match decode_inbound(&event.data) {
            Ok(Inbound::Message(message)) => self.route(message),
            Ok(Inbound::Unrecognized(kind)) => {
                log::trace!("Ignoring extension message of type {}", kind)
            }
            Err(e) => log::warn!("Dropping extension message: {}", e),
        }
    }

    fn route(&self, message: ExtensionMessage) {
        log::debug!("Extension message: {}", message.kind());
        match message {
            ExtensionMessage::InitExtension => {
                self.sink.commit(Mutation::SetExtensionAvailable);
                self.sink.dispatch(Action::GetAddressesFromExtension);
            }
            ExtensionMessage::WalletsResponse(accounts) => {
                self.sink.commit(Mutation::SetExtensionAccounts(accounts));
            }
            ExtensionMessage::SignResponse(response) => {
                if !self.correlator.settle(response) {
                    log::debug!("Sign response not delivered to a pending request");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::CorrelatorState;
    use crate::loopback::LoopbackWindow;
    use crate::protocol::{Account, SignResponse, EXTENSION_ORIGIN};
    use serde_json::{json, Value};
    use std::cell::RefCell;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Commit(&'static str, Option<Value>),
        Dispatch(&'static str),
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: RefCell<Vec<Call>>,
    }

    impl StateSink for RecordingSink {
        fn commit(&self, mutation: Mutation) {
            self.calls
                .borrow_mut()
                .push(Call::Commit(mutation.name(), mutation.payload()));
        }

        fn dispatch(&self, action: Action) {
            self.calls.borrow_mut().push(Call::Dispatch(action.name()));
        }
    }

    fn router() -> (Rc<RecordingSink>, Rc<Correlator>, Rc<Router<RecordingSink>>) {
        let sink = Rc::new(RecordingSink::default());
        let correlator = Correlator::new();
        let router = Router::new(Rc::clone(&sink), Rc::clone(&correlator), "*");
        (sink, correlator, router)
    }

    fn event(envelope_type: &str, message: Value) -> InboundEvent {
        InboundEvent::from_same_window(
            "https://app.lunie.io",
            json!({ "type": envelope_type, "message": message }),
        )
    }

    #[test]
    fn test_register_installs_one_listener() {
        let (_, _, router) = router();
        let window = LoopbackWindow::new("https://app.lunie.io");

        assert!(router.register(&window).unwrap());
        assert!(!router.register(&window).unwrap());
        assert_eq!(window.listener_count(), 1);
        assert!(router.is_registered());
    }

    #[test]
    fn test_second_router_on_same_window_is_refused() {
        let (other_sink, _, other) = router();
        let (sink, _, router) = router();
        let window = LoopbackWindow::new("https://app.lunie.io");

        router.register(&window).unwrap();
        assert!(matches!(
            other.register(&window),
            Err(BridgeError::AlreadyListening)
        ));
        assert!(!other.is_registered());
        assert_eq!(window.listener_count(), 1);

        window.deliver(event(EXTENSION_ORIGIN, json!({ "type": "INIT_EXTENSION" })));
        assert_eq!(sink.calls.borrow().len(), 2);
        assert!(other_sink.calls.borrow().is_empty());
    }

    #[test]
    fn test_double_register_delivers_once() {
        let (sink, _, router) = router();
        let window = LoopbackWindow::new("https://app.lunie.io");
        router.register(&window).unwrap();
        router.register(&window).unwrap();

        window.deliver(event(EXTENSION_ORIGIN, json!({ "type": "INIT_EXTENSION" })));
        assert_eq!(sink.calls.borrow().len(), 2);
    }

    #[test]
    fn test_init_extension_commits_then_dispatches() {
        let (sink, _, router) = router();
        router.handle_event(&event(EXTENSION_ORIGIN, json!({ "type": "INIT_EXTENSION" })));

        assert_eq!(
            *sink.calls.borrow(),
            vec![
                Call::Commit("setExtensionAvailable", None),
                Call::Dispatch("getAddressesFromExtension"),
            ]
        );
    }

    #[test]
    fn test_ignores_messages_not_from_extension() {
        let (sink, _, router) = router();
        router.handle_event(&event(
            "NOT_FROM_LUNIE_EXTENSION",
            json!({ "type": "INIT_EXTENSION" }),
        ));
        assert!(sink.calls.borrow().is_empty());
    }

    #[test]
    fn test_ignores_untrusted_origin() {
        let sink = Rc::new(RecordingSink::default());
        let router = Router::new(Rc::clone(&sink), Correlator::new(), "https://wallet.lunie.io");
        router.handle_event(&event(EXTENSION_ORIGIN, json!({ "type": "INIT_EXTENSION" })));
        assert!(sink.calls.borrow().is_empty());
    }

    #[test]
    fn test_wallets_response_sets_accounts() {
        let (sink, _, router) = router();
        router.handle_event(&event(
            EXTENSION_ORIGIN,
            json!({
                "type": "GET_WALLETS_RESPONSE",
                "payload": [{ "address": "cosmos1234", "name": "TEST_ADDRESS" }]
            }),
        ));

        let expected = vec![Account::new("cosmos1234", "TEST_ADDRESS")];
        assert_eq!(
            *sink.calls.borrow(),
            vec![Call::Commit(
                "setExtensionAccounts",
                Some(serde_json::to_value(&expected).unwrap())
            )]
        );
    }

    #[test]
    fn test_wallet_extras_reach_the_store() {
        let (sink, _, router) = router();
        let wallet = json!({
            "address": "cosmos1234",
            "name": "TEST_ADDRESS",
            "network": "cosmos-hub-mainnet"
        });
        router.handle_event(&event(
            EXTENSION_ORIGIN,
            json!({ "type": "GET_WALLETS_RESPONSE", "payload": [wallet.clone()] }),
        ));

        assert_eq!(
            *sink.calls.borrow(),
            vec![Call::Commit("setExtensionAccounts", Some(json!([wallet])))]
        );
    }

    #[test]
    fn test_unknown_and_malformed_messages_are_dropped() {
        let (sink, _, router) = router();
        router.handle_event(&event(EXTENSION_ORIGIN, json!({ "type": "SOMETHING_NEW" })));
        router.handle_event(&event(
            EXTENSION_ORIGIN,
            json!({ "type": "GET_WALLETS_RESPONSE", "payload": "not-a-list" }),
        ));
        router.handle_event(&InboundEvent::from_same_window(
            "https://app.lunie.io",
            json!({ "type": EXTENSION_ORIGIN }),
        ));
        assert!(sink.calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_sign_response_settles_pending_request() {
        let (sink, correlator, router) = router();
        let pending = correlator.begin();

        router.handle_event(&event(
            EXTENSION_ORIGIN,
            json!({ "type": "LUNIE_SIGN_REQUEST_RESPONSE", "payload": { "rejected": true } }),
        ));
        assert_eq!(correlator.state(), CorrelatorState::Idle);
        assert!(sink.calls.borrow().is_empty());

        let response = pending
            .wait(
                std::time::Duration::from_secs(60),
                &tokio_util::sync::CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response, SignResponse::Rejected);
    }

    #[test]
    fn test_listener_outlived_by_window() {
        let (sink, _, router) = router();
        let window = LoopbackWindow::new("https://app.lunie.io");
        router.register(&window).unwrap();
        drop(router);

        window.deliver(event(EXTENSION_ORIGIN, json!({ "type": "INIT_EXTENSION" })));
        assert!(sink.calls.borrow().is_empty());
    }
}
