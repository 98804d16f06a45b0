use std::rc::Rc;

use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::correlator::{Correlator, CorrelatorState, Signature};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::host::HostWindow;
use crate::router::Router;
use crate::store::{ExtensionStore, StateSink};

/// Page-side connection to the extension through one host window.
///
/// Wires the dispatcher, router and correlator together around a shared
/// state sink. One bridge listens per window: a second bridge's
/// [`listen`](Self::listen) fails with `BridgeError::AlreadyListening`.
pub struct ExtensionBridge<W, S> {
    window: Rc<W>,
    dispatcher: Rc<Dispatcher<W>>,
    router: Rc<Router<S>>,
    correlator: Rc<Correlator>,
    sink: Rc<S>,
}

impl<W: HostWindow + 'static> ExtensionBridge<W, ExtensionStore<W>> {
    /// Bridge backed by the built-in [`ExtensionStore`]
    pub fn new(window: Rc<W>, config: &BridgeConfig) -> Self {
        let correlator = Correlator::new();
        let dispatcher = Rc::new(Dispatcher::new(
            Rc::clone(&window),
            Rc::clone(&correlator),
            config,
        ));
        let store = Rc::new(ExtensionStore::new(Rc::clone(&dispatcher)));
        Self::assemble(window, dispatcher, correlator, store, config)
    }
}

impl<W: HostWindow + 'static, S: StateSink + 'static> ExtensionBridge<W, S> {
    /// Bridge reporting to an external state sink
    pub fn with_sink(window: Rc<W>, sink: Rc<S>, config: &BridgeConfig) -> Self {
        let correlator = Correlator::new();
        let dispatcher = Rc::new(Dispatcher::new(
            Rc::clone(&window),
            Rc::clone(&correlator),
            config,
        ));
        Self::assemble(window, dispatcher, correlator, sink, config)
    }

    fn assemble(
        window: Rc<W>,
        dispatcher: Rc<Dispatcher<W>>,
        correlator: Rc<Correlator>,
        sink: Rc<S>,
        config: &BridgeConfig,
    ) -> Self {
        let router = Router::new(
            Rc::clone(&sink),
            Rc::clone(&correlator),
            config.target_origin.clone(),
        );
        Self {
            window,
            dispatcher,
            router,
            correlator,
            sink,
        }
    }

    /// Start listening for extension messages. Safe to call repeatedly.
    pub fn listen(&self) -> Result<()> {
        self.router.register(self.window.as_ref()).map(|_| ())
    }

    pub fn request_accounts(&self) -> Result<()> {
        self.dispatcher.request_accounts()
    }

    pub async fn sign(&self, sign_message: &str, sender_address: &str) -> Result<Signature> {
        self.sign_with_cancel(sign_message, sender_address, &CancellationToken::new())
            .await
    }

    pub async fn sign_with_cancel(
        &self,
        sign_message: &str,
        sender_address: &str,
        cancel: &CancellationToken,
    ) -> Result<Signature> {
        self.dispatcher
            .request_signature(sign_message, sender_address, cancel)
            .await
    }

    pub fn correlator_state(&self) -> CorrelatorState {
        self.correlator.state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn window(&self) -> &W {
        &self.window
    }
}
