// Extension availability and account state
// The router only talks to the store through `commit` / `dispatch`

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::dispatcher::Dispatcher;
use crate::host::HostWindow;
use crate::protocol::Account;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    SetExtensionAvailable,
    SetExtensionAccounts(Vec<Account>),
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::SetExtensionAvailable => "setExtensionAvailable",
            Mutation::SetExtensionAccounts(_) => "setExtensionAccounts",
        }
    }

    pub fn payload(&self) -> Option<Value> {
        match self {
            Mutation::SetExtensionAvailable => None,
            Mutation::SetExtensionAccounts(accounts) => serde_json::to_value(accounts).ok(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    GetAddressesFromExtension,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::GetAddressesFromExtension => "getAddressesFromExtension",
        }
    }
}

/// Vuex-style state sink
pub trait StateSink {
    fn commit(&self, mutation: Mutation);
    fn dispatch(&self, action: Action);
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionState {
    pub available: bool,
    pub accounts: Vec<Account>,
}

/// In-process store holding what the extension has told us so far
pub struct ExtensionStore<W> {
    state: RefCell<ExtensionState>,
    dispatcher: Rc<Dispatcher<W>>,
}

impl<W: HostWindow> ExtensionStore<W> {
    pub fn new(dispatcher: Rc<Dispatcher<W>>) -> Self {
        Self {
            state: RefCell::new(ExtensionState::default()),
            dispatcher,
        }
    }

    pub fn is_extension_available(&self) -> bool {
        self.state.borrow().available
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.state.borrow().accounts.clone()
    }

    pub fn snapshot(&self) -> ExtensionState {
        self.state.borrow().clone()
    }
}

impl<W: HostWindow> StateSink for ExtensionStore<W> {
    fn commit(&self, mutation: Mutation) {
        log::debug!("commit {}", mutation.name());
        let mut state = self.state.borrow_mut();
        match mutation {
            Mutation::SetExtensionAvailable => state.available = true,
            Mutation::SetExtensionAccounts(accounts) => {
                log::info!("Extension reported {} account(s)", accounts.len());
                state.accounts = accounts;
            }
        }
    }

    fn dispatch(&self, action: Action) {
        log::debug!("dispatch {}", action.name());
        match action {
            Action::GetAddressesFromExtension => {
                if let Err(e) = self.dispatcher.request_accounts() {
                    log::warn!("Failed to request accounts from extension: {}", e);
                }
            }
        }
    }
}
