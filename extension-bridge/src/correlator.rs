// Sign request/response correlation
// One outstanding sign request at a time; a newer request supersedes the old one

use std::cell::{Cell, RefCell};
use std::pin::pin;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::protocol::SignResponse;
use crate::timer;

type Settlement = Result<SignResponse>;

struct Pending {
    id: u64,
    tx: oneshot::Sender<Settlement>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelatorState {
    Idle,
    AwaitingResponse { request_id: u64 },
}

/// Owner of the single pending-signature slot
///
/// Sign responses carry no request id, so requests abandoned after being
/// posted (timed out, cancelled, superseded) are counted: the extension still
/// answers them, and that many responses are discarded before the next one
/// reaches the slot.
#[derive(Default)]
pub struct Correlator {
    slot: RefCell<Option<Pending>>,
    next_id: Cell<u64>,
    stale: Cell<usize>,
}

impl Correlator {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Responses still owed by the extension for abandoned requests
    pub fn stale_responses(&self) -> usize {
        self.stale.get()
    }

    pub fn state(&self) -> CorrelatorState {
        match self.slot.borrow().as_ref() {
            Some(pending) => CorrelatorState::AwaitingResponse {
                request_id: pending.id,
            },
            None => CorrelatorState::Idle,
        }
    }

    /// Claim the slot for a new request.
    ///
    /// A request already waiting in the slot is settled with
    /// [`BridgeError::Superseded`].
    pub fn begin(self: &Rc<Self>) -> PendingSignature {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);

        let (tx, rx) = oneshot::channel();
        let previous = self.slot.borrow_mut().replace(Pending { id, tx });

        if let Some(previous) = previous {
            self.stale.set(self.stale.get() + 1);
            log::warn!(
                "Sign request #{} superseded by #{} before the extension answered",
                previous.id,
                id
            );
            let _ = previous.tx.send(Err(BridgeError::Superseded));
        }

        log::debug!("Sign request #{} awaiting extension response", id);
        PendingSignature {
            id,
            rx,
            posted: true,
            correlator: Rc::clone(self),
        }
    }

    /// Hand a sign response to whoever holds the slot.
    ///
    /// Returns `false` when nothing was waiting.
    pub fn settle(&self, response: SignResponse) -> bool {
        let stale = self.stale.get();
        if stale > 0 {
            self.stale.set(stale - 1);
            log::warn!(
                "Discarding late sign response for an abandoned request ({} still owed)",
                stale - 1
            );
            return false;
        }

        let pending = self.slot.borrow_mut().take();
        match pending {
            Some(pending) => {
                log::debug!("Sign request #{} settled", pending.id);
                pending.tx.send(Ok(response)).is_ok()
            }
            None => false,
        }
    }

    /// Free the slot if `id` still holds it. `posted` says whether the
    /// extension received the request and so still owes an answer.
    fn release(&self, id: u64, posted: bool) {
        let mut slot = self.slot.borrow_mut();
        if slot.as_ref().map(|p| p.id) == Some(id) {
            *slot = None;
            if posted {
                self.stale.set(self.stale.get() + 1);
            }
        }
    }
}

/// Handle on a claimed slot. Dropping it frees the slot if it still owns it.
pub struct PendingSignature {
    id: u64,
    rx: oneshot::Receiver<Settlement>,
    posted: bool,
    correlator: Rc<Correlator>,
}

impl PendingSignature {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Give the slot back when the request never reached the extension
    pub fn discard_unsent(mut self) {
        self.posted = false;
    }

    /// Wait for the extension's answer, the timeout, or cancellation,
    /// whichever comes first.
    pub async fn wait(mut self, timeout: Duration, cancel: &CancellationToken) -> Settlement {
        let mut rx = &mut self.rx;
        let mut timer = pin!(timer::sleep(timeout).fuse());
        let mut cancelled = pin!(cancel.cancelled().fuse());

        futures::select! {
            settled = rx => settled.unwrap_or(Err(BridgeError::Disconnected)),
            () = timer => {
                log::warn!("Sign request #{} timed out after {:?}", self.id, timeout);
                Err(BridgeError::Timeout(timeout))
            }
            () = cancelled => {
                log::info!("Sign request #{} cancelled", self.id);
                Err(BridgeError::Cancelled)
            }
        }
    }
}

impl Drop for PendingSignature {
    fn drop(&mut self) {
        self.correlator.release(self.id, self.posted);
    }
}

/// Raw signature material returned by the extension
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl Signature {
    pub fn from_hex(signature: &str, public_key: &str) -> Result<Self> {
        Ok(Self {
            signature: hex::decode(signature).map_err(|source| BridgeError::InvalidHex {
                field: "signature",
                source,
            })?,
            public_key: hex::decode(public_key).map_err(|source| BridgeError::InvalidHex {
                field: "publicKey",
                source,
            })?,
        })
    }
}

/// Map a settled sign response to the caller-facing result
pub fn into_signature(response: SignResponse) -> Result<Signature> {
    match response {
        SignResponse::Approved {
            signature,
            public_key,
        } => Signature::from_hex(&signature, &public_key),
        SignResponse::Rejected => Err(BridgeError::Rejected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(60);

    fn approved() -> SignResponse {
        SignResponse::Approved {
            signature: "abcd".into(),
            public_key: "1234".into(),
        }
    }

    #[tokio::test]
    async fn test_settle_resolves_pending_request() {
        let correlator = Correlator::new();
        let pending = correlator.begin();
        assert_eq!(
            correlator.state(),
            CorrelatorState::AwaitingResponse { request_id: 1 }
        );

        assert!(correlator.settle(approved()));
        assert_eq!(correlator.state(), CorrelatorState::Idle);

        let response = pending.wait(LONG, &CancellationToken::new()).await.unwrap();
        assert_eq!(response, approved());
    }

    #[test]
    fn test_settle_without_pending_request() {
        let correlator = Correlator::new();
        assert!(!correlator.settle(SignResponse::Rejected));
    }

    #[tokio::test]
    async fn test_new_request_supersedes_old_one() {
        let correlator = Correlator::new();
        let first = correlator.begin();
        let second = correlator.begin();
        assert_eq!(
            correlator.state(),
            CorrelatorState::AwaitingResponse { request_id: 2 }
        );

        let token = CancellationToken::new();
        assert!(matches!(
            first.wait(LONG, &token).await,
            Err(BridgeError::Superseded)
        ));

        // The superseded handle must not free the newer request's slot
        assert_eq!(
            correlator.state(),
            CorrelatorState::AwaitingResponse { request_id: 2 }
        );

        // The extension still answers the superseded request first
        assert_eq!(correlator.stale_responses(), 1);
        assert!(!correlator.settle(approved()));
        assert!(correlator.settle(SignResponse::Rejected));
        assert_eq!(second.wait(LONG, &token).await.unwrap(), SignResponse::Rejected);
    }

    #[test]
    fn test_dropping_handle_releases_slot() {
        let correlator = Correlator::new();
        let pending = correlator.begin();
        drop(pending);
        assert_eq!(correlator.state(), CorrelatorState::Idle);
        assert_eq!(correlator.stale_responses(), 1);
    }

    #[test]
    fn test_unsent_request_owes_no_response() {
        let correlator = Correlator::new();
        correlator.begin().discard_unsent();
        assert_eq!(correlator.state(), CorrelatorState::Idle);
        assert_eq!(correlator.stale_responses(), 0);
    }

    #[test]
    fn test_settled_request_owes_no_response() {
        let correlator = Correlator::new();
        let pending = correlator.begin();
        assert!(correlator.settle(approved()));
        drop(pending);
        assert_eq!(correlator.stale_responses(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_after_timeout_is_discarded() {
        let correlator = Correlator::new();
        let token = CancellationToken::new();
        let first = correlator.begin();
        assert!(matches!(
            first.wait(Duration::from_millis(500), &token).await,
            Err(BridgeError::Timeout(_))
        ));

        let second = correlator.begin();
        // Late answer to the first request must not resolve the second
        assert!(!correlator.settle(approved()));
        assert_eq!(
            correlator.state(),
            CorrelatorState::AwaitingResponse { request_id: 2 }
        );

        assert!(correlator.settle(SignResponse::Rejected));
        assert_eq!(second.wait(LONG, &token).await.unwrap(), SignResponse::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let correlator = Correlator::new();
        let pending = correlator.begin();
        let timeout = Duration::from_millis(500);

        let result = pending.wait(timeout, &CancellationToken::new()).await;
        assert!(matches!(result, Err(BridgeError::Timeout(t)) if t == timeout));
        assert_eq!(correlator.state(), CorrelatorState::Idle);
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let correlator = Correlator::new();
        let pending = correlator.begin();
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            pending.wait(LONG, &token).await,
            Err(BridgeError::Cancelled)
        ));
        assert_eq!(correlator.state(), CorrelatorState::Idle);
    }

    #[test]
    fn test_signature_from_hex() {
        let signature = into_signature(approved()).unwrap();
        assert_eq!(signature.signature, vec![0xab, 0xcd]);
        assert_eq!(signature.public_key, vec![0x12, 0x34]);
    }

    #[test]
    fn test_rejection_maps_to_error() {
        let err = into_signature(SignResponse::Rejected).unwrap_err();
        assert_eq!(err.to_string(), "User rejected action in extension.");
    }

    #[test]
    fn test_invalid_hex_is_reported() {
        let err = Signature::from_hex("zz", "1234").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidHex { field: "signature", .. }));
    }
}
