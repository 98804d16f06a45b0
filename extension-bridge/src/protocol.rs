// Wire protocol between the web page and the Lunie browser extension
// Envelopes travel over window.postMessage in both directions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Envelope `type` stamped on everything the page sends
pub const PAGE_ORIGIN: &str = "FROM_LUNIE_IO";
/// Envelope `type` the extension stamps on its replies
pub const EXTENSION_ORIGIN: &str = "FROM_LUNIE_EXTENSION";

pub const INIT_EXTENSION: &str = "INIT_EXTENSION";
pub const GET_WALLETS: &str = "GET_WALLETS";
pub const GET_WALLETS_RESPONSE: &str = "GET_WALLETS_RESPONSE";
pub const LUNIE_SIGN_REQUEST: &str = "LUNIE_SIGN_REQUEST";
pub const LUNIE_SIGN_REQUEST_RESPONSE: &str = "LUNIE_SIGN_REQUEST_RESPONSE";

/// postMessage wildcard target
pub const ANY_ORIGIN: &str = "*";

const INBOUND_KINDS: [&str; 3] = [
    INIT_EXTENSION,
    GET_WALLETS_RESPONSE,
    LUNIE_SIGN_REQUEST_RESPONSE,
];

/// Wallet entry as reported by the extension.
/// Uniqueness of addresses is up to the extension. Fields other than
/// `address` and `name` are kept in `extra` and forwarded unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub address: String,
    pub name: String,
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, Value>,
}

impl Account {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub sender_address: String,
    pub sign_message: String,
}

/// Messages the page sends to the extension
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum PageMessage {
    #[serde(rename = "GET_WALLETS")]
    GetWallets,
    #[serde(rename = "LUNIE_SIGN_REQUEST")]
    SignRequest(SignRequest),
}

/// Messages the extension sends to the page
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum ExtensionMessage {
    #[serde(rename = "INIT_EXTENSION")]
    InitExtension,
    #[serde(rename = "GET_WALLETS_RESPONSE")]
    WalletsResponse(Vec<Account>),
    #[serde(rename = "LUNIE_SIGN_REQUEST_RESPONSE")]
    SignResponse(SignResponse),
}

impl ExtensionMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtensionMessage::InitExtension => INIT_EXTENSION,
            ExtensionMessage::WalletsResponse(_) => GET_WALLETS_RESPONSE,
            ExtensionMessage::SignResponse(_) => LUNIE_SIGN_REQUEST_RESPONSE,
        }
    }
}

/// Outcome of a sign request, validated from the loose wire shape
///
/// On the wire the extension distinguishes the two cases only by which fields
/// are present (`signature` + `publicKey`, or `rejected: true`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(try_from = "RawSignResponse", into = "RawSignResponse")]
pub enum SignResponse {
    /// Hex-encoded signature and public key
    Approved {
        signature: String,
        public_key: String,
    },
    Rejected,
}

/// Field-presence form of [`SignResponse`] as the extension posts it
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawSignResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<bool>,
}

impl TryFrom<RawSignResponse> for SignResponse {
    type Error = String;

    fn try_from(raw: RawSignResponse) -> std::result::Result<Self, Self::Error> {
        if raw.rejected == Some(true) {
            return Ok(SignResponse::Rejected);
        }
        match (raw.signature, raw.public_key) {
            (Some(signature), Some(public_key)) => Ok(SignResponse::Approved {
                signature,
                public_key,
            }),
            _ => Err("sign response carries neither signature+publicKey nor rejected".into()),
        }
    }
}

impl From<SignResponse> for RawSignResponse {
    fn from(response: SignResponse) -> Self {
        match response {
            SignResponse::Approved {
                signature,
                public_key,
            } => RawSignResponse {
                signature: Some(signature),
                public_key: Some(public_key),
                rejected: None,
            },
            SignResponse::Rejected => RawSignResponse {
                rejected: Some(true),
                ..Default::default()
            },
        }
    }
}

/// Outbound envelope: `{ type, payload, skipResponse }`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<M> {
    #[serde(rename = "type")]
    pub origin: String,
    pub payload: M,
    pub skip_response: bool,
}

impl Envelope<PageMessage> {
    pub fn outbound(message: PageMessage, skip_response: bool) -> Self {
        Self {
            origin: PAGE_ORIGIN.to_string(),
            payload: message,
            skip_response,
        }
    }
}

/// Inbound envelope. The extension nests its message under `message`;
/// `payload` is accepted too.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExtensionEnvelope {
    #[serde(rename = "type")]
    pub origin: String,
    #[serde(alias = "payload")]
    pub message: ExtensionMessage,
}

impl ExtensionEnvelope {
    pub fn new(message: ExtensionMessage) -> Self {
        Self {
            origin: EXTENSION_ORIGIN.to_string(),
            message,
        }
    }
}

/// A `message` event as delivered by the host window
#[derive(Clone, Debug, PartialEq)]
pub struct InboundEvent {
    /// Whether `event.source` is the window the page posts to
    pub same_source: bool,
    pub origin: String,
    pub data: Value,
}

impl InboundEvent {
    pub fn from_same_window(origin: impl Into<String>, data: Value) -> Self {
        Self {
            same_source: true,
            origin: origin.into(),
            data,
        }
    }
}

/// Result of decoding an accepted envelope
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Message(ExtensionMessage),
    /// Inner type this bridge does not handle
    Unrecognized(String),
}

pub fn origin_allowed(trusted_origin: &str, origin: &str) -> bool {
    trusted_origin == ANY_ORIGIN || trusted_origin == origin
}

/// True if `event` is an envelope posted by the extension into this window.
///
/// Pure check with no side effects: anything else on the channel is
/// simply not ours.
pub fn is_extension_envelope(event: &InboundEvent, trusted_origin: &str) -> bool {
    event.same_source
        && origin_allowed(trusted_origin, &event.origin)
        && event.data.get("type").and_then(Value::as_str) == Some(EXTENSION_ORIGIN)
}

/// Unwrap and validate the inner message of an accepted envelope
pub fn decode_inbound(data: &Value) -> Result<Inbound> {
    let inner = data
        .get("message")
        .or_else(|| data.get("payload"))
        .ok_or_else(|| BridgeError::Malformed("envelope carries no message".into()))?;

    let kind = inner
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Malformed("message has no type".into()))?;

    if !INBOUND_KINDS.contains(&kind) {
        return Ok(Inbound::Unrecognized(kind.to_string()));
    }

    serde_json::from_value::<ExtensionMessage>(inner.clone())
        .map(Inbound::Message)
        .map_err(|e| BridgeError::Malformed(format!("{}: {}", kind, e)))
}
