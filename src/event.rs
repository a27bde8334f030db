//! Nostr event model shared by every social-reading kind.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Book record, replaceable by `(kind, pubkey, d)`.
pub const KIND_BOOK: u32 = 30051;
/// Bookshelf with ordered `book` entries.
pub const KIND_BOOKSHELF: u32 = 30052;
/// Review of a book event.
pub const KIND_REVIEW: u32 = 30053;
/// Reading club built around one book.
pub const KIND_BOOK_CLUB: u32 = 30055;
/// Zap request, produced by clients and handed to an LNURL server.
pub const KIND_ZAP_REQUEST: u32 = 9734;
/// Zap receipt, published by the LNURL server once paid.
pub const KIND_ZAP_RECEIPT: u32 = 9735;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// The first element names the tag and the rest are positional arguments.
/// Tags used by the reading kinds include:
///
/// - `d` – stable identifier of a replaceable record
/// - `e` – reference to another event id
/// - `genre` – one tag per genre, repeated
/// - `book` – `[book, event id, status, progress?, completed?]` shelf entry
///
/// Tags are kept verbatim so extension tags survive a decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from a key and its arguments.
    pub fn new<I, S>(key: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields = vec![key.to_string()];
        fields.extend(args.into_iter().map(Into::into));
        Tag(fields)
    }

    /// Tag key, if the tag has any fields at all.
    pub fn key(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Positional argument `idx` (0 is the first value after the key).
    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.0.get(idx + 1).map(String::as_str)
    }

    /// All arguments after the key.
    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or(&[])
    }
}

/// Signed Nostr event as it travels between clients and relays.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "79be...",
///   "kind": 30051,
///   "created_at": 1700000000,
///   "tags": [["d", "dune"], ["title", "Dune"]],
///   "content": "Desert planet",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Kind number, e.g. `30051` or `9735`.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Ordered tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Event content body.
    #[serde(default)]
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

impl Event {
    /// First value of the first tag keyed `key`.
    pub fn first_tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key() == Some(key))
            .and_then(|t| t.arg(0))
    }

    /// Strip `id` and `sig`, leaving the pre-sign payload.
    pub fn unsigned(&self) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }
}

/// Event before an id and signature are attached.
///
/// Field order matches the canonical tuple hashed for the id:
/// `pubkey, created_at, kind, tags, content`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    /// Attach an externally computed id and signature.
    pub fn into_signed(self, id: String, sig: String) -> Event {
        Event {
            id,
            pubkey: self.pubkey,
            kind: self.kind,
            created_at: self.created_at,
            tags: self.tags,
            content: self.content,
            sig,
        }
    }
}

/// Current time truncated to whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
