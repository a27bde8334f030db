//! Social-reading records carried by Nostr events.
//!
//! Optional fields use `None` for "not provided". An empty string is never
//! written to the wire, so it reads back as `None` as well.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{Error, Result},
    tags::ExtraTags,
};

/// Book record (kind 30051).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    /// Stable identifier from the `d` tag.
    pub local_id: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub isbn: Option<String>,
    pub publish_date: Option<String>,
    pub publisher: Option<String>,
    pub cover_url: Option<String>,
    /// Distinct genres in insertion order.
    pub genres: Vec<String>,
    pub summary: Option<String>,
    /// Event content.
    pub description: Option<String>,
    #[serde(skip_serializing_if = "ExtraTags::is_empty")]
    pub extra: ExtraTags,
}

impl Book {
    /// A usable book needs both an identifier and a title.
    pub fn is_valid(&self) -> bool {
        present(&self.local_id) && present(&self.title)
    }
}

/// Reading status of a shelf entry.
///
/// Statuses written by other clients pass through as [`ShelfStatus::Other`]
/// and are written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShelfStatus {
    WantToRead,
    Reading,
    Read,
    Abandoned,
    Other(String),
}

impl ShelfStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ShelfStatus::WantToRead => "want-to-read",
            ShelfStatus::Reading => "reading",
            ShelfStatus::Read => "read",
            ShelfStatus::Abandoned => "abandoned",
            ShelfStatus::Other(s) => s,
        }
    }
}

impl From<&str> for ShelfStatus {
    fn from(s: &str) -> Self {
        match s {
            "want-to-read" => ShelfStatus::WantToRead,
            "reading" => ShelfStatus::Reading,
            "read" => ShelfStatus::Read,
            "abandoned" => ShelfStatus::Abandoned,
            other => ShelfStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for ShelfStatus {
    fn from(s: String) -> Self {
        ShelfStatus::from(s.as_str())
    }
}

impl From<ShelfStatus> for String {
    fn from(s: ShelfStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for ShelfStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `book` tag on a shelf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfEntry {
    /// Event id of the referenced book, which may not exist.
    pub book_event_id: String,
    pub status: Option<ShelfStatus>,
    pub progress: Option<String>,
    pub completed_date: Option<String>,
}

/// Bookshelf (kind 30052). Entry order is display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bookshelf {
    pub local_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Event content.
    pub notes: Option<String>,
    pub entries: Vec<ShelfEntry>,
    #[serde(skip_serializing_if = "ExtraTags::is_empty")]
    pub extra: ExtraTags,
}

/// Review of a book event (kind 30053).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Review {
    pub book_event_id: Option<String>,
    /// Conventionally 1 to 5, not enforced.
    #[serde(deserialize_with = "de_rating")]
    pub rating: Option<i64>,
    pub read_date: Option<String>,
    pub subject: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "ExtraTags::is_empty")]
    pub extra: ExtraTags,
}

impl Review {
    /// Parse a base-10 integer rating.
    pub fn parse_rating(raw: &str) -> Result<i64> {
        raw.trim().parse().map_err(|_| Error::Validation {
            field: "rating",
            reason: format!("{raw:?} is not a base-10 integer"),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRating {
    Int(i64),
    Text(String),
}

/// Accept ratings given either as numbers or numeric strings.
fn de_rating<'de, D>(d: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawRating>::deserialize(d)? {
        None => Ok(None),
        Some(RawRating::Int(n)) => Ok(Some(n)),
        Some(RawRating::Text(s)) => Review::parse_rating(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Scheduled discussion in a club.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Discussion {
    pub date: Option<String>,
    pub topic: Option<String>,
    pub pages: Option<String>,
}

/// Reading club around one book (kind 30055).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookClub {
    pub local_id: Option<String>,
    pub name: Option<String>,
    pub book_event_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Event content.
    pub description: Option<String>,
    pub discussions: Vec<Discussion>,
    #[serde(skip_serializing_if = "ExtraTags::is_empty")]
    pub extra: ExtraTags,
}

/// Zap request (kind 9734), handed to an LNURL server for payment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZapRequest {
    /// Pubkey being zapped.
    pub recipient: Option<String>,
    /// Event being zapped, e.g. a review.
    pub event_id: Option<String>,
    pub amount_msats: u64,
    /// Relays the receipt should be published to.
    pub relays: Vec<String>,
    pub lnurl: Option<String>,
    pub comment: String,
}

/// Zap receipt (kind 9735) as published by the LNURL server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZapReceipt {
    /// From the first `amount` tag; `None` when missing or not numeric.
    pub amount_sats: Option<u64>,
    /// Author of the receipt event.
    pub zapper_pubkey: String,
    /// First `e` tag.
    pub zapped_event_id: Option<String>,
    pub recipient: Option<String>,
    pub bolt11: Option<String>,
    /// Embedded zap request JSON, verbatim.
    pub description: Option<String>,
    #[serde(skip_serializing_if = "ExtraTags::is_empty")]
    pub extra: ExtraTags,
}

pub(crate) fn present(v: &Option<String>) -> bool {
    v.as_deref().map_or(false, |s| !s.is_empty())
}
