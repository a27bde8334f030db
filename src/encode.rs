//! Domain records to unsigned events.
//!
//! Tag order per kind is fixed: identifier first, then scalar tags in field
//! order, then repeated tags, then compound tags, then preserved extension
//! tags. The result is ready for a [`Signer`](crate::signer::Signer); nothing
//! here touches keys.

use crate::{
    error::{Error, Result},
    event::{
        unix_now, Tag, UnsignedEvent, KIND_BOOK, KIND_BOOKSHELF, KIND_BOOK_CLUB, KIND_REVIEW,
        KIND_ZAP_REQUEST,
    },
    model::{present, Book, BookClub, Bookshelf, Review, ZapRequest},
    tags::{keys, TagWriter},
};

/// Records that map onto a single event kind.
pub trait Encode {
    const KIND: u32;

    /// Validated tags in wire order.
    fn tags(&self) -> Result<Vec<Tag>>;

    fn content(&self) -> String;

    /// Encode with the current time.
    fn encode(&self, pubkey: &str) -> Result<UnsignedEvent> {
        self.encode_at(pubkey, unix_now())
    }

    /// Encode with a fixed timestamp.
    fn encode_at(&self, pubkey: &str, created_at: u64) -> Result<UnsignedEvent> {
        Ok(UnsignedEvent {
            pubkey: pubkey.to_string(),
            created_at,
            kind: Self::KIND,
            tags: self.tags()?,
            content: self.content(),
        })
    }
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str> {
    if present(value) {
        Ok(value.as_deref().unwrap_or_default())
    } else {
        Err(Error::missing(field))
    }
}

impl Encode for Book {
    const KIND: u32 = KIND_BOOK;

    fn tags(&self) -> Result<Vec<Tag>> {
        let local_id = required("local_id", &self.local_id)?;
        let mut w = TagWriter::new();
        w.single(keys::ID, Some(local_id))
            .single(keys::TITLE, self.title.as_deref())
            .multi(keys::AUTHOR, &self.authors)
            .single(keys::ISBN, self.isbn.as_deref())
            .single(keys::PUBLISHED, self.publish_date.as_deref())
            .single(keys::PUBLISHER, self.publisher.as_deref())
            .single(keys::IMAGE, self.cover_url.as_deref())
            .single(keys::SUMMARY, self.summary.as_deref())
            .repeated(keys::GENRE, &self.genres)
            .extra(&self.extra);
        Ok(w.finish())
    }

    fn content(&self) -> String {
        self.description.clone().unwrap_or_default()
    }
}

impl Encode for Bookshelf {
    const KIND: u32 = KIND_BOOKSHELF;

    fn tags(&self) -> Result<Vec<Tag>> {
        let local_id = required("local_id", &self.local_id)?;
        let mut w = TagWriter::new();
        w.single(keys::ID, Some(local_id))
            .single(keys::NAME, self.name.as_deref())
            .single(keys::DESCRIPTION, self.description.as_deref());
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.book_event_id.is_empty() {
                return Err(Error::Validation {
                    field: "entries",
                    reason: format!("entry {i} has no book event id"),
                });
            }
            w.compound(
                keys::BOOK,
                &[
                    Some(entry.book_event_id.as_str()),
                    entry.status.as_ref().map(|s| s.as_str()),
                    entry.progress.as_deref(),
                    entry.completed_date.as_deref(),
                ],
            );
        }
        w.extra(&self.extra);
        Ok(w.finish())
    }

    fn content(&self) -> String {
        self.notes.clone().unwrap_or_default()
    }
}

impl Encode for Review {
    const KIND: u32 = KIND_REVIEW;

    /// The book event id doubles as the `d` identifier so an author keeps
    /// one review per book.
    fn tags(&self) -> Result<Vec<Tag>> {
        let book = required("book_event_id", &self.book_event_id)?;
        let rating = self.rating.ok_or_else(|| Error::missing("rating"))?;
        let rating = rating.to_string();
        let mut w = TagWriter::new();
        w.single(keys::ID, Some(book))
            .single(keys::EVENT, Some(book))
            .single(keys::RATING, Some(rating.as_str()))
            .single(keys::READ, self.read_date.as_deref())
            .single(keys::SUBJECT, self.subject.as_deref())
            .extra(&self.extra);
        Ok(w.finish())
    }

    fn content(&self) -> String {
        self.content.clone()
    }
}

impl Encode for BookClub {
    const KIND: u32 = KIND_BOOK_CLUB;

    fn tags(&self) -> Result<Vec<Tag>> {
        let local_id = required("local_id", &self.local_id)?;
        let mut w = TagWriter::new();
        w.single(keys::ID, Some(local_id))
            .single(keys::NAME, self.name.as_deref())
            .single(keys::EVENT, self.book_event_id.as_deref())
            .single(keys::START, self.start_date.as_deref())
            .single(keys::END, self.end_date.as_deref());
        for d in &self.discussions {
            w.compound(
                keys::DISCUSSION,
                &[d.date.as_deref(), d.topic.as_deref(), d.pages.as_deref()],
            );
        }
        w.extra(&self.extra);
        Ok(w.finish())
    }

    fn content(&self) -> String {
        self.description.clone().unwrap_or_default()
    }
}

impl Encode for ZapRequest {
    const KIND: u32 = KIND_ZAP_REQUEST;

    fn tags(&self) -> Result<Vec<Tag>> {
        let recipient = required("recipient", &self.recipient)?;
        if self.amount_msats == 0 {
            return Err(Error::Validation {
                field: "amount_msats",
                reason: "must be greater than zero".into(),
            });
        }
        if self.relays.iter().all(|r| r.is_empty()) {
            return Err(Error::missing("relays"));
        }
        let amount = self.amount_msats.to_string();
        let mut w = TagWriter::new();
        w.multi(keys::RELAYS, &self.relays)
            .single(keys::AMOUNT, Some(amount.as_str()))
            .single(keys::LNURL, self.lnurl.as_deref())
            .single(keys::PUBKEY, Some(recipient))
            .single(keys::EVENT, self.event_id.as_deref());
        Ok(w.finish())
    }

    fn content(&self) -> String {
        self.comment.clone()
    }
}
