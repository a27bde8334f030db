//! Events to domain records.
//!
//! Decoding never fails on tag content. Short tags, empty values and
//! unparseable numbers all become `None`; only an unknown kind is an error.
//! Scalar fields take the last matching tag, except the zap `amount` which
//! takes the first.

use serde::Serialize;
use tracing::debug;

use crate::{
    error::{Error, Result},
    event::{
        Event, KIND_BOOK, KIND_BOOKSHELF, KIND_BOOK_CLUB, KIND_REVIEW, KIND_ZAP_RECEIPT,
    },
    model::{
        Book, BookClub, Bookshelf, Discussion, Review, ShelfEntry, ShelfStatus, ZapReceipt,
    },
    tags::{keys, value_at, TagReader},
};

/// A decoded event, by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entity {
    Book(Book),
    Bookshelf(Bookshelf),
    Review(Review),
    BookClub(BookClub),
    ZapReceipt(ZapReceipt),
    /// Event of a kind this crate does not model.
    Raw(Event),
}

/// Decode a single event, failing only on unsupported kinds.
pub fn decode(ev: &Event) -> Result<Entity> {
    let tags = TagReader::new(&ev.tags);
    let entity = match ev.kind {
        KIND_BOOK => Entity::Book(decode_book(ev, tags)),
        KIND_BOOKSHELF => Entity::Bookshelf(decode_bookshelf(ev, tags)),
        KIND_REVIEW => Entity::Review(decode_review(ev, tags)),
        KIND_BOOK_CLUB => Entity::BookClub(decode_club(ev, tags)),
        KIND_ZAP_RECEIPT => Entity::ZapReceipt(decode_zap_receipt(ev, tags)),
        other => return Err(Error::UnsupportedKind(other)),
    };
    Ok(entity)
}

/// Decode, keeping events of unknown kinds as [`Entity::Raw`].
pub fn decode_lenient(ev: &Event) -> Entity {
    decode(ev).unwrap_or_else(|_| Entity::Raw(ev.clone()))
}

/// Decode every event, one result per input in order.
pub fn decode_batch(events: &[Event]) -> Vec<Result<Entity>> {
    events
        .iter()
        .map(|ev| {
            let res = decode(ev);
            if let Err(e) = &res {
                debug!(id = %ev.id, "skipping event: {e}");
            }
            res
        })
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn decode_book(ev: &Event, tags: TagReader<'_>) -> Book {
    Book {
        local_id: tags.last(keys::ID),
        title: tags.last(keys::TITLE),
        authors: tags.multi(keys::AUTHOR),
        isbn: tags.last(keys::ISBN),
        publish_date: tags.last(keys::PUBLISHED),
        publisher: tags.last(keys::PUBLISHER),
        cover_url: tags.last(keys::IMAGE),
        genres: tags.all(keys::GENRE),
        summary: tags.last(keys::SUMMARY),
        description: non_empty(&ev.content),
        extra: tags.extras(&[
            keys::ID,
            keys::TITLE,
            keys::AUTHOR,
            keys::ISBN,
            keys::PUBLISHED,
            keys::PUBLISHER,
            keys::IMAGE,
            keys::SUMMARY,
            keys::GENRE,
        ]),
    }
}

fn decode_bookshelf(ev: &Event, tags: TagReader<'_>) -> Bookshelf {
    // Entries without a book id have nothing to point at and are dropped.
    let entries = tags
        .keyed(keys::BOOK)
        .filter_map(|t| {
            Some(ShelfEntry {
                book_event_id: value_at(t, 0)?,
                status: value_at(t, 1).map(ShelfStatus::from),
                progress: value_at(t, 2),
                completed_date: value_at(t, 3),
            })
        })
        .collect();
    Bookshelf {
        local_id: tags.last(keys::ID),
        name: tags.last(keys::NAME),
        description: tags.last(keys::DESCRIPTION),
        notes: non_empty(&ev.content),
        entries,
        extra: tags.extras(&[keys::ID, keys::NAME, keys::DESCRIPTION, keys::BOOK]),
    }
}

fn decode_review(ev: &Event, tags: TagReader<'_>) -> Review {
    Review {
        book_event_id: tags.last(keys::EVENT),
        rating: tags.last(keys::RATING).and_then(|r| r.trim().parse().ok()),
        read_date: tags.last(keys::READ),
        subject: tags.last(keys::SUBJECT),
        content: ev.content.clone(),
        extra: tags.extras(&[
            keys::ID,
            keys::EVENT,
            keys::RATING,
            keys::READ,
            keys::SUBJECT,
        ]),
    }
}

fn decode_club(ev: &Event, tags: TagReader<'_>) -> BookClub {
    let discussions = tags
        .keyed(keys::DISCUSSION)
        .map(|t| Discussion {
            date: value_at(t, 0),
            topic: value_at(t, 1),
            pages: value_at(t, 2),
        })
        .filter(|d| d.date.is_some() || d.topic.is_some() || d.pages.is_some())
        .collect();
    BookClub {
        local_id: tags.last(keys::ID),
        name: tags.last(keys::NAME),
        book_event_id: tags.last(keys::EVENT),
        start_date: tags.last(keys::START),
        end_date: tags.last(keys::END),
        description: non_empty(&ev.content),
        discussions,
        extra: tags.extras(&[
            keys::ID,
            keys::NAME,
            keys::EVENT,
            keys::START,
            keys::END,
            keys::DISCUSSION,
        ]),
    }
}

pub(crate) fn receipt_amount(tags: TagReader<'_>) -> Option<u64> {
    tags.first(keys::AMOUNT).and_then(|a| a.trim().parse().ok())
}

fn decode_zap_receipt(ev: &Event, tags: TagReader<'_>) -> ZapReceipt {
    ZapReceipt {
        amount_sats: receipt_amount(tags),
        zapper_pubkey: ev.pubkey.clone(),
        zapped_event_id: tags.first(keys::EVENT),
        recipient: tags.first(keys::PUBKEY),
        bolt11: tags.first(keys::BOLT11),
        description: tags.first(keys::DESCRIPTION),
        extra: tags.extras(&[
            keys::AMOUNT,
            keys::EVENT,
            keys::PUBKEY,
            keys::BOLT11,
            keys::DESCRIPTION,
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encode::Encode, event::Tag};

    fn event(kind: u32, tags: Vec<Tag>, content: &str) -> Event {
        Event {
            id: "id".into(),
            pubkey: "pk".into(),
            kind,
            created_at: 1,
            tags,
            content: content.into(),
            sig: String::new(),
        }
    }

    fn signed(ev: crate::event::UnsignedEvent) -> Event {
        ev.into_signed("id".into(), "sig".into())
    }

    #[test]
    fn book_round_trip_drops_only_empty_strings() {
        let book = Book {
            local_id: Some("dune".into()),
            title: Some("Dune".into()),
            authors: vec!["Frank Herbert".into(), "Brian Herbert".into()],
            isbn: Some("9780441013593".into()),
            publish_date: Some("1965-08-01".into()),
            publisher: Some(String::new()),
            cover_url: Some("https://img/dune.jpg".into()),
            genres: vec!["scifi".into(), "classic".into()],
            summary: Some("Spice".into()),
            description: Some("Desert planet".into()),
            extra: Default::default(),
        };
        let decoded = decode(&signed(book.encode_at("pk", 1).unwrap())).unwrap();
        let expected = Book {
            publisher: None,
            ..book
        };
        assert_eq!(decoded, Entity::Book(expected));
    }

    #[test]
    fn repeated_genres_accumulate_in_order() {
        let ev = event(
            KIND_BOOK,
            vec![
                Tag::new("d", ["x"]),
                Tag::new("genre", ["scifi"]),
                Tag::new("genre", ["classic"]),
            ],
            "",
        );
        let Entity::Book(book) = decode(&ev).unwrap() else {
            panic!("expected book")
        };
        assert_eq!(book.genres, vec!["scifi", "classic"]);
        assert_eq!(book.description, None);
    }

    #[test]
    fn duplicate_scalar_tags_last_wins() {
        let ev = event(
            KIND_BOOK,
            vec![
                Tag::new("d", ["x"]),
                Tag::new("title", ["First"]),
                Tag::new("title", ["Second"]),
            ],
            "",
        );
        let Entity::Book(book) = decode(&ev).unwrap() else {
            panic!("expected book")
        };
        assert_eq!(book.title.as_deref(), Some("Second"));
    }

    #[test]
    fn unknown_tags_land_in_extra() {
        let ev = event(
            KIND_BOOK,
            vec![Tag::new("d", ["x"]), Tag::new("custom", ["x", "y"])],
            "",
        );
        let Entity::Book(book) = decode(&ev).unwrap() else {
            panic!("expected book")
        };
        assert_eq!(book.extra.first("custom").unwrap(), &["x", "y"]);
        // and survive a re-encode
        let again = book.encode_at("pk", 1).unwrap();
        assert_eq!(again.tags.last(), Some(&Tag::new("custom", ["x", "y"])));
    }

    #[test]
    fn shelf_entries_keep_order_and_tolerate_short_tags() {
        let ev = event(
            KIND_BOOKSHELF,
            vec![
                Tag::new("d", ["s"]),
                Tag::new("book", ["e1", "read", "300", "2024-01-01"]),
                Tag::new("book", ["e2", "reading"]),
                Tag::new("book", ["e3", "re-reading", "", "2024-03-03"]),
                Tag::new("book", Vec::<String>::new()),
            ],
            "notes",
        );
        let Entity::Bookshelf(shelf) = decode(&ev).unwrap() else {
            panic!("expected shelf")
        };
        let ids: Vec<_> = shelf.entries.iter().map(|e| e.book_event_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);
        assert_eq!(shelf.entries[1].progress, None);
        assert_eq!(shelf.entries[1].completed_date, None);
        assert_eq!(
            shelf.entries[2].status,
            Some(ShelfStatus::Other("re-reading".into()))
        );
        assert_eq!(shelf.entries[2].progress, None);
        assert_eq!(shelf.entries[2].completed_date.as_deref(), Some("2024-03-03"));
        assert_eq!(shelf.notes.as_deref(), Some("notes"));
    }

    #[test]
    fn shelf_round_trip_preserves_entries() {
        let shelf = Bookshelf {
            local_id: Some("s".into()),
            name: Some("Shelf".into()),
            description: Some("desc".into()),
            notes: None,
            entries: vec![
                ShelfEntry {
                    book_event_id: "e3".into(),
                    status: Some(ShelfStatus::Abandoned),
                    progress: Some("40".into()),
                    completed_date: None,
                },
                ShelfEntry {
                    book_event_id: "e1".into(),
                    status: Some(ShelfStatus::WantToRead),
                    progress: None,
                    completed_date: None,
                },
                ShelfEntry {
                    book_event_id: "e2".into(),
                    status: Some(ShelfStatus::Read),
                    progress: None,
                    completed_date: Some("2024-05-05".into()),
                },
            ],
            extra: Default::default(),
        };
        let decoded = decode(&signed(shelf.encode_at("pk", 1).unwrap())).unwrap();
        assert_eq!(decoded, Entity::Bookshelf(shelf));
    }

    #[test]
    fn corrupt_rating_is_absent_not_zero() {
        let ev = event(
            KIND_REVIEW,
            vec![Tag::new("e", ["b1"]), Tag::new("rating", ["five"])],
            "meh",
        );
        let Entity::Review(review) = decode(&ev).unwrap() else {
            panic!("expected review")
        };
        assert_eq!(review.rating, None);
        assert_eq!(review.book_event_id.as_deref(), Some("b1"));
        assert_eq!(review.content, "meh");
    }

    #[test]
    fn review_round_trip() {
        let review = Review {
            book_event_id: Some("b1".into()),
            rating: Some(4),
            read_date: Some("2024-02-02".into()),
            subject: Some("Worth it".into()),
            content: "long text".into(),
            extra: Default::default(),
        };
        let decoded = decode(&signed(review.encode_at("pk", 1).unwrap())).unwrap();
        assert_eq!(decoded, Entity::Review(review));
    }

    #[test]
    fn club_round_trip() {
        let club = BookClub {
            local_id: Some("c".into()),
            name: Some("Club".into()),
            book_event_id: Some("b1".into()),
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-02-01".into()),
            description: Some("weekly".into()),
            discussions: vec![
                Discussion {
                    date: Some("2024-01-08".into()),
                    topic: Some("Part 1".into()),
                    pages: None,
                },
                Discussion {
                    date: Some("2024-01-15".into()),
                    topic: Some("Part 2".into()),
                    pages: Some("100-200".into()),
                },
            ],
            extra: Default::default(),
        };
        let decoded = decode(&signed(club.encode_at("pk", 1).unwrap())).unwrap();
        assert_eq!(decoded, Entity::BookClub(club));
    }

    #[test]
    fn zap_receipt_takes_first_amount() {
        let ev = event(
            KIND_ZAP_RECEIPT,
            vec![
                Tag::new("p", ["bob"]),
                Tag::new("e", ["rev1"]),
                Tag::new("amount", ["1000"]),
                Tag::new("amount", ["9999"]),
                Tag::new("bolt11", ["lnbc..."]),
            ],
            "",
        );
        let Entity::ZapReceipt(r) = decode(&ev).unwrap() else {
            panic!("expected receipt")
        };
        assert_eq!(r.amount_sats, Some(1000));
        assert_eq!(r.zapper_pubkey, "pk");
        assert_eq!(r.zapped_event_id.as_deref(), Some("rev1"));
        assert_eq!(r.recipient.as_deref(), Some("bob"));
        assert!(r.extra.is_empty());
    }

    #[test]
    fn unsupported_kind_does_not_stop_batch() {
        let events = vec![
            event(99999, vec![], ""),
            event(KIND_BOOK, vec![Tag::new("d", ["x"])], ""),
        ];
        let results = decode_batch(&events);
        assert!(matches!(results[0], Err(Error::UnsupportedKind(99999))));
        assert!(matches!(results[1], Ok(Entity::Book(_))));
    }

    #[test]
    fn lenient_decode_keeps_raw_event() {
        let ev = event(1, vec![], "hello");
        assert_eq!(decode_lenient(&ev), Entity::Raw(ev.clone()));
    }

    #[test]
    fn decode_does_not_mutate_input() {
        let ev = event(KIND_BOOK, vec![Tag::new("title", ["t"])], "c");
        let before = ev.clone();
        let _ = decode(&ev);
        assert_eq!(ev, before);
    }
}
