//! Mapping between typed fields and positional string tags.
//!
//! Writing never emits `[key, ""]`: absent and empty values are both dropped.
//! Reading mirrors that, so a missing tag, a tag without a value and a tag
//! with an empty value all decode to `None`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::Tag;

/// Tag keys of the reading kinds.
pub mod keys {
    pub const ID: &str = "d";
    pub const EVENT: &str = "e";
    pub const PUBKEY: &str = "p";
    pub const TITLE: &str = "title";
    pub const AUTHOR: &str = "author";
    pub const ISBN: &str = "isbn";
    pub const PUBLISHED: &str = "published";
    pub const PUBLISHER: &str = "publisher";
    pub const IMAGE: &str = "image";
    pub const SUMMARY: &str = "summary";
    pub const GENRE: &str = "genre";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const BOOK: &str = "book";
    pub const RATING: &str = "rating";
    pub const READ: &str = "read";
    pub const SUBJECT: &str = "subject";
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const DISCUSSION: &str = "discussion";
    pub const RELAYS: &str = "relays";
    pub const AMOUNT: &str = "amount";
    pub const LNURL: &str = "lnurl";
    pub const BOLT11: &str = "bolt11";
}

/// Accumulates tags in the order fields are written.
#[derive(Debug, Default)]
pub struct TagWriter {
    tags: Vec<Tag>,
}

impl TagWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[key, value]`, skipped when the value is absent or empty.
    pub fn single(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.tags.push(Tag::new(key, [v]));
        }
        self
    }

    /// `[key, v1, v2, ...]` in one tag. Empty values are dropped and the
    /// tag is skipped if nothing is left.
    pub fn multi(&mut self, key: &str, values: &[String]) -> &mut Self {
        let kept: Vec<&str> = values
            .iter()
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect();
        if !kept.is_empty() {
            self.tags.push(Tag::new(key, kept));
        }
        self
    }

    /// One `[key, value]` tag per non-empty value.
    pub fn repeated(&mut self, key: &str, values: &[String]) -> &mut Self {
        for v in values.iter().filter(|v| !v.is_empty()) {
            self.tags.push(Tag::new(key, [v.as_str()]));
        }
        self
    }

    /// `[key, f1, f2, ...]` with trailing absent fields truncated.
    ///
    /// An absent field followed by a present one is written as `""`, which
    /// reads back as absent.
    pub fn compound(&mut self, key: &str, fields: &[Option<&str>]) -> &mut Self {
        let len = fields
            .iter()
            .rposition(|f| f.map_or(false, |v| !v.is_empty()))
            .map_or(0, |i| i + 1);
        self.tags.push(Tag::new(
            key,
            fields[..len].iter().map(|f| f.unwrap_or_default()),
        ));
        self
    }

    /// Re-emit extension tags preserved by a previous decode.
    pub fn extra(&mut self, extra: &ExtraTags) -> &mut Self {
        for (key, arg_lists) in &extra.0 {
            for args in arg_lists {
                self.tags.push(Tag::new(key, args.iter().map(String::as_str)));
            }
        }
        self
    }

    pub fn finish(self) -> Vec<Tag> {
        self.tags
    }
}

/// Read-only view over an event's tags.
#[derive(Debug, Clone, Copy)]
pub struct TagReader<'a> {
    tags: &'a [Tag],
}

impl<'a> TagReader<'a> {
    pub fn new(tags: &'a [Tag]) -> Self {
        Self { tags }
    }

    /// Tags keyed `key`, in event order.
    pub fn keyed(&self, key: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        let tags = self.tags;
        tags.iter().filter(move |t| t.key() == Some(key))
    }

    /// Value of the last tag keyed `key`. A later tag without a usable value
    /// still overrides earlier ones, leaving the field absent.
    pub fn last(&self, key: &'a str) -> Option<String> {
        self.keyed(key).last().and_then(|t| value_at(t, 0))
    }

    /// Value of the first tag keyed `key`.
    pub fn first(&self, key: &'a str) -> Option<String> {
        self.keyed(key).next().and_then(|t| value_at(t, 0))
    }

    /// Non-empty arguments of the last tag keyed `key`.
    pub fn multi(&self, key: &'a str) -> Vec<String> {
        self.keyed(key)
            .last()
            .map(|t| {
                t.args()
                    .iter()
                    .filter(|v| !v.is_empty())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First value of every tag keyed `key`, first-seen order, without
    /// duplicates.
    pub fn all(&self, key: &'a str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for v in self.keyed(key).filter_map(|t| value_at(t, 0)) {
            if !out.contains(&v) {
                out.push(v);
            }
        }
        out
    }

    /// Every tag whose key is not in `known`.
    pub fn extras(&self, known: &[&str]) -> ExtraTags {
        let mut extra = ExtraTags::default();
        for tag in self.tags {
            if let Some(key) = tag.key() {
                if !known.contains(&key) {
                    extra.push(key, tag.args().to_vec());
                }
            }
        }
        extra
    }
}

/// Non-empty argument `idx` of a tag.
pub fn value_at(tag: &Tag, idx: usize) -> Option<String> {
    tag.arg(idx).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Tags the decoder does not model, grouped by key.
///
/// Each key maps to the argument lists of its tags in event order, so
/// `["custom", "x", "y"]` is found under `custom` as `[["x", "y"]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraTags(BTreeMap<String, Vec<Vec<String>>>);

impl ExtraTags {
    pub fn push(&mut self, key: &str, args: Vec<String>) {
        self.0.entry(key.to_string()).or_default().push(args);
    }

    /// Argument lists of every tag keyed `key`.
    pub fn get(&self, key: &str) -> Option<&[Vec<String>]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Arguments of the first tag keyed `key`.
    pub fn first(&self, key: &str) -> Option<&[String]> {
        self.get(key).and_then(|lists| lists.first()).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
