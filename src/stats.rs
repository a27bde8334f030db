//! Zap receipt totals.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    decode::receipt_amount,
    event::{Event, KIND_ZAP_RECEIPT},
    tags::{keys, TagReader},
};

/// Totals over a set of zap receipts.
///
/// `receipt_count` counts every receipt seen while `total_sats` only sums
/// amounts that parse, so the two can disagree on partial data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZapStats {
    pub total_sats: u64,
    pub receipt_count: u64,
    pub unique_zappers: u64,
}

#[derive(Default)]
struct Tally<'a> {
    total_sats: u64,
    receipt_count: u64,
    zappers: HashSet<&'a str>,
}

impl<'a> Tally<'a> {
    fn add(&mut self, ev: &'a Event) {
        self.receipt_count += 1;
        self.total_sats = self
            .total_sats
            .saturating_add(receipt_amount(TagReader::new(&ev.tags)).unwrap_or(0));
        self.zappers.insert(ev.pubkey.as_str());
    }

    fn finish(self) -> ZapStats {
        ZapStats {
            total_sats: self.total_sats,
            receipt_count: self.receipt_count,
            unique_zappers: self.zappers.len() as u64,
        }
    }
}

fn receipts<'a, I>(events: I) -> impl Iterator<Item = &'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    events.into_iter().filter(|ev| ev.kind == KIND_ZAP_RECEIPT)
}

/// Fold every kind 9735 event into totals; other kinds are ignored.
pub fn aggregate<'a, I>(events: I) -> ZapStats
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut tally = Tally::default();
    for ev in receipts(events) {
        tally.add(ev);
    }
    tally.finish()
}

/// Totals per zapped event id (first `e` tag). Receipts without one are
/// skipped.
pub fn aggregate_by_target<'a, I>(events: I) -> BTreeMap<String, ZapStats>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut tallies: BTreeMap<String, Tally<'a>> = BTreeMap::new();
    for ev in receipts(events) {
        if let Some(target) = TagReader::new(&ev.tags).first(keys::EVENT) {
            tallies.entry(target).or_default().add(ev);
        }
    }
    tallies
        .into_iter()
        .map(|(target, tally)| (target, tally.finish()))
        .collect()
}
