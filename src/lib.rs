//! Nostr event codec for a social-reading application.
//!
//! Books, shelves, reviews and clubs are encoded into unsigned events with a
//! fixed tag layout and decoded back tolerantly; zap receipts are folded into
//! totals. Signing and transport live in [`signer`] and [`source`] and are
//! never invoked by the codec itself.

pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod event;
pub mod model;
pub mod signer;
pub mod source;
pub mod stats;
pub mod tags;

pub use decode::{decode, decode_batch, decode_lenient, Entity};
pub use encode::Encode;
pub use error::{Error, Result};
pub use event::{Event, Tag, UnsignedEvent};
pub use stats::{aggregate, ZapStats};
