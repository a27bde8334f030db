//! Event ids and Schnorr signatures.

use secp256k1::{schnorr::Signature, Keypair, Message, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::{
    error::{Error, Result},
    event::{Event, UnsignedEvent},
};

/// Serialized `[0, pubkey, created_at, kind, tags, content]`, the exact
/// byte string hashed into the event id.
pub fn canonical_payload(ev: &UnsignedEvent) -> Result<String> {
    let arr = serde_json::json!([0, ev.pubkey, ev.created_at, ev.kind, ev.tags, ev.content]);
    Ok(serde_json::to_string(&arr)?)
}

/// SHA-256 of the canonical payload.
pub fn event_hash(ev: &UnsignedEvent) -> Result<[u8; 32]> {
    let data = canonical_payload(ev)?;
    Ok(Sha256::digest(data.as_bytes()).into())
}

/// Anything able to turn an unsigned event into a signed one.
pub trait Signer {
    /// Hex x-only public key events are authored under.
    fn public_key(&self) -> String;

    fn sign(&self, ev: UnsignedEvent) -> Result<Event>;
}

/// Signs with an in-memory secp256k1 keypair.
pub struct KeySigner {
    secp: Secp256k1<secp256k1::All>,
    keypair: Keypair,
}

impl KeySigner {
    /// Load a 32-byte secret key given as hex.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim()).map_err(|e| Error::InvalidKey(e.to_string()))?;
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, &bytes)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { secp, keypair })
    }
}

impl Signer for KeySigner {
    fn public_key(&self) -> String {
        hex::encode(self.keypair.x_only_public_key().0.serialize())
    }

    /// Signs under this key; the payload's `pubkey` must already match it.
    fn sign(&self, ev: UnsignedEvent) -> Result<Event> {
        if ev.pubkey != self.public_key() {
            return Err(Error::Signature("event pubkey does not match signer".into()));
        }
        let hash = event_hash(&ev)?;
        let msg =
            Message::from_digest_slice(&hash).map_err(|e| Error::Signature(e.to_string()))?;
        let sig = self.secp.sign_schnorr_no_aux_rand(&msg, &self.keypair);
        Ok(ev.into_signed(hex::encode(hash), hex::encode(sig.as_ref())))
    }
}

/// Verify an event's id and Schnorr signature.
pub fn verify_event(ev: &Event) -> Result<()> {
    let hash = event_hash(&ev.unsigned())?;
    if hex::encode(hash) != ev.id {
        return Err(Error::Signature("id mismatch".into()));
    }
    let bad = |e: String| Error::Signature(e);
    let sig_bytes = hex::decode(&ev.sig).map_err(|e| bad(e.to_string()))?;
    let pk_bytes = hex::decode(&ev.pubkey).map_err(|e| bad(e.to_string()))?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|e| bad(e.to_string()))?;
    let pk = XOnlyPublicKey::from_slice(&pk_bytes).map_err(|e| bad(e.to_string()))?;
    let msg = Message::from_digest_slice(&hash).map_err(|e| bad(e.to_string()))?;
    Secp256k1::verification_only()
        .verify_schnorr(&sig, &msg, &pk)
        .map_err(|e| bad(e.to_string()))
}
