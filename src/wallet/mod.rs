pub mod coin;
pub mod model;

pub use coin::Coin;
pub use model::{CoinAgeSpend, SpendPlan, Wallet};

use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use sha2::{Digest, Sha256};

/// Fingerprint used by wallets that own nothing on the current view.
pub const NO_STAKE_FINGERPRINT: &str = "no-stake";

/// Coin-age aggregate is clamped to this value.
pub const MAX_COIN_AGE: u32 = 4;

/// Amount units per unit of coin-age per block of holding.
pub const COIN_AGE_UNIT: f64 = 1000.0;

/// A secp256k1 keypair held by a wallet.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    pub fn pubkey_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    pub fn address(&self) -> String {
        address_of(&self.public)
    }
}

/// Generate a new secp256k1 keypair.
pub fn generate_keypair() -> KeyPair {
    let secp = Secp256k1::new();
    let (secret, public) = secp.generate_keypair(&mut OsRng);
    KeyPair { secret, public }
}

/// Address is the hex SHA-256 of the compressed public key.
pub fn address_of(public: &PublicKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public.serialize());
    hex::encode(hasher.finalize())
}

/// Derive the address from a hex-encoded compressed pubkey.
pub fn pubkey_to_address_hex(pubkey_hex: &str) -> Result<String, &'static str> {
    let bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&bytes).map_err(|_| "invalid pubkey bytes")?;
    Ok(address_of(&pk))
}

/// Sign a 32-byte digest, returning the hex DER signature.
pub fn sign_digest_hex(secret: &SecretKey, msg32: [u8; 32]) -> Result<String, &'static str> {
    let secp = Secp256k1::signing_only();
    let msg = Message::from_slice(&msg32).map_err(|_| "invalid message length")?;
    let sig = secp.sign_ecdsa(&msg, secret);
    Ok(hex::encode(sig.serialize_der().to_vec()))
}

/// Verify a signature (hex DER) against the given pubkey (hex, compressed) and digest.
pub fn verify_signature_hex(
    pubkey_hex: &str,
    sig_hex: &str,
    msg32: [u8; 32],
) -> Result<bool, &'static str> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| "invalid signature hex")?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| "invalid DER signature")?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| "invalid pubkey bytes")?;

    let msg = Message::from_slice(&msg32).map_err(|_| "invalid message length")?;
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip() {
        let kp = generate_keypair();
        let digest = [7u8; 32];
        let sig = sign_digest_hex(&kp.secret, digest).unwrap();
        assert!(verify_signature_hex(&kp.pubkey_hex(), &sig, digest).unwrap());
        assert!(!verify_signature_hex(&kp.pubkey_hex(), &sig, [8u8; 32]).unwrap());
    }

    #[test]
    fn address_is_hash_of_pubkey() {
        let kp = generate_keypair();
        assert_eq!(pubkey_to_address_hex(&kp.pubkey_hex()).unwrap(), kp.address());
        assert_eq!(kp.address().len(), 64);
        assert_ne!(kp.address(), kp.pubkey_hex());
    }
}
