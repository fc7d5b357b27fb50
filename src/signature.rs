//! Signature verification for submitted order payloads.
//!
//! The payload is canonicalized to JSON text with sorted keys, `", "`/`": "` separators and
//! ASCII-only output. Both platforms sign those exact bytes:
//!
//! - **Ethereum**: EIP-191 personal message (`"\x19Ethereum Signed Message:\n" + len + text`),
//!   Keccak-256, secp256k1 recoverable signature as 65 hex bytes. The signer address is
//!   recovered and compared with the claimed sender.
//! - **Algorand**: Ed25519 over `"MX" + text`, base64 signature, checked against the key
//!   embedded in the sender's base32 address.
//!
//! Verification is pure. Undecodable signatures or keys verify as `false`.

use crate::error::VerificationError;
use crate::types::Platform;
use data_encoding::{BASE32_NOPAD, BASE64};
use ed25519_dalek::{Signer, Verifier};
use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha512_256};
use sha3::Keccak256;
use std::io;

const ETHEREUM_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";
const ALGORAND_MESSAGE_PREFIX: &[u8] = b"MX";
const ALGORAND_CHECKSUM_LEN: usize = 4;

/// Parses the payload's `platform` value. Anything but the two known names is rejected.
pub fn parse_platform(name: &str) -> Result<Platform, VerificationError> {
    Platform::from_name(name).ok_or_else(|| VerificationError::UnsupportedPlatform(name.to_string()))
}

/// Returns true if `signature` over the canonical text of `payload` was produced by
/// `claimed_signer` on `platform`.
pub fn verify(
    payload: &Value,
    signature: &str,
    platform: Platform,
    claimed_signer: &str,
) -> Result<bool, VerificationError> {
    let text = canonical_payload_text(payload)?;
    let valid = match platform {
        Platform::Ethereum => verify_ethereum(&text, signature, claimed_signer),
        Platform::Algorand => verify_algorand(&text, signature, claimed_signer),
    };
    Ok(valid)
}

/// Deterministic text encoding of `payload`; the bytes both platforms sign.
pub fn canonical_payload_text(payload: &Value) -> Result<String, VerificationError> {
    let sorted = sort_keys(payload);
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
    sorted
        .serialize(&mut ser)
        .map_err(|e| VerificationError::Canonicalization(e.to_string()))?;
    String::from_utf8(out).map_err(|e| VerificationError::Canonicalization(e.to_string()))
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// `json.dumps`-compatible layout: spaced separators, non-ASCII escaped as `\uXXXX`.
struct CanonicalFormatter;

impl serde_json::ser::Formatter for CanonicalFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Keccak-256 of the EIP-191 personal message wrapping `text`.
pub fn ethereum_message_hash(text: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("{}{}", ETHEREUM_MESSAGE_PREFIX, text.len()).as_bytes());
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

/// `0x`-prefixed lowercase address of a secp256k1 public key.
pub fn ethereum_address(key: &k256::ecdsa::VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Recovers the signing address from a 65-byte `r || s || v` hex signature.
pub fn recover_ethereum_signer(text: &str, signature: &str) -> Option<String> {
    let raw = hex::decode(strip_hex_prefix(signature.trim())).ok()?;
    if raw.len() != 65 {
        return None;
    }
    let v = match raw[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        _ => return None,
    };
    let mut sig = k256::ecdsa::Signature::from_slice(&raw[..64]).ok()?;
    let mut recovery_id = k256::ecdsa::RecoveryId::from_byte(v)?;
    // k256 only accepts low-s signatures; flipping s flips the parity of R.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = k256::ecdsa::RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }
    let hash = ethereum_message_hash(text);
    let key = k256::ecdsa::VerifyingKey::recover_from_prehash(&hash, &sig, recovery_id).ok()?;
    Some(ethereum_address(&key))
}

fn verify_ethereum(text: &str, signature: &str, claimed_signer: &str) -> bool {
    let Some(recovered) = recover_ethereum_signer(text, signature) else {
        debug!("ethereum signature could not be recovered");
        return false;
    };
    let claimed = strip_hex_prefix(claimed_signer.trim());
    strip_hex_prefix(&recovered).eq_ignore_ascii_case(claimed)
}

/// Base32 Algorand address (public key followed by a SHA-512/256 checksum) for `key`.
pub fn algorand_address(key: &ed25519_dalek::VerifyingKey) -> String {
    let pk = key.to_bytes();
    let digest = Sha512_256::digest(pk);
    let mut raw = Vec::with_capacity(pk.len() + ALGORAND_CHECKSUM_LEN);
    raw.extend_from_slice(&pk);
    raw.extend_from_slice(&digest[digest.len() - ALGORAND_CHECKSUM_LEN..]);
    BASE32_NOPAD.encode(&raw)
}

fn decode_algorand_address(address: &str) -> Option<ed25519_dalek::VerifyingKey> {
    let raw = BASE32_NOPAD.decode(address.as_bytes()).ok()?;
    if raw.len() != 32 + ALGORAND_CHECKSUM_LEN {
        return None;
    }
    let (pk, checksum) = raw.split_at(32);
    let digest = Sha512_256::digest(pk);
    if &digest[digest.len() - ALGORAND_CHECKSUM_LEN..] != checksum {
        return None;
    }
    let pk: [u8; 32] = pk.try_into().ok()?;
    ed25519_dalek::VerifyingKey::from_bytes(&pk).ok()
}

fn algorand_message(text: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(ALGORAND_MESSAGE_PREFIX.len() + text.len());
    message.extend_from_slice(ALGORAND_MESSAGE_PREFIX);
    message.extend_from_slice(text.as_bytes());
    message
}

fn verify_algorand(text: &str, signature: &str, claimed_signer: &str) -> bool {
    let Some(key) = decode_algorand_address(claimed_signer.trim()) else {
        debug!("invalid algorand address {}", claimed_signer);
        return false;
    };
    let Ok(raw) = BASE64.decode(signature.trim().as_bytes()) else {
        debug!("algorand signature is not base64");
        return false;
    };
    let Ok(sig) = ed25519_dalek::Signature::from_slice(&raw) else {
        return false;
    };
    key.verify(&algorand_message(text), &sig).is_ok()
}

/// Signs `payload` as an Ethereum personal message. Returns the `0x` hex signature.
pub fn sign_ethereum(key: &k256::ecdsa::SigningKey, payload: &Value) -> Result<String, VerificationError> {
    let text = canonical_payload_text(payload)?;
    let hash = ethereum_message_hash(&text);
    let (sig, recovery_id) = key
        .sign_prehash_recoverable(&hash)
        .map_err(|e| VerificationError::Signing(e.to_string()))?;
    let mut raw = sig.to_bytes().to_vec();
    raw.push(27 + recovery_id.to_byte());
    Ok(format!("0x{}", hex::encode(raw)))
}

/// Signs `payload` the way Algorand `sign_bytes` does. Returns the base64 signature.
pub fn sign_algorand(key: &ed25519_dalek::SigningKey, payload: &Value) -> Result<String, VerificationError> {
    let text = canonical_payload_text(payload)?;
    let sig = key.sign(&algorand_message(&text));
    Ok(BASE64.encode(&sig.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eth_key() -> k256::ecdsa::SigningKey {
        k256::ecdsa::SigningKey::from_slice(&[0x11; 32]).unwrap()
    }

    fn algo_key() -> ed25519_dalek::SigningKey {
        ed25519_dalek::SigningKey::from_bytes(&[0x22; 32])
    }

    fn payload(sender: &str, platform: &str) -> Value {
        json!({
            "sender_pk": sender,
            "receiver_pk": "receiver",
            "buy_currency": "Algorand",
            "sell_currency": "Ethereum",
            "buy_amount": 10,
            "sell_amount": 2.5,
            "platform": platform
        })
    }

    #[test]
    fn canonical_text_sorts_keys_and_uses_spaced_separators() {
        let value = json!({"b": 1, "a": [1, 2], "c": {"z": true, "y": null}});
        let text = canonical_payload_text(&value).unwrap();
        assert_eq!(text, r#"{"a": [1, 2], "b": 1, "c": {"y": null, "z": true}}"#);
    }

    #[test]
    fn canonical_text_escapes_non_ascii() {
        let text = canonical_payload_text(&json!({"k": "café €"})).unwrap();
        assert_eq!(text, r#"{"k": "caf\u00e9 \u20ac"}"#);
        let text = canonical_payload_text(&json!({"k": "😀"})).unwrap();
        assert_eq!(text, r#"{"k": "\ud83d\ude00"}"#);
    }

    #[test]
    fn ethereum_address_matches_known_vector() {
        // Private key 1 maps to the well-known generator-point address.
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let key = k256::ecdsa::SigningKey::from_slice(&bytes).unwrap();
        assert_eq!(
            ethereum_address(key.verifying_key()),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn ethereum_signature_verifies_for_sender() {
        let key = eth_key();
        let sender = ethereum_address(key.verifying_key());
        let p = payload(&sender, "Ethereum");
        let sig = sign_ethereum(&key, &p).unwrap();
        assert!(verify(&p, &sig, Platform::Ethereum, &sender).unwrap());
        // Address comparison ignores case.
        assert!(verify(&p, &sig, Platform::Ethereum, &sender.to_uppercase().replace("0X", "0x")).unwrap());
    }

    #[test]
    fn ethereum_signature_accepts_zero_one_recovery_byte() {
        let key = eth_key();
        let sender = ethereum_address(key.verifying_key());
        let p = payload(&sender, "Ethereum");
        let sig = sign_ethereum(&key, &p).unwrap();
        let mut raw = hex::decode(strip_hex_prefix(&sig)).unwrap();
        raw[64] -= 27;
        assert!(verify(&p, &hex::encode(raw), Platform::Ethereum, &sender).unwrap());
    }

    #[test]
    fn ethereum_signature_rejects_other_sender() {
        let key = eth_key();
        let sender = ethereum_address(key.verifying_key());
        let p = payload(&sender, "Ethereum");
        let sig = sign_ethereum(&key, &p).unwrap();
        let other = ethereum_address(k256::ecdsa::SigningKey::from_slice(&[0x33; 32]).unwrap().verifying_key());
        assert!(!verify(&p, &sig, Platform::Ethereum, &other).unwrap());
    }

    #[test]
    fn ethereum_flipping_any_signature_byte_fails() {
        let key = eth_key();
        let sender = ethereum_address(key.verifying_key());
        let p = payload(&sender, "Ethereum");
        let sig = sign_ethereum(&key, &p).unwrap();
        let raw = hex::decode(strip_hex_prefix(&sig)).unwrap();
        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let tampered = format!("0x{}", hex::encode(&tampered));
            assert!(
                !verify(&p, &tampered, Platform::Ethereum, &sender).unwrap(),
                "flipped byte {} still verified",
                i
            );
        }
    }

    #[test]
    fn ethereum_tampered_payload_fails() {
        let key = eth_key();
        let sender = ethereum_address(key.verifying_key());
        let p = payload(&sender, "Ethereum");
        let sig = sign_ethereum(&key, &p).unwrap();
        let mut tampered = p.clone();
        tampered["buy_amount"] = json!(1000);
        assert!(!verify(&tampered, &sig, Platform::Ethereum, &sender).unwrap());
    }

    #[test]
    fn malformed_ethereum_signature_is_false() {
        let p = payload("0xabc", "Ethereum");
        assert!(!verify(&p, "not hex", Platform::Ethereum, "0xabc").unwrap());
        assert!(!verify(&p, "0x1234", Platform::Ethereum, "0xabc").unwrap());
    }

    #[test]
    fn algorand_signature_verifies_for_sender() {
        let key = algo_key();
        let sender = algorand_address(&key.verifying_key());
        assert_eq!(sender.len(), 58);
        let p = payload(&sender, "Algorand");
        let sig = sign_algorand(&key, &p).unwrap();
        assert!(verify(&p, &sig, Platform::Algorand, &sender).unwrap());
    }

    #[test]
    fn algorand_signature_rejects_other_sender_and_bad_checksum() {
        let key = algo_key();
        let sender = algorand_address(&key.verifying_key());
        let p = payload(&sender, "Algorand");
        let sig = sign_algorand(&key, &p).unwrap();

        let other = algorand_address(&ed25519_dalek::SigningKey::from_bytes(&[0x44; 32]).verifying_key());
        assert!(!verify(&p, &sig, Platform::Algorand, &other).unwrap());

        let mut raw = BASE32_NOPAD.decode(sender.as_bytes()).unwrap();
        raw[35] ^= 0xff;
        let bad_checksum = BASE32_NOPAD.encode(&raw);
        assert!(!verify(&p, &sig, Platform::Algorand, &bad_checksum).unwrap());
    }

    #[test]
    fn algorand_signature_is_not_accepted_as_ethereum() {
        let key = algo_key();
        let sender = algorand_address(&key.verifying_key());
        let p = payload(&sender, "Algorand");
        let sig = sign_algorand(&key, &p).unwrap();
        assert!(!verify(&p, &sig, Platform::Ethereum, &sender).unwrap());
    }

    #[test]
    fn unknown_platform_is_an_error() {
        assert_eq!(
            parse_platform("Bitcoin"),
            Err(VerificationError::UnsupportedPlatform("Bitcoin".into()))
        );
        assert!(parse_platform("ethereum").is_err());
        assert_eq!(parse_platform("Algorand"), Ok(Platform::Algorand));
    }
}
