// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Compact HMAC-SHA256 signatures.
//!
//! Signed messages use the compact JWS serialization with `alg: HS256`:
//! `header.payload.signature`, each part base64url without padding. The
//! output only contains URL-safe characters, so it can be used directly as a
//! path segment.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::secret::FlagsSecret;

type HmacSha256 = Hmac<Sha256>;

const PROTECTED_HEADER: &str = r#"{"alg":"HS256"}"#;

fn mac(secret: &FlagsSecret) -> Result<HmacSha256> {
	HmacSha256::new_from_slice(secret.expose())
		.map_err(|e| CryptoError::InvalidSecret(e.to_string()))
}

/// Signs `payload`, returning a compact JWS string.
pub fn sign(secret: &FlagsSecret, payload: &[u8]) -> Result<String> {
	let signing_input = format!(
		"{}.{}",
		URL_SAFE_NO_PAD.encode(PROTECTED_HEADER),
		URL_SAFE_NO_PAD.encode(payload)
	);

	let mut mac = mac(secret)?;
	mac.update(signing_input.as_bytes());
	let signature = mac.finalize().into_bytes();

	Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Verifies a compact JWS string produced by [`sign`] and returns its payload.
pub fn verify(secret: &FlagsSecret, token: &str) -> Result<Vec<u8>> {
	let (signing_input, signature_b64) = token
		.rsplit_once('.')
		.ok_or(CryptoError::Malformed("missing signature"))?;
	let (header_b64, payload_b64) = signing_input
		.split_once('.')
		.ok_or(CryptoError::Malformed("missing payload"))?;

	if header_b64 != URL_SAFE_NO_PAD.encode(PROTECTED_HEADER) {
		return Err(CryptoError::Malformed("unsupported header"));
	}

	let signature = URL_SAFE_NO_PAD
		.decode(signature_b64)
		.map_err(|_| CryptoError::Malformed("invalid base64url signature"))?;

	let mut mac = mac(secret)?;
	mac.update(signing_input.as_bytes());
	mac
		.verify_slice(&signature)
		.map_err(|_| CryptoError::InvalidSignature)?;

	URL_SAFE_NO_PAD
		.decode(payload_b64)
		.map_err(|_| CryptoError::Malformed("invalid base64url payload"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn token_is_url_safe() {
		let secret = FlagsSecret::generate();
		let token = sign(&secret, &[0, 1, 252, 253, 254, 255]).unwrap();
		assert!(token
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'));
		assert_eq!(token.matches('.').count(), 2);
	}

	#[test]
	fn sign_is_deterministic() {
		let secret = FlagsSecret::from_bytes([3u8; 32]);
		assert_eq!(
			sign(&secret, b"payload").unwrap(),
			sign(&secret, b"payload").unwrap()
		);
	}

	#[test]
	fn verify_returns_payload() {
		let secret = FlagsSecret::generate();
		let token = sign(&secret, b"\x00\xfe\"a\"").unwrap();
		assert_eq!(verify(&secret, &token).unwrap(), b"\x00\xfe\"a\"");
	}

	#[test]
	fn wrong_secret_is_rejected() {
		let token = sign(&FlagsSecret::generate(), b"payload").unwrap();
		assert_eq!(
			verify(&FlagsSecret::generate(), &token),
			Err(CryptoError::InvalidSignature)
		);
	}

	#[test]
	fn tampered_payload_is_rejected() {
		let secret = FlagsSecret::generate();
		let token = sign(&secret, b"payload").unwrap();
		let parts: Vec<&str> = token.split('.').collect();
		let forged = format!(
			"{}.{}.{}",
			parts[0],
			URL_SAFE_NO_PAD.encode(b"pay1oad"),
			parts[2]
		);
		assert_eq!(verify(&secret, &forged), Err(CryptoError::InvalidSignature));
	}

	#[test]
	fn malformed_tokens_are_rejected() {
		let secret = FlagsSecret::generate();
		for token in ["", "nodots", "one.dot", "eyJhbGciOiJub25lIn0.e30.sig"] {
			assert!(matches!(
				verify(&secret, token),
				Err(CryptoError::Malformed(_))
			));
		}
	}

	proptest! {
		#[test]
		fn prop_sign_verify_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..1000)) {
			let secret = FlagsSecret::generate();
			let token = sign(&secret, &payload).unwrap();
			prop_assert_eq!(verify(&secret, &token).unwrap(), payload);
		}

		#[test]
		fn prop_different_payloads_different_tokens(
			a in proptest::collection::vec(any::<u8>(), 0..100),
			b in proptest::collection::vec(any::<u8>(), 0..100),
		) {
			let secret = FlagsSecret::generate();
			if a != b {
				prop_assert_ne!(sign(&secret, &a).unwrap(), sign(&secret, &b).unwrap());
			}
		}
	}
}
