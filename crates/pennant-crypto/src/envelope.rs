// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Encrypted, expiring envelopes.
//!
//! Tokens use the compact JWE serialization with direct key agreement and
//! AES-256-GCM: `header..iv.ciphertext.tag`, every part base64url without
//! padding and the encrypted-key part empty. The encoded protected header is
//! bound as additional authenticated data.
//!
//! [`seal`] wraps a serializable payload in claims carrying a purpose tag and
//! an expiry, so a token minted for one use (say, overrides) is rejected when
//! presented for another.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::secret::FlagsSecret;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Default lifetime of a sealed envelope.
pub const DEFAULT_EXPIRATION_DAYS: i64 = 365;

const PROTECTED_HEADER: &str = r#"{"alg":"dir","enc":"A256GCM"}"#;

#[derive(Debug, Deserialize)]
struct Header {
	alg: String,
	enc: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims<T> {
	pur: String,
	iat: i64,
	exp: i64,
	c: T,
}

/// Encrypts raw bytes into a compact JWE string.
pub fn encrypt(secret: &FlagsSecret, plaintext: &[u8]) -> Result<String> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(secret.expose()));
	let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
	let header = URL_SAFE_NO_PAD.encode(PROTECTED_HEADER);

	let mut sealed = cipher
		.encrypt(
			&nonce,
			Payload {
				msg: plaintext,
				aad: header.as_bytes(),
			},
		)
		.map_err(|e| CryptoError::Encryption(e.to_string()))?;

	let tag = sealed.split_off(sealed.len() - TAG_SIZE);

	Ok(format!(
		"{header}..{}.{}.{}",
		URL_SAFE_NO_PAD.encode(nonce),
		URL_SAFE_NO_PAD.encode(&sealed),
		URL_SAFE_NO_PAD.encode(&tag),
	))
}

/// Decrypts a compact JWE string produced by [`encrypt`].
pub fn decrypt(secret: &FlagsSecret, token: &str) -> Result<Zeroizing<Vec<u8>>> {
	let parts: Vec<&str> = token.split('.').collect();
	let [header_b64, encrypted_key, iv_b64, ciphertext_b64, tag_b64] = parts.as_slice() else {
		return Err(CryptoError::Malformed("expected five segments"));
	};

	if !encrypted_key.is_empty() {
		return Err(CryptoError::Malformed("unexpected encrypted key"));
	}

	let header: Header = serde_json::from_slice(&decode_part(header_b64)?)
		.map_err(|_| CryptoError::Malformed("invalid protected header"))?;
	if header.alg != "dir" || header.enc != "A256GCM" {
		return Err(CryptoError::Malformed("unsupported algorithm"));
	}

	let iv = decode_part(iv_b64)?;
	if iv.len() != NONCE_SIZE {
		return Err(CryptoError::Malformed("invalid nonce length"));
	}
	let tag = decode_part(tag_b64)?;
	if tag.len() != TAG_SIZE {
		return Err(CryptoError::Malformed("invalid tag length"));
	}

	let mut sealed = decode_part(ciphertext_b64)?;
	sealed.extend_from_slice(&tag);

	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(secret.expose()));
	let plaintext = cipher
		.decrypt(
			Nonce::from_slice(&iv),
			Payload {
				msg: &sealed,
				aad: header_b64.as_bytes(),
			},
		)
		.map_err(|_| CryptoError::Decryption)?;

	Ok(Zeroizing::new(plaintext))
}

/// Encrypts `payload` with a purpose tag, expiring after `expires_in`.
pub fn seal<T: Serialize>(
	secret: &FlagsSecret,
	purpose: &str,
	payload: &T,
	expires_in: Duration,
) -> Result<String> {
	let now = Utc::now();
	let claims = Claims {
		pur: purpose.to_string(),
		iat: now.timestamp(),
		exp: (now + expires_in).timestamp(),
		c: payload,
	};
	let plaintext = Zeroizing::new(serde_json::to_vec(&claims)?);
	encrypt(secret, &plaintext)
}

/// Decrypts a token produced by [`seal`], checking purpose and expiry.
pub fn open<T: DeserializeOwned>(secret: &FlagsSecret, purpose: &str, token: &str) -> Result<T> {
	let plaintext = decrypt(secret, token)?;
	let claims: Claims<T> = serde_json::from_slice(&plaintext)?;

	if claims.pur != purpose {
		return Err(CryptoError::PurposeMismatch {
			expected: purpose.to_string(),
			actual: claims.pur,
		});
	}
	if claims.exp <= Utc::now().timestamp() {
		return Err(CryptoError::Expired);
	}

	Ok(claims.c)
}

fn decode_part(part: &str) -> Result<Vec<u8>> {
	URL_SAFE_NO_PAD
		.decode(part)
		.map_err(|_| CryptoError::Malformed("invalid base64url segment"))
}
