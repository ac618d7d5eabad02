// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The shared flags secret.
//!
//! The secret is 32 random bytes, base64url encoded. It can be provided
//! directly in `FLAGS_SECRET` or, for Docker/Kubernetes secrets, as a file path
//! in `FLAGS_SECRET_FILE` (the file wins when both are set).

use std::path::PathBuf;
use std::{env, fmt, fs};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Length of the secret in bytes.
pub const SECRET_LEN: usize = 32;

/// Environment variable the secret is read from by default.
pub const DEFAULT_SECRET_ENV: &str = "FLAGS_SECRET";

const REDACTED: &str = "[REDACTED]";

/// 32-byte symmetric key shared by every flags crypto operation.
///
/// `Debug` and `Display` never print the key, and the bytes are zeroed when
/// the value is dropped.
#[derive(Clone)]
pub struct FlagsSecret {
	key: Zeroizing<[u8; SECRET_LEN]>,
}

impl FlagsSecret {
	pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
		Self {
			key: Zeroizing::new(bytes),
		}
	}

	/// Generates a fresh random secret.
	pub fn generate() -> Self {
		let mut key = Zeroizing::new([0u8; SECRET_LEN]);
		OsRng.fill_bytes(&mut key[..]);
		Self { key }
	}

	/// Parses a base64url secret. Padding and surrounding whitespace are ignored.
	pub fn from_base64url(encoded: &str) -> Result<Self> {
		let trimmed = encoded.trim().trim_end_matches('=');
		let decoded = Zeroizing::new(
			URL_SAFE_NO_PAD
				.decode(trimmed)
				.map_err(|e| CryptoError::InvalidSecret(format!("not base64url: {e}")))?,
		);

		if decoded.len() != SECRET_LEN {
			return Err(CryptoError::InvalidSecret(format!(
				"expected {SECRET_LEN} bytes, got {}",
				decoded.len()
			)));
		}

		let mut key = Zeroizing::new([0u8; SECRET_LEN]);
		key.copy_from_slice(&decoded);
		Ok(Self { key })
	}

	/// Encodes the secret for storage in an environment variable.
	///
	/// Call sites must opt in to seeing the key.
	pub fn expose_base64url(&self) -> String {
		URL_SAFE_NO_PAD.encode(self.key.as_slice())
	}

	/// Loads the secret from `FLAGS_SECRET` / `FLAGS_SECRET_FILE`.
	pub fn from_env() -> Result<Self> {
		Self::require_env(DEFAULT_SECRET_ENV)
	}

	/// Loads a secret from `var` or `{var}_FILE`, failing when neither is set.
	pub fn require_env(var: &str) -> Result<Self> {
		Self::load_env(var)?.ok_or_else(|| CryptoError::MissingSecret {
			var: var.to_string(),
			file_var: format!("{var}_FILE"),
		})
	}

	/// Loads a secret from `var` or `{var}_FILE`.
	///
	/// `{var}_FILE` takes precedence. A single trailing newline in the file is
	/// stripped. Returns `Ok(None)` when neither variable is set.
	pub fn load_env(var: &str) -> Result<Option<Self>> {
		let file_var = format!("{var}_FILE");

		if let Ok(path_str) = env::var(&file_var) {
			if path_str.is_empty() {
				return Err(CryptoError::EmptySecretPath { var: file_var });
			}

			let path = PathBuf::from(&path_str);
			let content = Zeroizing::new(fs::read_to_string(&path).map_err(|e| {
				CryptoError::SecretFile {
					path: path.clone(),
					message: e.to_string(),
				}
			})?);

			let encoded = content.strip_suffix('\n').unwrap_or(&content);
			return Self::from_base64url(encoded).map(Some);
		}

		match env::var(var) {
			Ok(value) => Self::from_base64url(&Zeroizing::new(value)).map(Some),
			Err(_) => Ok(None),
		}
	}

	pub(crate) fn expose(&self) -> &[u8; SECRET_LEN] {
		&self.key
	}
}

impl fmt::Debug for FlagsSecret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("FlagsSecret").field(&REDACTED).finish()
	}
}

impl fmt::Display for FlagsSecret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl PartialEq for FlagsSecret {
	fn eq(&self, other: &Self) -> bool {
		self.key.as_slice().ct_eq(other.key.as_slice()).into()
	}
}

impl Eq for FlagsSecret {}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[test]
	fn debug_and_display_are_redacted() {
		let secret = FlagsSecret::generate();
		assert_eq!(format!("{secret:?}"), "FlagsSecret(\"[REDACTED]\")");
		assert_eq!(format!("{secret}"), "[REDACTED]");
	}

	#[test]
	fn base64url_roundtrip() {
		let secret = FlagsSecret::generate();
		let encoded = secret.expose_base64url();
		assert_eq!(encoded.len(), 43);
		assert_eq!(FlagsSecret::from_base64url(&encoded).unwrap(), secret);
	}

	#[test]
	fn accepts_padding_and_whitespace() {
		let secret = FlagsSecret::from_bytes([7u8; SECRET_LEN]);
		let padded = format!("  {}=\n", secret.expose_base64url());
		assert_eq!(FlagsSecret::from_base64url(&padded).unwrap(), secret);
	}

	#[test]
	fn rejects_wrong_length() {
		let short = URL_SAFE_NO_PAD.encode([1u8; 16]);
		assert!(matches!(
			FlagsSecret::from_base64url(&short),
			Err(CryptoError::InvalidSecret(_))
		));
	}

	#[test]
	fn rejects_non_base64() {
		assert!(matches!(
			FlagsSecret::from_base64url("not a secret!"),
			Err(CryptoError::InvalidSecret(_))
		));
	}

	#[test]
	fn generated_secrets_differ() {
		assert_ne!(FlagsSecret::generate(), FlagsSecret::generate());
	}

	#[test]
	fn load_env_returns_none_when_unset() {
		let var = "PENNANT_TEST_SECRET_UNSET";
		env::remove_var(var);
		env::remove_var(format!("{var}_FILE"));

		assert!(FlagsSecret::load_env(var).unwrap().is_none());
		assert!(matches!(
			FlagsSecret::require_env(var),
			Err(CryptoError::MissingSecret { .. })
		));
	}

	#[test]
	fn load_env_reads_direct_value() {
		let var = "PENNANT_TEST_SECRET_DIRECT";
		let secret = FlagsSecret::generate();
		env::set_var(var, secret.expose_base64url());
		env::remove_var(format!("{var}_FILE"));

		assert_eq!(FlagsSecret::require_env(var).unwrap(), secret);

		env::remove_var(var);
	}

	#[test]
	fn file_var_takes_precedence() {
		let var = "PENNANT_TEST_SECRET_FILE";
		let from_file = FlagsSecret::generate();
		let direct = FlagsSecret::generate();

		let mut temp_file = NamedTempFile::new().unwrap();
		writeln!(temp_file, "{}", from_file.expose_base64url()).unwrap();

		env::set_var(var, direct.expose_base64url());
		env::set_var(format!("{var}_FILE"), temp_file.path().to_str().unwrap());

		assert_eq!(FlagsSecret::require_env(var).unwrap(), from_file);

		env::remove_var(var);
		env::remove_var(format!("{var}_FILE"));
	}

	#[test]
	fn empty_file_path_is_an_error() {
		let var = "PENNANT_TEST_SECRET_EMPTY_PATH";
		env::set_var(format!("{var}_FILE"), "");

		assert!(matches!(
			FlagsSecret::load_env(var),
			Err(CryptoError::EmptySecretPath { .. })
		));

		env::remove_var(format!("{var}_FILE"));
	}

	#[test]
	fn missing_file_is_an_error() {
		let var = "PENNANT_TEST_SECRET_MISSING_FILE";
		env::set_var(format!("{var}_FILE"), "/nonexistent/pennant/secret");

		assert!(matches!(
			FlagsSecret::load_env(var),
			Err(CryptoError::SecretFile { .. })
		));

		env::remove_var(format!("{var}_FILE"));
	}
}
