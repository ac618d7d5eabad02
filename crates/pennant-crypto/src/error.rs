// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use thiserror::Error;

/// Errors from secret loading, encryption and signing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
	#[error("flags secret not found: set either {var} or {file_var}")]
	MissingSecret { var: String, file_var: String },

	#[error("invalid flags secret: {0}")]
	InvalidSecret(String),

	#[error("secret file path in {var} is empty")]
	EmptySecretPath { var: String },

	#[error("failed to read secret file at {path}: {message}")]
	SecretFile { path: PathBuf, message: String },

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("decryption failed")]
	Decryption,

	#[error("malformed token: {0}")]
	Malformed(&'static str),

	#[error("signature verification failed")]
	InvalidSignature,

	#[error("token expired")]
	Expired,

	#[error("token purpose mismatch: expected {expected}, got {actual}")]
	PurposeMismatch { expected: String, actual: String },

	#[error("serialization error: {0}")]
	Serialization(String),
}

impl From<serde_json::Error> for CryptoError {
	fn from(err: serde_json::Error) -> Self {
		CryptoError::Serialization(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, CryptoError>;
