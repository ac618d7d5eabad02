// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access proofs for flag discovery endpoints.
//!
//! Flag tooling authenticates against a discovery endpoint with
//! `Authorization: Bearer <proof>`, where the proof is an empty envelope sealed
//! with purpose `proof`. Anyone holding the secret can mint one.

use chrono::Duration;
use serde_json::{Map, Value};
use tracing::debug;

use crate::envelope::{open, seal, DEFAULT_EXPIRATION_DAYS};
use crate::error::Result;
use crate::secret::FlagsSecret;

const PROOF_PURPOSE: &str = "proof";

/// Mints an access proof valid for `expires_in` (a year when `None`).
pub fn create_access_proof(secret: &FlagsSecret, expires_in: Option<Duration>) -> Result<String> {
	seal(
		secret,
		PROOF_PURPOSE,
		&Map::<String, Value>::new(),
		expires_in.unwrap_or_else(|| Duration::days(DEFAULT_EXPIRATION_DAYS)),
	)
}

/// Checks an `Authorization` header value carrying a bearer access proof.
///
/// Any failure (missing header, wrong scheme, bad token, expired proof,
/// proof minted for another purpose) is reported as `false`.
pub fn verify_access(authorization: Option<&str>, secret: &FlagsSecret) -> bool {
	let Some(header) = authorization else {
		return false;
	};
	let Some((scheme, token)) = header.trim().split_once(' ') else {
		return false;
	};
	if !scheme.eq_ignore_ascii_case("bearer") {
		return false;
	}

	match open::<Map<String, Value>>(secret, PROOF_PURPOSE, token.trim()) {
		Ok(_) => true,
		Err(e) => {
			debug!(error = %e, "rejected access proof");
			false
		}
	}
}
