// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Encrypted flag values and definitions for embedding in responses.
//!
//! Flag tooling reads the values a page was rendered with, and the
//! definitions of the flags it used, from encrypted blobs in the page. Each
//! kind is sealed under its own purpose so one cannot be replayed as another.

use std::collections::BTreeMap;

use chrono::Duration;
use pennant_crypto::{open, seal, FlagsSecret, DEFAULT_EXPIRATION_DAYS};
use pennant_flags_core::{FlagDefinition, Result};

use crate::precompute::FlagValues;

const VALUES_PURPOSE: &str = "values";
const DEFINITIONS_PURPOSE: &str = "definitions";

/// Flag definitions keyed by flag key.
pub type FlagDefinitions = BTreeMap<String, FlagDefinition>;

fn lifetime(expires_in: Option<Duration>) -> Duration {
	expires_in.unwrap_or_else(|| Duration::days(DEFAULT_EXPIRATION_DAYS))
}

pub fn encrypt_flag_values(
	secret: &FlagsSecret,
	values: &FlagValues,
	expires_in: Option<Duration>,
) -> Result<String> {
	Ok(seal(secret, VALUES_PURPOSE, values, lifetime(expires_in))?)
}

pub fn decrypt_flag_values(secret: &FlagsSecret, token: &str) -> Result<FlagValues> {
	Ok(open(secret, VALUES_PURPOSE, token)?)
}

pub fn encrypt_flag_definitions(
	secret: &FlagsSecret,
	definitions: &FlagDefinitions,
	expires_in: Option<Duration>,
) -> Result<String> {
	Ok(seal(
		secret,
		DEFINITIONS_PURPOSE,
		definitions,
		lifetime(expires_in),
	)?)
}

pub fn decrypt_flag_definitions(secret: &FlagsSecret, token: &str) -> Result<FlagDefinitions> {
	Ok(open(secret, DEFINITIONS_PURPOSE, token)?)
}
