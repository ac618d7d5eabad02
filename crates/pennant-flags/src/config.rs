// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Engine configuration from environment variables.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `FLAGS_SECRET` | base64url encoded 32-byte secret |
//! | `FLAGS_SECRET_FILE` | path to a file holding the secret (wins over `FLAGS_SECRET`) |
//! | `FLAGS_OVERRIDE_COOKIE` | name of the overrides cookie |

use std::env;

use pennant_crypto::{FlagsSecret, DEFAULT_SECRET_ENV};
use pennant_flags_core::{FlagsError, Result};

/// Cookie the overrides are read from unless configured otherwise.
pub const DEFAULT_OVERRIDE_COOKIE: &str = "vercel-flag-overrides";

pub const OVERRIDE_COOKIE_ENV: &str = "FLAGS_OVERRIDE_COOKIE";

#[derive(Debug, Clone)]
pub struct FlagsConfig {
	/// Shared secret. Overrides, precomputation and access proofs are
	/// unavailable without one.
	pub secret: Option<FlagsSecret>,
	pub override_cookie: String,
}

impl Default for FlagsConfig {
	fn default() -> Self {
		Self {
			secret: None,
			override_cookie: DEFAULT_OVERRIDE_COOKIE.to_string(),
		}
	}
}

impl FlagsConfig {
	/// Reads the configuration from the process environment.
	///
	/// A missing secret is not an error; a secret that is set but invalid is.
	pub fn from_env() -> Result<Self> {
		let secret = FlagsSecret::load_env(DEFAULT_SECRET_ENV)?;
		let override_cookie = env::var(OVERRIDE_COOKIE_ENV)
			.ok()
			.map(|name| name.trim().to_string())
			.filter(|name| !name.is_empty())
			.unwrap_or_else(|| DEFAULT_OVERRIDE_COOKIE.to_string());

		Ok(Self {
			secret,
			override_cookie,
		})
	}

	pub fn with_secret(mut self, secret: FlagsSecret) -> Self {
		self.secret = Some(secret);
		self
	}

	pub fn require_secret(&self) -> Result<&FlagsSecret> {
		self.secret.as_ref().ok_or(FlagsError::MissingSecret)
	}
}
