// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag overrides carried in an encrypted cookie.
//!
//! Flag tooling lets a developer force flag values for their own browser. The
//! forced values travel as an envelope sealed with purpose `overrides`; a
//! cookie that is missing, tampered with, expired or sealed with another
//! secret simply means "no overrides".

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use pennant_crypto::{open, seal, FlagsSecret, DEFAULT_EXPIRATION_DAYS};
use pennant_dedupe::{MemoizationRegistry, Memoized};
use pennant_flags_core::{FlagsError, RequestContext, Result};
use serde_json::Value;
use tracing::debug;

const OVERRIDES_PURPOSE: &str = "overrides";

/// Forced flag values, keyed by flag key.
pub type OverrideSet = BTreeMap<String, Value>;

/// Seals `overrides` into a cookie value.
pub fn encrypt_overrides(
	secret: &FlagsSecret,
	overrides: &OverrideSet,
	expires_in: Option<Duration>,
) -> Result<String> {
	Ok(seal(
		secret,
		OVERRIDES_PURPOSE,
		overrides,
		expires_in.unwrap_or_else(|| Duration::days(DEFAULT_EXPIRATION_DAYS)),
	)?)
}

/// Opens an overrides cookie value. Every failure yields `None`.
pub fn decrypt_overrides(secret: &FlagsSecret, cookie: &str) -> Option<OverrideSet> {
	match open::<OverrideSet>(secret, OVERRIDES_PURPOSE, cookie) {
		Ok(overrides) => Some(overrides),
		Err(e) => {
			debug!(error = %e, "ignoring unreadable overrides cookie");
			None
		}
	}
}

type DecryptFn = Memoized<(String,), Option<Arc<OverrideSet>>, FlagsError>;

/// Reads overrides from the request's cookie.
///
/// Decryption is deduplicated per request by cookie value, so every flag
/// evaluated in a request shares one decryption.
#[derive(Debug, Clone)]
pub struct OverrideResolver {
	cookie_name: String,
	decrypt: Option<DecryptFn>,
}

impl OverrideResolver {
	/// Without a secret the resolver never finds overrides.
	pub fn new(
		registry: &Arc<MemoizationRegistry>,
		secret: Option<FlagsSecret>,
		cookie_name: impl Into<String>,
	) -> Self {
		let decrypt: Option<DecryptFn> = secret.map(|secret| {
			Memoized::new(registry, move |(cookie,): (String,)| {
				let overrides = decrypt_overrides(&secret, &cookie).map(Arc::new);
				future::ready(Ok(overrides))
			})
		});

		Self {
			cookie_name: cookie_name.into(),
			decrypt,
		}
	}

	pub fn cookie_name(&self) -> &str {
		&self.cookie_name
	}

	/// Resolves the overrides for `ctx`.
	///
	/// The cache lookup happens before this returns; the future holds no
	/// borrow of the context or the resolver.
	pub fn resolve(&self, ctx: &RequestContext) -> BoxFuture<'static, Option<Arc<OverrideSet>>> {
		let (Some(decrypt), Some(cookie)) = (&self.decrypt, ctx.cookies().get(&self.cookie_name))
		else {
			return future::ready(None).boxed();
		};

		let call = decrypt.call(ctx.scope(), (cookie.to_string(),));
		async move {
			match call.await {
				Ok(overrides) => overrides,
				Err(e) => {
					debug!(error = %e, "override lookup failed");
					None
				}
			}
		}
		.boxed()
	}
}
