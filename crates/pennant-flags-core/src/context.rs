// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request-scoped context handed to flag evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::header::COOKIE;
use http::HeaderMap;
use pennant_dedupe::{ArgKey, MemoArg, MemoizationRegistry, RequestScope, WeakRequestScope};

/// Cookies sent with a request, parsed once from the `Cookie` headers.
///
/// When the same name appears more than once, the first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCookies {
	cookies: BTreeMap<String, String>,
}

impl RequestCookies {
	pub fn from_headers(headers: &HeaderMap) -> Self {
		let mut cookies = BTreeMap::new();
		for value in headers.get_all(COOKIE) {
			let Ok(value) = value.to_str() else {
				continue;
			};
			for pair in value.split(';') {
				let Some((name, raw)) = pair.trim().split_once('=') else {
					continue;
				};
				let name = name.trim();
				if name.is_empty() {
					continue;
				}
				let raw = raw.trim();
				let unquoted = raw
					.strip_prefix('"')
					.and_then(|v| v.strip_suffix('"'))
					.unwrap_or(raw);
				cookies
					.entry(name.to_string())
					.or_insert_with(|| unquoted.to_string());
			}
		}
		Self { cookies }
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.cookies.get(name).map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub fn len(&self) -> usize {
		self.cookies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cookies.is_empty()
	}
}

/// The current request: its memoization scope plus read-only headers and
/// cookies.
///
/// Cloning is cheap and every clone shares the same scope. Per-request caches
/// are discarded when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct RequestContext {
	scope: RequestScope,
	headers: Arc<HeaderMap>,
	cookies: Arc<RequestCookies>,
}

impl RequestContext {
	/// Opens a new request scope on `registry` for the given headers.
	pub fn new(registry: &Arc<MemoizationRegistry>, headers: HeaderMap) -> Self {
		let cookies = RequestCookies::from_headers(&headers);
		Self {
			scope: registry.open_scope(),
			headers: Arc::new(headers),
			cookies: Arc::new(cookies),
		}
	}

	pub fn scope(&self) -> &RequestScope {
		&self.scope
	}

	pub fn headers(&self) -> &Arc<HeaderMap> {
		&self.headers
	}

	pub fn cookies(&self) -> &Arc<RequestCookies> {
		&self.cookies
	}

	/// A handle that can be parked inside cached futures without keeping the
	/// request scope open.
	pub fn view(&self) -> RequestView {
		RequestView {
			scope: self.scope.downgrade(),
			headers: Arc::clone(&self.headers),
			cookies: Arc::clone(&self.cookies),
		}
	}
}

/// Headers and cookies of a request, detached from its scope's lifetime.
///
/// Memoizes by the identity of the header map, so every view of the same
/// request shares cache entries.
#[derive(Debug, Clone)]
pub struct RequestView {
	scope: WeakRequestScope,
	headers: Arc<HeaderMap>,
	cookies: Arc<RequestCookies>,
}

impl RequestView {
	pub fn scope(&self) -> &WeakRequestScope {
		&self.scope
	}

	pub fn headers(&self) -> &Arc<HeaderMap> {
		&self.headers
	}

	pub fn cookies(&self) -> &Arc<RequestCookies> {
		&self.cookies
	}
}

impl MemoArg for RequestView {
	fn memo_key(&self) -> ArgKey {
		ArgKey::object(&self.headers)
	}
}
