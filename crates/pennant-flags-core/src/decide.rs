// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Interfaces implemented by flag providers.
//!
//! Both traits are blanket-implemented for async closures, so a flag can be
//! declared inline:
//!
//! ```
//! use pennant_flags_core::{Decide, DecideParams};
//! use serde_json::json;
//!
//! fn assert_decide(_: impl Decide) {}
//! assert_decide(|params: DecideParams| async move {
//! 	Ok::<_, pennant_flags_core::DecideError>(Some(json!(params.cookies.get("beta").is_some())))
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use serde_json::Value;

use crate::context::RequestCookies;
use crate::error::DecideError;

/// Everything a decide function may look at.
#[derive(Debug, Clone)]
pub struct DecideParams {
	pub key: String,
	pub headers: Arc<HeaderMap>,
	pub cookies: Arc<RequestCookies>,
	/// Output of the flag's identify step, if it has one.
	pub entities: Option<Value>,
	pub default_value: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct IdentifyParams {
	pub headers: Arc<HeaderMap>,
	pub cookies: Arc<RequestCookies>,
}

/// Computes a flag's value for a request.
///
/// `Ok(None)` means "no value": evaluation then falls back to the flag's
/// default.
#[async_trait]
pub trait Decide: Send + Sync + 'static {
	async fn decide(&self, params: DecideParams) -> Result<Option<Value>, DecideError>;
}

#[async_trait]
impl<F, Fut> Decide for F
where
	F: Fn(DecideParams) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Option<Value>, DecideError>> + Send + 'static,
{
	async fn decide(&self, params: DecideParams) -> Result<Option<Value>, DecideError> {
		self(params).await
	}
}

/// Derives evaluation entities (user, team, ...) from a request.
///
/// Returning `Ok(None)` means "no entities".
#[async_trait]
pub trait Identify: Send + Sync + 'static {
	async fn identify(&self, params: IdentifyParams) -> Result<Option<Value>, DecideError>;
}

#[async_trait]
impl<F, Fut> Identify for F
where
	F: Fn(IdentifyParams) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Option<Value>, DecideError>> + Send + 'static,
{
	async fn identify(&self, params: IdentifyParams) -> Result<Option<Value>, DecideError> {
		self(params).await
	}
}

/// Where a flag's entities come from.
#[derive(Clone)]
pub enum IdentifySource {
	/// Computed per request, deduplicated by function identity.
	Function(Arc<dyn Identify>),
	/// Fixed entities supplied by the caller.
	Value(Value),
}

impl IdentifySource {
	pub fn function(identify: impl Identify) -> Self {
		IdentifySource::Function(Arc::new(identify))
	}
}

impl From<Value> for IdentifySource {
	fn from(value: Value) -> Self {
		IdentifySource::Value(value)
	}
}

impl From<Arc<dyn Identify>> for IdentifySource {
	fn from(identify: Arc<dyn Identify>) -> Self {
		IdentifySource::Function(identify)
	}
}

impl fmt::Debug for IdentifySource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			IdentifySource::Function(identify) => f
				.debug_tuple("Function")
				.field(&Arc::as_ptr(identify))
				.finish(),
			IdentifySource::Value(value) => f.debug_tuple("Value").field(value).finish(),
		}
	}
}
