// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provider adapters.
//!
//! An adapter supplies defaults for the flags declared against it: a decide
//! function, an identify function and an origin. Anything set directly on the
//! flag wins over the adapter.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decide::{Decide, Identify};

/// Where a flag is managed, shown by flag tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Origin {
	/// A dashboard URL.
	Url(String),
	/// Provider-specific details, e.g. `{"provider": "statsig", "projectId": "..."}`.
	Details(Map<String, Value>),
}

impl From<&str> for Origin {
	fn from(url: &str) -> Self {
		Origin::Url(url.to_string())
	}
}

impl From<String> for Origin {
	fn from(url: String) -> Self {
		Origin::Url(url)
	}
}

#[derive(Clone)]
pub struct Adapter {
	decide: Option<Arc<dyn Decide>>,
	identify: Option<Arc<dyn Identify>>,
	origin: Option<Origin>,
	report_value: bool,
}

impl Default for Adapter {
	fn default() -> Self {
		Self::new()
	}
}

impl Adapter {
	pub fn new() -> Self {
		Self {
			decide: None,
			identify: None,
			origin: None,
			report_value: true,
		}
	}

	pub fn with_decide(mut self, decide: impl Decide) -> Self {
		self.decide = Some(Arc::new(decide));
		self
	}

	pub fn with_identify(mut self, identify: impl Identify) -> Self {
		self.identify = Some(Arc::new(identify));
		self
	}

	/// Shares one identify function across adapters so its result is
	/// deduplicated between them.
	pub fn with_shared_identify(mut self, identify: Arc<dyn Identify>) -> Self {
		self.identify = Some(identify);
		self
	}

	pub fn with_origin(mut self, origin: impl Into<Origin>) -> Self {
		self.origin = Some(origin.into());
		self
	}

	/// Disables value reporting for flags using this adapter.
	pub fn without_value_reporting(mut self) -> Self {
		self.report_value = false;
		self
	}

	pub fn decide(&self) -> Option<&Arc<dyn Decide>> {
		self.decide.as_ref()
	}

	pub fn identify(&self) -> Option<&Arc<dyn Identify>> {
		self.identify.as_ref()
	}

	pub fn origin(&self) -> Option<&Origin> {
		self.origin.as_ref()
	}

	pub fn reports_value(&self) -> bool {
		self.report_value
	}
}

impl fmt::Debug for Adapter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Adapter")
			.field("has_decide", &self.decide.is_some())
			.field("has_identify", &self.identify.is_some())
			.field("origin", &self.origin)
			.field("report_value", &self.report_value)
			.finish()
	}
}
