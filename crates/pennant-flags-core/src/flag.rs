// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag declarations.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::{Adapter, Origin};
use crate::decide::{Decide, Identify};
use crate::error::{FlagsError, Result};

/// One of the values a flag may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagOption {
	pub value: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
}

impl FlagOption {
	pub fn new(value: impl Into<Value>) -> Self {
		Self {
			value: value.into(),
			label: None,
		}
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}
}

impl From<Value> for FlagOption {
	fn from(value: Value) -> Self {
		Self::new(value)
	}
}

struct FlagInner {
	key: String,
	description: Option<String>,
	origin: Option<Origin>,
	default_value: Option<Value>,
	options: Option<Vec<FlagOption>>,
	decide: Arc<dyn Decide>,
	identify: Option<Arc<dyn Identify>>,
	report_value: bool,
	stringified_options: OnceCell<Vec<String>>,
}

/// An immutable flag declaration.
///
/// Cloning is cheap; clones share the declaration.
#[derive(Clone)]
pub struct Flag {
	inner: Arc<FlagInner>,
}

impl Flag {
	pub fn builder(key: impl Into<String>) -> FlagBuilder {
		FlagBuilder::new(key)
	}

	pub fn key(&self) -> &str {
		&self.inner.key
	}

	pub fn description(&self) -> Option<&str> {
		self.inner.description.as_deref()
	}

	pub fn origin(&self) -> Option<&Origin> {
		self.inner.origin.as_ref()
	}

	pub fn default_value(&self) -> Option<&Value> {
		self.inner.default_value.as_ref()
	}

	/// Declared options. `None` when the flag declares none, which is distinct
	/// from an explicitly empty list.
	pub fn options(&self) -> Option<&[FlagOption]> {
		self.inner.options.as_deref()
	}

	pub fn decide_fn(&self) -> &Arc<dyn Decide> {
		&self.inner.decide
	}

	pub fn identify_fn(&self) -> Option<&Arc<dyn Identify>> {
		self.inner.identify.as_ref()
	}

	pub fn reports_value(&self) -> bool {
		self.inner.report_value
	}

	/// Position of `value` among the declared options.
	///
	/// Objects and arrays match by their JSON text; everything else by plain
	/// equality.
	pub fn option_index(&self, value: &Value) -> Option<usize> {
		let options = self.options()?;
		if value.is_object() || value.is_array() {
			let needle = value.to_string();
			self.stringified_options()
				.iter()
				.position(|candidate| *candidate == needle)
		} else {
			options.iter().position(|option| option.value == *value)
		}
	}

	/// JSON text of every declared option, computed once per flag.
	pub fn stringified_options(&self) -> &[String] {
		self.inner.stringified_options.get_or_init(|| {
			self.inner
				.options
				.iter()
				.flatten()
				.map(|option| option.value.to_string())
				.collect()
		})
	}

	/// True when both handles refer to the same declaration.
	pub fn ptr_eq(&self, other: &Flag) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl fmt::Debug for Flag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Flag")
			.field("key", &self.inner.key)
			.field("default_value", &self.inner.default_value)
			.field("options", &self.inner.options)
			.field("has_identify", &self.inner.identify.is_some())
			.field("report_value", &self.inner.report_value)
			.finish()
	}
}

/// Builder for [`Flag`].
pub struct FlagBuilder {
	key: String,
	description: Option<String>,
	origin: Option<Origin>,
	default_value: Option<Value>,
	options: Option<Vec<FlagOption>>,
	decide: Option<Arc<dyn Decide>>,
	identify: Option<Arc<dyn Identify>>,
	adapter: Option<Adapter>,
	report_value: Option<bool>,
}

impl FlagBuilder {
	pub fn new(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			description: None,
			origin: None,
			default_value: None,
			options: None,
			decide: None,
			identify: None,
			adapter: None,
			report_value: None,
		}
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn origin(mut self, origin: impl Into<Origin>) -> Self {
		self.origin = Some(origin.into());
		self
	}

	pub fn default_value(mut self, value: impl Into<Value>) -> Self {
		self.default_value = Some(value.into());
		self
	}

	pub fn options<I, O>(mut self, options: I) -> Self
	where
		I: IntoIterator<Item = O>,
		O: Into<FlagOption>,
	{
		self.options = Some(options.into_iter().map(Into::into).collect());
		self
	}

	pub fn decide(mut self, decide: impl Decide) -> Self {
		self.decide = Some(Arc::new(decide));
		self
	}

	pub fn shared_decide(mut self, decide: Arc<dyn Decide>) -> Self {
		self.decide = Some(decide);
		self
	}

	pub fn identify(mut self, identify: impl Identify) -> Self {
		self.identify = Some(Arc::new(identify));
		self
	}

	/// Uses an identify function shared with other flags, so entities are
	/// computed once per request for all of them.
	pub fn shared_identify(mut self, identify: Arc<dyn Identify>) -> Self {
		self.identify = Some(identify);
		self
	}

	pub fn adapter(mut self, adapter: Adapter) -> Self {
		self.adapter = Some(adapter);
		self
	}

	pub fn report_value(mut self, report: bool) -> Self {
		self.report_value = Some(report);
		self
	}

	pub fn build(self) -> Result<Flag> {
		if self.key.trim().is_empty() {
			return Err(FlagsError::InvalidFlagKey(self.key));
		}

		let adapter = self.adapter.as_ref();
		let decide = self
			.decide
			.or_else(|| adapter.and_then(|a| a.decide().cloned()))
			.ok_or_else(|| FlagsError::MissingDecide {
				key: self.key.clone(),
			})?;
		let identify = self
			.identify
			.or_else(|| adapter.and_then(|a| a.identify().cloned()));
		let origin = self
			.origin
			.or_else(|| adapter.and_then(|a| a.origin().cloned()));
		let report_value = self
			.report_value
			.unwrap_or_else(|| adapter.map_or(true, Adapter::reports_value));

		Ok(Flag {
			inner: Arc::new(FlagInner {
				key: self.key,
				description: self.description,
				origin,
				default_value: self.default_value,
				options: self.options,
				decide,
				identify,
				report_value,
				stringified_options: OnceCell::new(),
			}),
		})
	}
}
