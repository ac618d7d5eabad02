// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag definitions served to flag tooling by discovery endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::Origin;
use crate::flag::{Flag, FlagOption};

/// Metadata describing one flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin: Option<Origin>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub options: Option<Vec<FlagOption>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_value: Option<Value>,
	/// Set for flags that exist in application code, as opposed to flags only
	/// known to a provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub declared_in_code: Option<bool>,
}

impl FlagDefinition {
	/// Fills every field set in `other`, keeping existing values otherwise.
	fn merge(&mut self, other: FlagDefinition) {
		if other.description.is_some() {
			self.description = other.description;
		}
		if other.origin.is_some() {
			self.origin = other.origin;
		}
		if other.options.is_some() {
			self.options = other.options;
		}
		if other.default_value.is_some() {
			self.default_value = other.default_value;
		}
		if other.declared_in_code.is_some() {
			self.declared_in_code = other.declared_in_code;
		}
	}
}

/// A message shown by flag tooling, e.g. when a provider could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHint {
	pub key: String,
	pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderData {
	pub definitions: BTreeMap<String, FlagDefinition>,
	#[serde(default)]
	pub hints: Vec<ProviderHint>,
}

/// Builds definitions for flags declared in code.
pub fn get_provider_data<'a>(flags: impl IntoIterator<Item = &'a Flag>) -> ProviderData {
	let definitions = flags
		.into_iter()
		.map(|flag| {
			(
				flag.key().to_string(),
				FlagDefinition {
					description: flag.description().map(str::to_string),
					origin: flag.origin().cloned(),
					options: flag.options().map(<[FlagOption]>::to_vec),
					default_value: flag.default_value().cloned(),
					declared_in_code: Some(true),
				},
			)
		})
		.collect();

	ProviderData {
		definitions,
		hints: Vec::new(),
	}
}

/// Merges provider data from several sources.
///
/// Definitions for the same key are merged field by field, later sources
/// winning; hints are concatenated in order.
pub fn merge_provider_data(items: impl IntoIterator<Item = ProviderData>) -> ProviderData {
	let mut merged = ProviderData::default();
	for item in items {
		for (key, definition) in item.definitions {
			merged.definitions.entry(key).or_default().merge(definition);
		}
		merged.hints.extend(item.hints);
	}
	merged
}
