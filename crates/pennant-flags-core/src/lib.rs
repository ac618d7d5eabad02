// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Pennant feature flags.
//!
//! A flag is a declaration: a key, an optional default value, an optional list
//! of options, and a [`Decide`] function that computes the value for a request.
//! This crate holds the declarations and the collaborator interfaces that
//! provider adapters implement; evaluation lives in `pennant-flags`.
//!
//! # Overview
//!
//! - [`Flag`] / [`FlagBuilder`]: immutable flag declarations
//! - [`Decide`] / [`Identify`]: the two interfaces adapters implement
//! - [`Adapter`]: bundles a default decide, identify and origin
//! - [`RequestContext`]: read-only headers and cookies of one request
//! - [`ValueReporter`]: side channel notified of every decided value
//! - [`ProviderData`]: flag definitions for discovery endpoints
//!
//! # Example
//!
//! ```
//! use pennant_flags_core::{DecideError, DecideParams, Flag, FlagOption};
//! use serde_json::json;
//!
//! let theme = Flag::builder("theme")
//! 	.description("Colour scheme for the storefront")
//! 	.default_value(json!("light"))
//! 	.options([FlagOption::new(json!("light")), FlagOption::new(json!("dark"))])
//! 	.decide(|_params: DecideParams| async { Ok::<_, DecideError>(Some(json!("dark"))) })
//! 	.build()
//! 	.unwrap();
//!
//! assert_eq!(theme.key(), "theme");
//! assert_eq!(theme.option_index(&json!("dark")), Some(1));
//! ```

pub mod adapter;
pub mod context;
pub mod decide;
pub mod error;
pub mod flag;
pub mod provider_data;
pub mod report;

pub use adapter::{Adapter, Origin};
pub use context::{RequestContext, RequestCookies, RequestView};
pub use decide::{Decide, DecideParams, Identify, IdentifyParams, IdentifySource};
pub use error::{ControlSignal, DecideError, FlagsError, PrecomputeError, Result};
pub use flag::{Flag, FlagBuilder, FlagOption};
pub use provider_data::{
	get_provider_data, merge_provider_data, FlagDefinition, ProviderData, ProviderHint,
};
pub use report::{
	NoOpReporter, ReportError, ReportReason, SharedReporter, TracingReporter, ValueReport,
	ValueReporter,
};

/// A flag value: any JSON-compatible value.
pub type FlagValue = serde_json::Value;
