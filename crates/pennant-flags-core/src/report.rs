// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reporting of decided flag values.
//!
//! Every value the engine settles on for a flag (overridden, decided or
//! defaulted) is passed to a [`ValueReporter`] once per request, unless the
//! flag or its adapter opted out. Reporters are a side channel: a failing
//! reporter is logged and never changes the value returned to the caller.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use pennant_flags_core::{ReportError, ValueReport, ValueReporter};
//!
//! struct StdoutReporter;
//!
//! #[async_trait]
//! impl ValueReporter for StdoutReporter {
//! 	async fn report_value(&self, report: ValueReport) -> Result<(), ReportError> {
//! 		println!("{} = {}", report.flag_key, report.value);
//! 		Ok(())
//! 	}
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Why a flag ended up with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
	/// Taken from the encrypted overrides cookie.
	Override,
	/// Returned by the flag's decide function.
	Decide,
	/// Fell back to the declared default value.
	Default,
}

impl fmt::Display for ReportReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReportReason::Override => write!(f, "override"),
			ReportReason::Decide => write!(f, "decide"),
			ReportReason::Default => write!(f, "default"),
		}
	}
}

/// A value settled on for one flag in one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueReport {
	pub flag_key: String,
	pub value: Value,
	pub reason: ReportReason,
	pub timestamp: DateTime<Utc>,
}

impl ValueReport {
	pub fn new(flag_key: impl Into<String>, value: Value, reason: ReportReason) -> Self {
		Self {
			flag_key: flag_key.into(),
			value,
			reason,
			timestamp: Utc::now(),
		}
	}

	/// Converts this report to event properties for analytics pipelines.
	pub fn to_event_properties(&self) -> Value {
		serde_json::json!({
			"$feature_flag": self.flag_key,
			"$feature_flag_response": self.value,
			"$feature_flag_reason": self.reason,
		})
	}
}

pub type ReportError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every decided flag value.
///
/// Called on the evaluation path, so implementations should queue work
/// rather than perform slow I/O inline.
#[async_trait]
pub trait ValueReporter: Send + Sync + 'static {
	async fn report_value(&self, report: ValueReport) -> Result<(), ReportError>;
}

pub type SharedReporter = Arc<dyn ValueReporter>;

/// Discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

#[async_trait]
impl ValueReporter for NoOpReporter {
	async fn report_value(&self, _report: ValueReport) -> Result<(), ReportError> {
		Ok(())
	}
}

/// Emits each report as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

#[async_trait]
impl ValueReporter for TracingReporter {
	async fn report_value(&self, report: ValueReport) -> Result<(), ReportError> {
		info!(
			flag_key = %report.flag_key,
			value = %report.value,
			reason = %report.reason,
			"flag value decided"
		);
		Ok(())
	}
}
