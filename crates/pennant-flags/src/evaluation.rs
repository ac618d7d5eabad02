// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-request evaluation cache and the decide pipeline.
//!
//! Entries are keyed by scope, flag key and the JSON text of the entities, so
//! a flag evaluated any number of times with the same entities in one request
//! reaches its decide function at most once. The in-flight evaluation is
//! stored before it is first polled, and concurrent callers join it.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use pennant_dedupe::{ScopeId, ScopedStore};
use pennant_flags_core::{
	Decide, DecideError, DecideParams, Flag, FlagsError, ReportReason, RequestView,
	SharedReporter, ValueReport,
};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::overrides::OverrideSet;

pub(crate) type SharedEvaluation = Shared<BoxFuture<'static, Result<Value, FlagsError>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct EvaluationKey {
	pub flag_key: String,
	pub entities_key: String,
}

impl EvaluationKey {
	pub fn new(flag_key: &str, entities: Option<&Value>) -> Self {
		Self {
			flag_key: flag_key.to_string(),
			entities_key: entities.map(Value::to_string).unwrap_or_default(),
		}
	}
}

#[derive(Default)]
pub(crate) struct EvaluationCache {
	scopes: Mutex<HashMap<ScopeId, HashMap<EvaluationKey, SharedEvaluation>>>,
}

impl EvaluationCache {
	pub fn get(&self, scope: ScopeId, key: &EvaluationKey) -> Option<SharedEvaluation> {
		self.scopes.lock().get(&scope)?.get(key).cloned()
	}

	/// Stores `evaluation` unless another caller got there first, returning
	/// whichever entry is now cached.
	pub fn insert(
		&self,
		scope: ScopeId,
		key: EvaluationKey,
		evaluation: SharedEvaluation,
	) -> SharedEvaluation {
		self.scopes
			.lock()
			.entry(scope)
			.or_default()
			.entry(key)
			.or_insert(evaluation)
			.clone()
	}

	pub fn len(&self, scope: ScopeId) -> usize {
		self.scopes.lock().get(&scope).map_or(0, HashMap::len)
	}
}

impl ScopedStore for EvaluationCache {
	fn evict(&self, scope: ScopeId) -> bool {
		let removed = self.scopes.lock().remove(&scope);
		removed.is_some()
	}

	fn scope_count(&self) -> usize {
		self.scopes.lock().len()
	}
}

/// Everything one evaluation needs, owned so the future can be cached.
pub(crate) struct Evaluation {
	pub flag: Flag,
	pub view: RequestView,
	pub entities: Option<Value>,
	pub overrides: BoxFuture<'static, Option<Arc<OverrideSet>>>,
	pub reporter: SharedReporter,
}

impl Evaluation {
	/// Override, else decide with fallback, then report.
	pub async fn run(self) -> Result<Value, FlagsError> {
		let Evaluation {
			flag,
			view,
			entities,
			overrides,
			reporter,
		} = self;

		if let Some(value) = overrides
			.await
			.and_then(|overrides| overrides.get(flag.key()).cloned())
		{
			debug!(flag_key = %flag.key(), "using overridden value");
			report(&reporter, &flag, &value, ReportReason::Override);
			return Ok(value);
		}

		let params = DecideParams {
			key: flag.key().to_string(),
			headers: Arc::clone(view.headers()),
			cookies: Arc::clone(view.cookies()),
			entities,
			default_value: flag.default_value().cloned(),
		};
		let decide = Arc::clone(flag.decide_fn());
		let decided = AssertUnwindSafe(async move { decide.decide(params).await })
			.catch_unwind()
			.await
			.unwrap_or_else(|panic| Err(DecideError::Panicked(panic_message(panic.as_ref()))));

		let (value, reason) = settle(&flag, decided)?;
		report(&reporter, &flag, &value, reason);
		Ok(value)
	}
}

/// Applies default-value fallback to a decide outcome.
fn settle(
	flag: &Flag,
	decided: Result<Option<Value>, DecideError>,
) -> Result<(Value, ReportReason), FlagsError> {
	match decided {
		Ok(Some(value)) => Ok((value, ReportReason::Decide)),
		Ok(None) => flag
			.default_value()
			.cloned()
			.map(|value| (value, ReportReason::Default))
			.ok_or_else(|| FlagsError::NoValue {
				key: flag.key().to_string(),
			}),
		Err(DecideError::Control(signal)) => Err(FlagsError::ControlFlow(signal)),
		Err(error) => match flag.default_value() {
			Some(default) => {
				warn!(
					flag_key = %flag.key(),
					error = %error,
					"decide failed, falling back to default value"
				);
				Ok((default.clone(), ReportReason::Default))
			}
			None => Err(FlagsError::Decide {
				key: flag.key().to_string(),
				source: error,
			}),
		},
	}
}

/// Hands the value to the reporter without waiting for it.
///
/// Reports are dispatched onto the current tokio runtime; outside a runtime
/// they are dropped.
pub(crate) fn report(
	reporter: &SharedReporter,
	flag: &Flag,
	value: &Value,
	reason: ReportReason,
) {
	if !flag.reports_value() {
		return;
	}
	let Ok(runtime) = Handle::try_current() else {
		warn!(flag_key = %flag.key(), "no async runtime, value report dropped");
		return;
	};
	let report = ValueReport::new(flag.key(), value.clone(), reason);
	let reporter = Arc::clone(reporter);
	runtime.spawn(async move {
		let flag_key = report.flag_key.clone();
		if let Err(e) = reporter.report_value(report).await {
			warn!(flag_key = %flag_key, error = %e, "value reporter failed");
		}
	});
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}
