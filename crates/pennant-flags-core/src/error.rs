// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use pennant_crypto::CryptoError;
use pennant_dedupe::DedupeError;
use thiserror::Error;

/// Framework control-flow signals raised from inside a decide function.
///
/// These are never swallowed by default-value fallback: the host framework
/// relies on seeing them to redirect, render a 404 or opt a route into
/// dynamic rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlSignal {
	#[error("redirect to {location}")]
	Redirect { location: String, permanent: bool },

	#[error("not found")]
	NotFound,

	#[error("dynamic server usage: {0}")]
	DynamicUsage(String),
}

/// Failure reported by a [`Decide`](crate::Decide) or
/// [`Identify`](crate::Identify) implementation.
#[derive(Debug, Clone, Error)]
pub enum DecideError {
	#[error(transparent)]
	Failed(Arc<dyn std::error::Error + Send + Sync>),

	#[error("{0}")]
	Message(String),

	#[error("panicked: {0}")]
	Panicked(String),

	#[error(transparent)]
	Control(ControlSignal),
}

impl DecideError {
	/// Wraps an arbitrary error.
	pub fn new<E>(error: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		DecideError::Failed(Arc::new(error))
	}

	pub fn msg(message: impl Into<String>) -> Self {
		DecideError::Message(message.into())
	}

	pub fn control_signal(&self) -> Option<&ControlSignal> {
		match self {
			DecideError::Control(signal) => Some(signal),
			_ => None,
		}
	}

	pub fn is_control_flow(&self) -> bool {
		self.control_signal().is_some()
	}
}

impl From<ControlSignal> for DecideError {
	fn from(signal: ControlSignal) -> Self {
		DecideError::Control(signal)
	}
}

/// Errors from encoding or decoding precomputed codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrecomputeError {
	#[error("missing value for flag {key}")]
	MissingValue { key: String },

	#[error("flag {key} has {count} options, at most {limit} can be precomputed")]
	TooManyOptions {
		key: String,
		count: usize,
		limit: usize,
	},

	#[error("precomputed code was produced for a different flag group")]
	FlagGroupMismatch,

	#[error("flag {key} is not part of the precomputed group")]
	FlagNotInGroup { key: String },

	#[error("corrupt precomputed code: {0}")]
	Corrupt(&'static str),

	#[error("invalid precomputed code: {0}")]
	InvalidCode(#[source] CryptoError),
}

/// Errors surfaced by flag declaration and evaluation.
#[derive(Debug, Clone, Error)]
pub enum FlagsError {
	#[error("invalid flag key: {0:?}")]
	InvalidFlagKey(String),

	#[error("flag {key} has no decide function and its adapter provides none")]
	MissingDecide { key: String },

	#[error("flag {key} must have a default value or a decide function that returns a value")]
	NoValue { key: String },

	/// A decide error propagated unchanged because no default was declared.
	#[error("{source}")]
	Decide { key: String, source: DecideError },

	#[error("identify failed: {0}")]
	Identify(#[source] DecideError),

	#[error(transparent)]
	ControlFlow(ControlSignal),

	#[error("flags secret is not configured")]
	MissingSecret,

	#[error("invalid access proof")]
	AccessDenied,

	#[error(transparent)]
	Precompute(#[from] PrecomputeError),

	#[error(transparent)]
	Crypto(#[from] CryptoError),

	#[error(transparent)]
	Dedupe(#[from] DedupeError),

	#[error("serialization error: {0}")]
	Serialization(String),
}

impl FlagsError {
	/// Returns the control-flow signal carried by this error, if any.
	pub fn control_signal(&self) -> Option<&ControlSignal> {
		match self {
			FlagsError::ControlFlow(signal) => Some(signal),
			FlagsError::Decide { source, .. } | FlagsError::Identify(source) => {
				source.control_signal()
			}
			_ => None,
		}
	}
}

impl From<serde_json::Error> for FlagsError {
	fn from(err: serde_json::Error) -> Self {
		FlagsError::Serialization(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, FlagsError>;
