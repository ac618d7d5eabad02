// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::registry::{MemoId, ScopeId};

/// Misuse of the memoization registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DedupeError {
	/// The function was never memoized in this registry, or has been dropped.
	#[error("memoized function {0} is not registered")]
	UnknownFunction(MemoId),

	/// The scope was opened by a different registry than the function's.
	#[error("request scope {scope} belongs to a different memoization registry")]
	ForeignScope { scope: ScopeId },
}

pub type Result<T> = std::result::Result<T, DedupeError>;
