// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request-scoped memoization for Pennant.
//!
//! A [`Memoized`] function runs at most once per [`RequestScope`] for a given
//! argument list. Arguments are compared by value when they are primitives and
//! by identity when they are shared (`Arc`) objects, so lookups never hash or
//! compare object contents.
//!
//! Caches are owned by an explicit [`MemoizationRegistry`] rather than by
//! process globals. Each request opens a scope from the registry; when the last
//! handle to that scope is dropped, every memoized function registered there
//! forgets the scope's entries.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use pennant_dedupe::{DedupeError, MemoizationRegistry, Memoized};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = MemoizationRegistry::new();
//! let calls = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&calls);
//! let lookup = Memoized::new(&registry, move |(user,): (String,)| {
//! 	counter.fetch_add(1, Ordering::SeqCst);
//! 	async move { Ok::<_, DedupeError>(user.len()) }
//! });
//!
//! let scope = registry.open_scope();
//! assert_eq!(lookup.call(&scope, ("ada".to_string(),)).await, Ok(3));
//! assert_eq!(lookup.call(&scope, ("ada".to_string(),)).await, Ok(3));
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! # }
//! ```

mod args;
mod error;
mod memoize;
mod node;
mod registry;

pub use args::{ArgKey, MemoArg, MemoArgs, PrimitiveKey};
pub use error::{DedupeError, Result};
pub use memoize::Memoized;
pub use registry::{
	MemoId, MemoizationRegistry, RequestScope, ScopeId, ScopedStore, WeakRequestScope,
};
