// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Registry of request-scoped stores and the request scope handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{DedupeError, Result};

/// Identifier of a memoized function within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoId(u64);

impl fmt::Display for MemoId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "memo#{}", self.0)
	}
}

/// Identifier of a logical request within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl fmt::Display for ScopeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "scope#{}", self.0)
	}
}

/// A cache holding per-scope state, registered so scope closure reaches it.
pub trait ScopedStore: Send + Sync {
	/// Drops everything cached for `scope`. Returns whether anything was held.
	fn evict(&self, scope: ScopeId) -> bool;

	/// Number of scopes currently holding entries.
	fn scope_count(&self) -> usize;
}

/// Owns the bookkeeping for every request-scoped cache created against it.
///
/// Registries are plain values: tests and multi-tenant hosts create as many
/// as they need, and scopes from one registry are rejected by another.
pub struct MemoizationRegistry {
	next_memo: AtomicU64,
	next_scope: AtomicU64,
	stores: Mutex<HashMap<MemoId, Weak<dyn ScopedStore>>>,
}

impl MemoizationRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			next_memo: AtomicU64::new(1),
			next_scope: AtomicU64::new(1),
			stores: Mutex::new(HashMap::new()),
		})
	}

	/// Registers a store. The registry only keeps a weak handle; dropping the
	/// store unregisters it lazily.
	pub fn register(&self, store: Weak<dyn ScopedStore>) -> MemoId {
		let id = MemoId(self.next_memo.fetch_add(1, Ordering::Relaxed));
		self.stores.lock().insert(id, store);
		id
	}

	/// Opens a new logical request.
	pub fn open_scope(self: &Arc<Self>) -> RequestScope {
		let id = ScopeId(self.next_scope.fetch_add(1, Ordering::Relaxed));
		trace!(scope = %id, "opened request scope");
		RequestScope {
			inner: Arc::new(ScopeInner {
				id,
				registry: Arc::clone(self),
			}),
		}
	}

	/// Forgets what the function `id` cached for `scope`, so the next call
	/// within that scope runs the function again.
	pub fn clear(&self, id: MemoId, scope: &RequestScope) -> Result<bool> {
		if !scope.belongs_to(self) {
			return Err(DedupeError::ForeignScope { scope: scope.id() });
		}

		let store = self
			.stores
			.lock()
			.get(&id)
			.and_then(Weak::upgrade)
			.ok_or(DedupeError::UnknownFunction(id))?;

		Ok(store.evict(scope.id()))
	}

	/// Number of live registered stores.
	pub fn store_count(&self) -> usize {
		self
			.stores
			.lock()
			.values()
			.filter(|store| store.strong_count() > 0)
			.count()
	}

	fn close_scope(&self, scope: ScopeId) {
		let live: Vec<Arc<dyn ScopedStore>> = {
			let mut stores = self.stores.lock();
			stores.retain(|_, store| store.strong_count() > 0);
			stores.values().filter_map(Weak::upgrade).collect()
		};

		let evicted = live.iter().filter(|store| store.evict(scope)).count();
		trace!(scope = %scope, evicted, "closed request scope");
	}
}

impl fmt::Debug for MemoizationRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoizationRegistry")
			.field("stores", &self.store_count())
			.finish()
	}
}

struct ScopeInner {
	id: ScopeId,
	registry: Arc<MemoizationRegistry>,
}

impl Drop for ScopeInner {
	fn drop(&mut self) {
		self.registry.close_scope(self.id);
	}
}

/// Handle identifying one logical request.
///
/// Clones share the scope. Dropping the last clone closes it and evicts its
/// entries from every store in the registry.
#[derive(Clone)]
pub struct RequestScope {
	inner: Arc<ScopeInner>,
}

impl RequestScope {
	pub fn id(&self) -> ScopeId {
		self.inner.id
	}

	pub fn registry(&self) -> &Arc<MemoizationRegistry> {
		&self.inner.registry
	}

	/// A handle that does not keep the scope open.
	///
	/// Futures parked inside a cache should hold this instead of a
	/// [`RequestScope`], otherwise the scope could never close.
	pub fn downgrade(&self) -> WeakRequestScope {
		WeakRequestScope {
			id: self.inner.id,
			inner: Arc::downgrade(&self.inner),
		}
	}

	pub(crate) fn belongs_to(&self, registry: &MemoizationRegistry) -> bool {
		std::ptr::eq(Arc::as_ptr(&self.inner.registry), registry)
	}
}

impl fmt::Debug for RequestScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("RequestScope").field(&self.inner.id).finish()
	}
}

/// Non-owning counterpart of [`RequestScope`].
#[derive(Clone)]
pub struct WeakRequestScope {
	id: ScopeId,
	inner: Weak<ScopeInner>,
}

impl WeakRequestScope {
	pub fn id(&self) -> ScopeId {
		self.id
	}

	/// Returns the scope if it is still open.
	pub fn upgrade(&self) -> Option<RequestScope> {
		self.inner.upgrade().map(|inner| RequestScope { inner })
	}
}

impl fmt::Debug for WeakRequestScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("WeakRequestScope").field(&self.id).finish()
	}
}
