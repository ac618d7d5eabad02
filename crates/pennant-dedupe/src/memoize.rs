// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::trace;

use crate::args::MemoArgs;
use crate::error::DedupeError;
use crate::node::{CacheNode, SharedResult, Slot, Status};
use crate::registry::{MemoId, MemoizationRegistry, RequestScope, ScopeId, ScopedStore};

type MemoFn<A, T, E> = dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync;

struct RequestStore<T, E> {
	roots: Mutex<HashMap<ScopeId, CacheNode<T, E>>>,
}

impl<T, E> ScopedStore for RequestStore<T, E>
where
	T: Send + Sync,
	E: Send + Sync,
{
	fn evict(&self, scope: ScopeId) -> bool {
		// Bind first so the lock is released before the trie is dropped.
		let removed = self.roots.lock().remove(&scope);
		removed.is_some()
	}

	fn scope_count(&self) -> usize {
		self.roots.lock().len()
	}
}

enum Lookup<T, E> {
	Ready(Result<T, E>),
	Waiting {
		future: SharedResult<T, E>,
		slot: Slot<T, E>,
	},
}

/// A function deduplicated per request scope and argument list.
///
/// For one [`RequestScope`] and an argument list that is value-equal
/// (primitives) or identity-equal (`Arc` objects), the wrapped function runs
/// exactly once, including while its first invocation is still in flight.
/// Successes and failures are both replayed to later callers.
///
/// Object arguments are compared by identity, so mutating an object behind an
/// `Arc` after the first call does not invalidate the cached entry.
pub struct Memoized<A, T, E> {
	id: MemoId,
	registry: Arc<MemoizationRegistry>,
	store: Arc<RequestStore<T, E>>,
	func: Arc<MemoFn<A, T, E>>,
	_args: PhantomData<fn(A)>,
}

impl<A, T, E> Memoized<A, T, E>
where
	A: MemoArgs + Send + 'static,
	T: Clone + Send + Sync + 'static,
	E: Clone + From<DedupeError> + Send + Sync + 'static,
{
	/// Wraps `func` and registers its cache with `registry`.
	pub fn new<F, Fut>(registry: &Arc<MemoizationRegistry>, func: F) -> Self
	where
		F: Fn(A) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<T, E>> + Send + 'static,
	{
		let store = Arc::new(RequestStore {
			roots: Mutex::new(HashMap::new()),
		});
		let dyn_store: Arc<dyn ScopedStore> = Arc::clone(&store) as Arc<dyn ScopedStore>;
		let id = registry.register(Arc::downgrade(&dyn_store));

		Self {
			id,
			registry: Arc::clone(registry),
			store,
			func: Arc::new(move |args| func(args).boxed()),
			_args: PhantomData,
		}
	}

	pub fn id(&self) -> MemoId {
		self.id
	}

	/// Calls the function, or joins / replays the call already made for these
	/// arguments within `scope`.
	///
	/// The cache is consulted and, on a miss, populated with the in-flight
	/// future before this method returns, so concurrent callers that have not
	/// yet been polled still coalesce onto the first invocation.
	pub fn call(&self, scope: &RequestScope, args: A) -> impl Future<Output = Result<T, E>> + Send {
		let lookup = if scope.belongs_to(&self.registry) {
			self.lookup(scope, args)
		} else {
			Lookup::Ready(Err(E::from(DedupeError::ForeignScope { scope: scope.id() })))
		};

		async move {
			match lookup {
				Lookup::Ready(result) => result,
				Lookup::Waiting { future, slot } => {
					let result = future.await;
					settle(&slot, &result);
					result
				}
			}
		}
	}

	/// Forgets everything this function cached for `scope`.
	pub fn clear(&self, scope: &RequestScope) -> Result<bool, DedupeError> {
		self.registry.clear(self.id, scope)
	}

	/// Number of scopes this function currently holds entries for.
	pub fn scope_count(&self) -> usize {
		self.store.scope_count()
	}

	fn lookup(&self, scope: &RequestScope, args: A) -> Lookup<T, E> {
		let slot = {
			let mut roots = self.store.roots.lock();
			roots
				.entry(scope.id())
				.or_insert_with(CacheNode::new)
				.descend(args.memo_keys())
		};

		let mut status = slot.lock();
		match &*status {
			Status::Resolved(value) => return Lookup::Ready(Ok(value.clone())),
			Status::Errored(error) => return Lookup::Ready(Err(error.clone())),
			Status::Pending(future) => {
				trace!(memo = %self.id, scope = %scope.id(), "joining in-flight call");
				return Lookup::Waiting {
					future: future.clone(),
					slot: Arc::clone(&slot),
				};
			}
			Status::Empty => {}
		}

		trace!(memo = %self.id, scope = %scope.id(), "invoking memoized function");
		let future = (self.func)(args).shared();
		*status = Status::Pending(future.clone());
		drop(status);

		Lookup::Waiting { future, slot }
	}
}

fn settle<T: Clone, E: Clone>(slot: &Slot<T, E>, result: &Result<T, E>) {
	let mut status = slot.lock();
	if matches!(*status, Status::Pending(_)) {
		*status = match result {
			Ok(value) => Status::Resolved(value.clone()),
			Err(error) => Status::Errored(error.clone()),
		};
	}
}

impl<A, T, E> Clone for Memoized<A, T, E> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			registry: Arc::clone(&self.registry),
			store: Arc::clone(&self.store),
			func: Arc::clone(&self.func),
			_args: PhantomData,
		}
	}
}

impl<A, T, E> fmt::Debug for Memoized<A, T, E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Memoized").field("id", &self.id).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use proptest::prelude::*;
	use tokio::sync::Notify;

	#[derive(Debug, Clone, PartialEq)]
	enum TestError {
		Boom(String),
		Dedupe(DedupeError),
	}

	impl From<DedupeError> for TestError {
		fn from(err: DedupeError) -> Self {
			TestError::Dedupe(err)
		}
	}

	fn counting<A>(
		registry: &Arc<MemoizationRegistry>,
	) -> (Memoized<A, usize, TestError>, Arc<AtomicUsize>)
	where
		A: MemoArgs + Send + 'static,
	{
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);
		let memo = Memoized::new(registry, move |_args: A| {
			let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
			async move { Ok(n) }
		});
		(memo, calls)
	}

	#[tokio::test]
	async fn runs_once_per_scope() {
		let registry = MemoizationRegistry::new();
		let (memo, calls) = counting::<(String, u32)>(&registry);
		let scope = registry.open_scope();

		for _ in 0..5 {
			assert_eq!(memo.call(&scope, ("user".to_string(), 1)).await, Ok(1));
		}
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn new_scope_runs_again() {
		let registry = MemoizationRegistry::new();
		let (memo, calls) = counting::<(u32,)>(&registry);

		let first = registry.open_scope();
		let second = registry.open_scope();
		memo.call(&first, (1,)).await.unwrap();
		memo.call(&second, (1,)).await.unwrap();

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn different_arguments_run_separately() {
		let registry = MemoizationRegistry::new();
		let (memo, calls) = counting::<(u32, bool)>(&registry);
		let scope = registry.open_scope();

		memo.call(&scope, (1, true)).await.unwrap();
		memo.call(&scope, (1, false)).await.unwrap();
		memo.call(&scope, (2, true)).await.unwrap();
		memo.call(&scope, (1, true)).await.unwrap();

		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn object_arguments_compare_by_identity() {
		let registry = MemoizationRegistry::new();
		let (memo, calls) = counting::<(Arc<Mutex<Vec<u8>>>,)>(&registry);
		let scope = registry.open_scope();

		let shared = Arc::new(Mutex::new(vec![1]));
		let lookalike = Arc::new(Mutex::new(vec![1]));

		memo.call(&scope, (Arc::clone(&shared),)).await.unwrap();
		shared.lock().push(2);
		memo.call(&scope, (Arc::clone(&shared),)).await.unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 1);

		memo.call(&scope, (lookalike,)).await.unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn concurrent_callers_share_in_flight_call() {
		let registry = MemoizationRegistry::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let gate = Arc::new(Notify::new());

		let counter = Arc::clone(&calls);
		let release = Arc::clone(&gate);
		let memo = Memoized::new(&registry, move |(key,): (String,)| {
			counter.fetch_add(1, Ordering::SeqCst);
			let release = Arc::clone(&release);
			async move {
				release.notified().await;
				Ok::<_, TestError>(format!("value-for-{key}"))
			}
		});

		let scope = registry.open_scope();
		let first = memo.call(&scope, ("k".to_string(),));
		let second = memo.call(&scope, ("k".to_string(),));
		let third = memo.call(&scope, ("k".to_string(),));

		let opener = async {
			tokio::time::sleep(Duration::from_millis(10)).await;
			gate.notify_one();
		};
		let (a, b, c, ()) = tokio::join!(first, second, third, opener);

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(a, Ok("value-for-k".to_string()));
		assert_eq!(a, b);
		assert_eq!(b, c);
	}

	#[tokio::test]
	async fn errors_are_replayed() {
		let registry = MemoizationRegistry::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);
		let memo = Memoized::new(&registry, move |(): ()| {
			counter.fetch_add(1, Ordering::SeqCst);
			async { Err::<u8, _>(TestError::Boom("provider down".to_string())) }
		});

		let scope = registry.open_scope();
		for _ in 0..3 {
			assert_eq!(
				memo.call(&scope, ()).await,
				Err(TestError::Boom("provider down".to_string()))
			);
		}
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn clear_forces_rerun() {
		let registry = MemoizationRegistry::new();
		let (memo, calls) = counting::<(u8,)>(&registry);
		let scope = registry.open_scope();

		assert_eq!(memo.call(&scope, (1,)).await, Ok(1));
		assert_eq!(memo.clear(&scope), Ok(true));
		assert_eq!(memo.call(&scope, (1,)).await, Ok(2));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn clear_through_registry() {
		let registry = MemoizationRegistry::new();
		let (memo, calls) = counting::<(u8,)>(&registry);
		let scope = registry.open_scope();

		memo.call(&scope, (1,)).await.unwrap();
		assert_eq!(registry.clear(memo.id(), &scope), Ok(true));
		memo.call(&scope, (1,)).await.unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn foreign_scope_is_rejected() {
		let registry = MemoizationRegistry::new();
		let other = MemoizationRegistry::new();
		let (memo, calls) = counting::<(u8,)>(&registry);
		let scope = other.open_scope();

		let result = memo.call(&scope, (1,)).await;
		assert_eq!(
			result,
			Err(TestError::Dedupe(DedupeError::ForeignScope { scope: scope.id() }))
		);
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert!(memo.clear(&scope).is_err());
	}

	#[tokio::test]
	async fn closing_scope_releases_entries() {
		let registry = MemoizationRegistry::new();
		let (memo, _calls) = counting::<(u8,)>(&registry);

		let scope = registry.open_scope();
		memo.call(&scope, (1,)).await.unwrap();
		assert_eq!(memo.scope_count(), 1);

		drop(scope);
		assert_eq!(memo.scope_count(), 0);
	}

	#[tokio::test]
	async fn dropping_memoized_unregisters_store() {
		let registry = MemoizationRegistry::new();
		let (memo, _calls) = counting::<(u8,)>(&registry);
		let id = memo.id();
		let scope = registry.open_scope();
		assert_eq!(registry.store_count(), 1);

		drop(memo);
		assert_eq!(
			registry.clear(id, &scope),
			Err(DedupeError::UnknownFunction(id))
		);
	}

	proptest! {
		#[test]
		fn prop_exactly_once_per_scope(n in 1usize..20, key in "[a-z]{1,8}", num in any::<i64>()) {
			let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
			runtime.block_on(async {
				let registry = MemoizationRegistry::new();
				let (memo, calls) = counting::<(String, i64)>(&registry);
				let scope = registry.open_scope();

				for _ in 0..n {
					memo.call(&scope, (key.clone(), num)).await.unwrap();
				}
				prop_assert_eq!(calls.load(Ordering::SeqCst), 1);

				let next = registry.open_scope();
				memo.call(&next, (key.clone(), num)).await.unwrap();
				prop_assert_eq!(calls.load(Ordering::SeqCst), 2);
				Ok::<(), TestCaseError>(())
			})?;
		}
	}
}
