// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Argument trie backing each memoized function.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::args::{ArgKey, Liveness, PrimitiveKey};

pub(crate) type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Memoized state after consuming a prefix of the arguments.
pub(crate) enum Status<T, E> {
	/// Never invoked for this argument path.
	Empty,
	/// Invoked; every caller awaits the same future until it settles.
	Pending(SharedResult<T, E>),
	Resolved(T),
	Errored(E),
}

pub(crate) type Slot<T, E> = Arc<Mutex<Status<T, E>>>;

struct ObjectEdge<T, E> {
	probe: Arc<dyn Liveness>,
	node: CacheNode<T, E>,
}

pub(crate) struct CacheNode<T, E> {
	slot: Slot<T, E>,
	object_children: HashMap<usize, ObjectEdge<T, E>>,
	primitive_children: HashMap<PrimitiveKey, CacheNode<T, E>>,
}

impl<T, E> CacheNode<T, E> {
	pub(crate) fn new() -> Self {
		Self {
			slot: Arc::new(Mutex::new(Status::Empty)),
			object_children: HashMap::new(),
			primitive_children: HashMap::new(),
		}
	}

	/// Walks `path`, creating nodes as needed, and returns the terminal slot.
	pub(crate) fn descend(&mut self, path: Vec<ArgKey>) -> Slot<T, E> {
		let mut node = self;
		for key in path {
			node = node.child(key);
		}
		Arc::clone(&node.slot)
	}

	fn child(&mut self, key: ArgKey) -> &mut Self {
		match key {
			ArgKey::Primitive(primitive) => self
				.primitive_children
				.entry(primitive)
				.or_insert_with(CacheNode::new),
			ArgKey::Object(object) => {
				let (addr, probe) = object.into_parts();
				if !self.object_children.contains_key(&addr) {
					// Edges whose argument has been dropped can never be hit again.
					self
						.object_children
						.retain(|_, edge| edge.probe.is_alive());
				}
				&mut self
					.object_children
					.entry(addr)
					.or_insert_with(|| ObjectEdge {
						probe,
						node: CacheNode::new(),
					})
					.node
			}
		}
	}

	#[cfg(test)]
	pub(crate) fn node_count(&self) -> usize {
		1 + self
			.primitive_children
			.values()
			.map(CacheNode::node_count)
			.sum::<usize>()
			+ self
				.object_children
				.values()
				.map(|edge| edge.node.node_count())
				.sum::<usize>()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::args::MemoArgs;

	#[test]
	fn same_path_returns_same_slot() {
		let mut root: CacheNode<u8, ()> = CacheNode::new();
		let a = root.descend((1u8, "x").memo_keys());
		let b = root.descend((1u8, "x").memo_keys());
		assert!(Arc::ptr_eq(&a, &b));
		assert_eq!(root.node_count(), 3);
	}

	#[test]
	fn prefix_and_extension_are_distinct() {
		let mut root: CacheNode<u8, ()> = CacheNode::new();
		let short = root.descend((1u8,).memo_keys());
		let long = root.descend((1u8, 2u8).memo_keys());
		assert!(!Arc::ptr_eq(&short, &long));
	}

	#[test]
	fn empty_path_is_the_root() {
		let mut root: CacheNode<u8, ()> = CacheNode::new();
		let slot = root.descend(().memo_keys());
		assert!(Arc::ptr_eq(&slot, &root.slot));
	}

	#[test]
	fn dropped_objects_are_pruned_on_next_insert() {
		let mut root: CacheNode<u8, ()> = CacheNode::new();
		let first = Arc::new(1u32);
		root.descend((Arc::clone(&first),).memo_keys());
		assert_eq!(root.object_children.len(), 1);

		drop(first);
		let second = Arc::new(2u32);
		root.descend((Arc::clone(&second),).memo_keys());
		assert_eq!(root.object_children.len(), 1);
	}
}
