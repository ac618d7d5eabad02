// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turning argument lists into trie keys.

use std::fmt;
use std::sync::{Arc, Weak};

/// Value-compared argument key.
///
/// Floats are keyed by their bit pattern: `NaN` equals itself and `-0.0` is
/// distinct from `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimitiveKey {
	/// `None` arguments.
	Absent,
	Unit,
	Bool(bool),
	Int(i128),
	Float(u64),
	Char(char),
	Str(String),
}

pub(crate) trait Liveness: Send + Sync {
	fn is_alive(&self) -> bool;
}

impl<T: ?Sized + Send + Sync> Liveness for Weak<T> {
	fn is_alive(&self) -> bool {
		self.strong_count() > 0
	}
}

/// Identity of a shared object argument.
///
/// Holds a weak handle to the allocation, so the address cannot be reused by
/// another object while the key (or a trie edge built from it) exists.
pub struct ObjectKey {
	addr: usize,
	probe: Arc<dyn Liveness>,
}

impl ObjectKey {
	pub(crate) fn into_parts(self) -> (usize, Arc<dyn Liveness>) {
		(self.addr, self.probe)
	}
}

impl fmt::Debug for ObjectKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ObjectKey")
			.field("addr", &format_args!("{:#x}", self.addr))
			.field("alive", &self.probe.is_alive())
			.finish()
	}
}

/// One step in the argument trie.
#[derive(Debug)]
pub enum ArgKey {
	Primitive(PrimitiveKey),
	Object(ObjectKey),
}

impl ArgKey {
	/// Key an argument by the identity of its shared allocation.
	pub fn object<T>(value: &Arc<T>) -> Self
	where
		T: ?Sized + Send + Sync + 'static,
	{
		ArgKey::Object(ObjectKey {
			addr: Arc::as_ptr(value) as *const () as usize,
			probe: Arc::new(Arc::downgrade(value)),
		})
	}

	pub fn primitive(key: PrimitiveKey) -> Self {
		ArgKey::Primitive(key)
	}
}

/// A single memoizable argument.
pub trait MemoArg {
	fn memo_key(&self) -> ArgKey;
}

macro_rules! int_memo_arg {
	($($ty:ty),*) => {
		$(
			impl MemoArg for $ty {
				fn memo_key(&self) -> ArgKey {
					ArgKey::Primitive(PrimitiveKey::Int(*self as i128))
				}
			}
		)*
	};
}

int_memo_arg!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl MemoArg for f64 {
	fn memo_key(&self) -> ArgKey {
		ArgKey::Primitive(PrimitiveKey::Float(self.to_bits()))
	}
}

impl MemoArg for f32 {
	fn memo_key(&self) -> ArgKey {
		f64::from(*self).memo_key()
	}
}

impl MemoArg for bool {
	fn memo_key(&self) -> ArgKey {
		ArgKey::Primitive(PrimitiveKey::Bool(*self))
	}
}

impl MemoArg for char {
	fn memo_key(&self) -> ArgKey {
		ArgKey::Primitive(PrimitiveKey::Char(*self))
	}
}

impl MemoArg for () {
	fn memo_key(&self) -> ArgKey {
		ArgKey::Primitive(PrimitiveKey::Unit)
	}
}

impl MemoArg for str {
	fn memo_key(&self) -> ArgKey {
		ArgKey::Primitive(PrimitiveKey::Str(self.to_owned()))
	}
}

impl MemoArg for String {
	fn memo_key(&self) -> ArgKey {
		self.as_str().memo_key()
	}
}

impl<T: MemoArg> MemoArg for Option<T> {
	fn memo_key(&self) -> ArgKey {
		match self {
			Some(value) => value.memo_key(),
			None => ArgKey::Primitive(PrimitiveKey::Absent),
		}
	}
}

impl<T: MemoArg + ?Sized> MemoArg for &T {
	fn memo_key(&self) -> ArgKey {
		(**self).memo_key()
	}
}

impl<T> MemoArg for Arc<T>
where
	T: ?Sized + Send + Sync + 'static,
{
	fn memo_key(&self) -> ArgKey {
		ArgKey::object(self)
	}
}

/// A full argument list, walked left to right.
pub trait MemoArgs {
	fn memo_keys(&self) -> Vec<ArgKey>;
}

impl MemoArgs for () {
	fn memo_keys(&self) -> Vec<ArgKey> {
		Vec::new()
	}
}

macro_rules! tuple_memo_args {
	($($name:ident),+) => {
		impl<$($name: MemoArg),+> MemoArgs for ($($name,)+) {
			#[allow(non_snake_case)]
			fn memo_keys(&self) -> Vec<ArgKey> {
				let ($($name,)+) = self;
				vec![$($name.memo_key()),+]
			}
		}
	};
}

tuple_memo_args!(A);
tuple_memo_args!(A, B);
tuple_memo_args!(A, B, C);
tuple_memo_args!(A, B, C, D);
tuple_memo_args!(A, B, C, D, E);
tuple_memo_args!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
	use super::*;

	fn primitive(key: ArgKey) -> PrimitiveKey {
		match key {
			ArgKey::Primitive(p) => p,
			ArgKey::Object(_) => panic!("expected primitive key"),
		}
	}

	#[test]
	fn integers_of_different_widths_share_a_key() {
		assert_eq!(primitive(7u8.memo_key()), primitive(7i64.memo_key()));
	}

	#[test]
	fn floats_compare_by_bits() {
		assert_eq!(
			primitive(f64::NAN.memo_key()),
			primitive(f64::NAN.memo_key())
		);
		assert_ne!(primitive((-0.0f64).memo_key()), primitive(0.0f64.memo_key()));
	}

	#[test]
	fn none_is_distinct_from_unit() {
		assert_ne!(
			primitive(Option::<u8>::None.memo_key()),
			primitive(().memo_key())
		);
	}

	#[test]
	fn arc_keys_by_identity() {
		let a = Arc::new(String::from("same"));
		let b = Arc::new(String::from("same"));

		let (addr_a, _) = match a.memo_key() {
			ArgKey::Object(obj) => obj.into_parts(),
			ArgKey::Primitive(_) => panic!("expected object key"),
		};
		let (addr_a2, _) = match Arc::clone(&a).memo_key() {
			ArgKey::Object(obj) => obj.into_parts(),
			ArgKey::Primitive(_) => panic!("expected object key"),
		};
		let (addr_b, _) = match b.memo_key() {
			ArgKey::Object(obj) => obj.into_parts(),
			ArgKey::Primitive(_) => panic!("expected object key"),
		};

		assert_eq!(addr_a, addr_a2);
		assert_ne!(addr_a, addr_b);
	}

	#[test]
	fn object_probe_tracks_liveness() {
		let value = Arc::new(42u32);
		let (_, probe) = match value.memo_key() {
			ArgKey::Object(obj) => obj.into_parts(),
			ArgKey::Primitive(_) => panic!("expected object key"),
		};
		assert!(probe.is_alive());
		drop(value);
		assert!(!probe.is_alive());
	}

	#[test]
	fn tuple_keys_preserve_order() {
		let keys = (1u8, "two", true).memo_keys();
		let keys: Vec<_> = keys.into_iter().map(primitive).collect();
		assert_eq!(
			keys,
			vec![
				PrimitiveKey::Int(1),
				PrimitiveKey::Str("two".to_string()),
				PrimitiveKey::Bool(true),
			]
		);
	}
}
