// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Precomputed flag codes.
//!
//! A group of flags evaluated ahead of rendering is encoded into one short,
//! signed, URL-safe string. The signed payload is:
//!
//! ```text
//! fingerprint (4 bytes) | one byte per flag | side list (JSON, brackets stripped)
//! ```
//!
//! Each per-flag byte is the index of the value in the flag's declared options
//! (0 to 251) or a sentinel:
//!
//! | byte | value |
//! |------|-------|
//! | 252 | `null` |
//! | 253 | `false` |
//! | 254 | `true` |
//! | 255 | next entry of the side list |
//!
//! The fingerprint hashes the group's keys and options, so a code decoded
//! against a different group is rejected instead of decoding to wrong values.

use pennant_crypto::{sign, verify, FlagsSecret};
use pennant_flags_core::{Flag, FlagsError, PrecomputeError, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Options beyond this index cannot be addressed by a single byte.
pub const MAX_OPTIONS: usize = 252;

const NULL: u8 = 252;
const FALSE: u8 = 253;
const TRUE: u8 = 254;
const UNLISTED: u8 = 255;

const FINGERPRINT_LEN: usize = 4;

/// Flag values keyed by flag key.
pub type FlagValues = Map<String, Value>;

/// Hash of the group's shape: keys, order and declared options.
pub fn group_fingerprint(flags: &[Flag]) -> [u8; FINGERPRINT_LEN] {
	let mut hasher = Sha256::new();
	for flag in flags {
		hasher.update(flag.key().as_bytes());
		hasher.update(b"\x00");
		match flag.options() {
			None => hasher.update(b"\x00"),
			Some(_) => {
				hasher.update(b"\x01");
				for option in flag.stringified_options() {
					hasher.update(option.as_bytes());
					hasher.update(b"\x1e");
				}
			}
		}
		hasher.update(b"\x1f");
	}

	let digest = hasher.finalize();
	let mut fingerprint = [0u8; FINGERPRINT_LEN];
	fingerprint.copy_from_slice(&digest[..FINGERPRINT_LEN]);
	fingerprint
}

/// Zips an ordered list of evaluated values with their flags.
pub fn combine(flags: &[Flag], values: impl IntoIterator<Item = Value>) -> FlagValues {
	flags
		.iter()
		.map(|flag| flag.key().to_string())
		.zip(values)
		.collect()
}

/// Encodes `values` for the ordered `flags` into a signed code.
///
/// Every flag must have an entry in `values`.
pub fn serialize(flags: &[Flag], values: &FlagValues, secret: &FlagsSecret) -> Result<String> {
	let mut payload = Vec::with_capacity(FINGERPRINT_LEN + flags.len());
	payload.extend_from_slice(&group_fingerprint(flags));

	let mut side_list = Vec::new();
	for flag in flags {
		let value = values
			.get(flag.key())
			.ok_or_else(|| PrecomputeError::MissingValue {
				key: flag.key().to_string(),
			})?;

		let byte = match value {
			Value::Null => NULL,
			Value::Bool(false) => FALSE,
			Value::Bool(true) => TRUE,
			other => match option_byte(flag, other)? {
				Some(index) => index,
				None => {
					side_list.push(other);
					UNLISTED
				}
			},
		};
		payload.push(byte);
	}

	if !side_list.is_empty() {
		let json = serde_json::to_string(&side_list)?;
		let inner = json
			.strip_prefix('[')
			.and_then(|rest| rest.strip_suffix(']'))
			.unwrap_or_default();
		payload.extend_from_slice(inner.as_bytes());
	}

	Ok(sign(secret, &payload)?)
}

fn option_byte(flag: &Flag, value: &Value) -> Result<Option<u8>> {
	let Some(index) = flag.option_index(value) else {
		return Ok(None);
	};
	if index >= MAX_OPTIONS {
		return Err(PrecomputeError::TooManyOptions {
			key: flag.key().to_string(),
			count: flag.options().map_or(0, <[_]>::len),
			limit: MAX_OPTIONS,
		}
		.into());
	}
	// Lossless: index < MAX_OPTIONS <= u8::MAX.
	Ok(Some(index as u8))
}

/// Decodes a code produced by [`serialize`] for the same ordered `flags`.
pub fn deserialize(flags: &[Flag], code: &str, secret: &FlagsSecret) -> Result<FlagValues> {
	let payload = verify(secret, code).map_err(PrecomputeError::InvalidCode)?;

	if payload.len() < FINGERPRINT_LEN + flags.len() {
		return Err(PrecomputeError::Corrupt("payload shorter than flag group").into());
	}
	let (fingerprint, rest) = payload.split_at(FINGERPRINT_LEN);
	if fingerprint != group_fingerprint(flags).as_slice() {
		return Err(PrecomputeError::FlagGroupMismatch.into());
	}
	let (indices, side_list) = rest.split_at(flags.len());

	let side_list = std::str::from_utf8(side_list)
		.map_err(|_| PrecomputeError::Corrupt("side list is not UTF-8"))?;
	let side_list: Vec<Value> = serde_json::from_str(&format!("[{side_list}]"))
		.map_err(|_| PrecomputeError::Corrupt("side list is not valid JSON"))?;
	let mut side_list = side_list.into_iter();

	let mut values = FlagValues::new();
	for (flag, byte) in flags.iter().zip(indices) {
		let value = match *byte {
			NULL => Value::Null,
			FALSE => Value::Bool(false),
			TRUE => Value::Bool(true),
			UNLISTED => side_list
				.next()
				.ok_or(PrecomputeError::Corrupt("side list too short"))?,
			index => flag
				.options()
				.and_then(|options| options.get(usize::from(index)))
				.map(|option| option.value.clone())
				.ok_or(PrecomputeError::Corrupt("option index out of range"))?,
		};
		values.insert(flag.key().to_string(), value);
	}

	if side_list.next().is_some() {
		return Err(PrecomputeError::Corrupt("side list too long").into());
	}

	Ok(values)
}

/// Decodes `code` for the whole group and returns `flag`'s value.
pub fn get_precomputed(
	flag: &Flag,
	flags: &[Flag],
	code: &str,
	secret: &FlagsSecret,
) -> Result<Value> {
	if !flags.iter().any(|member| member.key() == flag.key()) {
		return Err(PrecomputeError::FlagNotInGroup {
			key: flag.key().to_string(),
		}
		.into());
	}

	let mut values = deserialize(flags, code, secret)?;
	values
		.remove(flag.key())
		.ok_or_else(|| FlagsError::from(PrecomputeError::MissingValue {
			key: flag.key().to_string(),
		}))
}

/// Candidate values a flag contributes to the permutation product.
///
/// Undeclared options mean a boolean flag. An explicitly empty option list is
/// not an axis: the flag is pinned to its default value, or `null`.
fn permutation_axis(flag: &Flag) -> Vec<Value> {
	match flag.options() {
		None => vec![Value::Bool(false), Value::Bool(true)],
		Some([]) => vec![flag.default_value().cloned().unwrap_or(Value::Null)],
		Some(options) => options.iter().map(|option| option.value.clone()).collect(),
	}
}

/// Encodes every combination of the group's candidate values.
///
/// The first flag varies slowest. `filter` sees each combination before it is
/// signed; rejected combinations are never encoded.
pub fn generate_permutations(
	flags: &[Flag],
	filter: Option<&dyn Fn(&FlagValues) -> bool>,
	secret: &FlagsSecret,
) -> Result<Vec<String>> {
	let axes: Vec<Vec<Value>> = flags.iter().map(permutation_axis).collect();

	let mut combinations: Vec<Vec<&Value>> = vec![Vec::new()];
	for axis in &axes {
		combinations = combinations
			.into_iter()
			.flat_map(|prefix| {
				axis.iter().map(move |value| {
					let mut combination = prefix.clone();
					combination.push(value);
					combination
				})
			})
			.collect();
	}

	combinations
		.into_iter()
		.map(|combination| combine(flags, combination.into_iter().cloned()))
		.filter(|values| filter.map_or(true, |keep| keep(values)))
		.map(|values| serialize(flags, &values, secret))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use pennant_crypto::CryptoError;
	use pennant_flags_core::{DecideError, DecideParams, FlagOption};
	use proptest::prelude::*;
	use serde_json::json;

	fn flag(key: &str, options: Option<Vec<Value>>) -> Flag {
		let mut builder = Flag::builder(key)
			.decide(|_: DecideParams| async { Ok::<_, DecideError>(Some(json!(true))) });
		if let Some(options) = options {
			builder = builder.options(options);
		}
		builder.build().unwrap()
	}

	fn values(pairs: &[(&str, Value)]) -> FlagValues {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.clone()))
			.collect()
	}

	fn payload(code: &str, secret: &FlagsSecret) -> Vec<u8> {
		verify(secret, code).unwrap()
	}

	#[test]
	fn sentinels_and_indices() {
		let secret = FlagsSecret::generate();
		let flags = [
			flag("a", None),
			flag("b", None),
			flag("c", None),
			flag("d", Some(vec![json!("one"), json!("two")])),
			flag("e", Some(vec![json!("one")])),
		];
		let input = values(&[
			("a", json!(null)),
			("b", json!(false)),
			("c", json!(true)),
			("d", json!("two")),
			("e", json!({"unlisted": 1})),
		]);

		let code = serialize(&flags, &input, &secret).unwrap();
		let bytes = payload(&code, &secret);

		assert_eq!(&bytes[..4], &group_fingerprint(&flags));
		assert_eq!(&bytes[4..9], &[252, 253, 254, 1, 255]);
		assert_eq!(&bytes[9..], br#"{"unlisted":1}"#);
		assert_eq!(deserialize(&flags, &code, &secret).unwrap(), input);
	}

	#[test]
	fn side_list_keeps_order() {
		let secret = FlagsSecret::generate();
		let flags = [flag("x", None), flag("y", Some(vec![])), flag("z", None)];
		let input = values(&[("x", json!(1.5)), ("y", json!("free text")), ("z", json!([1, 2]))]);

		let code = serialize(&flags, &input, &secret).unwrap();
		assert_eq!(
			&payload(&code, &secret)[7..],
			br#"1.5,"free text",[1,2]"#
		);
		assert_eq!(deserialize(&flags, &code, &secret).unwrap(), input);
	}

	#[test]
	fn booleans_and_null_never_consult_options() {
		let secret = FlagsSecret::generate();
		let many: Vec<Value> = (0..300).map(|i| json!(format!("v{i}"))).collect();
		let flags = [
			flag("crowded", Some(many)),
			flag("undeclared", None),
			flag("empty", Some(vec![])),
		];
		let input = values(&[
			("crowded", json!(true)),
			("undeclared", json!(false)),
			("empty", json!(null)),
		]);

		let code = serialize(&flags, &input, &secret).unwrap();
		assert_eq!(deserialize(&flags, &code, &secret).unwrap(), input);
	}

	#[test]
	fn option_index_limit_is_enforced() {
		let secret = FlagsSecret::generate();
		let many: Vec<Value> = (0..300).map(|i| json!(format!("v{i}"))).collect();
		let flags = [flag("crowded", Some(many))];

		assert!(serialize(&flags, &values(&[("crowded", json!("v251"))]), &secret).is_ok());

		let err = serialize(&flags, &values(&[("crowded", json!("v252"))]), &secret).unwrap_err();
		assert!(matches!(
			err,
			FlagsError::Precompute(PrecomputeError::TooManyOptions { count: 300, limit: 252, .. })
		));
	}

	#[test]
	fn missing_value_is_an_error() {
		let secret = FlagsSecret::generate();
		let flags = [flag("a", None), flag("b", None)];
		let err = serialize(&flags, &values(&[("a", json!(true))]), &secret).unwrap_err();
		assert!(matches!(
			err,
			FlagsError::Precompute(PrecomputeError::MissingValue { key }) if key == "b"
		));
	}

	#[test]
	fn other_group_is_rejected() {
		let secret = FlagsSecret::generate();
		let flags = [flag("a", None), flag("b", None)];
		let code = serialize(
			&flags,
			&values(&[("a", json!(true)), ("b", json!(false))]),
			&secret,
		)
		.unwrap();

		let reordered = [flag("b", None), flag("a", None)];
		let reshaped = [flag("a", None), flag("b", Some(vec![json!(1)]))];
		for group in [&reordered[..], &reshaped[..]] {
			assert!(matches!(
				deserialize(group, &code, &secret),
				Err(FlagsError::Precompute(PrecomputeError::FlagGroupMismatch))
			));
		}
	}

	#[test]
	fn bad_signature_is_rejected() {
		let secret = FlagsSecret::generate();
		let flags = [flag("a", None)];
		let code = serialize(&flags, &values(&[("a", json!(true))]), &secret).unwrap();

		assert!(matches!(
			deserialize(&flags, &code, &FlagsSecret::generate()),
			Err(FlagsError::Precompute(PrecomputeError::InvalidCode(
				CryptoError::InvalidSignature
			)))
		));
		assert!(matches!(
			deserialize(&flags, "not-a-code", &secret),
			Err(FlagsError::Precompute(PrecomputeError::InvalidCode(_)))
		));
	}

	#[test]
	fn truncated_payload_is_corrupt() {
		let secret = FlagsSecret::generate();
		let flags = [flag("a", None), flag("b", None)];
		let code = sign(&secret, &group_fingerprint(&flags)[..3]).unwrap();
		assert!(matches!(
			deserialize(&flags, &code, &secret),
			Err(FlagsError::Precompute(PrecomputeError::Corrupt(_)))
		));
	}

	#[test]
	fn get_precomputed_returns_one_value() {
		let secret = FlagsSecret::generate();
		let a = flag("a", None);
		let c = flag("c", Some(vec![json!("one"), json!("two"), json!("three")]));
		let flags = [a.clone(), c.clone()];
		let code = serialize(
			&flags,
			&values(&[("a", json!(true)), ("c", json!("three"))]),
			&secret,
		)
		.unwrap();

		assert_eq!(get_precomputed(&a, &flags, &code, &secret).unwrap(), json!(true));
		assert_eq!(get_precomputed(&c, &flags, &code, &secret).unwrap(), json!("three"));

		let stranger = flag("z", None);
		assert!(matches!(
			get_precomputed(&stranger, &flags, &code, &secret),
			Err(FlagsError::Precompute(PrecomputeError::FlagNotInGroup { .. }))
		));
	}

	#[test]
	fn permutation_counts() {
		let secret = FlagsSecret::generate();
		let abc = flag("abc", Some(vec![json!("a"), json!("b"), json!("c")]));
		let empty = flag("empty", Some(vec![]));
		let boolean = flag("bool", None);

		let count = |flags: &[Flag]| generate_permutations(flags, None, &secret).unwrap().len();
		assert_eq!(count(&[abc.clone()]), 3);
		assert_eq!(count(&[boolean.clone()]), 2);
		assert_eq!(count(&[empty.clone()]), 1);
		assert_eq!(count(&[abc.clone(), empty.clone(), boolean.clone()]), 6);
		assert_eq!(count(&[]), 1);
	}

	#[test]
	fn empty_options_pin_the_default() {
		let secret = FlagsSecret::generate();
		let pinned = Flag::builder("pinned")
			.default_value(json!("house"))
			.options(Vec::<FlagOption>::new())
			.decide(|_: DecideParams| async { Ok::<_, DecideError>(None) })
			.build()
			.unwrap();
		let flags = [pinned, flag("bool", None)];

		let codes = generate_permutations(&flags, None, &secret).unwrap();
		assert_eq!(codes.len(), 2);
		for code in codes {
			assert_eq!(
				deserialize(&flags, &code, &secret).unwrap()["pinned"],
				json!("house")
			);
		}
	}

	#[test]
	fn filter_prunes_before_encoding() {
		let secret = FlagsSecret::generate();
		let flags = [
			flag("a", None),
			flag("c", Some(vec![json!("one"), json!("two"), json!("three")])),
		];
		let only_enabled = |values: &FlagValues| values["a"] == json!(true);

		let codes = generate_permutations(&flags, Some(&only_enabled), &secret).unwrap();
		assert_eq!(codes.len(), 3);
		for code in codes {
			assert_eq!(deserialize(&flags, &code, &secret).unwrap()["a"], json!(true));
		}
	}

	#[test]
	fn combine_zips_in_order() {
		let flags = [flag("a", None), flag("b", None)];
		assert_eq!(
			combine(&flags, vec![json!(1), json!(2)]),
			values(&[("a", json!(1)), ("b", json!(2))])
		);
	}

	fn option_value() -> impl Strategy<Value = Value> {
		prop_oneof![
			any::<i32>().prop_map(|n| json!(n)),
			"[a-z]{1,8}".prop_map(|s| json!(s)),
			("[a-z]{1,4}", any::<u8>()).prop_map(|(k, v)| json!({ k: v })),
		]
	}

	proptest! {
		#[test]
		fn prop_roundtrip_consistent_values(
			groups in proptest::collection::vec(
				(proptest::collection::vec(option_value(), 0..6), any::<prop::sample::Index>(), 0u8..4),
				1..8,
			),
		) {
			let secret = FlagsSecret::generate();
			let mut flags = Vec::new();
			let mut input = FlagValues::new();

			for (i, (options, pick, kind)) in groups.into_iter().enumerate() {
				let key = format!("flag-{i}");
				let value = match kind {
					0 => Value::Null,
					1 => Value::Bool(i % 2 == 0),
					2 if !options.is_empty() => options[pick.index(options.len())].clone(),
					_ => json!(format!("unlisted-{i}")),
				};
				flags.push(flag(&key, Some(options)));
				input.insert(key, value);
			}

			let code = serialize(&flags, &input, &secret).unwrap();
			prop_assert_eq!(deserialize(&flags, &code, &secret).unwrap(), input);
		}
	}
}
