// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request-scoped feature flag evaluation and precomputation for Pennant.
//!
//! A [`FlagEngine`] resolves flags against the request they are evaluated in.
//! Within one request each flag is decided at most once per set of entities,
//! concurrent evaluations join the one already running, and values forced
//! through the encrypted overrides cookie win over the decide function.
//!
//! The values of a group of flags can also be encoded into a short signed
//! code (see [`precompute`]), so a statically generated variant of a page can
//! be selected by code and the flags read back without deciding again.
//!
//! # Features
//!
//! - **Deduplication**: decide and identify run once per request
//! - **Overrides**: forced values from flag tooling, sealed with the secret
//! - **Fallback**: failing decide functions fall back to the default value
//! - **Precomputation**: signed codes and permutation generation
//! - **Reporting**: every resolved value is passed to a [`ValueReporter`]
//!
//! # Example
//!
//! ```
//! use http::HeaderMap;
//! use pennant_flags::{DecideError, DecideParams, Flag, FlagEngine, FlagsSecret};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let engine = FlagEngine::builder()
//! 	.secret(FlagsSecret::generate())
//! 	.build();
//!
//! let banner = Flag::builder("banner")
//! 	.default_value(json!(false))
//! 	.decide(|_params: DecideParams| async { Ok::<_, DecideError>(Some(json!(true))) })
//! 	.build()
//! 	.unwrap();
//!
//! let ctx = engine.context(HeaderMap::new());
//! assert_eq!(engine.run(&banner, &ctx).await.unwrap(), json!(true));
//!
//! let flags = [banner];
//! let code = engine.precompute(&flags, Some(&ctx)).await.unwrap();
//! assert_eq!(
//! 	engine.run_precomputed(&flags[0], &flags, &code).unwrap(),
//! 	json!(true)
//! );
//! # });
//! ```

pub mod config;
mod engine;
mod evaluation;
pub mod overrides;
pub mod payloads;
pub mod precompute;

pub use config::{FlagsConfig, DEFAULT_OVERRIDE_COOKIE, OVERRIDE_COOKIE_ENV};
pub use engine::{FlagEngine, FlagEngineBuilder, RunOptions};
pub use overrides::{decrypt_overrides, encrypt_overrides, OverrideResolver, OverrideSet};
pub use payloads::{
	decrypt_flag_definitions, decrypt_flag_values, encrypt_flag_definitions,
	encrypt_flag_values, FlagDefinitions,
};
pub use precompute::{
	combine, deserialize, generate_permutations, get_precomputed, serialize, FlagValues,
	MAX_OPTIONS,
};

// Re-export core types for convenience
pub use pennant_crypto::{CryptoError, FlagsSecret};
pub use pennant_dedupe::{MemoizationRegistry, Memoized, RequestScope};
pub use pennant_flags_core::{
	get_provider_data, merge_provider_data, Adapter, ControlSignal, Decide, DecideError,
	DecideParams, Flag, FlagBuilder, FlagDefinition, FlagOption, FlagValue, FlagsError, Identify,
	IdentifyParams, IdentifySource, NoOpReporter, Origin, PrecomputeError, ProviderData,
	ProviderHint, ReportReason, RequestContext, RequestCookies, Result, SharedReporter,
	TracingReporter, ValueReport, ValueReporter,
};
