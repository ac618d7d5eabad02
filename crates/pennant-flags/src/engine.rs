// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The flag engine: request-scoped evaluation plus precomputation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::try_join_all;
use futures::FutureExt;
use http::HeaderMap;
use pennant_crypto::FlagsSecret;
use pennant_dedupe::{DedupeError, MemoId, MemoizationRegistry, Memoized, ScopedStore};
use pennant_flags_core::{
	DecideError, Flag, FlagsError, Identify, IdentifyParams, IdentifySource, NoOpReporter,
	ReportReason, RequestContext, RequestView, Result, SharedReporter, ValueReporter,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::FlagsConfig;
use crate::evaluation::{panic_message, report, Evaluation, EvaluationCache, EvaluationKey};
use crate::overrides::OverrideResolver;
use crate::precompute::{self, FlagValues};

type IdentifyFn = Memoized<(Arc<dyn Identify>, RequestView), Option<Value>, FlagsError>;

/// Per-call options for [`FlagEngine::run_with`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
	/// Entities source used instead of the flag's own identify function.
	pub identify: Option<IdentifySource>,
}

impl RunOptions {
	pub fn identify(source: impl Into<IdentifySource>) -> Self {
		Self {
			identify: Some(source.into()),
		}
	}
}

pub struct FlagEngineBuilder {
	registry: Option<Arc<MemoizationRegistry>>,
	config: FlagsConfig,
	reporter: Option<SharedReporter>,
}

impl FlagEngineBuilder {
	pub fn new() -> Self {
		Self {
			registry: None,
			config: FlagsConfig::default(),
			reporter: None,
		}
	}

	/// Shares a memoization registry with other memoized functions, so their
	/// caches are released together with the engine's when a request ends.
	pub fn registry(mut self, registry: Arc<MemoizationRegistry>) -> Self {
		self.registry = Some(registry);
		self
	}

	pub fn config(mut self, config: FlagsConfig) -> Self {
		self.config = config;
		self
	}

	pub fn secret(mut self, secret: FlagsSecret) -> Self {
		self.config.secret = Some(secret);
		self
	}

	pub fn override_cookie(mut self, name: impl Into<String>) -> Self {
		self.config.override_cookie = name.into();
		self
	}

	/// Receives a report for every value a flag resolves to.
	pub fn reporter<R: ValueReporter>(mut self, reporter: R) -> Self {
		self.reporter = Some(Arc::new(reporter));
		self
	}

	pub fn shared_reporter(mut self, reporter: SharedReporter) -> Self {
		self.reporter = Some(reporter);
		self
	}

	pub fn build(self) -> FlagEngine {
		let registry = self.registry.unwrap_or_else(MemoizationRegistry::new);
		let reporter = self.reporter.unwrap_or_else(|| Arc::new(NoOpReporter));
		let FlagsConfig {
			secret,
			override_cookie,
		} = self.config;

		let evaluations = Arc::new(EvaluationCache::default());
		let store: Arc<dyn ScopedStore> = evaluations.clone();
		let evaluations_id = registry.register(Arc::downgrade(&store));

		let overrides = OverrideResolver::new(&registry, secret.clone(), override_cookie);
		let identify: IdentifyFn = Memoized::new(&registry, call_identify);

		info!(
			has_secret = secret.is_some(),
			override_cookie = %overrides.cookie_name(),
			"flag engine initialized"
		);

		FlagEngine {
			inner: Arc::new(EngineInner {
				registry,
				secret,
				reporter,
				overrides,
				evaluations,
				evaluations_id,
				identify,
			}),
		}
	}
}

impl Default for FlagEngineBuilder {
	fn default() -> Self {
		Self::new()
	}
}

async fn call_identify(
	(identify, view): (Arc<dyn Identify>, RequestView),
) -> Result<Option<Value>> {
	let params = IdentifyParams {
		headers: Arc::clone(view.headers()),
		cookies: Arc::clone(view.cookies()),
	};
	let identified = AssertUnwindSafe(async move { identify.identify(params).await })
		.catch_unwind()
		.await
		.unwrap_or_else(|panic| Err(DecideError::Panicked(panic_message(panic.as_ref()))));

	match identified {
		Ok(entities) => Ok(entities),
		Err(DecideError::Control(signal)) => Err(FlagsError::ControlFlow(signal)),
		Err(e) => Err(FlagsError::Identify(e)),
	}
}

struct EngineInner {
	registry: Arc<MemoizationRegistry>,
	secret: Option<FlagsSecret>,
	reporter: SharedReporter,
	overrides: OverrideResolver,
	evaluations: Arc<EvaluationCache>,
	evaluations_id: MemoId,
	identify: IdentifyFn,
}

/// Evaluates flags once per request and encodes their values into
/// precomputed codes.
///
/// Cheap to clone; clones share caches and configuration.
#[derive(Clone)]
pub struct FlagEngine {
	inner: Arc<EngineInner>,
}

impl FlagEngine {
	pub fn builder() -> FlagEngineBuilder {
		FlagEngineBuilder::new()
	}

	/// Builds an engine configured from the process environment.
	pub fn from_env() -> Result<Self> {
		Ok(Self::builder().config(FlagsConfig::from_env()?).build())
	}

	pub fn registry(&self) -> &Arc<MemoizationRegistry> {
		&self.inner.registry
	}

	pub fn secret(&self) -> Option<&FlagsSecret> {
		self.inner.secret.as_ref()
	}

	fn require_secret(&self) -> Result<&FlagsSecret> {
		self.inner.secret.as_ref().ok_or(FlagsError::MissingSecret)
	}

	/// Opens the context for one incoming request.
	///
	/// Everything cached for the request is released when the last clone of
	/// the context is dropped.
	pub fn context(&self, headers: HeaderMap) -> RequestContext {
		RequestContext::new(&self.inner.registry, headers)
	}

	/// Resolves `flag` for the request.
	pub async fn run(&self, flag: &Flag, ctx: &RequestContext) -> Result<Value> {
		self.run_with(flag, ctx, RunOptions::default()).await
	}

	/// Resolves `flag` for the request.
	///
	/// An override from the request's cookie wins. Otherwise the decide
	/// function runs at most once per request and entities; decide and
	/// identify errors fall back to the default value when there is one.
	/// Control-flow signals are never replaced by the default.
	pub async fn run_with(
		&self,
		flag: &Flag,
		ctx: &RequestContext,
		options: RunOptions,
	) -> Result<Value> {
		if !Arc::ptr_eq(ctx.scope().registry(), &self.inner.registry) {
			return Err(DedupeError::ForeignScope {
				scope: ctx.scope().id(),
			}
			.into());
		}

		let entities = match self.entities(flag, ctx, options.identify).await {
			Ok(entities) => entities,
			Err(FlagsError::Identify(error)) => {
				let Some(default) = flag.default_value() else {
					return Err(FlagsError::Identify(error));
				};
				warn!(
					flag_key = %flag.key(),
					error = %error,
					"identify failed, falling back to default value"
				);
				report(&self.inner.reporter, flag, default, ReportReason::Default);
				return Ok(default.clone());
			}
			Err(e) => return Err(e),
		};
		let key = EvaluationKey::new(flag.key(), entities.as_ref());
		let scope = ctx.scope().id();

		if let Some(cached) = self.inner.evaluations.get(scope, &key) {
			debug!(flag_key = %flag.key(), scope = %scope, "reusing evaluation");
			return cached.await;
		}

		debug!(flag_key = %flag.key(), scope = %scope, "evaluating flag");
		let evaluation = Evaluation {
			flag: flag.clone(),
			view: ctx.view(),
			entities,
			overrides: self.inner.overrides.resolve(ctx),
			reporter: Arc::clone(&self.inner.reporter),
		}
		.run()
		.boxed()
		.shared();

		self.inner.evaluations.insert(scope, key, evaluation).await
	}

	async fn entities(
		&self,
		flag: &Flag,
		ctx: &RequestContext,
		identify: Option<IdentifySource>,
	) -> Result<Option<Value>> {
		let source = identify.or_else(|| flag.identify_fn().cloned().map(IdentifySource::Function));
		match source {
			None => Ok(None),
			Some(IdentifySource::Value(entities)) => Ok(Some(entities)),
			Some(IdentifySource::Function(identify)) => {
				self.inner
					.identify
					.call(ctx.scope(), (identify, ctx.view()))
					.await
			}
		}
	}

	/// Resolves every flag concurrently, returning values in input order.
	///
	/// Without a context the flags are evaluated in a fresh, header-less one.
	pub async fn evaluate(&self, flags: &[Flag], ctx: Option<&RequestContext>) -> Result<Vec<Value>> {
		let fresh;
		let ctx = match ctx {
			Some(ctx) => ctx,
			None => {
				fresh = self.context(HeaderMap::new());
				&fresh
			}
		};
		try_join_all(flags.iter().map(|flag| self.run(flag, ctx))).await
	}

	/// Evaluates the group and encodes the values into a signed code.
	pub async fn precompute(&self, flags: &[Flag], ctx: Option<&RequestContext>) -> Result<String> {
		let secret = self.require_secret()?;
		let values = self.evaluate(flags, ctx).await?;
		precompute::serialize(flags, &precompute::combine(flags, values), secret)
	}

	pub fn serialize(&self, flags: &[Flag], values: &FlagValues) -> Result<String> {
		precompute::serialize(flags, values, self.require_secret()?)
	}

	pub fn deserialize(&self, flags: &[Flag], code: &str) -> Result<FlagValues> {
		precompute::deserialize(flags, code, self.require_secret()?)
	}

	/// Reads `flag`'s value from a code produced for `flags`.
	pub fn run_precomputed(&self, flag: &Flag, flags: &[Flag], code: &str) -> Result<Value> {
		precompute::get_precomputed(flag, flags, code, self.require_secret()?)
	}

	pub fn generate_permutations(
		&self,
		flags: &[Flag],
		filter: Option<&dyn Fn(&FlagValues) -> bool>,
	) -> Result<Vec<String>> {
		precompute::generate_permutations(flags, filter, self.require_secret()?)
	}

	/// Checks the `Authorization` header of a request from flag tooling.
	pub fn verify_access(&self, authorization: Option<&str>) -> Result<()> {
		if pennant_crypto::verify_access(authorization, self.require_secret()?) {
			Ok(())
		} else {
			Err(FlagsError::AccessDenied)
		}
	}

	pub fn create_access_proof(&self) -> Result<String> {
		Ok(pennant_crypto::create_access_proof(
			self.require_secret()?,
			None,
		)?)
	}

	/// Forgets the request's cached evaluations so flags decide again.
	pub fn clear_evaluations(&self, ctx: &RequestContext) -> Result<bool> {
		Ok(self
			.inner
			.registry
			.clear(self.inner.evaluations_id, ctx.scope())?)
	}

	/// Number of evaluations cached for the request.
	pub fn cached_evaluations(&self, ctx: &RequestContext) -> usize {
		self.inner.evaluations.len(ctx.scope().id())
	}
}
