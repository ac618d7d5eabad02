// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared-secret cryptography for Pennant.
//!
//! Every payload that leaves the server (override cookies, precomputed codes,
//! flag values embedded in pages) is protected with one 32-byte secret:
//!
//! - [`envelope`]: AES-256-GCM encryption in the compact JWE form
//!   (`alg: dir`, `enc: A256GCM`), with purpose and expiry claims.
//! - [`signing`]: HMAC-SHA256 signatures in the compact JWS form
//!   (`alg: HS256`), for payloads that must stay short but need not be secret.
//! - [`access`]: bearer access proofs for flag discovery endpoints.
//! - [`FlagsSecret`]: the key itself, loaded from `FLAGS_SECRET` or
//!   `FLAGS_SECRET_FILE`, redacted in logs and zeroized on drop.

pub mod access;
pub mod envelope;
pub mod error;
pub mod secret;
pub mod signing;

pub use access::{create_access_proof, verify_access};
pub use envelope::{open, seal, DEFAULT_EXPIRATION_DAYS};
pub use error::{CryptoError, Result};
pub use secret::{FlagsSecret, DEFAULT_SECRET_ENV, SECRET_LEN};
pub use signing::{sign, verify};
