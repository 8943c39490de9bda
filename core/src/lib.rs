//! Core components for building and signing upstream requests.
//!
//! This crate holds the protocol-agnostic plumbing of the sigrelay
//! ecosystem. The SigV4 semantics live in `sigrelay-aws-v4`; everything
//! here is reusable for any header-based signing scheme:
//!
//! - [`Context`]: a container holding the outbound HTTP transport and the
//!   environment used for configuration lookup, both injectable for tests
//! - Traits: [`ProvideCredential`] for credential resolution,
//!   [`SignRequest`] for the scheme-specific signing step and
//!   [`SigningCredential`] for validity checks
//! - [`Signer`]: the orchestrator that resolves a credential once and then
//!   signs request parts in place
//! - [`SigningRequest`]: the two-phase signing view of a request. Headers
//!   are accumulated while the view is held; applying it back seals the
//!   request, so nothing can be added after the signature is computed.
//!
//! The [`hash`] and [`time`] modules expose the keyed-hash and timestamp
//! primitives as pure functions so they can be exercised in isolation.

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::{Context, Env, HttpSend, OsEnv, StaticEnv};

mod error;
pub use error::{Error, ErrorKind, Result};

mod api;
pub use api::{ProvideCredential, SignRequest, SigningCredential};
mod request;
pub use request::SigningRequest;
mod signer;
pub use signer::Signer;
