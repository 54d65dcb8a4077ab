//! Social identity login over OAuth 2.0 Authorization Code + PKCE, with a
//! rate-limit-aware resilient client for the provider API.
//!
//! The crate is organized around [`AuthService`], which drives the login
//! lifecycle end to end:
//!
//! 1. [`AuthService::begin_login`] generates PKCE material, stores the
//!    handshake, and returns the provider redirect URL.
//! 2. The provider calls back with `code` and `state`;
//!    [`AuthService::complete_login`] consumes the handshake, redeems the
//!    code, and fetches the user's profile.
//! 3. [`AuthService::refresh`] keeps the session alive through the
//!    provider's rotating refresh tokens; [`AuthService::logout`] revokes.
//!
//! Every provider call runs through [`client::ApiClient`], which owns retry,
//! exponential backoff with jitter, and rate-limit-header handling. The
//! relationship check ([`AuthService::check_relationship`]) is deliberately
//! infallible and degrades to a skipped result under pressure.

pub mod authorize;
pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod pkce;
pub mod profile;
pub mod ratelimit;
pub mod relationship;
pub mod revoke;
pub mod service;
pub mod testing;
pub mod token;
pub mod usage;

pub use client::{ApiClient, ApiResponse, Sleeper, TokioSleeper};
pub use config::{ProviderConfig, RetryOptions};
pub use error::{ApiError, AuthError, StoreError};
pub use handshake::{HandshakeLookup, HandshakeRecord, HandshakeStore, KeyValueStore};
pub use pkce::PkceChallenge;
pub use profile::{PublicMetrics, UserProfile};
pub use ratelimit::RateLimitWindow;
pub use relationship::RelationshipStatus;
pub use service::{AuthService, LoginOutcome, LoginRedirect};
pub use token::TokenSet;
pub use usage::{NoopUsageRecorder, UsageRecorder};
