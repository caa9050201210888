//! EstimateWorks GitHub infrastructure adapter.
//!
//! Implements the GitHub-facing ports defined in the [`pipeline`] crate
//! ([`pipeline::IssueCommenter`], [`pipeline::InstallationClientSource`])
//! directly over the GitHub REST API with `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. All GitHub
//! API details (App JWT signing, installation-token exchange, request
//! formatting) are handled here; the [`pipeline`] crate never sees them.
//!
//! ## Authentication flow
//!
//! 1. [`auth::AppAuth`] signs a short-lived RS256 assertion identifying the
//!    App (10-minute expiry).
//! 2. [`client::AppClient`] exchanges the assertion for an installation
//!    token via `POST /app/installations/{id}/access_tokens` and binds a
//!    [`client::RestCommenter`] to it.
//! 3. [`token_cache::TokenCache`] caches the bound client per installation
//!    and refreshes it — with stampede control — once the token comes within
//!    five minutes of its expiry.

pub mod auth;
pub mod client;
pub mod errors;
pub mod token_cache;

pub use auth::AppAuth;
pub use client::{AppClient, InstallationClientFactory, IssuedClient, RestCommenter};
pub use errors::GitHubError;
pub use token_cache::TokenCache;
