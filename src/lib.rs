//! LeadBoost Client Library
//!
//! This library provides the client side of the LeadBoost lead-generation
//! service: a typed REST client, a session-scoped lead cache, and the
//! plan-usage gate that keeps batch submissions inside the daily quota.
//!
//! # Modules
//!
//! - `api_client`: REST client for `/api/v2` with the 401 session handling.
//! - `auth`: Token storage and session events.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `lead_store`: Client-side lead cache and its operations.
//! - `models`: Lead, usage and plan data models.
//! - `session`: Usage-gated workflow on top of the lead cache.
//! - `usage_gate`: Quota and capability pre-checks.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod errors;
pub mod lead_store;
pub mod models;
pub mod session;
pub mod usage_gate;

pub use api_client::ApiClient;
pub use errors::ClientError;
pub use lead_store::LeadStore;
pub use session::LeadSession;
