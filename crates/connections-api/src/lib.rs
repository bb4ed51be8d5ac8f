//! Financial Connections session API
//!
//! Typed client for the three session endpoints used by the hosted account
//! linking flow, plus the pieces it is built from. This crate knows nothing
//! about presentation; the flow orchestrator in `auth-flow` drives it.
//!
//! Call sequence for one flow:
//! 1. `ApiClient::synchronize()` returns the `Manifest` with the hosted auth URL
//! 2. The user completes the hosted flow (outside this crate)
//! 3. `ApiClient::complete_session()` returns the `Session` with a first page of accounts
//! 4. `paginate::fetch_all_accounts()` follows `has_more` via `list_accounts()`
//!
//! Request bodies and query strings are produced by `encoder`, which flattens
//! nested parameters into bracket-path keys.

pub mod client;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod models;
pub mod paginate;
pub mod secret;

pub use client::{ApiClient, BoxFuture, SessionApi};
pub use encoder::{Params, Value};
pub use error::{Error, Result};
pub use models::{Account, AccountList, AccountStatus, Manifest, Session};
pub use paginate::{DEFAULT_MAX_ACCOUNTS, fetch_all_accounts};
pub use secret::Secret;
