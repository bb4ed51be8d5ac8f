//! Session API endpoint constants
//!
//! Paths are relative to the API base URL. The base can be overridden for
//! tests and staging; the paths cannot.

/// Production API base URL
pub const API_BASE_URL: &str = "https://api.stripe.com/v1";

/// Creates the hosted auth manifest for a session
pub const SYNCHRONIZE_PATH: &str = "financial_connections/sessions/synchronize";

/// Completes the session once the hosted flow has redirected back
pub const COMPLETE_PATH: &str = "link_account_sessions/complete";

/// Cursor-paginated listing of the accounts linked to a session
pub const LIST_ACCOUNTS_PATH: &str = "link_account_sessions/list_accounts";

/// Form content type used for every request body
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
