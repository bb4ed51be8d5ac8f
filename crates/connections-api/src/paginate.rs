//! Bounded cursor pagination over a session's accounts
//!
//! The complete endpoint returns only the first page of accounts. When that
//! page says `has_more`, `fetch_all_accounts` follows the cursor (the id of
//! the last account seen) until the server runs out or the cap is reached.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::client::SessionApi;
use crate::error::Result;
use crate::models::{AccountList, Session};
use crate::secret::Secret;

/// Upper bound on accounts collected for one session.
pub const DEFAULT_MAX_ACCOUNTS: usize = 100;

/// Collect the session's accounts across pages, up to `max_accounts`.
///
/// Returns the input unchanged (and makes no calls) when the first page is
/// already complete. Otherwise returns a new `Session` whose list:
/// - is the pages concatenated in server order, accounts already seen skipped
/// - never holds more than `max_accounts` entries (a page crossing the cap is
///   cut at the boundary)
/// - keeps `has_more` as the server last reported it, or true if a page was cut
///
/// A page that adds no unseen account ends the walk with `has_more` left as
/// the server reported it, so every request either grows the list or stops.
///
/// Any failed page fails the whole call; nothing partial is returned.
pub async fn fetch_all_accounts<A: SessionApi + ?Sized>(
    api: &A,
    client_secret: &Secret,
    session: Session,
    max_accounts: usize,
) -> Result<Session> {
    if !session.accounts.has_more {
        return Ok(session);
    }

    let mut accounts = Vec::with_capacity(session.accounts.len().min(max_accounts));
    let mut seen = HashSet::new();
    let (_, mut truncated) = append_unique(
        &mut accounts,
        &mut seen,
        &session.accounts,
        max_accounts,
    );
    let mut has_more = session.accounts.has_more;
    let mut cursor = session.accounts.last_id().map(str::to_owned);
    let mut pages = 0usize;

    while has_more && !truncated && accounts.len() < max_accounts {
        let page = api.list_accounts(client_secret, cursor.as_deref()).await?;
        pages += 1;
        debug!(
            session_id = %session.id,
            page = pages,
            received = page.len(),
            has_more = page.has_more,
            "fetched account page"
        );

        has_more = page.has_more;
        if page.is_empty() {
            if has_more {
                warn!(session_id = %session.id, "empty account page claims more results, stopping");
            }
            break;
        }

        cursor = page.last_id().map(str::to_owned);
        let (added, cut) = append_unique(&mut accounts, &mut seen, &page, max_accounts);
        truncated = cut;
        if added == 0 {
            if has_more {
                warn!(session_id = %session.id, "account page repeated known accounts, stopping");
            }
            break;
        }
    }

    let has_more = has_more || truncated;
    info!(
        session_id = %session.id,
        accounts = accounts.len(),
        pages,
        has_more,
        "account pagination finished"
    );

    Ok(session.with_accounts(AccountList {
        data: accounts,
        has_more,
    }))
}

/// Append accounts from `page` not seen before, stopping at `max`.
///
/// Returns how many were appended, and whether the page had unseen accounts
/// left over when the cap was hit.
fn append_unique(
    accounts: &mut Vec<crate::models::Account>,
    seen: &mut HashSet<String>,
    page: &AccountList,
    max: usize,
) -> (usize, bool) {
    let mut added = 0;
    for account in &page.data {
        if seen.contains(&account.id) {
            continue;
        }
        if accounts.len() >= max {
            return (added, true);
        }
        seen.insert(account.id.clone());
        accounts.push(account.clone());
        added += 1;
    }
    (added, false)
}
