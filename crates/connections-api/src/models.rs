//! Wire types for session API responses
//!
//! Field names follow the API's snake_case JSON. Every type is an immutable
//! value; merging account pages builds a new `Session` rather than mutating
//! one.

use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

use crate::secret::Secret;

/// Response of the synchronize endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SynchronizePayload {
    pub manifest: Manifest,
}

/// Hosted authorization descriptor for one session.
///
/// Produced once per synchronize call and consumed once, to present
/// `hosted_auth_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub hosted_auth_url: Url,
    pub success_url: Url,
    pub cancel_url: Url,
}

/// A Financial Connections session with the accounts collected so far.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub id: String,
    pub client_secret: Secret,
    /// True in live mode, false in test mode
    pub livemode: bool,
    pub accounts: AccountList,
}

impl Session {
    /// Same session with its account list replaced.
    pub fn with_accounts(&self, accounts: AccountList) -> Session {
        Session {
            id: self.id.clone(),
            client_secret: self.client_secret.clone(),
            livemode: self.livemode,
            accounts,
        }
    }
}

/// One page (or a merged run of pages) of accounts.
///
/// `has_more == false` means `data` is complete as of the fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountList {
    pub data: Vec<Account>,
    pub has_more: bool,
}

impl AccountList {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Id of the last account, the cursor for the next page.
    pub fn last_id(&self) -> Option<&str> {
        self.data.last().map(|a| a.id.as_str())
    }
}

/// A linked financial account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    pub id: String,
    pub livemode: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    pub status: AccountStatus,
    pub institution_name: String,
    #[serde(default)]
    pub last4: Option<String>,
    /// Unix timestamp of account creation
    pub created: i64,
    #[serde(default)]
    pub balance: Option<Balance>,
    #[serde(default)]
    pub balance_refresh: Option<BalanceRefresh>,
    pub category: Category,
    pub subcategory: Subcategory,
    #[serde(default)]
    pub permissions: Option<Vec<Permission>>,
    pub supported_payment_method_types: Vec<PaymentMethodType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Disconnected,
}

impl AccountStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Cash,
    Credit,
    Investment,
    #[serde(other)]
    Other,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Cash => "cash",
            Category::Credit => "credit",
            Category::Investment => "investment",
            Category::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subcategory {
    Checking,
    CreditCard,
    LineOfCredit,
    Mortgage,
    Savings,
    #[serde(other)]
    Other,
}

impl Subcategory {
    pub fn label(&self) -> &'static str {
        match self {
            Subcategory::Checking => "checking",
            Subcategory::CreditCard => "credit_card",
            Subcategory::LineOfCredit => "line_of_credit",
            Subcategory::Mortgage => "mortgage",
            Subcategory::Savings => "savings",
            Subcategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Balances,
    Ownership,
    PaymentMethod,
    Transactions,
    AccountNumbers,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    UsBankAccount,
    Link,
    #[serde(other)]
    Unknown,
}

/// Balance snapshot. Amounts are minor units keyed by currency code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Balance {
    /// Unix timestamp the institution calculated this balance
    pub as_of: i64,
    #[serde(rename = "type")]
    pub balance_type: BalanceType,
    #[serde(default)]
    pub cash: Option<CashBalance>,
    #[serde(default)]
    pub credit: Option<CreditBalance>,
    pub current: HashMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CashBalance {
    #[serde(default)]
    pub available: Option<HashMap<String, i64>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreditBalance {
    #[serde(default)]
    pub used: Option<HashMap<String, i64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceType {
    Cash,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalanceRefresh {
    pub status: BalanceRefreshStatus,
    pub last_attempted_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceRefreshStatus {
    Failed,
    Pending,
    Succeeded,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn session_deserializes_with_accounts() {
        let session: Session = serde_json::from_value(session_json(&["fca_1", "fca_2"], true)).unwrap();
        assert_eq!(session.id, "fcsess_123");
        assert_eq!(session.client_secret.expose(), "fcsess_123_secret_abc");
        assert!(!session.livemode);
        assert!(session.accounts.has_more);
        assert_eq!(session.accounts.len(), 2);
        assert_eq!(session.accounts.last_id(), Some("fca_2"));

        let account = &session.accounts.data[0];
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.category, Category::Cash);
        assert_eq!(account.subcategory, Subcategory::Checking);
        assert_eq!(
            account.permissions,
            Some(vec![Permission::Balances, Permission::PaymentMethod])
        );
        assert_eq!(
            account.supported_payment_method_types,
            vec![PaymentMethodType::UsBankAccount]
        );
        assert!(account.balance.is_none());
    }

    #[test]
    fn manifest_deserializes_urls() {
        let payload: SynchronizePayload = serde_json::from_str(
            r#"{"manifest":{
                "id":"fcsess_123",
                "hosted_auth_url":"https://auth.stripe.com/link-accounts#token=abc",
                "success_url":"https://auth.stripe.com/success",
                "cancel_url":"https://auth.stripe.com/cancel",
                "extra_field":"ignored"
            }}"#,
        )
        .unwrap();
        assert_eq!(payload.manifest.hosted_auth_url.scheme(), "https");
        assert_eq!(payload.manifest.hosted_auth_url.host_str(), Some("auth.stripe.com"));
    }

    #[test]
    fn manifest_rejects_invalid_url() {
        let result: Result<SynchronizePayload, _> = serde_json::from_str(
            r#"{"manifest":{"id":"x","hosted_auth_url":"not a url","success_url":"https://a","cancel_url":"https://b"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_category_and_permission_fall_back() {
        let mut json = account_json("fca_9");
        json["category"] = "crypto".into();
        json["subcategory"] = "brokerage".into();
        json["permissions"] = serde_json::json!(["balances", "statements"]);
        json["supported_payment_method_types"] = serde_json::json!(["link", "sepa_debit"]);

        let account: Account = serde_json::from_value(json).unwrap();
        assert_eq!(account.category, Category::Other);
        assert_eq!(account.subcategory, Subcategory::Other);
        assert_eq!(
            account.permissions,
            Some(vec![Permission::Balances, Permission::Unknown])
        );
        assert_eq!(
            account.supported_payment_method_types,
            vec![PaymentMethodType::Link, PaymentMethodType::Unknown]
        );
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut json = account_json("fca_1");
        json["status"] = "frozen".into();
        assert!(serde_json::from_value::<Account>(json).is_err());
    }

    #[test]
    fn balance_deserializes() {
        let mut json = account_json("fca_1");
        json["balance"] = serde_json::json!({
            "as_of": 1_700_000_500,
            "type": "cash",
            "cash": {"available": {"usd": 6000}},
            "current": {"usd": 6500}
        });
        json["balance_refresh"] = serde_json::json!({
            "status": "succeeded",
            "last_attempted_at": 1_700_000_400
        });
        let account: Account = serde_json::from_value(json).unwrap();
        let balance = account.balance.unwrap();
        assert_eq!(balance.balance_type, BalanceType::Cash);
        assert_eq!(balance.current["usd"], 6500);
        assert_eq!(balance.cash.unwrap().available.unwrap()["usd"], 6000);
        assert!(balance.credit.is_none());
        assert_eq!(
            account.balance_refresh.unwrap().status,
            BalanceRefreshStatus::Succeeded
        );
    }

    #[test]
    fn with_accounts_keeps_identity() {
        let session: Session = serde_json::from_value(session_json(&["fca_1"], true)).unwrap();
        let replaced = session.with_accounts(AccountList {
            data: vec![],
            has_more: false,
        });
        assert_eq!(replaced.id, session.id);
        assert_eq!(replaced.client_secret.expose(), session.client_secret.expose());
        assert!(replaced.accounts.is_empty());
        assert_eq!(session.accounts.len(), 1, "original untouched");
    }
}
