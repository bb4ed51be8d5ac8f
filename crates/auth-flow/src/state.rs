//! Flow state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! The driver (`flow::AuthFlow`) executes the I/O implied by each action and
//! feeds the outcome back as the next event.
//!
//! ```text
//! Idle -> Synchronizing -> AwaitingUserAction -> Completing -> Paginating -> Terminal
//!              |                  |                  |             |
//!              +------------------+------------------+-------------+--> Terminal
//! ```
//!
//! `Terminal` is absorbing, and any event that does not apply to the current
//! state is ignored. That is what makes the first of redirect / cancel /
//! presentation failure win.

use connections_api::{DEFAULT_MAX_ACCOUNTS, Manifest, Session};
use tracing::{debug, info};
use url::Url;

use crate::error::FlowError;

/// What a completion with zero linked accounts resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyAccounts {
    /// Report `Canceled(NoAccounts)`: nothing usable was produced
    #[default]
    Cancel,
    /// Report `Success` with the empty session
    Succeed,
}

/// Per-flow settings.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Where the hosted flow returns to the host app; its scheme marks the
    /// terminal redirect.
    pub return_url: Url,
    /// Cap on accounts collected by pagination
    pub max_accounts: usize,
    pub empty_accounts: EmptyAccounts,
}

impl FlowConfig {
    pub fn new(return_url: Url) -> Self {
        Self {
            return_url,
            max_accounts: DEFAULT_MAX_ACCOUNTS,
            empty_accounts: EmptyAccounts::default(),
        }
    }

    pub fn return_scheme(&self) -> &str {
        self.return_url.scheme()
    }
}

/// Why a flow ended as canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The user exited the hosted flow or closed the secure browser
    UserCanceled,
    /// The session completed without any linked account
    NoAccounts,
}

impl CancelReason {
    pub fn label(&self) -> &'static str {
        match self {
            CancelReason::UserCanceled => "user_canceled",
            CancelReason::NoAccounts => "no_accounts",
        }
    }
}

/// The single outcome of a flow.
#[derive(Debug)]
pub enum FlowResult {
    Success(Session),
    Canceled(CancelReason),
    Failed(FlowError),
}

impl FlowResult {
    /// Outcome label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FlowResult::Success(_) => "success",
            FlowResult::Canceled(_) => "canceled",
            FlowResult::Failed(_) => "failed",
        }
    }
}

/// Flow states.
#[derive(Debug)]
pub enum FlowState {
    /// Created, not started
    Idle,
    /// Waiting for the synchronize response
    Synchronizing,
    /// Hosted page presented; waiting for redirect, cancel or failure
    AwaitingUserAction { manifest: Manifest },
    /// Terminal redirect seen; waiting for the complete response
    Completing { return_url: Url },
    /// Collecting the remaining account pages
    Paginating { session_id: String },
    /// Result delivered (or being delivered); absorbs every event
    Terminal { outcome: &'static str },
}

/// Coarse, cloneable view of `FlowState` for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Idle,
    Synchronizing,
    AwaitingUserAction,
    Completing,
    Paginating,
    Terminal,
}

impl FlowPhase {
    pub fn label(&self) -> &'static str {
        match self {
            FlowPhase::Idle => "idle",
            FlowPhase::Synchronizing => "synchronizing",
            FlowPhase::AwaitingUserAction => "awaiting_user_action",
            FlowPhase::Completing => "completing",
            FlowPhase::Paginating => "paginating",
            FlowPhase::Terminal => "terminal",
        }
    }
}

impl FlowState {
    pub fn phase(&self) -> FlowPhase {
        match self {
            FlowState::Idle => FlowPhase::Idle,
            FlowState::Synchronizing => FlowPhase::Synchronizing,
            FlowState::AwaitingUserAction { .. } => FlowPhase::AwaitingUserAction,
            FlowState::Completing { .. } => FlowPhase::Completing,
            FlowState::Paginating { .. } => FlowPhase::Paginating,
            FlowState::Terminal { .. } => FlowPhase::Terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Terminal { .. })
    }
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum FlowEvent {
    /// Begin the flow
    Start,
    /// Synchronize returned the manifest
    Synchronized(Manifest),
    /// The surface (or the secure browser) reached the return scheme
    RedirectReached(Url),
    /// The surface tried to open a secondary window
    HandoffRequested(Url),
    /// The surface failed to load or render
    PresentationFailed(String),
    /// The user confirmed leaving the flow
    CancelRequested,
    /// Complete returned the session
    SessionCompleted(Session),
    /// Pagination finished
    AccountsFetched(Session),
    /// The outstanding API call failed
    RequestFailed(connections_api::Error),
}

impl FlowEvent {
    fn label(&self) -> &'static str {
        match self {
            FlowEvent::Start => "start",
            FlowEvent::Synchronized(_) => "synchronized",
            FlowEvent::RedirectReached(_) => "redirect_reached",
            FlowEvent::HandoffRequested(_) => "handoff_requested",
            FlowEvent::PresentationFailed(_) => "presentation_failed",
            FlowEvent::CancelRequested => "cancel_requested",
            FlowEvent::SessionCompleted(_) => "session_completed",
            FlowEvent::AccountsFetched(_) => "accounts_fetched",
            FlowEvent::RequestFailed(_) => "request_failed",
        }
    }
}

/// Actions the driver should execute after a transition.
#[derive(Debug)]
pub enum FlowAction {
    /// Call synchronize
    Synchronize,
    /// Show the hosted page
    Present(Url),
    /// Try the app handoff / secure browser for this URL
    StartHandoff(Url),
    /// Call complete
    CompleteSession,
    /// Run the paginator on this session
    Paginate(Session),
    /// Tear down and deliver the result
    Finish(FlowResult),
    /// No-op
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(
    state: FlowState,
    event: FlowEvent,
    config: &FlowConfig,
) -> (FlowState, FlowAction) {
    match (state, event) {
        // --- Idle ---
        (FlowState::Idle, FlowEvent::Start) => (FlowState::Synchronizing, FlowAction::Synchronize),

        // --- Synchronizing ---
        (FlowState::Synchronizing, FlowEvent::Synchronized(manifest)) => {
            let url = manifest.hosted_auth_url.clone();
            info!(manifest_id = %manifest.id, "manifest received, presenting hosted auth");
            (
                FlowState::AwaitingUserAction { manifest },
                FlowAction::Present(url),
            )
        }

        // --- AwaitingUserAction ---
        (FlowState::AwaitingUserAction { manifest }, FlowEvent::RedirectReached(url)) => {
            info!(manifest_id = %manifest.id, scheme = url.scheme(), "terminal redirect reached");
            (
                FlowState::Completing { return_url: url },
                FlowAction::CompleteSession,
            )
        }

        (FlowState::AwaitingUserAction { manifest }, FlowEvent::HandoffRequested(url)) => (
            FlowState::AwaitingUserAction { manifest },
            FlowAction::StartHandoff(url),
        ),

        (FlowState::AwaitingUserAction { .. }, FlowEvent::PresentationFailed(reason)) => {
            terminal(FlowResult::Failed(FlowError::Presentation(reason)))
        }

        (FlowState::AwaitingUserAction { .. }, FlowEvent::CancelRequested) => {
            terminal(FlowResult::Canceled(CancelReason::UserCanceled))
        }

        // --- Completing ---
        (FlowState::Completing { return_url }, FlowEvent::SessionCompleted(session)) => {
            debug!(
                session_id = %session.id,
                return_query = return_url.query().unwrap_or(""),
                first_page = session.accounts.len(),
                "session completed"
            );
            (
                FlowState::Paginating {
                    session_id: session.id.clone(),
                },
                FlowAction::Paginate(session),
            )
        }

        // --- Paginating ---
        (FlowState::Paginating { session_id }, FlowEvent::AccountsFetched(session)) => {
            debug!(%session_id, accounts = session.accounts.len(), "accounts collected");
            if session.accounts.is_empty() && config.empty_accounts == EmptyAccounts::Cancel {
                terminal(FlowResult::Canceled(CancelReason::NoAccounts))
            } else {
                terminal(FlowResult::Success(session))
            }
        }

        // --- Any in-flight API call failing ends the flow ---
        (
            FlowState::Synchronizing | FlowState::Completing { .. } | FlowState::Paginating { .. },
            FlowEvent::RequestFailed(e),
        ) => terminal(FlowResult::Failed(FlowError::Api(e))),

        // --- Invalid/late transition: stay in current state ---
        (state, event) => {
            let outcome = match &state {
                FlowState::Terminal { outcome } => *outcome,
                _ => "",
            };
            debug!(
                phase = state.phase().label(),
                outcome,
                event = event.label(),
                "ignoring event"
            );
            (state, FlowAction::None)
        }
    }
}

fn terminal(result: FlowResult) -> (FlowState, FlowAction) {
    (
        FlowState::Terminal {
            outcome: result.label(),
        },
        FlowAction::Finish(result),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use connections_api::Error as ApiError;

    fn config() -> FlowConfig {
        FlowConfig::new(Url::parse("myapp://return").unwrap())
    }

    fn manifest() -> Manifest {
        serde_json::from_value(serde_json::json!({
            "id": "fcsess_123",
            "hosted_auth_url": "https://auth.stripe.com/link-accounts/fcsess_123",
            "success_url": "https://auth.stripe.com/success",
            "cancel_url": "https://auth.stripe.com/cancel"
        }))
        .unwrap()
    }

    fn session(account_ids: &[&str]) -> Session {
        let data: Vec<serde_json::Value> = account_ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "livemode": false,
                    "status": "active",
                    "institution_name": "Test Bank",
                    "created": 1_700_000_000,
                    "category": "cash",
                    "subcategory": "savings",
                    "supported_payment_method_types": ["us_bank_account"]
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "id": "fcsess_123",
            "client_secret": "fcsess_123_secret",
            "livemode": false,
            "accounts": {"data": data, "has_more": false}
        }))
        .unwrap()
    }

    fn awaiting() -> FlowState {
        FlowState::AwaitingUserAction {
            manifest: manifest(),
        }
    }

    fn redirect() -> FlowEvent {
        FlowEvent::RedirectReached(Url::parse("myapp://return?status=ok").unwrap())
    }

    #[test]
    fn idle_start_synchronizes() {
        let (state, action) = handle_event(FlowState::Idle, FlowEvent::Start, &config());
        assert!(matches!(state, FlowState::Synchronizing));
        assert!(matches!(action, FlowAction::Synchronize));
    }

    #[test]
    fn synchronized_presents_hosted_url() {
        let (state, action) = handle_event(
            FlowState::Synchronizing,
            FlowEvent::Synchronized(manifest()),
            &config(),
        );
        assert!(matches!(state, FlowState::AwaitingUserAction { .. }));
        match action {
            FlowAction::Present(url) => {
                assert_eq!(url.as_str(), "https://auth.stripe.com/link-accounts/fcsess_123")
            }
            other => panic!("expected Present, got {other:?}"),
        }
    }

    #[test]
    fn synchronize_failure_is_terminal_failure() {
        let (state, action) = handle_event(
            FlowState::Synchronizing,
            FlowEvent::RequestFailed(ApiError::Transport("offline".into())),
            &config(),
        );
        assert!(state.is_terminal());
        assert!(matches!(
            action,
            FlowAction::Finish(FlowResult::Failed(FlowError::Api(ApiError::Transport(_))))
        ));
    }

    #[test]
    fn redirect_moves_to_completing() {
        let (state, action) = handle_event(awaiting(), redirect(), &config());
        assert!(matches!(state, FlowState::Completing { .. }));
        assert!(matches!(action, FlowAction::CompleteSession));
    }

    #[test]
    fn handoff_stays_awaiting() {
        let url = Url::parse("https://bank.example/oauth").unwrap();
        let (state, action) =
            handle_event(awaiting(), FlowEvent::HandoffRequested(url.clone()), &config());
        assert!(matches!(state, FlowState::AwaitingUserAction { .. }));
        assert!(matches!(action, FlowAction::StartHandoff(u) if u == url));
    }

    #[test]
    fn cancel_while_awaiting_is_canceled() {
        let (state, action) = handle_event(awaiting(), FlowEvent::CancelRequested, &config());
        assert!(matches!(state, FlowState::Terminal { outcome: "canceled" }));
        assert!(matches!(
            action,
            FlowAction::Finish(FlowResult::Canceled(CancelReason::UserCanceled))
        ));
    }

    #[test]
    fn presentation_failure_is_failure() {
        let (state, action) = handle_event(
            awaiting(),
            FlowEvent::PresentationFailed("network connection lost".into()),
            &config(),
        );
        assert!(state.is_terminal());
        assert!(matches!(
            action,
            FlowAction::Finish(FlowResult::Failed(FlowError::Presentation(_)))
        ));
    }

    #[test]
    fn completed_session_is_paginated() {
        let (state, action) = handle_event(
            FlowState::Completing {
                return_url: Url::parse("myapp://return").unwrap(),
            },
            FlowEvent::SessionCompleted(session(&["fca_1"])),
            &config(),
        );
        assert!(matches!(state, FlowState::Paginating { ref session_id } if session_id == "fcsess_123"));
        assert!(matches!(action, FlowAction::Paginate(_)));
    }

    #[test]
    fn complete_failure_is_failure() {
        let (state, action) = handle_event(
            FlowState::Completing {
                return_url: Url::parse("myapp://return").unwrap(),
            },
            FlowEvent::RequestFailed(ApiError::Server {
                status: 400,
                body: "bad".into(),
            }),
            &config(),
        );
        assert!(state.is_terminal());
        assert!(matches!(action, FlowAction::Finish(FlowResult::Failed(_))));
    }

    #[test]
    fn pagination_failure_is_failure() {
        let (_, action) = handle_event(
            FlowState::Paginating {
                session_id: "fcsess_123".into(),
            },
            FlowEvent::RequestFailed(ApiError::Decode("missing field".into())),
            &config(),
        );
        assert!(matches!(
            action,
            FlowAction::Finish(FlowResult::Failed(FlowError::Api(ApiError::Decode(_))))
        ));
    }

    #[test]
    fn accounts_fetched_is_success() {
        let (state, action) = handle_event(
            FlowState::Paginating {
                session_id: "fcsess_123".into(),
            },
            FlowEvent::AccountsFetched(session(&["fca_1", "fca_2"])),
            &config(),
        );
        assert!(matches!(state, FlowState::Terminal { outcome: "success" }));
        match action {
            FlowAction::Finish(FlowResult::Success(s)) => assert_eq!(s.accounts.len(), 2),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn zero_accounts_is_canceled_by_default() {
        let (_, action) = handle_event(
            FlowState::Paginating {
                session_id: "fcsess_123".into(),
            },
            FlowEvent::AccountsFetched(session(&[])),
            &config(),
        );
        assert!(matches!(
            action,
            FlowAction::Finish(FlowResult::Canceled(CancelReason::NoAccounts))
        ));
    }

    #[test]
    fn zero_accounts_can_succeed_by_policy() {
        let mut config = config();
        config.empty_accounts = EmptyAccounts::Succeed;
        let (_, action) = handle_event(
            FlowState::Paginating {
                session_id: "fcsess_123".into(),
            },
            FlowEvent::AccountsFetched(session(&[])),
            &config,
        );
        assert!(matches!(action, FlowAction::Finish(FlowResult::Success(_))));
    }

    #[test]
    fn terminal_absorbs_every_event() {
        let events = vec![
            FlowEvent::Start,
            redirect(),
            FlowEvent::CancelRequested,
            FlowEvent::PresentationFailed("late".into()),
            FlowEvent::SessionCompleted(session(&["fca_1"])),
            FlowEvent::AccountsFetched(session(&["fca_1"])),
            FlowEvent::RequestFailed(ApiError::Transport("late".into())),
        ];
        for event in events {
            let (state, action) = handle_event(
                FlowState::Terminal { outcome: "canceled" },
                event,
                &config(),
            );
            assert!(matches!(state, FlowState::Terminal { outcome: "canceled" }));
            assert!(matches!(action, FlowAction::None));
        }
    }

    #[test]
    fn signals_after_leaving_awaiting_are_ignored() {
        let completing = || FlowState::Completing {
            return_url: Url::parse("myapp://return").unwrap(),
        };
        for event in [
            FlowEvent::CancelRequested,
            redirect(),
            FlowEvent::PresentationFailed("late".into()),
            FlowEvent::HandoffRequested(Url::parse("https://bank.example").unwrap()),
        ] {
            let (state, action) = handle_event(completing(), event, &config());
            assert!(matches!(state, FlowState::Completing { .. }));
            assert!(matches!(action, FlowAction::None));
        }
    }

    #[test]
    fn surface_events_before_presentation_are_ignored() {
        let (state, action) = handle_event(FlowState::Synchronizing, redirect(), &config());
        assert!(matches!(state, FlowState::Synchronizing));
        assert!(matches!(action, FlowAction::None));
    }

    #[test]
    fn phase_labels() {
        assert_eq!(FlowState::Idle.phase().label(), "idle");
        assert_eq!(awaiting().phase().label(), "awaiting_user_action");
        assert_eq!(
            FlowState::Terminal { outcome: "success" }.phase(),
            FlowPhase::Terminal
        );
    }
}
