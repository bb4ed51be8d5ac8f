//! Flow API for the device shell
//!
//! One flow at a time. The shell starts a flow, polls its snapshot, reports
//! what its web view does and answers the platform requests the flow makes.
//!
//! Endpoints:
//! - POST /flow               : start a flow with a session client secret
//! - GET  /flow               : phase, what to show, pending requests, result
//! - POST /flow/navigation    : classify a web view navigation
//! - POST /flow/load-error    : the hosted page failed to load
//! - POST /flow/cancel        : the user left the flow
//! - POST /flow/app-link      : answer the pending app-link request
//! - POST /flow/browser       : answer the pending secure-browser request

use std::sync::{Arc, OnceLock};

use auth_flow::{
    AuthFlow, BrowserOutcome, Collaborators, FlowConfig, FlowPhase, FlowResult, Frame,
    SurfaceEvents,
};
use axum::extract::State;
use axum::{Json, Router};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use connections_api::{Secret, SessionApi};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::metrics;
use crate::surface::BridgeSurface;

/// The flow currently owned by the bridge, running or finished.
struct ActiveFlow {
    id: String,
    events: SurfaceEvents,
    surface: Arc<BridgeSurface>,
    phase: watch::Receiver<FlowPhase>,
    result: Arc<OnceLock<Value>>,
    task: JoinHandle<()>,
}

impl ActiveFlow {
    /// A task that ended without a result (it panicked) counts as finished.
    fn is_finished(&self) -> bool {
        self.result.get().is_some() || self.task.is_finished()
    }

    fn result(&self) -> Option<Value> {
        match self.result.get() {
            Some(result) => Some(result.clone()),
            None if self.task.is_finished() => Some(json!({
                "outcome": "failed",
                "kind": "internal",
                "error": "flow ended without a result",
            })),
            None => None,
        }
    }
}

/// Shared state for bridge handlers.
#[derive(Clone)]
pub struct BridgeState {
    api: Arc<dyn SessionApi>,
    flow_config: FlowConfig,
    slot: Arc<Mutex<Option<ActiveFlow>>>,
}

impl BridgeState {
    pub fn new(api: Arc<dyn SessionApi>, flow_config: FlowConfig) -> Self {
        Self {
            api,
            flow_config,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// True while a flow has not delivered its result.
    pub async fn flow_active(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.is_finished())
    }
}

/// Build the bridge router with all flow endpoints.
pub fn build_bridge_router(state: BridgeState) -> Router {
    Router::new()
        .route("/flow", post(start_flow).get(flow_status))
        .route("/flow/navigation", post(navigation))
        .route("/flow/load-error", post(load_error))
        .route("/flow/cancel", post(cancel))
        .route("/flow/app-link", post(app_link))
        .route("/flow/browser", post(browser))
        .with_state(state)
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(status, json!({ "error": message }))
}

fn no_flow() -> Response {
    error_response(StatusCode::NOT_FOUND, "no flow")
}

fn accepted() -> Response {
    json_response(StatusCode::ACCEPTED, json!({ "accepted": true }))
}

/// Result as reported to the shell. Never carries the client secret.
pub fn result_json(result: &FlowResult) -> Value {
    match result {
        FlowResult::Success(session) => {
            let accounts: Vec<Value> = session
                .accounts
                .data
                .iter()
                .map(|account| {
                    json!({
                        "id": account.id,
                        "display_name": account.display_name,
                        "institution_name": account.institution_name,
                        "last4": account.last4,
                        "status": account.status.label(),
                        "category": account.category.label(),
                        "subcategory": account.subcategory.label(),
                    })
                })
                .collect();
            json!({
                "outcome": "success",
                "session": {
                    "id": session.id,
                    "livemode": session.livemode,
                    "has_more": session.accounts.has_more,
                    "accounts": accounts,
                }
            })
        }
        FlowResult::Canceled(reason) => json!({
            "outcome": "canceled",
            "reason": reason.label(),
        }),
        FlowResult::Failed(e) => json!({
            "outcome": "failed",
            "kind": e.kind(),
            "error": e.to_string(),
        }),
    }
}

#[derive(Deserialize)]
struct StartFlowRequest {
    client_secret: Secret,
}

/// POST /flow: start a flow unless one is still running.
async fn start_flow(
    State(state): State<BridgeState>,
    Json(request): Json<StartFlowRequest>,
) -> Response {
    if request.client_secret.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "client_secret must not be empty");
    }

    let mut slot = state.slot.lock().await;
    if let Some(active) = slot.as_ref().filter(|active| !active.is_finished()) {
        warn!(flow_id = %active.id, "rejecting flow start, one is already running");
        return error_response(StatusCode::CONFLICT, "a flow is already running");
    }

    let surface = Arc::new(BridgeSurface::default());
    let collaborators = Collaborators {
        surface: surface.clone(),
        links: surface.clone(),
        browser: surface.clone(),
    };
    let flow = AuthFlow::new(
        state.api.clone(),
        request.client_secret,
        state.flow_config.clone(),
        collaborators,
    );

    let id = format!("flow_{}", uuid::Uuid::new_v4().as_simple());
    let result = Arc::new(OnceLock::new());
    let events = flow.events();
    let phase = flow.phase();

    metrics::record_flow_started();
    info!(flow_id = %id, "flow started");

    let flow_id = id.clone();
    let task_id = id.clone();
    let delivered = result.clone();
    let task = tokio::spawn(async move {
        let finished = tokio::spawn(flow.run_with(move |outcome| {
            metrics::record_flow_result(outcome.label());
            info!(%flow_id, outcome = outcome.label(), "flow result delivered");
            if delivered.set(result_json(&outcome)).is_err() {
                debug!(%flow_id, "flow result already recorded");
            }
        }))
        .await;
        if let Err(e) = finished {
            error!(flow_id = %task_id, error = %e, "flow task ended without a result");
        }
    });

    *slot = Some(ActiveFlow {
        id: id.clone(),
        events,
        surface,
        phase,
        result,
        task,
    });
    json_response(StatusCode::ACCEPTED, json!({ "flow_id": id }))
}

/// GET /flow: snapshot of the current or last flow.
async fn flow_status(State(state): State<BridgeState>) -> Response {
    let slot = state.slot.lock().await;
    let Some(active) = slot.as_ref() else {
        return no_flow();
    };

    let snapshot = active.surface.snapshot();
    let phase = *active.phase.borrow();
    json_response(
        StatusCode::OK,
        json!({
            "flow_id": active.id,
            "phase": phase.label(),
            "present_url": snapshot.present_url.map(String::from),
            "app_link_request": snapshot.app_link_request.map(String::from),
            "browser_request": snapshot.browser_request.map(|(url, callback_scheme)| json!({
                "url": url.as_str(),
                "callback_scheme": callback_scheme,
            })),
            "dismissed": snapshot.dismissed,
            "result": active.result(),
        }),
    )
}

#[derive(Deserialize)]
struct NavigationRequest {
    url: String,
    main_frame: bool,
}

/// POST /flow/navigation: tell the shell whether to load a navigation.
async fn navigation(
    State(state): State<BridgeState>,
    Json(request): Json<NavigationRequest>,
) -> Response {
    let Ok(url) = Url::parse(&request.url) else {
        return error_response(StatusCode::BAD_REQUEST, "url is not a valid absolute URL");
    };
    let slot = state.slot.lock().await;
    let Some(active) = slot.as_ref() else {
        return no_flow();
    };

    let policy = active
        .events
        .navigate(&url, Frame::from_main_frame(request.main_frame));
    json_response(StatusCode::OK, json!({ "policy": policy.label() }))
}

#[derive(Deserialize)]
struct LoadErrorRequest {
    message: String,
}

/// POST /flow/load-error: the hosted page could not be shown.
async fn load_error(
    State(state): State<BridgeState>,
    Json(request): Json<LoadErrorRequest>,
) -> Response {
    let slot = state.slot.lock().await;
    let Some(active) = slot.as_ref() else {
        return no_flow();
    };
    active.events.load_failed(request.message);
    accepted()
}

/// POST /flow/cancel: the user confirmed leaving the flow.
async fn cancel(State(state): State<BridgeState>) -> Response {
    let slot = state.slot.lock().await;
    let Some(active) = slot.as_ref() else {
        return no_flow();
    };
    active.events.cancel();
    accepted()
}

#[derive(Deserialize)]
struct AppLinkAnswer {
    opened: bool,
}

/// POST /flow/app-link: whether an installed app took the handoff URL.
async fn app_link(
    State(state): State<BridgeState>,
    Json(answer): Json<AppLinkAnswer>,
) -> Response {
    let slot = state.slot.lock().await;
    let Some(active) = slot.as_ref() else {
        return no_flow();
    };
    if active.surface.answer_app_link(answer.opened) {
        accepted()
    } else {
        error_response(StatusCode::CONFLICT, "no pending app link request")
    }
}

#[derive(Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum BrowserAnswer {
    Redirect { url: String },
    Canceled,
    Failed { message: String },
}

/// POST /flow/browser: how the secure browser session ended.
async fn browser(
    State(state): State<BridgeState>,
    Json(answer): Json<BrowserAnswer>,
) -> Response {
    let outcome = match answer {
        BrowserAnswer::Redirect { url } => match Url::parse(&url) {
            Ok(url) => BrowserOutcome::Redirect(url),
            Err(_) => {
                return error_response(StatusCode::BAD_REQUEST, "url is not a valid absolute URL");
            }
        },
        BrowserAnswer::Canceled => BrowserOutcome::Canceled,
        BrowserAnswer::Failed { message } => BrowserOutcome::Failed(message),
    };

    let slot = state.slot.lock().await;
    let Some(active) = slot.as_ref() else {
        return no_flow();
    };
    if active.surface.answer_browser(outcome) {
        accepted()
    } else {
        error_response(StatusCode::CONFLICT, "no pending browser request")
    }
}
