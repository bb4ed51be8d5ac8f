//! Async driver for the flow state machine
//!
//! `AuthFlow::run` owns the state and executes each action `handle_event`
//! returns. API calls are awaited inline, so transitions are serialized on
//! the driver; surface events queue on an unbounded channel meanwhile and
//! are applied in order once the flow waits for the user again.
//!
//! Handoffs (app link, then secure browser) run as tasks in a `JoinSet` and
//! are aborted when the flow reaches `Terminal`.

use std::sync::Arc;

use connections_api::{Secret, SessionApi, fetch_all_accounts};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};
use url::Url;

use crate::redirect::{Frame, HandoffOutcome, NavigationDecision, NavigationPolicy, classify, resolve_handoff};
use crate::state::{FlowAction, FlowConfig, FlowEvent, FlowPhase, FlowResult, FlowState, handle_event};
use crate::surface::{AppLinkResolver, RenderingSurface, SecureBrowser};

/// Host-provided presentation capabilities.
#[derive(Clone)]
pub struct Collaborators {
    pub surface: Arc<dyn RenderingSurface>,
    pub links: Arc<dyn AppLinkResolver>,
    pub browser: Arc<dyn SecureBrowser>,
}

/// Handle the rendering surface uses to report what happens in the hosted page.
///
/// Cloneable. Events sent after the flow finished are dropped.
#[derive(Clone)]
pub struct SurfaceEvents {
    tx: mpsc::UnboundedSender<FlowEvent>,
    return_scheme: String,
}

impl SurfaceEvents {
    /// Report a navigation and get back whether the surface should load it.
    ///
    /// Terminal redirects and handoff candidates are forwarded to the flow
    /// and cancelled in the surface.
    pub fn navigate(&self, url: &Url, frame: Frame) -> NavigationPolicy {
        let decision = classify(url, frame, &self.return_scheme);
        match &decision {
            NavigationDecision::TerminalRedirect(url) => {
                self.send(FlowEvent::RedirectReached(url.clone()))
            }
            NavigationDecision::HandoffCandidate(url) => {
                self.send(FlowEvent::HandoffRequested(url.clone()))
            }
            NavigationDecision::PassThrough => {}
        }
        decision.policy()
    }

    /// The hosted page failed to load or render.
    pub fn load_failed(&self, message: impl Into<String>) {
        self.send(FlowEvent::PresentationFailed(message.into()));
    }

    /// The user confirmed leaving the flow.
    pub fn cancel(&self) {
        self.send(FlowEvent::CancelRequested);
    }

    fn send(&self, event: FlowEvent) {
        if self.tx.send(event).is_err() {
            debug!("flow already finished, dropping surface event");
        }
    }
}

/// One hosted authorization flow.
///
/// `run` consumes the flow, so each instance delivers exactly one result.
pub struct AuthFlow<A: SessionApi + ?Sized> {
    api: Arc<A>,
    client_secret: Secret,
    config: FlowConfig,
    collaborators: Collaborators,
    events_tx: mpsc::UnboundedSender<FlowEvent>,
    events_rx: mpsc::UnboundedReceiver<FlowEvent>,
    phase_tx: watch::Sender<FlowPhase>,
}

impl<A: SessionApi + ?Sized> AuthFlow<A> {
    pub fn new(
        api: Arc<A>,
        client_secret: Secret,
        config: FlowConfig,
        collaborators: Collaborators,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (phase_tx, _) = watch::channel(FlowPhase::Idle);
        Self {
            api,
            client_secret,
            config,
            collaborators,
            events_tx,
            events_rx,
            phase_tx,
        }
    }

    /// Sender for the rendering surface. Take it before calling `run`: once
    /// every sender is gone, a flow waiting on the user ends as canceled.
    pub fn events(&self) -> SurfaceEvents {
        SurfaceEvents {
            tx: self.events_tx.clone(),
            return_scheme: self.config.return_scheme().to_string(),
        }
    }

    /// Watch the flow's phase.
    pub fn phase(&self) -> watch::Receiver<FlowPhase> {
        self.phase_tx.subscribe()
    }

    /// Drive the flow to its single result.
    pub async fn run(self) -> FlowResult {
        let AuthFlow {
            api,
            client_secret,
            config,
            collaborators,
            events_tx,
            events_rx,
            phase_tx,
        } = self;
        drop(events_tx);

        let mut inbox = Inbox {
            events: events_rx,
            surface_closed: false,
            handoffs: JoinSet::new(),
        };

        let mut state = FlowState::Idle;
        let mut event = FlowEvent::Start;

        loop {
            let before = state.phase();
            let (next, action) = handle_event(state, event, &config);
            state = next;

            let after = state.phase();
            if after != before {
                info!(from = before.label(), to = after.label(), "flow phase changed");
                phase_tx.send_replace(after);
            }

            event = match action {
                FlowAction::Synchronize => {
                    match api.synchronize(&client_secret, &config.return_url).await {
                        Ok(manifest) => FlowEvent::Synchronized(manifest),
                        Err(e) => FlowEvent::RequestFailed(e),
                    }
                }
                FlowAction::Present(url) => {
                    collaborators.surface.present(&url);
                    inbox.next().await
                }
                FlowAction::StartHandoff(url) => {
                    let links = collaborators.links.clone();
                    let browser = collaborators.browser.clone();
                    let scheme = config.return_scheme().to_string();
                    inbox.handoffs.spawn(async move {
                        resolve_handoff(&url, &scheme, links.as_ref(), browser.as_ref()).await
                    });
                    inbox.next().await
                }
                FlowAction::CompleteSession => match api.complete_session(&client_secret).await {
                    Ok(session) => FlowEvent::SessionCompleted(session),
                    Err(e) => FlowEvent::RequestFailed(e),
                },
                FlowAction::Paginate(session) => {
                    match fetch_all_accounts(api.as_ref(), &client_secret, session, config.max_accounts)
                        .await
                    {
                        Ok(session) => FlowEvent::AccountsFetched(session),
                        Err(e) => FlowEvent::RequestFailed(e),
                    }
                }
                FlowAction::Finish(result) => {
                    inbox.handoffs.abort_all();
                    collaborators.surface.dismiss();
                    match &result {
                        FlowResult::Success(session) => info!(
                            session_id = %session.id,
                            accounts = session.accounts.len(),
                            has_more = session.accounts.has_more,
                            "flow succeeded"
                        ),
                        FlowResult::Canceled(reason) => {
                            info!(reason = reason.label(), "flow canceled")
                        }
                        FlowResult::Failed(e) => warn!(kind = e.kind(), error = %e, "flow failed"),
                    }
                    return result;
                }
                FlowAction::None => inbox.next().await,
            };
        }
    }

    /// Run the flow and hand its result to `on_result`, exactly once.
    pub async fn run_with<F>(self, on_result: F)
    where
        F: FnOnce(FlowResult),
    {
        let result = self.run().await;
        on_result(result);
    }
}

/// Everything that can wake a flow waiting on the user.
struct Inbox {
    events: mpsc::UnboundedReceiver<FlowEvent>,
    surface_closed: bool,
    handoffs: JoinSet<HandoffOutcome>,
}

impl Inbox {
    /// Next event for the state machine. Handoffs that leave the hosted page
    /// in charge produce no event and are skipped.
    async fn next(&mut self) -> FlowEvent {
        loop {
            tokio::select! {
                biased;
                received = self.events.recv(), if !self.surface_closed => match received {
                    Some(event) => return event,
                    None => {
                        debug!("all surface event senders dropped");
                        self.surface_closed = true;
                    }
                },
                Some(joined) = self.handoffs.join_next() => {
                    if let Some(event) = handoff_event(joined) {
                        return event;
                    }
                }
                else => {
                    info!("surface went away without a result, treating as cancel");
                    return FlowEvent::CancelRequested;
                }
            }
        }
    }
}

fn handoff_event(joined: Result<HandoffOutcome, JoinError>) -> Option<FlowEvent> {
    match joined {
        Ok(HandoffOutcome::ExternalApp) => None,
        Ok(HandoffOutcome::Redirect(url)) => Some(FlowEvent::RedirectReached(url)),
        Ok(HandoffOutcome::Canceled) => {
            info!("secure browser closed by user");
            Some(FlowEvent::CancelRequested)
        }
        Ok(HandoffOutcome::BrowserFailed(reason)) => {
            warn!(reason = %reason, "secure browser failed, hosted page stays up");
            None
        }
        Err(e) => {
            warn!(error = %e, "handoff task did not finish");
            None
        }
    }
}
