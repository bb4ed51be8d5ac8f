//! Collaborators backed by a remote device shell
//!
//! The shell (a web view wrapper on the device) polls `GET /flow` to learn
//! what the flow wants shown and answers platform requests through the
//! bridge routes. `BridgeSurface` records what was asked and parks each
//! platform request on a oneshot channel until the shell replies.

use std::sync::{Mutex, MutexGuard, PoisonError};

use auth_flow::{AppLinkResolver, BrowserOutcome, RenderingSurface, SecureBrowser};
use connections_api::BoxFuture;
use tokio::sync::oneshot;
use tracing::{debug, info};
use url::Url;

struct AppLinkRequest {
    url: Url,
    reply: oneshot::Sender<bool>,
}

struct BrowserRequest {
    url: Url,
    callback_scheme: String,
    reply: oneshot::Sender<BrowserOutcome>,
}

#[derive(Default)]
struct Pending {
    present_url: Option<Url>,
    dismissed: bool,
    app_link: Option<AppLinkRequest>,
    browser: Option<BrowserRequest>,
}

/// What the shell should currently be doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    pub present_url: Option<Url>,
    pub app_link_request: Option<Url>,
    /// URL and callback scheme of the secure browser session to open
    pub browser_request: Option<(Url, String)>,
    pub dismissed: bool,
}

#[derive(Default)]
pub struct BridgeSurface {
    pending: Mutex<Pending>,
}

impl BridgeSurface {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        let pending = self.lock();
        SurfaceSnapshot {
            present_url: pending.present_url.clone(),
            app_link_request: pending.app_link.as_ref().map(|r| r.url.clone()),
            browser_request: pending
                .browser
                .as_ref()
                .map(|r| (r.url.clone(), r.callback_scheme.clone())),
            dismissed: pending.dismissed,
        }
    }

    /// Answer the outstanding app-link request. False if none is pending.
    pub fn answer_app_link(&self, opened: bool) -> bool {
        let Some(request) = self.lock().app_link.take() else {
            return false;
        };
        if request.reply.send(opened).is_err() {
            debug!("app link request was abandoned before the answer arrived");
        }
        true
    }

    /// Answer the outstanding secure-browser request. False if none is pending.
    pub fn answer_browser(&self, outcome: BrowserOutcome) -> bool {
        let Some(request) = self.lock().browser.take() else {
            return false;
        };
        if request.reply.send(outcome).is_err() {
            debug!("browser request was abandoned before the answer arrived");
        }
        true
    }
}

impl RenderingSurface for BridgeSurface {
    fn present(&self, url: &Url) {
        info!(host = url.host_str().unwrap_or(""), "presenting hosted page");
        self.lock().present_url = Some(url.clone());
    }

    fn dismiss(&self) {
        let mut pending = self.lock();
        pending.dismissed = true;
        pending.app_link = None;
        pending.browser = None;
    }
}

impl AppLinkResolver for BridgeSurface {
    fn open_app_link<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, bool> {
        let (reply, answer) = oneshot::channel();
        // A newer request replaces an unanswered one; the older waiter sees
        // "no app" and moves on.
        self.lock().app_link = Some(AppLinkRequest {
            url: url.clone(),
            reply,
        });
        Box::pin(async move { answer.await.unwrap_or(false) })
    }
}

impl SecureBrowser for BridgeSurface {
    fn open<'a>(&'a self, url: &'a Url, callback_scheme: &'a str) -> BoxFuture<'a, BrowserOutcome> {
        let (reply, answer) = oneshot::channel();
        self.lock().browser = Some(BrowserRequest {
            url: url.clone(),
            callback_scheme: callback_scheme.to_string(),
            reply,
        });
        Box::pin(async move {
            answer
                .await
                .unwrap_or_else(|_| BrowserOutcome::Failed("browser request superseded".into()))
        })
    }
}
