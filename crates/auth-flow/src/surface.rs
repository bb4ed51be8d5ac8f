//! Collaborator interfaces implemented by the host
//!
//! The orchestrator never touches concrete presentation types. A host
//! provides three capabilities:
//! - `RenderingSurface` shows the hosted page and is torn down at the end
//! - `AppLinkResolver` tries to hand a URL to an installed app
//! - `SecureBrowser` opens a URL in an isolated, ephemeral browsing context
//!
//! Navigation events flow the other way, through `flow::SurfaceEvents`.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn AppLinkResolver>`).

use connections_api::BoxFuture;
use url::Url;

/// Displays the hosted authorization page.
pub trait RenderingSurface: Send + Sync {
    /// Load and show `url`. Load failures come back as
    /// `SurfaceEvents::load_failed`.
    fn present(&self, url: &Url);

    /// The flow reached its terminal state; tear the surface down.
    /// Called once, before the result is delivered.
    fn dismiss(&self);
}

/// Platform link resolution (universal links / app links).
pub trait AppLinkResolver: Send + Sync {
    /// Try to open `url` in an installed app that claims it. Resolves to
    /// true if an app took it, false if no app claims the URL.
    fn open_app_link<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, bool>;
}

/// How an ephemeral browsing context ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// Navigated to a URL with the callback scheme; the context closed itself
    Redirect(Url),
    /// The user closed the browser
    Canceled,
    /// The context could not be started or failed otherwise
    Failed(String),
}

/// Isolated, ephemeral browser used when no app claims a handoff URL.
pub trait SecureBrowser: Send + Sync {
    /// Open `url` and resolve when the context reaches `callback_scheme` or
    /// is closed.
    fn open<'a>(&'a self, url: &'a Url, callback_scheme: &'a str) -> BoxFuture<'a, BrowserOutcome>;
}
