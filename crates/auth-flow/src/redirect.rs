//! Navigation classification for the hosted authorization surface
//!
//! Every outbound navigation the surface observes is one of:
//! - the terminal redirect back to the host app (return-URL scheme)
//! - a handoff candidate (the page tries to open a new window, typically a
//!   bank's own authentication)
//! - an ordinary navigation inside the page
//!
//! `classify` is pure. `resolve_handoff` composes the two platform
//! capabilities a handoff needs: installed-app resolution first, the
//! ephemeral secure browser as fallback.

use tracing::{debug, info, warn};
use url::Url;

use crate::surface::{AppLinkResolver, BrowserOutcome, SecureBrowser};

/// Where a navigation is taking place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// The surface's main frame
    Primary,
    /// A new window/tab or any non-main frame
    Secondary,
}

impl Frame {
    pub fn from_main_frame(is_main_frame: bool) -> Self {
        if is_main_frame {
            Frame::Primary
        } else {
            Frame::Secondary
        }
    }
}

/// Result of classifying one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// The flow finished in the hosted page and is returning to the app
    TerminalRedirect(Url),
    /// Attempt an external app handoff for this URL
    HandoffCandidate(Url),
    /// Let the surface load it
    PassThrough,
}

/// What the surface should do with the navigation it reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPolicy {
    Allow,
    Cancel,
}

impl NavigationPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            NavigationPolicy::Allow => "allow",
            NavigationPolicy::Cancel => "cancel",
        }
    }
}

impl NavigationDecision {
    /// Only pass-through navigations load in the surface; the surface never
    /// opens secondary windows itself and stops at the terminal redirect.
    pub fn policy(&self) -> NavigationPolicy {
        match self {
            NavigationDecision::PassThrough => NavigationPolicy::Allow,
            NavigationDecision::TerminalRedirect(_) | NavigationDecision::HandoffCandidate(_) => {
                NavigationPolicy::Cancel
            }
        }
    }
}

/// Classify a navigation observed while the hosted page is presented.
///
/// The return scheme wins over the frame check, so a return URL opened in a
/// new window still ends the flow.
pub fn classify(url: &Url, frame: Frame, return_scheme: &str) -> NavigationDecision {
    if url.scheme().eq_ignore_ascii_case(return_scheme) {
        return NavigationDecision::TerminalRedirect(url.clone());
    }
    match frame {
        Frame::Secondary => NavigationDecision::HandoffCandidate(url.clone()),
        Frame::Primary => NavigationDecision::PassThrough,
    }
}

/// How a handoff attempt ended, from the flow's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// An installed app took the URL; the flow resumes when it redirects back
    ExternalApp,
    /// The secure browser reached the return scheme
    Redirect(Url),
    /// The user closed the secure browser
    Canceled,
    /// The secure browser failed; the hosted page is still up
    BrowserFailed(String),
}

/// Hand `url` to an installed app, falling back to the secure browser.
pub async fn resolve_handoff(
    url: &Url,
    return_scheme: &str,
    links: &dyn AppLinkResolver,
    browser: &dyn SecureBrowser,
) -> HandoffOutcome {
    if links.open_app_link(url).await {
        info!(host = url.host_str().unwrap_or(""), "handed off to installed app");
        return HandoffOutcome::ExternalApp;
    }

    debug!(host = url.host_str().unwrap_or(""), "no app claims URL, opening secure browser");
    match browser.open(url, return_scheme).await {
        BrowserOutcome::Redirect(redirect) => {
            // The browser should only complete on the callback scheme, but
            // re-check before treating it as the flow's return.
            match classify(&redirect, Frame::Primary, return_scheme) {
                NavigationDecision::TerminalRedirect(redirect) => HandoffOutcome::Redirect(redirect),
                _ => {
                    warn!(scheme = redirect.scheme(), "secure browser completed on a foreign scheme");
                    HandoffOutcome::BrowserFailed(format!(
                        "browser completed on unexpected scheme {}",
                        redirect.scheme()
                    ))
                }
            }
        }
        BrowserOutcome::Canceled => HandoffOutcome::Canceled,
        BrowserOutcome::Failed(reason) => HandoffOutcome::BrowserFailed(reason),
    }
}
