//! Hosted authorization flow orchestrator
//!
//! Drives one account-linking flow end to end and yields exactly one
//! `FlowResult`:
//!
//! 1. `Synchronizing`: create the hosted auth manifest
//! 2. `AwaitingUserAction`: the rendering surface shows the hosted page and
//!    reports navigations; `redirect::classify` spots the terminal redirect
//!    and app handoffs
//! 3. `Completing`: complete the session
//! 4. `Paginating`: collect the remaining accounts
//! 5. `Terminal`: deliver the result, ignore everything after
//!
//! The transitions live in `state::handle_event` (pure, no I/O); `AuthFlow`
//! executes the actions they ask for. Presentation is behind the traits in
//! `surface`.

pub mod error;
pub mod flow;
pub mod redirect;
pub mod state;
pub mod surface;

pub use error::FlowError;
pub use flow::{AuthFlow, Collaborators, SurfaceEvents};
pub use redirect::{Frame, NavigationDecision, NavigationPolicy, classify};
pub use state::{CancelReason, EmptyAccounts, FlowConfig, FlowPhase, FlowResult};
pub use surface::{AppLinkResolver, BrowserOutcome, RenderingSurface, SecureBrowser};
