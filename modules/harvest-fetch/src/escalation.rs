// Static → rendered escalation decisions. Pure; the adapter owns the fetches.

use harvest_common::RenderPolicy;

use crate::page::{FetchFailureKind, FetchMode};

/// What the adapter saw after extracting a statically fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSignature {
    pub records: usize,
    /// The page carries a platform-specific "content is rendered client-side"
    /// marker (empty review container, app-shell placeholder, noscript notice).
    pub needs_rendering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticOutcome {
    Extracted(PageSignature),
    Failed(FetchFailureKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    Keep,
    Render { reason: String },
}

/// First fetch mode for every page under `policy`.
pub fn initial_mode(policy: RenderPolicy) -> FetchMode {
    match policy {
        RenderPolicy::RenderedFirst => FetchMode::Rendered,
        RenderPolicy::StaticOnly | RenderPolicy::StaticFirst => FetchMode::Static,
    }
}

/// Decide whether a page should be re-fetched in rendered mode. A page that
/// was already rendered is never escalated again.
pub fn decide(policy: RenderPolicy, already_rendered: bool, outcome: StaticOutcome) -> Escalation {
    if already_rendered || policy == RenderPolicy::StaticOnly {
        return Escalation::Keep;
    }
    match outcome {
        StaticOutcome::Extracted(sig) if sig.records == 0 && sig.needs_rendering => Escalation::Render {
            reason: "no records and page requires client-side rendering".to_string(),
        },
        StaticOutcome::Failed(FetchFailureKind::Blocked) => Escalation::Render {
            reason: "static fetch blocked".to_string(),
        },
        _ => Escalation::Keep,
    }
}
