//! Completion evaluation: pure functions of a task's declared requirements
//! and an attempt's signal snapshot. No wall-clock reads, no side effects —
//! the same snapshot always evaluates the same way, client- and
//! server-side alike.

use engage_types::{EngineParams, RejectReason, SignalSnapshot, TaskDefinition};

const DURATION_WEIGHT: f64 = 0.40;
const SCROLL_WEIGHT: f64 = 0.30;
const INTERACTION_WEIGHT: f64 = 0.20;
const AD_CLICK_WEIGHT: f64 = 0.10;

/// First unmet requirement, in the order time, scroll, interaction, ad
/// clicks. `None` means the snapshot satisfies the task.
///
/// Tasks without content have no signal requirements at all: completion is
/// the user's explicit say-so once started.
pub fn shortfall(
    task: &TaskDefinition,
    snapshot: &SignalSnapshot,
    params: &EngineParams,
) -> Option<RejectReason> {
    if !task.has_content() {
        return None;
    }
    // Unloaded content accrues no valid watch time, whatever the client
    // claims; the remediation is the same as too-short engagement.
    if !snapshot.loaded || snapshot.elapsed_seconds < task.min_duration_seconds {
        return Some(RejectReason::InsufficientTime);
    }
    if task.require_scrolling && snapshot.scroll_percentage < task.min_scroll_percentage {
        return Some(RejectReason::InsufficientScroll);
    }
    if task.require_interaction && snapshot.interaction_count < params.min_interactions {
        return Some(RejectReason::InsufficientInteraction);
    }
    if task.min_ad_clicks > 0 && snapshot.ad_click_count < task.min_ad_clicks {
        return Some(RejectReason::InsufficientAdClicks);
    }
    None
}

/// Advisory completion gate. The server re-derives this from the submitted
/// snapshot; a client-side true is never authoritative.
pub fn may_complete(task: &TaskDefinition, snapshot: &SignalSnapshot, params: &EngineParams) -> bool {
    shortfall(task, snapshot, params).is_none()
}

/// Continuous engagement proxy in [0, 1]: weighted ratios of each signal
/// against its requirement, each clamped to 1. Requirements the task does
/// not declare count as satisfied. Observability only, never a gate.
pub fn engagement_score(
    task: &TaskDefinition,
    snapshot: &SignalSnapshot,
    params: &EngineParams,
) -> f64 {
    if !task.has_content() {
        return 1.0;
    }

    let duration = ratio(snapshot.elapsed_seconds, task.min_duration_seconds);
    let scroll = if task.require_scrolling {
        ratio(
            snapshot.scroll_percentage as u64,
            task.min_scroll_percentage as u64,
        )
    } else {
        1.0
    };
    let interaction = if task.require_interaction {
        ratio(
            snapshot.interaction_count as u64,
            params.min_interactions as u64,
        )
    } else {
        1.0
    };
    let ad_clicks = if task.min_ad_clicks > 0 {
        ratio(snapshot.ad_click_count as u64, task.min_ad_clicks as u64)
    } else {
        1.0
    };

    let score = DURATION_WEIGHT * duration
        + SCROLL_WEIGHT * scroll
        + INTERACTION_WEIGHT * interaction
        + AD_CLICK_WEIGHT * ad_clicks;
    score.clamp(0.0, 1.0)
}

fn ratio(actual: u64, required: u64) -> f64 {
    if required == 0 {
        1.0
    } else {
        (actual as f64 / required as f64).min(1.0)
    }
}
