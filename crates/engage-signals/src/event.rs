use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Mouse movement, touch, key press — weight 1.
    Pointer,
    /// A click that did not resolve to an ad — weighted higher.
    Click,
}

/// One raw engagement observation from the embedding surface, delivered
/// either by the in-frame reporter or the host-side fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEvent {
    Scroll { percentage: u8 },
    Interaction { kind: InteractionKind },
    AdClick,
    Loaded,
    LoadFailed,
}
