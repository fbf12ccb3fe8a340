pub mod classifier;
pub mod collector;
pub mod evaluator;
pub mod event;
pub mod strategy;

pub use classifier::{classify_click, ElementRef};
pub use collector::{EventSubscription, LoadState, SignalCollector, Ticker};
pub use evaluator::{engagement_score, may_complete, shortfall};
pub use event::{ContentEvent, InteractionKind};
pub use strategy::{same_origin, AcquisitionStrategy};
