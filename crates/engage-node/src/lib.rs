pub mod api;
pub mod api_sse;
pub mod config;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod node;

pub use config::NodeConfig;
pub use events::{EventBus, EventPriority, LiveEvent};
pub use metrics::Metrics;
pub use node::{EngageNode, NodeStats};
