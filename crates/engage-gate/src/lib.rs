pub mod gate;
pub mod region;

pub use gate::{quota_window_start, EligibilityGate, EligibilityInputs};
pub use region::{BlockedRegion, RegionPolicy};
