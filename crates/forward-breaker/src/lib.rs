//! Circuit breaking for the forwarder: C2 (per-provider/per-endpoint breakers) and
//! C3 (the coarser vendor-type breaker). See `forward_core::BreakerTuning` for the
//! threshold/duration knobs shared by both.

mod events;
mod registry;
mod state;
mod vendor_type;

pub use events::{BreakerEvent, BreakerEventKind};
pub use registry::BreakerRegistry;
pub use state::{BreakerSnapshot, BreakerState, CircuitState};
pub use vendor_type::{AllTimeoutsTracker, TrackerScratch, VendorTypeBreaker, VendorTypeKey};
