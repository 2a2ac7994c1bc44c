// Progress/health aggregation engine
//
// Three pure stages over an in-memory snapshot (stage aggregator, flow
// aggregator, lifecycle classifier) plus the store contract and the
// read-compute-write orchestration that ties them together.

pub mod stage;
pub mod flow;
pub mod lifecycle;
pub mod store;
pub mod engine;

pub use stage::*;
pub use flow::*;
pub use lifecycle::*;
pub use store::*;
pub use engine::*;
