//! Reconciliation of series subscriptions: the per-subscription state machine, the
//! call policies guarding external collaborators and the driver that fans a run out.

mod driver;
mod engine;
mod error;
mod policy;
mod report;
mod shutdown;

pub use driver::{RunDriver, DEFAULT_CONCURRENCY};
pub use engine::{assess, Assessment, ReconciliationEngine};
pub use error::{RunError, RunResult};
pub use policy::{CallPolicy, Delivery};
pub use report::{ReconcileStage, RunSummary, SubscriptionReport};
pub use shutdown::ShutdownSignal;
