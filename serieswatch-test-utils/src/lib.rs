//! Test doubles for serieswatch: an in-process IPEA server plus scripted collaborators.

mod ipea;
mod notifier;
mod source;

pub use ipea::{MockIpea, MockIpeaConfig, MockSeries};
pub use notifier::RecordingNotifier;
pub use source::ScriptedSource;
