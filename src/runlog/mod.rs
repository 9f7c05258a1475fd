pub mod logger;
pub mod record;
pub mod replay;

pub use logger::SessionRunLogger;
pub use record::{LoggedEvent, RunEvent, RunId, RunRecord, RunSummary, StopReason};
pub use replay::{load_events, load_summary, load_transcript, replay_events};
