//! Deferred work: draining the engine's job queue and running jobs in the
//! background of a scenario.

mod background;
mod drainer;

pub use background::{BackgroundHandle, BackgroundScheduler};
pub use drainer::{DrainOutcome, DrainSettings, JobDrainer, Pause, ThreadPause};
