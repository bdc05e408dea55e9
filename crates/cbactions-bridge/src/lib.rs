//! Bridge orchestrator.
//!
//! Two state machines drive one crossing:
//! - [`OutsideBridge`] seals the job to a one-time identity and submits it
//!   to a remote [`JobService`], then waits for the exported exit code.
//! - [`InsideBridge`] runs on the job host, opens the envelopes, places the
//!   credential files and hands the payload to the agent.

pub mod bundle;
pub mod crossing;
#[cfg(unix)]
pub mod inside;
pub mod job;
pub mod outside;

pub use bundle::FileBundle;
pub use crossing::{InsideStage, OutsideStage, Side};
#[cfg(unix)]
pub use inside::InsideBridge;
pub use job::{
    exported_exit_code, wait_for_completion, EnvOverride, JobHandle, JobPhase, JobRequest,
    JobService, JobStatus,
};
pub use outside::OutsideBridge;
