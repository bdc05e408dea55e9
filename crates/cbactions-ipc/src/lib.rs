//! Framed IPC channel between the bridge and the agent process.
//!
//! One payload travels parent → child over an inherited pipe as a single
//! [`frame`]. A second pipe carries the child's output back, relayed to the
//! parent's stdout.

pub mod frame;

#[cfg(unix)]
pub mod agent;
#[cfg(unix)]
pub mod pipe;

pub use frame::{read_frame, write_frame, FramedMessage, MessageType, MAX_FRAME_LEN};

#[cfg(unix)]
pub use agent::{spawn_agent, AgentCommand, AgentExit, AgentProcess, AGENT_INPUT_FD, AGENT_OUTPUT_FD};
#[cfg(unix)]
pub use pipe::{inherited_fd, Pipe};
