//! Spawning the agent with the IPC pipes on fixed descriptors.
//!
//! The agent is invoked as `<program> spawnclient 3 4`: it reads one frame
//! from fd 3 and writes its output to fd 4. Stdout and stderr are inherited.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use cbactions_core::{BridgeError, Result};

use crate::frame::{write_frame, MessageType};
use crate::pipe::Pipe;

/// Descriptor the agent reads the job frame from.
pub const AGENT_INPUT_FD: RawFd = 3;
/// Descriptor the agent writes its output to.
pub const AGENT_OUTPUT_FD: RawFd = 4;

/// How long to wait for the output relay to drain after the agent exits.
/// A grandchild still holding fd 4 would otherwise block forever.
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// What to run as the agent.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub workdir: Option<PathBuf>,
    pub envs: Vec<(OsString, OsString)>,
}

impl AgentCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

/// A running agent with the parent ends of its pipes.
pub struct AgentProcess {
    child: Child,
    to_agent: Option<File>,
    relay_done: mpsc::Receiver<io::Result<u64>>,
    started: Instant,
}

/// Spawn `command` with fresh pipes on fds 3 and 4, relaying fd 4 to `relay_to`.
pub fn spawn_agent(command: &AgentCommand, relay_to: Box<dyn Write + Send>) -> Result<AgentProcess> {
    let input = Pipe::new()?;
    let output = Pipe::new()?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(ref dir) = command.workdir {
        cmd.current_dir(dir);
    }
    for (k, v) in &command.envs {
        cmd.env(k, v);
    }

    let child_in = input.reader.as_raw_fd();
    let child_out = output.writer.as_raw_fd();
    // SAFETY: only async-signal-safe libc calls run between fork and exec.
    unsafe {
        cmd.pre_exec(move || {
            // Move both ends clear of 3 and 4 first so neither dup2 clobbers
            // the other's source.
            let tmp_in = libc::fcntl(child_in, libc::F_DUPFD_CLOEXEC, 10);
            if tmp_in == -1 {
                return Err(io::Error::last_os_error());
            }
            let tmp_out = libc::fcntl(child_out, libc::F_DUPFD_CLOEXEC, 10);
            if tmp_out == -1 {
                return Err(io::Error::last_os_error());
            }
            if libc::dup2(tmp_in, AGENT_INPUT_FD) == -1
                || libc::dup2(tmp_out, AGENT_OUTPUT_FD) == -1
            {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(|e| {
        BridgeError::io(format!("spawning agent {}", command.program.display()), e)
    })?;
    tracing::info!(
        program = %command.program.display(),
        pid = child.id(),
        "agent started"
    );

    // Close the child's ends here so EOF propagates in both directions.
    drop(input.reader);
    drop(output.writer);
    let to_agent = input.writer;
    let mut from_agent = output.reader;

    let (tx, relay_done) = mpsc::channel();
    let mut sink = relay_to;
    thread::spawn(move || {
        let copied = io::copy(&mut from_agent, &mut sink).and_then(|n| sink.flush().map(|_| n));
        let _ = tx.send(copied);
    });

    Ok(AgentProcess {
        child,
        to_agent: Some(to_agent),
        relay_done,
        started: Instant::now(),
    })
}

impl AgentProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Write the payload frame and close the agent's input.
    ///
    /// Only one payload is ever delivered; a second call is a `Protocol` error.
    pub fn send_payload(&mut self, payload: &str) -> Result<()> {
        let mut writer = self
            .to_agent
            .take()
            .ok_or_else(|| BridgeError::Protocol("payload already delivered".to_string()))?;
        write_frame(&mut writer, MessageType::NewJobRequest, payload)?;
        drop(writer);
        tracing::debug!(pid = self.child.id(), "payload forwarded to agent");
        Ok(())
    }

    /// Wait for the agent to exit and its output relay to drain.
    pub fn wait(mut self) -> Result<AgentExit> {
        // Unsent input must not keep the agent blocked on fd 3.
        self.to_agent.take();
        self.reap()
    }

    /// Kill the agent and reap it. Used when the crossing fails after spawn.
    pub fn abort(mut self) -> Result<AgentExit> {
        self.to_agent.take();
        if let Err(e) = self.child.kill() {
            // InvalidInput: the child already exited and is waiting to be reaped.
            if e.kind() != io::ErrorKind::InvalidInput {
                return Err(BridgeError::io("killing agent", e));
            }
        }
        tracing::warn!(pid = self.child.id(), "agent killed");
        self.reap()
    }

    fn reap(mut self) -> Result<AgentExit> {
        let status = self
            .child
            .wait()
            .map_err(|e| BridgeError::io("waiting for agent", e))?;
        let duration = self.started.elapsed();

        match self.relay_done.recv_timeout(RELAY_DRAIN_TIMEOUT) {
            Ok(Ok(bytes)) => tracing::debug!(bytes, "agent output relayed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "agent output relay failed"),
            Err(_) => tracing::warn!("agent output relay still open after exit; detaching"),
        }
        tracing::info!(status = %status, duration_ms = duration.as_millis() as u64, "agent exited");
        Ok(AgentExit { status, duration })
    }
}

/// Outcome of a finished agent process.
#[derive(Debug, Clone, Copy)]
pub struct AgentExit {
    pub status: ExitStatus,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::read_frame;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sh(script: &str) -> AgentCommand {
        AgentCommand::new("/bin/sh").arg("-c").arg(script)
    }

    #[test]
    fn test_agent_receives_frame_on_fd3() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frame.bin");
        let cmd = sh("cat <&3 > \"$OUT\"; exit 101").env("OUT", &out);

        let mut agent = spawn_agent(&cmd, Box::new(io::sink())).unwrap();
        agent.send_payload("echo hi").unwrap();
        let exit = agent.wait().unwrap();

        assert_eq!(exit.status.code(), Some(101));
        let bytes = std::fs::read(&out).unwrap();
        let msg = read_frame(&mut bytes.as_slice()).unwrap();
        assert_eq!(msg.kind, MessageType::NewJobRequest);
        assert_eq!(msg.body.as_str(), "echo hi");
    }

    #[test]
    fn test_fd4_output_is_relayed() {
        let buf = SharedBuf::default();
        let cmd = sh("cat <&3 >/dev/null; printf 'job log' >&4; exit 100");
        let mut agent = spawn_agent(&cmd, Box::new(buf.clone())).unwrap();
        agent.send_payload("x").unwrap();
        assert_eq!(agent.wait().unwrap().status.code(), Some(100));
        assert_eq!(buf.0.lock().unwrap().as_slice(), b"job log");
    }

    #[test]
    fn test_workdir_and_env_applied() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("seen.txt");
        let cmd = sh("printf '%s|%s' \"$(pwd)\" \"$CBA_PATH_SUBSTITUTION\" > \"$OUT\"; exit 102")
            .current_dir(dir.path())
            .env("OUT", &out)
            .env("CBA_PATH_SUBSTITUTION", "/tmp/inst");
        let agent = spawn_agent(&cmd, Box::new(io::sink())).unwrap();
        assert_eq!(agent.wait().unwrap().status.code(), Some(102));

        let seen = std::fs::read_to_string(&out).unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(seen, format!("{}|/tmp/inst", canonical.display()));
    }

    #[test]
    fn test_payload_delivered_once() {
        let mut agent = spawn_agent(&sh("cat <&3 >/dev/null; exit 100"), Box::new(io::sink())).unwrap();
        agent.send_payload("a").unwrap();
        assert!(matches!(agent.send_payload("b"), Err(BridgeError::Protocol(_))));
        agent.wait().unwrap();
    }

    #[test]
    fn test_wait_without_payload_sees_eof() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frame.bin");
        let cmd = sh("cat <&3 > \"$OUT\"; exit 103").env("OUT", &out);
        let agent = spawn_agent(&cmd, Box::new(io::sink())).unwrap();
        assert_eq!(agent.wait().unwrap().status.code(), Some(103));
        assert!(std::fs::read(&out).unwrap().is_empty());
    }

    #[test]
    fn test_abort_after_failed_send_reaps_agent() {
        use std::os::unix::process::ExitStatusExt;

        // Agent drops its input and lingers; the frame cannot fit in the pipe buffer.
        let mut agent = spawn_agent(&sh("exec 3<&-; exec sleep 30"), Box::new(io::sink())).unwrap();
        let payload = "x".repeat(200_000);
        let err = agent.send_payload(&payload).unwrap_err();
        assert!(matches!(err, BridgeError::Io { .. }), "{err}");

        let started = Instant::now();
        let exit = agent.abort().unwrap();
        assert_eq!(exit.status.signal(), Some(libc::SIGKILL));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_abort_after_exit_still_reaps() {
        let agent = spawn_agent(&sh("exit 104"), Box::new(io::sink())).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        let exit = agent.abort().unwrap();
        assert!(exit.status.code() == Some(104) || exit.status.code().is_none());
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let err = spawn_agent(&AgentCommand::new("/nonexistent/agent"), Box::new(io::sink()))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Io { .. }));
    }
}
