//! Anonymous pipes and inherited descriptors.

use std::fs::File;
use std::os::fd::{FromRawFd, RawFd};
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use std::os::fd::OwnedFd;

use cbactions_core::{BridgeError, Result};

/// One unidirectional pipe. Both ends are close-on-exec; the agent spawner
/// duplicates the child's ends onto fixed descriptor numbers explicitly.
#[derive(Debug)]
pub struct Pipe {
    pub reader: File,
    pub writer: File,
}

impl Pipe {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn new() -> Result<Self> {
        use nix::fcntl::OFlag;
        let (reader, writer) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| BridgeError::io("creating pipe", e.into()))?;
        Ok(Self {
            reader: File::from(reader),
            writer: File::from(writer),
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn new() -> Result<Self> {
        let (reader, writer) = nix::unistd::pipe()
            .map_err(|e| BridgeError::io("creating pipe", e.into()))?;
        set_cloexec(&reader)?;
        set_cloexec(&writer)?;
        Ok(Self {
            reader: File::from(reader),
            writer: File::from(writer),
        })
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(fd: &OwnedFd) -> Result<()> {
    use std::os::fd::AsRawFd;
    // SAFETY: fd is a valid descriptor owned by the caller.
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) };
    if rc == -1 {
        return Err(BridgeError::io(
            "marking pipe close-on-exec",
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

/// Take ownership of a descriptor inherited from the parent process.
///
/// Fails with a `Config` error if `fd` is not open, so a wrong number on the
/// command line never turns into a read from some unrelated file.
pub fn inherited_fd(fd: RawFd) -> Result<File> {
    if fd < 0 {
        return Err(BridgeError::Config(format!("invalid descriptor {}", fd)));
    }
    // SAFETY: F_GETFD only queries the descriptor table.
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
        return Err(BridgeError::Config(format!(
            "descriptor {} is not open: {}",
            fd,
            std::io::Error::last_os_error()
        )));
    }
    // SAFETY: the descriptor is open and, by the spawn contract, handed to
    // this process for its exclusive use.
    Ok(unsafe { File::from_raw_fd(fd) })
}
