//! Supervisor side: resource allocation, worker spawn, lifecycle.
//!
//! `establish` allocates both directions' descriptors, forks the worker with
//! a pre-exec handoff manifest that pins them to the fixed ordinals, then
//! waits for the worker's capacity hello before returning the link. The
//! parent keeps its own descriptors and mappings; the child's copies are
//! remapped and the originals closed before exec.

use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::channel::{RecvChannel, SendChannel};
use crate::doorbell::Doorbell;
use crate::endpoint::Endpoint;
use crate::error::{ChannelError, EstablishError};
use crate::handoff::HandoffManifest;
use crate::shm::SharedBuffer;

/// A running worker and the supervisor's endpoint to it.
///
/// Closing consumes the link: channels are torn down, the worker is signaled
/// and reaped. Drop does the same for links abandoned without an explicit
/// close, so the worker never outlives the supervisor as an orphan.
#[derive(Debug)]
pub struct ProcessLink {
    worker_path: PathBuf,
    child: Option<Child>,
    endpoint: Endpoint,
}

impl ProcessLink {
    pub fn worker_path(&self) -> &Path {
        &self.worker_path
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    pub fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    /// Send one frame to the worker.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.endpoint.send(bytes)
    }

    /// Receive one frame from the worker.
    pub fn receive(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.endpoint.receive()
    }

    /// Tear down both channels, request worker termination, and reap it.
    ///
    /// Tolerates a worker that already exited; the process table entry is
    /// reclaimed exactly once.
    pub fn close(mut self) -> io::Result<ExitStatus> {
        let child = self
            .child
            .take()
            .expect("child is only taken by close/drop, and close consumes self");
        reap(child)
    }
}

impl Drop for ProcessLink {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            tracing::debug!(pid = child.id(), "link dropped without close, reaping worker");
            if let Err(e) = reap(child) {
                tracing::warn!(error = %e, "failed to reap worker on drop");
            }
        }
    }
}

fn reap(mut child: Child) -> io::Result<ExitStatus> {
    let pid = Pid::from_raw(child.id() as i32);
    match kill(pid, Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
    }
    let status = child.wait()?;
    tracing::debug!(%pid, %status, "worker reaped");
    Ok(status)
}

/// Spawn `worker_path` and establish the bidirectional channel to it.
///
/// The worker is invoked with `--capacity <n> --fds 3,4,5,6,7,8`; the fd list
/// is informational (the numbering is the compile-time contract), the
/// capacity is the size parameter both sides must agree on. Establishment
/// blocks until the worker's first frame, an 8-byte little-endian echo of the
/// capacity it mapped, and fails on a mismatch rather than letting the two
/// sides silently truncate each other's frames.
///
/// `capacity` must be at least [`crate::MIN_CAPACITY`] so the hello frame
/// fits. Rejecting smaller values here matters: a worker whose `bind` cannot
/// send the hello exits without ever ringing the doorbell, and an eventfd
/// read does not return end-of-stream when its peer dies, so the handshake
/// wait would otherwise never return.
pub fn establish(
    worker_path: impl AsRef<Path>,
    capacity: usize,
) -> Result<ProcessLink, EstablishError> {
    if capacity < crate::MIN_CAPACITY {
        return Err(EstablishError::CapacityTooSmall(capacity));
    }
    let worker_path = worker_path.as_ref().to_path_buf();

    // Supervisor -> worker direction (the worker's inbound).
    let down_signal = Doorbell::create()?;
    let down_ack = Doorbell::create()?;
    let down_buffer = SharedBuffer::create(capacity)?;

    // Worker -> supervisor direction (the worker's outbound).
    let up_signal = Doorbell::create()?;
    let up_ack = Doorbell::create()?;
    let up_buffer = SharedBuffer::create(capacity)?;

    let manifest = HandoffManifest::new([
        down_signal.as_raw_fd(),
        down_ack.as_raw_fd(),
        down_buffer.as_raw_fd(),
        up_signal.as_raw_fd(),
        up_ack.as_raw_fd(),
        up_buffer.as_raw_fd(),
    ]);

    let mut cmd = Command::new(&worker_path);
    cmd.arg("--capacity")
        .arg(capacity.to_string())
        .arg("--fds")
        .arg(HandoffManifest::target_args())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    // Safety: the manifest only issues dup/dup2/close on descriptors created
    // above, all still open when the child runs; a failing remap aborts the
    // child via the pre_exec error path.
    unsafe {
        cmd.pre_exec(move || manifest.apply());
    }

    tracing::debug!(path = %worker_path.display(), capacity, "spawning worker");
    let child = cmd.spawn().map_err(EstablishError::Spawn)?;
    tracing::debug!(pid = child.id(), "worker spawned");

    let endpoint = Endpoint::new(
        RecvChannel::new(up_signal, up_ack, up_buffer),
        SendChannel::new(down_signal, down_ack, down_buffer),
    );

    let mut link = ProcessLink {
        worker_path,
        child: Some(child),
        endpoint,
    };

    // Capacity handshake: the worker's first frame echoes the capacity it
    // mapped. Catches an out-of-band disagreement before any real frame can
    // be silently truncated, and doubles as the worker-ready barrier.
    let hello = link.receive().map_err(EstablishError::Handshake)?;
    let theirs = u64::from_le_bytes(
        hello
            .as_slice()
            .try_into()
            .map_err(|_| EstablishError::MalformedHello(hello.len()))?,
    );
    if theirs != capacity as u64 {
        return Err(EstablishError::CapacityMismatch {
            ours: capacity as u64,
            theirs,
        });
    }

    tracing::debug!(capacity, "worker link established");
    Ok(link)
}
