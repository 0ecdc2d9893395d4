use std::{
    io::{BufRead, BufReader, Read, Write},
    process::ChildStdin,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender},
        Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, instrument, trace, warn};

use super::{ChannelError, SandboxChannel, LINE_QUEUE_CAPACITY, MAX_LINE_BYTES};
use crate::cgroup_manager::LimitedProcess;

const KILL_TIMEOUT: Duration = Duration::from_millis(500);
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Resources a contained peer gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Memory limit in bytes. Non-positive means no restriction.
    pub max_memory: i64,
    /// CPUs in `taskset` list form.
    pub cpus: String,
}

struct Running {
    process: LimitedProcess,
    stdin: Option<Sender<String>>,
    workers: Vec<JoinHandle<()>>,
}

/// A peer running as a child process with piped stdio.
///
/// With [`SandboxLimits`] the child is pinned with `taskset` and placed in a fresh cgroup. If
/// that fails and uncontained execution is allowed, it falls back to a plain child process.
pub struct ProcessSandbox {
    label: String,
    command: String,
    args: Vec<String>,
    limits: Option<SandboxLimits>,
    allow_uncontained: bool,
    echo_stderr: bool,
    running: Mutex<Option<Running>>,
    stdout: Mutex<Option<Receiver<Line>>>,
    stderr: Mutex<Option<Receiver<Line>>>,
}

/// One framed line, or why the stream stopped being read.
type Line = Result<String, ChannelError>;

impl ProcessSandbox {
    pub fn new(label: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        ProcessSandbox {
            label: label.into(),
            command: command.into(),
            args,
            limits: None,
            allow_uncontained: false,
            echo_stderr: false,
            running: Mutex::new(None),
            stdout: Mutex::new(None),
            stderr: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    #[must_use]
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Also print every stderr line of the peer to the referee's stderr.
    #[must_use]
    pub fn with_echo_stderr(mut self, value: bool) -> Self {
        self.echo_stderr = value;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn launch(&self) -> anyhow::Result<LimitedProcess> {
        let Some(limits) = &self.limits else {
            return LimitedProcess::launch_without_container(&self.command, &self.args);
        };
        let mut args = vec!["--cpu-list".to_owned(), limits.cpus.clone(), self.command.clone()];
        args.extend(self.args.iter().cloned());
        match LimitedProcess::launch("taskset", &args, limits.max_memory, &limits.cpus) {
            Ok(process) => Ok(process),
            Err(e) if self.allow_uncontained => {
                warn!("{}: running uncontained ({e:#})", self.label);
                LimitedProcess::launch_without_container(&self.command, &self.args)
            }
            Err(e) => Err(e.context("could not launch contained peer (uncontained not allowed)")),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn recv_line(receiver: &Mutex<Option<Receiver<Line>>>, timeout: Duration) -> Line {
    let guard = receiver.lock().unwrap_or_else(|e| e.into_inner());
    let receiver = guard.as_ref().ok_or(ChannelError::NotStarted)?;
    receiver.recv_timeout(timeout).map_err(|e| match e {
        RecvTimeoutError::Timeout => ChannelError::Timeout,
        RecvTimeoutError::Disconnected => ChannelError::Closed,
    })?
}

/// Forwards each line of `stream` until EOF or until nobody listens anymore.
///
/// At most [`LINE_QUEUE_CAPACITY`] lines wait in `tx`; past that the reader stops reading and
/// the peer blocks on its full pipe. A line over [`MAX_LINE_BYTES`] is reported once and ends
/// the stream.
fn spawn_reader(
    name: String,
    stream: impl Read + Send + 'static,
    tx: SyncSender<Line>,
    echo: bool,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name.clone()).spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let limit = MAX_LINE_BYTES as u64 + 1;
            match (&mut reader).take(limit).read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) if buf.len() > MAX_LINE_BYTES && buf.last() != Some(&b'\n') => {
                    debug!("{name}: line over {MAX_LINE_BYTES} bytes");
                    let _ = tx.send(Err(ChannelError::LineTooLong {
                        limit: MAX_LINE_BYTES,
                    }));
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_owned();
                    if echo {
                        eprintln!("[{name}] {line}");
                    }
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    trace!("{name}: read error {e}");
                    break;
                }
            }
        }
        trace!("{name}: reader done");
    })
}

/// Writes queued lines to the peer. Ends when the queue is dropped or the pipe breaks.
fn spawn_writer(
    name: String,
    mut stdin: ChildStdin,
    rx: Receiver<String>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name.clone()).spawn(move || {
        for line in rx {
            let res = stdin
                .write_all(line.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"))
                .and_then(|()| stdin.flush());
            if let Err(e) = res {
                debug!("{name}: write failed {e}");
                break;
            }
        }
    })
}

impl SandboxChannel for ProcessSandbox {
    #[instrument(skip(self), fields(peer = %self.label))]
    fn start(&mut self) -> Result<(), ChannelError> {
        let mut running = self.running();
        if running.is_some() {
            return Ok(());
        }
        let mut process = self.launch().map_err(ChannelError::Start)?;
        let pipes = (
            process.child.stdin.take(),
            process.child.stdout.take(),
            process.child.stderr.take(),
        );
        let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
            let _ = process.try_kill(KILL_TIMEOUT);
            return Err(ChannelError::Start(anyhow::anyhow!("peer has no piped stdio")));
        };

        let (in_tx, in_rx) = mpsc::channel();
        let (out_tx, out_rx) = mpsc::sync_channel(LINE_QUEUE_CAPACITY);
        let (err_tx, err_rx) = mpsc::sync_channel(LINE_QUEUE_CAPACITY);
        let workers = [
            spawn_writer(format!("{}-stdin", self.label), stdin, in_rx),
            spawn_reader(format!("{}-stdout", self.label), stdout, out_tx, false),
            spawn_reader(
                format!("{}-stderr", self.label),
                stderr,
                err_tx,
                self.echo_stderr,
            ),
        ]
        .into_iter()
        .collect::<std::io::Result<Vec<_>>>()
        .context("could not spawn pipe threads");
        let workers = match workers {
            Ok(workers) => workers,
            Err(e) => {
                let _ = process.try_kill(KILL_TIMEOUT);
                return Err(ChannelError::Start(e));
            }
        };

        debug!(pid = process.child.id(), contained = process.is_contained(), "peer started");
        *self.stdout.lock().unwrap_or_else(|e| e.into_inner()) = Some(out_rx);
        *self.stderr.lock().unwrap_or_else(|e| e.into_inner()) = Some(err_rx);
        *running = Some(Running {
            process,
            stdin: Some(in_tx),
            workers,
        });
        Ok(())
    }

    fn send(&self, line: &str) -> Result<(), ChannelError> {
        let running = self.running();
        let stdin = running
            .as_ref()
            .and_then(|r| r.stdin.as_ref())
            .ok_or(ChannelError::NotStarted)?;
        stdin
            .send(line.to_owned())
            .map_err(|_| ChannelError::Closed)
    }

    fn recv_output(&self, timeout: Duration) -> Result<String, ChannelError> {
        recv_line(&self.stdout, timeout)
    }

    fn recv_error(&self, timeout: Duration) -> Result<String, ChannelError> {
        recv_line(&self.stderr, timeout)
    }

    #[instrument(skip(self), fields(peer = %self.label))]
    fn destroy(&self) -> Result<(), ChannelError> {
        let Some(mut running) = self.running().take() else {
            return Ok(());
        };
        running.stdin = None;
        let killed = running.process.try_kill(KILL_TIMEOUT);
        // unblocks readers waiting on a full queue
        *self.stdout.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.stderr.lock().unwrap_or_else(|e| e.into_inner()) = None;

        // readers see EOF once the process is gone
        let deadline = Instant::now() + JOIN_TIMEOUT;
        for worker in running.workers {
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                warn!("pipe thread still running after {JOIN_TIMEOUT:?}, detaching it");
            }
        }
        trace!("peer destroyed");
        killed.map_err(|e| ChannelError::Io(std::io::Error::other(format!("{e:#}"))))
    }
}

impl Drop for ProcessSandbox {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            warn!("{}: could not destroy peer on drop: {e}", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> ProcessSandbox {
        ProcessSandbox::new("test", "sh", vec!["-c".to_owned(), script.to_owned()])
    }

    #[test]
    fn echoes_lines_back() {
        let mut peer = shell("while read line; do echo \"got $line\"; done");
        peer.start().unwrap();
        peer.send("hello").unwrap();
        assert_eq!(
            peer.recv_output(Duration::from_secs(5)).unwrap(),
            "got hello"
        );
        peer.destroy().unwrap();
        peer.destroy().unwrap();
    }

    #[test]
    fn stderr_is_a_separate_stream() {
        let mut peer = shell("echo oops >&2; sleep 5");
        peer.start().unwrap();
        assert_eq!(peer.recv_error(Duration::from_secs(5)).unwrap(), "oops");
        assert!(matches!(
            peer.recv_output(Duration::from_millis(50)),
            Err(ChannelError::Timeout)
        ));
    }

    #[test]
    fn exited_peer_reports_closed() {
        let mut peer = shell("exit 0");
        peer.start().unwrap();
        assert!(matches!(
            peer.recv_output(Duration::from_secs(5)),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn unstarted_peer_is_an_error() {
        let peer = shell("true");
        assert!(matches!(peer.send("x"), Err(ChannelError::NotStarted)));
        assert!(matches!(
            peer.recv_output(Duration::ZERO),
            Err(ChannelError::NotStarted)
        ));
    }

    #[test]
    fn oversized_line_ends_the_stream() {
        let mut peer = shell("head -c 2000000 /dev/zero | tr '\\0' a; echo; echo after");
        peer.start().unwrap();
        assert!(matches!(
            peer.recv_output(Duration::from_secs(5)),
            Err(ChannelError::LineTooLong {
                limit: MAX_LINE_BYTES
            })
        ));
        assert!(matches!(
            peer.recv_output(Duration::from_secs(5)),
            Err(ChannelError::Closed)
        ));
        peer.destroy().unwrap();
    }

    #[test]
    fn flooding_peer_waits_for_the_referee() {
        let mut peer = shell("yes '{}' | head -n 50000; echo done >&2");
        peer.start().unwrap();
        thread::sleep(Duration::from_millis(300));
        assert!(matches!(
            peer.recv_error(Duration::from_millis(100)),
            Err(ChannelError::Timeout)
        ));

        for _ in 0..50000 {
            assert_eq!(peer.recv_output(Duration::from_secs(5)).unwrap(), "{}");
        }
        assert_eq!(peer.recv_error(Duration::from_secs(5)).unwrap(), "done");
        peer.destroy().unwrap();
    }

    #[test]
    fn destroy_reaches_background_children() {
        let mut peer = shell("sleep 30 & echo ready; wait");
        peer.start().unwrap();
        assert_eq!(peer.recv_output(Duration::from_secs(5)).unwrap(), "ready");
        let started = Instant::now();
        peer.destroy().unwrap();
        assert!(started.elapsed() < JOIN_TIMEOUT);
    }

    #[test]
    fn missing_command_fails_to_start() {
        let mut peer = ProcessSandbox::new("ghost", "/nonexistent/peer", vec![]);
        assert!(matches!(peer.start(), Err(ChannelError::Start(_))));
    }
}
