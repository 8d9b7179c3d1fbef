use std::{io, process::Stdio};

use atro_config::WorkerCommand;
use atro_model::{Agent, AgentId};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
};
use tracing::info;

/// Incremental line assembly over a byte stream.
///
/// Lines are split on `\n` at the byte level and decoded lossily, so a
/// multi-byte character split across reads or invalid UTF-8 never stalls
/// the reader. Trailing `\r` is dropped and blank lines are skipped.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::with_capacity(1024),
        }
    }

    /// Next non-blank line, or `None` at end of stream.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            self.buf.clear();
            let read = self.reader.read_until(b'\n', &mut self.buf).await?;
            if read == 0 {
                return Ok(None);
            }
            let decoded = String::from_utf8_lossy(&self.buf);
            let line = decoded.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }
}

/// Launch the worker program for `agent` with piped stdout and stderr.
pub(crate) fn spawn(
    command: &WorkerCommand,
    agent: &Agent,
    redis_url: Option<&str>,
) -> io::Result<Child> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env("AGENT_ID", agent.id.to_string())
        .env("AGENT_NAME", &agent.name)
        // Python block-buffers a piped stdout; events must arrive per line.
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(url) = redis_url {
        cmd.env("REDIS_URL", url);
    }
    cmd.spawn()
}

/// Forward stderr to the log; it never produces domain events.
pub(crate) async fn pump_stderr<R: AsyncRead + Unpin>(
    agent_id: AgentId,
    agent_name: String,
    stderr: R,
) {
    let mut lines = LineReader::new(stderr);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(target: "worker", agent_id = %agent_id, agent = %agent_name, "{line}");
            }
            Ok(None) => break,
            Err(err) => {
                info!(target: "worker", agent_id = %agent_id, error = %err, "stderr closed");
                break;
            }
        }
    }
}

/// Ask the process to exit. A process that is already gone is not an error.
#[cfg(unix)]
pub(crate) fn request_termination(pid: u32) -> Result<(), String> {
    use nix::{
        errno::Errno,
        sys::signal::{Signal, kill},
        unistd::Pid,
    };

    let raw = i32::try_from(pid).map_err(|_| format!("pid {pid} out of range"))?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err.to_string()),
    }
}

/// No graceful signal off unix; the grace period elapses and the process
/// is killed.
#[cfg(not(unix))]
pub(crate) fn request_termination(_pid: u32) -> Result<(), String> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn assembles_lines_across_partial_writes() {
        let (mut tx, rx) = tokio::io::duplex(8);
        let writer = tokio::spawn(async move {
            for chunk in [
                &b"{\"type\":\"lo"[..],
                b"g\",\"level\":\"info\",",
                b"\"message\":\"caf\xc3",
                b"\xa9\"}\r\n\n",
                b"tail without newline",
            ] {
                tx.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut lines = LineReader::new(rx);
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("{\"type\":\"log\",\"level\":\"info\",\"message\":\"café\"}")
        );
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("tail without newline")
        );
        writer.await.unwrap();
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_fatal() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(b"bad \xff byte\nnext\n").await.unwrap();
        drop(tx);

        let mut lines = LineReader::new(rx);
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("bad \u{fffd} byte")
        );
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("next"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
