//! Background readers that forward worker output to the log.
//!
//! Each pipe gets its own task so a chatty worker can never fill its pipe
//! buffer and stall, and the control loop never waits on worker output.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Spawn a reader that logs `reader` line by line until EOF or the first
/// read error. Resolves to the number of lines forwarded.
pub fn drain<R>(meeting_id: String, stream: OutputStream, reader: R) -> JoinHandle<usize>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut forwarded = 0;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    debug!(
                        "Worker {} for meeting {} closed",
                        stream.as_str(),
                        meeting_id
                    );
                    break;
                }
                Ok(_) => {
                    forwarded += 1;
                    // Worker output is free-form; bytes that are not UTF-8 are
                    // replaced rather than ending the stream.
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    match stream {
                        OutputStream::Stdout => {
                            info!(target: "meetbot::worker", meeting_id = %meeting_id, "{}", line)
                        }
                        OutputStream::Stderr => {
                            warn!(target: "meetbot::worker", meeting_id = %meeting_id, "{}", line)
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Stopped reading worker {} for meeting {}: {}",
                        stream.as_str(),
                        meeting_id,
                        e
                    );
                    break;
                }
            }
        }

        forwarded
    })
}
