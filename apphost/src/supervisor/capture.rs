//! Output capture loops
//!
//! One independent task per stream, so a stalled stdout never blocks stderr
//! and vice versa. Lines from one stream reach the fan-out in order. Lines
//! longer than [`MAX_LINE_BYTES`] are split into several entries.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::fanout::LogFanout;
use crate::models::log::Stream;

/// Longest log entry a single line of output produces
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// Forward every line of `reader` to the fan-out until EOF
pub fn spawn_capture<R>(reader: R, stream: Stream, app_id: String, fanout: Arc<LogFanout>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        // Set while the previous entry was cut off at the length limit
        let mut split = false;

        loop {
            buf.clear();
            let read = (&mut reader)
                .take(MAX_LINE_BYTES as u64)
                .read_until(b'\n', &mut buf)
                .await;
            match read {
                Ok(0) => break,
                Ok(_) => {
                    let terminated = buf.ends_with(b"\n");
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if std::mem::replace(&mut split, !terminated) && line.is_empty() {
                        continue;
                    }
                    if let Err(e) = fanout.publish(&app_id, stream.severity(), line).await {
                        warn!(app_id = %app_id, "Failed to persist log line: {}", e);
                    }
                }
                Err(e) => {
                    warn!(app_id = %app_id, stream = ?stream, "Output capture failed: {}", e);
                    break;
                }
            }
        }

        debug!(app_id = %app_id, stream = ?stream, "Output capture finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::logs::LogRepository;
    use crate::store::memory::MemoryStore;
    use std::io::Cursor;
    use std::time::Duration;

    #[tokio::test]
    async fn test_long_line_is_split() {
        let store = Arc::new(MemoryStore::new());
        let fanout = Arc::new(LogFanout::new(LogRepository::new(store, Duration::from_secs(60)), 10));

        let mut output = vec![b'a'; 2 * MAX_LINE_BYTES + 100];
        output.extend_from_slice(b"\nshort\r\n");
        output.extend(vec![b'b'; MAX_LINE_BYTES]);
        output.extend_from_slice(b"\n\n");
        spawn_capture(Cursor::new(output), Stream::Stdout, "app".into(), fanout.clone())
            .await
            .unwrap();

        let mut entries = fanout.recent("app", 10).await.unwrap();
        entries.reverse();
        let lengths: Vec<usize> = entries.iter().map(|entry| entry.message.len()).collect();
        // The newline right after a full-length chunk ends it; the blank line after that is kept
        assert_eq!(lengths, vec![MAX_LINE_BYTES, MAX_LINE_BYTES, 100, 5, MAX_LINE_BYTES, 0]);
        assert_eq!(entries[3].message, "short");
    }

    #[tokio::test]
    async fn test_unterminated_output_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        let fanout = Arc::new(LogFanout::new(LogRepository::new(store, Duration::from_secs(60)), 10));

        let output = vec![b'x'; 3 * MAX_LINE_BYTES];
        spawn_capture(Cursor::new(output), Stream::Stderr, "app".into(), fanout.clone())
            .await
            .unwrap();

        let entries = fanout.recent("app", 10).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|entry| entry.message.len() == MAX_LINE_BYTES));
    }
}
