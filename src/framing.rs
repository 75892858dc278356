//! Length-prefixed frame reading for the secondary state stream
//!
//! The robot pushes state frames continuously whether or not anyone reads
//! them, so this module provides both deadline-bounded frame reads and a
//! stale-frame drain that discards the backlog before a fresh read.

use crate::codec;
use crate::error::{CellError, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Sane bounds on a declared state-frame length. Anything outside is stream
/// corruption, not data; the cap keeps a corrupt prefix from driving an
/// unbounded allocation.
pub const MIN_FRAME_LEN: i32 = 10;
pub const MAX_FRAME_LEN: i32 = 20000;

/// Buffered-byte threshold under which the drain considers the socket queue
/// caught up. State frames run around a kilobyte.
pub const STALE_BYTES_THRESHOLD: usize = 512;

/// Per-attempt deadline while draining the backlog.
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(40);

/// One length-prefixed state frame: the 4-byte big-endian total length
/// (which includes itself) followed by the payload.
#[derive(Debug, Clone)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn total_length(&self) -> usize {
        self.0.len()
    }

    /// Everything after the 4-byte length prefix.
    pub fn payload(&self) -> &[u8] {
        &self.0[4..]
    }
}

/// Read exactly one frame from the stream, with `deadline` bounding the
/// whole accumulation. Partial socket reads are retried until the frame is
/// complete; a zero-byte read means the robot closed the connection.
pub async fn read_frame<R>(stream: &mut R, deadline: Duration) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    read_exact_deadline(stream, &mut header, deadline).await?;

    let declared = codec::read_i32(&header, 0)
        .ok_or_else(|| CellError::Protocol("frame header underrun".into()))?;
    if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&declared) {
        return Err(CellError::CorruptFrame(declared));
    }

    let mut frame = vec![0u8; declared as usize];
    frame[..4].copy_from_slice(&header);
    read_exact_deadline(stream, &mut frame[4..], deadline).await?;

    Ok(Frame(frame))
}

async fn read_exact_deadline<R>(stream: &mut R, buf: &mut [u8], deadline: Duration) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let start = Instant::now();
    let mut filled = 0;

    while filled < buf.len() {
        let remaining = deadline
            .checked_sub(start.elapsed())
            .ok_or(CellError::Timeout)?;

        let read = timeout(remaining, stream.read(&mut buf[filled..]))
            .await
            .map_err(|_| CellError::Timeout)??;

        if read == 0 {
            return Err(CellError::Disconnected);
        }
        filled += read;
    }

    Ok(())
}

/// Discard whole frames already buffered on the socket so the next read
/// returns the freshest state.
///
/// Keeps reading while the time spent is under `budget` and the socket still
/// holds roughly a frame's worth of bytes. Stops silently the moment a peek
/// or read misses; a short drain is not an error, it just means the next
/// frame may be slightly stale.
pub async fn drain_stale(stream: &mut TcpStream, budget: Duration) {
    let start = Instant::now();
    let mut probe = [0u8; STALE_BYTES_THRESHOLD];
    let mut discarded = 0usize;

    while start.elapsed() < budget {
        let buffered = match timeout(DRAIN_READ_TIMEOUT, stream.peek(&mut probe)).await {
            Ok(Ok(n)) => n,
            _ => break,
        };
        if buffered < STALE_BYTES_THRESHOLD {
            break;
        }

        match read_frame(stream, DRAIN_READ_TIMEOUT).await {
            Ok(frame) => discarded += frame.total_length(),
            Err(_) => break,
        }
    }

    if discarded > 0 {
        debug!("Drained {} bytes of stale frames", discarded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn frame_bytes(payload: &[u8]) -> Vec<u8> {
        let total = payload.len() as i32 + 4;
        let mut bytes = total.to_be_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn reads_complete_frame() {
        let (mut writer, mut reader) = tokio::io::duplex(4096);
        let payload = vec![7u8; 20];
        writer.write_all(&frame_bytes(&payload)).await.unwrap();

        let frame = read_frame(&mut reader, Duration::from_millis(200))
            .await
            .expect("frame");
        assert_eq!(frame.total_length(), 24);
        assert_eq!(frame.payload(), &payload[..]);
    }

    #[tokio::test]
    async fn tolerates_short_reads() {
        let (mut writer, mut reader) = tokio::io::duplex(4096);
        let bytes = frame_bytes(&[1u8; 40]);

        let writer_task = tokio::spawn(async move {
            for chunk in bytes.chunks(7) {
                writer.write_all(chunk).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let frame = read_frame(&mut reader, Duration::from_secs(2))
            .await
            .expect("frame");
        assert_eq!(frame.total_length(), 44);
        writer_task.await.unwrap();
    }

    #[tokio::test]
    async fn rejects_declared_length_outside_bounds() {
        for declared in [0i32, 9, 20001, -5] {
            let (mut writer, mut reader) = tokio::io::duplex(64);
            writer.write_all(&declared.to_be_bytes()).await.unwrap();

            let err = read_frame(&mut reader, Duration::from_millis(100))
                .await
                .expect_err("corrupt length");
            assert!(matches!(err, CellError::CorruptFrame(d) if d == declared));
        }
    }

    #[tokio::test]
    async fn closed_stream_reports_disconnect() {
        let (writer, mut reader) = tokio::io::duplex(64);
        drop(writer);

        let err = read_frame(&mut reader, Duration::from_millis(100))
            .await
            .expect_err("disconnect");
        assert!(matches!(err, CellError::Disconnected));
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let (_writer, mut reader) = tokio::io::duplex(64);

        let start = std::time::Instant::now();
        let err = read_frame(&mut reader, Duration::from_millis(50))
            .await
            .expect_err("timeout");
        assert!(matches!(err, CellError::Timeout));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn drain_is_bounded_by_budget_against_endless_producer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Producer that never stops writing frames.
        let producer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let bytes = frame_bytes(&[0u8; 1020]);
            loop {
                if sock.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        // Let a backlog build up.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let budget = Duration::from_millis(200);
        let start = std::time::Instant::now();
        drain_stale(&mut client, budget).await;
        assert!(
            start.elapsed() < budget + Duration::from_millis(500),
            "drain overran its budget: {:?}",
            start.elapsed()
        );

        // The stream is still frame-aligned after draining.
        let frame = read_frame(&mut client, Duration::from_secs(1))
            .await
            .expect("aligned frame after drain");
        assert_eq!(frame.total_length(), 1024);

        producer.abort();
    }

    #[tokio::test]
    async fn drain_on_quiet_stream_returns_quickly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            // Hold the connection open without writing.
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(sock);
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let start = std::time::Instant::now();
        drain_stale(&mut client, Duration::from_secs(2)).await;
        // Nothing buffered, so the first peek deadline ends the drain.
        assert!(start.elapsed() < Duration::from_millis(500));

        server.abort();
    }
}
