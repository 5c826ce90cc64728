//! Bidirectional byte relay between two duplex streams.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::pool::BufferPool;

/// Bytes moved in each direction by one pairing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// left → right
    pub up: u64,
    /// right → left
    pub down: u64,
    /// The second direction was cut off by the linger deadline.
    pub lingered_out: bool,
}

/// Copy bytes both ways until both directions finish.
///
/// Each direction half-closes its destination on EOF. Once one direction
/// ends, the other gets `linger` to drain whatever is still in flight before
/// it is abandoned. Both streams are dropped on return.
pub async fn relay<L, R>(left: L, right: R, pool: &BufferPool, linger: Duration) -> RelayStats
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (mut left_rd, mut left_wr) = tokio::io::split(left);
    let (mut right_rd, mut right_wr) = tokio::io::split(right);

    let up_bytes = AtomicU64::new(0);
    let down_bytes = AtomicU64::new(0);

    let up = copy_half(&mut left_rd, &mut right_wr, pool, &up_bytes);
    let down = copy_half(&mut right_rd, &mut left_wr, pool, &down_bytes);
    tokio::pin!(up, down);

    let finished_in_time = tokio::select! {
        _ = &mut up => tokio::time::timeout(linger, &mut down).await.is_ok(),
        _ = &mut down => tokio::time::timeout(linger, &mut up).await.is_ok(),
    };

    RelayStats {
        up: up_bytes.load(Ordering::Relaxed),
        down: down_bytes.load(Ordering::Relaxed),
        lingered_out: !finished_in_time,
    }
}

/// One direction: read into a pooled buffer, write out, repeat until EOF or
/// error, then shut down the write side.
async fn copy_half<S, D>(src: &mut S, dst: &mut D, pool: &BufferPool, total: &AtomicU64)
where
    S: AsyncRead + Unpin,
    D: AsyncWrite + Unpin,
{
    let mut buf = pool.get();
    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "relay read ended");
                break;
            }
        };
        if let Err(e) = dst.write_all(&buf[..n]).await {
            tracing::debug!(error = %e, "relay write ended");
            break;
        }
        total.fetch_add(n as u64, Ordering::Relaxed);
    }
    let _ = dst.shutdown().await;
}
