use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use crate::path::StorageKey;
use crate::storage::{Result, StorageBackend, StorageError};

/// Reader that fails once its inner reader yields more than `limit` bytes.
///
/// Each read asks the inner reader for at most one byte past what is left,
/// so an oversized body is detected after `limit + 1` bytes without the
/// excess ever being handed to the consumer.
#[derive(Debug)]
pub struct SizeLimited<R> {
    inner: R,
    limit: u64,
    remaining: u64,
    exceeded: bool,
}

impl<R> SizeLimited<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        SizeLimited { inner, limit, remaining: limit, exceeded: false }
    }

    pub fn exceeded(&self) -> bool {
        self.exceeded
    }

    fn overflow_error(&self) -> std::io::Error {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("body exceeds {} bytes", self.limit),
        )
    }
}

impl<R> AsyncRead for SizeLimited<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = &mut *self;

        if this.exceeded {
            return Poll::Ready(Err(this.overflow_error()));
        }

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let window = usize::try_from(this.remaining.saturating_add(1))
            .unwrap_or(usize::MAX)
            .min(buf.remaining());

        let read = {
            let mut window_buf = ReadBuf::new(buf.initialize_unfilled_to(window));
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut window_buf))?;
            window_buf.filled().len()
        };

        if read as u64 > this.remaining {
            this.exceeded = true;
            return Poll::Ready(Err(this.overflow_error()));
        }

        this.remaining -= read as u64;
        buf.advance(read);

        Poll::Ready(Ok(()))
    }
}

/// Streams `body` into `storage` at `key`, allowing at most `limit` bytes.
///
/// An oversized body fails with [StorageError::SizeExceeded] before the
/// backend commits anything: the local variant removes its partial file and
/// the remote variant never issues the put.
pub async fn write<R>(
    storage: &dyn StorageBackend,
    key: &StorageKey,
    body: R,
    limit: u64,
) -> Result<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut limited = SizeLimited::new(body, limit);

    match storage.save(key, &mut limited).await {
        Ok(written) => Ok(written),
        Err(_) if limited.exceeded() => {
            log::warn!(
                "Upload to {} rejected, body exceeds {} bytes",
                key.object_key(),
                limit
            );

            Err(StorageError::SizeExceeded(limit))
        }
        Err(e) => Err(e),
    }
}
