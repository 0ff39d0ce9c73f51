// spdl-core - Playable content resolution and decryption streaming
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Output sink and consumer stream
//!
//! A download is a producer task writing into an [`AudioSink`] and a
//! consumer reading the matching [`AudioStream`]. The two halves share a
//! bounded channel, so a slow consumer stalls the producer instead of
//! letting decrypted data pile up in memory.
//!
//! # Termination
//! - Success: the sink is dropped and the stream ends with `None`
//! - Failure: [`AudioSink::fail`] delivers exactly one `Err`, then the
//!   stream ends. Bytes already delivered are not retracted; a consumer
//!   must treat any error as a failed download.
//! - Cancellation: dropping the stream aborts the producer task (and with
//!   it every in-flight request). Writes racing the abort get `Cancelled`.

use crate::error::{Result, SpdlError};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Create a connected sink/stream pair holding at most `capacity` chunks
pub fn channel(capacity: usize) -> (AudioSink, AudioStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        AudioSink { tx, written: 0 },
        AudioStream {
            rx,
            task: None,
            finished: false,
        },
    )
}

/// Producer half, owned by the pipeline
#[derive(Debug)]
pub struct AudioSink {
    tx: mpsc::Sender<Result<Bytes>>,
    written: u64,
}

impl AudioSink {
    /// Forward a chunk, waiting while the consumer is behind
    ///
    /// # Errors
    /// `Cancelled` once the consumer has dropped its stream
    pub async fn write(&mut self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let len = chunk.len() as u64;
        self.tx.send(Ok(chunk)).await.map_err(|_| SpdlError::Cancelled)?;
        self.written += len;
        Ok(())
    }

    /// Terminate the stream with an error
    pub async fn fail(self, err: SpdlError) {
        // Consumer may already be gone
        let _ = self.tx.send(Err(err)).await;
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// Consumer half: a stream of decrypted chunks ending in at most one error
#[derive(Debug)]
pub struct AudioStream {
    rx: mpsc::Receiver<Result<Bytes>>,
    task: Option<JoinHandle<()>>,
    finished: bool,
}

impl AudioStream {
    /// Tie the producer task's lifetime to this stream
    pub(crate) fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    /// Drain into a writer, returning the number of bytes written
    ///
    /// # Errors
    /// The pipeline's terminal error, or `Io` if the writer fails
    pub async fn write_to<W>(mut self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut total = 0u64;
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(total)
    }

    /// Collect everything into memory
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let mut buffer = Vec::new();
        while let Some(chunk) = self.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buffer))
    }
}

impl Stream for AudioStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_ends_stream() {
        let (mut sink, stream) = channel(4);
        tokio::spawn(async move {
            sink.write(Bytes::from_static(b"Ogg")).await.unwrap();
            sink.write(Bytes::new()).await.unwrap();
            sink.write(Bytes::from_static(b"S")).await.unwrap();
            assert_eq!(sink.bytes_written(), 4);
        });
        assert_eq!(stream.collect_bytes().await.unwrap(), Bytes::from_static(b"OggS"));
    }

    #[tokio::test]
    async fn test_failure_delivers_one_error_then_ends() {
        let (mut sink, mut stream) = channel(4);
        sink.write(Bytes::from_static(b"partial")).await.unwrap();
        sink.fail(SpdlError::ContentUnavailable("gone".to_string())).await;

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"partial"));
        assert!(matches!(stream.next().await, Some(Err(SpdlError::ContentUnavailable(_)))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_write_after_drop_is_cancelled() {
        let (mut sink, stream) = channel(1);
        drop(stream);
        assert!(sink.is_closed());
        assert!(matches!(sink.write(Bytes::from_static(b"x")).await, Err(SpdlError::Cancelled)));
    }

    #[tokio::test]
    async fn test_drop_aborts_producer() {
        let (mut sink, mut stream) = channel(1);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _done = done_tx;
            loop {
                if sink.write(Bytes::from_static(b"chunk")).await.is_err() {
                    break;
                }
            }
        });
        stream.attach(handle);
        assert!(stream.next().await.is_some());
        drop(stream);

        // The producer's sender is dropped once the task is torn down
        assert!(done_rx.await.is_err());
    }

    #[tokio::test]
    async fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ogg");
        let mut file = tokio::fs::File::create(&path).await.unwrap();

        let (mut sink, stream) = channel(2);
        tokio::spawn(async move {
            for _ in 0..3 {
                sink.write(Bytes::from_static(b"abcd")).await.unwrap();
            }
        });

        assert_eq!(stream.write_to(&mut file).await.unwrap(), 12);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcdabcdabcd");
    }

    #[tokio::test]
    async fn test_write_to_surfaces_pipeline_error() {
        let (sink, stream) = channel(2);
        sink.fail(SpdlError::InvalidDecryptedContainer).await;
        let mut out = Vec::new();
        let result = stream.write_to(&mut out).await;
        assert!(matches!(result, Err(SpdlError::InvalidDecryptedContainer)));
    }
}
