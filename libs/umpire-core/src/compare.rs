//! Lock-step line comparison between a program's stdout and an expected
//! stream, plus the tee plumbing that lets callers watch the live output.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Outcome of comparing two line streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    Mismatch {
        line: usize,
        got: String,
        want: String,
    },
}

/// Compare `got` against `want` line by line, teeing every `got` line to
/// `tee` before it is inspected.
///
/// The comparison is governed by `got`: when `got` reaches EOF with every
/// line equal so far, the result is `Match` no matter how much of `want`
/// remains unread. When `want` runs out first, the missing line compares as
/// the empty string, so any non-empty extra `got` line is a mismatch at that
/// index. Lines are compared bytewise with the terminator stripped.
///
/// No further reads happen after the first inequality.
pub async fn compare_lines<G, W, T>(got: G, want: W, tee: &mut T) -> io::Result<Comparison>
where
    G: AsyncBufRead + Unpin,
    W: AsyncBufRead + Unpin,
    T: AsyncWrite + Unpin,
{
    let mut got_lines = got.lines();
    let mut want_lines = want.lines();
    let mut index = 0usize;

    while let Some(got_line) = got_lines.next_line().await? {
        tee.write_all(got_line.as_bytes()).await?;
        tee.write_all(b"\n").await?;

        let want_line = want_lines.next_line().await?.unwrap_or_default();
        if got_line != want_line {
            return Ok(Comparison::Mismatch {
                line: index,
                got: got_line,
                want: want_line,
            });
        }
        index += 1;
    }
    Ok(Comparison::Match)
}

/// Drain a stderr stream to completion, teeing it along the way, and return
/// the captured text with lines joined by newlines. An empty return means
/// the program never wrote to stderr.
pub async fn drain_stderr<R, T>(stderr: R, tee: &mut T) -> io::Result<String>
where
    R: AsyncBufRead + Unpin,
    T: AsyncWrite + Unpin,
{
    let mut lines = stderr.lines();
    let mut captured = String::new();
    while let Some(line) = lines.next_line().await? {
        tee.write_all(line.as_bytes()).await?;
        tee.write_all(b"\n").await?;
        if !captured.is_empty() {
            captured.push('\n');
        }
        captured.push_str(&line);
    }
    Ok(captured)
}

/// A cloneable in-memory sink. The judge hands one clone to a reader task as
/// the tee target and keeps another to collect the final text, so output
/// written up to the moment a verdict lands is never lost.
#[derive(Clone, Default)]
pub struct TeeBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl TeeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buf = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl AsyncWrite for TeeBuffer {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
