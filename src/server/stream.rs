// Connection stream module
// Transport wrapper that keeps hyper's own error responses non-cacheable
//
// hyper answers unparseable requests (400, 414, 431) itself, without calling
// the service, so `NoCache` never sees those responses. `NoCacheStream` sits
// under hyper and follows the response framing on the write side: heads of
// responses the service produced pass through untouched, any other head gets
// the cache-defeating headers spliced in before it reaches the socket.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use hyper::body::Body;
use hyper::{Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use crate::http::cache::{NO_CACHE_CONTROL, NO_CACHE_EXPIRES, NO_CACHE_PRAGMA};

const HEAD_END: &[u8] = b"\r\n\r\n";

/// Body lengths, as sent on the wire, of responses the service has produced
/// and hyper has not yet started writing. Shared by the service and the stream
/// of one connection.
#[derive(Debug, Clone, Default)]
pub struct PendingResponses(Arc<Mutex<VecDeque<u64>>>);

impl PendingResponses {
    /// Record a response the service is about to hand to hyper
    pub fn record<B: Body>(&self, response: &Response<B>, is_head: bool) {
        let status = response.status();
        let body_len = if is_head
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            0
        } else {
            response.body().size_hint().exact().unwrap_or(0)
        };
        self.push(body_len);
    }

    fn push(&self, body_len: u64) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(body_len);
    }

    fn pop(&self) -> Option<u64> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

enum WriteState {
    /// Collecting a response head
    Head,
    /// Passing through this many body bytes
    Body(u64),
}

/// Stream wrapper that injects the no-cache headers into response heads the
/// service did not produce, and fails writes that stall for `write_timeout`
pub struct NoCacheStream<S> {
    inner: S,
    pending: PendingResponses,
    state: WriteState,
    head: Vec<u8>,
    /// Finished head waiting to be written to `inner`
    out: Vec<u8>,
    out_pos: usize,
    write_timeout: Option<Duration>,
    stalled: Option<Pin<Box<Sleep>>>,
}

impl<S> NoCacheStream<S> {
    pub const fn new(inner: S, pending: PendingResponses, write_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            pending,
            state: WriteState::Head,
            head: Vec::new(),
            out: Vec::new(),
            out_pos: 0,
            write_timeout,
            stalled: None,
        }
    }

    pub const fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Error once a write has been pending for longer than `write_timeout`
    fn poll_stall(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        let Some(timeout) = self.write_timeout else {
            return Ok(());
        };
        let sleep = self
            .stalled
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
        if sleep.as_mut().poll(cx).is_ready() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write stalled for {} seconds", timeout.as_secs()),
            ));
        }
        Ok(())
    }
}

/// Add the no-cache header lines to a complete head ending in `\r\n\r\n`
fn inject_no_cache_headers(head: &mut Vec<u8>) {
    head.truncate(head.len() - 2);
    for (name, value) in [
        ("cache-control", NO_CACHE_CONTROL),
        ("pragma", NO_CACHE_PRAGMA),
        ("expires", NO_CACHE_EXPIRES),
    ] {
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
}

impl<S: AsyncWrite + Unpin> NoCacheStream<S> {
    fn poll_inner_write(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match Pin::new(&mut self.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                self.stalled = None;
                Poll::Ready(result)
            }
            Poll::Pending => {
                self.poll_stall(cx)?;
                Poll::Pending
            }
        }
    }

    /// Write out a finished head
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.out_pos < self.out.len() {
            let out = std::mem::take(&mut self.out);
            let written = self.poll_inner_write(cx, &out[self.out_pos..]);
            self.out = out;
            match ready!(written)? {
                0 => return Poll::Ready(Err(io::ErrorKind::WriteZero.into())),
                n => self.out_pos += n,
            }
        }
        self.out.clear();
        self.out_pos = 0;
        Poll::Ready(Ok(()))
    }

    /// Buffer head bytes from `buf`; returns how many were taken
    fn take_head_bytes(&mut self, buf: &[u8]) -> usize {
        let search_from = self.head.len().saturating_sub(HEAD_END.len() - 1);
        let old_len = self.head.len();
        self.head.extend_from_slice(buf);

        let Some(pos) = self.head[search_from..]
            .windows(HEAD_END.len())
            .position(|w| w == HEAD_END)
        else {
            return buf.len();
        };

        let end = search_from + pos + HEAD_END.len();
        self.head.truncate(end);
        let mut head = std::mem::take(&mut self.head);

        self.state = match self.pending.pop() {
            Some(body_len) => WriteState::Body(body_len),
            None => {
                inject_no_cache_headers(&mut head);
                WriteState::Body(0)
            }
        };
        self.out = head;
        self.out_pos = 0;
        end - old_len
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for NoCacheStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for NoCacheStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        ready!(this.poll_drain(cx))?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        loop {
            match this.state {
                WriteState::Body(0) => this.state = WriteState::Head,
                WriteState::Body(remaining) => {
                    let len = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
                    let written = ready!(this.poll_inner_write(cx, &buf[..len]))?;
                    let written_len = u64::try_from(written).unwrap_or(u64::MAX);
                    this.state = WriteState::Body(remaining.saturating_sub(written_len));
                    return Poll::Ready(Ok(written));
                }
                WriteState::Head => {
                    let taken = this.take_head_bytes(buf);
                    // The head is accepted; a pending socket is retried on the next call
                    if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
                        return Poll::Ready(Err(e));
                    }
                    return Poll::Ready(Ok(taken));
                }
            }
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.poll_drain(cx))?;
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.poll_drain(cx))?;
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::body::Bytes;
    use tokio::io::AsyncWriteExt;

    const ERROR_HEAD: &[u8] = b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\r\n";

    fn response(status: StatusCode, body: &'static [u8]) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from_static(body)));
        *response.status_mut() = status;
        response
    }

    async fn written(pending: PendingResponses, chunks: &[&[u8]]) -> String {
        let mut stream = NoCacheStream::new(Vec::new(), pending, None);
        for chunk in chunks {
            stream.write_all(chunk).await.unwrap();
        }
        stream.flush().await.unwrap();
        String::from_utf8(stream.get_ref().clone()).unwrap()
    }

    #[tokio::test]
    async fn test_unrecorded_head_gets_headers() {
        let out = written(PendingResponses::default(), &[ERROR_HEAD]).await;
        assert_eq!(
            out,
            "HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\
             cache-control: no-cache, no-store, must-revalidate\r\n\
             pragma: no-cache\r\nexpires: 0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_recorded_response_passes_through() {
        let pending = PendingResponses::default();
        pending.record(&response(StatusCode::OK, b"a\r\n\r\nb"), false);

        let ok = b"HTTP/1.1 200 OK\r\ncontent-length: 6\r\n\r\na\r\n\r\nb";
        let out = written(pending, &[&ok[..], ERROR_HEAD]).await;

        let (first, second) = out.split_at(ok.len());
        assert_eq!(first.as_bytes(), ok);
        assert!(second.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert_eq!(second.matches("cache-control: ").count(), 1);
    }

    #[tokio::test]
    async fn test_head_response_has_no_body_bytes() {
        let pending = PendingResponses::default();
        pending.record(&response(StatusCode::OK, b""), true);
        pending.record(&response(StatusCode::NOT_MODIFIED, b""), false);

        let head = b"HTTP/1.1 200 OK\r\ncontent-length: 12\r\n\r\n";
        let not_modified = b"HTTP/1.1 304 Not Modified\r\n\r\n";
        let out = written(pending, &[&head[..], &not_modified[..], ERROR_HEAD]).await;

        assert!(out.starts_with("HTTP/1.1 200 OK\r\ncontent-length: 12\r\n\r\nHTTP/1.1 304"));
        assert_eq!(out.matches("pragma: no-cache").count(), 1);
    }

    #[tokio::test]
    async fn test_head_split_across_writes() {
        let chunks: Vec<&[u8]> = ERROR_HEAD.chunks(3).collect();
        let out = written(PendingResponses::default(), &chunks).await;
        assert!(out.ends_with("expires: 0\r\n\r\n"));
        assert_eq!(out.matches("cache-control: ").count(), 1);
    }
}
