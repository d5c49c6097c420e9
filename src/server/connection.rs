// Connection module
// Accepts a single TCP connection and serves it through the no-cache service

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;

use crate::config::AppState;
use crate::handler::{self, NoCache};
use crate::logger;

use super::stream::{NoCacheStream, PendingResponses};

/// Accept a connection, enforcing `max_connections`, and serve it on a new task.
///
/// The counter is incremented before the limit check so that concurrent
/// accepts cannot both slip under the limit.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
) {
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);

    handle_connection(stream, peer_addr, Arc::clone(state), Arc::clone(conn_counter));
}

/// Serve one connection on a spawned task.
///
/// 1. Wraps the TCP stream in `NoCacheStream` and `TokioIo`
/// 2. Configures HTTP/1.1 keep-alive and the idle header read timeout
/// 3. Serves requests through `NoCache`, so every response is marked uncacheable
/// 4. Decrements the connection counter when done
///
/// A connection stays open as long as it keeps making progress: waiting for a
/// request head is bounded by `read_timeout`, a stalled write by `write_timeout`.
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        let performance = &state.config.performance;
        let pending = PendingResponses::default();
        let stream = NoCacheStream::new(
            stream,
            pending.clone(),
            non_zero_secs(performance.write_timeout),
        );
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new());
        builder.keep_alive(performance.keep_alive);
        builder.header_read_timeout(non_zero_secs(performance.read_timeout));

        let service_state = Arc::clone(&state);
        let service = NoCache::new(service_fn(move |req: Request<Incoming>| {
            let is_head = req.method() == Method::HEAD;
            let state = Arc::clone(&service_state);
            let pending = pending.clone();
            async move {
                let response = handler::handle_request(req, state, peer_addr).await?;
                pending.record(&response, is_head);
                Ok::<_, Infallible>(response)
            }
        }));

        if let Err(err) = builder.serve_connection(io, service).await {
            logger::log_connection_error(&err);
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Zero disables a timeout
fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
