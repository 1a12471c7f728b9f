use super::clients::ClientRegistry;
use crate::core::error::{Result, StreamError};
use axum::Router;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use std::future::Future;
use std::io::{self, IoSlice};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Canned response for connections refused at the admission gate
const BUSY_RESPONSE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// Bind a listening socket, mapping failure onto the fatal init seam
pub async fn bind(ip: &str, port: u16) -> Result<TcpListener> {
    let address = format!("{}:{}", ip, port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| StreamError::BindFailed { address, source: e })?;
    Ok(listener)
}

/// Connection stream with a per-write send deadline.
///
/// A streaming client that stays connected but stops reading freezes its
/// TCP window and wedges the next body write; without a deadline that
/// connection would hold its client slot forever. Any single write that
/// stays pending for `send_timeout` fails with `TimedOut`, the connection
/// errors out, the session is marked closing and the slot is freed. The
/// deadline re-arms whenever a write makes progress.
///
/// The wrapper also owns the socket batching switch: Nagle is off while the
/// request and response headers are in flight (latency), and re-enabled
/// after the first completed write so frame bodies leave as full MSS
/// segments.
struct SendTimeoutStream {
    inner: TcpStream,
    send_timeout: Duration,
    deadline: Option<Pin<Box<tokio::time::Sleep>>>,
    headers_sent: bool,
}

impl SendTimeoutStream {
    fn new(inner: TcpStream, send_timeout: Duration) -> Self {
        Self {
            inner,
            send_timeout,
            deadline: None,
            headers_sent: false,
        }
    }

    /// A write made progress: disarm the deadline and, on the first one
    /// (the response headers), hand batching back to the kernel
    fn write_progressed(&mut self) {
        self.deadline = None;
        if !self.headers_sent {
            self.headers_sent = true;
            if let Err(e) = self.inner.set_nodelay(false) {
                debug!("set_nodelay(false) failed: {}", e);
            }
        }
    }

    /// Poll the stall deadline for a pending write
    fn poll_stall(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        let send_timeout = self.send_timeout;
        let deadline = self
            .deadline
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(send_timeout)));
        match deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(io::Error::new(
                io::ErrorKind::TimedOut,
                "client stopped reading; send timed out",
            )),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncRead for SendTimeoutStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // Pre-request reads are bounded by hyper's header_read_timeout
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SendTimeoutStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                if result.is_ok() {
                    this.write_progressed();
                } else {
                    this.deadline = None;
                }
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_stall(cx).map(Err),
        }
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_write_vectored(cx, bufs) {
            Poll::Ready(result) => {
                if result.is_ok() {
                    this.write_progressed();
                } else {
                    this.deadline = None;
                }
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_stall(cx).map(Err),
        }
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(result) => {
                this.deadline = None;
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_stall(cx).map(Err),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Accept loop with connection admission.
///
/// Each accepted connection gets a registry slot (or a canned 503 and an
/// immediate close when all slots are taken) and is served http/1 with two
/// bounds: a header-read timeout, so a connection that never sends a
/// request line is evicted after `idle_timeout`, and a per-write send
/// deadline, so a streaming client that stops reading is evicted after
/// `send_timeout`.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    registry: ClientRegistry,
    idle_timeout: Duration,
    send_timeout: Duration,
    cancel: CancellationToken,
    server_name: &'static str,
) {
    info!(
        "{} listening on {} ({} client slots)",
        server_name,
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into()),
        registry.max_clients()
    );

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("{} accept failed: {}", server_name, e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let Some(guard) = registry.try_admit(peer) else {
            debug!("{} at capacity, refusing {}", server_name, peer);
            tokio::spawn(refuse(stream));
            continue;
        };

        // Low latency while the request and response headers are in
        // flight; the stream wrapper reverts to kernel batching once the
        // headers have gone out
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", peer, e);
        }

        let router = router.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let session = guard.session();
            debug!("{} client {} connected (id {})", server_name, peer, session.id());

            let service = TowerToHyperService::new(
                router.layer(axum::Extension(Arc::clone(&session))),
            );
            let stream = SendTimeoutStream::new(stream, send_timeout);
            let connection = hyper::server::conn::http1::Builder::new()
                .timer(TokioTimer::new())
                .header_read_timeout(idle_timeout)
                .serve_connection(TokioIo::new(stream), service);

            tokio::select! {
                result = connection => {
                    if let Err(e) = result {
                        // Header-read timeouts, send deadlines and client
                        // aborts land here; each terminates only this client
                        debug!("{} client {} ended: {}", server_name, peer, e);
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("{} client {} dropped on shutdown", server_name, peer);
                }
            }

            session.mark_closing();
            drop(guard);
        });
    }

    info!("{} stopped", server_name);
}

async fn refuse(mut stream: TcpStream) {
    let _ = stream.write_all(BUSY_RESPONSE).await;
    let _ = stream.shutdown().await;
}
