//! HTTP server module.
//!
//! # Responsibilities
//! - Bind the listener during `init` and compute the server URL once
//! - Serve the configured router until stopped
//! - Drain in-flight requests within the shutdown timeout
//!
//! # Data Flow
//! ```text
//! init:  options → bind (or adopt pre-bound listener) → url
//! run:   axum::serve(listener, router).with_graceful_shutdown(done)
//! stop:  fire done → wait for run to finish, bounded by shutdown timeout
//!        on expiry: ShutdownTimeout, and under Abandon run is released
//! ```
//!
//! # Design Decisions
//! - The listener is acquired in `init` so bind errors surface before `run`
//! - A stop that arrives before `run` drops the listener directly
//! - No TLS; put a terminating proxy in front when needed

use std::future::IntoFuture;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use crate::error::{BoxError, Error, Result};
use crate::http::request;
use crate::lifecycle::shutdown::drain_within;
use crate::lifecycle::{
    lock_slot, slot_mut, DoneSignal, Lifecycle, Module, RunEntry, ShutdownPolicy,
};
use crate::option::{apply_options, Opt, Pending};

pub const ID: &str = "http";

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings filled in by server options.
pub struct HttpSettings {
    router: Option<Router>,
    addr: String,
    listener: Option<StdTcpListener>,
    shutdown_timeout: Duration,
    policy: ShutdownPolicy,
    request_timeout: Option<Duration>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            router: None,
            addr: DEFAULT_ADDR.to_string(),
            listener: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            policy: ShutdownPolicy::default(),
            request_timeout: None,
        }
    }
}

/// Option type for [`HttpServer`].
pub type HttpOpt = Opt<HttpSettings>;

struct Serving {
    listener: TcpListener,
    router: Router,
}

enum Slot {
    Empty,
    Ready(Serving),
    Taken,
}

/// HTTP server wrapped as a module.
pub struct HttpServer {
    lifecycle: Lifecycle,
    opts: Pending<HttpSettings>,
    shutdown_timeout: Duration,
    policy: ShutdownPolicy,
    local_addr: Option<SocketAddr>,
    url: String,
    slot: Mutex<Slot>,
    finished: DoneSignal,
    abandon: DoneSignal,
}

impl HttpServer {
    /// Create a server. Without options it binds [`DEFAULT_ADDR`] and serves
    /// an empty router.
    pub fn new(opts: impl IntoIterator<Item = HttpOpt>) -> Self {
        Self::named(ID, opts)
    }

    /// Create a server reporting `name` as its id.
    pub fn named(name: impl Into<String>, opts: impl IntoIterator<Item = HttpOpt>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            opts: Pending::new(opts),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            policy: ShutdownPolicy::default(),
            local_addr: None,
            url: String::new(),
            slot: Mutex::new(Slot::Empty),
            finished: DoneSignal::new(),
            abandon: DoneSignal::new(),
        }
    }

    /// `http://<bound address>`, available after `init`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bound address, available after `init`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn configure(&mut self) -> Result<()> {
        let mut settings = HttpSettings::default();
        apply_options(&mut settings, self.opts.take())?;

        let (std_listener, addr) = match settings.listener.take() {
            Some(listener) => (listener, settings.addr.clone()),
            None => {
                let listener = StdTcpListener::bind(settings.addr.as_str()).map_err(|source| {
                    Error::Bind {
                        addr: settings.addr.clone(),
                        source,
                    }
                })?;
                (listener, settings.addr.clone())
            }
        };
        let bind_err = |source| Error::Bind {
            addr: addr.clone(),
            source,
        };
        std_listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = std_listener.local_addr().map_err(bind_err)?;
        let listener = TcpListener::from_std(std_listener).map_err(bind_err)?;

        let router = request::instrument(
            settings.router.unwrap_or_default(),
            settings.request_timeout,
        );

        tracing::info!(module = %self.lifecycle.id(), address = %local_addr, "Listener bound");

        self.shutdown_timeout = settings.shutdown_timeout;
        self.policy = settings.policy;
        self.local_addr = Some(local_addr);
        self.url = format!("http://{}", local_addr);
        *slot_mut(&mut self.slot) =
            Slot::Ready(Serving { listener, router });
        Ok(())
    }

    fn claim(&self) -> Option<Serving> {
        let mut slot = lock_slot(&self.slot);
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Ready(serving) => Some(serving),
            other => {
                *slot = other;
                None
            }
        }
    }

    fn release(&self) -> Slot {
        std::mem::replace(
            &mut *lock_slot(&self.slot),
            Slot::Empty,
        )
    }
}

/// Fires `finished` when `run` returns or is dropped.
struct FinishGuard<'a>(&'a DoneSignal);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.fire();
    }
}

#[async_trait]
impl Module for HttpServer {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    async fn init(&mut self) -> Result<()> {
        self.lifecycle.begin_init()?;
        let result = self.configure();
        self.lifecycle.finish_init(result)
    }

    async fn run(&self) -> Result<()> {
        if self.lifecycle.enter_run()? == RunEntry::AlreadyStopped {
            return Ok(());
        }
        let Some(Serving { listener, router }) = self.claim() else {
            return Ok(());
        };
        let _finished = FinishGuard(&self.finished);

        tracing::info!(module = %self.id(), address = %self.url, "HTTP server starting");

        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(self.lifecycle.done().waiter())
            .into_future();

        let result = match self.policy {
            ShutdownPolicy::Wait => serve.await,
            ShutdownPolicy::Abandon => tokio::select! {
                result = serve => result,
                _ = self.abandon.wait() => {
                    tracing::warn!(module = %self.id(), "Abandoning in-flight requests");
                    Ok(())
                }
            },
        };
        result.map_err(Error::Serve)?;

        tracing::info!(module = %self.id(), "HTTP server stopped");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // A stop racing ahead of `init` spends the signal's first firing, so the
        // slot, not `first`, decides whether a listener is still held.
        let first = self.lifecycle.stop();
        match self.release() {
            Slot::Empty => Ok(()),
            Slot::Ready(serving) => {
                drop(serving);
                tracing::info!(module = %self.id(), "HTTP server stopped before serving");
                Ok(())
            }
            Slot::Taken if !first => Ok(()),
            Slot::Taken => {
                let drained = drain_within(self.shutdown_timeout, self.finished.wait()).await;
                if drained.is_err() {
                    tracing::warn!(
                        module = %self.id(),
                        timeout = ?self.shutdown_timeout,
                        policy = ?self.policy,
                        "Graceful shutdown deadline exceeded"
                    );
                    if self.policy == ShutdownPolicy::Abandon {
                        self.abandon.fire();
                    }
                }
                drained
            }
        }
    }
}

/// Serve `router`.
pub fn with_router(router: Router) -> HttpOpt {
    with_router_fn(move || Ok::<_, BoxError>(router))
}

/// Serve the router returned by `factory`.
pub fn with_router_fn<F, E>(factory: F) -> HttpOpt
where
    F: FnOnce() -> std::result::Result<Router, E> + Send + 'static,
    E: Into<BoxError>,
{
    Opt::deferred(factory, |s: &mut HttpSettings, router| s.router = Some(router))
}

/// Bind `addr` (`host:port`) during `init`.
pub fn with_addr(addr: impl Into<String>) -> HttpOpt {
    let addr = addr.into();
    with_addr_fn(move || Ok::<_, BoxError>(addr))
}

/// Bind the address returned by `factory`.
pub fn with_addr_fn<F, E>(factory: F) -> HttpOpt
where
    F: FnOnce() -> std::result::Result<String, E> + Send + 'static,
    E: Into<BoxError>,
{
    Opt::deferred(factory, |s: &mut HttpSettings, addr| s.addr = addr)
}

/// Serve on an already bound listener instead of binding an address.
pub fn with_listener(listener: StdTcpListener) -> HttpOpt {
    with_listener_fn(move || Ok::<_, BoxError>(listener))
}

/// Serve on the listener returned by `factory`.
pub fn with_listener_fn<F, E>(factory: F) -> HttpOpt
where
    F: FnOnce() -> std::result::Result<StdTcpListener, E> + Send + 'static,
    E: Into<BoxError>,
{
    Opt::deferred(factory, |s: &mut HttpSettings, listener| {
        s.listener = Some(listener)
    })
}

/// Bound graceful draining in `stop`.
pub fn with_shutdown_timeout(timeout: Duration) -> HttpOpt {
    Opt::value(timeout, |s: &mut HttpSettings, t| s.shutdown_timeout = t)
}

/// Decide what happens to in-flight requests once the shutdown timeout expires.
pub fn with_shutdown_policy(policy: ShutdownPolicy) -> HttpOpt {
    Opt::value(policy, |s: &mut HttpSettings, p| s.policy = p)
}

/// Answer requests taking longer than `timeout` with `408 Request Timeout`.
pub fn with_request_timeout(timeout: Duration) -> HttpOpt {
    Opt::value(timeout, |s: &mut HttpSettings, t| s.request_timeout = Some(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn url_reflects_bound_port() {
        let mut server = HttpServer::new([with_addr("127.0.0.1:0")]);
        server.init().await.unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.url(), format!("http://127.0.0.1:{}", addr.port()));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_address_fails_init() {
        let mut server = HttpServer::new([with_addr("not an address")]);
        let err = server.init().await.unwrap_err();
        assert!(matches!(err, Error::Bind { .. }));
        assert!(err.to_string().starts_with("failed to init listener"));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn pre_bound_listener_is_adopted() {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let expected = listener.local_addr().unwrap();

        let mut server = HttpServer::new([with_listener(listener)]);
        server.init().await.unwrap();
        assert_eq!(server.local_addr(), Some(expected));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn router_factory_error_aborts_init() {
        let mut server = HttpServer::new([
            with_addr("127.0.0.1:0"),
            with_router_fn(|| Err::<Router, _>("no routes")),
        ]);
        let err = server.init().await.unwrap_err();
        assert!(matches!(err, Error::Option { index: 1, .. }));
    }
}
