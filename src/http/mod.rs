//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (listener owned by the module, axum serve loop)
//!     → request.rs (request id, trace span, timeout)
//!     → caller's Router
//! ```

pub mod request;
pub mod server;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{
    with_addr, with_addr_fn, with_listener, with_listener_fn, with_request_timeout, with_router,
    with_router_fn, with_shutdown_policy, with_shutdown_timeout, HttpOpt, HttpServer, HttpSettings,
};
