//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use service_mods::{Module, Result};
use tokio::task::JoinHandle;

/// How long a released `run` may take to return.
pub const PROMPT: Duration = Duration::from_secs(2);

/// Error with an identity, injected through option factories and actions.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("injected failure {0}")]
pub struct Injected(pub u32);

/// `init` the module and share it.
pub async fn init_shared<M: Module>(mut module: M) -> Arc<M> {
    module.init().await.expect("init");
    Arc::new(module)
}

/// Spawn `run` on its own task.
pub fn spawn_run<M: Module>(module: &Arc<M>) -> JoinHandle<Result<()>> {
    let module = module.clone();
    tokio::spawn(async move { module.run().await })
}

/// Wait for a spawned `run` to return, failing the test if it hangs.
pub async fn join_run(handle: JoinHandle<Result<()>>) -> Result<()> {
    tokio::time::timeout(PROMPT, handle)
        .await
        .expect("run did not return in time")
        .expect("run task panicked")
}

/// HTTP client without connection pooling, so shutdown is not held up by
/// idle keep-alive connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
