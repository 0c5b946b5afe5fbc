//! External stop trigger as a module.
//!
//! Wraps nothing: `run` waits until someone calls `stop`. Handy for tests and
//! for tying a group of modules to an explicit shutdown call.

use async_trait::async_trait;

use crate::error::Result;
use crate::lifecycle::{Lifecycle, Module, RunEntry};

pub const ID: &str = "stopper";

#[derive(Debug)]
pub struct Stopper {
    lifecycle: Lifecycle,
}

impl Stopper {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(ID),
        }
    }
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for Stopper {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    async fn init(&mut self) -> Result<()> {
        self.lifecycle.begin_init()?;
        self.lifecycle.finish_init(Ok(()))
    }

    async fn run(&self) -> Result<()> {
        if self.lifecycle.enter_run()? == RunEntry::Start {
            self.lifecycle.stopped().await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop();
        Ok(())
    }
}
