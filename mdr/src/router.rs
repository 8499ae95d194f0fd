//! The routing core: five endpoints on one reactor worker.
//!
//! [`Router::spawn`] binds every socket, spawns the dedicated worker thread
//! and hands back a thin handle. The handle follows the active-object
//! pattern: its methods post commands into the worker through a channel and
//! a [`mio::Waker`]; nothing outside the worker ever touches endpoint state.
//! Dropping the handle shuts the worker down and blocks until it has exited.

pub(crate) mod batcher;
mod commands;
pub(crate) mod delay;
pub(crate) mod endpoint;
pub(crate) mod frame_clock;
pub mod policy;
mod worker;

pub use commands::{ConfigUpdate, PolicyUpdate, RouteDelayUpdate};

use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::{Poll, Waker};
use thiserror::Error;

use crate::config::RouterConfig;
use crate::net::Endpoint;
use crate::stats::RouterStats;
use crate::trace::debug;
use commands::RouterCommand;
use worker::RouterWorker;

/// Failure to bring the router up.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// One of the five listen sockets could not be bound.
    #[error("failed to bind {endpoint} endpoint: {source}")]
    Bind {
        endpoint: &'static str,
        source: io::Error,
    },
    /// The poll, waker or address introspection failed.
    #[error("failed to set up the reactor: {0}")]
    Reactor(#[from] io::Error),
}

/// The live listen addresses, resolved after binding.
///
/// Useful when the configuration asked for ephemeral ports.
#[derive(Debug, Clone, Copy)]
pub struct BoundAddresses {
    pub bus_switch: Endpoint,
    pub mission_data: Endpoint,
    pub ingest_proxy: Endpoint,
    pub bus_ingress: Endpoint,
    pub frame_clock: Endpoint,
}

/// Handle to a running router.
pub struct Router {
    commands: mpsc::Sender<RouterCommand>,
    waker: Waker,
    worker: Option<JoinHandle<()>>,
    stats: Arc<RouterStats>,
    bound: BoundAddresses,
}

impl Router {
    /// Binds all five endpoint sockets and spawns the reactor worker.
    ///
    /// The worker is idle until [`start`](Self::start) is called.
    ///
    /// # Errors
    ///
    /// Returns a [`SpawnError`] when a socket cannot be bound or the reactor
    /// cannot be set up.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread cannot be spawned.
    pub fn spawn(config: RouterConfig) -> Result<Self, SpawnError> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), worker::WAKER)?;
        let stats = Arc::new(RouterStats::default());

        let worker = RouterWorker::new(config, poll, Arc::clone(&stats))?;
        let bound = worker.bound_addresses()?;

        let (commands, command_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("mdr-router".into())
            .spawn(move || worker.run(&command_rx))
            .expect("failed to spawn router worker");

        Ok(Self {
            commands,
            waker,
            worker: Some(handle),
            stats,
            bound,
        })
    }

    /// Asks the worker to register every endpoint and begin reading.
    pub fn start(&self) {
        self.post(RouterCommand::Start);
    }

    /// Applies a dynamic configuration change on the worker.
    pub fn change_config(&self, update: ConfigUpdate) {
        self.post(RouterCommand::ChangeConfig(update));
    }

    /// Restores all dynamic configuration items to their configured defaults.
    pub fn change_config_to_default(&self) {
        self.post(RouterCommand::ChangeConfigToDefault);
    }

    /// The addresses the five endpoints actually listen on.
    #[must_use]
    pub fn bound(&self) -> BoundAddresses {
        self.bound
    }

    /// The router's shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.stats)
    }

    /// Stops the worker and waits for it to exit.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn post(&self, command: RouterCommand) {
        if self.commands.send(command).is_ok() {
            let _ = self.waker.wake();
        }
    }

    fn shutdown_inner(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        debug!("shutting down router worker");
        let _ = self.commands.send(RouterCommand::Shutdown);
        let _ = self.waker.wake();
        let _ = handle.join();
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
