use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{Config, ServerConfig};
use crate::error::{Result, TallyError};
use crate::scheduler::{Scheduler, Sweep};
use crate::source::TallySource;
use crate::transport::{ConnectionState, Link, Transport};

/// High-level tally sender.
///
/// Owns the source list, the transport and the scheduler. At most one
/// transport exists at a time: [`start`](Self::start) creates it from the
/// [`ServerConfig`] and [`stop`](Self::stop) closes it.
pub struct Service {
    config: ServerConfig,
    interval: Duration,
    sweep: Arc<Mutex<Sweep>>,
    transport: Option<Arc<Mutex<Box<dyn Transport>>>>,
    scheduler: Option<Scheduler>,
}

impl Service {
    pub fn new(config: ServerConfig, sources: Vec<TallySource>, interval: Duration) -> Self {
        Self {
            config,
            interval,
            sweep: Arc::new(Mutex::new(Sweep::new(sources))),
            transport: None,
            scheduler: None,
        }
    }

    pub fn from_config(config: Config) -> Self {
        Self::new(config.server, config.sources, config.send_interval)
    }

    /// Open the configured transport and start sending.
    ///
    /// Sending starts right away. A receiver that cannot be resolved or
    /// reached is logged, and ticks keep running and logging their failed
    /// sends until it becomes reachable (UDP) or [`reconnect`](Self::reconnect)
    /// succeeds (TCP).
    pub fn start(&mut self) -> Result<()> {
        if self.scheduler.is_some() {
            return Err(TallyError::AlreadyRunning);
        }
        self.start_with_transport(Box::new(Link::from_config(&self.config)))
    }

    /// Start sending over a caller-supplied transport.
    pub fn start_with_transport(&mut self, mut transport: Box<dyn Transport>) -> Result<()> {
        if self.scheduler.is_some() {
            return Err(TallyError::AlreadyRunning);
        }

        if let Err(e) = transport.connect() {
            tracing::error!(
                endpoint = %self.config.endpoint(),
                error = %e,
                "an error occurred with the connection"
            );
        }
        let transport = Arc::new(Mutex::new(transport));

        tracing::info!(
            target: "tally::config",
            endpoint = %self.config.endpoint(),
            transport = %self.config.transport,
            "sending TSL data"
        );

        self.sweep.lock().reset();
        self.scheduler = Some(Scheduler::spawn(
            self.sweep.clone(),
            transport.clone(),
            self.interval,
        )?);
        self.transport = Some(transport);
        Ok(())
    }

    /// Cancel the scheduler and close the transport.
    ///
    /// Safe to call repeatedly; calls after the first do nothing.
    pub fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.cancel();
        }

        if let Some(transport) = self.transport.take() {
            let mut transport = transport.lock();
            tracing::info!(
                target: "tally::config",
                transport = %transport.kind(),
                "closing TSL socket"
            );
            if let Err(e) = transport.close() {
                tracing::error!(error = %e, "error stopping TSL connection");
            }
        }
    }

    /// Retry the connection after a failure. The scheduler keeps running.
    pub fn reconnect(&self) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(TallyError::NotStarted)?;
        transport.lock().connect()
    }

    /// Replace the source list between ticks.
    ///
    /// The scheduler is paused for the swap and the sweep restarts from the
    /// first source. The transport stays open.
    pub fn replace_sources(&mut self, sources: Vec<TallySource>) -> Result<()> {
        let resume = match self.scheduler.take() {
            Some(mut scheduler) => {
                scheduler.cancel();
                true
            }
            None => false,
        };

        tracing::info!(count = sources.len(), "replacing TSL addresses");
        self.sweep.lock().replace_sources(sources);

        if resume {
            if let Some(transport) = &self.transport {
                self.scheduler = Some(Scheduler::spawn(
                    self.sweep.clone(),
                    transport.clone(),
                    self.interval,
                )?);
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.as_ref().is_some_and(Scheduler::is_running)
    }

    /// State of the live transport, or `None` when stopped.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.transport.as_ref().map(|t| t.lock().state())
    }

    /// Snapshot of the sources with their last transmitted tally state.
    pub fn sources(&self) -> Vec<TallySource> {
        self.sweep.lock().sources().to_vec()
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}
