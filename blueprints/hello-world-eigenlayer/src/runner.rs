use crate::context::OperatorContext;
use crate::error::{Error, Result};
use crate::gateway::ChainGateway;
use crate::monitor::{MonitorConfig, TaskMonitor};
use crate::registration::register_operator;
use crate::responder::{ResponsePolicy, TaskResponder};
use crate::tx::TxPolicy;
use operator_logging::{error, info};
use std::future::Future;
use std::sync::Arc;

/// Drives an operator through registration and then task monitoring.
pub struct OperatorRunner<G: ?Sized> {
    ctx: OperatorContext<G>,
    monitor: MonitorConfig,
    tx_policy: TxPolicy,
    response_policy: ResponsePolicy,
    skip_registration: bool,
}

impl<G: ChainGateway + ?Sized> OperatorRunner<G> {
    #[must_use]
    pub fn new(
        ctx: OperatorContext<G>,
        monitor: MonitorConfig,
        tx_policy: TxPolicy,
        response_policy: ResponsePolicy,
    ) -> Self {
        Self {
            ctx,
            monitor,
            tx_policy,
            response_policy,
            skip_registration: false,
        }
    }

    /// Start monitoring without registering first
    #[must_use]
    pub fn skip_registration(mut self, skip: bool) -> Self {
        self.skip_registration = skip;
        self
    }

    /// # Errors
    /// - [`Error::Registration`] if either registration step fails
    pub async fn register(&self) -> Result<()> {
        if self.skip_registration {
            info!("Skipping registration");
            return Ok(());
        }

        let state = register_operator(&self.ctx, &self.tx_policy)
            .await
            .inspect_err(|e| {
                error!(
                    "Registration stopped with operator {} {}",
                    self.ctx.identity.address(),
                    e.reached()
                );
            })?;
        info!("Operator {} is {state}", self.ctx.identity.address());
        Ok(())
    }

    /// Scans for tasks and answers them until `shutdown` resolves.
    ///
    /// # Errors
    /// - [`Error::MonitorStopped`] if the scanner task ends on its own
    pub async fn run<S>(&self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let (monitor, receiver) =
            TaskMonitor::new(Arc::clone(&self.ctx.gateway), self.monitor).spawn();
        let responder = TaskResponder::new(
            Arc::clone(&self.ctx.gateway),
            Arc::clone(&self.ctx.identity),
            self.tx_policy,
            self.response_policy,
        );

        tokio::select! {
            stats = responder.run(receiver) => {
                info!(
                    "Responder stopped after {} confirmed, {} failed and {} dropped task(s)",
                    stats.confirmed, stats.failed, stats.dropped
                );
                let reason = match monitor.await {
                    Ok(()) => "scanner exited".to_string(),
                    Err(e) => e.to_string(),
                };
                Err(Error::MonitorStopped(reason))
            }
            () = shutdown => {
                info!("Shutting down the task monitor");
                monitor.abort();
                Ok(())
            }
        }
    }

    /// [`register`](Self::register), then [`run`](Self::run).
    ///
    /// # Errors
    /// See [`OperatorRunner::register`] and [`OperatorRunner::run`]. Monitoring never
    /// starts if registration failed.
    pub async fn execute<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        info!("Registering...");
        self.register().await?;

        info!("Running...");
        self.run(shutdown).await?;

        info!("Exiting...");
        Ok(())
    }
}
