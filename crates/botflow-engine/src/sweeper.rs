use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use botflow_core::config::SweeperConfig;
use botflow_core::error::Result;
use botflow_core::event::{EventBus, FlowEvent};
use botflow_core::traits::ContextStore;
use botflow_core::types::{CompletionReason, RunStatus};

/// Periodically deactivates contexts whose expiry timestamp has passed.
///
/// Expiry is not an exception path: the sweep clears any awaiting marker
/// and records a timeout completion reason, and the interpreter simply
/// never sees the context again.
pub struct ExpirySweeper {
    store: Arc<dyn ContextStore>,
    events: Arc<EventBus>,
    interval: Duration,
    cancel: CancellationToken,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn ContextStore>,
        events: Arc<EventBus>,
        config: &SweeperConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            events,
            interval: Duration::from_secs(config.interval_secs),
            cancel,
        }
    }

    /// Run the sweep loop. Blocks until cancelled.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    match self.sweep_once().await {
                        Ok(0) => {}
                        Ok(swept) => info!(swept, "Expired contexts deactivated"),
                        Err(e) => error!(error = %e, "Expiry sweep failed"),
                    }
                }
            }
        }
    }

    /// One sweep pass. Returns how many contexts were deactivated.
    pub async fn sweep_once(&self) -> Result<usize> {
        let ids = self.store.expired_before(Utc::now()).await?;
        let mut swept = 0;

        for id in ids {
            let Some(mut ctx) = self.store.load(&id).await? else {
                continue;
            };
            if ctx.status.is_terminal() {
                continue;
            }
            info!(context = %ctx.id, "Context expired");
            ctx.finish(RunStatus::Expired, CompletionReason::Timeout);
            self.store.save(&ctx).await?;
            self.events.publish(FlowEvent::RunCompleted {
                context: ctx.id.clone(),
                reason: CompletionReason::Timeout,
            });
            swept += 1;
        }

        Ok(swept)
    }
}
