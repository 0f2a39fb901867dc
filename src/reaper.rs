//! Periodic close of sessions whose lifetime has ended.

use crate::error::Result;
use crate::orchestrator::Orchestrator;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Reaper settings.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}

/// Closes expired sessions through the orchestrator.
pub struct SessionReaper {
    orchestrator: Arc<Orchestrator>,
    config: ReaperConfig,
}

impl SessionReaper {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ReaperConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// One sweep. Returns how many sessions were closed.
    ///
    /// A session that fails to close is logged and retried on the next sweep.
    pub async fn sweep(&self) -> Result<usize> {
        let expired = self.orchestrator.expired_sessions(Utc::now()).await?;
        if expired.is_empty() {
            debug!("No expired sessions");
            return Ok(0);
        }

        let mut closed = 0;
        for session in &expired {
            match self.orchestrator.session_close(session).await {
                Ok(()) => {
                    info!("Closed expired session {}", session.id);
                    closed += 1;
                }
                Err(e) => warn!("Failed to close expired session {}: {}", session.id, e),
            }
        }
        Ok(closed)
    }

    /// Run sweeps forever on a background task.
    pub fn start(self) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            info!("Session reaper disabled");
            return None;
        }

        let period = self.config.interval;
        let handle = tokio::spawn(async move {
            let mut interval_timer = interval(period);
            interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval_timer.tick().await;
                if let Err(e) = self.sweep().await {
                    error!("Session reaper sweep failed: {}", e);
                }
            }
        });

        info!("Session reaper started with interval: {:?}", period);
        Some(handle)
    }
}
