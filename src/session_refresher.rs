use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gateway_client::GatewayClient;

/// Background task that renews the gateway session before it lapses, so a
/// scrape never has to pay for authentication.
pub struct SessionRefresher {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl SessionRefresher {
    /// Starts ticking every `period`. Each tick is a no-op unless the session
    /// has entered its refresh window.
    pub fn spawn(client: Arc<GatewayClient>, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            Self::run(client, period, token).await;
        });
        Self { shutdown, handle }
    }

    /// Half the refresh buffer, so at least one tick lands inside the window.
    pub fn default_period(client: &GatewayClient) -> Duration {
        client.session().refresh_buffer() / 2
    }

    async fn run(client: Arc<GatewayClient>, period: Duration, shutdown: CancellationToken) {
        info!(period_secs = period.as_secs(), "Starting session refresh loop");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    // A handshake can stall for several request timeouts.
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = client.session().ensure_authenticated() => match result {
                            Ok(()) => debug!("Session refresh check passed"),
                            Err(e) => {
                                warn!(error = %e, "Session refresh failed, retrying next tick")
                            }
                        },
                    }
                }
            }
        }

        info!("Session refresh loop stopped");
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Session refresh task ended abnormally");
        }
    }
}
