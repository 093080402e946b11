use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::session_guard::SessionGuard;

pub const STARTUP_ATTEMPTS: u32 = 5;
pub const STARTUP_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Authenticates against the gateway, backing off exponentially between
/// attempts. Returns the last error once `attempts` are exhausted.
pub async fn authenticate_with_retry(
    session: &SessionGuard,
    attempts: u32,
    initial_delay: Duration,
) -> Result<(), GatewayError> {
    let attempts = attempts.max(1);
    let mut delay = initial_delay;
    let mut attempt = 1;

    loop {
        let err = match session.authenticate().await {
            Ok(()) => {
                info!(attempt, "Authenticated with gateway");
                return Ok(());
            }
            Err(e) => e,
        };
        if attempt == attempts {
            return Err(err);
        }

        warn!(
            attempt,
            max_attempts = attempts,
            retry_in_secs = delay.as_secs_f64(),
            auth_rejected = err.is_authentication(),
            error = %err,
            "Gateway authentication failed, retrying"
        );
        sleep(delay).await;
        delay *= 2;
        attempt += 1;
    }
}
