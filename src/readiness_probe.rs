use std::sync::Arc;

use tracing::warn;

use crate::error::GatewayError;
use crate::gateway_client::GatewayClient;

/// Readiness as seen by an orchestrator.
///
/// A lapsed session gets one synchronous re-authentication before the probe
/// reports failure, so a transient blip does not hold the exporter out of
/// rotation until the next refresh tick.
#[derive(Clone)]
pub struct ReadinessProbe {
    client: Arc<GatewayClient>,
}

impl ReadinessProbe {
    pub fn new(client: Arc<GatewayClient>) -> Self {
        Self { client }
    }

    pub async fn check(&self) -> Result<(), GatewayError> {
        let session = self.client.session();
        if session.is_ready().await {
            return Ok(());
        }

        session.authenticate().await.inspect_err(|e| {
            warn!(error = %e, "Readiness check: re-authentication failed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter_metrics::{BuildInfo, ExporterMetrics};
    use crate::session_guard::{Credentials, AUTH_CHECK_PATH};

    fn client_for(server: &mockito::Server) -> Arc<GatewayClient> {
        let metrics = ExporterMetrics::new(&BuildInfo::default()).unwrap();
        Arc::new(
            GatewayClient::new(
                Credentials::with_token(&server.url(), "123456789", "test-jwt"),
                metrics,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn ready_probe_does_not_reauthenticate() {
        let mut server = mockito::Server::new_async().await;
        let check = server
            .mock("GET", AUTH_CHECK_PATH)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let client = client_for(&server);
        client.session().authenticate().await.unwrap();

        let probe = ReadinessProbe::new(client);
        probe.check().await.unwrap();
        probe.check().await.unwrap();

        check.assert_async().await;
    }

    #[tokio::test]
    async fn expired_session_recovers_through_probe() {
        let mut server = mockito::Server::new_async().await;
        let check = server
            .mock("GET", AUTH_CHECK_PATH)
            .with_status(200)
            .expect(2)
            .create_async()
            .await;
        let client = client_for(&server);
        client.session().authenticate().await.unwrap();
        let probe = ReadinessProbe::new(client.clone());
        assert!(client.session().is_ready().await);

        client.session().expire_now().await;
        assert!(!client.session().is_ready().await);

        probe.check().await.unwrap();
        assert!(client.session().is_ready().await);
        check.assert_async().await;
    }

    #[tokio::test]
    async fn probe_fails_when_gateway_rejects_token() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", AUTH_CHECK_PATH)
            .with_status(401)
            .with_body("revoked")
            .create_async()
            .await;
        let probe = ReadinessProbe::new(client_for(&server));

        let err = probe.check().await.unwrap_err();

        assert!(err.to_string().contains("revoked"));
    }
}
