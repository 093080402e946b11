use thiserror::Error;

/// Errors raised while talking to the gateway or the Enlighten token service.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The gateway rejected the bearer token.
    #[error("token validation failed with status {status}: {body}")]
    Authentication { status: u16, body: String },

    /// Minting a token from Enlighten failed.
    #[error("failed to get Enlighten token: {0}")]
    TokenAcquisition(String),

    /// A request returned a non-2xx status.
    #[error("{endpoint} request returned status {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect, timeout, body read).
    #[error("{endpoint} request failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl GatewayError {
    /// True for failures raised while establishing a session.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            GatewayError::Authentication { .. } | GatewayError::TokenAcquisition(_)
        )
    }
}
