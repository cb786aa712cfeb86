use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::config::RazorpayConfig;

use super::{CreateOrderRequest, RazorpayOrder};

const RAZORPAY_API_URL: &str = "https://api.razorpay.com/v1";

/// Error returned by the gateway HTTP layer.
///
/// `Api` carries the gateway's own `{error: {code, description}}` envelope;
/// the retry policy consults `is_transient()` and nothing else.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway responded {status}: {code}: {description}")]
    Api {
        status: u16,
        code: String,
        description: String,
    },

    #[error("unparseable gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether the gateway itself classified this failure as transient.
    ///
    /// Razorpay reports momentary overload as SERVER_ERROR / GATEWAY_ERROR;
    /// an unparseable 5xx body counts the same way. Transport failures and
    /// 4xx rejections (bad credentials, invalid amount) are permanent and
    /// must not be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Api { status, code, .. } => {
                matches!(code.as_str(), "SERVER_ERROR" | "GATEWAY_ERROR") || *status >= 500
            }
            GatewayError::Transport(_) | GatewayError::InvalidResponse(_) => false,
        }
    }
}

/// The slice of the gateway the checkout flow depends on. The production
/// implementation is [`RazorpayClient`]; tests substitute fakes to drive the
/// retry policy without a network.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<RazorpayOrder, GatewayError>;

    /// Cheap connectivity probe used by the status endpoint.
    async fn ping(&self) -> Result<(), GatewayError>;
}

#[derive(Clone)]
pub struct RazorpayClient {
    http_client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(config: &RazorpayConfig) -> Self {
        Self::with_base_url(config, RAZORPAY_API_URL)
    }

    /// Points the client at a non-default gateway URL. Tests aim this at a
    /// local mock server.
    pub fn with_base_url(config: &RazorpayConfig, base_url: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url: base_url.into(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| {
                tracing::error!("Failed to parse Razorpay response: {} - Body: {}", e, body);
                GatewayError::InvalidResponse(format!("Failed to parse response: {}", e))
            })
        } else {
            tracing::error!("Razorpay API error: {} - {}", status, body);

            let (code, description) = match serde_json::from_str::<RazorpayErrorEnvelope>(&body) {
                Ok(envelope) => (envelope.error.code, envelope.error.description),
                Err(_) => {
                    let fallback = match status {
                        StatusCode::UNAUTHORIZED => "Invalid API credentials".to_string(),
                        StatusCode::NOT_FOUND => "Resource not found".to_string(),
                        StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded".to_string(),
                        _ => format!("API error: {}", status),
                    };
                    ("UNKNOWN".to_string(), fallback)
                }
            };

            Err(GatewayError::Api {
                status: status.as_u16(),
                code,
                description,
            })
        }
    }
}

#[async_trait]
impl OrderGateway for RazorpayClient {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<RazorpayOrder, GatewayError> {
        self.post("/orders", request).await
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        self.get::<serde_json::Value>("/payments?count=1").await?;
        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
struct RazorpayErrorEnvelope {
    error: RazorpayErrorDetail,
}

#[derive(Debug, serde::Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RazorpayConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_error(status: u16, code: &str) -> GatewayError {
        GatewayError::Api {
            status,
            code: code.to_string(),
            description: "test".to_string(),
        }
    }

    fn test_client(base_url: &str) -> RazorpayClient {
        RazorpayClient::with_base_url(
            &RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: "rzp_test_secret".to_string(),
                webhook_secret: "whsec_test".to_string(),
                currency: "INR".to_string(),
            },
            base_url,
        )
    }

    fn order_request() -> CreateOrderRequest {
        CreateOrderRequest {
            amount: 49999,
            currency: "INR".to_string(),
            receipt: Some("rcpt_1".to_string()),
            notes: None,
            partial_payment: Some(false),
        }
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(api_error(500, "SERVER_ERROR").is_transient());
        assert!(api_error(502, "GATEWAY_ERROR").is_transient());
        // Unparseable 5xx still counts as gateway-classified transient.
        assert!(api_error(503, "UNKNOWN").is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!api_error(400, "BAD_REQUEST_ERROR").is_transient());
        assert!(!api_error(401, "UNKNOWN").is_transient());
        assert!(!api_error(429, "UNKNOWN").is_transient());
    }

    #[tokio::test]
    async fn create_order_parses_gateway_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_partial_json(serde_json::json!({
                "amount": 49999,
                "currency": "INR",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "order_abc",
                "amount": 49999,
                "currency": "INR",
                "receipt": "rcpt_1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = test_client(&server.uri())
            .create_order(&order_request())
            .await
            .unwrap();

        assert_eq!(order.id, "order_abc");
        assert_eq!(order.amount, 49999);
        assert_eq!(order.currency, "INR");
    }

    #[tokio::test]
    async fn gateway_error_envelope_is_classified() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {
                    "code": "SERVER_ERROR",
                    "description": "The server is currently unable to handle the request",
                }
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .create_order(&order_request())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(matches!(err, GatewayError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn bad_request_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "code": "BAD_REQUEST_ERROR",
                    "description": "amount must be at least INR 1.00",
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .create_order(&order_request())
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        match err {
            GatewayError::Api { code, description, .. } => {
                assert_eq!(code, "BAD_REQUEST_ERROR");
                assert!(description.contains("INR 1.00"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn ping_probes_the_payments_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entity": "collection",
                "count": 0,
                "items": [],
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(test_client(&server.uri()).ping().await.is_ok());
    }
}
