use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use tracing::info;

use shared::BookingError;

/// Capture status the gateway reports for a completed payment.
pub const CAPTURE_COMPLETED: &str = "COMPLETED";

#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub order_id: String,
    pub approval_url: String,
}

/// The external payment service, a black box reachable over HTTPS: create an
/// order the user approves out-of-band, then capture it on callback.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: &BigDecimal,
        currency: &str,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<PaymentOrder, BookingError>;

    /// Returns the gateway's capture status string; anything other than
    /// [`CAPTURE_COMPLETED`] means the payment did not go through.
    async fn capture_order(&self, token: &str) -> Result<String, BookingError>;
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    links: Vec<OrderLink>,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    status: String,
}

/// HTTP gateway client. Requests carry a short timeout; a timed-out call is
/// treated as failed, never as partially applied.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String) -> Result<Self, BookingError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| BookingError::PaymentGateway(e.to_string()))?;
        Ok(Self { client, base_url })
    }
}

fn gateway_error(err: reqwest::Error) -> BookingError {
    BookingError::PaymentGateway(err.to_string())
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(
        &self,
        amount: &BigDecimal,
        currency: &str,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<PaymentOrder, BookingError> {
        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": currency,
                    "value": amount.with_scale(2).to_string(),
                }
            }],
            "application_context": {
                "return_url": return_url,
                "cancel_url": cancel_url,
            }
        });

        let response: OrderResponse = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(gateway_error)?
            .error_for_status()
            .map_err(gateway_error)?
            .json()
            .await
            .map_err(gateway_error)?;

        let approval_url = response
            .links
            .iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href.clone())
            .ok_or_else(|| {
                BookingError::PaymentGateway("order response carried no approval link".to_string())
            })?;

        info!(order_id = %response.id, "payment order created");
        Ok(PaymentOrder {
            order_id: response.id,
            approval_url,
        })
    }

    async fn capture_order(&self, token: &str) -> Result<String, BookingError> {
        let response: CaptureResponse = self
            .client
            .post(format!("{}/v2/checkout/orders/{token}/capture", self.base_url))
            .send()
            .await
            .map_err(gateway_error)?
            .error_for_status()
            .map_err(gateway_error)?
            .json()
            .await
            .map_err(gateway_error)?;

        Ok(response.status)
    }
}
