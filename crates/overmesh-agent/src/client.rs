//! HTTP client for the lease controller
//!
//! [`ControllerClient`] is the agent's only view of the controller. A 409 from
//! renew surfaces as [`ClientError::Rejected`], the non-retriable kind the
//! fatal error detector escalates on; everything else is ordinary.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use overmesh_lease::Lease;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Result type for controller client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Operations the agent needs from the controller
#[async_trait]
pub trait ControllerClient: Send + Sync {
    async fn acquire_subnet_lease(&self, underlay_ip: &str, single_overlay_ip: bool)
        -> Result<Lease>;

    async fn renew_subnet_lease(&self, lease: &Lease) -> Result<()>;

    async fn release_subnet_lease(&self, underlay_ip: &str) -> Result<()>;

    async fn get_active_leases(&self) -> Result<Vec<Lease>>;
}

#[derive(Debug, Serialize)]
struct AcquireRequest<'a> {
    underlay_ip: &'a str,
    single_overlay_ip: bool,
}

#[derive(Debug, Serialize)]
struct ReleaseRequest<'a> {
    underlay_ip: &'a str,
}

#[derive(Debug, Deserialize)]
struct LeasesResponse {
    leases: Vec<Lease>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// reqwest-backed controller client
#[derive(Debug, Clone)]
pub struct HttpControllerClient {
    client: Client,
    base_url: String,
}

impl HttpControllerClient {
    /// Create a client for the controller at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url)
    }

    /// Convert a non-success response into an error
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&error_text)
            .map(|e| e.message)
            .unwrap_or(error_text);

        match status {
            StatusCode::CONFLICT => Err(ClientError::Rejected(message)),
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T> {
        Self::check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClientError::Deserialize(e.to_string()))
    }
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    async fn acquire_subnet_lease(
        &self,
        underlay_ip: &str,
        single_overlay_ip: bool,
    ) -> Result<Lease> {
        let response = self
            .request(reqwest::Method::PUT, "/leases/acquire")
            .json(&AcquireRequest {
                underlay_ip,
                single_overlay_ip,
            })
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn renew_subnet_lease(&self, lease: &Lease) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, "/leases/renew")
            .json(lease)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn release_subnet_lease(&self, underlay_ip: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, "/leases/release")
            .json(&ReleaseRequest { underlay_ip })
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn get_active_leases(&self) -> Result<Vec<Lease>> {
        let response = self.request(reqwest::Method::GET, "/leases").send().await?;

        let body: LeasesResponse = Self::handle_response(response).await?;
        Ok(body.leases)
    }
}

/// A controller client driven by scripted responses
///
/// Each call pops the next scripted result for that operation; once the
/// script runs dry renew and release succeed, acquire fails and active
/// leases come back empty. Calls are recorded for assertions.
#[derive(Default)]
pub struct MockControllerClient {
    acquire: Mutex<VecDeque<Result<Lease>>>,
    renew: Mutex<VecDeque<Result<()>>>,
    active: Mutex<VecDeque<Result<Vec<Lease>>>>,
    calls: Mutex<Vec<String>>,
}

impl MockControllerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_acquire(&self, result: Result<Lease>) {
        self.acquire.lock().push_back(result);
    }

    pub fn push_renew(&self, result: Result<()>) {
        self.renew.lock().push_back(result);
    }

    pub fn push_active(&self, result: Result<Vec<Lease>>) {
        self.active.lock().push_back(result);
    }

    /// Calls made so far, as `op` or `op:arg`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ControllerClient for MockControllerClient {
    async fn acquire_subnet_lease(
        &self,
        underlay_ip: &str,
        _single_overlay_ip: bool,
    ) -> Result<Lease> {
        self.calls.lock().push(format!("acquire:{underlay_ip}"));
        self.acquire.lock().pop_front().unwrap_or_else(|| {
            Err(ClientError::Api {
                status: 503,
                message: "no lease available".to_string(),
            })
        })
    }

    async fn renew_subnet_lease(&self, lease: &Lease) -> Result<()> {
        self.calls
            .lock()
            .push(format!("renew:{}", lease.underlay_ip));
        self.renew.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn release_subnet_lease(&self, underlay_ip: &str) -> Result<()> {
        self.calls.lock().push(format!("release:{underlay_ip}"));
        Ok(())
    }

    async fn get_active_leases(&self) -> Result<Vec<Lease>> {
        self.calls.lock().push("active".to_string());
        self.active.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client =
            HttpControllerClient::new("http://127.0.0.1:4103/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:4103");
    }

    #[tokio::test]
    async fn test_unreachable_controller_is_transient() {
        // Port 9 (discard) is closed on loopback in test environments
        let client =
            HttpControllerClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();

        let err = client.get_active_leases().await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
        assert!(!err.kind().is_non_retriable());
    }

    #[tokio::test]
    async fn test_mock_scripts_and_records() {
        let mock = MockControllerClient::new();
        mock.push_renew(Err(ClientError::Rejected("mismatch".into())));

        let lease = Lease {
            underlay_ip: "10.0.0.1".into(),
            overlay_subnet: "10.255.1.0/24".into(),
            overlay_hardware_addr: "ee:ee:0a:ff:01:00".into(),
        };
        assert!(mock.renew_subnet_lease(&lease).await.is_err());
        assert!(mock.renew_subnet_lease(&lease).await.is_ok());
        assert!(mock.acquire_subnet_lease("10.0.0.1", false).await.is_err());

        assert_eq!(
            mock.calls(),
            vec!["renew:10.0.0.1", "renew:10.0.0.1", "acquire:10.0.0.1"]
        );
    }
}
