/// Outbound delivery of drained event batches.
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use tokio::time::Duration;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::models::{Event, Point};

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Seam between the batch scheduler and the outbound transport. The only
/// observable outcome is success or failure; a failure means the caller
/// must requeue the batch.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
    async fn send(&self, device_id: &str, events: &[Event]) -> Result<()>;
}

/// Envelope posted to the ingestion endpoint: `{"e": [{n, v, t}, ...]}`.
#[derive(Serialize)]
struct Envelope<'a> {
    e: &'a [Point],
}

/// HTTP delivery to the time-series ingestion endpoint.
///
/// POSTs the JSON envelope to `<base>/<deviceID>` with the pre-shared key
/// as basic auth username and an empty password. Anything other than
/// HTTP 200 is a failure.
pub struct HttpDeliveryClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl HttpDeliveryClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        // A trailing slash keeps Url::join from replacing the last path
        // segment of the base.
        let mut base = config.ingest_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(HttpDeliveryClient {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn series_url(&self, device_id: &str) -> Result<Url> {
        Ok(self.base_url.join(device_id)?)
    }
}

#[async_trait]
impl Delivery for HttpDeliveryClient {
    async fn send(&self, device_id: &str, events: &[Event]) -> Result<()> {
        let points: Vec<Point> = events.iter().flat_map(|e| e.points()).collect();
        let url = self.series_url(device_id)?;
        debug!(
            "Sending {} points for device {} to {}",
            points.len(),
            device_id,
            url
        );

        let response = self
            .client
            .post(url)
            .basic_auth(&self.api_key, Some(""))
            .json(&Envelope { e: &points })
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 200 {
            Ok(())
        } else {
            Err(GatewayError::UpstreamStatus(status.as_u16()))
        }
    }
}
