use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Camera, CameraError, LiveStream};

/// Camera exposing a single-JPEG endpoint, fetched at a fixed rate.
pub struct PollingCamera {
    url: String,
    interval: Duration,
    connect_timeout: Duration,
}

impl PollingCamera {
    pub fn new(url: impl Into<String>, interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            interval,
            connect_timeout,
        }
    }
}

impl Camera for PollingCamera {
    type Stream = LiveStream;

    async fn open(&self) -> Result<LiveStream, CameraError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.connect_timeout + self.interval)
            .build()
            .map_err(CameraError::Client)?;

        // The first fetch doubles as the device check.
        let first = fetch_frame(&client, &self.url).await?;
        info!(url = self.url, interval = ?self.interval, "polling camera frames");

        let (latest, rx) = watch::channel(Some(first));
        let feeder = tokio::spawn(poll_latest(
            client,
            self.url.clone(),
            self.interval,
            latest,
        ));
        Ok(LiveStream::new(rx, feeder))
    }
}

async fn fetch_frame(client: &reqwest::Client, url: &str) -> Result<Bytes, CameraError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(CameraError::Connect)?;
    if !resp.status().is_success() {
        return Err(CameraError::Status(resp.status().as_u16()));
    }
    resp.bytes().await.map_err(CameraError::Stream)
}

async fn poll_latest(
    client: reqwest::Client,
    url: String,
    interval: Duration,
    latest: watch::Sender<Option<Bytes>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately and the first frame is already in.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match fetch_frame(&client, &url).await {
            Ok(jpeg) => {
                debug!(bytes = jpeg.len(), "frame fetched");
                latest.send_replace(Some(jpeg));
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch camera frame");
            }
        }
    }
}
