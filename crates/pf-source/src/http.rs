//! Polled-HTTP adapter: GET a JSON document once or on a fixed period.

use crate::{decode, AdapterHandle, Delivery, SourceAdapter};
use pf_core::source::SourceKind;
use pf_core::update::{ErrorObserver, UpdateSink};
use pf_core::SourceError;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches `url`, optionally narrows the body to `field`, and delivers it.
///
/// With a positive `repeat` the request is re-issued every period, first one
/// period after start. Requests are independent: a slow response never delays
/// the next tick, and responses are delivered in the order they arrive.
pub struct HttpAdapter {
    url: String,
    field: Option<String>,
    record_mode: bool,
    repeat: Option<Duration>,
    client: HttpClient,
    started: bool,
}

impl HttpAdapter {
    pub fn new(
        url: impl Into<String>,
        field: Option<String>,
        record_mode: bool,
        repeat_ms: u64,
        timeout: Option<Duration>,
    ) -> Result<Self, SourceError> {
        let client = HttpClient::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| SourceError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(url, field, record_mode, repeat_ms, client))
    }

    /// Create an adapter that reuses an existing client.
    pub fn with_client(
        url: impl Into<String>,
        field: Option<String>,
        record_mode: bool,
        repeat_ms: u64,
        client: HttpClient,
    ) -> Self {
        Self {
            url: url.into(),
            field: field.filter(|f| !f.is_empty()),
            record_mode,
            repeat: (repeat_ms > 0).then(|| Duration::from_millis(repeat_ms)),
            client,
            started: false,
        }
    }
}

impl SourceAdapter for HttpAdapter {
    fn url(&self) -> &str {
        &self.url
    }

    fn kind(&self) -> SourceKind {
        match self.repeat {
            Some(period) => SourceKind::HttpPolled {
                interval_ms: Some(period.as_millis() as u64),
            },
            None => SourceKind::HttpOnce,
        }
    }

    fn start(
        &mut self,
        sink: Arc<dyn UpdateSink>,
        observer: Arc<dyn ErrorObserver>,
    ) -> Result<AdapterHandle, SourceError> {
        if self.started {
            return Err(SourceError::AlreadyStarted(self.url.clone()));
        }
        self.started = true;

        let delivery = Delivery::new(self.record_mode, sink, observer);
        let fetch = Fetch {
            client: self.client.clone(),
            url: self.url.clone(),
            field: self.field.clone(),
        };

        let task = match self.repeat {
            None => tokio::spawn(async move { fetch.deliver_once(&delivery).await }),
            Some(period) => {
                info!(url = %self.url, period_ms = period.as_millis() as u64, "polling HTTP source");
                tokio::spawn(poll_forever(fetch, period, delivery))
            }
        };
        Ok(AdapterHandle::new(&self.url, task))
    }
}

#[derive(Clone)]
struct Fetch {
    client: HttpClient,
    url: String,
    field: Option<String>,
}

impl Fetch {
    async fn deliver_once(&self, delivery: &Delivery) {
        delivery.deliver(self.fetch().await);
    }

    async fn fetch(&self) -> Result<Value, SourceError> {
        debug!(url = %self.url, "GET");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::connection(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::connection(
                &self.url,
                format!("request failed with status: {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::connection(&self.url, format!("failed to read body: {e}")))?;
        let value = decode::decode_text(&self.url, &body)?;
        decode::select_field(&self.url, value, self.field.as_deref())
    }
}

/// Issue a request every `period`. In-flight requests live in a `JoinSet` so
/// aborting this task also cancels them.
async fn poll_forever(fetch: Fetch, period: Duration, delivery: Delivery) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fetch = fetch.clone();
                let delivery = delivery.clone();
                in_flight.spawn(async move { fetch.deliver_once(&delivery).await });
            }
            Some(_) = in_flight.join_next() => {}
        }
    }
}
