use crate::ports::outbound::{FetchBatch, SignalRequest, SignalTransport};
use crate::shared::error::FetchError;
use crate::shared::security::validate_package_name;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Pooling, pacing and retry settings shared by every endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Minimum gap between two request starts
    pub delay: Duration,
    pub max_connections: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Identifiers per request for batched endpoints
    pub batch_size: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            max_connections: 10,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(5),
            batch_size: 100,
        }
    }
}

/// Payloads and misses parsed out of one successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChunk<P> {
    pub found: Vec<P>,
    pub misses: Vec<String>,
}

impl<P> ParsedChunk<P> {
    pub fn found(found: Vec<P>) -> Self {
        Self {
            found,
            misses: Vec::new(),
        }
    }
}

/// Request template and payload parser for one metadata endpoint.
pub trait SignalEndpoint: Send + Sync {
    type Payload: Send;

    fn name(&self) -> &'static str;

    /// Whether one request carries a whole batch of identifiers.
    fn batched(&self) -> bool {
        false
    }

    fn request(&self, identifiers: &[String]) -> Result<SignalRequest, FetchError>;

    fn parse(
        &self,
        identifiers: &[String],
        body: &str,
    ) -> Result<ParsedChunk<Self::Payload>, FetchError>;
}

/// One page of a cursor-paged response.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<P> {
    pub found: Vec<P>,
    /// Cursor of the following page; `None` on the last page
    pub next_cursor: Option<String>,
}

/// Request template and page parser for an endpoint that answers one
/// identifier across several cursor-linked pages.
pub trait PagedSignalEndpoint: Send + Sync {
    type Payload: Send;

    fn name(&self) -> &'static str;

    fn page_request(
        &self,
        identifier: &str,
        cursor: Option<&str>,
    ) -> Result<SignalRequest, FetchError>;

    fn parse_page(&self, identifier: &str, body: &str) -> Result<Page<Self::Payload>, FetchError>;
}

/// Upper bound on pages followed for a single identifier
pub const MAX_PAGES: usize = 50;

/// Shared fetcher: splits identifiers into chunks, bounds in-flight
/// requests, paces request starts and retries transient failures.
pub struct SignalFetcher<E> {
    transport: Arc<dyn SignalTransport>,
    endpoint: E,
    settings: FetchSettings,
    next_slot: Mutex<Option<Instant>>,
}

impl<E> SignalFetcher<E> {
    pub fn new(transport: Arc<dyn SignalTransport>, endpoint: E, settings: FetchSettings) -> Self {
        Self {
            transport,
            endpoint,
            settings,
            next_slot: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Sends `request` with pacing, retrying transient failures.
    ///
    /// A 404 becomes [`FetchError::NotFound`] for `label`; other non-2xx
    /// statuses become [`FetchError::Status`].
    async fn send<T, F>(
        &self,
        endpoint: &'static str,
        request: &SignalRequest,
        label: &str,
        parse: F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, FetchError>,
    {
        let mut attempt = 0;
        loop {
            self.pace().await;
            match self.attempt(request, label, &parse).await {
                Ok(parsed) => return Ok(parsed),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    let wait = self.backoff(attempt);
                    debug!(
                        endpoint,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "retrying fetch"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<T, F>(
        &self,
        request: &SignalRequest,
        label: &str,
        parse: &F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, FetchError>,
    {
        let response = self.transport.execute(request).await?;
        match response.status {
            200..=299 => parse(&response.body),
            404 => Err(FetchError::NotFound {
                identifier: label.to_string(),
            }),
            status => Err(FetchError::Status { status }),
        }
    }
}

impl<E: SignalEndpoint> SignalFetcher<E> {
    /// Fetches every identifier; misses and failures come back as values.
    pub async fn fetch(&self, identifiers: &[String]) -> FetchBatch<E::Payload> {
        let chunk_size = if self.endpoint.batched() {
            self.settings.batch_size.max(1)
        } else {
            1
        };
        let chunks: Vec<Vec<String>> = identifiers
            .chunks(chunk_size)
            .map(<[String]>::to_vec)
            .collect();

        let outcomes: Vec<_> = stream::iter(chunks)
            .map(|chunk| async move {
                let outcome = self.fetch_chunk(&chunk).await;
                (chunk, outcome)
            })
            .buffered(self.settings.max_connections.max(1))
            .collect()
            .await;

        let mut batch = FetchBatch::default();
        for (chunk, outcome) in outcomes {
            match outcome {
                Ok(parsed) => {
                    batch.found.extend(parsed.found);
                    batch.misses.extend(parsed.misses);
                }
                Err(e) if e.is_miss() => batch.misses.extend(chunk),
                Err(e) => {
                    warn!(
                        endpoint = self.endpoint.name(),
                        identifiers = chunk.len(),
                        error = %e,
                        "fetch failed after retries"
                    );
                    batch
                        .failures
                        .extend(chunk.into_iter().map(|id| (id, e.clone())));
                }
            }
        }
        debug!(
            endpoint = self.endpoint.name(),
            found = batch.found.len(),
            misses = batch.misses.len(),
            failures = batch.failures.len(),
            "fetch finished"
        );
        batch
    }

    async fn fetch_chunk(&self, chunk: &[String]) -> Result<ParsedChunk<E::Payload>, FetchError> {
        let request = self.endpoint.request(chunk)?;
        self.send(self.endpoint.name(), &request, &chunk.join(","), |body| {
            self.endpoint.parse(chunk, body)
        })
        .await
    }
}

impl<E: PagedSignalEndpoint> SignalFetcher<E> {
    /// Fetches every page for each identifier.
    ///
    /// Identifiers run concurrently; pages of one identifier run in order. A
    /// failure on any page fails that identifier and drops its earlier pages.
    pub async fn fetch_paged(&self, identifiers: &[String]) -> FetchBatch<E::Payload> {
        let outcomes: Vec<_> = stream::iter(identifiers.iter().cloned())
            .map(|identifier| async move {
                let outcome = self.fetch_all_pages(&identifier).await;
                (identifier, outcome)
            })
            .buffered(self.settings.max_connections.max(1))
            .collect()
            .await;

        let mut batch = FetchBatch::default();
        for (identifier, outcome) in outcomes {
            match outcome {
                Ok(found) => batch.found.extend(found),
                Err(e) if e.is_miss() => batch.misses.push(identifier),
                Err(e) => {
                    warn!(
                        endpoint = self.endpoint.name(),
                        %identifier,
                        error = %e,
                        "paged fetch failed after retries"
                    );
                    batch.failures.push((identifier, e));
                }
            }
        }
        debug!(
            endpoint = self.endpoint.name(),
            found = batch.found.len(),
            misses = batch.misses.len(),
            failures = batch.failures.len(),
            "paged fetch finished"
        );
        batch
    }

    async fn fetch_all_pages(&self, identifier: &str) -> Result<Vec<E::Payload>, FetchError> {
        let mut found = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let request = self.endpoint.page_request(identifier, cursor.as_deref())?;
            let page = self
                .send(self.endpoint.name(), &request, identifier, |body| {
                    self.endpoint.parse_page(identifier, body)
                })
                .await?;
            found.extend(page.found);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(found),
            }
        }
        warn!(
            endpoint = self.endpoint.name(),
            identifier,
            pages = MAX_PAGES,
            "page limit reached; keeping the pages fetched so far"
        );
        Ok(found)
    }
}

impl<E> SignalFetcher<E> {
    /// Reserves the next request slot and sleeps until it opens.
    ///
    /// The lock only guards the slot bookkeeping and is released before
    /// sleeping.
    async fn pace(&self) {
        if self.settings.delay.is_zero() {
            return;
        }
        let wait = {
            let mut next_slot = match self.next_slot.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let slot = next_slot.map_or(now, |slot| slot.max(now));
            *next_slot = Some(slot + self.settings.delay);
            slot.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Exponential backoff capped at the max delay, plus jitter below the
    /// base delay.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.settings.retry_base_delay;
        let exponential = base.saturating_mul(1u32 << attempt.min(16));
        let base_ms = base.as_millis() as u64;
        let jitter = if base_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis((uuid::Uuid::new_v4().as_u128() % u128::from(base_ms)) as u64)
        };
        exponential.saturating_add(jitter).min(self.settings.retry_max_delay)
    }
}

/// Maps a body that does not deserialize into a retryable failure.
pub(super) fn malformed(error: serde_json::Error) -> FetchError {
    FetchError::Malformed {
        details: error.to_string(),
    }
}

/// Rejects a package name before it is placed in a request URL.
pub(super) fn checked_package_name(name: &str) -> Result<(), FetchError> {
    validate_package_name(name).map_err(|e| FetchError::InvalidRequest {
        details: e.to_string(),
    })
}

/// Encodes a package name as a single path segment, keeping a leading `@`.
pub(super) fn encode_package_name(name: &str) -> String {
    match name.strip_prefix('@') {
        Some(scoped) => format!("@{}", urlencoding::encode(scoped)),
        None => urlencoding::encode(name).into_owned(),
    }
}
