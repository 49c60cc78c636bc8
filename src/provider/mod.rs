//! # Provider Client
//!
//! Single point of contact with the remote file provider. Every request goes
//! through a spacing gate (at least 100 ms between any two requests on the
//! instance) and a retry engine that distinguishes rate limiting, transient
//! server failures, and terminal responses.
//!
//! Classification:
//! - 429/403: rate limit. Honour the server's `Retry-After` hint (seconds),
//!   falling back to twice the base retry delay; after the retry budget is
//!   spent, surface [`SyncError::RateLimited`] with the last hint.
//! - 5xx and transport errors: exponential backoff capped at 60 s plus up to
//!   1 s of uniform jitter; after the budget, surface the last error.
//! - anything else: propagate immediately, no retry.

pub mod caller;
pub mod types;

pub use caller::{AuthenticatedCaller, BearerCaller, ProviderResponse};

use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{Result, SyncError};
use types::{ChangePage, FileListPage, StartPageTokenResponse};

/// Minimum spacing between any two requests on one client instance.
const MIN_REQUEST_SPACING: Duration = Duration::from_millis(100);

/// Ceiling on the exponential backoff for transient server failures.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Upper bound of the uniform jitter added to each transient backoff.
const MAX_JITTER_MS: u64 = 1_000;

/// Field projection requested for every descriptor.
const DESCRIPTOR_FIELDS: &str =
    "id,name,mimeType,size,createdTime,modifiedTime,md5Checksum,parents,trashed";

/// Rate-limit-aware client for the provider's read API.
pub struct ProviderClient {
    caller: Arc<dyn AuthenticatedCaller>,
    base_url: String,
    max_retries: u32,
    retry_delay_ms: u64,
    last_request: Mutex<Option<Instant>>,
    request_count: AtomicU64,
}

impl ProviderClient {
    /// Create a client over an authenticated caller.
    pub fn new(
        caller: Arc<dyn AuthenticatedCaller>,
        base_url: impl Into<String>,
        max_retries: u32,
        retry_delay_ms: u64,
    ) -> Self {
        Self {
            caller,
            base_url: base_url.into(),
            max_retries,
            retry_delay_ms,
            last_request: Mutex::new(None),
            request_count: AtomicU64::new(0),
        }
    }

    /// Total requests issued by this instance, including retries.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// List current descriptors, one page at a time. Trashed entries are
    /// excluded server-side.
    #[instrument(skip(self))]
    pub async fn list_descriptors(
        &self,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<FileListPage> {
        let mut url = self.endpoint("files")?;
        url.query_pairs_mut()
            .append_pair("q", "trashed=false")
            .append_pair("pageSize", &page_size.to_string())
            .append_pair(
                "fields",
                &format!("nextPageToken,files({})", DESCRIPTOR_FIELDS),
            );
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let response = self.execute_with_retry(url.as_str()).await?;
        let page: FileListPage = serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Parse(format!("descriptor list page: {}", e)))?;

        debug!(
            files = page.files.len(),
            has_next = page.next_page_token.is_some(),
            "Listed descriptor page"
        );
        Ok(page)
    }

    /// List change records starting from a cursor.
    #[instrument(skip(self))]
    pub async fn list_changes(&self, page_token: &str) -> Result<ChangePage> {
        let mut url = self.endpoint("changes")?;
        url.query_pairs_mut()
            .append_pair("pageToken", page_token)
            .append_pair(
                "fields",
                &format!(
                    "nextPageToken,newStartPageToken,changes(removed,fileId,file({}))",
                    DESCRIPTOR_FIELDS
                ),
            );

        let response = self.execute_with_retry(url.as_str()).await?;
        let page: ChangePage = serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Parse(format!("change list page: {}", e)))?;

        debug!(
            changes = page.changes.len(),
            has_next = page.next_page_token.is_some(),
            "Listed change page"
        );
        Ok(page)
    }

    /// Obtain a cursor positioned at the current head of the change log.
    #[instrument(skip(self))]
    pub async fn start_page_token(&self) -> Result<String> {
        let url = self.endpoint("changes/startPageToken")?;
        let response = self.execute_with_retry(url.as_str()).await?;
        let token: StartPageTokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Parse(format!("start page token: {}", e)))?;
        Ok(token.start_page_token)
    }

    async fn execute_with_retry(&self, url: &str) -> Result<ProviderResponse> {
        let mut attempt: u32 = 0;

        loop {
            self.wait_for_spacing().await;
            self.request_count.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("provider_requests_total").increment(1);

            match self.caller.get(url).await {
                Ok(response) if (200..300).contains(&response.status) => return Ok(response),

                Ok(response) if response.status == 429 || response.status == 403 => {
                    attempt += 1;
                    let hint_ms = response
                        .retry_after_secs()
                        .map(|secs| secs * 1_000)
                        .unwrap_or(self.retry_delay_ms * 2);
                    if attempt > self.max_retries {
                        return Err(SyncError::RateLimited {
                            retry_after_ms: hint_ms,
                        });
                    }
                    metrics::counter!("provider_retries_total", "reason" => "rate_limit")
                        .increment(1);
                    warn!(
                        status = response.status,
                        attempt,
                        delay_ms = hint_ms,
                        "Provider rate limited the request, backing off"
                    );
                    sleep(Duration::from_millis(hint_ms)).await;
                }

                Ok(response) if (500..600).contains(&response.status) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(SyncError::TransientRemote {
                            status: response.status,
                            message: response.body_snippet(),
                        });
                    }
                    let delay_ms = self.transient_backoff_ms(attempt - 1);
                    metrics::counter!("provider_retries_total", "reason" => "server_error")
                        .increment(1);
                    warn!(
                        status = response.status,
                        attempt,
                        delay_ms,
                        "Provider returned a server error, backing off"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }

                Ok(response) => {
                    return Err(SyncError::TerminalRemote {
                        status: response.status,
                        message: response.body_snippet(),
                    });
                }

                Err(err @ SyncError::Transport(_)) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(err);
                    }
                    let delay_ms = self.transient_backoff_ms(attempt - 1);
                    metrics::counter!("provider_retries_total", "reason" => "transport")
                        .increment(1);
                    warn!(error = %err, attempt, delay_ms, "Transport error, backing off");
                    sleep(Duration::from_millis(delay_ms)).await;
                }

                Err(err) => return Err(err),
            }
        }
    }

    /// Exponential backoff capped at [`MAX_BACKOFF_MS`] plus uniform jitter.
    /// `prior_failures` is zero-based, so the first retry waits roughly the
    /// base delay.
    fn transient_backoff_ms(&self, prior_failures: u32) -> u64 {
        let exp = self
            .retry_delay_ms
            .saturating_mul(1u64 << prior_failures.min(16))
            .min(MAX_BACKOFF_MS);
        exp + rand::thread_rng().gen_range(0..=MAX_JITTER_MS)
    }

    /// Enforce the spacing gate. The lock is held across the sleep so
    /// concurrent callers queue behind it, which is exactly the per-instance
    /// spacing guarantee.
    async fn wait_for_spacing(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_SPACING {
                sleep(MIN_REQUEST_SPACING - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| SyncError::Parse(format!("endpoint url: {}", e)))
    }
}
