use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::sweep_types::{ProbeError, RegionCode, Verdict};

/// Marketplace search URL; `{region}` and `{keyword}` are substituted URL-encoded
pub const DEFAULT_SEARCH_URL_TEMPLATE: &str =
    "https://www.daangn.com/kr/buy-sell/?in={region}&only_on_sale=true&search={keyword}";

/// What a probe saw after loading a search page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageObservation {
    /// The page rendered the marketplace's no-results marker
    NoResults,
    /// At least one listing was rendered
    ResultsPresent {
        /// Number of listing elements matched
        listings: usize,
    },
    /// Neither the marker nor a listing could be identified
    Inconclusive,
}

/// Loads a marketplace search page and reports what it found
///
/// Implementations must tolerate being dropped mid-call: the adapter
/// abandons a call when its timeout elapses.
#[async_trait::async_trait]
pub trait RegionProbe: Send + Sync {
    /// Load `url` and classify the rendered page
    async fn observe(&self, url: &str) -> Result<PageObservation, ProbeError>;
}

/// How to treat a page that is neither "no results" nor a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InconclusivePolicy {
    /// Report the check as an error
    #[default]
    TreatAsError,
    /// Report the check as found
    TreatAsFound,
}

/// Configuration for [`ProbeAdapter`]
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Search URL template (default: the public buy-sell search)
    pub url_template: String,

    /// Hard limit on a single probe call (default: 2 seconds)
    pub timeout: Duration,

    /// Handling of inconclusive pages (default: error)
    pub inconclusive: InconclusivePolicy,

    /// Extra attempts for transient failures (default: 0)
    pub max_retries: u32,

    /// Base delay between attempts, multiplied by the attempt number (default: 2 seconds)
    pub retry_delay: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_SEARCH_URL_TEMPLATE.to_string(),
            timeout: Duration::from_secs(2),
            inconclusive: InconclusivePolicy::default(),
            max_retries: 0,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Turns a region and keyword into a [`Verdict`] by driving a [`RegionProbe`]
pub struct ProbeAdapter {
    probe: Arc<dyn RegionProbe>,
    settings: ProbeSettings,
}

impl ProbeAdapter {
    /// Wrap `probe`; `None` uses [`ProbeSettings::default`]
    pub fn new(probe: Arc<dyn RegionProbe>, settings: Option<ProbeSettings>) -> Self {
        Self {
            probe,
            settings: settings.unwrap_or_default(),
        }
    }

    /// Build the search URL for a region; this URL is also the result key
    pub fn build_search_url(&self, code: &RegionCode, keyword: &str) -> String {
        self.settings
            .url_template
            .replace("{region}", &urlencoding::encode(code.as_str()))
            .replace("{keyword}", &urlencoding::encode(keyword))
    }

    /// Check one region; never fails, errors are folded into the verdict
    pub async fn check(&self, code: &RegionCode, keyword: &str) -> Verdict {
        let url = self.build_search_url(code, keyword);
        let mut attempt = 0;

        loop {
            let verdict = self.check_once(&url).await;

            match &verdict {
                Verdict::Error(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    let delay = self.settings.retry_delay * attempt;
                    warn!(
                        "Region {} check failed ({}), retrying in {:?} (attempt {}/{})",
                        code, e, delay, attempt, self.settings.max_retries
                    );
                    sleep(delay).await;
                }
                _ => {
                    debug!("Region {} -> {:?}", code, verdict);
                    return verdict;
                }
            }
        }
    }

    async fn check_once(&self, url: &str) -> Verdict {
        // A panicking probe must not take its worker down with it.
        let call = AssertUnwindSafe(self.probe.observe(url)).catch_unwind();

        match timeout(self.settings.timeout, call).await {
            Ok(Ok(Ok(observation))) => self.classify(observation, url),
            Ok(Ok(Err(e))) => Verdict::Error(e),
            Ok(Err(panic)) => {
                let cause = panic_message(panic.as_ref());
                warn!("Probe panicked on {}: {}", url, cause);
                Verdict::Error(ProbeError::Probe(format!("probe panicked: {}", cause)))
            }
            Err(_) => Verdict::Error(ProbeError::Timeout(
                self.settings.timeout.as_millis() as u64,
            )),
        }
    }

    fn classify(&self, observation: PageObservation, url: &str) -> Verdict {
        match observation {
            PageObservation::NoResults => Verdict::None,
            PageObservation::ResultsPresent { .. } => Verdict::Found(url.to_string()),
            PageObservation::Inconclusive => match self.settings.inconclusive {
                InconclusivePolicy::TreatAsFound => Verdict::Found(url.to_string()),
                InconclusivePolicy::TreatAsError => Verdict::Error(ProbeError::Inconclusive),
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
