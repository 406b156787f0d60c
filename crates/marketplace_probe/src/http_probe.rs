use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use region_sweep::{PageObservation, ProbeError, RegionProbe};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode, cookie::Jar};
use tracing::{debug, warn};

use crate::page_classifier::{DEFAULT_NO_RESULTS_MARKERS, DEFAULT_RESULT_SELECTOR, PageClassifier};

/// Errors building a marketplace probe
#[derive(Debug, thiserror::Error)]
pub enum ProbeClientError {
    /// Result selector is not valid CSS
    #[error("Invalid result selector: {0}")]
    InvalidSelector(String),

    /// Configuration cannot produce a working client
    #[error("Invalid probe configuration: {0}")]
    Config(String),
}

/// HTTP settings for [`HttpMarketplaceProbe`]
#[derive(Debug, Clone)]
pub struct ProbeClientConfig {
    /// User agents to rotate through, one picked per check
    pub user_agents: Vec<String>,

    /// reqwest-level request timeout (default: 10 seconds)
    ///
    /// The sweep applies its own, usually shorter, limit on top of this.
    pub request_timeout: Duration,

    /// Texts that mean the region has no listings
    pub no_results_markers: Vec<String>,

    /// CSS selector matching one listing
    pub result_selector: String,
}

impl Default for ProbeClientConfig {
    fn default() -> Self {
        Self {
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            ],
            request_timeout: Duration::from_secs(10),
            no_results_markers: DEFAULT_NO_RESULTS_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            result_selector: DEFAULT_RESULT_SELECTOR.to_string(),
        }
    }
}

/// Checks regions by fetching the marketplace search page over HTTP
///
/// Every call builds its own client and cookie jar, so sessions never leak
/// between regions and are released when the call ends or is dropped.
pub struct HttpMarketplaceProbe {
    classifier: PageClassifier,
    config: ProbeClientConfig,
}

impl HttpMarketplaceProbe {
    /// Create a new marketplace probe
    pub fn new(config: Option<ProbeClientConfig>) -> Result<Self, ProbeClientError> {
        let config = config.unwrap_or_default();

        if config.user_agents.is_empty() {
            return Err(ProbeClientError::Config(
                "At least one user agent is required".to_string(),
            ));
        }

        let classifier =
            PageClassifier::new(config.no_results_markers.clone(), &config.result_selector)?;

        Ok(Self { classifier, config })
    }

    /// Pick a user agent for the next session
    fn pick_user_agent(&self) -> &str {
        let index = rand::rng().random_range(0..self.config.user_agents.len());
        &self.config.user_agents[index]
    }

    /// Build a throwaway client with its own cookie jar
    fn session_client(&self) -> Result<Client, ProbeError> {
        let jar = Arc::new(Jar::default());

        Client::builder()
            .cookie_provider(jar)
            .user_agent(self.pick_user_agent())
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| ProbeError::Probe(format!("Failed to create session client: {}", e)))
    }

    fn map_request_error(&self, e: reqwest::Error) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout(self.config.request_timeout.as_millis() as u64)
        } else {
            ProbeError::Transport(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl RegionProbe for HttpMarketplaceProbe {
    async fn observe(&self, url: &str) -> Result<PageObservation, ProbeError> {
        let client = self.session_client()?;
        debug!("Fetching {}", url);

        let response = client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "ko-KR,ko;q=0.9,en;q=0.5")
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Marketplace rate limited request to {}", url);
            return Err(ProbeError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProbeError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let observation = self.classifier.classify(&body);
        debug!("{} -> {:?}", url, observation);

        Ok(observation)
    }
}
