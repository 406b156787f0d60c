use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

/// Identifier for a geographic search scope on the marketplace
///
/// Catalog files store codes either as JSON strings or integers; both forms
/// deserialize to the same textual code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawRegionCode", into = "String")]
pub struct RegionCode(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRegionCode {
    Text(String),
    Number(i64),
}

impl From<RawRegionCode> for RegionCode {
    fn from(raw: RawRegionCode) -> Self {
        match raw {
            RawRegionCode::Text(text) => Self(text),
            RawRegionCode::Number(number) => Self(number.to_string()),
        }
    }
}

impl RegionCode {
    /// Wrap a raw code
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the code as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl From<String> for RegionCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl From<RegionCode> for String {
    fn from(code: RegionCode) -> Self {
        code.0
    }
}

/// Request structure for starting a sweep
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SweepRequest {
    /// Search keyword, sent URL-encoded to the marketplace
    #[validate(custom(function = "validate_keyword"))]
    pub keyword: String,

    /// Regions to check, in dispatch order
    #[validate(length(min = 1, message = "At least one region code is required"))]
    pub region_codes: Vec<RegionCode>,

    /// Maximum number of concurrent probe calls
    #[validate(range(min = 1, message = "Concurrency limit must be positive"))]
    pub concurrency_limit: usize,
}

impl SweepRequest {
    /// Build a request for `keyword` over `region_codes`
    pub fn new(
        keyword: impl Into<String>,
        region_codes: Vec<RegionCode>,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            region_codes,
            concurrency_limit,
        }
    }
}

/// Per-region outcome of a single check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Verdict {
    /// Listings exist; carries the result key (the search URL)
    Found(String),
    /// The marketplace reported no results
    None,
    /// The check failed or could not be classified
    Error(ProbeError),
}

impl Verdict {
    /// Whether this verdict is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Verdict::Error(_))
    }
}

/// Why a single region check failed
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ProbeError {
    /// The hard per-call timeout elapsed
    #[error("Probe timed out after {0} ms")]
    Timeout(u64),

    /// Connection, TLS or body read failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Marketplace answered with an unexpected status
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// Marketplace throttled the request
    #[error("Rate limited by marketplace")]
    RateLimited,

    /// Neither the no-results marker nor any listing was observed
    #[error("Page showed neither listings nor the no-results marker")]
    Inconclusive,

    /// Any other probe failure
    #[error("Probe failure: {0}")]
    Probe(String),
}

impl ProbeError {
    /// Errors worth retrying when retries are enabled
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProbeError::Timeout(_) | ProbeError::Transport(_) | ProbeError::RateLimited
        )
    }
}

/// Events emitted by the scheduler, in emission order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SweepEvent {
    /// A sweep began over `total` regions
    Started {
        /// Number of regions queued
        total: usize,
    },
    /// A region check returned
    RegionChecked {
        /// Region that was checked
        code: RegionCode,
        /// Outcome of the check
        verdict: Verdict,
    },
    /// A result key was seen for the first time
    NewFinding {
        /// Region where the listing appeared
        code: RegionCode,
        /// Dedup key (search URL)
        result_key: String,
    },
    /// Periodic progress signal
    Progress {
        /// Regions checked so far
        done: usize,
        /// Regions queued
        total: usize,
    },
    /// Every queued region was checked
    Completed {
        /// Number of new findings reported this sweep
        new_count: usize,
    },
    /// The sweep was stopped before the queue drained
    Aborted {
        /// Why the sweep stopped
        reason: String,
    },
}

/// Lifecycle of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepState {
    /// No sweep has run yet
    Idle,
    /// Workers are checking regions
    Running,
    /// Queue exhausted, persisting results
    Draining,
    /// Stop requested, waiting for in-flight checks
    Cancelling,
    /// Last sweep finished normally
    Completed,
    /// Last sweep was stopped
    Aborted,
}

impl SweepState {
    /// Whether a sweep is in progress
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SweepState::Running | SweepState::Draining | SweepState::Cancelling
        )
    }
}

/// How a sweep ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// All regions were checked
    Completed,
    /// Stopped early
    Aborted {
        /// Why the sweep stopped
        reason: String,
    },
}

/// Summary returned when a sweep finishes
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    /// Unique identifier for this sweep
    pub sweep_id: Uuid,
    /// Keyword that was searched
    pub keyword: String,
    /// Regions queued
    pub total: usize,
    /// Regions actually checked
    pub checked: usize,
    /// Checks that returned listings (new or already seen)
    pub found: usize,
    /// Checks that failed
    pub errors: usize,
    /// Findings reported for the first time
    pub new_count: usize,
    /// How the sweep ended
    pub outcome: SweepOutcome,
    /// When the sweep started
    pub started_at: DateTime<Utc>,
    /// When the sweep finished
    pub finished_at: DateTime<Utc>,
}

/// Custom error type for sweep operations
#[derive(thiserror::Error, Debug)]
pub enum SweepError {
    /// Invalid request, catalog or engine configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Region selector matched no catalog group
    #[error("Unknown region selector: {selector}")]
    UnknownRegion {
        /// Selector as given by the operator
        selector: String,
    },

    /// Reading or writing the seen-set file failed
    #[error("Persistence error for {}: {}", .path.display(), .source)]
    Persistence {
        /// File that could not be read or written
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The background sweep task panicked or was cancelled
    #[error("Sweep task failed: {0}")]
    Task(String),
}

impl From<ValidationErrors> for SweepError {
    fn from(errors: ValidationErrors) -> Self {
        SweepError::Configuration(errors.to_string())
    }
}

/// Custom validation function for search keywords
fn validate_keyword(keyword: &str) -> Result<(), validator::ValidationError> {
    if keyword.trim().is_empty() {
        return Err(validator::ValidationError::new("empty_keyword"));
    }
    Ok(())
}
