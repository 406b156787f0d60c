use region_sweep::PageObservation;
use scraper::{Html, Selector};

use crate::http_probe::ProbeClientError;

/// Phrases the marketplace renders when a region has no matching listings
pub const DEFAULT_NO_RESULTS_MARKERS: [&str; 3] = [
    "검색어를 수정하시거나",
    "검색 결과가 없습니다",
    "근처엔 없어요",
];

/// Anchor elements pointing at individual buy-sell listings
pub const DEFAULT_RESULT_SELECTOR: &str = r#"a[href*="/kr/buy-sell/"][data-gtm="search_article"], article a[href*="/kr/buy-sell/"]"#;

/// Classifies a search page as empty, populated or unknown
#[derive(Debug, Clone)]
pub struct PageClassifier {
    no_results_markers: Vec<String>,
    result_selector: Selector,
}

impl PageClassifier {
    /// Build a classifier; fails if `result_selector` is not valid CSS
    pub fn new(
        no_results_markers: Vec<String>,
        result_selector: &str,
    ) -> Result<Self, ProbeClientError> {
        let result_selector = Selector::parse(result_selector)
            .map_err(|e| ProbeClientError::InvalidSelector(format!("{}: {}", result_selector, e)))?;

        Ok(Self {
            no_results_markers,
            result_selector,
        })
    }

    /// Inspect a page body
    ///
    /// The no-results marker wins over listings, since the marketplace shows
    /// "popular nearby" items under an empty search.
    pub fn classify(&self, html: &str) -> PageObservation {
        let document = Html::parse_document(html);
        let text: String = document.root_element().text().collect();

        if self
            .no_results_markers
            .iter()
            .any(|marker| text.contains(marker.as_str()))
        {
            return PageObservation::NoResults;
        }

        let listings = document.select(&self.result_selector).count();
        if listings > 0 {
            PageObservation::ResultsPresent { listings }
        } else {
            PageObservation::Inconclusive
        }
    }
}
