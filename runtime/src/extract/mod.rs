//! Version-dispatched extraction from raw page content to snapshots.
//!
//! The upstream renders game state as server-side HTML plus JSON fragments
//! assigned to inline-script variables, and the markup changes between
//! client versions. Each observed version gets one [`Extractor`]
//! implementation; shared logic never branches on version. Dispatch is an
//! exact lookup on the version tag read from page metadata at login time —
//! an unknown tag is a hard error, never a "closest" guess, because a
//! mismatched extractor silently misparses.
//!
//! All extraction is synchronous: the `scraper` document types are `!Send`
//! and must never be held across an await point.

pub mod v874;

use crate::errors::{BotError, DecodeError};
use crate::snapshot::{AuctionState, OfferOfTheDayState, PageMarkers, ResourcesState};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;

/// Decode contract, one implementation per observed markup version.
///
/// Every operation either yields a complete snapshot or a [`DecodeError`]
/// naming the first field that could not be decoded — never a partial
/// snapshot with defaulted fields.
pub trait Extractor: Send + Sync {
    /// The exact version tag this implementation was written against.
    fn version(&self) -> &'static str;

    /// Decode the auctioneer page.
    fn auction(&self, html: &str) -> Result<AuctionState, DecodeError>;

    /// Decode the daily import offer page.
    fn offer_of_the_day(&self, html: &str) -> Result<OfferOfTheDayState, DecodeError>;

    /// Decode the resource bar from any in-game page.
    fn resources(&self, html: &str) -> Result<ResourcesState, DecodeError>;

    /// Parse session markers (logged-in, under-attack, vacation) from any
    /// fetched page. Markers are best-effort and never fail extraction.
    fn page_markers(&self, html: &str) -> PageMarkers;
}

/// Lookup table from version tag to extractor implementation.
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// An empty registry. Mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registry with every version this build knows how to parse.
    pub fn with_known_versions() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(v874::V874));
        registry
    }

    /// Register an extractor under its own version tag.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors
            .insert(extractor.version().to_string(), extractor);
    }

    /// Exact lookup by version tag.
    ///
    /// Unknown tags are a configuration error surfaced at login time.
    pub fn extractor_for(&self, tag: &str) -> Result<Arc<dyn Extractor>, BotError> {
        self.extractors
            .get(tag)
            .cloned()
            .ok_or_else(|| BotError::UnsupportedVersion(tag.to_string()))
    }

    /// Version tags with a registered extractor.
    pub fn known_versions(&self) -> Vec<&str> {
        self.extractors.keys().map(String::as_str).collect()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_known_versions()
    }
}

/// Read the running client version from page metadata.
///
/// Returns the normalized `major.minor.patch` tag, stripping build
/// suffixes like `-pl2` or `-rc1`. `None` when the page carries no
/// version meta at all.
pub fn detect_version(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse(r#"meta[name="game-version"]"#).expect("version selector is valid");
    let content = document.select(&sel).next()?.value().attr("content")?;
    Some(normalize_version_tag(content))
}

/// `"8.7.4-pl2"` → `"8.7.4"`. Lookup is exact after normalization.
pub fn normalize_version_tag(raw: &str) -> String {
    let base = raw.split('-').next().unwrap_or(raw);
    base.split('.').take(3).collect::<Vec<_>>().join(".")
}

// ── Shared decoding helpers ──────────────────────────────────────────────────

/// Parse a localized numeric cell: thousands separators (`.`, `,`, narrow
/// and non-breaking spaces) stripped. `None` when no digits remain.
pub(crate) fn parse_amount(text: &str) -> Option<i64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse().ok()
}

/// Inner text of the first element matching `selector`, trimmed.
pub(crate) fn select_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| element_text(&el))
}

/// Concatenated, trimmed text of an element.
pub(crate) fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Capture the value of an inline-script variable assignment.
///
/// The upstream renders some state as JavaScript assignments
/// (`var multiplier = {...};`), not HTML attributes. Each variable is
/// matched by a narrowly-scoped pattern over the raw page text so it can
/// be tested against fixed sample fragments in isolation.
pub(crate) fn script_var(html: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).expect("script variable pattern is valid");
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
