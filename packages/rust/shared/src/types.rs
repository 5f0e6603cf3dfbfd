//! Core domain types for scrapedesk jobs.

use std::collections::HashSet;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Scheme prefixes accepted when filtering cell content for URLs.
pub const URL_SCHEME_PREFIXES: &[&str] = &["https://", "http://"];

// ---------------------------------------------------------------------------
// CanonicalUrl
// ---------------------------------------------------------------------------

/// A trimmed, non-empty URL string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    /// Accept a typed token as-is after trimming. Returns `None` for blank input.
    ///
    /// Typed input is assumed to be URL-only, so no scheme check is applied.
    pub fn from_token(token: &str) -> Option<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Accept a token only if it starts with a recognized scheme prefix and
    /// parses as an absolute URL with a host.
    pub fn parse_absolute(token: &str) -> Option<Self> {
        let trimmed = token.trim();
        if !has_url_scheme(trimmed) {
            return None;
        }
        match Url::parse(trimmed) {
            Ok(url) if url.has_host() => Some(Self(trimmed.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `s` starts with one of [`URL_SCHEME_PREFIXES`] (ASCII case-insensitive).
pub fn has_url_scheme(s: &str) -> bool {
    URL_SCHEME_PREFIXES.iter().any(|prefix| {
        s.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

// ---------------------------------------------------------------------------
// UrlSet
// ---------------------------------------------------------------------------

/// Ordered list of [`CanonicalUrl`]s, insertion order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlSet(Vec<CanonicalUrl>);

impl UrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, url: CanonicalUrl) {
        self.0.push(url);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalUrl> {
        self.0.iter()
    }

    /// Drop repeated URLs, keeping the first occurrence of each.
    pub fn dedup(self) -> Self {
        let mut seen = HashSet::new();
        self.0
            .into_iter()
            .filter(|url| seen.insert(url.as_str().to_string()))
            .collect()
    }

    /// Plain strings in set order, as sent over the wire.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|u| u.as_str().to_string()).collect()
    }
}

impl FromIterator<CanonicalUrl> for UrlSet {
    fn from_iter<I: IntoIterator<Item = CanonicalUrl>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for UrlSet {
    type Item = CanonicalUrl;
    type IntoIter = std::vec::IntoIter<CanonicalUrl>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a UrlSet {
    type Item = &'a CanonicalUrl;
    type IntoIter = std::slice::Iter<'a, CanonicalUrl>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// ProductUrlResult
// ---------------------------------------------------------------------------

/// Product URLs discovered by the URL discovery phase.
///
/// Shared immutably; clones point at the same underlying set, which is how
/// the detail phase verifies it was handed the current discovery result.
/// Equality compares contents; use [`ProductUrlResult::same_result`] for identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUrlResult(Arc<UrlSet>);

impl ProductUrlResult {
    pub fn new(urls: UrlSet) -> Self {
        Self(Arc::new(urls))
    }

    /// Whether both values came from the same discovery run.
    pub fn same_result(&self, other: &ProductUrlResult) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ProductUrlResult {
    type Target = UrlSet;

    fn deref(&self) -> &UrlSet {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ProductDetailRecord
// ---------------------------------------------------------------------------

/// Details scraped for one product page.
///
/// `None` means the field was not scraped; it is kept distinct from an empty
/// string so exports can tell the two apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetailRecord {
    pub source_url: CanonicalUrl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Result of one detail request.
///
/// `notices` holds messages the service reported in-band, as records that
/// carry text but no product URL (for example a rejected batch).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDetailBatch {
    pub records: Vec<ProductDetailRecord>,
    pub notices: Vec<String>,
}

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle state of one orchestrated phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobPhase {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    /// Succeeded, Failed, or Cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two ordered remote operations a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    UrlDiscovery,
    DetailExtraction,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UrlDiscovery => f.write_str("URL discovery"),
            Self::DetailExtraction => f.write_str("detail extraction"),
        }
    }
}

// ---------------------------------------------------------------------------
// LogEvent
// ---------------------------------------------------------------------------

/// One line of the operator-facing job log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Position in the log; strictly increasing from 0.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// FileKind
// ---------------------------------------------------------------------------

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// `.csv` — read as text.
    Delimited,
    /// `.xlsx` — first worksheet only.
    Spreadsheet,
}

impl FileKind {
    /// Map a file name to its kind by extension. Anything other than
    /// `.csv` or `.xlsx` yields `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(Self::Delimited)
        } else if ext.eq_ignore_ascii_case("xlsx") {
            Some(Self::Spreadsheet)
        } else {
            None
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delimited => f.write_str("delimited"),
            Self::Spreadsheet => f.write_str("spreadsheet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_trimmed_and_blank_rejected() {
        let url = CanonicalUrl::from_token("  https://example.com/c  ").expect("token");
        assert_eq!(url.as_str(), "https://example.com/c");
        assert!(CanonicalUrl::from_token(" \t ").is_none());
    }

    #[test]
    fn strict_parse_requires_scheme_and_host() {
        assert!(CanonicalUrl::parse_absolute("https://a").is_some());
        assert!(CanonicalUrl::parse_absolute("HTTP://example.com/x").is_some());
        assert!(CanonicalUrl::parse_absolute("example.com").is_none());
        assert!(CanonicalUrl::parse_absolute("ftp://example.com").is_none());
        assert!(CanonicalUrl::parse_absolute("https://").is_none());
        assert!(CanonicalUrl::parse_absolute("httpfoo").is_none());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let set: UrlSet = ["https://b", "https://a", "https://b", "https://c", "https://a"]
            .iter()
            .filter_map(|s| CanonicalUrl::from_token(s))
            .collect();
        let deduped = set.dedup();
        assert_eq!(
            deduped.to_strings(),
            vec!["https://b", "https://a", "https://c"]
        );
    }

    #[test]
    fn product_url_result_identity() {
        let urls: UrlSet = CanonicalUrl::from_token("https://a").into_iter().collect();
        let first = ProductUrlResult::new(urls.clone());
        let clone = first.clone();
        let other = ProductUrlResult::new(urls);
        assert!(first.same_result(&clone));
        assert!(!first.same_result(&other));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn job_phase_terminal_states() {
        assert!(!JobPhase::Idle.is_terminal());
        assert!(!JobPhase::Running.is_terminal());
        assert!(JobPhase::Succeeded.is_terminal());
        assert!(JobPhase::Failed.is_terminal());
        assert!(JobPhase::Cancelled.is_terminal());
    }

    #[test]
    fn file_kind_from_extension() {
        assert_eq!(
            FileKind::from_path(Path::new("cats.csv")),
            Some(FileKind::Delimited)
        );
        assert_eq!(
            FileKind::from_path(Path::new("dir/Cats.XLSX")),
            Some(FileKind::Spreadsheet)
        );
        assert_eq!(FileKind::from_path(Path::new("cats.xls")), None);
        assert_eq!(FileKind::from_path(Path::new("cats")), None);
    }

    #[test]
    fn detail_record_omits_absent_fields() {
        let record = ProductDetailRecord {
            source_url: CanonicalUrl::from_token("https://a").expect("url"),
            name: None,
            price: Some(9.99),
            currency: Some("USD".into()),
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert!(json.get("name").is_none());
        assert_eq!(json["price"], 9.99);
    }
}
