//! Wire shapes of the scraping service.
//!
//! The service contract is loose: list endpoints answer either with a wrapper
//! object or a bare array, and detail records come in snake_case or camelCase
//! with prices as numbers or display strings. Everything is folded into the
//! shared domain types here so callers never see the variations.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use scrapedesk_shared::{CanonicalUrl, ProductDetailBatch, ProductDetailRecord, UrlSet};

/// Marker the service uses for fields it could not scrape.
const NOT_AVAILABLE: &str = "N/A";

/// One run of digits with optional grouping or decimal separators.
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("number regex"));

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductUrlsRequest<'a> {
    pub category_urls: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductDetailsRequest<'a> {
    pub product_urls: &'a [String],
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProductUrlsResponse {
    Wrapped {
        #[serde(rename = "productUrls")]
        product_urls: Vec<String>,
    },
    Bare(Vec<String>),
}

impl ProductUrlsResponse {
    pub fn into_url_set(self) -> UrlSet {
        let raw = match self {
            Self::Wrapped { product_urls } => product_urls,
            Self::Bare(urls) => urls,
        };
        raw.iter()
            .filter_map(|url| {
                let parsed = CanonicalUrl::parse_absolute(url);
                if parsed.is_none() {
                    warn!(%url, "dropping malformed product URL from service response");
                }
                parsed
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProductDetailsResponse {
    Wrapped {
        #[serde(rename = "productDetails")]
        product_details: Vec<WireDetail>,
    },
    Bare(Vec<WireDetail>),
}

impl ProductDetailsResponse {
    /// Split the response into detail records and in-band service notices.
    ///
    /// Entries without a usable URL are not products; the text they carry
    /// (e.g. a rejected batch) becomes a notice.
    pub fn into_batch(self) -> ProductDetailBatch {
        let raw = match self {
            Self::Wrapped { product_details } => product_details,
            Self::Bare(details) => details,
        };

        let mut batch = ProductDetailBatch::default();
        for detail in raw {
            match detail.into_record() {
                Ok(record) => batch.records.push(record),
                Err(rejected) => {
                    warn!(
                        url = ?rejected.url,
                        name = ?rejected.product_name,
                        "detail entry without a usable URL"
                    );
                    if let Some(notice) = rejected.notice() {
                        batch.notices.push(notice);
                    }
                }
            }
        }
        batch
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDetail {
    #[serde(default, alias = "sourceUrl", alias = "source_url")]
    url: Option<String>,
    #[serde(default, alias = "productName", alias = "name")]
    product_name: Option<String>,
    #[serde(default)]
    price: Option<WirePrice>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePrice {
    Number(f64),
    Text(String),
}

impl WireDetail {
    /// The domain record, or `self` back when the entry has no usable URL.
    fn into_record(self) -> Result<ProductDetailRecord, Self> {
        let Some(source_url) = self.url.as_deref().and_then(CanonicalUrl::parse_absolute) else {
            return Err(self);
        };

        Ok(ProductDetailRecord {
            source_url,
            name: self.product_name.and_then(scraped_text),
            price: self.price.and_then(|p| match p {
                WirePrice::Number(n) => Some(n),
                WirePrice::Text(text) => parse_price(&text),
            }),
            currency: self.currency.and_then(scraped_text),
        })
    }

    fn notice(self) -> Option<String> {
        self.product_name
            .and_then(scraped_text)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}

/// `None` for the service's "not available" marker, the value otherwise.
fn scraped_text(value: String) -> Option<String> {
    if value.trim() == NOT_AVAILABLE {
        None
    } else {
        Some(value)
    }
}

/// Parse a display price such as `"$1,299.00"`, `"1.299,00 €"` or `"₹ 1,49,999"`.
///
/// Exactly one number must appear. A trailing separator followed by one or
/// two digits is the decimal mark; any other separators must form regular
/// digit groups. Anything else is `None`.
pub(crate) fn parse_price(text: &str) -> Option<f64> {
    let mut numbers = NUMBER_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',']));
    let token = numbers.next()?;
    if numbers.next().is_some() {
        return None;
    }

    let (whole, fraction) = split_decimal(token)?;
    let whole = strip_grouping(whole)?;
    let number = if fraction.is_empty() {
        whole
    } else {
        format!("{whole}.{fraction}")
    };
    number.parse().ok()
}

fn split_decimal(token: &str) -> Option<(&str, &str)> {
    match token.rfind(['.', ',']) {
        Some(i) if (1..=2).contains(&(token.len() - i - 1)) => {
            let mark = &token[i..=i];
            let whole = &token[..i];
            if whole.contains(mark) {
                return None;
            }
            Some((whole, &token[i + 1..]))
        }
        _ => Some((token, "")),
    }
}

fn strip_grouping(whole: &str) -> Option<String> {
    if whole.contains('.') && whole.contains(',') {
        return None;
    }
    let groups: Vec<&str> = whole.split(['.', ',']).collect();
    let (head, rest) = groups.split_first()?;
    if rest.is_empty() {
        return Some(head.to_string());
    }
    let regular = head.len() <= 3
        && rest.last().is_some_and(|g| g.len() == 3)
        && rest.iter().all(|g| g.len() == 2 || g.len() == 3);
    regular.then(|| groups.concat())
}

/// Optional `{ "message": ... }` error body.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_accept_both_shapes() {
        let wrapped: ProductUrlsResponse =
            serde_json::from_str(r#"{"productUrls":["https://a/dp/1","https://a/dp/2"]}"#)
                .expect("wrapped");
        let bare: ProductUrlsResponse =
            serde_json::from_str(r#"["https://a/dp/1","https://a/dp/2"]"#).expect("bare");
        assert_eq!(wrapped.into_url_set(), bare.into_url_set());
    }

    #[test]
    fn malformed_product_urls_are_dropped() {
        let resp: ProductUrlsResponse =
            serde_json::from_str(r#"["/dp/relative","https://a/dp/1",""]"#).expect("bare");
        assert_eq!(resp.into_url_set().to_strings(), vec!["https://a/dp/1"]);
    }

    #[test]
    fn detail_records_map_service_fields() {
        let resp: ProductDetailsResponse = serde_json::from_str(
            r#"{"productDetails":[
                {"url":"https://a/dp/1","product_name":"Kettle","price":"$1,299.00","currency":"$"},
                {"url":"https://a/dp/2","product_name":"BLOCKED","price":"N/A","currency":"N/A"},
                {"sourceUrl":"https://a/dp/3","productName":"","price":9.99,"currency":"USD"},
                {"url":null,"product_name":"ERROR: Too many URLs","price":"N/A","currency":"N/A"}
            ]}"#,
        )
        .expect("details");
        let batch = resp.into_batch();
        let records = &batch.records;
        assert_eq!(records.len(), 3);
        assert_eq!(batch.notices, vec!["ERROR: Too many URLs"]);

        assert_eq!(records[0].name.as_deref(), Some("Kettle"));
        assert_eq!(records[0].price, Some(1299.0));
        assert_eq!(records[0].currency.as_deref(), Some("$"));

        assert_eq!(records[1].price, None);
        assert_eq!(records[1].currency, None);

        // scraped-but-empty stays distinct from absent
        assert_eq!(records[2].name.as_deref(), Some(""));
        assert_eq!(records[2].price, Some(9.99));
    }

    #[test]
    fn price_parsing() {
        assert_eq!(parse_price("$19.99"), Some(19.99));
        assert_eq!(parse_price("₹ 1,499"), Some(1499.0));
        assert_eq!(parse_price("TOO_LARGE"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("1.2.3"), None);
    }

    #[test]
    fn price_parsing_handles_regional_formats() {
        assert_eq!(parse_price("1.299,00 €"), Some(1299.0));
        assert_eq!(parse_price("Rs. 499"), Some(499.0));
        assert_eq!(parse_price("$1,299.00"), Some(1299.0));
        assert_eq!(parse_price("£12,50"), Some(12.5));
        assert_eq!(parse_price("₹ 1,49,999"), Some(149999.0));
        assert_eq!(parse_price("1.299"), Some(1299.0));
    }

    #[test]
    fn ambiguous_prices_stay_absent() {
        assert_eq!(parse_price("$10 - $20"), None);
        assert_eq!(parse_price("2 for $5"), None);
        assert_eq!(parse_price("1,2345"), None);
        assert_eq!(parse_price("1.234,567.8"), None);
    }

    #[test]
    fn rejected_batch_becomes_a_notice() {
        let resp: ProductDetailsResponse = serde_json::from_str(
            r#"[{"url":null,"product_name":"ERROR: Too many URLs in one request (max 5)","price":"N/A","currency":"N/A"},
                {"url":null,"product_name":"N/A"}]"#,
        )
        .expect("details");
        let batch = resp.into_batch();
        assert!(batch.records.is_empty());
        assert_eq!(
            batch.notices,
            vec!["ERROR: Too many URLs in one request (max 5)"]
        );
    }

    #[test]
    fn request_bodies_use_camel_case() {
        let urls = vec!["https://a".to_string()];
        let body = serde_json::to_value(ProductUrlsRequest {
            category_urls: &urls,
            limit: None,
        })
        .expect("serialize");
        assert_eq!(body, serde_json::json!({"categoryUrls": ["https://a"]}));

        let body = serde_json::to_value(ProductDetailsRequest {
            product_urls: &urls,
        })
        .expect("serialize");
        assert_eq!(body, serde_json::json!({"productUrls": ["https://a"]}));
    }
}
