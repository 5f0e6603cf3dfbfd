//! Turns raw operator input into an ordered [`UrlSet`].
//!
//! Two paths with deliberately different strictness:
//! - typed text is split on newlines/commas and kept token-for-token
//! - cells from an uploaded sheet only survive if they look like absolute URLs

use std::sync::LazyLock;

use regex::Regex;
use scrapedesk_shared::{CanonicalUrl, UrlSet};

/// One or more newlines and/or commas.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n,]+").expect("separator regex"));

/// Raw input handed to the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    /// Free-form text (typed or read from a `.csv`).
    Text(String),
    /// Stringified spreadsheet cells in row-major order.
    Cells(Vec<String>),
}

/// Knobs shared by both normalization paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Drop repeated URLs, first occurrence wins.
    pub dedupe: bool,
}

/// Normalize typed text with default options.
pub fn normalize(raw: &str) -> UrlSet {
    normalize_text(raw, NormalizeOptions::default())
}

/// Split on commas/newlines, trim, drop empty tokens. Order is preserved and
/// no scheme check is applied.
pub fn normalize_text(raw: &str, opts: NormalizeOptions) -> UrlSet {
    let urls: UrlSet = SEPARATOR_RE
        .split(raw)
        .filter_map(CanonicalUrl::from_token)
        .collect();
    finish(urls, opts)
}

/// Keep only cells that look like absolute URLs.
pub fn normalize_cells<I, S>(cells: I, opts: NormalizeOptions) -> UrlSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let urls: UrlSet = cells
        .into_iter()
        .filter_map(|cell| CanonicalUrl::parse_absolute(cell.as_ref()))
        .collect();
    finish(urls, opts)
}

/// Dispatch on the input's origin.
pub fn normalize_input(input: &RawInput, opts: NormalizeOptions) -> UrlSet {
    match input {
        RawInput::Text(text) => normalize_text(text, opts),
        RawInput::Cells(cells) => normalize_cells(cells, opts),
    }
}

fn finish(urls: UrlSet, opts: NormalizeOptions) -> UrlSet {
    if opts.dedupe { urls.dedup() } else { urls }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty_set() {
        assert!(normalize("").is_empty());
        assert!(normalize(" ,\n,, \n ").is_empty());
    }

    #[test]
    fn mixed_separators_keep_token_order() {
        let raw = "  https://a/1 ,https://b/2\n\n https://c/3,,\r\nhttps://d/4  ";
        assert_eq!(
            normalize(raw).to_strings(),
            vec!["https://a/1", "https://b/2", "https://c/3", "https://d/4"]
        );
    }

    #[test]
    fn typed_text_keeps_duplicates_by_default() {
        let raw = "https://a\nhttps://b\nhttps://a";
        assert_eq!(
            normalize(raw).to_strings(),
            vec!["https://a", "https://b", "https://a"]
        );
    }

    #[test]
    fn typed_text_is_not_scheme_filtered() {
        let urls = normalize("www.example.com/cat, https://example.com/dog");
        assert_eq!(
            urls.to_strings(),
            vec!["www.example.com/cat", "https://example.com/dog"]
        );
    }

    #[test]
    fn dedupe_option_keeps_first_occurrence() {
        let opts = NormalizeOptions { dedupe: true };
        let urls = normalize_text("https://b,https://a,https://b", opts);
        assert_eq!(urls.to_strings(), vec!["https://b", "https://a"]);
    }

    #[test]
    fn cells_only_keep_absolute_urls() {
        let cells = vec![
            "Category",
            "  https://shop.example.com/c?node=1 ",
            "42",
            "",
            "shop.example.com/c",
            "http://shop.example.com/c?node=2",
            "mailto:someone@example.com",
        ];
        let urls = normalize_cells(cells, NormalizeOptions::default());
        assert_eq!(
            urls.to_strings(),
            vec![
                "https://shop.example.com/c?node=1",
                "http://shop.example.com/c?node=2"
            ]
        );
        assert!(urls.iter().all(|u| u.as_str().starts_with("http")));
    }

    #[test]
    fn input_dispatch_uses_the_matching_path() {
        let opts = NormalizeOptions::default();
        let text = RawInput::Text("not-a-url".into());
        let cells = RawInput::Cells(vec!["not-a-url".into()]);
        assert_eq!(normalize_input(&text, opts).len(), 1);
        assert!(normalize_input(&cells, opts).is_empty());
    }
}
