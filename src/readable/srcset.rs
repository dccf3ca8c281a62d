//! Image source URL selection.

use std::sync::LazyLock;

use regex_lite::Regex;
use url::Url;

// Matches a single srcset item, e.g. "url 640w", " url 640w", or "url".
static SRCSET_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(.+?)(?: (\d+)w)?\s*$").unwrap());

/// Parse a candidate image URL and resolve it against the page base.
///
/// Only relative, http, and https URLs are accepted; everything else
/// (javascript:, data:, ftp:, ...) is rejected.
pub(crate) fn try_parse_img_url(base: &Url, raw: &str) -> Option<Url> {
    let url = base.join(raw).ok()?;
    if matches!(url.scheme(), "http" | "https") {
        Some(url)
    } else {
        None
    }
}

/// Pick the highest-width entry from a `srcset` attribute.
///
/// Items without a width descriptor count as width 0; ties go to the item
/// seen first. Items that fail URL parsing or the scheme check are skipped.
pub(crate) fn parse_srcset(base: &Url, srcset: &str) -> Option<Url> {
    let mut max_width: i64 = -1;
    let mut max_url = None;
    for item in srcset.split(',') {
        let Some(caps) = SRCSET_ITEM_RE.captures(item) else {
            continue;
        };
        let width: i64 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        if width > max_width {
            let Some(url) = caps.get(1).and_then(|m| try_parse_img_url(base, m.as_str())) else {
                continue;
            };
            max_width = width;
            max_url = Some(url);
        }
    }
    max_url
}
