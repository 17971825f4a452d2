use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// Specials images are linked as e.g.
/// `/wp-content/uploads/2025/04/1-2.FRI-SPECIALS-11-4-25.jpg`.
static SPECIALS_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href="([^"]*-SPECIALS-[^"]*)""#).expect("valid regex"));

/// Returns every `-SPECIALS-` link in `html`, resolved against `base`.
/// Duplicates are kept; links that cannot be resolved are skipped.
pub fn extract_special_urls(html: &str, base: &url::Url) -> Vec<String> {
    SPECIALS_HREF
        .captures_iter(html)
        .filter_map(|cap| {
            let href = cap.get(1)?.as_str().replace("&amp;", "&");
            match base.join(&href) {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    warn!(href = %href, error = %e, "skipping unresolvable specials link");
                    None
                }
            }
        })
        .collect()
}
