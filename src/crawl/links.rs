// src/crawl/links.rs
// =============================================================================
// This module pulls anchor hrefs out of raw page markup.
//
// We use the `scraper` crate, which is built on html5ever: it recovers from
// unclosed tags and other broken markup the same way a browser does, so a
// messy page still yields its links instead of failing.
//
// The hrefs come back exactly as written. Resolving and normalizing them is
// the caller's job (see normalize.rs), because that needs the page URL.
//
// Rust concepts:
// - Iterators and filter_map: skip unusable hrefs without extra branches
// =============================================================================

use scraper::{Html, Selector};

// Extracts the raw href value of every <a> tag
//
// Skips:
// - empty hrefs
// - pure in-page anchors ("#top")
// - mailto:, tel:, javascript: and data: links
//
// Example:
//   html = "<a href='/docs'>Docs</a><a href='#top'>Top</a>"
//   result = ["/docs"]
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    // The selector is a constant, so parsing can only fail on a typo here
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .map(str::trim)
        .filter(|href| is_followable(href))
        .map(str::to_string)
        .collect()
}

fn is_followable(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }

    let lower = href.to_ascii_lowercase();
    !(lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("javascript:")
        || lower.starts_with("data:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_relative_and_absolute_links() {
        let html = r#"
            <a href="https://www.rust-lang.org">Rust</a>
            <a href="/docs">Docs</a>
            <a href="../about">About</a>
        "#;
        assert_eq!(
            extract_links(html),
            vec!["https://www.rust-lang.org", "/docs", "../about"]
        );
    }

    #[test]
    fn test_skips_special_schemes_and_anchors() {
        let html = r##"
            <a href="mailto:test@example.com">Email</a>
            <a href="tel:+123">Call</a>
            <a href="JavaScript:void(0)">Menu</a>
            <a href="#section">Jump</a>
            <a href="">Empty</a>
            <a name="no-href">Nothing</a>
        "##;
        assert!(extract_links(html).is_empty());
    }

    #[test]
    fn test_tolerates_broken_markup() {
        let html = r#"<div><a href="/a">A</a><p><a href='/b'>B</a><a href=/c>C"#;
        assert_eq!(extract_links(html), vec!["/a", "/b", "/c"]);
    }
}
