// src/sanitize.rs
// =============================================================================
// This module strips the parts of a page that would interfere with a static
// screenshot: scripts, comments, embedded frames, popup dialogs, and inline
// event handlers.
//
// The Sanitizer trait is the seam: the crawler only needs "markup in, markup
// out". MarkupSanitizer is the default implementation and works with regexes
// on the raw string, so it never fails on broken markup.
//
// Contract: sanitize() is total. It always returns markup, at worst the input
// unchanged.
// =============================================================================

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<script\b[^>]*/>").expect("valid regex")
});
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static IFRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<iframe\b[^>]*>.*?</iframe\s*>|<iframe\b[^>]*/>").expect("valid regex")
});
static DIALOG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<dialog\b[^>]*>.*?</dialog\s*>").expect("valid regex"));
static EVENT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid regex")
});

/// Turns fetched markup into markup that is safe to render statically.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, html: &str, url: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupSanitizer;

impl Sanitizer for MarkupSanitizer {
    fn sanitize(&self, html: &str, url: &str) -> String {
        let cleaned = SCRIPT_RE.replace_all(html, "");
        let cleaned = COMMENT_RE.replace_all(&cleaned, "");
        let cleaned = IFRAME_RE.replace_all(&cleaned, "");
        let cleaned = DIALOG_RE.replace_all(&cleaned, "");
        let cleaned = EVENT_ATTR_RE.replace_all(&cleaned, "");

        tracing::trace!(
            url = url,
            before = html.len(),
            after = cleaned.len(),
            "sanitized page"
        );
        cleaned.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(html: &str) -> String {
        MarkupSanitizer.sanitize(html, "https://example.com/")
    }

    #[test]
    fn test_strips_scripts_and_comments() {
        let html = r#"<p>keep</p><script type="text/javascript">alert(1)</script><!-- note --><SCRIPT src="x.js"></SCRIPT>"#;
        assert_eq!(sanitize(html), "<p>keep</p>");
    }

    #[test]
    fn test_strips_popups_frames_and_handlers() {
        let html = r#"<body onload="track()"><dialog open>Subscribe!</dialog><iframe src="ad"></iframe><a href="/x" onclick='go()'>x</a></body>"#;
        assert_eq!(sanitize(html), r#"<body><a href="/x">x</a></body>"#);
    }

    #[test]
    fn test_multiline_script_is_removed() {
        let html = "<div>a</div>\n<script>\nvar x = '<p>';\n</script>\n<div>b</div>";
        assert_eq!(sanitize(html), "<div>a</div>\n\n<div>b</div>");
    }

    #[test]
    fn test_plain_markup_is_untouched() {
        let html = "<html><body><h1>Title</h1><p>Body text</p></body></html>";
        assert_eq!(sanitize(html), html);
    }

    #[test]
    fn test_unterminated_markup_does_not_panic() {
        let html = "<p>text<script>never closed";
        assert_eq!(sanitize(html), html);
    }
}
