//! Console instrumentation for served HTML
//!
//! Every HTML response gets one block, delimited by `<!--preview:TOKEN-->` and
//! `<!--/preview:TOKEN-->`, holding a viewport meta tag, the console bootstrap
//! script and an inline script wiring the overlay. All injected elements carry
//! `data-preview-token` and are removed from the DOM one tick after load, so
//! the page the user inspects matches their source.

use crate::model::session::{SessionToken, TargetMode};
use once_cell::sync::Lazy;
use regex::{Captures, Match, Regex};
use std::ops::Range;

static HEAD_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("valid head regex"));

static HTML_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<html(?:\s[^>]*)?>").expect("valid html regex"));

/// Spans whose text is never markup: comments and raw-text elements
static OPAQUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<!--.*?(?:-->|\z)|<script\b[^>]*>.*?(?:</script\s*>|\z)|<style\b[^>]*>.*?(?:</style\s*>|\z)",
    )
    .expect("valid opaque regex")
});

/// Doctype, XML declaration, comments and whitespace before the first element
static PROLOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\A(?:\s+|<!--.*?-->|<!doctype\b[^>]*>|<\?xml\b.*?\?>)*")
        .expect("valid prolog regex")
});

static EMPTY_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<script\b([^>]*)>(\s*)</script>").expect("valid script regex")
});

fn open_marker(token: &SessionToken) -> String {
    format!("<!--preview:{token}-->")
}

fn close_marker(token: &SessionToken) -> String {
    format!("<!--/preview:{token}-->")
}

/// First match of `tag` that is real markup, not text inside a comment or script
fn find_tag<'h>(tag: &Regex, html: &'h str, opaque: &[Range<usize>]) -> Option<Match<'h>> {
    tag.find_iter(html)
        .find(|found| !opaque.iter().any(|span| span.contains(&found.start())))
}

/// Markup injected into the document
fn instrumentation_block(token: &SessionToken, mode: TargetMode) -> String {
    let hide_button = if mode.is_in_app() {
        "api.entryButton.hide();"
    } else {
        ""
    };
    format!(
        concat!(
            r#"<meta name="viewport" content="width=device-width, initial-scale=1" data-preview-token="{token}">"#,
            r#"<script src="/{console}" crossorigin="anonymous" data-preview-token="{token}"></script>"#,
            r#"<script data-preview-token="{token}">(function () {{"#,
            r#"var token = '{token}';"#,
            r#"var api = window.previewConsole;"#,
            r#"var bound = '__previewBound_' + token;"#,
            r#"if (api && !window[bound]) {{"#,
            r#"window[bound] = true;"#,
            r#"api.init({{ theme: 'dark' }});"#,
            r#"{hide_button}"#,
            r#"document.addEventListener('showconsole', function () {{ window.previewConsole.show(); }});"#,
            r#"document.addEventListener('hideconsole', function () {{ window.previewConsole.hide(); }});"#,
            r#"}}"#,
            r#"setTimeout(function () {{"#,
            r#"document.querySelectorAll('[data-preview-token="' + token + '"]').forEach(function (el) {{ el.remove(); }});"#,
            r#"var walker = document.createTreeWalker(document, NodeFilter.SHOW_COMMENT);"#,
            r#"var markers = [];"#,
            r#"while (walker.nextNode()) {{ var data = walker.currentNode.data; if (data === 'preview:' + token || data === '/preview:' + token) markers.push(walker.currentNode); }}"#,
            r#"markers.forEach(function (node) {{ node.remove(); }});"#,
            r#"}}, 0);"#,
            r#"}})();</script>"#
        ),
        token = token,
        console = token.console_endpoint(),
        hide_button = hide_button,
    )
}

/// Add `crossorigin="anonymous"` to every empty `<script ...></script>` tag
/// that does not declare one. Idempotent.
pub fn normalize_crossorigin(html: &str) -> String {
    EMPTY_SCRIPT
        .replace_all(html, |caps: &Captures| {
            let attributes = &caps[1];
            if attributes.to_ascii_lowercase().contains("crossorigin") {
                return caps[0].to_string();
            }
            format!(
                r#"<script{} crossorigin="anonymous">{}</script>"#,
                attributes.trim_end(),
                &caps[2]
            )
        })
        .into_owned()
}

/// Inject the session's console instrumentation.
///
/// Any block previously injected for the same token is removed first, so
/// instrumenting twice yields the same document as instrumenting once.
pub fn instrument(html: &str, token: &SessionToken, mode: TargetMode) -> String {
    let html = normalize_crossorigin(&strip_instrumentation(html, token));
    let block = instrumentation_block(token, mode);
    let open = open_marker(token);
    let close = close_marker(token);

    let opaque: Vec<Range<usize>> = OPAQUE.find_iter(&html).map(|span| span.range()).collect();

    if let Some(head) = find_tag(&HEAD_OPEN, &html, &opaque) {
        let mut out = String::with_capacity(html.len() + block.len() + 64);
        out.push_str(&html[..head.end()]);
        out.push_str(&open);
        out.push_str(&block);
        out.push_str(&close);
        out.push_str(&html[head.end()..]);
        return out;
    }

    let synthesized = format!("{open}<head>{block}</head>{close}");
    if let Some(root) = find_tag(&HTML_OPEN, &html, &opaque) {
        let mut out = String::with_capacity(html.len() + synthesized.len());
        out.push_str(&html[..root.end()]);
        out.push_str(&synthesized);
        out.push_str(&html[root.end()..]);
        return out;
    }

    // Nothing may precede the doctype or the page renders in quirks mode
    let prolog = PROLOG.find(&html).map_or(0, |prolog| prolog.end());
    format!("{}{synthesized}{}", &html[..prolog], &html[prolog..])
}

/// Remove every block injected for `token`, restoring the document as it was
/// before [`instrument`] (after crossorigin normalization).
pub fn strip_instrumentation(html: &str, token: &SessionToken) -> String {
    let open = open_marker(token);
    let close = close_marker(token);
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find(&open) {
        let Some(len) = rest[start..].find(&close) else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + len + close.len()..];
    }
    out.push_str(rest);
    out
}

/// Whether `html` carries instrumentation for `token`
pub fn is_instrumented(html: &str, token: &SessionToken) -> bool {
    html.contains(&open_marker(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> SessionToken {
        SessionToken::from_string("abc123")
    }

    #[test]
    fn test_injects_inside_existing_head() {
        let html = "<html><head lang=\"en\"><title>x</title></head><body></body></html>";
        let out = instrument(html, &token(), TargetMode::FileRender);

        let head = out.find("<head lang=\"en\">").unwrap();
        let marker = out.find("<!--preview:abc123-->").unwrap();
        let title = out.find("<title>").unwrap();
        assert!(head < marker && marker < title);
        assert!(out.contains(r#"<script src="/abc123_console.js""#));
        assert!(out.contains(r#"<meta name="viewport""#));
        assert!(out.contains("api.entryButton.hide();"));
        assert!(out.contains("theme: 'dark'"));
    }

    #[test]
    fn test_synthesizes_head_after_html_tag() {
        let html = "<!DOCTYPE html><HTML class=\"x\"><body>hi</body></HTML>";
        let out = instrument(html, &token(), TargetMode::Browser);
        assert!(out.starts_with(
            "<!DOCTYPE html><HTML class=\"x\"><!--preview:abc123--><head><meta"
        ));
        assert!(!out.contains("entryButton.hide"));
    }

    #[test]
    fn test_prepends_head_to_fragment() {
        let out = instrument("<p>fragment</p>", &token(), TargetMode::FileRender);
        assert!(out.starts_with("<!--preview:abc123--><head>"));
        assert!(out.ends_with("<!--/preview:abc123--><p>fragment</p>"));
    }

    #[test]
    fn test_header_element_is_not_a_head() {
        let html = "<body><header>top</header></body>";
        let out = instrument(html, &token(), TargetMode::FileRender);
        assert!(out.starts_with("<!--preview:abc123--><head>"));
    }

    #[test]
    fn test_head_mentioned_in_comment_is_skipped() {
        let html = "<html><!-- move <head> up --><head><title>t</title></head></html>";
        let out = instrument(html, &token(), TargetMode::FileRender);
        assert!(out.contains("<!-- move <head> up --><head><!--preview:abc123-->"));
    }

    #[test]
    fn test_head_inside_script_string_is_skipped() {
        let html = r#"<script>var s = "<head>";</script><p>x</p>"#;
        let out = instrument(html, &token(), TargetMode::FileRender);
        assert!(out.starts_with("<!--preview:abc123--><head>"));
        assert!(out.ends_with(r#"<!--/preview:abc123--><script>var s = "<head>";</script><p>x</p>"#));

        let html = r#"<!DOCTYPE html><script>var tpl = '<html lang="x">';</script><p>x</p>"#;
        let out = instrument(html, &token(), TargetMode::FileRender);
        assert!(out.starts_with("<!DOCTYPE html><!--preview:abc123--><head>"));
        assert!(out.contains(r#"<!--/preview:abc123--><script>var tpl = '<html lang="x">';</script>"#));
    }

    #[test]
    fn test_doctype_stays_first_without_html_tag() {
        let html = "<!DOCTYPE html>\n<!-- page --><p>x</p>";
        let out = instrument(html, &token(), TargetMode::FileRender);
        assert!(out.starts_with("<!DOCTYPE html>\n<!-- page --><!--preview:abc123--><head>"));
        assert!(out.ends_with("<!--/preview:abc123--><p>x</p>"));
        assert_eq!(instrument(&out, &token(), TargetMode::FileRender), out);
        assert_eq!(strip_instrumentation(&out, &token()), html);
    }

    #[test]
    fn test_repeated_injection_then_removal_restores_document() {
        let html = "<html><head><title>t</title></head><body><p>x</p></body></html>";
        let once = instrument(html, &token(), TargetMode::FileRender);
        let twice = instrument(&once, &token(), TargetMode::FileRender);
        assert_eq!(once, twice);
        assert_eq!(twice.matches("<!--preview:abc123-->").count(), 1);
        assert_eq!(strip_instrumentation(&twice, &token()), html);
    }

    #[test]
    fn test_removal_restores_synthesized_head_cases() {
        for html in ["<p>plain</p>", "<html><body></body></html>", ""] {
            let out = instrument(html, &token(), TargetMode::InappConsole);
            assert!(is_instrumented(&out, &token()));
            assert_eq!(strip_instrumentation(&out, &token()), html);
        }
    }

    #[test]
    fn test_other_tokens_are_left_alone() {
        let other = SessionToken::from_string("zzz999");
        let html = instrument("<p>x</p>", &other, TargetMode::FileRender);
        let out = instrument(&html, &token(), TargetMode::FileRender);
        assert!(is_instrumented(&out, &other));
        assert_eq!(strip_instrumentation(&out, &token()), html);
    }

    #[test]
    fn test_crossorigin_normalization() {
        let html = concat!(
            r#"<script src="a.js"></script>"#,
            r#"<SCRIPT src="b.js" crossorigin="use-credentials"></SCRIPT>"#,
            r#"<script>inline()</script>"#,
            r#"<script src="c.js" ></script>"#
        );
        let out = normalize_crossorigin(html);
        assert!(out.contains(r#"<script src="a.js" crossorigin="anonymous"></script>"#));
        assert!(out.contains(r#"crossorigin="use-credentials""#));
        assert!(out.contains("<script>inline()</script>"));
        assert!(out.contains(r#"<script src="c.js" crossorigin="anonymous"></script>"#));
        assert_eq!(normalize_crossorigin(&out), out);
    }

    #[test]
    fn test_inline_script_guards_double_binding() {
        let out = instrument("<p></p>", &token(), TargetMode::FileRender);
        assert!(out.contains("'__previewBound_' + token"));
        assert!(out.contains("setTimeout(function () {"));
        assert!(out.contains("'showconsole'"));
        assert!(out.contains("'hideconsole'"));
    }
}
