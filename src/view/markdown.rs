//! Markdown rendering for previews
//!
//! Rendering always starts from the editor's buffer text. Headings receive
//! slug anchors so in-page links (`[see](#hello-world)`) resolve.

use super::assets::escape_html;
use crate::model::session::SessionToken;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use std::collections::HashMap;

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_HEADING_ATTRIBUTES
        | Options::ENABLE_GFM
}

/// Anchor slug: lowercase, runs of non-alphanumerics collapsed to one hyphen,
/// no leading or trailing hyphen.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Hands out unique anchors, suffixing repeats with `-1`, `-2`, ...
#[derive(Debug, Default)]
struct SlugRegistry {
    seen: HashMap<String, usize>,
}

impl SlugRegistry {
    fn claim(&mut self, base: String) -> String {
        let base = if base.is_empty() {
            "section".to_string()
        } else {
            base
        };
        let mut count = self.seen.get(&base).copied().unwrap_or(0);
        let mut candidate = base.clone();
        while self.seen.contains_key(&candidate) {
            count += 1;
            candidate = format!("{base}-{count}");
        }
        self.seen.insert(base, count);
        self.seen.entry(candidate.clone()).or_insert(0);
        candidate
    }

    fn reserve(&mut self, id: &str) {
        self.seen.entry(id.to_string()).or_insert(0);
    }
}

/// Give every heading without an explicit `{#id}` a slug id
fn add_heading_anchors(events: &mut [Event<'_>]) {
    let mut registry = SlugRegistry::default();

    for event in events.iter() {
        if let Event::Start(Tag::Heading { id: Some(id), .. }) = event {
            registry.reserve(id);
        }
    }

    let mut index = 0;
    while index < events.len() {
        let needs_anchor = matches!(&events[index], Event::Start(Tag::Heading { id: None, .. }));
        if !needs_anchor {
            index += 1;
            continue;
        }

        let mut text = String::new();
        let mut end = index + 1;
        while end < events.len() {
            match &events[end] {
                Event::End(TagEnd::Heading(_)) => break,
                Event::Text(t) | Event::Code(t) => text.push_str(t),
                _ => {}
            }
            end += 1;
        }

        let slug = registry.claim(slugify(&text));
        if let Event::Start(Tag::Heading { id, .. }) = &mut events[index] {
            *id = Some(CowStr::from(slug));
        }
        index = end;
    }
}

/// Render Markdown to an HTML fragment
pub fn render_fragment(text: &str) -> String {
    let mut events: Vec<Event<'_>> = Parser::new_ext(text, parser_options()).collect();
    add_heading_anchors(&mut events);

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// Render Markdown as a full page that links the session's Markdown stylesheet
pub fn render_page(text: &str, filename: &str, token: &SessionToken) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="/{stylesheet}">
</head>
<body class="markdown-body">
{body}</body>
</html>
"#,
        title = escape_html(filename),
        stylesheet = token.markdown_css_endpoint(),
        body = render_fragment(text),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World!"), "hello-world");
        assert_eq!(slugify("  --Rust & C++ -- FFI  "), "rust-c-ffi");
        assert_eq!(slugify("Ünïcödé Title"), "ünïcödé-title");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_heading_anchor_reachable_from_link() {
        let html = render_fragment("# Hello World!\n\n[jump](#hello-world)\n");
        assert!(html.contains(r#"<h1 id="hello-world">Hello World!</h1>"#));
        assert!(html.contains(r##"<a href="#hello-world">jump</a>"##));
    }

    #[test]
    fn test_duplicate_headings_get_suffixes() {
        let html = render_fragment("## Setup\n\n## Setup\n\n## Setup\n");
        assert!(html.contains(r#"<h2 id="setup">"#));
        assert!(html.contains(r#"<h2 id="setup-1">"#));
        assert!(html.contains(r#"<h2 id="setup-2">"#));
    }

    #[test]
    fn test_explicit_ids_are_kept_and_reserved() {
        let html = render_fragment("# Intro {#custom}\n\n# Custom\n");
        assert!(html.contains(r#"<h1 id="custom">Intro</h1>"#));
        assert!(html.contains(r#"<h1 id="custom-1">Custom</h1>"#));
    }

    #[test]
    fn test_inline_code_contributes_to_slug() {
        let html = render_fragment("### The `run()` call\n");
        assert!(html.contains(r#"id="the-run-call""#));
    }

    #[test]
    fn test_extensions_enabled() {
        let source = "\
- [x] done
- [ ] todo

| a | b |
|---|---|
| 1 | 2 |

Text with a note[^1] and ~~gone~~.

[^1]: The footnote.

> [!WARNING]
> Careful.

<div class=\"raw\">kept</div>
";
        let html = render_fragment(source);
        assert!(html.contains(r#"type="checkbox""#));
        assert!(html.contains(r#"checked="""#));
        assert!(html.contains("<table>"));
        assert!(html.contains("footnote-definition"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("markdown-alert-warning"));
        assert!(html.contains(r#"<div class="raw">kept</div>"#));
    }

    #[test]
    fn test_page_links_stylesheet_and_title() {
        let token = SessionToken::from_string("tok");
        let page = render_page("# Notes", "notes <draft>.md", &token);
        assert!(page.contains(r#"<link rel="stylesheet" href="/tok_md.css">"#));
        assert!(page.contains("<title>notes &lt;draft&gt;.md</title>"));
        assert!(page.contains(r#"<h1 id="notes">Notes</h1>"#));
    }
}
