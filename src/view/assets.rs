//! Documents bundled into the binary

use crate::model::session::SessionToken;

/// Lightweight console overlay
pub const CONSOLE_JS: &str = include_str!("../../assets/console.js");

/// Full in-app inspector
pub const INSPECTOR_JS: &str = include_str!("../../assets/inspector.js");

/// Default stylesheet for rendered Markdown
pub const MARKDOWN_CSS: &str = include_str!("../../assets/markdown.css");

/// Icon served when the project has none
pub const FAVICON: &[u8] = include_bytes!("../../assets/favicon.ico");

/// Console bootstrap script for the session
pub fn console_script(legacy: bool) -> &'static str {
    if legacy {
        CONSOLE_JS
    } else {
        INSPECTOR_JS
    }
}

/// Harness page that runs the executing script with the console open
pub fn console_page(token: &SessionToken, title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
</head>
<body>
    <script>document.addEventListener('DOMContentLoaded', function () {{ document.dispatchEvent(new Event('showconsole')); }});</script>
    <script src="/{script}"></script>
</body>
</html>
"#,
        title = escape_html(title),
        script = token.script_endpoint(),
    )
}

/// Escape text for an HTML text node or attribute value
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
