//! Pattern-based Markdown to HTML conversion.
//!
//! This is deliberately a minimal rule set (no nested lists, no tables):
//! it renders agent-authored Markdown well enough for a display surface
//! without pulling in a full parser. The reverse direction lives in
//! [`super::html2md`] as an independent rule set; the two are asymmetric
//! on purpose and must not be merged.

use regex::Regex;

use super::escape_html;

const BLOCK_TOKEN: char = '\u{1}';

pub struct MarkdownRenderer {
    fence: Regex,
    inline_code: Regex,
    bold: Regex,
    italic: Regex,
    link: Regex,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            fence: Regex::new(r"(?s)```([A-Za-z0-9_+\-]*)[ \t]*\n(.*?)\n?```").unwrap(),
            inline_code: Regex::new(r"`([^`\n]+)`").unwrap(),
            bold: Regex::new(r"\*\*(.+?)\*\*").unwrap(),
            italic: Regex::new(r"\*([^*\n]+)\*").unwrap(),
            link: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap(),
        }
    }

    /// Convert a Markdown fragment to an HTML fragment.
    pub fn to_html(&self, markdown: &str) -> String {
        let text = markdown.replace("\r\n", "\n");

        // Protect code from the inline and line rules before anything else.
        let mut protected: Vec<String> = Vec::new();
        let text = self
            .fence
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let code = escape_html(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
                let html = if lang.is_empty() {
                    format!("<pre><code>{}</code></pre>", code)
                } else {
                    format!("<pre><code class=\"language-{}\">{}</code></pre>", lang, code)
                };
                let token = format!("{}{}{}", BLOCK_TOKEN, protected.len(), BLOCK_TOKEN);
                protected.push(html);
                token
            })
            .into_owned();
        let text = self
            .inline_code
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                let html = format!("<code>{}</code>", escape_html(&caps[1]));
                let token = format!("{}{}{}", BLOCK_TOKEN, protected.len(), BLOCK_TOKEN);
                protected.push(html);
                token
            })
            .into_owned();

        // Inline rules: bold before italic so `**` pairs are consumed first.
        let text = self.bold.replace_all(&text, "<strong>$1</strong>");
        let text = self.italic.replace_all(&text, "<em>$1</em>");
        let text = self
            .link
            .replace_all(&text, "<a href=\"$2\">$1</a>")
            .into_owned();

        // Line rules: headings, blockquotes and flat lists become block
        // elements; everything else keeps its newline as a <br>.
        let mut out: Vec<String> = Vec::new();
        let mut in_list = false;
        for line in text.lines() {
            let line = line.trim_end();
            let mut is_item = false;
            let rendered = if let Some(rest) = line.strip_prefix("### ") {
                format!("<h3>{}</h3>", rest)
            } else if let Some(rest) = line.strip_prefix("## ") {
                format!("<h2>{}</h2>", rest)
            } else if let Some(rest) = line.strip_prefix("# ") {
                format!("<h1>{}</h1>", rest)
            } else if let Some(rest) = line.strip_prefix("> ") {
                format!("<blockquote>{}</blockquote>", rest)
            } else if let Some(rest) = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
            {
                is_item = true;
                format!("<li>{}</li>", rest)
            } else if line.starts_with(BLOCK_TOKEN) && line.ends_with(BLOCK_TOKEN) {
                line.to_string()
            } else if line.is_empty() {
                "<br>".to_string()
            } else {
                format!("{}<br>", line)
            };

            if is_item && !in_list {
                out.push("<ul>".to_string());
                in_list = true;
            } else if !is_item && in_list {
                out.push("</ul>".to_string());
                in_list = false;
            }
            out.push(rendered);
        }
        if in_list {
            out.push("</ul>".to_string());
        }
        let mut html = out.join("\n");

        for (index, block) in protected.iter().enumerate() {
            let token = format!("{}{}{}", BLOCK_TOKEN, index, BLOCK_TOKEN);
            html = html.replace(&token, block);
        }
        html
    }

    /// Convert Markdown and wrap the result in a complete styled document.
    pub fn to_document(&self, markdown: &str) -> String {
        let title = markdown
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .unwrap_or("Rendered Markdown");
        let title = escape_html(title.trim());
        let body = self.to_html(markdown);
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: -apple-system, "Segoe UI", Roboto, sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; line-height: 1.6; color: #24292f; }}
h1, h2, h3 {{ line-height: 1.25; }}
pre {{ background: #f6f8fa; padding: 1rem; border-radius: 6px; overflow-x: auto; }}
code {{ font-family: ui-monospace, "SF Mono", Consolas, monospace; font-size: 0.9em; }}
blockquote {{ border-left: 4px solid #d0d7de; margin: 0; padding-left: 1rem; color: #57606a; }}
a {{ color: #0969da; }}
</style>
</head>
<body>
{body}
</body>
</html>"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(md: &str) -> String {
        MarkdownRenderer::new().to_html(md)
    }

    #[test]
    fn headings_convert_by_level() {
        assert_eq!(render("# Title"), "<h1>Title</h1>");
        assert_eq!(render("## Section"), "<h2>Section</h2>");
        assert_eq!(render("### Sub"), "<h3>Sub</h3>");
    }

    #[test]
    fn emphasis_and_links() {
        let html = render("**bold** and *italic* and [docs](https://example.com)");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<em>italic</em>"));
        assert!(html.contains("<a href=\"https://example.com\">docs</a>"));
    }

    #[test]
    fn fenced_code_preserves_language_and_escapes() {
        let html = render("```rust\nlet x = 1 < 2;\n```");
        assert!(html.contains("<pre><code class=\"language-rust\">"));
        assert!(html.contains("let x = 1 &lt; 2;"));
    }

    #[test]
    fn inline_code_is_protected_from_emphasis() {
        let html = render("run `cargo *build*` now");
        assert!(html.contains("<code>cargo *build*</code>"));
        assert!(!html.contains("<em>build</em>"));
    }

    #[test]
    fn blockquote_lines() {
        assert_eq!(render("> quoted"), "<blockquote>quoted</blockquote>");
    }

    #[test]
    fn flat_lists_are_wrapped_in_ul() {
        let html = render("- one\n- two\n* three");
        assert_eq!(
            html,
            "<ul>\n<li>one</li>\n<li>two</li>\n<li>three</li>\n</ul>"
        );
    }

    #[test]
    fn plain_newlines_become_br() {
        let html = render("first\nsecond");
        assert!(html.contains("first<br>"));
        assert!(html.contains("second<br>"));
    }

    #[test]
    fn document_shell_takes_title_from_first_heading() {
        let doc = MarkdownRenderer::new().to_document("# Report\n\nbody text");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>Report</title>"));
        assert!(doc.contains("<h1>Report</h1>"));
    }
}
