//! Rule-driven HTML to Markdown conversion.
//!
//! Used when caching a rendered document so the agent can read back what is
//! on screen as Markdown. Independent from the Markdown renderer in
//! [`super::markdown`]; the two directions are intentionally asymmetric.

use regex::Regex;

const PRE_TOKEN: char = '\u{2}';

pub struct HtmlToMarkdown {
    comment: Regex,
    script: Regex,
    style: Regex,
    title: Regex,
    doctype: Regex,
    wrapper: Regex,
    line_break: Regex,
    void_tag: Regex,
    pre_code: Regex,
    pre_plain: Regex,
    button: Regex,
    link: Regex,
    strong: Regex,
    emphasis: Regex,
    inline_code: Regex,
    headings: Vec<Regex>,
    table: Regex,
    table_row: Regex,
    table_cell: Regex,
    paragraph: Regex,
    div_tag: Regex,
    blockquote: Regex,
    list_item: Regex,
    list_tag: Regex,
    any_tag: Regex,
    trailing_space: Regex,
    blank_run: Regex,
}

impl Default for HtmlToMarkdown {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlToMarkdown {
    pub fn new() -> Self {
        let headings = (1..=6)
            .map(|level| {
                Regex::new(&format!(r"(?is)<h{level}[^>]*>(.*?)</h{level}\s*>")).unwrap()
            })
            .collect();
        Self {
            comment: Regex::new(r"(?s)<!--.*?-->").unwrap(),
            script: Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap(),
            style: Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap(),
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap(),
            doctype: Regex::new(r"(?i)<!doctype[^>]*>").unwrap(),
            wrapper: Regex::new(r"(?i)</?(?:html|head|body)\b[^>]*>").unwrap(),
            line_break: Regex::new(r"(?i)<br\s*/?>").unwrap(),
            void_tag: Regex::new(r"(?i)<(?:img|input|meta|link|hr|source|embed)\b[^>]*/?>")
                .unwrap(),
            pre_code: Regex::new(
                r#"(?is)<pre[^>]*>\s*<code(?:\s+class="language-([^"]*)")?[^>]*>(.*?)</code\s*>\s*</pre\s*>"#,
            )
            .unwrap(),
            pre_plain: Regex::new(r"(?is)<pre[^>]*>(.*?)</pre\s*>").unwrap(),
            button: Regex::new(r"(?is)<button[^>]*>(.*?)</button\s*>").unwrap(),
            link: Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*"([^"]*)"[^>]*>(.*?)</a\s*>"#).unwrap(),
            strong: Regex::new(r"(?is)<(?:strong|b)\b[^>]*>(.*?)</(?:strong|b)\s*>").unwrap(),
            emphasis: Regex::new(r"(?is)<(?:em|i)\b[^>]*>(.*?)</(?:em|i)\s*>").unwrap(),
            inline_code: Regex::new(r"(?is)<code[^>]*>(.*?)</code\s*>").unwrap(),
            headings,
            table: Regex::new(r"(?is)<table[^>]*>(.*?)</table\s*>").unwrap(),
            table_row: Regex::new(r"(?is)<tr[^>]*>(.*?)</tr\s*>").unwrap(),
            table_cell: Regex::new(r"(?is)<t[hd][^>]*>(.*?)</t[hd]\s*>").unwrap(),
            paragraph: Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").unwrap(),
            div_tag: Regex::new(r"(?i)</?div\b[^>]*>").unwrap(),
            blockquote: Regex::new(r"(?is)<blockquote[^>]*>(.*?)</blockquote\s*>").unwrap(),
            list_item: Regex::new(r"(?is)<li[^>]*>(.*?)</li\s*>").unwrap(),
            list_tag: Regex::new(r"(?i)</?(?:ul|ol)\b[^>]*>").unwrap(),
            any_tag: Regex::new(r"(?s)</?[A-Za-z][^>]*>").unwrap(),
            trailing_space: Regex::new(r"(?m)[ \t]+$").unwrap(),
            blank_run: Regex::new(r"\n{5,}").unwrap(),
        }
    }

    pub fn convert(&self, html: &str) -> String {
        let text = html.replace("\r\n", "\n");

        // Preprocessing: drop non-content, promote the title into a heading.
        let text = self.comment.replace_all(&text, "");
        let text = self.script.replace_all(&text, "");
        let text = self.style.replace_all(&text, "");
        let text = self.title.replace_all(&text, "<h1>$1</h1>");
        let text = self.doctype.replace_all(&text, "");
        let text = self.wrapper.replace_all(&text, "");

        // Code blocks are lifted out before any other rule can touch them;
        // the fence keeps the language class as its annotation.
        let mut fences: Vec<String> = Vec::new();
        let text = self
            .pre_code
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let code = unescape_entities(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
                let fence = format!("\n```{}\n{}\n```\n", lang, code.trim_matches('\n'));
                let token = format!("{}{}{}", PRE_TOKEN, fences.len(), PRE_TOKEN);
                fences.push(fence);
                token
            })
            .into_owned();
        let text = self
            .pre_plain
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                let code = unescape_entities(&caps[1]);
                let fence = format!("\n```\n{}\n```\n", code.trim_matches('\n'));
                let token = format!("{}{}{}", PRE_TOKEN, fences.len(), PRE_TOKEN);
                fences.push(fence);
                token
            })
            .into_owned();

        let text = self.line_break.replace_all(&text, "\n");
        let text = self.void_tag.replace_all(&text, "");

        // Inline rules first so block captures already contain Markdown.
        let text = self
            .button
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                format!("**[{}]**", self.strip_tags(caps[1].trim()))
            })
            .into_owned();
        let text = self.link.replace_all(&text, "[$2]($1)");
        let text = self.strong.replace_all(&text, "**$1**");
        let text = self.emphasis.replace_all(&text, "*$1*");
        let text = self.inline_code.replace_all(&text, "`$1`").into_owned();

        let text = self
            .table
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                self.convert_table(&caps[1])
            })
            .into_owned();

        let mut text = text;
        for (index, heading) in self.headings.iter().enumerate() {
            let marker = "#".repeat(index + 1);
            text = heading
                .replace_all(&text, |caps: &regex::Captures<'_>| {
                    format!("\n{} {}\n\n", marker, caps[1].trim())
                })
                .into_owned();
        }

        let text = self.paragraph.replace_all(&text, "\n$1\n\n");
        let text = self.div_tag.replace_all(&text, "\n");
        let text = self
            .blockquote
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                let quoted: Vec<String> = caps[1]
                    .trim()
                    .lines()
                    .map(|line| format!("> {}", line.trim()))
                    .collect();
                format!("\n{}\n\n", quoted.join("\n"))
            })
            .into_owned();
        let text = self
            .list_item
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                format!("- {}\n", caps[1].trim())
            })
            .into_owned();
        let text = self.list_tag.replace_all(&text, "\n");

        let text = self.any_tag.replace_all(&text, "");
        let mut text = unescape_entities(&text);

        for (index, fence) in fences.iter().enumerate() {
            let token = format!("{}{}{}", PRE_TOKEN, index, PRE_TOKEN);
            text = text.replace(&token, fence);
        }

        // Postprocessing: trim line tails, bound blank runs, trim the edges.
        let text = self.trailing_space.replace_all(&text, "");
        let text = self.blank_run.replace_all(&text, "\n\n\n");
        text.trim_matches('\n').to_string()
    }

    fn convert_table(&self, inner: &str) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in self.table_row.captures_iter(inner) {
            let cells: Vec<String> = self
                .table_cell
                .captures_iter(&row[1])
                .map(|cell| {
                    let cleaned = self.strip_tags(cell[1].trim());
                    unescape_entities(&cleaned).replace('|', "\\|")
                })
                .collect();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }
        if rows.is_empty() {
            return String::new();
        }

        let mut lines = Vec::new();
        let header = &rows[0];
        lines.push(format!("| {} |", header.join(" | ")));
        lines.push(format!(
            "| {} |",
            vec!["---"; header.len()].join(" | ")
        ));
        for row in &rows[1..] {
            lines.push(format!("| {} |", row.join(" | ")));
        }
        format!("\n{}\n\n", lines.join("\n"))
    }

    fn strip_tags(&self, fragment: &str) -> String {
        self.any_tag.replace_all(fragment, "").into_owned()
    }
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// One-shot conversion helper.
pub fn html_to_markdown(html: &str) -> String {
    HtmlToMarkdown::new().convert(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::markdown::MarkdownRenderer;

    #[test]
    fn headings_use_atx_markers() {
        let md = html_to_markdown("<h1>One</h1><h2>Two</h2><h6>Six</h6>");
        assert!(md.contains("# One"));
        assert!(md.contains("## Two"));
        assert!(md.contains("###### Six"));
    }

    #[test]
    fn emphasis_links_and_buttons() {
        let md = html_to_markdown(
            r#"<p><strong>bold</strong> <em>soft</em> <a href="https://example.com">here</a> <button>Save</button></p>"#,
        );
        assert!(md.contains("**bold**"));
        assert!(md.contains("*soft*"));
        assert!(md.contains("[here](https://example.com)"));
        assert!(md.contains("**[Save]**"));
    }

    #[test]
    fn fenced_code_keeps_language_annotation() {
        let md = html_to_markdown(
            r#"<pre><code class="language-rust">let x = 1 &lt; 2;</code></pre>"#,
        );
        assert!(md.contains("```rust"));
        assert!(md.contains("let x = 1 < 2;"));
    }

    #[test]
    fn blockquotes_and_lists() {
        let md = html_to_markdown("<blockquote>wise\nwords</blockquote><ul><li>a</li><li>b</li></ul>");
        assert!(md.contains("> wise"));
        assert!(md.contains("> words"));
        assert!(md.contains("- a"));
        assert!(md.contains("- b"));
    }

    #[test]
    fn tables_get_separator_row_and_escaped_pipes() {
        let md = html_to_markdown(
            "<table><tr><th>Name</th><th>Flags</th></tr><tr><td>ls</td><td>-l|-a</td></tr></table>",
        );
        assert!(md.contains("| Name | Flags |"));
        assert!(md.contains("| --- | --- |"));
        assert!(md.contains("| ls | -l\\|-a |"));
    }

    #[test]
    fn scripts_styles_and_comments_are_stripped() {
        let md = html_to_markdown(
            "<script>alert(1)</script><style>body{}</style><!-- hidden --><p>kept</p>",
        );
        assert!(!md.contains("alert"));
        assert!(!md.contains("body{}"));
        assert!(!md.contains("hidden"));
        assert!(md.contains("kept"));
    }

    #[test]
    fn title_is_promoted_to_h1() {
        let md = html_to_markdown("<html><head><title>Dash</title></head><body>x</body></html>");
        assert!(md.contains("# Dash"));
    }

    #[test]
    fn blank_runs_collapse_and_edges_trim() {
        let md = html_to_markdown("<p>a</p>\n\n\n\n\n\n\n<p>b</p>");
        assert!(!md.contains("\n\n\n\n"));
        assert!(md.starts_with('a'));
        assert!(md.ends_with('b'));
    }

    #[test]
    fn round_trip_preserves_headings_and_list_count() {
        let html = "<h1>Status</h1><h2>Items</h2><ul><li>alpha</li><li>beta</li><li>gamma</li></ul>";
        let md = html_to_markdown(html);
        let rendered = MarkdownRenderer::new().to_html(&md);
        assert!(rendered.contains("<h1>Status</h1>"));
        assert!(rendered.contains("<h2>Items</h2>"));
        assert_eq!(rendered.matches("<li>").count(), 3);
    }
}
