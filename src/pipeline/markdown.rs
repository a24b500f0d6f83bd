//! HTML → Markdown conversion.
//!
//! A generic bottom-up tree walk: each element's children are converted
//! first, then a per-tag rule turns `(element, converted children)` into
//! Markdown. The rules that differ from plain HTML-to-Markdown behaviour sit
//! in [`OVERRIDES`] and are consulted before the generic ones:
//!
//! | tag     | output                                                      |
//! |---------|-------------------------------------------------------------|
//! | `math`  | `\n$$…$$\n` with `display="block"`, otherwise ` $…$ `       |
//! | `table` | the original HTML, between blank lines                      |
//! | `a`     | `[` `]` `(` `)` escaped in the link text, then a normal link |
//!
//! Text nodes have whitespace runs collapsed (outside `<pre>`) and `*`, `_`
//! and `$` escaped (outside `pre`/`code`/`kbd`/`samp`/`math`).

use crate::error::BlockError;
use crate::html;
use markup5ever_rcdom::{Handle, NodeData};
use once_cell::sync::Lazy;
use regex::Regex;
use std::rc::Rc;
use tracing::error;

/// Nesting depth beyond which a fragment is rejected.
const MAX_DEPTH: usize = 512;

/// Containers whose leading/trailing whitespace is insignificant.
const BLOCK_TAGS: &[&str] = &[
    "body", "p", "div", "section", "article", "blockquote", "figure", "figcaption", "ol", "ul",
    "li", "dl", "dt", "dd", "table", "thead", "tbody", "tfoot", "tr", "td", "th", "h1", "h2",
    "h3", "h4", "h5", "h6", "pre", "header", "footer", "hr",
];

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\t \r\n]+").unwrap());

/// Convert an HTML fragment to Markdown.
///
/// Never fails: a fragment that cannot be converted is logged and yields an
/// empty string.
pub fn html_to_markdown(html: &str) -> String {
    match try_html_to_markdown(html) {
        Ok(markdown) => markdown,
        Err(e) => {
            error!("{}", e);
            String::new()
        }
    }
}

/// Convert an HTML fragment to Markdown, reporting failures.
pub fn try_html_to_markdown(html: &str) -> Result<String, BlockError> {
    let dom = html::parse_html(html).map_err(|e| BlockError::MarkdownConversion(e.to_string()))?;
    let body = html::body(&dom)
        .ok_or_else(|| BlockError::MarkdownConversion("fragment has no <body>".into()))?;
    if html::max_depth(&body) > MAX_DEPTH {
        return Err(BlockError::MarkdownConversion(format!(
            "nesting deeper than {MAX_DEPTH} elements"
        )));
    }

    let mut converter = Converter::default();
    let markdown = converter.convert_children(&body)?;
    Ok(collapse_blank_lines(&markdown).trim().to_string())
}

// ── Rule table ───────────────────────────────────────────────────────────

/// An element as seen by a rule.
struct Element<'a> {
    node: &'a Handle,
    parent: &'a Handle,
    /// Ancestor tags, outermost first.
    parents: &'a [String],
}

impl Element<'_> {
    fn attr(&self, name: &str) -> Option<String> {
        html::attr(self.node, name)
    }

    fn inside(&self, tags: &[&str]) -> bool {
        self.parents.iter().any(|p| tags.contains(&p.as_str()))
    }
}

type ConvertFn = fn(&Element<'_>, &str) -> String;

#[derive(Clone, Copy)]
enum Rule {
    /// Convert children first, then build this element's Markdown from them.
    Convert(ConvertFn),
    /// Build Markdown from the element itself; children are not converted.
    Raw(fn(&Element<'_>) -> String),
    /// Drop the element and everything inside it.
    Drop,
}

/// Rules that replace the generic conversion.
const OVERRIDES: &[(&str, Rule)] = &[
    ("math", Rule::Convert(convert_math)),
    ("table", Rule::Raw(convert_table)),
    ("a", Rule::Convert(convert_link)),
];

fn rule_for(tag: &str) -> Rule {
    if let Some((_, rule)) = OVERRIDES.iter().find(|(t, _)| *t == tag) {
        return *rule;
    }
    match tag {
        "p" => Rule::Convert(convert_paragraph),
        "div" | "section" | "article" | "figure" | "figcaption" | "header" | "footer" | "main"
        | "aside" | "nav" | "caption" | "center" => Rule::Convert(convert_paragraph),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Rule::Convert(convert_heading),
        "blockquote" => Rule::Convert(convert_blockquote),
        "br" => Rule::Convert(convert_br),
        "hr" => Rule::Convert(|_, _| "\n\n---\n\n".to_string()),
        "strong" | "b" => Rule::Convert(|el, text| inline_markup(el, text, "**")),
        "em" | "i" => Rule::Convert(|el, text| inline_markup(el, text, "*")),
        "del" | "s" | "strike" => Rule::Convert(|el, text| inline_markup(el, text, "~~")),
        "code" | "kbd" | "samp" => Rule::Convert(convert_code),
        "pre" => Rule::Convert(convert_pre),
        "sub" => Rule::Convert(|_, text| wrap_tag("sub", text)),
        "sup" => Rule::Convert(|_, text| wrap_tag("sup", text)),
        "img" => Rule::Raw(convert_img),
        "ul" | "ol" => Rule::Convert(convert_list),
        "li" => Rule::Convert(convert_list_item),
        "dl" => Rule::Convert(convert_paragraph),
        "dt" => Rule::Convert(|_, text| format!("\n\n{}\n", text.trim())),
        "dd" => Rule::Convert(convert_definition),
        "script" | "style" | "head" | "title" | "noscript" | "template" => Rule::Drop,
        _ => Rule::Convert(|_, text| text.to_string()),
    }
}

// ── Tree walk ────────────────────────────────────────────────────────────

#[derive(Default)]
struct Converter {
    /// Tags of the elements currently being converted, outermost first.
    parents: Vec<String>,
}

impl Converter {
    fn convert_children(&mut self, node: &Handle) -> Result<String, BlockError> {
        let children = node.children.borrow();
        let mut out = String::new();
        for (i, child) in children.iter().enumerate() {
            match &child.data {
                NodeData::Text { contents } => {
                    let prev = i.checked_sub(1).and_then(|j| children.get(j));
                    let next = children.get(i + 1);
                    out.push_str(&self.process_text(&contents.borrow(), node, prev, next));
                }
                NodeData::Element { .. } => out.push_str(&self.convert_element(child, node)?),
                _ => {}
            }
        }
        Ok(out)
    }

    fn convert_element(&mut self, node: &Handle, parent: &Handle) -> Result<String, BlockError> {
        let tag = html::tag_name(node).unwrap_or_default().to_string();
        match rule_for(&tag) {
            Rule::Drop => Ok(String::new()),
            Rule::Raw(build) => Ok(build(&Element {
                node,
                parent,
                parents: &self.parents,
            })),
            Rule::Convert(build) => {
                self.parents.push(tag);
                let text = self.convert_children(node);
                self.parents.pop();
                let text = text?;
                Ok(build(
                    &Element {
                        node,
                        parent,
                        parents: &self.parents,
                    },
                    &text,
                ))
            }
        }
    }

    fn inside(&self, tags: &[&str]) -> bool {
        self.parents.iter().any(|p| tags.contains(&p.as_str()))
    }

    fn process_text(
        &self,
        raw: &str,
        parent: &Handle,
        prev: Option<&Handle>,
        next: Option<&Handle>,
    ) -> String {
        if self.inside(&["pre"]) {
            return raw.to_string();
        }

        let mut text = WHITESPACE_RUN.replace_all(raw, " ").into_owned();
        if !self.inside(&["code", "kbd", "samp", "math"]) {
            text = escape_markdown(&text);
        }

        let parent_is_block = is_block(parent);
        if prev.map_or(parent_is_block, |p| is_block(p)) {
            text = text.trim_start().to_string();
        }

        let next_is_list = next.is_some_and(|n| html::is_element(n, "ul") || html::is_element(n, "ol"));
        let last_in_item = html::is_element(parent, "li") && (next.is_none() || next_is_list);
        if last_in_item || next.map_or(parent_is_block, |n| is_block(n)) {
            text = text.trim_end().to_string();
        }
        text
    }
}

fn is_block(node: &Handle) -> bool {
    html::tag_name(node).is_some_and(|t| BLOCK_TAGS.contains(&t))
}

/// Escape characters that would otherwise start emphasis or math.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── Overrides ────────────────────────────────────────────────────────────

fn convert_math(el: &Element<'_>, text: &str) -> String {
    let text = text.trim();
    if el.attr("display").as_deref() == Some("block") {
        format!("\n$${text}$$\n")
    } else {
        format!(" ${text}$ ")
    }
}

fn convert_table(el: &Element<'_>) -> String {
    format!("\n\n{}\n\n", html::outer_html(el.node))
}

fn convert_link(el: &Element<'_>, text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '[' | ']' | '(' | ')') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    link(el, &escaped)
}

// ── Generic rules ────────────────────────────────────────────────────────

fn link(el: &Element<'_>, text: &str) -> String {
    let (prefix, body, suffix) = chomp(text);
    if body.is_empty() {
        return String::new();
    }
    let href = el.attr("href").unwrap_or_default();
    if href.is_empty() {
        return text.to_string();
    }
    let title = el.attr("title");
    if title.is_none() && html::text_content(el.node).trim() == href {
        return format!("{prefix}<{href}>{suffix}");
    }
    match title {
        Some(t) => format!("{prefix}[{body}]({href} \"{}\"){suffix}", t.replace('"', "\\\"")),
        None => format!("{prefix}[{body}]({href}){suffix}"),
    }
}

fn convert_paragraph(_el: &Element<'_>, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        String::new()
    } else {
        format!("\n\n{text}\n\n")
    }
}

fn convert_heading(el: &Element<'_>, text: &str) -> String {
    let level = html::tag_name(el.node)
        .and_then(|t| t[1..].parse::<usize>().ok())
        .unwrap_or(1);
    let text = WHITESPACE_RUN.replace_all(text.trim(), " ");
    if text.is_empty() {
        return String::new();
    }
    format!("\n\n{} {}\n\n", "#".repeat(level), text)
}

fn convert_blockquote(_el: &Element<'_>, text: &str) -> String {
    let text = collapse_blank_lines(text);
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    let quoted: Vec<String> = text
        .lines()
        .map(|l| if l.is_empty() { ">".to_string() } else { format!("> {l}") })
        .collect();
    format!("\n\n{}\n\n", quoted.join("\n"))
}

fn convert_br(el: &Element<'_>, _text: &str) -> String {
    if el.inside(&["h1", "h2", "h3", "h4", "h5", "h6"]) {
        " ".to_string()
    } else {
        "  \n".to_string()
    }
}

/// Split surrounding whitespace off so markers hug the text: `" a "` →
/// `(" ", "a", " ")`.
fn chomp(text: &str) -> (&'static str, &str, &'static str) {
    let prefix = if text.starts_with(char::is_whitespace) { " " } else { "" };
    let suffix = if text.ends_with(char::is_whitespace) { " " } else { "" };
    (prefix, text.trim(), suffix)
}

fn inline_markup(el: &Element<'_>, text: &str, marker: &str) -> String {
    if el.inside(&["pre"]) {
        return text.to_string();
    }
    let (prefix, body, suffix) = chomp(text);
    if body.is_empty() {
        return String::new();
    }
    format!("{prefix}{marker}{body}{marker}{suffix}")
}

fn wrap_tag(tag: &str, text: &str) -> String {
    let (prefix, body, suffix) = chomp(text);
    if body.is_empty() {
        return String::new();
    }
    format!("{prefix}<{tag}>{body}</{tag}>{suffix}")
}

fn convert_code(el: &Element<'_>, text: &str) -> String {
    if el.inside(&["pre"]) {
        return text.to_string();
    }
    let (prefix, body, suffix) = chomp(text);
    if body.is_empty() {
        return String::new();
    }

    let longest_run = body
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run + 1);
    let pad = if body.starts_with('`') || body.ends_with('`') { " " } else { "" };
    format!("{prefix}{fence}{pad}{body}{pad}{fence}{suffix}")
}

fn convert_pre(el: &Element<'_>, text: &str) -> String {
    let code = text.trim_matches('\n');
    if code.is_empty() {
        return String::new();
    }
    let language = code_language(el.node)
        .or_else(|| html::find_descendant(el.node, "code").and_then(|c| code_language(&c)))
        .unwrap_or_default();
    format!("\n\n```{language}\n{code}\n```\n\n")
}

fn code_language(node: &Handle) -> Option<String> {
    html::attr(node, "class")?
        .split_whitespace()
        .find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
                .map(str::to_string)
        })
}

fn convert_img(el: &Element<'_>) -> String {
    let alt = el.attr("alt").unwrap_or_default();
    let src = el.attr("src").unwrap_or_default();
    match el.attr("title") {
        Some(title) => format!("![{alt}]({src} \"{}\")", title.replace('"', "\\\"")),
        None => format!("![{alt}]({src})"),
    }
}

fn convert_list(el: &Element<'_>, text: &str) -> String {
    if el.inside(&["li"]) {
        format!("\n{}", text.trim_end())
    } else {
        format!("\n\n{text}\n\n")
    }
}

fn convert_list_item(el: &Element<'_>, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "\n".to_string();
    }

    let bullet = if html::is_element(el.parent, "ol") {
        let start = html::attr(el.parent, "start")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(1);
        let position = html::element_children(el.parent)
            .iter()
            .filter(|c| html::is_element(c, "li"))
            .position(|c| Rc::ptr_eq(c, el.node))
            .unwrap_or(0);
        format!("{}. ", start + position)
    } else {
        "- ".to_string()
    };

    let indent = " ".repeat(bullet.len());
    let mut out = String::new();
    for (i, line) in text.lines().enumerate() {
        if i == 0 {
            out.push_str(&bullet);
            out.push_str(line);
        } else {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&indent);
                out.push_str(line);
            }
        }
    }
    out.push('\n');
    out
}

fn convert_definition(_el: &Element<'_>, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "\n".to_string();
    }
    let body = text.lines().collect::<Vec<_>>().join("\n    ");
    format!(":   {body}\n")
}

/// Collapse runs of blank lines to one, leaving fenced code untouched.
fn collapse_blank_lines(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_fence = false;
    let mut blank_run = 0usize;

    for line in markdown.split('\n') {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence && line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
            continue;
        }
        blank_run = 0;
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(html: &str) -> String {
        html_to_markdown(html)
    }

    #[test]
    fn paragraph_has_no_tags() {
        assert_eq!(md("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn block_math_gets_display_delimiters() {
        assert_eq!(
            md(r#"before<math display="block">x^2</math>after"#),
            "before\n$$x^2$$\nafter"
        );
        assert_eq!(md(r#"<math display="block"> x^2 </math>"#), "$$x^2$$");
    }

    #[test]
    fn inline_math_gets_single_dollars() {
        assert_eq!(md("a<math>x^2</math>b"), "a $x^2$ b");
    }

    #[test]
    fn math_content_is_not_escaped() {
        assert_eq!(md("<p><math>a_1 * b</math></p>"), "$a_1 * b$");
    }

    #[test]
    fn tables_pass_through_verbatim() {
        let table = r#"<table border="1"><tbody><tr><td>a_b</td><td>$5</td></tr></tbody></table>"#;
        let out = md(&format!("<p>Intro</p>{table}<p>Outro</p>"));
        assert_eq!(out, format!("Intro\n\n{table}\n\nOutro"));
    }

    #[test]
    fn link_text_brackets_are_escaped() {
        assert_eq!(
            md(r#"<p>See <a href="https://x.org/a">ref [1] (old)</a>.</p>"#),
            r"See [ref \[1\] \(old\)](https://x.org/a)."
        );
    }

    #[test]
    fn autolink_when_text_is_url() {
        assert_eq!(
            md(r#"<a href="https://x.org">https://x.org</a>"#),
            "<https://x.org>"
        );
    }

    #[test]
    fn link_without_href_is_plain_text() {
        assert_eq!(md("<p><a>anchor</a></p>"), "anchor");
    }

    #[test]
    fn dollars_and_emphasis_chars_are_escaped() {
        assert_eq!(md("<p>Costs $5 and *stars* and snake_case</p>"), r"Costs \$5 and \*stars\* and snake\_case");
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(md("<p>a \n\t  b</p>"), "a b");
    }

    #[test]
    fn pre_keeps_whitespace_and_skips_escaping() {
        assert_eq!(
            md("<pre><code class=\"language-rust\">let  x_1 = $y;\n  z</code></pre>"),
            "```rust\nlet  x_1 = $y;\n  z\n```"
        );
    }

    #[test]
    fn inline_code_is_not_escaped() {
        assert_eq!(md("<p>use <code>a_b</code> now</p>"), "use `a_b` now");
    }

    #[test]
    fn emphasis_and_strong() {
        assert_eq!(md("<p><b>bold </b>and <i>it</i></p>"), "**bold** and *it*");
    }

    #[test]
    fn headings_use_atx() {
        assert_eq!(md("<h2>Section\n Two</h2><p>x</p>"), "## Section Two\n\nx");
    }

    #[test]
    fn nested_lists_have_no_spurious_blank_lines() {
        let html = "<ul>\n<li>One \n<ul><li>Sub</li></ul></li>\n<li>Two </li>\n</ul>";
        assert_eq!(md(html), "- One\n  - Sub\n- Two");
    }

    #[test]
    fn ordered_list_honours_start() {
        assert_eq!(
            md(r#"<ol start="3"><li>c</li><li>d</li></ol>"#),
            "3. c\n4. d"
        );
    }

    #[test]
    fn images_become_markdown_images() {
        assert_eq!(
            md(r#"<img src="abc_2_img.webp" alt="Chart">"#),
            "![Chart](abc_2_img.webp)"
        );
    }

    #[test]
    fn sub_and_sup_stay_html() {
        assert_eq!(md("<p>H<sub>2</sub>O x<sup>2</sup></p>"), "H<sub>2</sub>O x<sup>2</sup>");
    }

    #[test]
    fn blockquote_lines_are_prefixed() {
        assert_eq!(md("<blockquote><p>a</p><p>b</p></blockquote>"), "> a\n>\n> b");
    }

    #[test]
    fn scripts_are_dropped() {
        assert_eq!(md("<p>x</p><script>alert(1)</script>"), "x");
    }

    #[test]
    fn excessive_nesting_yields_empty_output() {
        let html = format!("{}deep{}", "<span>".repeat(MAX_DEPTH + 10), "</span>".repeat(MAX_DEPTH + 10));
        assert!(try_html_to_markdown(&html).is_err());
        assert_eq!(html_to_markdown(&html), "");
    }

    #[test]
    fn blank_lines_inside_fences_survive() {
        let collapsed = collapse_blank_lines("a\n\n\n\nb\n```\nx\n\n\ny\n```");
        assert_eq!(collapsed, "a\n\nb\n```\nx\n\n\ny\n```\n");
    }
}
