//! Minimal markdown-to-HTML conversion for answer text.
//!
//! Answers only ever use a small markdown subset (headings, emphasis,
//! inline code, links, bullet lists), so a line-oriented converter is
//! enough. Input is HTML-escaped before any tags are introduced.

use regex::Regex;
use std::sync::OnceLock;

pub fn markdown_to_html(text: &str) -> String {
    let mut out = String::new();
    let mut in_list = false;
    let mut paragraph: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush_paragraph(&mut out, &mut paragraph);
            close_list(&mut out, &mut in_list);
            continue;
        }

        if let Some(heading) = parse_heading(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            close_list(&mut out, &mut in_list);
            out.push_str(&heading);
            out.push('\n');
        } else if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
            flush_paragraph(&mut out, &mut paragraph);
            if !in_list {
                out.push_str("<ul>\n");
                in_list = true;
            }
            out.push_str(&format!("<li>{}</li>\n", inline(item)));
        } else {
            paragraph.push(inline(trimmed));
        }
    }
    flush_paragraph(&mut out, &mut paragraph);
    close_list(&mut out, &mut in_list);
    out.trim_end().to_string()
}

fn parse_heading(line: &str) -> Option<String> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&level) && line[level..].starts_with(' ') {
        let body = inline(line[level + 1..].trim());
        Some(format!("<h{level}>{body}</h{level}>"))
    } else {
        None
    }
}

fn flush_paragraph(out: &mut String, paragraph: &mut Vec<String>) {
    if !paragraph.is_empty() {
        out.push_str(&format!("<p>{}</p>\n", paragraph.join("<br>")));
        paragraph.clear();
    }
}

fn close_list(out: &mut String, in_list: &mut bool) {
    if *in_list {
        out.push_str("</ul>\n");
        *in_list = false;
    }
}

fn inline(text: &str) -> String {
    static BOLD: OnceLock<Regex> = OnceLock::new();
    static ITALIC: OnceLock<Regex> = OnceLock::new();
    static CODE: OnceLock<Regex> = OnceLock::new();
    static LINK: OnceLock<Regex> = OnceLock::new();

    let bold = BOLD.get_or_init(|| Regex::new(r"\*\*([^*]+)\*\*").expect("static regex"));
    let italic = ITALIC.get_or_init(|| Regex::new(r"\*([^*]+)\*").expect("static regex"));
    let code = CODE.get_or_init(|| Regex::new(r"`([^`]+)`").expect("static regex"));
    let link =
        LINK.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("static regex"));

    let escaped = escape(text);
    let with_code = code.replace_all(&escaped, "<code>$1</code>");
    let with_links = link.replace_all(&with_code, r#"<a href="$2">$1</a>"#);
    let with_bold = bold.replace_all(&with_links, "<strong>$1</strong>");
    italic.replace_all(&with_bold, "<em>$1</em>").into_owned()
}

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
