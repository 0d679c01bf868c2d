use regex::Regex;
use std::sync::LazyLock;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").expect("header regex"));
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[*+-]\s+").expect("bullet regex"));
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").expect("bold regex"));
static STRIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~([^~]+)~~").expect("strike regex"));
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\((https?://[^)\s]+)\)").expect("link regex")
});

/// Convert model Markdown to Slack mrkdwn
///
/// - `# Header` -> `*Header*`
/// - `**bold**` / `__bold__` -> `*bold*`
/// - `~~strike~~` -> `~strike~`
/// - `[Title](url)` -> `<url|Title>`
/// - `* item` / `- item` -> `• item`
///
/// Runs of blank lines collapse to a single one. Fenced code blocks and
/// inline code spans are left untouched.
pub fn markdown_to_slack(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut prev_blank = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            prev_blank = false;
            out.push(line.to_string());
            continue;
        }
        if in_fence {
            out.push(line.to_string());
            continue;
        }

        if line.is_empty() {
            if !prev_blank {
                out.push(String::new());
            }
            prev_blank = true;
            continue;
        }
        prev_blank = false;
        out.push(convert_line(line));
    }

    out.join("\n").trim_end().to_string()
}

fn convert_line(line: &str) -> String {
    if let Some(caps) = HEADER_RE.captures(line) {
        let title = caps[1].replace("**", "").replace("__", "");
        return format!("*{}*", convert_inline(&title));
    }

    let line = BULLET_RE.replace(line, "${1}• ");
    convert_inline(&line)
}

/// Apply inline rules outside of `code` spans
fn convert_inline(line: &str) -> String {
    line.split('`')
        .enumerate()
        .map(|(i, segment)| {
            if i % 2 == 1 {
                return segment.to_string();
            }
            let s = LINK_RE.replace_all(segment, "<$2|$1>");
            let s = BOLD_RE.replace_all(&s, |caps: &regex::Captures| {
                let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                format!("*{}*", inner)
            });
            STRIKE_RE.replace_all(&s, "~$1~").into_owned()
        })
        .collect::<Vec<_>>()
        .join("`")
}

/// Split text into pieces of at most `max_bytes`, preferring line breaks and
/// never cutting a UTF-8 character
pub fn split_message(text: &str, max_bytes: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > max_bytes {
        let mut cut = max_bytes;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        if let Some(newline) = rest[..cut].rfind('\n').filter(|&i| i > 0) {
            cut = newline + 1;
        }
        chunks.push(rest[..cut].trim_end_matches('\n').to_string());
        rest = &rest[cut..];
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
