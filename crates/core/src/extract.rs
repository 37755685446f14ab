//! Tag-delimited field extraction for free-form model output.
//!
//! This is a permissive scan, not a markup parser: models routinely wrap the
//! fields we ask for in prose, reasoning blocks or code fences.

const REASONING_TAGS: [&str; 2] = ["think", "thoughts"];
const FENCE: &str = "```";

/// Returns the text strictly between the first `<tag>` and the first `</tag>`
/// after it, or `""` when either marker is missing. No nesting, no escaping.
pub fn extract_tag<'a>(text: &'a str, tag: &str) -> &'a str {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let Some(start) = text.find(&open).map(|index| index + open.len()) else {
        return "";
    };
    match text[start..].find(&close) {
        Some(length) => &text[start..start + length],
        None => "",
    }
}

/// Drops a leading `<think>`/`<thoughts>` block and any code-fence marker lines.
pub fn strip_reasoning(text: &str) -> String {
    let mut remaining = text;
    for tag in REASONING_TAGS {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        if remaining.contains(&open) {
            if let Some((_, after)) = remaining.split_once(&close) {
                remaining = after.trim();
            }
        }
    }

    if !remaining.contains(FENCE) {
        return remaining.to_string();
    }

    remaining
        .lines()
        .filter(|line| !line.trim_start().starts_with(FENCE))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The `<response>` field of a raw completion, after reasoning is stripped.
pub fn extract_response(text: &str) -> String {
    extract_tag(&strip_reasoning(text), "response").to_string()
}
