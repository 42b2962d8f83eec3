use serde_json::{json, Value};
use wiki_core::RenderedBlock;

/// Longest text run the destination API accepts in one rich-text element.
const MAX_TEXT_RUN: usize = 2000;

/// Converts a rendered block into the workspace API block object.
pub fn block_to_json(block: &RenderedBlock) -> Value {
    match block {
        RenderedBlock::Text { text } => typed("paragraph", json!({ "rich_text": rich_text(text) })),
        RenderedBlock::Header { level, text } => {
            let kind = match level {
                0 | 1 => "heading_1",
                2 => "heading_2",
                _ => "heading_3",
            };
            typed(kind, json!({ "rich_text": rich_text(text) }))
        }
        RenderedBlock::BulletedItem { text } => typed(
            "bulleted_list_item",
            json!({ "rich_text": rich_text(text) }),
        ),
        RenderedBlock::NumberedItem { text } => typed(
            "numbered_list_item",
            json!({ "rich_text": rich_text(text) }),
        ),
        RenderedBlock::Quote { text } => typed("quote", json!({ "rich_text": rich_text(text) })),
        RenderedBlock::Code { language, text } => typed(
            "code",
            json!({
                "rich_text": rich_text(text),
                "language": language.as_deref().unwrap_or("plain text"),
            }),
        ),
        RenderedBlock::Divider => typed("divider", json!({})),
        // Staged-relative files cannot be linked; keep the reference as text.
        RenderedBlock::Image { source, caption } if !is_web_url(source) => {
            let text = match caption {
                Some(caption) => format!("{caption} ({source})"),
                None => source.clone(),
            };
            typed("paragraph", json!({ "rich_text": rich_text(&text) }))
        }
        RenderedBlock::Image { source, caption } => typed(
            "image",
            json!({
                "type": "external",
                "external": { "url": source },
                "caption": caption.as_deref().map(rich_text).unwrap_or_default(),
            }),
        ),
    }
}

fn is_web_url(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

fn typed(kind: &str, body: Value) -> Value {
    json!({ "object": "block", "type": kind, kind: body })
}

fn rich_text(text: &str) -> Vec<Value> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(MAX_TEXT_RUN)
        .map(|run| json!({ "type": "text", "text": { "content": run.iter().collect::<String>() } }))
        .collect()
}
