//! Minimal Markdown-to-block renderer.
//!
//! Source documents arrive as Markdown already converted from wikitext. This renderer only splits
//! them into the block shapes the destination workspace understands. Inline formatting is kept
//! verbatim inside the block text.

use crate::RenderedBlock;

/// Splits a Markdown document into ordered blocks.
///
/// Paragraphs are runs of non-blank lines. List items, quotes, headers, dividers and images are
/// always single-line blocks. Fenced code keeps its interior lines untouched.
pub fn render_markdown(source: &str) -> Vec<RenderedBlock> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut lines = source.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut blocks);
            continue;
        }

        if let Some(info) = trimmed.strip_prefix("```") {
            flush_paragraph(&mut paragraph, &mut blocks);
            let language = Some(info.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string);
            let mut body = Vec::new();
            for code_line in lines.by_ref() {
                if code_line.trim_start().starts_with("```") {
                    break;
                }
                body.push(code_line);
            }
            blocks.push(RenderedBlock::Code {
                language,
                text: body.join("\n"),
            });
            continue;
        }

        if let Some(block) = single_line_block(trimmed) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push(block);
            continue;
        }

        paragraph.push(trimmed);
    }

    flush_paragraph(&mut paragraph, &mut blocks);
    blocks
}

fn flush_paragraph(paragraph: &mut Vec<&str>, blocks: &mut Vec<RenderedBlock>) {
    if paragraph.is_empty() {
        return;
    }
    blocks.push(RenderedBlock::Text {
        text: paragraph.join(" "),
    });
    paragraph.clear();
}

fn single_line_block(line: &str) -> Option<RenderedBlock> {
    if line == crate::RENDER_ARTIFACT_MARKER {
        return Some(RenderedBlock::Text {
            text: line.to_string(),
        });
    }

    if matches!(line, "---" | "***" | "___") {
        return Some(RenderedBlock::Divider);
    }

    let hashes = line.chars().take_while(|ch| *ch == '#').count();
    if (1..=6).contains(&hashes) && line[hashes..].starts_with(' ') {
        return Some(RenderedBlock::Header {
            level: hashes.min(3) as u8,
            text: line[hashes..].trim().to_string(),
        });
    }

    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(RenderedBlock::BulletedItem {
            text: rest.trim().to_string(),
        });
    }

    if let Some(rest) = numbered_item_text(line) {
        return Some(RenderedBlock::NumberedItem {
            text: rest.to_string(),
        });
    }

    if let Some(rest) = line.strip_prefix('>') {
        return Some(RenderedBlock::Quote {
            text: rest.trim().to_string(),
        });
    }

    image(line)
}

fn numbered_item_text(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ").map(str::trim)
}

fn image(line: &str) -> Option<RenderedBlock> {
    let rest = line.strip_prefix("![")?;
    let (caption, rest) = rest.split_once("](")?;
    let source = rest.strip_suffix(')')?;
    let source = source.split_whitespace().next()?;

    Some(RenderedBlock::Image {
        source: source.to_string(),
        caption: Some(caption.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::render_markdown;
    use crate::RenderedBlock;

    #[test]
    fn splits_document_into_ordered_blocks() {
        let source = "# Title\n\nFirst line\ncontinues here.\n\n- one\n- two\n\n<!-- -->\n\n1. first\n> quoted\n---\n![A cat](img/cat.png)\n";
        let blocks = render_markdown(source);

        assert_eq!(
            blocks,
            vec![
                RenderedBlock::Header {
                    level: 1,
                    text: "Title".to_string()
                },
                RenderedBlock::Text {
                    text: "First line continues here.".to_string()
                },
                RenderedBlock::BulletedItem {
                    text: "one".to_string()
                },
                RenderedBlock::BulletedItem {
                    text: "two".to_string()
                },
                RenderedBlock::Text {
                    text: "<!-- -->".to_string()
                },
                RenderedBlock::NumberedItem {
                    text: "first".to_string()
                },
                RenderedBlock::Quote {
                    text: "quoted".to_string()
                },
                RenderedBlock::Divider,
                RenderedBlock::Image {
                    source: "img/cat.png".to_string(),
                    caption: Some("A cat".to_string())
                },
            ]
        );
    }

    #[test]
    fn fenced_code_keeps_interior_lines() {
        let blocks = render_markdown("```bash\necho hi\n\n# not a header\n```\nafter");
        assert_eq!(
            blocks,
            vec![
                RenderedBlock::Code {
                    language: Some("bash".to_string()),
                    text: "echo hi\n\n# not a header".to_string()
                },
                RenderedBlock::Text {
                    text: "after".to_string()
                },
            ]
        );
    }

    #[test]
    fn deep_headers_clamp_to_level_three() {
        let blocks = render_markdown("##### Deep");
        assert_eq!(
            blocks,
            vec![RenderedBlock::Header {
                level: 3,
                text: "Deep".to_string()
            }]
        );
    }

    #[test]
    fn hash_without_space_is_paragraph_text() {
        let blocks = render_markdown("#hashtag");
        assert_eq!(
            blocks,
            vec![RenderedBlock::Text {
                text: "#hashtag".to_string()
            }]
        );
    }
}
