//! Default [`Renderer`]: a deliberately minimal markdown-to-block-tree
//! converter, kept behind the pure rendering boundary so a richer pipeline
//! can replace it without touching the engine.
//!
//! Recognized constructs: ATX headings, fenced code blocks (diagram fences
//! become embedded assets), images and plain paragraphs. Everything else
//! passes through as paragraph text.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;

use docsync_core::contract::{
    AssetRef, DiagramKind, EmbeddedAsset, RenderedDocument, Renderer,
};

const PLACEHOLDER_PREFIX: &str = "docsync-asset:";

pub struct MarkdownRenderer {
    image_re: Regex,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self {
            // ![alt](target)
            image_re: Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").expect("static regex"),
        }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    async fn render(
        &self,
        markdown: &str,
    ) -> Result<RenderedDocument, Box<dyn std::error::Error + Send + Sync>> {
        let mut title = None;
        let mut blocks: Vec<serde_json::Value> = Vec::new();
        let mut assets: Vec<EmbeddedAsset> = Vec::new();
        let mut paragraph: Vec<String> = Vec::new();

        let mut lines = markdown.lines().peekable();
        while let Some(line) = lines.next() {
            let trimmed = line.trim_end();

            if let Some(fence) = trimmed.strip_prefix("```") {
                flush_paragraph(&mut paragraph, &mut blocks, &self.image_re, &mut assets);
                let tag = fence.trim().to_string();
                let mut body = Vec::new();
                for inner in lines.by_ref() {
                    if inner.trim_end().starts_with("```") {
                        break;
                    }
                    body.push(inner);
                }
                let body = body.join("\n");
                if let Some(kind) = DiagramKind::from_fence_tag(&tag) {
                    let placeholder = next_placeholder(assets.len());
                    assets.push(EmbeddedAsset {
                        placeholder: placeholder.clone(),
                        reference: AssetRef::Diagram { source: body, kind },
                    });
                    blocks.push(serde_json::json!({
                        "type": "image",
                        "src": placeholder,
                    }));
                } else {
                    blocks.push(serde_json::json!({
                        "type": "code_block",
                        "language": tag,
                        "text": body,
                    }));
                }
                continue;
            }

            if let Some(heading) = parse_heading(trimmed) {
                flush_paragraph(&mut paragraph, &mut blocks, &self.image_re, &mut assets);
                let (level, text) = heading;
                if level == 1 && title.is_none() {
                    title = Some(text.to_string());
                }
                blocks.push(serde_json::json!({
                    "type": "heading",
                    "level": level,
                    "text": text,
                }));
                continue;
            }

            if trimmed.is_empty() {
                flush_paragraph(&mut paragraph, &mut blocks, &self.image_re, &mut assets);
            } else {
                paragraph.push(trimmed.to_string());
            }
        }
        flush_paragraph(&mut paragraph, &mut blocks, &self.image_re, &mut assets);

        Ok(RenderedDocument {
            title,
            content: serde_json::json!({ "type": "doc", "content": blocks }),
            assets,
        })
    }

    /// Deterministic fallback diagram rendering: the source wrapped in an
    /// SVG text element. Backends that reject SVG get it routed through the
    /// asset converter like any other vector image.
    async fn render_diagram(
        &self,
        source: &str,
        kind: DiagramKind,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let mut body = String::new();
        for (i, line) in source.lines().enumerate() {
            body.push_str(&format!(
                "<text x=\"10\" y=\"{}\" font-family=\"monospace\" font-size=\"12\">{}</text>",
                20 + i * 16,
                escape_xml(line)
            ));
        }
        let height = 40 + source.lines().count() * 16;
        let svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"640\" height=\"{height}\">\
             <title>{kind:?} diagram</title>{body}</svg>"
        );
        Ok(svg.into_bytes())
    }
}

fn next_placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_PREFIX}{index}")
}

fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    rest.strip_prefix(' ').map(|text| (hashes as u8, text.trim()))
}

/// Emits the pending paragraph as one block, registering every inline image
/// as an embedded asset and swapping its target for a placeholder token.
fn flush_paragraph(
    paragraph: &mut Vec<String>,
    blocks: &mut Vec<serde_json::Value>,
    image_re: &Regex,
    assets: &mut Vec<EmbeddedAsset>,
) {
    if paragraph.is_empty() {
        return;
    }
    let text = paragraph.join(" ");
    paragraph.clear();

    let mut rewritten = String::with_capacity(text.len());
    let mut last = 0;
    for captures in image_re.captures_iter(&text) {
        let whole = captures.get(0).expect("match 0");
        let target = &captures[2];
        rewritten.push_str(&text[last..whole.start()]);
        if let Some(reference) = classify_image_target(target) {
            let placeholder = next_placeholder(assets.len());
            assets.push(EmbeddedAsset {
                placeholder: placeholder.clone(),
                reference,
            });
            rewritten.push_str(&format!("![{}]({placeholder})", &captures[1]));
        } else {
            rewritten.push_str(whole.as_str());
        }
        last = whole.end();
    }
    rewritten.push_str(&text[last..]);

    blocks.push(serde_json::json!({
        "type": "paragraph",
        "text": rewritten,
    }));
}

/// `data:` URIs embed their payload already and stay untouched.
fn classify_image_target(target: &str) -> Option<AssetRef> {
    if target.starts_with("data:") {
        None
    } else if target.starts_with("http://") || target.starts_with("https://") {
        Some(AssetRef::Remote(target.to_string()))
    } else {
        Some(AssetRef::Local(PathBuf::from(target)))
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
