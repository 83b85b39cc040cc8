use std::fs;
use std::path::{Path, PathBuf};

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use crate::chunk::content_hash;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Text,
    Markdown,
}

impl SourceFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" | "text" => Some(SourceFormat::Text),
            "md" | "markdown" => Some(SourceFormat::Markdown),
            _ => None,
        }
    }
}

/// Plain text of one guideline or literature file, ready for chunking.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub title: Option<String>,
    pub text: String,
    pub content_hash: String,
}

pub fn load_source(path: &Path) -> Result<SourceText> {
    let format =
        SourceFormat::detect(path).ok_or_else(|| CoreError::UnsupportedInput(path.to_path_buf()))?;
    let raw = fs::read_to_string(path)?;
    let (title, text) = match format {
        SourceFormat::Text => (first_line_title(&raw), raw.trim().to_string()),
        SourceFormat::Markdown => markdown_to_text(&raw),
    };
    if text.trim().is_empty() {
        return Err(CoreError::EmptyInput(path.to_path_buf()));
    }
    Ok(SourceText {
        path: path.to_path_buf(),
        format,
        title,
        content_hash: content_hash(&text),
        text,
    })
}

/// Flattens markdown into paragraphs separated by blank lines. The first
/// heading becomes the title.
pub fn markdown_to_text(markdown: &str) -> (Option<String>, String) {
    let mut out = String::new();
    let mut title: Option<String> = None;
    let mut heading: Option<String> = None;
    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { .. }) => heading = Some(String::new()),
            Event::End(TagEnd::Heading(_)) => {
                if let Some(text) = heading.take() {
                    if title.is_none() && !text.trim().is_empty() {
                        title = Some(text.trim().to_string());
                    }
                }
                end_block(&mut out);
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(current) = heading.as_mut() {
                    current.push_str(&text);
                }
                out.push_str(&text);
            }
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Start(Tag::Item) => out.push_str("- "),
            Event::End(TagEnd::Item) => out.push('\n'),
            Event::End(TagEnd::TableCell) => out.push_str(" | "),
            Event::End(TagEnd::TableRow) | Event::End(TagEnd::TableHead) => out.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::List(_))
            | Event::End(TagEnd::Table) => end_block(&mut out),
            _ => {}
        }
    }
    (title, out.trim().to_string())
}

fn end_block(out: &mut String) {
    let trimmed = out.trim_end_matches([' ', '\n']).len();
    out.truncate(trimmed);
    if !out.is_empty() {
        out.push_str("\n\n");
    }
}

fn first_line_title(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(120).collect())
}
