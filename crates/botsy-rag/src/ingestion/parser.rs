//! Per-format text extraction

use pulldown_cmark::{Event, Parser, TagEnd};
use sha2::{Digest, Sha256};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{Error, Result};

use super::loader::TextSection;

/// Map typographic glyphs that PDF fonts emit to plain equivalents
fn cleanup_pdf_text(text: &str) -> String {
    let cleaned: String = text
        .replace('\0', "")
        .replace('\u{00A0}', " ")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{2010}', '\u{2011}'], "-");

    cleaned
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract PDF text per page, falling back to whole-document extraction
pub fn extract_pdf(source_id: &str, data: &[u8]) -> Result<Vec<TextSection>> {
    match lopdf::Document::load_mem(data) {
        Ok(doc) => {
            let mut sections = Vec::new();
            for page_number in doc.get_pages().keys() {
                match doc.extract_text(&[*page_number]) {
                    Ok(text) => {
                        let text = cleanup_pdf_text(&text);
                        if !text.trim().is_empty() {
                            sections.push(TextSection {
                                page: Some(*page_number),
                                text,
                            });
                        }
                    }
                    Err(e) => {
                        tracing::debug!("[{}] No text for page {}: {}", source_id, page_number, e);
                    }
                }
            }

            if sections.is_empty() {
                tracing::debug!("[{}] Per-page extraction empty, trying pdf-extract", source_id);
                return extract_pdf_whole(source_id, data).or_else(|e| {
                    tracing::warn!("[{}] PDF has no extractable text: {}", source_id, e);
                    Ok(Vec::new())
                });
            }
            Ok(sections)
        }
        Err(e) => {
            tracing::warn!("[{}] lopdf failed: {}, trying pdf-extract", source_id, e);
            extract_pdf_whole(source_id, data)
        }
    }
}

fn extract_pdf_whole(source_id: &str, data: &[u8]) -> Result<Vec<TextSection>> {
    let extracted = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data)))
        .map_err(|_| Error::parse_failed(source_id, "PDF extraction panicked"))?
        .map_err(|e| Error::parse_failed(source_id, e.to_string()))?;

    let text = cleanup_pdf_text(&extracted);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![TextSection { page: None, text }])
}

/// Extract DOCX paragraph text, including paragraphs inside table cells
pub fn extract_docx(source_id: &str, data: &[u8]) -> Result<String> {
    let doc = docx_rs::read_docx(data).map_err(|e| Error::parse_failed(source_id, e.to_string()))?;

    let mut paragraphs = Vec::new();
    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => paragraphs.push(paragraph_text(p)),
            docx_rs::DocumentChild::Table(table) => paragraphs.extend(table_rows(table)),
            _ => {}
        }
    }

    Ok(paragraphs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// One line per table row, cells joined with " | "
#[allow(irrefutable_let_patterns)]
fn table_rows(table: &docx_rs::Table) -> Vec<String> {
    let mut rows = Vec::new();
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(row) = row else {
            continue;
        };
        let mut cells = Vec::new();
        for cell in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell else {
                continue;
            };
            let text = cell
                .children
                .iter()
                .filter_map(|content| match content {
                    docx_rs::TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                    _ => None,
                })
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                cells.push(text);
            }
        }
        if !cells.is_empty() {
            rows.push(cells.join(" | "));
        }
    }
    rows
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for child in &run.children {
                match child {
                    docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                    docx_rs::RunChild::Tab(_) => text.push('\t'),
                    docx_rs::RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
    text
}

/// Decode bytes as UTF-8, falling back to Latin-1 for invalid input
pub fn decode_text(data: &[u8]) -> String {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    }
}

/// Render Markdown to plain text, keeping block boundaries as blank lines
pub fn strip_markdown(markdown: &str) -> String {
    let mut out = String::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Item) => out.push('\n'),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::List(_),
            ) => out.push_str("\n\n"),
            _ => {}
        }
    }

    out.trim().to_string()
}

/// SHA-256 of the content as lowercase hex
pub fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
