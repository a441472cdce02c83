//! DOCX/DOCM extraction.
//!
//! Opens the zip container, reads `word/document.xml`, and walks it with
//! a streaming reader: paragraphs and tables are interleaved in document
//! order, table rows render pipe-delimited, runs concatenate within each
//! paragraph. Everything else in the container (styles, relationships,
//! `vbaProject.bin` for DOCM) is ignored.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use super::ExtractError;

/// Extract plain text from a DOCX or DOCM byte buffer.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let cursor = Cursor::new(bytes);
    let mut archive = ZipArchive::new(cursor)
        .map_err(|e| ExtractError::failed(format!("not a zip container: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::failed(format!("word/document.xml missing: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::failed(format!("document.xml unreadable: {e}")))?;

    parse_document_xml(&xml)
}

/// Walk WordprocessingML and emit one text block per paragraph and one
/// pipe-delimited line per table row.
fn parse_document_xml(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);

    let mut blocks: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut cells: Vec<String> = Vec::new();
    let mut rows: Vec<String> = Vec::new();

    let mut table_depth = 0usize;
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:tr" if table_depth > 0 => cells.clear(),
                b"w:tc" if table_depth > 0 => cells.push(String::new()),
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let chunk = t
                    .unescape()
                    .map_err(|e| ExtractError::failed(format!("bad XML text: {e}")))?;
                if table_depth > 0 {
                    if let Some(cell) = cells.last_mut() {
                        cell.push_str(&chunk);
                    }
                } else {
                    paragraph.push_str(&chunk);
                }
            }
            Ok(Event::Empty(e)) => {
                // Explicit line/tab marks inside a run.
                match e.name().as_ref() {
                    b"w:br" | b"w:cr" => {
                        if table_depth == 0 {
                            paragraph.push('\n');
                        }
                    }
                    b"w:tab" => {
                        if table_depth > 0 {
                            if let Some(cell) = cells.last_mut() {
                                cell.push(' ');
                            }
                        } else {
                            paragraph.push(' ');
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" if table_depth == 0 => {
                    let trimmed = paragraph.trim();
                    if !trimmed.is_empty() {
                        blocks.push(trimmed.to_string());
                    }
                    paragraph.clear();
                }
                b"w:p" if table_depth > 0 => {
                    // Paragraph break within a cell becomes a space.
                    if let Some(cell) = cells.last_mut() {
                        if !cell.is_empty() && !cell.ends_with(' ') {
                            cell.push(' ');
                        }
                    }
                }
                b"w:tr" if table_depth > 0 => {
                    let row: Vec<String> =
                        cells.iter().map(|c| c.trim().to_string()).collect();
                    if row.iter().any(|c| !c.is_empty()) {
                        rows.push(row.join(" | "));
                    }
                    cells.clear();
                }
                b"w:tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !rows.is_empty() {
                        blocks.push(rows.join("\n"));
                        rows.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ExtractError::failed(format!("XML parse error: {e}")));
            }
        }
    }

    Ok(blocks.join("\n\n"))
}
