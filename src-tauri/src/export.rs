//! HTML, PDF and DOCX exports.
//!
//! HTML is the markup as-is. PDF and DOCX get the flattened plain text, so
//! all formatting is lost on the way.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use docx_rs::{Docx, Paragraph, Run};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{Error, Result};

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_MM: f32 = 10.0;
const FONT_SIZE: f32 = 12.0;
const LINE_HEIGHT_MM: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Html,
    Pdf,
    Docx,
}

impl ExportFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Html => "greenword.html",
            ExportFormat::Pdf => "greenword.pdf",
            ExportFormat::Docx => "greenword.docx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Html => "text/html",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Html => "HTML",
            ExportFormat::Pdf => "PDF",
            ExportFormat::Docx => "DOCX",
        })
    }
}

fn failed(format: ExportFormat, reason: impl fmt::Display) -> Error {
    Error::ExportFailed {
        format: format.to_string(),
        reason: reason.to_string(),
    }
}

pub fn to_html(document: &Document) -> Vec<u8> {
    document.markup().as_bytes().to_vec()
}

/// A4 pages, Helvetica 12pt, first line 10 mm from the top-left corner.
pub fn to_pdf(plain_text: &str) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new("GreenWord", PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| failed(ExportFormat::Pdf, e))?;

    let mut current = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_HEIGHT.0 - MARGIN_MM;
    for line in plain_text.lines() {
        if y < MARGIN_MM {
            let (page, layer) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
            current = doc.get_page(page).get_layer(layer);
            y = PAGE_HEIGHT.0 - MARGIN_MM;
        }
        current.use_text(line, FONT_SIZE, Mm(MARGIN_MM), Mm(y), &font);
        y -= LINE_HEIGHT_MM;
    }

    doc.save_to_bytes().map_err(|e| failed(ExportFormat::Pdf, e))
}

/// One paragraph per line of text.
pub fn to_docx(plain_text: &str) -> Result<Vec<u8>> {
    let docx = plain_text.split('\n').fold(Docx::new(), |docx, line| {
        docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)))
    });

    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| failed(ExportFormat::Docx, e))?;
    Ok(buf.into_inner())
}

/// Bytes of the document in `format`, flattening for PDF and DOCX.
pub fn export(format: ExportFormat, document: &Document) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Html => Ok(to_html(document)),
        ExportFormat::Pdf => to_pdf(&document.plain_text()),
        ExportFormat::Docx => to_docx(&document.plain_text()),
    }
}

/// Writes the export into `dir` under its fixed file name.
pub fn save_export(dir: &Path, format: ExportFormat, document: &Document) -> Result<PathBuf> {
    let bytes = export(format, document)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format.file_name());
    std::fs::write(&path, bytes)?;
    tracing::info!("exported {format} ({}) to {}", format.mime_type(), path.display());
    Ok(path)
}
