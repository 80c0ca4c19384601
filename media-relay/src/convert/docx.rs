//! Minimal WordprocessingML writer.
//!
//! Produces the three parts a word processor needs to open a document: the
//! content types, the package relationships and the main document. One
//! paragraph per text line, a page break wherever the text has a form feed.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::{Error, Result};

const CONTENT_TYPES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

const PACKAGE_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

const DOCUMENT_HEAD: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
    r#"<w:body>"#
);

const DOCUMENT_TAIL: &str = r#"<w:sectPr/></w:body></w:document>"#;

const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// Build `word/document.xml` for `text`.
pub fn document_xml(text: &str) -> String {
    let mut xml = String::with_capacity(DOCUMENT_HEAD.len() + text.len() * 2 + 64);
    xml.push_str(DOCUMENT_HEAD);

    let text = text.replace("\r\n", "\n");
    let pages: Vec<&str> = text
        .trim_end_matches(['\x0c', '\n'])
        .split('\x0c')
        .collect();

    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            xml.push_str(PAGE_BREAK);
        }
        for line in page.trim_end_matches('\n').split('\n') {
            push_paragraph(&mut xml, line);
        }
    }

    xml.push_str(DOCUMENT_TAIL);
    xml
}

fn push_paragraph(xml: &mut String, line: &str) {
    let line = line.trim_end();
    if line.is_empty() {
        xml.push_str("<w:p/>");
        return;
    }
    xml.push_str("<w:p><w:r>");
    for (i, segment) in line.split('\t').enumerate() {
        if i > 0 {
            xml.push_str("<w:tab/>");
        }
        if !segment.is_empty() {
            xml.push_str(r#"<w:t xml:space="preserve">"#);
            push_escaped(xml, segment);
            xml.push_str("</w:t>");
        }
    }
    xml.push_str("</w:r></w:p>");
}

fn push_escaped(xml: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => xml.push_str("&amp;"),
            '<' => xml.push_str("&lt;"),
            '>' => xml.push_str("&gt;"),
            '"' => xml.push_str("&quot;"),
            '\'' => xml.push_str("&apos;"),
            // Not representable in XML 1.0.
            c if (c as u32) < 0x20 => {}
            '\u{FFFE}' | '\u{FFFF}' => {}
            c => xml.push(c),
        }
    }
}

/// Write a DOCX package containing `text` to `path`. Returns the file size.
///
/// Blocking; call from `spawn_blocking`.
pub fn write_docx(text: &str, path: &Path) -> Result<u64> {
    let file = File::create(path).map_err(|e| Error::io_path("creating docx", path, e))?;
    let mut zip = ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", PACKAGE_RELS_XML.to_string()),
        ("word/document.xml", document_xml(text)),
    ];
    for (name, content) in parts {
        zip.start_file(name, options)
            .map_err(|e| Error::Other(format!("Failed to start DOCX entry {name}: {e}")))?;
        zip.write_all(content.as_bytes())
            .map_err(|e| Error::io_path("writing docx", path, e))?;
    }

    let file = zip
        .finish()
        .map_err(|e| Error::Other(format!("Failed to finalize DOCX package: {e}")))?;
    file.sync_all()
        .map_err(|e| Error::io_path("syncing docx", path, e))?;
    let len = file
        .metadata()
        .map_err(|e| Error::io_path("inspecting docx", path, e))?
        .len();
    Ok(len)
}
