//! Document converters built on the one-shot tool runner.

pub mod docx;
mod office;
mod pdf_text;

pub use office::OfficeConverter;
pub use pdf_text::PdfToDocxConverter;

/// Which conversion an upload goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Word processor / spreadsheet / presentation to PDF.
    OfficeToPdf,
    /// PDF text to a minimal DOCX.
    PdfToDocx,
}
