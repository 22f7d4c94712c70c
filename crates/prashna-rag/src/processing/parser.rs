use crate::error::{RagError, Result};

/// Text extracted from one page of an uploaded document. Plain-text uploads
/// produce a single entry with no page number.
#[derive(Debug, Clone)]
pub struct PageText {
    pub number: Option<u32>,
    pub text: String,
}

/// Extract per-page text from an uploaded file. PDFs are parsed page by page
/// so chunks can carry their originating page; anything else is decoded as
/// UTF-8 text. Layout fidelity is not a goal here.
pub fn parse_document(filename: &str, bytes: &[u8]) -> Result<Vec<PageText>> {
    if bytes.is_empty() {
        return Err(RagError::Parse("uploaded file is empty".into()));
    }

    let pages = if looks_like_pdf(filename, bytes) {
        parse_pdf(bytes)?
    } else {
        parse_text(bytes)?
    };

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(RagError::Parse("document contains no extractable text".into()));
    }

    Ok(pages)
}

fn looks_like_pdf(filename: &str, bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-") || filename.to_lowercase().ends_with(".pdf")
}

fn parse_pdf(bytes: &[u8]) -> Result<Vec<PageText>> {
    match lopdf::Document::load_mem(bytes) {
        Ok(doc) => {
            let mut pages = Vec::new();
            for (&number, _) in doc.get_pages().iter() {
                // A page that fails text extraction contributes an empty
                // entry so page numbering stays aligned with the document.
                let text = doc.extract_text(&[number]).unwrap_or_default();
                pages.push(PageText {
                    number: Some(number),
                    text,
                });
            }

            if pages.iter().any(|p| !p.text.trim().is_empty()) {
                return Ok(pages);
            }
            // No page yielded text (scanned or oddly encoded PDF); fall
            // through to the whole-document extractor.
            whole_pdf_text(bytes)
        }
        Err(_) => whole_pdf_text(bytes),
    }
}

/// Fallback extraction without page boundaries.
fn whole_pdf_text(bytes: &[u8]) -> Result<Vec<PageText>> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::Parse(format!("failed to extract PDF text: {}", e)))?;
    Ok(vec![PageText { number: None, text }])
}

fn parse_text(bytes: &[u8]) -> Result<Vec<PageText>> {
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|_| RagError::Parse("file is not a PDF and not valid UTF-8 text".into()))?;
    Ok(vec![PageText { number: None, text }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_becomes_single_unnumbered_page() {
        let pages = parse_document("notes.txt", b"alpha beta gamma").unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, None);
        assert_eq!(pages[0].text, "alpha beta gamma");
    }

    #[test]
    fn empty_file_is_a_parse_error() {
        let err = parse_document("empty.txt", b"").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn whitespace_only_file_is_a_parse_error() {
        let err = parse_document("blank.txt", b"   \n\t ").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = parse_document("binary.bin", &[0xff, 0xfe, 0x00, 0x12]).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn pdf_detection_uses_magic_bytes_and_extension() {
        assert!(looks_like_pdf("x.bin", b"%PDF-1.7 rest"));
        assert!(looks_like_pdf("report.PDF", b"not-magic"));
        assert!(!looks_like_pdf("notes.txt", b"hello"));
    }
}
