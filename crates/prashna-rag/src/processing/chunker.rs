use super::parser::PageText;

/// One emitted window of tokens, tagged with its originating page. The
/// document-wide `chunk_id` is assigned by the caller in emission order.
#[derive(Debug, Clone)]
pub struct PageChunk {
    pub text: String,
    pub page: Option<u32>,
}

/// Sliding-window chunker over whitespace-tokenized page text. Windows of
/// `chunk_size` tokens step by `chunk_size - overlap`, so consecutive chunks
/// from the same page share `overlap` tokens. Pages never share a window.
pub struct TokenChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TokenChunker {
    /// Caller must guarantee `overlap < chunk_size` (config validation
    /// enforces this); otherwise the window step would be zero.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        debug_assert!(overlap < chunk_size);
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Emit chunks for all pages in reading order. A page with no tokens
    /// contributes nothing but does not break numbering: ids are positional
    /// in the returned Vec.
    pub fn chunk_pages(&self, pages: &[PageText]) -> Vec<PageChunk> {
        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();

        for page in pages {
            let tokens: Vec<&str> = page.text.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }

            let mut start = 0;
            loop {
                let end = (start + self.chunk_size).min(tokens.len());
                chunks.push(PageChunk {
                    text: tokens[start..end].join(" "),
                    page: page.number,
                });
                if end == tokens.len() {
                    break;
                }
                start += step;
            }
        }

        chunks
    }
}
