use crate::error::IngestError;
use crate::models::{Chunk, IngestionOptions, PageDocument};
use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max chunk length must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max chunk length {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Collapses whitespace runs to one space, drops anything that is not printable ASCII and trims.
pub fn normalize_text(text: &str) -> String {
    let printable = text
        .chars()
        .filter_map(|ch| {
            if ch.is_whitespace() {
                Some(' ')
            } else if ch.is_ascii_graphic() {
                Some(ch)
            } else {
                None
            }
        })
        .collect::<String>();

    printable.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Boundary patterns in order of preference. Group 1 marks where a chunk may end.
const BREAK_PATTERNS: [&str; 4] = [
    r"(\n[ \t]*\n)",
    r"(\n)",
    r#"[.!?]["')\]]*(\s)"#,
    r"(\s)",
];

struct BreakFinder {
    levels: Vec<Regex>,
}

impl BreakFinder {
    fn new() -> Result<Self, IngestError> {
        let levels = BREAK_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { levels })
    }

    /// Char offset into `window` of the latest preferred break within `(min_cut, max_cut]`.
    fn find_cut(&self, window: &str, min_cut: usize, max_cut: usize) -> Option<usize> {
        for level in &self.levels {
            let cut = level
                .captures_iter(window)
                .filter_map(|capture| capture.get(1))
                .map(|boundary| window[..boundary.start()].chars().count())
                .filter(|cut| *cut > min_cut && *cut <= max_cut)
                .last();

            if cut.is_some() {
                return cut;
            }
        }
        None
    }
}

/// Splits `text` into spans of at most `max_chars` characters where each span shares exactly
/// `overlap_chars` characters with the next one.
fn split_text(text: &str, config: ChunkingConfig, breaks: &BreakFinder) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        if start + config.max_chars >= total {
            spans.push(chars[start..].iter().collect());
            break;
        }

        let window_end = (start + config.max_chars + 1).min(total);
        let window: String = chars[start..window_end].iter().collect();
        let cut = breaks
            .find_cut(&window, config.overlap_chars, config.max_chars)
            .unwrap_or(config.max_chars);

        let end = start + cut;
        spans.push(chars[start..end].iter().collect());

        start = end - config.overlap_chars;
        if config.overlap_chars == 0 {
            while start < total && chars[start].is_whitespace() {
                start += 1;
            }
            if start == total {
                break;
            }
        }
    }

    spans
}

/// Splits every page into overlapping chunks. `chunk_id` is assigned sequentially across the
/// whole call, starting at zero; source and page are copied from the page.
pub fn chunk_documents(
    documents: &[PageDocument],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;
    let breaks = BreakFinder::new()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for document in documents {
        for text in split_text(&document.text, config, &breaks) {
            chunks.push(Chunk {
                text,
                source: document.source.clone(),
                page: document.page,
                chunk_id: cursor,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    debug!(
        pages = documents.len(),
        chunks = chunks.len(),
        max_chars = config.max_chars,
        overlap_chars = config.overlap_chars,
        "chunked pages"
    );

    Ok(chunks)
}
