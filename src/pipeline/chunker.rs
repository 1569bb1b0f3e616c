//! Overlapping fixed-size windows for input above the single-pass limit.
//!
//! Sizes are counted in characters; offsets are byte offsets into the
//! original text, so `&text[offset..offset + content.len()] == content`.

/// One window of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    /// Byte offset of `content` in the original text.
    pub offset: usize,
    pub content: String,
}

/// Split `text` into windows of at most `window_chars` characters, each
/// starting `overlap_chars` before the previous window's end.
///
/// A window is cut at the last paragraph break, else the last sentence
/// break, inside its final fifth; otherwise at the hard limit.
pub fn split_into_windows(text: &str, window_chars: usize, overlap_chars: usize) -> Vec<TextChunk> {
    // Byte position of every char start, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = bounds.len() - 1;
    let window_chars = window_chars.max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total_chars {
        let end = (start + window_chars).min(total_chars);

        let break_at = if end < total_chars {
            let search_start = start + (window_chars * 4 / 5);
            let region_start = bounds[search_start];
            let region = &text[region_start..bounds[end]];
            region
                .rfind("\n\n")
                .or_else(|| region.rfind(". "))
                .map(|pos| region_start + pos + 2)
                .map(|byte| bounds.binary_search(&byte).unwrap_or_else(|i| i))
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(TextChunk {
            index: chunks.len(),
            offset: bounds[start],
            content: text[bounds[start]..bounds[break_at]].to_string(),
        });

        if break_at >= total_chars {
            break;
        }

        start = break_at.saturating_sub(overlap_chars).max(start + 1);
    }

    tracing::debug!(
        input_chars = total_chars,
        windows = chunks.len(),
        "Split input into overlapping windows"
    );

    chunks
}
