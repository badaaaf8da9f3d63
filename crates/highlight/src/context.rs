//! Context windowing: expands a fragment's byte range to include
//! surrounding text, snapped to word boundaries and bounded by a
//! neighboring fragment's own span when ranking is by position.

use crate::fragment::Fragment;

/// Characters that separate tokens for the purpose of snapping a context
/// window to a clean word boundary. Defaults to ASCII whitespace and
/// punctuation.
pub struct Delimiters([bool; 256]);

impl Delimiters {
    pub fn is_separator(&self, byte: u8) -> bool {
        self.0[byte as usize]
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        let mut table = [false; 256];
        for b in 0u8..=255 {
            table[b as usize] = b.is_ascii_whitespace() || b.is_ascii_punctuation();
        }
        Delimiters(table)
    }
}

/// Estimated characters per token, used to convert a token budget into a
/// byte budget before the boundary-snap walk.
const EST_CHARS_PER_TOK: usize = 6;

/// `(before_start, before_end, after_start, after_end)` byte ranges,
/// each possibly empty.
pub(crate) fn find_context(
    doc: &[u8],
    frag: &Fragment,
    limit_before: Option<usize>,
    limit_after: Option<usize>,
    context_size_tokens: u32,
    delimiters: &Delimiters,
) -> (usize, usize, usize, usize) {
    let frag_end = frag.start + frag.len;
    let limit_before = limit_before.unwrap_or(0);
    let limit_after = limit_after.unwrap_or(doc.len());

    let non_match_tokens = frag.total_tokens.saturating_sub(frag.num_matches) as usize;
    if (context_size_tokens as usize) <= non_match_tokens {
        return (frag.start, frag.start, frag_end, frag_end);
    }
    let context_tokens = context_size_tokens as usize - non_match_tokens;
    let context_bytes = (context_tokens / 2) * EST_CHARS_PER_TOK;

    let window_before = frag.start.saturating_sub(context_bytes).max(limit_before);
    let window_after = (frag_end + context_bytes).min(limit_after);

    let mut before_start = window_before;
    // Trim a partial word at the start of the window...
    while before_start < frag.start && !delimiters.is_separator(doc[before_start]) {
        before_start += 1;
    }
    // ...then skip the separator(s) that ended it.
    while before_start < frag.start && delimiters.is_separator(doc[before_start]) {
        before_start += 1;
    }

    let mut after_end = window_after;
    while after_end > frag_end && !delimiters.is_separator(doc[after_end - 1]) {
        after_end -= 1;
    }
    while after_end > frag_end && delimiters.is_separator(doc[after_end - 1]) {
        after_end -= 1;
    }

    (before_start, frag.start, frag_end, after_end)
}
