//! Rendering: turns fragments (plus computed context) into borrowed byte
//! spans, interleaving open/close tags around each matched term. No byte
//! of the source document is copied; a caller that needs an actual
//! `writev` can map each [`Span`] into a `std::io::IoSlice`.

use crate::context::{find_context, Delimiters};
use crate::fragment::{Fragment, FragmentList, OrderMode};

/// A borrowed slice of the source document or a tag literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a>(pub &'a [u8]);

impl<'a> Span<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}

pub struct Tags<'a> {
    pub open: &'a str,
    pub close: &'a str,
}

/// Writes one fragment's matched terms as alternating preamble/open-tag/
/// token/close-tag spans, starting from `preamble_start` (or the
/// fragment's own start, if `None`) and returning the byte offset just
/// past the last token written — the natural `preamble_start` for the
/// next fragment in a position-ordered sequence.
fn write_fragment<'a>(doc: &'a [u8], frag: &Fragment, tags: &Tags<'a>, preamble_start: Option<usize>, out: &mut Vec<Span<'a>>) -> usize {
    let mut preamble = preamble_start.unwrap_or(frag.start);

    for loc in frag_term_locs(frag) {
        let term_start = frag.start + loc.0;
        let term_len = loc.1;

        if term_start > preamble {
            out.push(Span(&doc[preamble..term_start]));
        }
        if !tags.open.is_empty() {
            out.push(Span(tags.open.as_bytes()));
        }
        out.push(Span(&doc[term_start..term_start + term_len]));
        if !tags.close.is_empty() {
            out.push(Span(tags.close.as_bytes()));
        }
        preamble = term_start + term_len;
    }
    preamble
}

// `Fragment`'s term locations are private to the `fragment` module; this
// accessor keeps `render` from needing them public outside the crate.
fn frag_term_locs(frag: &Fragment) -> Vec<(usize, usize)> {
    frag.term_locs_for_render()
}

/// Highlights the entire document, inlining tags around every matched
/// term with no context trimming.
pub fn highlight_whole_doc<'a>(doc: &'a [u8], frags: &FragmentList, tags: &Tags<'a>) -> Vec<Span<'a>> {
    if frags.fragments.is_empty() {
        return vec![Span(doc)];
    }
    let mut out = Vec::new();
    let mut preamble = 0usize;
    for frag in &frags.fragments {
        preamble = write_fragment(doc, frag, tags, Some(preamble), &mut out);
    }
    if preamble < doc.len() {
        out.push(Span(&doc[preamble..]));
    }
    out
}

/// Renders the top-K fragments (by `order`) each with surrounding
/// context, one `Vec<Span>` per selected fragment. When `order` is
/// `ByPosition`, a fragment's context is additionally bounded so it
/// cannot cross into a neighboring selected fragment's own span.
pub fn highlight_fragments<'a>(
    doc: &'a [u8],
    frags: &FragmentList,
    tags: &Tags<'a>,
    context_size_tokens: u32,
    top_k: usize,
    order: OrderMode,
    delimiters: &Delimiters,
) -> Vec<Vec<Span<'a>>> {
    let indexes = frags.ranked_indexes(order, top_k);

    let mut results = Vec::with_capacity(indexes.len());
    for (ii, &frag_idx) in indexes.iter().enumerate() {
        let frag = &frags.fragments[frag_idx];

        let (before_limit, after_limit) = match order {
            OrderMode::ByPosition => (
                ii.checked_sub(1).map(|prev| {
                    let p = &frags.fragments[indexes[prev]];
                    p.start + p.len
                }),
                indexes.get(ii + 1).map(|&next| frags.fragments[next].start),
            ),
            OrderMode::ByScore => (None, None),
        };

        let (bs, be, as_, ae) = find_context(doc, frag, before_limit, after_limit, context_size_tokens, delimiters);

        let mut spans = Vec::new();
        if be > bs {
            spans.push(Span(&doc[bs..be]));
        }
        write_fragment(doc, frag, tags, Some(frag.start), &mut spans);
        if ae > as_ {
            spans.push(Span(&doc[as_..ae]));
        }
        results.push(spans);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{LockstepEvent, TermMatch};

    fn build(doc: &[u8]) -> FragmentList {
        let mut frags = FragmentList::new(doc.len(), 5);
        frags.fragmentize([LockstepEvent::Match(TermMatch {
            term_id: 1,
            tok_pos: 1,
            byte_pos: 6,
            len: 5,
            score: 1.0,
        })]);
        frags
    }

    #[test]
    fn whole_doc_wraps_only_the_match() {
        let doc = b"hello world today";
        let frags = build(doc);
        let tags = Tags { open: "<b>", close: "</b>" };
        let spans = highlight_whole_doc(doc, &frags, &tags);
        let rendered: Vec<u8> = spans.iter().flat_map(|s| s.as_bytes().to_vec()).collect();
        assert_eq!(rendered, b"hello <b>world</b> today".to_vec());
    }

    #[test]
    fn whole_doc_with_no_fragments_returns_document_unchanged() {
        let doc = b"nothing matched here";
        let frags = FragmentList::new(doc.len(), 5);
        let tags = Tags { open: "<b>", close: "</b>" };
        let spans = highlight_whole_doc(doc, &frags, &tags);
        assert_eq!(spans, vec![Span(doc)]);
    }
}
