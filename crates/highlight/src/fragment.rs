//! Fragment assembly: groups a lock-stepped sequence of term matches into
//! contiguous snippets, the way a walk over byte-offset and term-offset
//! iterators would.

/// One matched term, already resolved to a byte range in the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermMatch {
    pub term_id: u32,
    pub tok_pos: u32,
    pub byte_pos: usize,
    pub len: usize,
    pub score: f32,
}

/// A single step of the lock-step walk over byte offsets and term offsets:
/// either a token that matched one of the query terms, or a token that did
/// not (counted toward the gap used for fragment splitting and context
/// budgeting).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LockstepEvent {
    Match(TermMatch),
    NonMatchToken,
}

#[derive(Debug, Clone, PartialEq)]
struct TermLoc {
    term_id: u32,
    offset: usize,
    len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub(crate) start: usize,
    pub(crate) len: usize,
    pub(crate) score: f32,
    pub(crate) total_tokens: u32,
    pub(crate) num_matches: u32,
    pub(crate) frag_pos: usize,
    last_match_tok_pos: u32,
    term_locs: Vec<TermLoc>,
}

impl Fragment {
    fn has_term(&self, term_id: u32) -> bool {
        self.term_locs.iter().any(|loc| loc.term_id == term_id)
    }

    /// `(offset, len)` pairs, relative to `self.start`, in the order terms
    /// were matched. Exposed to `render` without leaking `TermLoc` itself.
    pub(crate) fn term_locs_for_render(&self) -> Vec<(usize, usize)> {
        self.term_locs.iter().map(|loc| (loc.offset, loc.len)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    ByScore,
    ByPosition,
}

pub struct FragmentList {
    pub(crate) doc_len: usize,
    pub(crate) fragments: Vec<Fragment>,
    max_distance: u32,
    toks_since_last_match: u32,
}

impl FragmentList {
    pub fn new(doc_len: usize, max_distance: u32) -> Self {
        FragmentList {
            doc_len,
            fragments: Vec::new(),
            max_distance,
            toks_since_last_match: 0,
        }
    }

    /// Consumes a lock-step event sequence, assembling fragments as it
    /// goes. A fragment continues so long as the gap since its last match
    /// stays within `max_distance` tokens; otherwise a new fragment opens.
    pub fn fragmentize(&mut self, events: impl IntoIterator<Item = LockstepEvent>) {
        for event in events {
            match event {
                LockstepEvent::Match(m) => self.add_matching_term(m),
                LockstepEvent::NonMatchToken => self.toks_since_last_match += 1,
            }
        }
    }

    fn add_matching_term(&mut self, m: TermMatch) {
        let too_far = self
            .fragments
            .last()
            .is_some_and(|f| m.tok_pos.saturating_sub(f.last_match_tok_pos) > self.max_distance);

        if self.fragments.is_empty() || too_far {
            let frag_pos = self.fragments.len();
            self.fragments.push(Fragment {
                start: m.byte_pos,
                len: 0,
                score: 0.0,
                total_tokens: 0,
                num_matches: 0,
                frag_pos,
                last_match_tok_pos: 0,
                term_locs: Vec::new(),
            });
            self.toks_since_last_match = 0;
        }

        let frag = self.fragments.last_mut().expect("just ensured non-empty");
        if !frag.has_term(m.term_id) {
            frag.score += m.score;
        }
        frag.len = (m.byte_pos - frag.start) + m.len;
        frag.last_match_tok_pos = m.tok_pos;
        frag.num_matches += 1;
        frag.total_tokens += self.toks_since_last_match + 1;
        self.toks_since_last_match = 0;
        frag.term_locs.push(TermLoc {
            term_id: m.term_id,
            offset: m.byte_pos - frag.start,
            len: m.len,
        });
    }

    pub fn num_fragments(&self) -> usize {
        self.fragments.len()
    }

    /// Fragment indexes in the requested order, truncated to `top_k`.
    pub fn ranked_indexes(&self, order: OrderMode, top_k: usize) -> Vec<usize> {
        let top_k = top_k.min(self.fragments.len());
        match order {
            OrderMode::ByPosition => (0..top_k).collect(),
            OrderMode::ByScore => {
                let mut idx: Vec<usize> = (0..self.fragments.len()).collect();
                // Stable sort descending by score; ties keep original (positional) order.
                idx.sort_by(|&a, &b| {
                    self.fragments[b]
                        .score
                        .partial_cmp(&self.fragments[a].score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                idx.truncate(top_k);
                idx
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(term_id: u32, tok_pos: u32, byte_pos: usize, len: usize, score: f32) -> LockstepEvent {
        LockstepEvent::Match(TermMatch { term_id, tok_pos, byte_pos, len, score })
    }

    #[test]
    fn matches_within_max_distance_join_one_fragment() {
        let mut frags = FragmentList::new(100, 2);
        frags.fragmentize([m(1, 0, 0, 3, 1.0), m(2, 1, 4, 3, 1.0)]);
        assert_eq!(frags.num_fragments(), 1);
        assert_eq!(frags.fragments[0].num_matches, 2);
    }

    #[test]
    fn a_gap_past_max_distance_starts_a_new_fragment() {
        let mut frags = FragmentList::new(100, 1);
        frags.fragmentize([m(1, 0, 0, 3, 1.0), m(2, 10, 40, 3, 1.0)]);
        assert_eq!(frags.num_fragments(), 2);
    }

    #[test]
    fn repeated_term_in_a_fragment_does_not_double_count_score() {
        let mut frags = FragmentList::new(100, 5);
        frags.fragmentize([m(1, 0, 0, 3, 2.0), m(1, 1, 4, 3, 2.0)]);
        assert_eq!(frags.num_fragments(), 1);
        assert_eq!(frags.fragments[0].score, 2.0);
    }

    #[test]
    fn non_match_tokens_grow_total_tokens_without_counting_as_matches() {
        let mut frags = FragmentList::new(100, 5);
        frags.fragmentize([
            m(1, 0, 0, 3, 1.0),
            LockstepEvent::NonMatchToken,
            LockstepEvent::NonMatchToken,
            m(2, 3, 10, 3, 1.0),
        ]);
        assert_eq!(frags.fragments[0].total_tokens, 3);
        assert_eq!(frags.fragments[0].num_matches, 2);
    }

    #[test]
    fn ranked_indexes_by_score_sorts_descending() {
        let mut frags = FragmentList::new(100, 0);
        frags.fragmentize([m(1, 0, 0, 1, 1.0)]);
        frags.fragmentize([m(2, 5, 20, 1, 5.0)]);
        let order = frags.ranked_indexes(OrderMode::ByScore, 2);
        assert_eq!(order, vec![1, 0]);
    }
}
