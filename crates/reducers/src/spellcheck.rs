//! `SPELLCHECK` suggestion merging: every shard proposes suggestions for
//! each misspelled term in its own local dictionary; shards agree on the
//! same term set, so suggestions for a term are unioned across shards with
//! scores summed, then normalized by the merged document count. A term any
//! shard reports as already present in the index is dropped from the
//! final reply entirely.

use crate::ReducerError;
use reply::Reply;

const FOUND_TERM_IN_INDEX: &str = "term exists in index";

#[derive(Default)]
struct TermAccumulator {
    found_in_index: bool,
    suggestions: Vec<(Vec<u8>, f64)>,
}

impl TermAccumulator {
    fn add_suggestion(&mut self, suggestion: &[u8], score: f64) {
        if let Some(entry) = self.suggestions.iter_mut().find(|(s, _)| s == suggestion) {
            entry.1 += score;
        } else {
            self.suggestions.push((suggestion.to_vec(), score));
        }
    }
}

#[derive(Default)]
struct Reducer {
    terms: Vec<(Vec<u8>, TermAccumulator)>,
}

impl Reducer {
    fn term_mut(&mut self, term: &[u8]) -> &mut TermAccumulator {
        if let Some(pos) = self.terms.iter().position(|(t, _)| t.as_slice() == term) {
            &mut self.terms[pos].1
        } else {
            self.terms.push((term.to_vec(), TermAccumulator::default()));
            &mut self.terms.last_mut().unwrap().1
        }
    }
}

fn is_found_marker(reply: &Reply) -> bool {
    matches!(reply, Reply::Status(msg) if msg.as_slice() == FOUND_TERM_IN_INDEX.as_bytes())
}

/// Every shard reply is an array: `[total_docs, term_entry, term_entry, ...]`
/// where each `term_entry` is `[Status("TERM"), term, suggestions]` and
/// `suggestions` is either the found-in-index status or an array of
/// `[score_as_text, suggestion]` pairs.
fn analyze_resp2_entry(reducer: &mut Reducer, entry: &Reply) -> Result<(), ReducerError> {
    let children = entry.children().ok_or(ReducerError::MalformedShardReply)?;
    if children.len() != 3 {
        return Err(ReducerError::MalformedShardReply);
    }
    let term = children[1].as_bytes().ok_or(ReducerError::MalformedShardReply)?.to_vec();
    reducer.term_mut(&term);

    if is_found_marker(&children[2]) {
        reducer.term_mut(&term).found_in_index = true;
        return Ok(());
    }
    let suggestions = children[2].children().ok_or(ReducerError::MalformedShardReply)?;
    for pair in suggestions {
        let fields = pair.children().ok_or(ReducerError::MalformedShardReply)?;
        if fields.len() != 2 {
            return Err(ReducerError::MalformedShardReply);
        }
        let score_text = fields[0].as_bytes().ok_or(ReducerError::MalformedShardReply)?;
        let score: f64 = std::str::from_utf8(score_text)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ReducerError::MalformedShardReply)?;
        let suggestion = fields[1].as_bytes().ok_or(ReducerError::MalformedShardReply)?;
        reducer.term_mut(&term).add_suggestion(suggestion, score);
    }
    Ok(())
}

/// RESP3 shape: `[term, suggestions, term, suggestions, ...]` where
/// `suggestions` is the found-in-index status or an array of two-element
/// maps `{suggestion: score}` (represented the same way our own `Reply::Map`
/// flattens a map, so a suggestion entry is read the same as a two-child
/// container regardless of whether the wire called it Map or Array).
fn analyze_resp3_entry(reducer: &mut Reducer, term: &[u8], suggestions: &Reply) -> Result<(), ReducerError> {
    reducer.term_mut(term);
    if is_found_marker(suggestions) {
        reducer.term_mut(term).found_in_index = true;
        return Ok(());
    }
    let suggestions = suggestions.children().ok_or(ReducerError::MalformedShardReply)?;
    for entry in suggestions {
        let fields = entry.children().ok_or(ReducerError::MalformedShardReply)?;
        if fields.len() != 2 {
            return Err(ReducerError::MalformedShardReply);
        }
        let suggestion = fields[0].as_bytes().ok_or(ReducerError::MalformedShardReply)?;
        let score = fields[1].as_double().ok_or(ReducerError::MalformedShardReply)?;
        reducer.term_mut(term).add_suggestion(suggestion, score);
    }
    Ok(())
}

/// Renders the merged terms into a reply. Normally each score is divided
/// by the merged document count so a client sees a `0..1` relevance
/// fraction; with `full_score_info` set, raw summed scores are emitted
/// instead (so a further aggregation step upstream of this coordinator
/// can recompute its own normalization) alongside a separate
/// `total_doc_count` field carrying the denominator that was skipped.
fn render(reducer: Reducer, total_docs: u64, full_score_info: bool) -> Result<Reply, ReducerError> {
    // `FT.DICTADD`-originated requests can report zero documents; treat
    // that as one so normalization never divides by zero.
    let denominator = if total_docs == 0 { 1.0 } else { total_docs as f64 };
    let mut pairs = Vec::new();
    if full_score_info {
        pairs.push(Reply::string("total_doc_count"));
        pairs.push(Reply::Integer(total_docs as i64));
    }
    for (term, acc) in reducer.terms {
        if acc.found_in_index {
            continue;
        }
        let mut scored = acc.suggestions;
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let suggestions = scored
            .into_iter()
            .map(|(text, score)| {
                let score = if full_score_info { score } else { score / denominator };
                Reply::map(vec![Reply::String(text), Reply::Double(score)])
                    .expect("two-element suggestion pair is always even length")
            })
            .collect();
        pairs.push(Reply::String(term));
        pairs.push(Reply::Array(suggestions));
    }
    Ok(Reply::map(pairs)?)
}

/// Every shard reply is validated to carry a leading integer document
/// count (`children[0]`) before its term entries, matching every shard's
/// reply shape regardless of protocol.
fn take_total_docs(children: &[Reply]) -> Result<(u64, &[Reply]), ReducerError> {
    let count = children
        .first()
        .and_then(Reply::as_integer)
        .ok_or(ReducerError::MalformedShardReply)?;
    Ok((count.max(0) as u64, &children[1..]))
}

pub fn reduce_spellcheck_resp2(
    shard_replies: &[Reply],
    full_score_info: bool,
) -> Result<Reply, ReducerError> {
    if shard_replies.is_empty() {
        return Err(ReducerError::NoReplies);
    }
    let mut reducer = Reducer::default();
    let mut total_docs = 0u64;
    for reply in shard_replies {
        if reply.is_error() {
            return Err(ReducerError::ShardError(
                String::from_utf8_lossy(reply.as_error().unwrap_or(b"")).into_owned(),
            ));
        }
        let children = reply.children().ok_or(ReducerError::MalformedShardReply)?;
        let (docs, entries) = take_total_docs(children)?;
        total_docs += docs;
        for entry in entries {
            analyze_resp2_entry(&mut reducer, entry)?;
        }
    }
    render(reducer, total_docs, full_score_info)
}

pub fn reduce_spellcheck_resp3(
    shard_replies: &[Reply],
    full_score_info: bool,
) -> Result<Reply, ReducerError> {
    if shard_replies.is_empty() {
        return Err(ReducerError::NoReplies);
    }
    let mut reducer = Reducer::default();
    let mut total_docs = 0u64;
    for reply in shard_replies {
        if reply.is_error() {
            return Err(ReducerError::ShardError(
                String::from_utf8_lossy(reply.as_error().unwrap_or(b"")).into_owned(),
            ));
        }
        let children = reply.children().ok_or(ReducerError::MalformedShardReply)?;
        let (docs, rest) = take_total_docs(children)?;
        total_docs += docs;
        // `rest[0]` is the legacy placeholder paired with the leading
        // integer; real term/suggestion pairs start at `rest[1..]`.
        let entries = rest.get(1..).ok_or(ReducerError::MalformedShardReply)?;
        for pair in entries.chunks_exact(2) {
            let term = pair[0].as_bytes().ok_or(ReducerError::MalformedShardReply)?;
            analyze_resp3_entry(&mut reducer, term, &pair[1])?;
        }
    }
    render(reducer, total_docs, full_score_info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp2_entry(term: &str, suggestions: Vec<(&str, &str)>) -> Reply {
        Reply::Array(vec![
            Reply::status("TERM"),
            Reply::string(term),
            Reply::Array(
                suggestions
                    .into_iter()
                    .map(|(score, text)| Reply::Array(vec![Reply::string(score), Reply::string(text)]))
                    .collect(),
            ),
        ])
    }

    #[test]
    fn unions_and_sums_suggestion_scores_across_shards() {
        let shard_a = Reply::Array(vec![
            Reply::Integer(10),
            resp2_entry("hte", vec![("0.5", "the")]),
        ]);
        let shard_b = Reply::Array(vec![
            Reply::Integer(10),
            resp2_entry("hte", vec![("0.25", "the"), ("0.1", "hat")]),
        ]);

        let merged = reduce_spellcheck_resp2(&[shard_a, shard_b], false).unwrap();
        let suggestions = merged.map_get("hte").unwrap().children().unwrap();
        assert_eq!(suggestions.len(), 2);
        // Highest combined score (the: 0.75) sorts first.
        let top = suggestions[0].children().unwrap();
        assert_eq!(top[0], Reply::String(b"the".to_vec()));
        assert_eq!(top[1], Reply::Double(0.75 / 20.0));
    }

    #[test]
    fn full_score_info_emits_raw_scores_and_total_doc_count() {
        let shard_a = Reply::Array(vec![
            Reply::Integer(10),
            resp2_entry("hte", vec![("0.5", "the")]),
        ]);
        let shard_b = Reply::Array(vec![
            Reply::Integer(10),
            resp2_entry("hte", vec![("0.25", "the")]),
        ]);

        let merged = reduce_spellcheck_resp2(&[shard_a, shard_b], true).unwrap();
        assert_eq!(merged.map_get("total_doc_count"), Some(&Reply::Integer(20)));
        let suggestions = merged.map_get("hte").unwrap().children().unwrap();
        let top = suggestions[0].children().unwrap();
        // Raw summed score, not divided by total_doc_count.
        assert_eq!(top[1], Reply::Double(0.75));
    }

    #[test]
    fn term_found_in_index_on_any_shard_is_dropped() {
        let shard_a = Reply::Array(vec![
            Reply::Integer(5),
            resp2_entry("ok", vec![("1.0", "okay")]),
        ]);
        let shard_b = Reply::Array(vec![
            Reply::Integer(5),
            Reply::Array(vec![Reply::status("TERM"), Reply::string("ok"), Reply::status(FOUND_TERM_IN_INDEX)]),
        ]);

        let merged = reduce_spellcheck_resp2(&[shard_a, shard_b], false).unwrap();
        assert_eq!(merged.map_get("ok"), None);
    }

    #[test]
    fn resp3_skips_legacy_placeholder_pair() {
        let shard = Reply::Array(vec![
            Reply::Integer(8),
            Reply::Nil, // legacy placeholder paired with the doc count
            Reply::string("hte"),
            Reply::Array(vec![Reply::map(vec![Reply::string("the"), Reply::Double(1.0)]).unwrap()]),
        ]);

        let merged = reduce_spellcheck_resp3(&[shard], false).unwrap();
        let suggestions = merged.map_get("hte").unwrap().children().unwrap();
        assert_eq!(suggestions[0].children().unwrap()[1], Reply::Double(1.0 / 8.0));
    }
}
