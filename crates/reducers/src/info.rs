//! `INFO` field aggregation: every shard reports the same named fields,
//! each summed, averaged, or maxed according to its field type, then
//! folded back into one reply shaped the same way a single shard's would
//! be.

use crate::ReducerError;
use reply::Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Summed as an integer across shards.
    WholeSum,
    /// Summed as a float across shards.
    DoubleSum,
    /// Arithmetic mean across shards that reported the field.
    DoubleAverage,
    /// Largest value reported by any shard.
    Max,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn spec(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

pub const TOPLEVEL_FIELDS: &[FieldSpec] = &[
    spec("num_docs", FieldKind::WholeSum),
    spec("max_doc_id", FieldKind::Max),
    spec("num_terms", FieldKind::WholeSum),
    spec("num_records", FieldKind::WholeSum),
    spec("inverted_sz_mb", FieldKind::DoubleSum),
    spec("total_inverted_index_blocks", FieldKind::WholeSum),
    spec("vector_index_sz_mb", FieldKind::DoubleSum),
    spec("offset_vectors_sz_mb", FieldKind::DoubleSum),
    spec("doc_table_size_mb", FieldKind::DoubleSum),
    spec("sortable_values_size_mb", FieldKind::DoubleSum),
    spec("key_table_size_mb", FieldKind::DoubleSum),
    spec("tag_overhead_sz_mb", FieldKind::DoubleSum),
    spec("text_overhead_sz_mb", FieldKind::DoubleSum),
    spec("total_index_memory_sz_mb", FieldKind::DoubleSum),
    spec("geoshapes_sz_mb", FieldKind::DoubleSum),
    spec("records_per_doc_avg", FieldKind::DoubleAverage),
    spec("bytes_per_record_avg", FieldKind::DoubleAverage),
    spec("offsets_per_term_avg", FieldKind::DoubleAverage),
    spec("offset_bits_per_record_avg", FieldKind::DoubleAverage),
    spec("indexing", FieldKind::WholeSum),
    spec("percent_indexed", FieldKind::DoubleAverage),
    spec("hash_indexing_failures", FieldKind::WholeSum),
    spec("number_of_uses", FieldKind::Max),
    spec("cleaning", FieldKind::WholeSum),
];

pub const GC_FIELDS: &[FieldSpec] = &[
    spec("bytes_collected", FieldKind::WholeSum),
    spec("total_ms_run", FieldKind::WholeSum),
    spec("total_cycles", FieldKind::WholeSum),
    spec("average_cycle_time_ms", FieldKind::DoubleAverage),
    spec("last_run_time_ms", FieldKind::Max),
    spec("gc_numeric_trees_missed", FieldKind::WholeSum),
    spec("gc_blocks_denied", FieldKind::WholeSum),
];

pub const CURSOR_FIELDS: &[FieldSpec] = &[
    spec("global_idle", FieldKind::WholeSum),
    spec("global_total", FieldKind::WholeSum),
    spec("index_capacity", FieldKind::WholeSum),
    spec("index_total", FieldKind::WholeSum),
];

pub const DIALECT_FIELDS: &[FieldSpec] = &[
    spec("dialect_1", FieldKind::Max),
    spec("dialect_2", FieldKind::Max),
    spec("dialect_3", FieldKind::Max),
    spec("dialect_4", FieldKind::Max),
];

/// Fields that aren't summed or averaged: whichever shard reports a
/// non-nil value first, in shard order, wins and every later shard's
/// value for that field is ignored.
const FIRST_NON_NULL_FIELDS: &[&str] = &[
    "index_name",
    "attributes",
    "index_definition",
    "index_options",
    "stopwords_list",
];

fn first_non_null<'a>(shard_replies: &[&'a Reply], field: &str) -> Option<&'a Reply> {
    shard_replies
        .iter()
        .find_map(|r| r.map_get(field).filter(|v| !v.is_nil()))
}

/// Combines one position of the `"field statistics"` array across shards:
/// `identifier`/`attribute` are first-non-null-wins, every other scalar
/// sub-field is additively summed (an indexing-error count reported once
/// per shard that hit it).
fn combine_field_stat(acc: &mut Reply, incoming: &Reply) -> Result<(), ReducerError> {
    let Some(incoming_pairs) = incoming.children() else {
        return Ok(());
    };
    let mut pairs = match acc.children() {
        Some(p) => p.to_vec(),
        None => Vec::new(),
    };
    for pair in incoming_pairs.chunks_exact(2) {
        let key = pair[0].clone();
        let key_name = key.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned());
        let incoming_value = &pair[1];
        let existing = pairs
            .chunks_exact_mut(2)
            .find(|p| p[0] == key);
        match existing {
            Some(slot) => {
                let is_identifying = matches!(
                    key_name.as_deref(),
                    Some("identifier") | Some("attribute")
                );
                if is_identifying {
                    if slot[1].is_nil() {
                        slot[1] = incoming_value.clone();
                    }
                } else {
                    slot[1] = Reply::Integer(
                        slot[1].as_integer().unwrap_or(0) + incoming_value.as_integer().unwrap_or(0),
                    );
                }
            }
            None => {
                pairs.push(key);
                pairs.push(incoming_value.clone());
            }
        }
    }
    *acc = Reply::map(pairs)?;
    Ok(())
}

/// Merges the `"field statistics"` array reported by every shard: each
/// shard reports one entry per field spec, in the same order, and entries
/// at the same position are combined with [`combine_field_stat`]. Every
/// shard's array must be the same length; a shard reporting a different
/// count than the first one seen means the index shape disagrees across
/// shards and the whole reduction fails.
fn merge_field_statistics(shard_replies: &[&Reply]) -> Result<Option<Reply>, ReducerError> {
    let mut merged: Option<Vec<Reply>> = None;
    for reply in shard_replies {
        let Some(stats) = reply.map_get("field statistics") else {
            continue;
        };
        let Some(entries) = stats.children() else {
            continue;
        };
        match &mut merged {
            None => merged = Some(entries.to_vec()),
            Some(acc) => {
                if acc.len() != entries.len() {
                    return Err(ReducerError::InconsistentState(
                        "field statistics array length differs across shards",
                    ));
                }
                for (slot, incoming) in acc.iter_mut().zip(entries) {
                    combine_field_stat(slot, incoming)?;
                }
            }
        }
    }
    Ok(merged.map(Reply::Array))
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    set: bool,
    total_l: i64,
    total_d: f64,
    avg_sum: f64,
    avg_count: f64,
}

impl Accumulator {
    fn merge(&mut self, kind: FieldKind, value: &Reply) {
        match kind {
            FieldKind::WholeSum => self.total_l += value.as_integer().unwrap_or(0),
            FieldKind::DoubleSum => self.total_d += value.as_double().unwrap_or(0.0),
            FieldKind::DoubleAverage => {
                self.avg_count += 1.0;
                self.avg_sum += value.as_double().unwrap_or(0.0);
            }
            FieldKind::Max => {
                let v = value.as_integer().unwrap_or(0);
                if v > self.total_l {
                    self.total_l = v;
                }
            }
        }
        self.set = true;
    }

    fn into_reply(self, kind: FieldKind) -> Reply {
        if !self.set {
            return Reply::Nil;
        }
        match kind {
            FieldKind::WholeSum | FieldKind::Max => Reply::Integer(self.total_l),
            FieldKind::DoubleSum => Reply::Double(self.total_d),
            FieldKind::DoubleAverage => {
                if self.avg_count == 0.0 {
                    Reply::Double(0.0)
                } else {
                    Reply::Double(self.avg_sum / self.avg_count)
                }
            }
        }
    }
}

fn merge_group(specs: &[FieldSpec], shard_maps: &[&Reply]) -> Vec<Accumulator> {
    let mut accs = vec![Accumulator::default(); specs.len()];
    for map in shard_maps {
        for (acc, field) in accs.iter_mut().zip(specs) {
            if let Some(value) = map.map_get(field.name) {
                if !value.is_nil() {
                    acc.merge(field.kind, value);
                }
            }
        }
    }
    accs
}

fn group_to_pairs(specs: &[FieldSpec], accs: &[Accumulator]) -> Vec<Reply> {
    let mut pairs = Vec::with_capacity(specs.len() * 2);
    for (field, acc) in specs.iter().zip(accs) {
        pairs.push(Reply::string(field.name));
        pairs.push(acc.into_reply(field.kind));
    }
    pairs
}

/// Recomputes `average_cycle_time_ms` from the merged `total_cycles` and
/// `total_ms_run` rather than averaging each shard's own already-averaged
/// value, since averaging averages would weight a shard with few GC
/// cycles the same as one with many.
fn recompute_average_cycle_time(gc: &mut [Accumulator]) {
    let index_of = |name| GC_FIELDS.iter().position(|f| f.name == name);
    let Some(avg_idx) = index_of("average_cycle_time_ms") else {
        return;
    };
    match (index_of("total_cycles"), index_of("total_ms_run")) {
        (Some(cycles_idx), Some(ms_idx)) => {
            gc[avg_idx] = Accumulator {
                set: true,
                avg_count: gc[cycles_idx].total_l as f64,
                avg_sum: gc[ms_idx].total_l as f64,
                ..Accumulator::default()
            };
        }
        _ => gc[avg_idx].set = false,
    }
}

/// Reduces one `INFO` reply per shard (each a top-level map with nested
/// `gc_stats`/`cursor_stats`/`dialect_stats` maps) into a single merged map
/// of the same shape.
pub fn reduce_info(shard_replies: &[Reply]) -> Result<Reply, ReducerError> {
    if shard_replies.is_empty() {
        return Err(ReducerError::NoReplies);
    }

    let errored = shard_replies.iter().filter(|r| r.is_error()).count();
    if errored == shard_replies.len() {
        let first = shard_replies[0].as_error().unwrap_or(b"");
        return Err(ReducerError::ShardError(
            String::from_utf8_lossy(first).into_owned(),
        ));
    }
    let ok_replies: Vec<&Reply> = shard_replies.iter().filter(|r| !r.is_error()).collect();

    let toplevel_maps: Vec<&Reply> = ok_replies.iter().copied().collect();
    let toplevel = merge_group(TOPLEVEL_FIELDS, &toplevel_maps);

    let gc_maps: Vec<&Reply> = ok_replies
        .iter()
        .filter_map(|r| r.map_get("gc_stats"))
        .collect();
    let mut gc = merge_group(GC_FIELDS, &gc_maps);
    recompute_average_cycle_time(&mut gc);

    let cursor_maps: Vec<&Reply> = ok_replies
        .iter()
        .filter_map(|r| r.map_get("cursor_stats"))
        .collect();
    let cursor = merge_group(CURSOR_FIELDS, &cursor_maps);

    let dialect_maps: Vec<&Reply> = ok_replies
        .iter()
        .filter_map(|r| r.map_get("dialect_stats"))
        .collect();
    let dialect = merge_group(DIALECT_FIELDS, &dialect_maps);

    let mut pairs = group_to_pairs(TOPLEVEL_FIELDS, &toplevel);
    for field in FIRST_NON_NULL_FIELDS {
        if let Some(value) = first_non_null(&ok_replies, *field) {
            pairs.push(Reply::string(*field));
            pairs.push(value.clone());
        }
    }
    if let Some(field_statistics) = merge_field_statistics(&ok_replies)? {
        pairs.push(Reply::string("field statistics"));
        pairs.push(field_statistics);
    }
    pairs.push(Reply::string("gc_stats"));
    pairs.push(Reply::map(group_to_pairs(GC_FIELDS, &gc))?);
    pairs.push(Reply::string("cursor_stats"));
    pairs.push(Reply::map(group_to_pairs(CURSOR_FIELDS, &cursor))?);
    pairs.push(Reply::string("dialect_stats"));
    pairs.push(Reply::map(group_to_pairs(DIALECT_FIELDS, &dialect))?);

    Ok(Reply::map(pairs)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard_info(num_docs: i64, max_doc_id: i64, inverted_sz_mb: f64, total_cycles: i64, total_ms_run: i64) -> Reply {
        Reply::map(vec![
            Reply::string("num_docs"),
            Reply::Integer(num_docs),
            Reply::string("max_doc_id"),
            Reply::Integer(max_doc_id),
            Reply::string("inverted_sz_mb"),
            Reply::Double(inverted_sz_mb),
            Reply::string("gc_stats"),
            Reply::map(vec![
                Reply::string("total_cycles"),
                Reply::Integer(total_cycles),
                Reply::string("total_ms_run"),
                Reply::Integer(total_ms_run),
            ])
            .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn sums_maxes_and_recomputes_average_cycle_time() {
        let shards = vec![
            shard_info(10, 100, 1.5, 4, 40),
            shard_info(20, 80, 2.5, 6, 90),
        ];
        let merged = reduce_info(&shards).unwrap();

        assert_eq!(merged.map_get("num_docs"), Some(&Reply::Integer(30)));
        assert_eq!(merged.map_get("max_doc_id"), Some(&Reply::Integer(100)));
        assert_eq!(merged.map_get("inverted_sz_mb"), Some(&Reply::Double(4.0)));

        let gc = merged.map_get("gc_stats").unwrap();
        assert_eq!(gc.map_get("total_cycles"), Some(&Reply::Integer(10)));
        assert_eq!(gc.map_get("total_ms_run"), Some(&Reply::Integer(130)));
        // 130ms / 10 cycles, not the average of the two shards' own averages.
        assert_eq!(gc.map_get("average_cycle_time_ms"), Some(&Reply::Double(13.0)));
    }

    #[test]
    fn empty_shard_list_is_an_error() {
        assert_eq!(reduce_info(&[]), Err(ReducerError::NoReplies));
    }

    #[test]
    fn shard_error_reply_short_circuits() {
        let shards = vec![Reply::error("ERR index not found")];
        assert_eq!(
            reduce_info(&shards),
            Err(ReducerError::ShardError("ERR index not found".into()))
        );
    }

    #[test]
    fn a_single_errored_shard_is_dropped_not_fatal() {
        let shards = vec![
            shard_info(10, 100, 1.5, 4, 40),
            Reply::error("ERR shard unreachable"),
            shard_info(20, 80, 2.5, 6, 90),
        ];
        let merged = reduce_info(&shards).unwrap();
        assert_eq!(merged.map_get("num_docs"), Some(&Reply::Integer(30)));
        assert_eq!(merged.map_get("max_doc_id"), Some(&Reply::Integer(100)));
    }

    fn shard_with_special_fields(index_name: Option<&str>) -> Reply {
        let mut pairs = vec![
            Reply::string("num_docs"),
            Reply::Integer(1),
            Reply::string("max_doc_id"),
            Reply::Integer(1),
            Reply::string("inverted_sz_mb"),
            Reply::Double(0.0),
        ];
        if let Some(name) = index_name {
            pairs.push(Reply::string("index_name"));
            pairs.push(Reply::string(name));
        }
        Reply::map(pairs).unwrap()
    }

    #[test]
    fn first_non_null_special_field_wins() {
        let shards = vec![
            shard_with_special_fields(None),
            shard_with_special_fields(Some("idx")),
            shard_with_special_fields(Some("other")),
        ];
        let merged = reduce_info(&shards).unwrap();
        assert_eq!(merged.map_get("index_name"), Some(&Reply::string("idx")));
    }

    fn shard_with_field_statistics(entries: Vec<Reply>) -> Reply {
        Reply::map(vec![
            Reply::string("num_docs"),
            Reply::Integer(1),
            Reply::string("max_doc_id"),
            Reply::Integer(1),
            Reply::string("inverted_sz_mb"),
            Reply::Double(0.0),
            Reply::string("field statistics"),
            Reply::Array(entries),
        ])
        .unwrap()
    }

    fn field_stat(identifier: &str, errors: i64) -> Reply {
        Reply::map(vec![
            Reply::string("identifier"),
            Reply::string(identifier),
            Reply::string("index_errors"),
            Reply::Integer(errors),
        ])
        .unwrap()
    }

    #[test]
    fn field_statistics_combine_by_position() {
        let shards = vec![
            shard_with_field_statistics(vec![field_stat("title", 1), field_stat("body", 0)]),
            shard_with_field_statistics(vec![field_stat("title", 2), field_stat("body", 3)]),
        ];
        let merged = reduce_info(&shards).unwrap();
        let stats = merged.map_get("field statistics").unwrap();
        let entries = stats.children().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].map_get("identifier"),
            Some(&Reply::string("title"))
        );
        assert_eq!(entries[0].map_get("index_errors"), Some(&Reply::Integer(3)));
        assert_eq!(entries[1].map_get("index_errors"), Some(&Reply::Integer(3)));
    }

    #[test]
    fn field_statistics_length_mismatch_is_an_error() {
        let shards = vec![
            shard_with_field_statistics(vec![field_stat("title", 0)]),
            shard_with_field_statistics(vec![field_stat("title", 0), field_stat("body", 0)]),
        ];
        assert_eq!(
            reduce_info(&shards),
            Err(ReducerError::InconsistentState(
                "field statistics array length differs across shards"
            ))
        );
    }
}
