//! Per-shard reply classification for the cursor streaming loop: given the
//! protocol a command was issued under and the reply a shard sent back,
//! decide whether that shard is done, errored, or produced a normal page,
//! and pull `total_results` out for the aggregator's progress accounting.
//! The decision of whether to request another page is made purely from the
//! returned cursor id elsewhere (see [`crate::iterator`]) — never from
//! `total_results`, since a page can legitimately be empty.

use command::Command;
use reply::Reply;

#[derive(Debug, Clone, PartialEq)]
pub enum ShardOutcome {
    /// Reply to a `CURSOR DEL` sent during shutdown: nothing to reduce.
    Deleted,
    /// Shard reported an error; `error_code` is truncated to the first
    /// space for logging, matching `Reply::error_code`.
    Error { error_code: Vec<u8> },
    /// The reply's shape didn't match either protocol's expected layout.
    MalformedShape,
    /// A normal page. `total_results` is `None` when the field was not
    /// present, which is itself a malformed-shape signal at the call site
    /// if the command required it.
    Success { total_results: Option<i64> },
}

/// Classifies one shard's reply to a cursor-bearing command.
pub fn classify(protocol: u8, for_profiling: bool, is_cursor_del: bool, reply: &Reply) -> ShardOutcome {
    if is_cursor_del {
        return ShardOutcome::Deleted;
    }
    if reply.is_error() {
        return ShardOutcome::Error {
            error_code: reply.error_code().unwrap_or(b"").to_vec(),
        };
    }
    match extract_total_results(protocol, for_profiling, reply) {
        Ok(total_results) => ShardOutcome::Success { total_results },
        Err(()) => ShardOutcome::MalformedShape,
    }
}

fn extract_total_results(protocol: u8, for_profiling: bool, reply: &Reply) -> Result<Option<i64>, ()> {
    if protocol >= 3 {
        let first = reply.children().and_then(|c| c.first()).ok_or(())?;
        if !matches!(first, Reply::Map(_)) {
            return Err(());
        }
        let results = if for_profiling {
            first.map_get("results").ok_or(())?
        } else {
            first
        };
        Ok(results.map_get("total_results").and_then(|r| r.as_integer()))
    } else {
        let children = reply.children().ok_or(())?;
        if children.len() != 2 && children.len() != 3 {
            return Err(());
        }
        let results = &children[0];
        if !matches!(results, Reply::Array(_)) {
            return Err(());
        }
        Ok(results
            .children()
            .and_then(|c| c.first())
            .and_then(|r| r.as_integer()))
    }
}

/// The per-shard follow-up decision: depleted cursors stop the loop; a
/// coordinator-side timeout drains the remaining cursor via `CURSOR
/// PROFILE` when profiling (so profiling stats are not lost) or discards it
/// via `CURSOR DEL` for a plain read; otherwise the loop re-arms with an
/// ordinary `CURSOR READ` against the new cursor id. `cmd` must already be
/// the 4-argument `_FT.CURSOR READ <idx> <id>` form.
pub fn next_cursor_command(
    mut cmd: Command,
    cursor_id: i64,
    coordinator_timed_out: bool,
    for_profiling: bool,
    for_cursor: bool,
) -> Option<Command> {
    if cursor_id == 0 {
        return None;
    }
    if coordinator_timed_out && for_profiling {
        cmd.rewrite_cursor_to_profile().ok()?;
        return Some(cmd);
    }
    if coordinator_timed_out && !for_cursor {
        cmd.rewrite_cursor_to_del().ok()?;
        return Some(cmd);
    }
    cmd.set_arg(3, cursor_id.to_string()).ok()?;
    Some(cmd)
}
