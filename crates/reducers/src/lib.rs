//! Reducers that fold per-shard replies into the single reply handed back
//! to the client: `INFO` field aggregation, `SPELLCHECK` suggestion
//! merging, the `HLL`-backed distinct-value count used by aggregation's
//! `COUNT_DISTINCTISH`, and the full `COUNT_DISTINCT`/`COUNT_DISTINCTISH`/
//! `HLL`/`HLL_SUM` per-request accumulator family in [`aggregation`].

mod aggregation;
mod hll;
mod info;
mod spellcheck;

pub use aggregation::{Reducer as AggregationReducer, State as AggregationState, Value as AggregationValue};
pub use hll::{reduce_count_distinct, Hll, HLL_BITS, HLL_SIZE};
pub use info::{reduce_info, FieldKind, FieldSpec};
pub use spellcheck::{reduce_spellcheck_resp2, reduce_spellcheck_resp3};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ReducerError {
    #[error("no shard replies to reduce")]
    NoReplies,
    #[error("a shard reply did not match the expected shape for this reducer")]
    MalformedShardReply,
    #[error("shard returned an error: {0}")]
    ShardError(String),
    #[error("inconsistent index state: {0}")]
    InconsistentState(&'static str),
}

impl From<reply::ReplyError> for ReducerError {
    fn from(_: reply::ReplyError) -> Self {
        ReducerError::MalformedShardReply
    }
}
