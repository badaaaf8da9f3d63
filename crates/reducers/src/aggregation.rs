//! Per-request aggregation-pipeline accumulators: `COUNT_DISTINCT`,
//! `COUNT_DISTINCTISH`, `HLL`, and `HLL_SUM`. Each is driven row by row
//! through `new_instance` → `add` (repeated) → `finalize`, mirroring a
//! SQL-style `GROUP BY` accumulator rather than the whole-reply reducers
//! in [`crate::info`] and [`crate::spellcheck`].

use crate::hll::{Hll, HLL_SIZE};
use crate::ReducerError;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Which accumulator a pipeline step runs. `CountDistinct` is exact;
/// the other three trade exactness for fixed memory via HyperLogLog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    CountDistinct,
    CountDistinctish,
    Hll,
    HllSum,
}

/// Accumulated state for one running instance of a [`Reducer`]. Kept
/// separate from `Reducer` itself so one reducer definition can back many
/// concurrent group keys, each with its own `State`.
pub enum State {
    CountDistinct(HashSet<Vec<u8>>),
    CountDistinctish(Hll),
    Hll(Hll),
    HllSum(Option<Hll>),
}

/// Output of [`Reducer::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Double(f64),
    /// The raw `HLL` blob format: `[flags:u32][bits:u8][registers...]`.
    Blob(Vec<u8>),
}

impl Reducer {
    pub fn new_instance(self) -> State {
        match self {
            Reducer::CountDistinct => State::CountDistinct(HashSet::new()),
            Reducer::CountDistinctish => State::CountDistinctish(Hll::new()),
            Reducer::Hll => State::Hll(Hll::new()),
            Reducer::HllSum => State::HllSum(None),
        }
    }

    /// Folds one input row into `state`. For `CountDistinct` the row is the
    /// raw group value; for `CountDistinctish`/`Hll` it is hashed and folded
    /// into the register array; for `HllSum` it must already be a
    /// previously-finalized `HLL` blob.
    pub fn add(self, state: &mut State, row: &[u8]) -> Result<(), ReducerError> {
        match (self, state) {
            (Reducer::CountDistinct, State::CountDistinct(seen)) => {
                seen.insert(row.to_vec());
                Ok(())
            }
            (Reducer::CountDistinctish, State::CountDistinctish(hll)) => {
                add_hash(hll, hash_row(row));
                Ok(())
            }
            (Reducer::Hll, State::Hll(hll)) => {
                add_hash(hll, hash_row(row));
                Ok(())
            }
            (Reducer::HllSum, State::HllSum(slot)) => {
                let incoming = decode_blob(row)?;
                match slot {
                    Some(existing) => existing.merge(&incoming),
                    None => *slot = Some(incoming),
                }
                Ok(())
            }
            _ => Err(ReducerError::MalformedShardReply),
        }
    }

    pub fn finalize(self, state: State) -> Result<Value, ReducerError> {
        match (self, state) {
            (Reducer::CountDistinct, State::CountDistinct(seen)) => {
                Ok(Value::Integer(seen.len() as i64))
            }
            (Reducer::CountDistinctish, State::CountDistinctish(hll)) => {
                Ok(Value::Double(hll.count()))
            }
            (Reducer::Hll, State::Hll(hll)) => Ok(Value::Blob(encode_blob(&hll))),
            (Reducer::HllSum, State::HllSum(slot)) => {
                Ok(Value::Double(slot.unwrap_or_default().count()))
            }
            _ => Err(ReducerError::MalformedShardReply),
        }
    }
}

fn hash_row(row: &[u8]) -> u32 {
    let mut hasher = DefaultHasher::new();
    row.hash(&mut hasher);
    (hasher.finish() & 0xFFFF_FFFF) as u32
}

/// `add_hash`: the top 8 bits of the hash pick a register; the rank is one
/// plus the number of leading zero bits in the remaining 24 bits, floored
/// against the register's current value.
fn add_hash(hll: &mut Hll, h: u32) {
    let register = (h >> 24) as usize;
    let remainder = h & 0x00FF_FFFF;
    let rank = (remainder.leading_zeros() - 8) + 1;
    hll.set_register_if_greater(register, rank.min(u8::MAX as u32) as u8);
}

const HLL_BLOB_HEADER_LEN: usize = 5;

fn encode_blob(hll: &Hll) -> Vec<u8> {
    let mut out = Vec::with_capacity(HLL_BLOB_HEADER_LEN + HLL_SIZE);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(crate::hll::HLL_BITS as u8);
    out.extend_from_slice(hll.registers());
    out
}

fn decode_blob(blob: &[u8]) -> Result<Hll, ReducerError> {
    if blob.len() < HLL_BLOB_HEADER_LEN {
        return Err(ReducerError::MalformedShardReply);
    }
    let bits = blob[4];
    let expected_registers = match 1usize.checked_shl(bits as u32) {
        Some(n) if bits <= 64 => n,
        _ => return Err(ReducerError::MalformedShardReply),
    };
    if blob.len() - HLL_BLOB_HEADER_LEN != expected_registers {
        return Err(ReducerError::MalformedShardReply);
    }
    if bits as u32 != crate::hll::HLL_BITS {
        // Mismatched precision: skip rather than fail the whole merge.
        return Err(ReducerError::MalformedShardReply);
    }
    Hll::from_registers(&blob[HLL_BLOB_HEADER_LEN..])
}
