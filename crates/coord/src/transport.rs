//! The shard-facing boundary. The physical wire protocol a deployment uses
//! to reach its shards is out of scope here; every other piece of this
//! crate is written against [`ShardTransport`] so it is exercised in tests
//! against an in-memory double instead of a real connection pool.

use async_trait::async_trait;
use command::Command;
use reply::Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(pub u16);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordError {
    #[error("no such index")]
    NoSuchIndex,
    #[error("cursor quota exceeded")]
    QuotaExceeded,
    #[error("no topology is known for this request")]
    NoTopology,
    #[error("failed to distribute the command to shard {shard:?}")]
    DistributionFailed { shard: ShardId },
    #[error("coordination request timed out")]
    Timeout,
    #[error("every shard returned an error")]
    AllShardsErrored,
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    #[error("bad argument: {0}")]
    BadArgument(String),
    #[error("resource exhausted: {0}")]
    Resource(String),
    #[error("shard {0:?} is unreachable")]
    ShardUnreachable(ShardId),
    #[error("shard {0:?} returned an error reply: {1}")]
    ShardError(ShardId, String),
    #[error("internal coordinator invariant violated: {0}")]
    Internal(String),
    #[error(transparent)]
    Cursor(#[from] cursor::CursorError),
}

/// Sends one command to one shard and returns its reply. Implementations
/// own connection pooling, retries, and topology lookups; this crate only
/// asks for a reply.
#[async_trait]
pub trait ShardTransport: Send + Sync {
    /// The shards this transport currently knows how to reach. Fan-out
    /// dispatches to every shard named here.
    fn shards(&self) -> Vec<ShardId>;

    async fn dispatch(&self, shard: ShardId, cmd: Command) -> Result<Reply, CoordError>;
}
