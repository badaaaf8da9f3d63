//! Request/reduce context for non-cursor commands: send one command to
//! every shard (or to a single targeted shard) and fold the replies into
//! one reply with a caller-supplied reducer.

use crate::transport::{CoordError, ShardId, ShardTransport};
use command::Command;
use futures_util::future::join_all;
use reply::Reply;

/// Combines every shard's reply (or the error it produced) into the single
/// reply sent back to the client. Reducers for `INFO`, `SPELLCHECK`, and
/// aggregation cursors all have this shape; see the `reducers` crate.
pub type ReduceFn = dyn Fn(Vec<(ShardId, Result<Reply, CoordError>)>) -> Result<Reply, CoordError>
    + Send
    + Sync;

/// Sends `cmd` to every shard the transport knows about and reduces the
/// results. Corresponds to a masters-only broadcast: the coordinator
/// itself does not retry failed shards, it hands their errors to `reduce`.
pub async fn fanout(
    transport: &dyn ShardTransport,
    cmd: &Command,
    reduce: &ReduceFn,
) -> Result<Reply, CoordError> {
    let shards = transport.shards();
    if shards.is_empty() {
        return Err(CoordError::Internal(
            "fanout issued with no shards registered".into(),
        ));
    }
    let replies = join_all(shards.into_iter().map(|shard| {
        let cmd = cmd.clone();
        async move {
            let shard_label = format!("{}", shard.0);
            metrics_bridge::record_shard_dispatch(&shard_label);
            let started = std::time::Instant::now();
            let reply = transport.dispatch(shard, cmd).await;
            metrics_bridge::record_shard_latency_ms(&shard_label, started.elapsed().as_secs_f64() * 1000.0);
            if reply.is_err() || reply.as_ref().map(Reply::is_error).unwrap_or(false) {
                metrics_bridge::record_shard_error(&shard_label);
            }
            (shard, reply)
        }
    }))
    .await;
    reduce(replies)
}

/// Sends `cmd` to exactly one shard and reduces its single reply. Used for
/// commands that are already routed to a specific slot (`GET`, `ADD`, ...)
/// and never need fan-out.
pub async fn map_single(
    transport: &dyn ShardTransport,
    shard: ShardId,
    cmd: Command,
    reduce: &ReduceFn,
) -> Result<Reply, CoordError> {
    let shard_label = format!("{}", shard.0);
    metrics_bridge::record_shard_dispatch(&shard_label);
    let started = std::time::Instant::now();
    let reply = transport.dispatch(shard, cmd).await;
    metrics_bridge::record_shard_latency_ms(&shard_label, started.elapsed().as_secs_f64() * 1000.0);
    if reply.is_err() || reply.as_ref().map(Reply::is_error).unwrap_or(false) {
        metrics_bridge::record_shard_error(&shard_label);
    }
    reduce(vec![(shard, reply)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use command::RootCommand;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeTransport {
        shards: Vec<ShardId>,
        fail: Vec<ShardId>,
        calls: Mutex<Vec<(ShardId, Command)>>,
    }

    #[async_trait::async_trait]
    impl ShardTransport for FakeTransport {
        fn shards(&self) -> Vec<ShardId> {
            self.shards.clone()
        }

        async fn dispatch(&self, shard: ShardId, cmd: Command) -> Result<Reply, CoordError> {
            self.calls.lock().unwrap().push((shard, cmd));
            if self.fail.contains(&shard) {
                return Err(CoordError::ShardUnreachable(shard));
            }
            Ok(Reply::Integer(shard.0 as i64))
        }
    }

    fn sum_reducer() -> Box<ReduceFn> {
        Box::new(|replies| {
            let mut total = 0i64;
            for (_, result) in &replies {
                if let Ok(reply) = result {
                    total += reply.as_integer().unwrap_or(0);
                }
            }
            Ok(Reply::Integer(total))
        })
    }

    #[tokio::test]
    async fn fanout_dispatches_to_every_shard_and_reduces() {
        let transport = FakeTransport {
            shards: vec![ShardId(0), ShardId(1), ShardId(2)],
            fail: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let cmd = Command::new(vec![b"_FT.INFO".to_vec()], RootCommand::Read, 2);
        let reply = fanout(&transport, &cmd, sum_reducer().as_ref()).await.unwrap();
        assert_eq!(reply, Reply::Integer(0 + 1 + 2));
        assert_eq!(transport.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn fanout_hands_shard_errors_to_the_reducer() {
        let transport = FakeTransport {
            shards: vec![ShardId(0), ShardId(1)],
            fail: vec![ShardId(1)],
            calls: Mutex::new(Vec::new()),
        };
        let cmd = Command::new(vec![b"_FT.INFO".to_vec()], RootCommand::Read, 2);
        let seen_errors = AtomicUsize::new(0);
        let reply = fanout(
            &transport,
            &cmd,
            &|replies| {
                let errored = replies.iter().filter(|(_, r)| r.is_err()).count();
                Ok(Reply::Integer(errored as i64))
            },
        )
        .await
        .unwrap();
        let _ = &seen_errors;
        assert_eq!(reply, Reply::Integer(1));
    }

    #[tokio::test]
    async fn fanout_with_no_shards_is_an_internal_error() {
        let transport = FakeTransport {
            shards: vec![],
            fail: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let cmd = Command::new(vec![b"_FT.INFO".to_vec()], RootCommand::Read, 2);
        assert!(matches!(
            fanout(&transport, &cmd, sum_reducer().as_ref()).await,
            Err(CoordError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn map_single_targets_exactly_one_shard() {
        let transport = FakeTransport {
            shards: vec![ShardId(0), ShardId(1)],
            fail: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let cmd = Command::new(vec![b"_FT.GET".to_vec()], RootCommand::Read, 2);
        let reply = map_single(&transport, ShardId(1), cmd, sum_reducer().as_ref())
            .await
            .unwrap();
        assert_eq!(reply, Reply::Integer(1));
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }
}
