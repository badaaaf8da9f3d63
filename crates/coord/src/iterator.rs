//! Streams pages from a cursor-backed command across every shard at once.
//!
//! Each shard gets its own loop: dispatch the current command, hand the
//! reply to the caller, ask `next_command` whether there is another page,
//! and either go around again or mark that shard exhausted. A bounded
//! `tokio::sync::mpsc` channel carries replies back to the consumer, so a
//! slow consumer naturally throttles how fast shards are re-read — the
//! same effect the original manual "trigger next batch only when the
//! reply channel has drained" rule was reaching for, here expressed as
//! ordinary channel backpressure instead of a polled threshold check.

use crate::transport::{CoordError, ShardId, ShardTransport};
use command::Command;
use reply::Reply;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;

/// Given the reply just received from a shard, decides whether to read
/// that shard's cursor again. `Some(cmd)` re-arms the loop with `cmd`;
/// `None` marks the shard depleted.
pub type NextCommand = dyn Fn(&Reply) -> Option<Command> + Send + Sync;

struct ShardState {
    id: ShardId,
    /// The most recently issued (and not yet superseded) command for this
    /// shard, or `None` once depleted. Consulted by `shutdown` to decide
    /// which shards still need a `CURSOR DEL`.
    live_command: Mutex<Option<Command>>,
}

/// Streams `(shard, reply)` pairs until every shard reports it is
/// exhausted.
pub struct ShardIterator {
    transport: Arc<dyn ShardTransport>,
    states: Arc<Vec<ShardState>>,
    cancelled: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    receiver: tokio::sync::mpsc::Receiver<(ShardId, Result<Reply, CoordError>)>,
}

impl ShardIterator {
    /// Spawns one driving task per `(shard, initial command)` pair and
    /// returns the iterator immediately; pages arrive as shards reply.
    pub fn start(
        transport: Arc<dyn ShardTransport>,
        initial_commands: Vec<(ShardId, Command)>,
        next_command: Arc<NextCommand>,
        channel_capacity: usize,
    ) -> Self {
        let pending = Arc::new(AtomicUsize::new(initial_commands.len()));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = tokio::sync::mpsc::channel(channel_capacity.max(1));

        let states: Arc<Vec<ShardState>> = Arc::new(
            initial_commands
                .iter()
                .map(|(id, cmd)| ShardState {
                    id: *id,
                    live_command: Mutex::new(Some(cmd.clone())),
                })
                .collect(),
        );

        for (index, (id, initial_cmd)) in initial_commands.into_iter().enumerate() {
            let transport = transport.clone();
            let next_command = next_command.clone();
            let tx = tx.clone();
            let pending = pending.clone();
            let cancelled = cancelled.clone();
            let states = states.clone();

            tokio::spawn(async move {
                let mut cmd = initial_cmd;
                loop {
                    // Recorded before dispatch: the command whose cursor is
                    // live right now, in case `shutdown` needs to DEL it.
                    *states[index].live_command.lock().await = Some(cmd.clone());

                    let result = transport.dispatch(id, cmd.clone()).await;
                    let natural_next = result.as_ref().ok().and_then(|reply| next_command(reply));

                    // Backpressure: if the consumer is slow this await
                    // holds the next dispatch off until there is room.
                    if tx.send((id, result)).await.is_err() {
                        break;
                    }

                    if cancelled.load(Ordering::Acquire) {
                        // Leave `live_command` pointing at the cursor we
                        // just read; `shutdown` will DEL it.
                        break;
                    }

                    match natural_next {
                        Some(next_cmd) => cmd = next_cmd,
                        None => {
                            *states[index].live_command.lock().await = None;
                            pending.fetch_sub(1, Ordering::AcqRel);
                            break;
                        }
                    }
                }
            });
        }

        ShardIterator {
            transport,
            states,
            cancelled,
            pending,
            receiver: rx,
        }
    }

    /// Awaits the next page from any shard. Returns `None` once every
    /// driving task has exited and the channel has drained.
    pub async fn next(&mut self) -> Option<(ShardId, Result<Reply, CoordError>)> {
        self.receiver.recv().await
    }

    /// Shards that have not yet reported exhaustion.
    pub fn shards_pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Cooperative shutdown: stop every shard loop from requesting further
    /// pages, drain whatever is already in flight, then best-effort issue
    /// one `CURSOR DEL` per shard that had not yet exhausted its cursor.
    pub async fn shutdown(mut self) {
        self.cancelled.store(true, Ordering::Release);
        while self.receiver.recv().await.is_some() {}

        for state in self.states.iter() {
            let mut guard = state.live_command.lock().await;
            if let Some(mut cmd) = guard.take() {
                if cmd.rewrite_cursor_to_del().is_ok() {
                    let _ = self.transport.dispatch(state.id, cmd).await;
                }
            }
        }
    }
}

impl futures_core::Stream for ShardIterator {
    type Item = (ShardId, Result<Reply, CoordError>);

    fn poll_next(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
