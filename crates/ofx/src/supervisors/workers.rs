//! 🧵 Workers: the ones who actually do the work while the Supervisor takes the credit
//! in the sprint retro.
//!
//! 🧠 Knowledge graph:
//! ```text
//! SourceWorker ──(Chunk)──▶ async_channel (bounded) ──▶ SinkWorker × N
//!   next_page()                                          transform → compose → send
//! ```
//! - One `SourceWorker`; it owns the source and numbers the chunks.
//! - `sink_parallelism` `SinkWorker`s; each owns its sink, a transformer clone and a composer.
//! - The bounded channel is the backpressure: a slow cluster slows the file reader down.
//! - A sink worker that hits a fatal error closes the channel, so the reader stops too.
//!
//! ⚠️ Workers are the supervisor's private minions. Nothing outside `supervisors` touches them.

use anyhow::Result;
use tokio::task::JoinHandle;

mod sink_worker;
mod source_worker;

pub(super) use sink_worker::SinkWorker;
pub(super) use source_worker::SourceWorker;

/// 📦 One page of the offer file, numbered from 1 in file order.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Chunk {
    pub(super) number: usize,
    pub(super) page: String,
}

/// 🏗️ A background worker, that does work. duh.
pub(super) trait Worker {
    /// What the worker hands back when it is done.
    type Output: Send + 'static;

    /// 🚀 Spawn onto the runtime. The handle yields the output or the reason there is none.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}
