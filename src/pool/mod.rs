// src/pool/mod.rs

//! Worker pools: the part of the engine that moves data.
//!
//! - [`channel`] bounded, merge-capable stage inputs and broadcast outputs.
//! - [`wiring`] allocates channels for a frozen graph.
//! - [`worker`] holds the per-kind worker loops.
//!
//! [`spawn_pools`] starts `parallelism` workers for every stage. All pools
//! start together; the channels absorb any start-up ordering.

pub mod channel;
pub mod wiring;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::status::StatusTable;
use crate::graph::StageComponent;

pub use channel::{ChannelDepth, InputSender, OutputPorts, StageInput};
pub use wiring::{StageWiring, wire};
pub use worker::{ProducerExit, WorkerContext};

/// Called once per producer worker as it exits.
pub type ProducerExitHook = Arc<dyn Fn(&str, ProducerExit) + Send + Sync>;

/// Settings shared by every worker of one engine.
#[derive(Clone)]
pub struct PoolOptions {
    pub cancel: CancellationToken,
    pub idle_backoff: Duration,
    pub on_producer_exit: ProducerExitHook,
}

/// Spawn the workers for every stage into `tasks`.
///
/// Worker counts in `status` are bumped before this returns, so an observer
/// never sees a started engine with zero active workers.
pub fn spawn_pools(
    wiring: Vec<StageWiring>,
    status: &StatusTable,
    options: &PoolOptions,
    tasks: &mut JoinSet<()>,
) {
    for stage in wiring {
        let StageWiring {
            node,
            input,
            outputs,
        } = stage;
        let name = node.name().to_string();
        let Some(counters) = status.counters(&name) else {
            continue;
        };
        if let Some(input) = &input {
            counters.attach_input(input.depth());
        }

        debug!(
            stage = %name,
            kind = %node.kind(),
            workers = node.parallelism(),
            downstreams = outputs.len(),
            "starting worker pool"
        );

        for worker in 0..node.parallelism() {
            counters.worker_started();
            let ctx = WorkerContext {
                stage: name.clone(),
                worker,
                counters: Arc::clone(&counters),
                outputs: outputs.clone(),
            };

            match (node.component(), &input) {
                (StageComponent::Producer(producer), _) => {
                    let producer = Arc::clone(producer);
                    let cancel = options.cancel.clone();
                    let backoff = options.idle_backoff;
                    let hook = Arc::clone(&options.on_producer_exit);
                    tasks.spawn(async move {
                        let counters = Arc::clone(&ctx.counters);
                        let stage = ctx.stage.clone();
                        let exit = worker::run_producer(ctx, producer, cancel, backoff).await;
                        counters.worker_stopped();
                        hook(&stage, exit);
                    });
                }
                (StageComponent::Transform(transform), Some(input)) => {
                    let transform = Arc::clone(transform);
                    let input = Arc::clone(input);
                    tasks.spawn(async move {
                        let counters = Arc::clone(&ctx.counters);
                        worker::run_transform(ctx, transform, input).await;
                        counters.worker_stopped();
                    });
                }
                (StageComponent::Sink(sink), Some(input)) => {
                    let sink = Arc::clone(sink);
                    let input = Arc::clone(input);
                    tasks.spawn(async move {
                        let counters = Arc::clone(&ctx.counters);
                        worker::run_sink(ctx, sink, input).await;
                        counters.worker_stopped();
                    });
                }
                (_, None) => {
                    // Built graphs give every non-producer an input.
                    counters.worker_stopped();
                }
            }
        }
    }
}
