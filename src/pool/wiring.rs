// src/pool/wiring.rs

//! Allocate channels for a graph and connect stage outputs to inputs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::graph::{StageNode, StreamGraph};
use crate::pool::channel::{InputSender, OutputPorts, StageInput, bounded};

/// Channels attached to one stage.
#[derive(Debug)]
pub struct StageWiring {
    pub node: StageNode,
    /// `None` for producers.
    pub input: Option<Arc<StageInput>>,
    pub outputs: OutputPorts,
}

/// Create one input channel per non-producer stage and hand each stage a
/// sender into every downstream input.
///
/// No sender outlives the returned wiring, so channels close as soon as the
/// workers holding the outputs are gone.
pub fn wire(graph: &StreamGraph, default_capacity: usize) -> Vec<StageWiring> {
    let mut senders: HashMap<&str, InputSender> = HashMap::new();
    let mut inputs: HashMap<&str, Arc<StageInput>> = HashMap::new();

    for node in graph.nodes() {
        if node.upstreams().is_empty() {
            continue;
        }
        let capacity = node.queue_capacity().unwrap_or(default_capacity);
        let (tx, rx) = bounded(node.name(), capacity);
        debug!(stage = %node.name(), capacity, "allocated input channel");
        senders.insert(node.name(), tx);
        inputs.insert(node.name(), Arc::new(rx));
    }

    graph
        .nodes()
        .iter()
        .map(|node| {
            let ports = node
                .downstreams()
                .iter()
                .filter_map(|down| senders.get(down.as_str()).cloned())
                .collect();
            StageWiring {
                node: node.clone(),
                input: inputs.remove(node.name()),
                outputs: OutputPorts::new(ports),
            }
        })
        .collect()
}
