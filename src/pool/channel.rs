// src/pool/channel.rs

//! Bounded channels between stages.
//!
//! Each non-producer stage owns exactly one input channel. Every upstream
//! worker holds a sender into it, so several upstreams merge into a single
//! interleaved stream while each upstream edge stays FIFO. All workers of the
//! consuming stage share the receiver; a unit is delivered to exactly one of
//! them.
//!
//! The channel closes when the last sender is dropped, which happens when
//! every worker of every upstream stage has exited. Receivers keep returning
//! buffered units until the channel is both closed and empty.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use crate::datum::Datum;

/// Buffered-unit accounting shared by both ends of a channel.
#[derive(Debug, Default)]
pub struct ChannelDepth {
    sent: AtomicU64,
    received: AtomicU64,
}

impl ChannelDepth {
    /// Units currently buffered. Approximate while sends and receives are in
    /// flight; exact once the channel is quiet.
    pub fn current(&self) -> usize {
        let received = self.received.load(Ordering::Acquire);
        let sent = self.sent.load(Ordering::Acquire);
        sent.saturating_sub(received) as usize
    }
}

/// Create a bounded channel for one stage's input.
pub fn bounded(stage: &str, capacity: usize) -> (InputSender, StageInput) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let depth = Arc::new(ChannelDepth::default());
    (
        InputSender {
            stage: stage.to_string(),
            tx,
            depth: Arc::clone(&depth),
        },
        StageInput {
            rx: Mutex::new(rx),
            depth,
            capacity: capacity.max(1),
        },
    )
}

/// Producer-side handle into a stage's input channel.
#[derive(Debug, Clone)]
pub struct InputSender {
    stage: String,
    tx: mpsc::Sender<Datum>,
    depth: Arc<ChannelDepth>,
}

impl InputSender {
    /// Name of the stage this sender feeds.
    pub fn target(&self) -> &str {
        &self.stage
    }

    /// Push a unit, waiting while the channel is full.
    ///
    /// Fails only if the receiving stage has gone away.
    pub async fn send(&self, datum: Datum) -> Result<(), Datum> {
        match self.tx.send(datum).await {
            Ok(()) => {
                self.depth.sent.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(mpsc::error::SendError(datum)) => Err(datum),
        }
    }
}

/// Consumer side of a stage's input channel, shared by the stage's workers.
#[derive(Debug)]
pub struct StageInput {
    rx: Mutex<mpsc::Receiver<Datum>>,
    depth: Arc<ChannelDepth>,
    capacity: usize,
}

impl StageInput {
    /// Take the next unit, waiting while the channel is empty.
    ///
    /// Returns `None` once every sender is gone and the buffer is drained.
    pub async fn recv(&self) -> Option<Datum> {
        let mut rx = self.rx.lock().await;
        let datum = rx.recv().await?;
        self.depth.received.fetch_add(1, Ordering::AcqRel);
        Some(datum)
    }

    pub fn depth(&self) -> Arc<ChannelDepth> {
        Arc::clone(&self.depth)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The set of downstream inputs a stage writes to.
#[derive(Debug, Clone, Default)]
pub struct OutputPorts {
    ports: Vec<InputSender>,
}

impl OutputPorts {
    pub fn new(ports: Vec<InputSender>) -> Self {
        Self { ports }
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Deliver `datum` to every downstream stage.
    ///
    /// Each downstream receives its own clone, sharing the document. Ports
    /// are served in order, so a full downstream holds back the rest.
    /// Returns the number of downstreams that accepted the unit.
    pub async fn broadcast(&self, datum: Datum) -> usize {
        let mut delivered = 0;
        let last = self.ports.len().saturating_sub(1);
        let mut datum = Some(datum);

        for (idx, port) in self.ports.iter().enumerate() {
            let unit = if idx == last {
                datum.take()
            } else {
                datum.clone()
            };
            let Some(unit) = unit else { break };

            match port.send(unit).await {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(
                        downstream = %port.target(),
                        "downstream input closed; unit not delivered"
                    );
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn depth_tracks_buffered_units() {
        let (tx, input) = bounded("sink", 4);
        let depth = input.depth();

        tx.send(Datum::new(json!(1))).await.unwrap();
        tx.send(Datum::new(json!(2))).await.unwrap();
        assert_eq!(depth.current(), 2);

        let first = input.recv().await.unwrap();
        assert_eq!(first.document(), &json!(1));
        assert_eq!(depth.current(), 1);
    }

    #[tokio::test]
    async fn receiver_drains_after_senders_drop() {
        let (tx, input) = bounded("sink", 4);
        tx.send(Datum::new(json!("a"))).await.unwrap();
        tx.send(Datum::new(json!("b"))).await.unwrap();
        drop(tx);

        assert_eq!(input.recv().await.unwrap().document(), &json!("a"));
        assert_eq!(input.recv().await.unwrap().document(), &json!("b"));
        assert!(input.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_channel_blocks_sender_until_drained() {
        let (tx, input) = bounded("slow", 1);
        tx.send(Datum::new(json!(1))).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.send(Datum::new(json!(2))),
        )
        .await;
        assert!(blocked.is_err(), "send should wait while the channel is full");

        input.recv().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), tx.send(Datum::new(json!(3))))
            .await
            .expect("send should complete once there is room")
            .unwrap();
    }

    #[tokio::test]
    async fn broadcast_shares_document_across_ports() {
        let (tx_a, in_a) = bounded("a", 2);
        let (tx_b, in_b) = bounded("b", 2);
        let ports = OutputPorts::new(vec![tx_a, tx_b]);

        let delivered = ports.broadcast(Datum::new(json!({"k": "v"}))).await;
        assert_eq!(delivered, 2);

        let a = in_a.recv().await.unwrap();
        let b = in_b.recv().await.unwrap();
        assert!(a.shares_document_with(&b));
    }

    #[tokio::test]
    async fn broadcast_skips_closed_ports() {
        let (tx_a, in_a) = bounded("a", 2);
        let (tx_b, in_b) = bounded("b", 2);
        drop(in_a);
        let ports = OutputPorts::new(vec![tx_a, tx_b]);

        assert_eq!(ports.broadcast(Datum::new(json!(7))).await, 1);
        assert_eq!(in_b.recv().await.unwrap().document(), &json!(7));
    }
}
