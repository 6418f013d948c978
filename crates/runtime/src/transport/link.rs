//! Reliable, ordered in-process links.
//!
//! A [`Link`] stamps every message with its delivery deadline and hands it
//! to an unbounded channel, so sending never blocks the caller. A relay task
//! releases messages at their deadlines, in send order, into the bounded
//! channel the receiving worker reads.

use std::time::Duration;

use inventory_core::{ControllerId, ServerLink, ServerRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use super::wire::{self, ClientFrame};

/// Bytes received by the authority, tagged with the connection they came
/// from. The tag is the transport's identity, never the frame's claim.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub connection: ControllerId,
    pub bytes: Vec<u8>,
}

/// Sending half of a latency-simulating link.
#[derive(Debug)]
pub struct Link<T> {
    tx: mpsc::UnboundedSender<(Instant, T)>,
    latency: Duration,
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            latency: self.latency,
        }
    }
}

impl<T: Send + 'static> Link<T> {
    /// Creates a link and spawns its relay. Messages reach `output` no
    /// sooner than `latency` after they were sent.
    pub fn spawn(output: mpsc::Sender<T>, latency: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = spawn_relay(rx, output);
        (Self { tx, latency }, relay)
    }

    /// Returns false once the far side is gone.
    pub fn send(&self, message: T) -> bool {
        self.tx.send((Instant::now() + self.latency, message)).is_ok()
    }
}

/// Forwards stamped messages in order, waiting for each deadline.
pub fn spawn_relay<T: Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<(Instant, T)>,
    output: mpsc::Sender<T>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((deadline, message)) = rx.recv().await {
            tokio::time::sleep_until(deadline).await;
            if output.send(message).await.is_err() {
                break;
            }
        }
    })
}

/// A client's connection to the authority. Implements [`ServerLink`] so the
/// manager forwards straight onto the wire.
#[derive(Debug, Clone)]
pub struct Uplink {
    connection: ControllerId,
    link: Link<Envelope>,
}

impl Uplink {
    pub fn new(connection: ControllerId, link: Link<Envelope>) -> Self {
        Self { connection, link }
    }

    pub fn connection(&self) -> ControllerId {
        self.connection
    }

    pub fn acknowledge(&self, sequence: u64) {
        self.send_frame(&ClientFrame::Ack { sequence });
    }

    fn send_frame(&self, frame: &ClientFrame) {
        match wire::encode(frame) {
            Ok(bytes) => {
                let envelope = Envelope {
                    connection: self.connection,
                    bytes,
                };
                if !self.link.send(envelope) {
                    warn!(connection = %self.connection, "uplink closed, frame lost");
                }
            }
            Err(err) => warn!(connection = %self.connection, "failed to encode frame: {err}"),
        }
    }
}

impl ServerLink for Uplink {
    fn forward(&mut self, request: ServerRequest) {
        self.send_frame(&ClientFrame::Request(request));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relay_preserves_order_and_delays() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let (link, _relay) = Link::spawn(out_tx, Duration::from_millis(20));

        let started = Instant::now();
        for n in 0..3u8 {
            assert!(link.send(n));
        }
        for n in 0..3u8 {
            assert_eq!(out_rx.recv().await, Some(n));
        }
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn uplink_encodes_requests() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let (link, _relay) = Link::spawn(out_tx, Duration::ZERO);
        let mut uplink = Uplink::new(ControllerId(3), link);

        uplink.acknowledge(7);
        let envelope = out_rx.recv().await.unwrap();
        assert_eq!(envelope.connection, ControllerId(3));
        assert_eq!(
            wire::decode::<ClientFrame>(&envelope.bytes).unwrap(),
            ClientFrame::Ack { sequence: 7 }
        );

        uplink.forward(ServerRequest {
            controller: ControllerId(3),
            transaction: inventory_core::Transaction::Unequip {
                slot: "MainHand".into(),
            },
        });
        assert!(out_rx.recv().await.is_some());
    }
}
