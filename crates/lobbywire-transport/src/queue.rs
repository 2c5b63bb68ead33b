//! Bounded per-connection outbound queues.
//!
//! Every connection owns one queue. Producers (handlers, broadcasts) hold
//! a [`FrameSender`] and never wait: a full queue is reported as
//! [`TransportError::Backpressure`] and the frame is dropped for that
//! connection only. A single consumer, the connection's writer, drains the
//! [`OutboundQueue`] onto the socket.
//!
//! Closing is a signal on the side: [`FrameSender::close`] records a
//! reason once. The consumer still drains frames that were queued before
//! the signal, then receives [`Outgoing::Close`] exactly once.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::{ConnectionId, Frame, TransportError};

/// What the writer should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Put this frame on the wire.
    Frame(Frame),
    /// Send a close frame with this reason and stop.
    Close(String),
}

/// Creates a connected sender/queue pair holding at most `capacity`
/// undelivered frames.
pub fn outbound_queue(
    id: ConnectionId,
    capacity: usize,
) -> (FrameSender, OutboundQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (close_tx, close_rx) = watch::channel(None);
    let sender = FrameSender {
        id,
        tx,
        close: Arc::new(close_tx),
    };
    let queue = OutboundQueue {
        rx,
        close: close_rx,
        finished: false,
    };
    (sender, queue)
}

/// Cloneable, non-blocking handle onto one connection's outbound queue.
#[derive(Debug, Clone)]
pub struct FrameSender {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    close: Arc<watch::Sender<Option<String>>>,
}

impl FrameSender {
    /// The connection this sender feeds.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueues `frame` without waiting.
    ///
    /// Fails with `Backpressure` when the queue is full and with
    /// `ConnectionClosed` once the connection is closing or gone.
    pub fn try_send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::Backpressure(self.id)
            }
            mpsc::error::TrySendError::Closed(_) => {
                TransportError::ConnectionClosed(self.id)
            }
        })
    }

    /// Asks the connection to close with `reason`.
    ///
    /// Only the first reason is kept; later calls are no-ops. Returns
    /// `true` if this call initiated the close.
    pub fn close(&self, reason: impl Into<String>) -> bool {
        let mut reason = Some(reason.into());
        self.close.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = reason.take();
            true
        })
    }

    /// Returns `true` once a close was requested or the writer is gone.
    pub fn is_closed(&self) -> bool {
        self.close.borrow().is_some() || self.tx.is_closed()
    }

    /// The reason given to the first [`close`](Self::close) call, if any.
    pub fn close_reason(&self) -> Option<String> {
        self.close.borrow().clone()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.close.subscribe();
        loop {
            if rx.borrow_and_update().is_some() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Consumer side of an outbound queue.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::Receiver<Frame>,
    close: watch::Receiver<Option<String>>,
    finished: bool,
}

impl OutboundQueue {
    /// Waits for the next thing to write.
    ///
    /// Returns `None` after [`Outgoing::Close`] has been yielded, or when
    /// every sender is gone and the queue is empty. Cancel-safe.
    pub async fn next(&mut self) -> Option<Outgoing> {
        loop {
            if self.finished {
                return None;
            }
            let reason = self.close.borrow_and_update().clone();
            if let Some(reason) = reason {
                return match self.rx.try_recv() {
                    Ok(frame) => Some(Outgoing::Frame(frame)),
                    Err(_) => {
                        self.finished = true;
                        self.rx.close();
                        Some(Outgoing::Close(reason))
                    }
                };
            }
            tokio::select! {
                biased;
                changed = self.close.changed() => {
                    if changed.is_err() {
                        return self.rx.recv().await.map(Outgoing::Frame);
                    }
                }
                frame = self.rx.recv() => return frame.map(Outgoing::Frame),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn binary(b: &'static [u8]) -> Frame {
        Frame::Binary(Bytes::from_static(b))
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (tx, mut queue) = outbound_queue(ConnectionId::new(1), 8);
        tx.try_send(binary(b"a")).unwrap();
        tx.try_send(binary(b"b")).unwrap();

        assert_eq!(queue.next().await, Some(Outgoing::Frame(binary(b"a"))));
        assert_eq!(queue.next().await, Some(Outgoing::Frame(binary(b"b"))));
    }

    #[test]
    fn test_full_queue_reports_backpressure() {
        let id = ConnectionId::new(2);
        let (tx, _queue) = outbound_queue(id, 1);
        tx.try_send(binary(b"a")).unwrap();

        let err = tx.try_send(binary(b"b")).unwrap_err();
        assert!(matches!(err, TransportError::Backpressure(got) if got == id));
    }

    #[tokio::test]
    async fn test_close_drains_then_yields_close_once() {
        let (tx, mut queue) = outbound_queue(ConnectionId::new(3), 8);
        tx.try_send(binary(b"last")).unwrap();
        assert!(tx.close("bye"));
        assert!(!tx.close("again"));

        assert_eq!(
            queue.next().await,
            Some(Outgoing::Frame(binary(b"last")))
        );
        assert_eq!(queue.next().await, Some(Outgoing::Close("bye".into())));
        assert_eq!(queue.next().await, None);
        assert_eq!(tx.close_reason().as_deref(), Some("bye"));
    }

    #[test]
    fn test_send_after_close_fails() {
        let id = ConnectionId::new(4);
        let (tx, _queue) = outbound_queue(id, 8);
        tx.close("done");

        let err = tx.try_send(binary(b"x")).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }

    #[test]
    fn test_send_after_queue_dropped_fails() {
        let (tx, queue) = outbound_queue(ConnectionId::new(5), 8);
        drop(queue);

        assert!(tx.is_closed());
        assert!(matches!(
            tx.try_send(binary(b"x")),
            Err(TransportError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let (tx, _queue) = outbound_queue(ConnectionId::new(6), 8);
        let waiter = tx.clone();
        let handle = tokio::spawn(async move { waiter.closed().await });

        tx.close("shutdown");
        handle.await.unwrap();
    }
}
