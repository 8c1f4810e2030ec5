//! Per-session backlog and fan-out
//!
//! The hub keeps a bounded backlog of published frames and one bounded
//! queue per subscriber. Publishing never waits on a subscriber: a full
//! queue disconnects that subscriber. The owning session serializes every
//! call, so a subscription's backlog snapshot and its live queue
//! registration happen atomically with respect to publishing.

use provlane_types::EventError;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// One published event as delivered to clients
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position in the session's stream, starting at 0
    pub seq: u64,
    pub event_type: String,
    pub data: Arc<Value>,
}

struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<Frame>,
    overloaded: Arc<AtomicBool>,
}

/// What a new subscriber receives: the backlog, then the live queue
#[derive(Debug)]
pub struct Subscription {
    pub client_id: Uuid,
    /// Present when older frames were evicted before this subscription
    pub truncated: Option<EventError>,
    pub backlog: Vec<Frame>,
    pub receiver: mpsc::Receiver<Frame>,
    overloaded: Arc<AtomicBool>,
}

impl Subscription {
    /// True once the hub disconnected this client for falling behind
    pub fn is_overloaded(&self) -> bool {
        self.overloaded.load(Ordering::Acquire)
    }
}

/// Outcome of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub seq: u64,
    pub delivered: usize,
    pub disconnected: usize,
}

pub struct Hub {
    session_id: String,
    backlog: VecDeque<Frame>,
    backlog_capacity: usize,
    evicted: u64,
    next_seq: u64,
    client_queue_capacity: usize,
    subscribers: Vec<Subscriber>,
    closed: bool,
}

impl Hub {
    pub fn new(
        session_id: impl Into<String>,
        backlog_capacity: usize,
        client_queue_capacity: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            backlog: VecDeque::new(),
            backlog_capacity,
            evicted: 0,
            next_seq: 0,
            client_queue_capacity: client_queue_capacity.max(1),
            subscribers: Vec::new(),
            closed: false,
        }
    }

    /// Append to the backlog and offer the frame to every live subscriber
    pub fn publish(&mut self, event_type: impl Into<String>, data: Value) -> PublishReport {
        let frame = Frame {
            seq: self.next_seq,
            event_type: event_type.into(),
            data: Arc::new(data),
        };
        self.next_seq += 1;

        self.backlog.push_back(frame.clone());
        while self.backlog.len() > self.backlog_capacity {
            self.backlog.pop_front();
            self.evicted += 1;
        }

        let mut report = PublishReport {
            seq: frame.seq,
            ..PublishReport::default()
        };
        let session_id = &self.session_id;
        let capacity = self.client_queue_capacity;
        self.subscribers
            .retain(|subscriber| match subscriber.tx.try_send(frame.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    subscriber.overloaded.store(true, Ordering::Release);
                    let error = EventError::ClientOverloaded {
                        client_id: subscriber.id.to_string(),
                        capacity,
                    };
                    warn!(session_id = %session_id, error = %error, "Disconnecting slow client");
                    report.disconnected += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session_id = %session_id, client_id = %subscriber.id, "Client went away");
                    false
                }
            });
        report
    }

    /// Snapshot the backlog and register a live queue in one step.
    /// A closed hub hands out an already-finished queue.
    pub fn subscribe(&mut self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.client_queue_capacity);
        let client_id = Uuid::new_v4();
        let overloaded = Arc::new(AtomicBool::new(false));
        let truncated = (self.evicted > 0).then_some(EventError::BacklogTruncated {
            dropped: self.evicted,
        });

        if self.closed {
            drop(tx);
        } else {
            self.subscribers.push(Subscriber {
                id: client_id,
                tx,
                overloaded: overloaded.clone(),
            });
        }
        debug!(
            session_id = %self.session_id,
            client_id = %client_id,
            backlog = self.backlog.len(),
            evicted = self.evicted,
            "Client subscribed"
        );

        Subscription {
            client_id,
            truncated,
            backlog: self.backlog.iter().cloned().collect(),
            receiver,
            overloaded,
        }
    }

    /// Stop live delivery; queued frames still drain to their clients
    pub fn close(&mut self) {
        self.closed = true;
        self.subscribers.clear();
    }

    /// Drop subscribers whose receiving side has gone away
    pub fn prune_disconnected(&mut self) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| !subscriber.tx.is_closed());
        before - self.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(subscription: &mut Subscription) -> Vec<u64> {
        let mut seqs = Vec::new();
        while let Ok(frame) = subscription.receiver.try_recv() {
            seqs.push(frame.seq);
        }
        seqs
    }

    #[test]
    fn test_backlog_then_live_without_gap() {
        let mut hub = Hub::new("s", 100, 16);
        hub.publish("task_start", json!({"type": "task_start"}));
        hub.publish("action", json!({"type": "action"}));

        let mut subscription = hub.subscribe();
        hub.publish("action", json!({"type": "action"}));

        let backlog: Vec<u64> = subscription.backlog.iter().map(|f| f.seq).collect();
        assert_eq!(backlog, vec![0, 1]);
        assert_eq!(drain(&mut subscription), vec![2]);
        assert!(subscription.truncated.is_none());
    }

    #[test]
    fn test_eviction_marks_truncation() {
        let mut hub = Hub::new("s", 2, 16);
        for _ in 0..5 {
            hub.publish("action", json!({}));
        }
        let subscription = hub.subscribe();
        assert_eq!(
            subscription.truncated,
            Some(EventError::BacklogTruncated { dropped: 3 })
        );
        let backlog: Vec<u64> = subscription.backlog.iter().map(|f| f.seq).collect();
        assert_eq!(backlog, vec![3, 4]);
    }

    #[test]
    fn test_full_queue_disconnects_only_that_client() {
        let mut hub = Hub::new("s", 100, 2);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for round in 0..4 {
            let report = hub.publish("action", json!({"round": round}));
            if round < 2 {
                assert_eq!(report.delivered, 2);
            }
            assert_eq!(drain(&mut fast).len(), 1);
        }

        assert!(slow.is_overloaded());
        assert!(!fast.is_overloaded());
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(drain(&mut slow), vec![0, 1]);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let mut hub = Hub::new("s", 100, 4);
        let subscription = hub.subscribe();
        drop(subscription);
        assert_eq!(hub.prune_disconnected(), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_hub_serves_backlog_and_ends() {
        let mut hub = Hub::new("s", 100, 4);
        hub.publish("task_start", json!({}));
        hub.publish("session_end", json!({}));
        hub.close();

        let mut late = hub.subscribe();
        assert_eq!(late.backlog.len(), 2);
        assert!(late.receiver.recv().await.is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
