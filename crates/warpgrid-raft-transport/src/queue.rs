//! Outbound queue table.
//!
//! One bounded queue per (destination replica, traffic class). Creating a
//! queue and deciding that a worker must be spawned for it happen under
//! one lock, so concurrent senders to a cold destination agree on a
//! single owner. Each slot carries a generation number so a terminating
//! worker only ever removes its own queue, never a successor's.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::types::{RaftMessageRequest, ReplicaDescriptor, TrafficClass};

/// Routing key of an outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub to_replica: ReplicaDescriptor,
    pub class: TrafficClass,
}

impl QueueKey {
    pub fn new(to_replica: ReplicaDescriptor, class: TrafficClass) -> Self {
        Self { to_replica, class }
    }

    pub fn for_request(req: &RaftMessageRequest) -> Self {
        Self::new(req.to_replica, req.traffic_class())
    }
}

/// Receiving half of a queue created by `get_or_create`. Whoever holds
/// it must start the worker.
pub struct NewQueue {
    pub receiver: mpsc::Receiver<RaftMessageRequest>,
    pub generation: u64,
}

struct QueueSlot {
    tx: mpsc::Sender<RaftMessageRequest>,
    generation: u64,
}

#[derive(Default)]
struct Queues {
    slots: HashMap<QueueKey, QueueSlot>,
    next_generation: u64,
}

/// Table of live outbound queues.
pub struct OutboundQueueTable {
    capacity: usize,
    queues: Mutex<Queues>,
}

impl OutboundQueueTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: Mutex::new(Queues::default()),
        }
    }

    /// Sender for `key`, creating the queue if it does not exist.
    ///
    /// The second element is `Some` only for the call that created the
    /// queue.
    pub fn get_or_create(
        &self,
        key: QueueKey,
    ) -> (mpsc::Sender<RaftMessageRequest>, Option<NewQueue>) {
        let mut queues = self.queues.lock().expect("queue table lock");
        if let Some(slot) = queues.slots.get(&key) {
            return (slot.tx.clone(), None);
        }

        let generation = queues.next_generation;
        queues.next_generation += 1;

        let (tx, receiver) = mpsc::channel(self.capacity);
        queues.slots.insert(
            key,
            QueueSlot {
                tx: tx.clone(),
                generation,
            },
        );
        (
            tx,
            Some(NewQueue {
                receiver,
                generation,
            }),
        )
    }

    /// Remove the queue for `key` if it is still the given generation.
    pub fn remove(&self, key: QueueKey, generation: u64) -> bool {
        let mut queues = self.queues.lock().expect("queue table lock");
        match queues.slots.get(&key) {
            Some(slot) if slot.generation == generation => {
                queues.slots.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: QueueKey) -> bool {
        let queues = self.queues.lock().expect("queue table lock");
        queues.slots.contains_key(&key)
    }

    /// Messages currently waiting in the queue for `key`.
    pub fn queued(&self, key: QueueKey) -> Option<usize> {
        let queues = self.queues.lock().expect("queue table lock");
        queues
            .slots
            .get(&key)
            .map(|slot| slot.tx.max_capacity() - slot.tx.capacity())
    }

    pub fn len(&self) -> usize {
        self.queues.lock().expect("queue table lock").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
