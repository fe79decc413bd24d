//! A single wheel slot: an arena-backed doubly-linked list of timers plus
//! an id -> node index, giving O(1) insert, O(1) remove-by-id, and
//! insertion-ordered traversal during a sweep.

use super::Task;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

struct Node {
    timer_id: u64,
    rounds: u64,
    task: Option<Task>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default)]
pub(crate) struct Bucket {
    arena: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<u64, usize>,
}

impl Bucket {
    pub fn insert(&mut self, timer_id: u64, _deadline: DateTime<Utc>, rounds: u64, task: Task) {
        let node = Node {
            timer_id,
            rounds,
            task: Some(task),
            prev: self.tail,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.arena[slot] = Some(node);
                slot
            }
            None => {
                self.arena.push(Some(node));
                self.arena.len() - 1
            }
        };
        if let Some(tail) = self.tail {
            self.arena[tail].as_mut().expect("tail must be occupied").next = Some(slot);
        } else {
            self.head = Some(slot);
        }
        self.tail = Some(slot);
        self.index.insert(timer_id, slot);
    }

    /// Removes a timer by id, wherever it sits in the list. Returns its
    /// task if it was live.
    pub fn remove(&mut self, timer_id: u64) -> Option<Task> {
        let slot = self.index.remove(&timer_id)?;
        self.unlink(slot);
        let node = self.arena[slot].take().expect("indexed slot must be occupied");
        self.free.push(slot);
        node.task
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.arena[slot].as_ref().expect("unlink of empty slot");
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.arena[p].as_mut().expect("prev must be occupied").next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.arena[n].as_mut().expect("next must be occupied").prev = prev,
            None => self.tail = prev,
        }
    }

    /// Walks the list once, in insertion order. Timers with `rounds > 0`
    /// are decremented and stay; timers with `rounds == 0` are unlinked and
    /// returned for firing.
    pub fn sweep_due(&mut self) -> Vec<(u64, Task)> {
        let mut due = Vec::new();
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let next = self.arena[slot].as_ref().expect("cursor must be occupied").next;
            let fire = {
                let node = self.arena[slot].as_mut().expect("cursor must be occupied");
                if node.rounds > 0 {
                    node.rounds -= 1;
                    false
                } else {
                    true
                }
            };
            if fire {
                let timer_id = self.arena[slot]
                    .as_ref()
                    .expect("cursor must be occupied")
                    .timer_id;
                self.index.remove(&timer_id);
                self.unlink(slot);
                let node = self.arena[slot].take().expect("just unlinked node");
                self.free.push(slot);
                due.push((timer_id, node.task.expect("node always carries a task")));
            }
            cursor = next;
        }
        due
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.index.len()
    }
}
