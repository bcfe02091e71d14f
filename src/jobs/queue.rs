//! Priority queue with global and per-owner admission control.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use uuid::Uuid;

use crate::jobs::models::ScheduledJob;

struct Entry {
    weight: u8,
    seq: u64,
    job: ScheduledJob,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap: lowest weight, then lowest seq, must compare greatest
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .weight
            .cmp(&self.weight)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Admission control over due jobs.
///
/// Ordering is priority weight first, then insertion order. `dequeue` only
/// ever looks at the head: if the head's owner is saturated nothing is
/// returned this cycle.
pub struct ConcurrencyQueue {
    heap: BinaryHeap<Entry>,
    queued: HashSet<Uuid>,
    running: HashMap<Uuid, String>,
    owner_running: HashMap<String, usize>,
    max_global: usize,
    max_per_owner: usize,
    next_seq: u64,
}

impl ConcurrencyQueue {
    pub fn new(max_global: usize, max_per_owner: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            queued: HashSet::new(),
            running: HashMap::new(),
            owner_running: HashMap::new(),
            max_global,
            max_per_owner,
            next_seq: 0,
        }
    }

    /// Returns false if the job is already queued or running
    pub fn enqueue(&mut self, job: ScheduledJob) -> bool {
        if self.queued.contains(&job.id) || self.running.contains_key(&job.id) {
            return false;
        }
        self.queued.insert(job.id);
        self.heap.push(Entry {
            weight: job.priority.weight(),
            seq: self.next_seq,
            job,
        });
        self.next_seq += 1;
        true
    }

    /// Pops the head if both the global and the owner's cap allow it
    pub fn dequeue(&mut self) -> Option<ScheduledJob> {
        if self.running.len() >= self.max_global {
            return None;
        }

        let head = self.heap.peek()?;
        if self.owner_running(&head.job.owner_id) >= self.max_per_owner {
            return None;
        }

        let entry = self.heap.pop()?;
        self.queued.remove(&entry.job.id);
        self.running.insert(entry.job.id, entry.job.owner_id.clone());
        *self
            .owner_running
            .entry(entry.job.owner_id.clone())
            .or_insert(0) += 1;
        Some(entry.job)
    }

    /// Releases the job's slot; false if it was not running
    pub fn complete(&mut self, job_id: Uuid) -> bool {
        let Some(owner) = self.running.remove(&job_id) else {
            return false;
        };
        if let Some(count) = self.owner_running.get_mut(&owner) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.owner_running.remove(&owner);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn owner_running(&self, owner_id: &str) -> usize {
        self.owner_running.get(owner_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::Priority;
    use crate::repositories::job_at;

    fn job(priority: Priority, owner: &str) -> ScheduledJob {
        let mut job = job_at(None, priority);
        job.owner_id = owner.to_string();
        job
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = ConcurrencyQueue::new(10, 10);
        let low = job(Priority::Low, "a");
        let normal_1 = job(Priority::Normal, "a");
        let urgent = job(Priority::Urgent, "a");
        let normal_2 = job(Priority::Normal, "a");
        let high = job(Priority::High, "a");
        for j in [&low, &normal_1, &urgent, &normal_2, &high] {
            assert!(queue.enqueue(j.clone()));
        }

        let order: Vec<Uuid> = std::iter::from_fn(|| queue.dequeue()).map(|j| j.id).collect();
        assert_eq!(order, vec![urgent.id, high.id, normal_1.id, normal_2.id, low.id]);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut queue = ConcurrencyQueue::new(10, 10);
        let j = job(Priority::Normal, "a");
        assert!(queue.enqueue(j.clone()));
        assert!(!queue.enqueue(j.clone()));
        assert_eq!(queue.len(), 1);

        queue.dequeue().unwrap();
        assert!(!queue.enqueue(j.clone()), "running job must not be queued again");
        assert!(queue.complete(j.id));
        assert!(queue.enqueue(j));
    }

    #[test]
    fn test_global_cap_blocks_until_complete() {
        let mut queue = ConcurrencyQueue::new(2, 10);
        let jobs: Vec<ScheduledJob> = (0..3).map(|_| job(Priority::Normal, "a")).collect();
        for j in &jobs {
            queue.enqueue(j.clone());
        }

        let first = queue.dequeue().unwrap();
        queue.dequeue().unwrap();
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.running_count(), 2);

        assert!(queue.complete(first.id));
        assert_eq!(queue.dequeue().unwrap().id, jobs[2].id);
    }

    #[test]
    fn test_owner_cap_leaves_item_queued() {
        let mut queue = ConcurrencyQueue::new(10, 1);
        let a1 = job(Priority::Normal, "alice");
        let a2 = job(Priority::Normal, "alice");
        let b1 = job(Priority::Normal, "bob");
        queue.enqueue(a1.clone());
        queue.enqueue(a2.clone());
        queue.enqueue(b1.clone());

        assert_eq!(queue.dequeue().unwrap().id, a1.id);
        // head is alice's second job; it stays queued and blocks the cycle
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.owner_running("alice"), 1);

        queue.complete(a1.id);
        assert_eq!(queue.owner_running("alice"), 0);
        assert_eq!(queue.dequeue().unwrap().id, a2.id);
        assert_eq!(queue.dequeue().unwrap().id, b1.id);
    }

    #[test]
    fn test_complete_unknown_is_false() {
        let mut queue = ConcurrencyQueue::new(1, 1);
        assert!(!queue.complete(Uuid::new_v4()));
        assert!(queue.is_empty());
    }
}
