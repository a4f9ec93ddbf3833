//! Virtual time, the weighted task queue, and the timer queue.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

/// Virtual time in microseconds. The scheduler advances it to the
/// next timer deadline when no task is ready.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_usec(us: u64) -> Timestamp {
        Timestamp(us)
    }

    pub fn from_msec(ms: u64) -> Timestamp {
        Timestamp(ms * 1000)
    }

    pub fn from_sec(s: u64) -> Timestamp {
        Timestamp(s * 1_000_000)
    }

    pub fn as_usec(self) -> u64 {
        self.0
    }

    pub fn as_msec(self) -> u64 {
        self.0 / 1000
    }

    pub fn after_msec(self, ms: u64) -> Timestamp {
        Timestamp(self.0 + ms * 1000)
    }

    pub fn after_usec(self, us: u64) -> Timestamp {
        Timestamp(self.0 + us)
    }

    pub fn since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

/// Default ticket count for newly registered tasks.
pub const DEFAULT_TICKETS: u32 = 128;

/// Stride-scheduling constant: pass increases by `STRIDE1 / tickets`
/// per quantum, so higher tickets mean more frequent selection.
const STRIDE1: u64 = 1 << 17;

const MAX_TICKETS: u32 = 1 << 15;

#[derive(Clone, Debug)]
struct TaskState {
    tickets: u32,
    pass: u64,
    scheduled: bool,
}

/// One cooperative task per element, selected by minimum pass value
/// (weighted round-robin).
#[derive(Default)]
pub struct TaskQueue {
    tasks: Vec<Option<TaskState>>,
}

impl TaskQueue {
    pub fn new(nelements: usize) -> Self {
        Self {
            tasks: vec![None; nelements],
        }
    }

    /// Register (or re-register) the element's task, initially
    /// scheduled.
    pub fn register(&mut self, eid: usize, tickets: u32) {
        let tickets = tickets.clamp(1, MAX_TICKETS);
        let base_pass = self.min_pass().unwrap_or(0);
        self.tasks[eid] = Some(TaskState {
            tickets,
            pass: base_pass,
            scheduled: true,
        });
    }

    pub fn set_tickets(&mut self, eid: usize, tickets: u32) {
        if let Some(t) = self.tasks[eid].as_mut() {
            t.tickets = tickets.clamp(1, MAX_TICKETS);
        }
    }

    pub fn reschedule(&mut self, eid: usize) {
        if let Some(t) = self.tasks[eid].as_mut() {
            t.scheduled = true;
        }
    }

    pub fn unschedule(&mut self, eid: usize) {
        if let Some(t) = self.tasks[eid].as_mut() {
            t.scheduled = false;
        }
    }

    pub fn unschedule_all(&mut self) {
        for t in self.tasks.iter_mut().flatten() {
            t.scheduled = false;
        }
    }

    pub fn is_scheduled(&self, eid: usize) -> bool {
        self.tasks[eid].as_ref().is_some_and(|t| t.scheduled)
    }

    pub fn any_scheduled(&self) -> bool {
        self.tasks.iter().flatten().any(|t| t.scheduled)
    }

    fn min_pass(&self) -> Option<u64> {
        self.tasks
            .iter()
            .flatten()
            .filter(|t| t.scheduled)
            .map(|t| t.pass)
            .min()
    }

    /// Pick the scheduled task with the smallest pass, mark it
    /// unscheduled for this quantum, and charge its stride. The task
    /// must call `reschedule` to run again.
    pub fn begin_quantum(&mut self) -> Option<usize> {
        let eid = self
            .tasks
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().filter(|t| t.scheduled).map(|t| (i, t.pass)))
            .min_by_key(|&(_, pass)| pass)
            .map(|(i, _)| i)?;
        let t = self.tasks[eid].as_mut().unwrap();
        t.scheduled = false;
        t.pass += STRIDE1 / u64::from(t.tickets);
        Some(eid)
    }
}

/// Timers ordered by deadline; insertion order breaks ties.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(Timestamp, u64, usize)>>,
    seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, deadline: Timestamp, eid: usize) {
        self.heap.push(Reverse((deadline, self.seq, eid)));
        self.seq += 1;
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.heap.peek().map(|Reverse((d, _, _))| *d)
    }

    /// Pop the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<usize> {
        match self.heap.peek() {
            Some(Reverse((d, _, _))) if *d <= now => {
                let Reverse((_, _, eid)) = self.heap.pop().unwrap();
                Some(eid)
            }
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_weighting() {
        let mut q = TaskQueue::new(2);
        q.register(0, 256);
        q.register(1, 128);
        let mut runs = [0usize; 2];
        for _ in 0..300 {
            let eid = q.begin_quantum().unwrap();
            runs[eid] += 1;
            q.reschedule(eid);
        }
        // double tickets get roughly double the quanta
        assert!(runs[0] > runs[1] + 50, "runs: {runs:?}");
    }

    #[test]
    fn test_unscheduled_not_picked() {
        let mut q = TaskQueue::new(1);
        q.register(0, 128);
        assert_eq!(q.begin_quantum(), Some(0));
        // not rescheduled: queue is idle
        assert_eq!(q.begin_quantum(), None);
        assert!(!q.any_scheduled());
    }

    #[test]
    fn test_timer_ordering() {
        let mut q = TimerQueue::new();
        q.schedule_at(Timestamp::from_msec(20), 2);
        q.schedule_at(Timestamp::from_msec(10), 1);
        q.schedule_at(Timestamp::from_msec(10), 3);

        let now = Timestamp::from_msec(30);
        assert_eq!(q.pop_due(now), Some(1));
        // same deadline fires in insertion order
        assert_eq!(q.pop_due(now), Some(3));
        assert_eq!(q.pop_due(now), Some(2));
        assert_eq!(q.pop_due(now), None);
    }

    #[test]
    fn test_timer_not_due() {
        let mut q = TimerQueue::new();
        q.schedule_at(Timestamp::from_msec(50), 0);
        assert_eq!(q.pop_due(Timestamp::from_msec(10)), None);
        assert_eq!(q.next_deadline(), Some(Timestamp::from_msec(50)));
    }
}
