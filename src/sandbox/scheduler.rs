use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::dom::NodeId;

const MAX_TASKS_PER_BURST: usize = 1000;

type Task = Box<dyn FnOnce()>;

/// Tasks deferred to the end of the current synchronous burst.
#[derive(Default)]
pub struct MicrotaskQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, task: impl FnOnce() + 'static) {
        self.tasks.borrow_mut().push_back(Box::new(task));
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Runs queued tasks, including ones queued while draining. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut executed = 0;
        loop {
            let Some(task) = self.tasks.borrow_mut().pop_front() else {
                break;
            };
            task();
            executed += 1;
            if executed >= MAX_TASKS_PER_BURST {
                tracing::warn!(
                    target: "sandbox",
                    "Stopped draining microtasks after {} tasks (possible feedback loop)",
                    MAX_TASKS_PER_BURST
                );
                break;
            }
        }
        executed
    }
}

/// Coalesces parent-pointer corrections: however many reads happen in one burst, at most one
/// correction is pending and it runs when the burst ends.
pub struct ParentPointerScheduler {
    queue: Rc<MicrotaskQueue>,
    pending: Rc<Cell<bool>>,
    overrides: Rc<RefCell<HashMap<NodeId, NodeId>>>,
    applied: Rc<Cell<usize>>,
}

impl ParentPointerScheduler {
    pub fn new(queue: Rc<MicrotaskQueue>) -> Self {
        Self {
            queue,
            pending: Rc::new(Cell::new(false)),
            overrides: Rc::new(RefCell::new(HashMap::new())),
            applied: Rc::new(Cell::new(0)),
        }
    }

    /// Asks for `root_element` to report `isolated_document` as its parent once the burst ends.
    /// Returns false when a correction is already pending.
    pub fn schedule_correction(&self, root_element: NodeId, isolated_document: NodeId) -> bool {
        if self.pending.replace(true) {
            return false;
        }

        let pending = Rc::clone(&self.pending);
        let overrides = Rc::clone(&self.overrides);
        let applied = Rc::clone(&self.applied);
        self.queue.queue(move || {
            pending.set(false);
            overrides
                .borrow_mut()
                .insert(root_element, isolated_document);
            applied.set(applied.get() + 1);
            tracing::trace!(
                target: "sandbox",
                root_element,
                isolated_document,
                "parent pointer corrected"
            );
        });
        true
    }

    pub fn parent_override(&self, node: NodeId) -> Option<NodeId> {
        self.overrides.borrow().get(&node).copied()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    pub fn corrections_applied(&self) -> usize {
        self.applied.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_runs_tasks_in_order_including_nested() {
        let queue = Rc::new(MicrotaskQueue::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let nested_queue = Rc::clone(&queue);
        let nested_log = Rc::clone(&log);
        let first_log = Rc::clone(&log);
        queue.queue(move || {
            first_log.borrow_mut().push(1);
            nested_queue.queue(move || nested_log.borrow_mut().push(3));
        });
        let second_log = Rc::clone(&log);
        queue.queue(move || second_log.borrow_mut().push(2));

        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn repeated_requests_coalesce_into_one_correction() {
        let queue = Rc::new(MicrotaskQueue::new());
        let scheduler = ParentPointerScheduler::new(Rc::clone(&queue));

        assert!(scheduler.schedule_correction(1, 100));
        for _ in 0..10 {
            assert!(!scheduler.schedule_correction(1, 100));
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(scheduler.parent_override(1), None);

        queue.run_until_idle();
        assert_eq!(scheduler.corrections_applied(), 1);
        assert_eq!(scheduler.parent_override(1), Some(100));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn a_new_burst_can_schedule_again() {
        let queue = Rc::new(MicrotaskQueue::new());
        let scheduler = ParentPointerScheduler::new(Rc::clone(&queue));

        scheduler.schedule_correction(1, 100);
        queue.run_until_idle();
        assert!(scheduler.schedule_correction(1, 100));
        queue.run_until_idle();
        assert_eq!(scheduler.corrections_applied(), 2);
    }
}
