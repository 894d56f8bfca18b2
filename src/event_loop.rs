use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// A deferred unit of work.
type Task = Box<dyn FnOnce()>;

/// A single-threaded FIFO queue of deferred tasks.
///
/// Request write callbacks, asynchronous error reports, and transport events requested with
/// [`Delivery::Deferred`](crate::Delivery::Deferred) are all queued here instead of running
/// inline. The application (or the host runtime) runs the queue on its own schedule, typically by
/// calling [`run_until_idle`](EventLoop::run_until_idle) once per turn of its main loop.
///
/// `EventLoop` is a cheap handle; clones share the same queue. Tasks run in exactly the order they
/// were deferred, and a task is never run from within the call that deferred it.
#[derive(Clone, Default)]
pub struct EventLoop {
	queue: Rc<RefCell<VecDeque<Task>>>,
}

impl EventLoop {
	/// Constructs a new, empty event loop.
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues a task to run on a later turn.
	pub fn defer(&self, task: impl FnOnce() + 'static) {
		self.queue.borrow_mut().push_back(Box::new(task));
	}

	/// Returns the number of tasks waiting to run.
	pub fn pending(&self) -> usize {
		self.queue.borrow().len()
	}

	/// Returns whether no tasks are waiting to run.
	pub fn is_idle(&self) -> bool {
		self.queue.borrow().is_empty()
	}

	/// Runs the oldest queued task, if any.
	///
	/// Returns `true` if a task was run.
	pub fn turn(&self) -> bool {
		// The queue must not stay borrowed while the task runs, because the task may defer more
		// work.
		let task = self.queue.borrow_mut().pop_front();
		match task {
			Some(task) => {
				task();
				true
			}
			None => false,
		}
	}

	/// Runs tasks until the queue is empty, including any tasks deferred along the way.
	///
	/// Returns the number of tasks run.
	pub fn run_until_idle(&self) -> usize {
		let mut count = 0;
		while self.turn() {
			count += 1;
		}
		if count != 0 {
			tracing::trace!(tasks = count, "event loop idle");
		}
		count
	}
}

impl Debug for EventLoop {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		f.debug_struct("EventLoop")
			.field("pending", &self.pending())
			.finish()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	/// Tests that tasks run in submission order, and never inline.
	#[test]
	fn test_fifo() {
		let lp = EventLoop::new();
		let log = Rc::new(RefCell::new(Vec::new()));
		for i in 0..3 {
			let log = Rc::clone(&log);
			lp.defer(move || log.borrow_mut().push(i));
		}
		assert!(log.borrow().is_empty());
		assert_eq!(lp.pending(), 3);
		assert_eq!(lp.run_until_idle(), 3);
		assert_eq!(*log.borrow(), [0, 1, 2]);
		assert!(lp.is_idle());
	}

	/// Tests that a task deferring another task runs it after everything already queued.
	#[test]
	fn test_nested_defer() {
		let lp = EventLoop::new();
		let log = Rc::new(RefCell::new(Vec::new()));
		{
			let log = Rc::clone(&log);
			let inner_lp = lp.clone();
			lp.defer(move || {
				log.borrow_mut().push("outer");
				let log = Rc::clone(&log);
				inner_lp.defer(move || log.borrow_mut().push("nested"));
			});
		}
		{
			let log = Rc::clone(&log);
			lp.defer(move || log.borrow_mut().push("second"));
		}
		assert!(lp.turn());
		assert_eq!(*log.borrow(), ["outer"]);
		assert_eq!(lp.run_until_idle(), 2);
		assert_eq!(*log.borrow(), ["outer", "second", "nested"]);
		assert!(!lp.turn());
	}
}
