//! Typed event delivery.
//!
//! Requests and responses report progress through an [`Emitter`], an explicit list of subscribers
//! for a single event type. Listeners are plain closures; alternatively, [`Emitter::stream`]
//! exposes the same events as a [`Stream`](futures_core::Stream).

use crate::error::Error;
use crate::response::Response;
use crate::transport::AuthInfo;
use futures_core::Stream;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

/// An event delivered to the subscribers of a [`Request`](crate::Request).
#[derive(Clone, Debug)]
pub enum RequestEvent {
	/// The response head arrived.
	///
	/// This event is delivered at most once per request.
	Response(Response),

	/// The server or a proxy demands authentication.
	///
	/// The application answers with [`Request::pass_login_info`](crate::Request::pass_login_info).
	Login(AuthInfo),

	/// The exchange failed, or a write was attempted after the request finished.
	Error(Error),

	/// The request was cancelled.
	Abort,

	/// The request body has been fully handed to the network.
	Finish,

	/// The exchange is over; no further events will be delivered.
	Close,
}

/// An event delivered to the subscribers of a [`Response`].
#[derive(Clone, Debug)]
pub enum ResponseEvent {
	/// A piece of the response body.
	Data(Rc<[u8]>),

	/// The response body is complete.
	End,

	/// The request was cancelled while the response body was being received.
	Aborted,

	/// Receiving the response body failed.
	Error(Error),
}

/// Identifies a subscription so that it can be removed with [`Emitter::off`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ListenerId(u64);

/// A subscribed callback.
type Callback<E> = Rc<RefCell<dyn FnMut(&E)>>;

/// One subscription.
struct Entry<E> {
	id: ListenerId,
	once: bool,
	callback: Callback<E>,
}

/// The subscriber list behind an [`Emitter`].
struct Listeners<E> {
	next_id: u64,
	entries: Vec<Entry<E>>,

	/// Whether [`Emitter::close`] has been called.
	closed: bool,
}

/// A list of subscribers for events of type `E`.
///
/// `Emitter` is a cheap handle; clones share the same subscriber list.
///
/// Listeners may subscribe or unsubscribe (on the same emitter or any other) while an event is
/// being delivered. Such changes take effect from the next [`emit`](Emitter::emit); the delivery
/// in progress still goes to exactly the listeners subscribed when it started.
pub struct Emitter<E> {
	inner: Rc<RefCell<Listeners<E>>>,
}

impl<E: 'static> Emitter<E> {
	/// Constructs an emitter with no subscribers.
	pub fn new() -> Self {
		Self {
			inner: Rc::new(RefCell::new(Listeners {
				next_id: 0,
				entries: Vec::new(),
				closed: false,
			})),
		}
	}

	fn subscribe(&self, once: bool, callback: Callback<E>) -> ListenerId {
		let mut inner = self.inner.borrow_mut();
		let id = ListenerId(inner.next_id);
		inner.next_id += 1;
		if inner.closed {
			drop(inner);
			// The callback’s destructor may touch this emitter.
			drop(callback);
		} else {
			inner.entries.push(Entry { id, once, callback });
		}
		id
	}

	/// Subscribes a listener to every subsequent event.
	///
	/// On a closed emitter the listener is dropped straight away.
	pub fn on(&self, listener: impl FnMut(&E) + 'static) -> ListenerId {
		self.subscribe(false, Rc::new(RefCell::new(listener)))
	}

	/// Subscribes a listener to the next event only.
	pub fn once(&self, listener: impl FnOnce(&E) + 'static) -> ListenerId {
		let mut listener = Some(listener);
		self.subscribe(
			true,
			Rc::new(RefCell::new(move |event: &E| {
				if let Some(listener) = listener.take() {
					listener(event);
				}
			})),
		)
	}

	/// Removes a subscription.
	///
	/// Returns `false` if the listener was not subscribed (for example because it was a one-shot
	/// listener that has already fired).
	pub fn off(&self, id: ListenerId) -> bool {
		let mut inner = self.inner.borrow_mut();
		let before = inner.entries.len();
		inner.entries.retain(|entry| entry.id != id);
		inner.entries.len() != before
	}

	/// Removes every subscription.
	///
	/// Any [`EventStream`] obtained from this emitter ends once its queued events are consumed.
	pub fn clear(&self) {
		let entries = std::mem::take(&mut self.inner.borrow_mut().entries);
		// Listener destructors may touch this emitter, so drop them after the borrow ends.
		drop(entries);
	}

	/// Removes every subscription and refuses new ones.
	///
	/// Used once no further events can occur. Listeners subscribed afterwards are dropped
	/// without being stored, and streams obtained afterwards end immediately.
	pub fn close(&self) {
		self.inner.borrow_mut().closed = true;
		self.clear();
	}

	/// Returns whether [`close`](Emitter::close) has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.borrow().closed
	}

	/// Returns the number of current subscriptions.
	pub fn listener_count(&self) -> usize {
		self.inner.borrow().entries.len()
	}

	/// Delivers an event to every current subscriber, in subscription order.
	///
	/// Returns the number of listeners the event was delivered to.
	pub fn emit(&self, event: &E) -> usize {
		let callbacks: Vec<Callback<E>> = {
			let mut inner = self.inner.borrow_mut();
			let callbacks = inner
				.entries
				.iter()
				.map(|entry| Rc::clone(&entry.callback))
				.collect();
			inner.entries.retain(|entry| !entry.once);
			callbacks
		};
		let mut delivered = 0;
		for callback in callbacks {
			match callback.try_borrow_mut() {
				Ok(mut callback) => {
					(&mut *callback)(event);
					delivered += 1;
				}
				Err(_) => tracing::warn!("listener re-entered by its own event; skipped"),
			}
		}
		delivered
	}
}

impl<E: Clone + 'static> Emitter<E> {
	/// Returns a stream of every subsequent event.
	///
	/// The stream buffers events until they are polled. It ends when the emitter is cleared,
	/// closed or dropped; a stream taken from a closed emitter is already over.
	pub fn stream(&self) -> EventStream<E> {
		let state = Rc::new(RefCell::new(StreamState {
			queue: VecDeque::new(),
			waker: None,
			closed: self.is_closed(),
		}));
		let feed = Feed {
			state: Rc::downgrade(&state),
		};
		let _ = self.on(move |event: &E| feed.push(event.clone()));
		EventStream { state }
	}
}

impl<E: 'static> Default for Emitter<E> {
	fn default() -> Self {
		Self::new()
	}
}

impl<E> Clone for Emitter<E> {
	fn clone(&self) -> Self {
		Self {
			inner: Rc::clone(&self.inner),
		}
	}
}

impl<E> Debug for Emitter<E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		let inner = self.inner.borrow();
		f.debug_struct("Emitter")
			.field("listeners", &inner.entries.len())
			.field("closed", &inner.closed)
			.finish()
	}
}

/// Buffered events not yet taken from an [`EventStream`].
struct StreamState<E> {
	queue: VecDeque<E>,
	waker: Option<Waker>,
	closed: bool,
}

/// The emitter-side half of an [`EventStream`].
///
/// Dropping it (which happens when the emitter drops the owning listener) ends the stream.
struct Feed<E> {
	state: Weak<RefCell<StreamState<E>>>,
}

impl<E> Feed<E> {
	fn push(&self, event: E) {
		if let Some(state) = self.state.upgrade() {
			let mut state = state.borrow_mut();
			state.queue.push_back(event);
			if let Some(waker) = state.waker.take() {
				waker.wake();
			}
		}
	}
}

impl<E> Drop for Feed<E> {
	fn drop(&mut self) {
		if let Some(state) = self.state.upgrade() {
			let mut state = state.borrow_mut();
			state.closed = true;
			if let Some(waker) = state.waker.take() {
				waker.wake();
			}
		}
	}
}

/// A stream of events from an [`Emitter`].
pub struct EventStream<E> {
	state: Rc<RefCell<StreamState<E>>>,
}

impl<E> EventStream<E> {
	/// Takes the next buffered event without waiting.
	pub fn try_next(&mut self) -> Option<E> {
		self.state.borrow_mut().queue.pop_front()
	}
}

impl<E> Stream for EventStream<E> {
	type Item = E;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
		let mut state = self.state.borrow_mut();
		if let Some(event) = state.queue.pop_front() {
			Poll::Ready(Some(event))
		} else if state.closed {
			Poll::Ready(None)
		} else {
			state.waker = Some(cx.waker().clone());
			Poll::Pending
		}
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let state = self.state.borrow();
		let buffered = state.queue.len();
		(buffered, if state.closed { Some(buffered) } else { None })
	}
}

impl<E> Debug for EventStream<E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		let state = self.state.borrow();
		f.debug_struct("EventStream")
			.field("buffered", &state.queue.len())
			.field("closed", &state.closed)
			.finish()
	}
}
