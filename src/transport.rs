//! The boundary between the request pipeline and the component that performs network I/O.

use crate::error::Error;
use crate::event_loop::EventLoop;
use crate::request::{dispatch, Shared};
use crate::response::ResponseHead;
use std::cell::OnceCell;
use std::rc::{Rc, Weak};

/// The parameters a [`Transport`] is created with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportConfig {
	/// The request method, already upper-cased.
	pub method: String,

	/// The absolute URL to request.
	pub url: String,

	/// The name of the network session to use; the empty string selects the default session.
	pub session: String,
}

/// An authentication challenge reported by a transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthInfo {
	/// Whether the challenge comes from a proxy rather than the origin server.
	pub is_proxy: bool,

	/// The authentication scheme, such as `basic` or `digest`.
	pub scheme: String,

	/// The host issuing the challenge.
	pub host: String,

	/// The port of the host issuing the challenge.
	pub port: u16,

	/// The protection realm.
	pub realm: String,
}

/// Credentials supplied in answer to an [`AuthInfo`] challenge.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
	/// The user name.
	pub username: String,

	/// The password.
	pub password: String,
}

impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.finish_non_exhaustive()
	}
}

/// Something that performs the network I/O for exactly one request.
///
/// A transport is created by a [`Connector`](crate::Connector) and is owned exclusively by its
/// [`Request`](crate::Request). It reports progress back through the [`EventSink`] it was created
/// with, which only weakly refers to the request.
///
/// All methods are called from the single thread that owns the request. A transport must not
/// assume that a call to `write` is followed by any particular other call; in particular,
/// [`set_chunked_upload`](Transport::set_chunked_upload) arrives after the first `write`, so a
/// transport that needs the chunked flag to build the request head must finalize the head lazily.
pub trait Transport {
	/// Returns whether the request head has not yet been handed to the network.
	fn not_started(&self) -> bool;

	/// Returns whether the last piece of the request body has been handed to the transport.
	fn finished(&self) -> bool;

	/// Hands a piece of the request body to the transport.
	///
	/// The `is_last` parameter indicates that no more body follows. The return value is a
	/// flow-control signal: `true` if the caller may keep writing, `false` if it should wait.
	fn write(&mut self, buffer: Vec<u8>, is_last: bool) -> bool;

	/// Requests cancellation of the exchange.
	///
	/// This may be called in any state, any number of times. The transport is expected to settle
	/// the request by eventually emitting [`TransportEvent::Close`].
	fn cancel(&mut self);

	/// Adds or replaces a request header.
	fn set_extra_header(&mut self, name: &str, value: &str);

	/// Removes a request header.
	fn remove_extra_header(&mut self, name: &str);

	/// Selects whether the request body is sent using chunked transfer encoding.
	fn set_chunked_upload(&mut self, chunked: bool);

	/// Answers an authentication challenge.
	///
	/// `None` cancels authentication. Transports which never emit [`TransportEvent::Login`] need
	/// not implement this.
	fn set_login(&mut self, credentials: Option<Credentials>) {
		let _ = credentials;
	}
}

/// An event reported by a [`Transport`].
#[derive(Debug)]
pub enum TransportEvent {
	/// The response head arrived.
	Response(ResponseHead),

	/// Authentication is required.
	Login(AuthInfo),

	/// A piece of the response body arrived.
	Data(Vec<u8>),

	/// The response body is complete.
	End,

	/// The response body was cut short by cancellation.
	Aborted,

	/// The exchange failed.
	Error(Error),

	/// The request was cancelled.
	Abort,

	/// The whole request body has been accepted.
	Finish,

	/// The exchange is over.
	Close,
}

/// How quickly a [`TransportEvent`] should reach the request’s subscribers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
	/// Deliver before [`EventSink::emit`] returns, when possible.
	///
	/// If the request is in the middle of calling into its transport, immediate delivery would
	/// re-enter it; such events are deferred instead.
	Immediate,

	/// Deliver on a later turn of the [`EventLoop`].
	Deferred,
}

/// A transport’s handle back to the request it serves.
///
/// The sink holds only a weak reference to the request. Once the request is dropped, events
/// emitted through the sink are discarded.
#[derive(Clone)]
pub struct EventSink {
	target: Rc<OnceCell<Weak<Shared>>>,
	event_loop: EventLoop,
}

impl EventSink {
	/// Constructs a sink that is not yet attached to a request.
	pub(crate) fn new(event_loop: EventLoop) -> Self {
		Self {
			target: Rc::new(OnceCell::new()),
			event_loop,
		}
	}

	/// Attaches the sink to its request.
	pub(crate) fn attach(&self, shared: &Rc<Shared>) {
		if self.target.set(Rc::downgrade(shared)).is_err() {
			tracing::warn!("event sink attached twice");
		}
	}

	/// Returns the event loop deferred events are queued on.
	pub fn event_loop(&self) -> &EventLoop {
		&self.event_loop
	}

	/// Returns whether the request this sink serves still exists.
	pub fn is_attached(&self) -> bool {
		self.target
			.get()
			.map_or(false, |target| target.strong_count() != 0)
	}

	/// Reports an event to the request.
	pub fn emit(&self, delivery: Delivery, event: TransportEvent) {
		let shared = match self.target.get().and_then(Weak::upgrade) {
			Some(shared) => shared,
			None => {
				tracing::trace!(?event, "no request attached; event dropped");
				return;
			}
		};
		if delivery == Delivery::Immediate && !shared.transport_busy() {
			dispatch(&shared, event);
		} else {
			let target = Rc::downgrade(&shared);
			self.event_loop.defer(move || {
				if let Some(shared) = target.upgrade() {
					dispatch(&shared, event);
				}
			});
		}
	}
}

impl std::fmt::Debug for EventSink {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		f.debug_struct("EventSink")
			.field("attached", &self.is_attached())
			.finish()
	}
}
