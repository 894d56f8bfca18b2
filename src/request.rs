mod chunk;
mod headers;

pub use chunk::{Chunk, Encoding};

use crate::client::Connector;
use crate::error::{Error, InvalidArgument, Mutation};
use crate::event::{Emitter, EventStream, ListenerId, RequestEvent, ResponseEvent};
use crate::event_loop::EventLoop;
use crate::options::RequestInput;
use crate::response::Response;
use crate::transport::{Credentials, EventSink, Transport, TransportConfig, TransportEvent};
use headers::HeaderTable;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

/// A callback invoked once a write has been handed to the transport.
///
/// It receives `Some(error)` if the write was refused because the request had already finished.
pub type WriteCallback = Box<dyn FnOnce(Option<&Error>)>;

/// The mutable part of a request.
#[derive(Debug, Default)]
struct State {
	/// Local copy of the headers handed to the transport.
	headers: HeaderTable,

	/// Whether the body is sent using chunked transfer encoding. Never switches back off.
	chunked: bool,

	/// The response, once the transport has reported its head.
	response: Option<Response>,

	/// Whether the response body has ended or been aborted.
	body_over: bool,

	/// Whether the transport has reported the end of the exchange.
	closed: bool,
}

/// Everything a request and its transport’s [`EventSink`] share.
pub(crate) struct Shared {
	method: String,
	url: String,
	session: String,
	default_encoding: Encoding,
	transport: RefCell<Box<dyn Transport>>,
	state: RefCell<State>,
	events: Emitter<RequestEvent>,
	event_loop: EventLoop,
}

impl Shared {
	/// Returns whether the request is currently calling into its transport.
	pub(crate) fn transport_busy(&self) -> bool {
		self.transport.try_borrow_mut().is_err()
	}

	fn transport(&self) -> RefMut<'_, Box<dyn Transport>> {
		self.transport.borrow_mut()
	}
}

/// Routes a transport event to the request or its response.
pub(crate) fn dispatch(shared: &Rc<Shared>, event: TransportEvent) {
	if shared.state.borrow().closed {
		tracing::warn!(url = %shared.url, ?event, "event after close dropped");
		return;
	}
	match event {
		TransportEvent::Response(head) => {
			let response = {
				let mut state = shared.state.borrow_mut();
				if state.response.is_some() {
					tracing::warn!(url = %shared.url, "duplicate response head dropped");
					return;
				}
				let response = Response::new(head);
				state.response = Some(response.clone());
				response
			};
			tracing::debug!(
				url = %shared.url,
				status = response.status_code(),
				"response started"
			);
			let _ = shared.events.emit(&RequestEvent::Response(response));
		}
		TransportEvent::Login(info) => {
			let _ = shared.events.emit(&RequestEvent::Login(info));
		}
		TransportEvent::Error(error) => {
			tracing::debug!(url = %shared.url, %error, "request failed");
			let _ = shared.events.emit(&RequestEvent::Error(error.clone()));
			// A body still being received will never finish; tell its subscribers.
			let response = {
				let state = shared.state.borrow();
				if state.body_over {
					None
				} else {
					state.response.clone()
				}
			};
			if let Some(response) = response {
				shared.state.borrow_mut().body_over = true;
				let _ = response.events().emit(&ResponseEvent::Error(error));
			}
		}
		TransportEvent::Abort => {
			let _ = shared.events.emit(&RequestEvent::Abort);
		}
		TransportEvent::Finish => {
			let _ = shared.events.emit(&RequestEvent::Finish);
		}
		TransportEvent::Close => {
			let response = {
				let mut state = shared.state.borrow_mut();
				state.closed = true;
				state.response.clone()
			};
			tracing::debug!(url = %shared.url, "request closed");
			let _ = shared.events.emit(&RequestEvent::Close);
			// Nothing else will be delivered, so release every subscriber and whatever it
			// captured.
			shared.events.close();
			if let Some(response) = response {
				response.events().close();
			}
		}
		TransportEvent::Data(data) => emit_response(shared, ResponseEvent::Data(data.into())),
		TransportEvent::End => {
			shared.state.borrow_mut().body_over = true;
			emit_response(shared, ResponseEvent::End);
		}
		TransportEvent::Aborted => {
			shared.state.borrow_mut().body_over = true;
			emit_response(shared, ResponseEvent::Aborted);
		}
	}
}

/// Delivers a body event to the response, if there is one yet.
fn emit_response(shared: &Shared, event: ResponseEvent) {
	let response = shared.state.borrow().response.clone();
	match response {
		Some(response) => {
			let _ = response.events().emit(&event);
		}
		None => tracing::warn!(url = %shared.url, ?event, "body event before response dropped"),
	}
}

/// An outbound HTTP request.
///
/// A request starts out with its head unsent. Headers may be set and removed, and chunked
/// encoding selected, until the first call to [`write`](Request::write) or
/// [`end`](Request::end); from then on the head is considered sent and those mutations fail with
/// [`Error::AlreadySent`]. [`end`](Request::end) delivers the last piece of the body. Afterwards
/// the transport reports the response head, which becomes the request’s one and only
/// [`Response`], followed by the response body and finally [`RequestEvent::Close`].
///
/// Write callbacks and write-after-end errors are always delivered on a later turn of the
/// [`EventLoop`], never from within the call that caused them.
pub struct Request {
	shared: Rc<Shared>,
}

impl Request {
	/// Creates a request and its transport.
	pub(crate) fn create(
		event_loop: &EventLoop,
		connector: &dyn Connector,
		default_session: &str,
		default_encoding: Encoding,
		input: RequestInput,
	) -> Result<Self, Error> {
		let options = input.into_options()?;
		let resolved = options.resolve(default_session)?;
		// A transport may register itself with its connector, so nothing may fail once it exists.
		for (name, value) in &options.headers {
			headers::check_name(name)?;
			headers::check_value(name, value)?;
		}
		let config = TransportConfig {
			method: resolved.method,
			url: resolved.url,
			session: resolved.session,
		};

		let sink = EventSink::new(event_loop.clone());
		let transport = connector.connect(&config, sink.clone())?;
		let shared = Rc::new(Shared {
			method: config.method,
			url: config.url,
			session: config.session,
			default_encoding,
			transport: RefCell::new(transport),
			state: RefCell::new(State::default()),
			events: Emitter::new(),
			event_loop: event_loop.clone(),
		});
		sink.attach(&shared);
		tracing::debug!(
			method = %shared.method,
			url = %shared.url,
			session = %shared.session,
			"request created"
		);

		let request = Self { shared };
		for (name, value) in &options.headers {
			request.set_header(name, value)?;
		}
		Ok(request)
	}

	/// Returns the request method.
	pub fn method(&self) -> &str {
		&self.shared.method
	}

	/// Returns the URL being requested.
	pub fn url(&self) -> &str {
		&self.shared.url
	}

	/// Returns the name of the network session; empty for the default session.
	pub fn session(&self) -> &str {
		&self.shared.session
	}

	/// Returns whether the request head has been handed to the transport.
	pub fn is_started(&self) -> bool {
		!self.shared.transport.borrow().not_started()
	}

	/// Returns whether the last piece of the body has been handed to the transport.
	pub fn is_finished(&self) -> bool {
		self.shared.transport.borrow().finished()
	}

	/// Fails with [`Error::AlreadySent`] if the request head has been handed to the transport.
	fn check_not_started(&self, mutation: Mutation) -> Result<(), Error> {
		if self.is_started() {
			Err(Error::AlreadySent(mutation))
		} else {
			Ok(())
		}
	}

	/// Sets a request header, replacing any previous value under the same name.
	///
	/// # Errors
	/// This function returns [`Error::InvalidArgument`] if `name` is not a token or `value`
	/// contains control characters, and [`Error::AlreadySent`] if the request has started.
	pub fn set_header(&self, name: &str, value: &str) -> Result<(), Error> {
		headers::check_name(name)?;
		headers::check_value(name, value)?;
		self.check_not_started(Mutation::SetHeader)?;
		self.shared.state.borrow_mut().headers.set(name, value);
		self.shared.transport().set_extra_header(name, value);
		Ok(())
	}

	/// Returns the value of a header set on this request.
	///
	/// A name that could never have been set, because it is not a token, is simply not found.
	///
	/// # Errors
	/// This function returns [`Error::InvalidArgument`] if `name` is empty.
	pub fn get_header(&self, name: &str) -> Result<Option<String>, Error> {
		if name.is_empty() {
			return Err(InvalidArgument::EmptyHeaderName.into());
		}
		Ok(self
			.shared
			.state
			.borrow()
			.headers
			.get(name)
			.map(str::to_owned))
	}

	/// Removes a request header. Removing a header that was never set does nothing.
	///
	/// # Errors
	/// This function returns [`Error::InvalidArgument`] if `name` is not a token, and
	/// [`Error::AlreadySent`] if the request has started.
	pub fn remove_header(&self, name: &str) -> Result<(), Error> {
		headers::check_name(name)?;
		self.check_not_started(Mutation::RemoveHeader)?;
		let _ = self.shared.state.borrow_mut().headers.remove(name);
		self.shared.transport().remove_extra_header(name);
		Ok(())
	}

	/// Returns whether the body is sent using chunked transfer encoding.
	pub fn chunked_encoding(&self) -> bool {
		self.shared.state.borrow().chunked
	}

	/// Selects whether the body is sent using chunked transfer encoding.
	///
	/// Once switched on, chunked encoding stays on for the life of the request.
	///
	/// # Errors
	/// This function returns [`Error::AlreadySent`] if the request has started, and
	/// [`Error::ChunkedEncodingLocked`] on an attempt to switch chunked encoding back off.
	pub fn set_chunked_encoding(&self, chunked: bool) -> Result<(), Error> {
		self.check_not_started(Mutation::ChunkedEncoding)?;
		let mut state = self.shared.state.borrow_mut();
		if state.chunked && !chunked {
			return Err(Error::ChunkedEncodingLocked);
		}
		state.chunked = chunked;
		Ok(())
	}

	/// Hands one chunk to the transport.
	fn write_chunk(
		&self,
		chunk: Chunk,
		encoding: Encoding,
		callback: Option<WriteCallback>,
		is_last: bool,
	) -> Result<bool, Error> {
		let buffer = chunk.into_bytes(encoding)?;
		let chunked = self.chunked_encoding();
		let len = buffer.len();
		let flowing = {
			let mut transport = self.shared.transport();
			let was_not_started = transport.not_started();
			let flowing = transport.write(buffer, is_last);
			// The transport decides when the head counts as sent; ask it rather than assume the
			// write took effect synchronously.
			if !transport.not_started() {
				transport.set_chunked_upload(chunked);
				if was_not_started {
					tracing::debug!(url = %self.shared.url, chunked, "request head sent");
				}
			}
			flowing
		};
		tracing::trace!(url = %self.shared.url, len, is_last, flowing, "body written");
		if let Some(callback) = callback {
			self.shared.event_loop.defer(move || callback(None));
		}
		Ok(flowing)
	}

	/// Writes a piece of the body using the client’s default encoding for text.
	///
	/// # Errors
	/// See [`write_with`](Request::write_with).
	pub fn write(&self, chunk: impl Into<Chunk>) -> Result<bool, Error> {
		self.write_with(chunk, self.shared.default_encoding, None)
	}

	/// Writes a piece of the body.
	///
	/// Returns the transport’s flow-control signal: `true` if the caller may keep writing, `false`
	/// if it should wait. The callback, if any, runs on a later turn of the event loop.
	///
	/// Writing after the request has finished is not an error of this call. Instead, on a later
	/// turn, [`RequestEvent::Error`] is emitted with [`Error::WriteAfterEnd`] and the callback is
	/// invoked with the same error; the call itself returns `Ok(true)`.
	///
	/// # Errors
	/// This function returns [`Error::Type`] if a text chunk cannot be represented in
	/// `encoding`. Nothing is handed to the transport in that case.
	pub fn write_with(
		&self,
		chunk: impl Into<Chunk>,
		encoding: Encoding,
		callback: Option<WriteCallback>,
	) -> Result<bool, Error> {
		if self.is_finished() {
			tracing::debug!(url = %self.shared.url, "write after end");
			let events = self.shared.events.clone();
			self.shared.event_loop.defer(move || {
				let error = Error::WriteAfterEnd;
				let _ = events.emit(&RequestEvent::Error(error.clone()));
				if let Some(callback) = callback {
					callback(Some(&error));
				}
			});
			return Ok(true);
		}
		self.write_chunk(chunk.into(), encoding, callback, false)
	}

	/// Finishes the request without a final piece of body.
	///
	/// # Errors
	/// See [`end_with`](Request::end_with).
	pub fn end(&self) -> Result<bool, Error> {
		self.end_with(None, self.shared.default_encoding, None)
	}

	/// Finishes the request, optionally with a final piece of body.
	///
	/// Returns `false` without touching the transport if the request has already finished;
	/// otherwise returns the transport’s flow-control signal. The callback, if any, runs on a
	/// later turn of the event loop.
	///
	/// # Errors
	/// This function returns [`Error::Type`] if a text chunk cannot be represented in
	/// `encoding`.
	pub fn end_with(
		&self,
		chunk: Option<Chunk>,
		encoding: Encoding,
		callback: Option<WriteCallback>,
	) -> Result<bool, Error> {
		if self.is_finished() {
			return Ok(false);
		}
		let chunk = chunk.unwrap_or(Chunk::Binary(Vec::new()));
		self.write_chunk(chunk, encoding, callback, true)
	}

	/// Asks the transport to cancel the exchange.
	///
	/// This is safe in any state and emits nothing itself; the transport reports the outcome.
	pub fn abort(&self) {
		tracing::debug!(url = %self.shared.url, "request aborted");
		self.shared.transport().cancel();
	}

	/// Answers a [`RequestEvent::Login`] challenge.
	///
	/// `None`, or credentials with an empty user name or password, cancel authentication.
	pub fn pass_login_info(&self, credentials: Option<Credentials>) {
		let credentials =
			credentials.filter(|c| !c.username.is_empty() && !c.password.is_empty());
		self.shared.transport().set_login(credentials);
	}

	/// Returns the response, once its head has arrived.
	pub fn response(&self) -> Option<Response> {
		self.shared.state.borrow().response.clone()
	}

	/// Returns the emitter for request events.
	pub fn events(&self) -> &Emitter<RequestEvent> {
		&self.shared.events
	}

	/// Subscribes a listener to every request event.
	pub fn on(&self, listener: impl FnMut(&RequestEvent) + 'static) -> ListenerId {
		self.shared.events.on(listener)
	}

	/// Subscribes a listener to the next request event.
	pub fn once(&self, listener: impl FnOnce(&RequestEvent) + 'static) -> ListenerId {
		self.shared.events.once(listener)
	}

	/// Subscribes a listener to the response head only.
	pub fn on_response(&self, listener: impl FnOnce(&Response) + 'static) -> ListenerId {
		let mut listener = Some(listener);
		self.shared.events.on(move |event| {
			if let RequestEvent::Response(response) = event {
				if let Some(listener) = listener.take() {
					listener(response);
				}
			}
		})
	}

	/// Returns a stream of request events, ending after [`RequestEvent::Close`].
	pub fn stream(&self) -> EventStream<RequestEvent> {
		self.shared.events.stream()
	}
}

impl std::fmt::Debug for Request {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		let state = self.shared.state.borrow();
		f.debug_struct("Request")
			.field("method", &self.shared.method)
			.field("url", &self.shared.url)
			.field("session", &self.shared.session)
			.field("headers", &state.headers.len())
			.field("chunked", &state.chunked)
			.field("closed", &state.closed)
			.finish()
	}
}
