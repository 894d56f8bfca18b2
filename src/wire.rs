//! A reference [`Transport`] speaking HTTP/1.1 over a caller-provided connection.
//!
//! [`Http1Connector`] creates one [`Exchange`] per request. The request writes its body into the
//! exchange as usual; the application moves the framed request bytes to the server with
//! [`Exchange::flush_to`] (or [`Exchange::take_outbound`]) and feeds the server’s reply back with
//! [`Exchange::receive_from`] (or [`Exchange::receive`]). Opening the connection, and TLS for
//! `https` URLs, are the application’s business.

mod decode;
mod encode;

use crate::client::Connector;
use crate::error::{Error, InvalidData};
use crate::transport::{Delivery, EventSink, Transport, TransportConfig, TransportEvent};
use crate::util::io::{AsyncBufReadExt as _, AsyncWriteExt as _};
use decode::{Output, Receiver};
use encode::Framing;
use futures_io::{AsyncBufRead, AsyncWrite};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::pin::Pin;
use std::rc::{Rc, Weak};

/// Configuration for [`Http1Connector`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Http1Config {
	/// The `User-Agent` header sent unless the request sets its own; `None` sends none.
	pub user_agent: Option<String>,

	/// The number of outbound bytes an exchange buffers before its writes start returning
	/// `false`.
	pub high_water_mark: usize,

	/// The maximum size of a response status line and headers.
	pub max_head_bytes: usize,

	/// The named sessions requests may ask for, in addition to the default (empty) session.
	pub sessions: Vec<String>,
}

impl Default for Http1Config {
	fn default() -> Self {
		Self {
			user_agent: Some(concat!("reqpipe/", env!("CARGO_PKG_VERSION")).to_owned()),
			high_water_mark: 16 * 1024,
			max_head_bytes: 64 * 1024,
			sessions: Vec::new(),
		}
	}
}

/// A [`Connector`] creating HTTP/1.1 [`Exchange`]s.
///
/// `Http1Connector` is a cheap handle; clones share the same queue of new exchanges, so one clone
/// can be handed to a [`Client`](crate::Client) while another picks up the exchanges.
///
/// The queue only holds exchanges whose request still exists. An exchange whose request was
/// dropped, or failed to be created, before the exchange was taken is never handed out.
#[derive(Clone, Debug, Default)]
pub struct Http1Connector {
	config: Rc<Http1Config>,
	exchanges: Rc<RefCell<VecDeque<Weak<RefCell<ExchangeState>>>>>,
}

impl Http1Connector {
	/// Constructs a connector.
	pub fn new(config: Http1Config) -> Self {
		Self {
			config: Rc::new(config),
			exchanges: Rc::default(),
		}
	}

	/// Returns the connector configuration.
	pub fn config(&self) -> &Http1Config {
		&self.config
	}

	/// Takes the oldest exchange not yet taken.
	pub fn next_exchange(&self) -> Option<Exchange> {
		let mut exchanges = self.exchanges.borrow_mut();
		while let Some(state) = exchanges.pop_front() {
			if let Some(state) = state.upgrade() {
				return Some(Exchange { state });
			}
		}
		None
	}
}

impl Connector for Http1Connector {
	fn connect(
		&self,
		config: &TransportConfig,
		sink: EventSink,
	) -> Result<Box<dyn Transport>, Error> {
		let url = url::Url::parse(&config.url)?;
		if !matches!(url.scheme(), "http" | "https") {
			return Err(Error::UnsupportedProtocol(url.scheme().to_owned()));
		}
		let host = match url.host_str() {
			Some(host) => host.to_owned(),
			None => return Err(url::ParseError::EmptyHost.into()),
		};
		if !config.session.is_empty() && !self.config.sessions.contains(&config.session) {
			return Err(Error::SessionUnavailable(config.session.clone()));
		}

		let state = Rc::new(RefCell::new(ExchangeState {
			receiver: Receiver::new(self.config.max_head_bytes, config.method == "HEAD"),
			config: Rc::clone(&self.config),
			method: config.method.clone(),
			session: config.session.clone(),
			host,
			url,
			headers: Vec::new(),
			chunked: false,
			phase: Phase::NotStarted,
			head_sent: false,
			last_chunk_sent: false,
			pending: VecDeque::new(),
			pending_len: 0,
			outbound: Vec::new(),
			cancelled: false,
			closed: false,
			sink,
		}));
		tracing::debug!(method = %config.method, url = %config.url, "HTTP/1.1 exchange created");
		let mut exchanges = self.exchanges.borrow_mut();
		exchanges.retain(|state| state.strong_count() != 0);
		exchanges.push_back(Rc::downgrade(&state));
		Ok(Box::new(Http1Transport { state }))
	}
}

/// How far the request body has progressed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
	/// Nothing has been written.
	NotStarted,

	/// Some of the body has been written.
	Started,

	/// The last piece of the body has been written.
	Finished,
}

/// The state of one exchange, shared by its transport and its [`Exchange`] handle.
#[derive(Debug)]
struct ExchangeState {
	config: Rc<Http1Config>,
	method: String,
	url: url::Url,
	session: String,
	host: String,

	/// Extra headers in the order first set.
	headers: Vec<(String, String)>,

	chunked: bool,
	phase: Phase,
	head_sent: bool,
	last_chunk_sent: bool,

	/// Body pieces written but not yet framed.
	pending: VecDeque<Vec<u8>>,

	/// The total length of `pending`.
	pending_len: usize,

	/// Framed bytes ready for the connection.
	outbound: Vec<u8>,

	cancelled: bool,
	closed: bool,
	receiver: Receiver,
	sink: EventSink,
}

impl ExchangeState {
	/// Returns the `request-target`: the path and query string.
	fn target(&self) -> String {
		match self.url.query() {
			Some(query) => format!("{}?{}", self.url.path(), query),
			None => self.url.path().to_owned(),
		}
	}

	/// Returns the value for the `Host` header.
	fn authority(&self) -> String {
		match self.url.port() {
			Some(port) => format!("{}:{}", self.host, port),
			None => self.host.clone(),
		}
	}

	/// Moves as much of the written body as the framing allows into the outbound buffer.
	///
	/// The head is produced here rather than on the first write, so that the chunked flag, which
	/// the request propagates after that write, is honoured.
	fn frame(&mut self) {
		if self.cancelled || self.phase == Phase::NotStarted {
			return;
		}
		if self.chunked {
			if !self.head_sent {
				self.write_head(Framing::Chunked);
			}
			for piece in self.pending.drain(..) {
				encode::chunk(&mut self.outbound, &piece);
			}
			self.pending_len = 0;
			if self.phase == Phase::Finished && !self.last_chunk_sent {
				self.outbound.extend_from_slice(encode::LAST_CHUNK);
				self.last_chunk_sent = true;
			}
		} else if self.phase == Phase::Finished && !self.head_sent {
			// Without chunking the length must be known up front, so nothing goes out until the
			// whole body is in.
			let framing = if self.pending_len != 0 || crate::util::expects_body(&self.method) {
				Framing::Length(self.pending_len as u64)
			} else {
				Framing::None
			};
			self.write_head(framing);
			for piece in self.pending.drain(..) {
				self.outbound.extend_from_slice(&piece);
			}
			self.pending_len = 0;
		}
	}

	fn write_head(&mut self, framing: Framing) {
		let target = self.target();
		let authority = self.authority();
		encode::head(
			&mut self.outbound,
			&self.method,
			&target,
			&authority,
			self.config.user_agent.as_deref(),
			&self.headers,
			framing,
		);
		self.head_sent = true;
		tracing::debug!(url = %self.url, ?framing, "request head framed");
	}

	/// Reports a failure and ends the exchange.
	fn fail(&mut self, error: Error) {
		if !self.closed {
			tracing::debug!(url = %self.url, %error, "exchange failed");
			self.closed = true;
			self.sink
				.emit(Delivery::Deferred, TransportEvent::Error(error));
			self.sink.emit(Delivery::Deferred, TransportEvent::Close);
		}
	}

	/// Decodes received bytes, or the end of the stream if `data` is `None`.
	fn receive(&mut self, data: Option<&[u8]>) -> Result<(), Error> {
		if self.closed {
			return Ok(());
		}
		let mut out = Vec::new();
		let result = if !self.head_sent {
			Err(InvalidData::UnsolicitedResponse.into())
		} else {
			match data {
				Some(data) => self.receiver.feed(data, &mut out),
				None => self.receiver.feed_eof(&mut out),
			}
		};
		for output in out {
			let event = match output {
				Output::Head(head) => TransportEvent::Response(head),
				Output::Data(data) => TransportEvent::Data(data),
				Output::End => TransportEvent::End,
			};
			self.sink.emit(Delivery::Deferred, event);
		}
		match result {
			Ok(()) => {
				if self.receiver.is_done() {
					self.closed = true;
					self.sink.emit(Delivery::Deferred, TransportEvent::Close);
				}
				Ok(())
			}
			Err(e) => {
				let error = Error::from(e);
				self.fail(error.clone());
				Err(error)
			}
		}
	}
}

/// The [`Transport`] half of an exchange, owned by the request.
#[derive(Debug)]
struct Http1Transport {
	state: Rc<RefCell<ExchangeState>>,
}

impl Transport for Http1Transport {
	fn not_started(&self) -> bool {
		self.state.borrow().phase == Phase::NotStarted
	}

	fn finished(&self) -> bool {
		self.state.borrow().phase == Phase::Finished
	}

	fn write(&mut self, buffer: Vec<u8>, is_last: bool) -> bool {
		let mut state = self.state.borrow_mut();
		if state.cancelled || state.phase == Phase::Finished {
			tracing::trace!(url = %state.url, len = buffer.len(), "write to settled exchange dropped");
			return true;
		}
		state.phase = if is_last {
			Phase::Finished
		} else {
			Phase::Started
		};
		if !buffer.is_empty() {
			state.pending_len += buffer.len();
			state.pending.push_back(buffer);
		}
		if is_last {
			state.sink.emit(Delivery::Deferred, TransportEvent::Finish);
		}
		state.pending_len + state.outbound.len() < state.config.high_water_mark
	}

	fn cancel(&mut self) {
		let mut state = self.state.borrow_mut();
		if state.cancelled || state.closed {
			return;
		}
		state.cancelled = true;
		state.closed = true;
		// Nothing more will be sent, so the request counts as finished and later writes fail.
		state.phase = Phase::Finished;
		state.pending.clear();
		state.pending_len = 0;
		state.outbound.clear();
		state.sink.emit(Delivery::Deferred, TransportEvent::Abort);
		if state.receiver.in_body() {
			state.sink.emit(Delivery::Deferred, TransportEvent::Aborted);
		}
		state.sink.emit(Delivery::Deferred, TransportEvent::Close);
	}

	fn set_extra_header(&mut self, name: &str, value: &str) {
		let mut state = self.state.borrow_mut();
		if state.head_sent {
			tracing::warn!(header = %name, "header set after head was framed ignored");
			return;
		}
		let entry = (name.to_owned(), value.to_owned());
		match state
			.headers
			.iter()
			.position(|(n, _)| n.eq_ignore_ascii_case(name))
		{
			Some(i) => state.headers[i] = entry,
			None => state.headers.push(entry),
		}
	}

	fn remove_extra_header(&mut self, name: &str) {
		let mut state = self.state.borrow_mut();
		if state.head_sent {
			tracing::warn!(header = %name, "header removed after head was framed ignored");
			return;
		}
		state.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
	}

	fn set_chunked_upload(&mut self, chunked: bool) {
		let mut state = self.state.borrow_mut();
		if !state.head_sent {
			state.chunked = chunked;
		}
	}
}

/// The application’s handle on one HTTP/1.1 exchange.
///
/// The exchange stays usable after its request is dropped; events it would report are then
/// discarded.
#[derive(Clone, Debug)]
pub struct Exchange {
	state: Rc<RefCell<ExchangeState>>,
}

impl Exchange {
	/// Returns the request method.
	pub fn method(&self) -> String {
		self.state.borrow().method.clone()
	}

	/// Returns the URL being requested.
	pub fn url(&self) -> url::Url {
		self.state.borrow().url.clone()
	}

	/// Returns the name of the network session; empty for the default session.
	pub fn session(&self) -> String {
		self.state.borrow().session.clone()
	}

	/// Returns the host and port to connect to.
	pub fn server(&self) -> (String, u16) {
		let state = self.state.borrow();
		// Only http and https URLs are accepted, and both have a known default port.
		let port = state.url.port_or_known_default().unwrap_or(80);
		(state.host.clone(), port)
	}

	/// Returns whether the connection must be secured with TLS.
	pub fn is_tls(&self) -> bool {
		self.state.borrow().url.scheme() == "https"
	}

	/// Returns whether the exchange is over, either because the whole response was received or
	/// because it failed or was cancelled.
	pub fn is_closed(&self) -> bool {
		self.state.borrow().closed
	}

	/// Takes the request bytes that are ready to be sent.
	///
	/// Returns an empty vector if nothing is ready, for example because the request body is not
	/// chunked and has not been finished.
	pub fn take_outbound(&self) -> Vec<u8> {
		let mut state = self.state.borrow_mut();
		state.frame();
		let bytes = std::mem::take(&mut state.outbound);
		if !bytes.is_empty() {
			tracing::trace!(url = %state.url, len = bytes.len(), "outbound bytes taken");
		}
		bytes
	}

	/// Decodes a piece of the response.
	///
	/// Events are queued on the request’s event loop. Decoding failures are reported to the
	/// request as an error event followed by a close event, and also returned.
	///
	/// # Errors
	/// This function returns an error if the response is malformed or unsupported, or if the
	/// server sends anything before the request head has been taken for sending.
	pub fn receive(&self, data: &[u8]) -> Result<(), Error> {
		self.state.borrow_mut().receive(Some(data))
	}

	/// Handles the server closing the connection.
	///
	/// # Errors
	/// This function returns an error if the response is incomplete.
	pub fn receive_eof(&self) -> Result<(), Error> {
		self.state.borrow_mut().receive(None)
	}

	/// Reports a connection failure to the request and ends the exchange.
	pub fn fail(&self, error: std::io::Error) {
		self.state.borrow_mut().fail(error.into());
	}

	/// Sends whatever request bytes are ready over `socket` and flushes it.
	///
	/// Returns the number of bytes sent.
	///
	/// # Errors
	/// This function returns an error if writing to `socket` fails. The failure is also reported to
	/// the request.
	pub async fn flush_to<Socket: AsyncWrite + ?Sized>(
		&self,
		mut socket: Pin<&mut Socket>,
	) -> Result<usize, Error> {
		let bytes = self.take_outbound();
		let result = async {
			if !bytes.is_empty() {
				socket.as_mut().write_all(&bytes).await?;
			}
			socket.as_mut().flush().await
		}
		.await;
		match result {
			Ok(()) => Ok(bytes.len()),
			Err(e) => {
				let error = Error::from(e);
				self.state.borrow_mut().fail(error.clone());
				Err(error)
			}
		}
	}

	/// Receives the response from `socket` until the exchange is over.
	///
	/// # Errors
	/// This function returns an error if reading from `socket` fails or the response is malformed.
	/// The failure is also reported to the request.
	pub async fn receive_from<Socket: AsyncBufRead + ?Sized>(
		&self,
		mut socket: Pin<&mut Socket>,
	) -> Result<(), Error> {
		while !self.is_closed() {
			let result = socket
				.as_mut()
				.read_buf(|bytes: &[u8]| {
					if bytes.is_empty() {
						(0, self.receive_eof())
					} else {
						(bytes.len(), self.receive(bytes))
					}
				})
				.await;
			match result {
				Ok(result) => result?,
				Err(e) => {
					let error = Error::from(e);
					self.state.borrow_mut().fail(error.clone());
					return Err(error);
				}
			}
		}
		Ok(())
	}
}
