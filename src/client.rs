use crate::error::Error;
use crate::event_loop::EventLoop;
use crate::options::RequestInput;
use crate::request::{Encoding, Request};
use crate::response::Response;
use crate::transport::{EventSink, Transport, TransportConfig};
use std::rc::Rc;

/// Something that creates a [`Transport`] for each new request.
///
/// A blanket implementation is provided for closures of the right shape, so a connector can be as
/// simple as `|config, sink| Ok(Box::new(MyTransport::new(config, sink)))`.
pub trait Connector {
	/// Creates the transport for one request.
	///
	/// The `sink` is the transport’s only way to report progress back to the request; the
	/// transport should keep it for as long as it has events to report.
	///
	/// # Errors
	/// This function returns an error if the transport cannot be created, for example because the
	/// URL names a scheme the connector does not speak or the session does not exist.
	fn connect(&self, config: &TransportConfig, sink: EventSink)
		-> Result<Box<dyn Transport>, Error>;
}

impl<F> Connector for F
where
	F: Fn(&TransportConfig, EventSink) -> Result<Box<dyn Transport>, Error>,
{
	fn connect(
		&self,
		config: &TransportConfig,
		sink: EventSink,
	) -> Result<Box<dyn Transport>, Error> {
		self(config, sink)
	}
}

/// Client-wide defaults.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClientConfig {
	/// The session used by requests that do not name one. Empty selects the connector’s default
	/// session.
	pub default_session: String,

	/// The encoding used for text chunks written without an explicit encoding.
	pub default_encoding: Encoding,
}

/// The entry point for creating requests.
///
/// A client ties together the [`EventLoop`] on which deferred work is queued and the
/// [`Connector`] that creates one transport per request.
pub struct Client {
	event_loop: EventLoop,
	connector: Rc<dyn Connector>,
	config: ClientConfig,
}

impl Client {
	/// Constructs a client with the default configuration.
	pub fn new(event_loop: EventLoop, connector: impl Connector + 'static) -> Self {
		Self::with_config(event_loop, connector, ClientConfig::default())
	}

	/// Constructs a client.
	pub fn with_config(
		event_loop: EventLoop,
		connector: impl Connector + 'static,
		config: ClientConfig,
	) -> Self {
		Self {
			event_loop,
			connector: Rc::new(connector),
			config,
		}
	}

	/// Returns the event loop requests defer their work to.
	pub fn event_loop(&self) -> &EventLoop {
		&self.event_loop
	}

	/// Returns the client configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Creates a request.
	///
	/// The `input` parameter is either a URL string or a [`RequestOptions`](crate::RequestOptions).
	///
	/// # Errors
	/// This function returns an error if the options do not describe a valid request (see
	/// [`Error`] for the possibilities) or if the connector fails to create a transport. No
	/// transport is created if the options are invalid.
	pub fn request(&self, input: impl Into<RequestInput>) -> Result<Request, Error> {
		Request::create(
			&self.event_loop,
			&*self.connector,
			&self.config.default_session,
			self.config.default_encoding,
			input.into(),
		)
	}

	/// Creates a request and subscribes a one-shot listener to its response.
	///
	/// # Errors
	/// See [`request`](Client::request).
	pub fn request_with(
		&self,
		input: impl Into<RequestInput>,
		on_response: impl FnOnce(&Response) + 'static,
	) -> Result<Request, Error> {
		let request = self.request(input)?;
		let _ = request.on_response(on_response);
		Ok(request)
	}
}

impl std::fmt::Debug for Client {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		f.debug_struct("Client")
			.field("event_loop", &self.event_loop)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::options::RequestOptions;
	use crate::transport::mock::MockConnector;
	use std::cell::Cell;

	/// Tests that a closure can serve as a connector.
	#[test]
	fn test_closure_connector() {
		let calls = Rc::new(Cell::new(0));
		let mock = MockConnector::default();
		let connector = {
			let calls = Rc::clone(&calls);
			let mock = mock.clone();
			move |config: &TransportConfig, sink: EventSink| {
				calls.set(calls.get() + 1);
				mock.connect(config, sink)
			}
		};
		let client = Client::new(EventLoop::new(), connector);
		let _ = client.request("http://example.com/a").unwrap();
		assert_eq!(calls.get(), 1);
		assert_eq!(mock.handles.borrow().len(), 1);
	}

	/// Tests that a connector failure is passed through.
	#[test]
	fn test_connector_error() {
		let client = Client::new(
			EventLoop::new(),
			|config: &TransportConfig, _: EventSink| -> Result<Box<dyn Transport>, Error> {
				Err(Error::SessionUnavailable(config.session.clone()))
			},
		);
		assert!(matches!(
			client.request(RequestOptions {
				session: Some("missing".to_owned()),
				..RequestOptions::default()
			}),
			Err(Error::SessionUnavailable(s)) if s == "missing"
		));
	}

	/// Tests that the configured default session applies only when the request names none.
	#[test]
	fn test_default_session() {
		let mock = MockConnector::default();
		let client = Client::with_config(
			EventLoop::new(),
			mock.clone(),
			ClientConfig {
				default_session: "persist:main".to_owned(),
				..ClientConfig::default()
			},
		);
		let a = client.request("http://example.com/").unwrap();
		let b = client
			.request(RequestOptions {
				session: Some(String::new()),
				..RequestOptions::default()
			})
			.unwrap();
		assert_eq!(a.session(), "persist:main");
		assert_eq!(b.session(), "");
	}

	/// Tests that the configured default encoding is used by plain writes.
	#[test]
	fn test_default_encoding() {
		let mock = MockConnector::default();
		let client = Client::with_config(
			EventLoop::new(),
			mock.clone(),
			ClientConfig {
				default_encoding: Encoding::Hex,
				..ClientConfig::default()
			},
		);
		let request = client.request("http://example.com/").unwrap();
		let _ = request.write("4869").unwrap();
		assert_eq!(mock.last().log.borrow().writes[0].0, b"Hi");
	}
}
