#![forbid(unsafe_code)]
#![warn(
	future_incompatible,
	nonstandard_style,
	rust_2018_idioms,
	rustdoc::broken_intra_doc_links,
	unused
)]
#![warn(
	deprecated_in_future,
	rustdoc::missing_crate_level_docs,
	missing_debug_implementations,
	missing_docs,
	// Disabled due to <https://github.com/rust-lang/rust/issues/69952> and
	// <https://github.com/rust-lang/rust/issues/77217>.
	// single_use_lifetimes,
	trivial_casts,
	trivial_numeric_casts,
	unused_crate_dependencies,
	unused_import_braces,
	// Disabled due to <https://github.com/rust-lang/rust/issues/77217>.
	// unused_lifetimes,
	unused_qualifications,
	unused_results
)]
#![warn(clippy::pedantic, clippy::cargo)]
// Disabled because we frequently mix u64 and usize, where the former is used for message body
// lengths and the latter for in-memory buffer sizes.
#![allow(clippy::cast_possible_truncation)]

//! Event-Driven HTTP Request Pipeline
//!
//! This crate models the lifecycle of outbound HTTP requests: option normalization, a header table
//! that freezes once the request starts, streaming body writes with flow control, and delivery of
//! a single read-only [`Response`]. It performs no I/O of its own. Each request owns a
//! [`Transport`], created by the application’s [`Connector`], which does the actual network work
//! and reports progress back through an [`EventSink`].
//!
//! Everything runs on one thread. Write callbacks and most transport events are queued on an
//! [`EventLoop`], which the application drains on its own schedule, typically once per turn of its
//! main loop.
//!
//! The [`wire`] module provides a complete transport speaking HTTP/1.1 over any connection
//! implementing [`AsyncBufRead`](futures_io::AsyncBufRead) and
//! [`AsyncWrite`](futures_io::AsyncWrite). The [`scheme`] module routes custom URL schemes to
//! in-process resource handlers.
//!
//! # Example
//! ```
//! use reqpipe::wire::{Http1Config, Http1Connector};
//! use reqpipe::{Client, EventLoop, ResponseEvent};
//! use std::cell::RefCell;
//! use std::pin::Pin;
//! use std::rc::Rc;
//!
//! let event_loop = EventLoop::new();
//! let connector = Http1Connector::new(Http1Config::default());
//! let client = Client::new(event_loop.clone(), connector.clone());
//!
//! // Create the request and collect the response body as it arrives.
//! let body = Rc::new(RefCell::new(Vec::new()));
//! let request = {
//!		let body = Rc::clone(&body);
//!		client
//!			.request_with("http://example.com/", move |response| {
//!				assert_eq!(response.status_code(), 200);
//!				let _ = response.on(move |event| {
//!					if let ResponseEvent::Data(data) = event {
//!						body.borrow_mut().extend_from_slice(data);
//!					}
//!				});
//!			})
//!			.unwrap()
//! };
//! request.set_header("Accept", "text/plain").unwrap();
//! let _ = request.end().unwrap();
//!
//! // Move the bytes over a connection. In-memory buffers stand in for a socket here.
//! let exchange = connector.next_exchange().unwrap();
//! let mut sent = Vec::new();
//! futures_executor::block_on(exchange.flush_to(Pin::new(&mut sent))).unwrap();
//! assert!(sent.starts_with(b"GET / HTTP/1.1\r\n"));
//! let mut reply: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
//! futures_executor::block_on(exchange.receive_from(Pin::new(&mut reply))).unwrap();
//!
//! // Deliver the queued events.
//! let _ = event_loop.run_until_idle();
//! assert_eq!(&*body.borrow(), b"hello");
//! ```

mod client;
pub mod error;
mod event;
mod event_loop;
mod options;
mod request;
mod response;
pub mod scheme;
mod transport;
mod util;
pub mod wire;

pub use client::{Client, ClientConfig, Connector};
pub use error::Error;
pub use event::{Emitter, EventStream, ListenerId, RequestEvent, ResponseEvent};
pub use event_loop::EventLoop;
pub use options::{RequestInput, RequestOptions};
pub use request::{Chunk, Encoding, Request, WriteCallback};
pub use response::{RawHeader, Response, ResponseHead};
pub use transport::{
	AuthInfo, Credentials, Delivery, EventSink, Transport, TransportConfig, TransportEvent,
};

/// The result type of fallible pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
