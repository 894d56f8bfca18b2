use reqpipe::{
	Client, Credentials, Delivery, Error, EventLoop, EventSink, RawHeader, RequestEvent,
	ResponseEvent, ResponseHead, Transport, TransportConfig, TransportEvent,
};
use std::cell::RefCell;
use std::rc::Rc;

/// A transport that answers every request by echoing its body back.
struct Echo {
	sink: EventSink,
	body: Vec<u8>,
	started: bool,
	finished: bool,
	chunked: Rc<RefCell<Vec<bool>>>,
}

impl Transport for Echo {
	fn not_started(&self) -> bool {
		!self.started
	}

	fn finished(&self) -> bool {
		self.finished
	}

	fn write(&mut self, buffer: Vec<u8>, is_last: bool) -> bool {
		self.started = true;
		self.body.extend_from_slice(&buffer);
		if is_last {
			self.finished = true;
			self.sink.emit(Delivery::Deferred, TransportEvent::Finish);
			self.sink.emit(
				Delivery::Immediate,
				TransportEvent::Response(ResponseHead {
					raw_headers: vec![RawHeader::new("Content-Type", "application/octet-stream")],
					..ResponseHead::default()
				}),
			);
			self.sink.emit(
				Delivery::Deferred,
				TransportEvent::Data(std::mem::take(&mut self.body)),
			);
			self.sink.emit(Delivery::Deferred, TransportEvent::End);
			self.sink.emit(Delivery::Deferred, TransportEvent::Close);
		}
		true
	}

	fn cancel(&mut self) {}

	fn set_extra_header(&mut self, _name: &str, _value: &str) {}

	fn remove_extra_header(&mut self, _name: &str) {}

	fn set_chunked_upload(&mut self, chunked: bool) {
		self.chunked.borrow_mut().push(chunked);
	}

	fn set_login(&mut self, _credentials: Option<Credentials>) {}
}

/// Tests a transport supplied as a closure from outside the crate.
#[test]
fn test_echo_transport() {
	let event_loop = EventLoop::new();
	let chunked = Rc::new(RefCell::new(Vec::new()));
	let connector = {
		let chunked = Rc::clone(&chunked);
		move |config: &TransportConfig, sink: EventSink| -> Result<Box<dyn Transport>, Error> {
			assert_eq!(config.method, "PUT");
			Ok(Box::new(Echo {
				sink,
				body: Vec::new(),
				started: false,
				finished: false,
				chunked: Rc::clone(&chunked),
			}))
		}
	};
	let client = Client::new(event_loop.clone(), connector);

	let echoed = Rc::new(RefCell::new(Vec::new()));
	let request = {
		let echoed = Rc::clone(&echoed);
		client
			.request_with(
				reqpipe::RequestOptions {
					method: Some("PUT".to_owned()),
					..reqpipe::RequestOptions::default()
				},
				move |response| {
					assert_eq!(
						response.header("content-type"),
						Some(&b"application/octet-stream"[..])
					);
					let _ = response.on(move |event| {
						if let ResponseEvent::Data(data) = event {
							echoed.borrow_mut().extend_from_slice(data);
						}
					});
				},
			)
			.unwrap()
	};
	let closed = Rc::new(RefCell::new(false));
	{
		let closed = Rc::clone(&closed);
		let _ = request.on(move |event| {
			if let RequestEvent::Close = event {
				*closed.borrow_mut() = true;
			}
		});
	}

	request.set_chunked_encoding(true).unwrap();
	let _ = request.write(&b"ping "[..]).unwrap();
	let _ = request.end_with(Some("pong".into()), Default::default(), None).unwrap();

	// The response was reported from inside the transport, so it is queued rather than delivered.
	assert!(request.response().is_none());
	let _ = event_loop.run_until_idle();
	assert_eq!(&*echoed.borrow(), b"ping pong");
	assert!(*closed.borrow());
	assert!(request.response().is_some());
	assert_eq!(*chunked.borrow(), [true, true]);
}
