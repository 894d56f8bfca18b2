use async_compat::CompatExt as _;
use reqpipe::wire::{Http1Config, Http1Connector};
use reqpipe::{Client, Encoding, EventLoop, RequestEvent, RequestOptions, ResponseEvent};
use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

fn runtime() -> tokio::runtime::Runtime {
	tokio::runtime::Builder::new_current_thread()
		.enable_io()
		.build()
		.unwrap()
}

fn setup() -> (EventLoop, Http1Connector, Client) {
	let event_loop = EventLoop::new();
	let connector = Http1Connector::new(Http1Config {
		user_agent: None,
		..Http1Config::default()
	});
	let client = Client::new(event_loop.clone(), connector.clone());
	(event_loop, connector, client)
}

/// Tests a chunked upload and a fixed-length response over an in-process pipe.
#[test]
fn test_chunked_upload_roundtrip() {
	runtime().block_on(async {
		let (event_loop, connector, client) = setup();
		let (client_io, mut server_io) = tokio::io::duplex(4096);
		let (read_half, write_half) = tokio::io::split(client_io);
		let mut reader = tokio::io::BufReader::new(read_half).compat();
		let mut writer = write_half.compat();

		let request = client
			.request(RequestOptions {
				method: Some("post".to_owned()),
				hostname: Some("127.0.0.1".to_owned()),
				port: Some(8080),
				path: Some("upload".to_owned()),
				headers: vec![("X-Trace".to_owned(), "1".to_owned())],
				..RequestOptions::default()
			})
			.unwrap();
		assert_eq!(request.url(), "http://127.0.0.1:8080/upload");
		request.set_chunked_encoding(true).unwrap();
		let events = request.stream();
		let body = Rc::new(RefCell::new(Vec::new()));
		{
			let body = Rc::clone(&body);
			let _ = request.on_response(move |response| {
				let _ = response.on(move |event| {
					if let ResponseEvent::Data(data) = event {
						body.borrow_mut().extend_from_slice(data);
					}
				});
			});
		}
		let exchange = connector.next_exchange().unwrap();
		assert_eq!(exchange.server(), ("127.0.0.1".to_owned(), 8080));

		let client_side = async {
			assert!(request.write("hello ").unwrap());
			let _ = exchange.flush_to(Pin::new(&mut writer)).await.unwrap();
			assert!(request
				.end_with(Some("776f726c64".into()), Encoding::Hex, None)
				.unwrap());
			let _ = exchange.flush_to(Pin::new(&mut writer)).await.unwrap();
			exchange.receive_from(Pin::new(&mut reader)).await.unwrap();
		};
		let server_side = async {
			let expected: &[u8] = b"POST /upload HTTP/1.1\r\n\
				Host: 127.0.0.1:8080\r\n\
				X-Trace: 1\r\n\
				Transfer-Encoding: chunked\r\n\
				\r\n\
				6\r\nhello \r\n\
				5\r\nworld\r\n\
				0\r\n\r\n";
			let mut received = vec![0_u8; expected.len()];
			let _ = server_io.read_exact(&mut received).await.unwrap();
			assert_eq!(received, expected);
			server_io
				.write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\nX-Id: 7\r\n\r\nok")
				.await
				.unwrap();
		};
		let ((), ()) = tokio::join!(client_side, server_side);

		assert!(exchange.is_closed());
		let _ = event_loop.run_until_idle();
		assert_eq!(&*body.borrow(), b"ok");
		let response = request.response().unwrap();
		assert_eq!(response.status_code(), 201);
		assert_eq!(response.status_message(), "Created");
		assert_eq!(response.http_version(), "1.1");
		assert_eq!(response.header("x-id"), Some(&b"7"[..]));

		let kinds: Vec<&str> = futures_executor::block_on_stream(events)
			.map(|event| match event {
				RequestEvent::Response(_) => "response",
				RequestEvent::Login(_) => "login",
				RequestEvent::Error(_) => "error",
				RequestEvent::Abort => "abort",
				RequestEvent::Finish => "finish",
				RequestEvent::Close => "close",
			})
			.collect();
		assert_eq!(kinds, ["finish", "response", "close"]);
	});
}

/// Tests that a connection closed in the middle of the response body fails the request.
#[test]
fn test_truncated_response() {
	runtime().block_on(async {
		let (event_loop, connector, client) = setup();
		let (client_io, mut server_io) = tokio::io::duplex(4096);
		let mut reader = tokio::io::BufReader::new(client_io).compat();

		let request = client.request("http://example.com/file").unwrap();
		let errors = Rc::new(RefCell::new(Vec::new()));
		{
			let errors = Rc::clone(&errors);
			let _ = request.on(move |event| {
				if let RequestEvent::Error(e) = event {
					errors.borrow_mut().push(e.to_string());
				}
			});
		}
		let _ = request.end().unwrap();
		let exchange = connector.next_exchange().unwrap();
		assert_eq!(
			exchange.take_outbound(),
			b"GET /file HTTP/1.1\r\nHost: example.com\r\n\r\n"
		);

		server_io
			.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc")
			.await
			.unwrap();
		drop(server_io);
		assert!(exchange
			.receive_from(Pin::new(&mut reader))
			.await
			.is_err());

		let _ = event_loop.run_until_idle();
		assert_eq!(errors.borrow().len(), 1);
		assert!(errors.borrow()[0].starts_with("Transport failed"));
		assert_eq!(request.events().listener_count(), 0);
	});
}
