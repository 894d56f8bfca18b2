use crate::error::{Error, InvalidArgument};
use crate::util::is_token;

/// The URL schemes a request may be synthesized for.
const SUPPORTED_PROTOCOLS: [&str; 2] = ["http", "https"];

/// The parameters of a request.
///
/// Every field is optional. If `url` is present it is used verbatim; otherwise the URL is built
/// from `protocol` (default `http`), `host` or `hostname` and `port` (default host `localhost`),
/// and `path` (default `/`).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestOptions {
	/// The request method. Upper-cased before use; defaults to `GET`.
	pub method: Option<String>,

	/// The complete URL, bypassing all the component fields below.
	pub url: Option<String>,

	/// The protocol, with or without the trailing colon.
	pub protocol: Option<String>,

	/// The host including any port. Takes precedence over `hostname` and `port`.
	pub host: Option<String>,

	/// The host name without a port.
	pub hostname: Option<String>,

	/// The port, used together with `hostname`.
	pub port: Option<u16>,

	/// The path and query string.
	pub path: Option<String>,

	/// The name of the network session; absent selects the client’s default session.
	pub session: Option<String>,

	/// Headers to set on the request, applied in order.
	pub headers: Vec<(String, String)>,
}

impl RequestOptions {
	/// Splits a URL string into component options.
	///
	/// # Errors
	/// This function returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
	pub fn parse(url: &str) -> Result<Self, Error> {
		let parsed = url::Url::parse(url)?;
		let hostname = parsed.host_str().map(str::to_owned);
		let port = parsed.port();
		let host = hostname.as_ref().map(|h| match port {
			Some(port) => format!("{h}:{port}"),
			None => h.clone(),
		});
		let path = match parsed.query() {
			Some(query) => format!("{}?{}", parsed.path(), query),
			None => parsed.path().to_owned(),
		};
		Ok(Self {
			protocol: Some(parsed.scheme().to_owned()),
			host,
			hostname,
			port,
			path: Some(path),
			..Self::default()
		})
	}

	/// Computes the method, URL, and session a transport is created with.
	///
	/// The path check is narrow: the only characters rejected are spaces, which would produce an
	/// invalid request line.
	pub(crate) fn resolve(&self, default_session: &str) -> Result<Resolved, Error> {
		let method = non_empty(&self.method)
			.unwrap_or("GET")
			.to_ascii_uppercase();
		if !is_token(&method) {
			return Err(InvalidArgument::Method(method).into());
		}

		let url = match non_empty(&self.url) {
			Some(url) => url.to_owned(),
			None => self.synthesize_url()?,
		};

		let session = match &self.session {
			Some(session) => session.clone(),
			None => default_session.to_owned(),
		};

		Ok(Resolved {
			method,
			url,
			session,
		})
	}

	/// Builds a URL from the component fields.
	fn synthesize_url(&self) -> Result<String, Error> {
		let protocol = non_empty(&self.protocol).unwrap_or("http");
		let scheme = protocol.trim_end_matches(':').to_ascii_lowercase();
		if !SUPPORTED_PROTOCOLS.contains(&scheme.as_str()) {
			return Err(Error::UnsupportedProtocol(protocol.to_owned()));
		}

		let authority = match non_empty(&self.host) {
			Some(host) => host.to_owned(),
			None => {
				let hostname = non_empty(&self.hostname).unwrap_or("localhost");
				// A bare IPv6 literal needs brackets to be told apart from the port.
				let hostname = if hostname.contains(':') && !hostname.starts_with('[') {
					format!("[{hostname}]")
				} else {
					hostname.to_owned()
				};
				match self.port {
					Some(port) => format!("{hostname}:{port}"),
					None => hostname,
				}
			}
		};

		let path = non_empty(&self.path).unwrap_or("/");
		if path.contains(' ') {
			return Err(Error::MalformedPath(path.to_owned()));
		}
		let slash = if path.starts_with('/') { "" } else { "/" };

		Ok(format!("{scheme}://{authority}{slash}{path}"))
	}
}

/// Treats an empty string the same as an absent one.
fn non_empty(value: &Option<String>) -> Option<&str> {
	value.as_deref().filter(|v| !v.is_empty())
}

/// The values a transport is created with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Resolved {
	pub method: String,
	pub url: String,
	pub session: String,
}

/// The ways a request can be described: a bare URL or a full set of options.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestInput {
	/// A URL string, parsed into component options.
	Url(String),

	/// Structured options.
	Options(RequestOptions),
}

impl RequestInput {
	/// Converts the input into options.
	///
	/// # Errors
	/// This function returns [`Error::InvalidUrl`] if a URL string cannot be parsed.
	pub fn into_options(self) -> Result<RequestOptions, Error> {
		match self {
			Self::Url(url) => RequestOptions::parse(&url),
			Self::Options(options) => Ok(options),
		}
	}
}

impl From<&str> for RequestInput {
	fn from(url: &str) -> Self {
		Self::Url(url.to_owned())
	}
}

impl From<String> for RequestInput {
	fn from(url: String) -> Self {
		Self::Url(url)
	}
}

impl From<RequestOptions> for RequestInput {
	fn from(options: RequestOptions) -> Self {
		Self::Options(options)
	}
}

impl From<&RequestOptions> for RequestInput {
	fn from(options: &RequestOptions) -> Self {
		Self::Options(options.clone())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn resolve(options: &RequestOptions) -> Result<Resolved, Error> {
		options.resolve("")
	}

	/// Tests the defaults for every supported scheme.
	#[test]
	fn test_defaults() {
		for scheme in &["http", "https", "http:", "https:"] {
			let r = resolve(&RequestOptions {
				protocol: Some((*scheme).to_owned()),
				hostname: Some("example.com".to_owned()),
				..RequestOptions::default()
			})
			.unwrap();
			assert_eq!(
				r.url,
				format!("{}://example.com/", scheme.trim_end_matches(':'))
			);
			assert_eq!(r.method, "GET");
			assert_eq!(r.session, "");
		}
		let r = resolve(&RequestOptions::default()).unwrap();
		assert_eq!(r.url, "http://localhost/");
	}

	/// Tests that `host` wins over `hostname` and `port`.
	#[test]
	fn test_host_precedence() {
		let r = resolve(&RequestOptions {
			host: Some("a.example:81".to_owned()),
			hostname: Some("b.example".to_owned()),
			port: Some(82),
			path: Some("/x?y=1".to_owned()),
			..RequestOptions::default()
		})
		.unwrap();
		assert_eq!(r.url, "http://a.example:81/x?y=1");

		let r = resolve(&RequestOptions {
			hostname: Some("b.example".to_owned()),
			port: Some(82),
			..RequestOptions::default()
		})
		.unwrap();
		assert_eq!(r.url, "http://b.example:82/");
	}

	/// Tests bracketing of IPv6 literals.
	#[test]
	fn test_ipv6_hostname() {
		let r = resolve(&RequestOptions {
			hostname: Some("::1".to_owned()),
			port: Some(8080),
			..RequestOptions::default()
		})
		.unwrap();
		assert_eq!(r.url, "http://[::1]:8080/");
	}

	/// Tests that the method is upper-cased and validated.
	#[test]
	fn test_method() {
		let r = resolve(&RequestOptions {
			method: Some("post".to_owned()),
			..RequestOptions::default()
		})
		.unwrap();
		assert_eq!(r.method, "POST");
		assert!(matches!(
			resolve(&RequestOptions {
				method: Some("GE T".to_owned()),
				..RequestOptions::default()
			}),
			Err(Error::InvalidArgument(InvalidArgument::Method(_)))
		));
	}

	/// Tests the rejection of unsupported protocols and of paths containing spaces.
	#[test]
	fn test_rejections() {
		assert!(matches!(
			resolve(&RequestOptions {
				protocol: Some("ftp".to_owned()),
				..RequestOptions::default()
			}),
			Err(Error::UnsupportedProtocol(p)) if p == "ftp"
		));
		assert!(matches!(
			resolve(&RequestOptions {
				path: Some("/a b".to_owned()),
				..RequestOptions::default()
			}),
			Err(Error::MalformedPath(_))
		));
	}

	/// Tests that an explicit URL is used verbatim, bypassing every check on the components.
	#[test]
	fn test_verbatim_url() {
		let r = resolve(&RequestOptions {
			url: Some("ftp://example.com/a b".to_owned()),
			protocol: Some("gopher".to_owned()),
			session: Some("persist:x".to_owned()),
			..RequestOptions::default()
		})
		.unwrap();
		assert_eq!(r.url, "ftp://example.com/a b");
		assert_eq!(r.session, "persist:x");
	}

	/// Tests splitting a URL string into components.
	#[test]
	fn test_parse() {
		let o = RequestOptions::parse("https://example.com:8443/a/b?c=d").unwrap();
		assert_eq!(o.protocol.as_deref(), Some("https"));
		assert_eq!(o.host.as_deref(), Some("example.com:8443"));
		assert_eq!(o.hostname.as_deref(), Some("example.com"));
		assert_eq!(o.port, Some(8443));
		assert_eq!(o.path.as_deref(), Some("/a/b?c=d"));
		assert_eq!(
			resolve(&o).unwrap().url,
			"https://example.com:8443/a/b?c=d"
		);
		assert!(matches!(
			RequestOptions::parse("not a url"),
			Err(Error::InvalidUrl(_))
		));
	}
}
