//! Routing of custom URL schemes to in-process resource handlers.
//!
//! A [`SchemeRegistry`] is created by the application at startup and handed to whatever needs to
//! serve custom-scheme URLs. It is torn down with [`SchemeRegistry::shutdown`]; there is no global
//! registry.

use crate::error::Error;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// A request for a resource under a custom scheme.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceRequest {
	/// The absolute URL requested.
	pub url: String,

	/// The request method.
	pub method: String,
}

impl ResourceRequest {
	/// Constructs a `GET` request for a URL.
	pub fn get(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			method: "GET".to_owned(),
		}
	}
}

/// A resource served by a [`SchemeHandler`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceResponse {
	/// The MIME type of `data`.
	pub mime_type: String,

	/// The resource contents.
	pub data: Rc<[u8]>,
}

/// The outcome of resolving a custom-scheme URL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resolution {
	/// The resource exists.
	Found(ResourceResponse),

	/// There is no such resource, or no handler for the scheme.
	NotFound,
}

/// Something that serves the resources of one URL scheme.
///
/// A blanket implementation is provided for closures taking the request and its parsed URL.
pub trait SchemeHandler {
	/// Looks up a resource.
	fn handle(&self, request: &ResourceRequest, url: &url::Url) -> Resolution;
}

impl<F> SchemeHandler for F
where
	F: Fn(&ResourceRequest, &url::Url) -> Resolution,
{
	fn handle(&self, request: &ResourceRequest, url: &url::Url) -> Resolution {
		self(request, url)
	}
}

/// A mapping from URL scheme to handler.
#[derive(Default)]
pub struct SchemeRegistry {
	handlers: HashMap<String, Rc<dyn SchemeHandler>>,
}

impl SchemeRegistry {
	/// Constructs an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the handler for a scheme.
	///
	/// Scheme names are case-insensitive.
	///
	/// # Errors
	/// This function returns [`Error::SchemeAlreadyRegistered`] if the scheme already has a
	/// handler; the existing handler is kept.
	pub fn register(
		&mut self,
		scheme: &str,
		handler: impl SchemeHandler + 'static,
	) -> Result<(), Error> {
		let scheme = scheme.to_ascii_lowercase();
		if self.handlers.contains_key(&scheme) {
			return Err(Error::SchemeAlreadyRegistered(scheme));
		}
		tracing::debug!(%scheme, "scheme handler registered");
		let _ = self.handlers.insert(scheme, Rc::new(handler));
		Ok(())
	}

	/// Removes the handler for a scheme, returning whether there was one.
	pub fn unregister(&mut self, scheme: &str) -> bool {
		let removed = self
			.handlers
			.remove(&scheme.to_ascii_lowercase())
			.is_some();
		if removed {
			tracing::debug!(%scheme, "scheme handler unregistered");
		}
		removed
	}

	/// Returns whether a scheme has a handler.
	pub fn is_registered(&self, scheme: &str) -> bool {
		self.handlers.contains_key(&scheme.to_ascii_lowercase())
	}

	/// Resolves a request by passing it to the handler for its URL’s scheme.
	///
	/// A URL whose scheme has no handler resolves to [`Resolution::NotFound`].
	///
	/// # Errors
	/// This function returns [`Error::InvalidUrl`] if the request URL cannot be parsed.
	pub fn resolve(&self, request: &ResourceRequest) -> Result<Resolution, Error> {
		let url = url::Url::parse(&request.url)?;
		let resolution = match self.handlers.get(url.scheme()) {
			Some(handler) => handler.handle(request, &url),
			None => Resolution::NotFound,
		};
		tracing::trace!(
			url = %request.url,
			found = matches!(resolution, Resolution::Found(_)),
			"scheme request resolved"
		);
		Ok(resolution)
	}

	/// Removes every handler.
	pub fn shutdown(&mut self) {
		tracing::debug!(handlers = self.handlers.len(), "scheme registry shut down");
		self.handlers.clear();
	}
}

impl Debug for SchemeRegistry {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		let mut schemes: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
		schemes.sort_unstable();
		f.debug_struct("SchemeRegistry")
			.field("schemes", &schemes)
			.finish()
	}
}

/// A [`SchemeHandler`] serving resources from memory, keyed by host and path.
///
/// `MemoryHandler` is a cheap handle; clones share the same resources, so one clone can be
/// registered while another keeps adding and removing resources.
#[derive(Clone, Debug, Default)]
pub struct MemoryHandler {
	resources: Rc<RefCell<HashMap<(String, String), ResourceResponse>>>,
}

impl MemoryHandler {
	/// Constructs an empty handler.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces a resource.
	///
	/// The `host` is compared case-insensitively; the `path` exactly, without the query string.
	pub fn insert(
		&self,
		host: &str,
		path: &str,
		mime_type: impl Into<String>,
		data: impl Into<Rc<[u8]>>,
	) {
		let _ = self.resources.borrow_mut().insert(
			(host.to_ascii_lowercase(), path.to_owned()),
			ResourceResponse {
				mime_type: mime_type.into(),
				data: data.into(),
			},
		);
	}

	/// Removes a resource, returning whether it existed.
	pub fn remove(&self, host: &str, path: &str) -> bool {
		self.resources
			.borrow_mut()
			.remove(&(host.to_ascii_lowercase(), path.to_owned()))
			.is_some()
	}

	/// Removes every resource under a host, returning how many there were.
	pub fn remove_host(&self, host: &str) -> usize {
		let host = host.to_ascii_lowercase();
		let mut resources = self.resources.borrow_mut();
		let before = resources.len();
		resources.retain(|(h, _), _| *h != host);
		before - resources.len()
	}
}

impl SchemeHandler for MemoryHandler {
	fn handle(&self, _request: &ResourceRequest, url: &url::Url) -> Resolution {
		let host = match url.host_str() {
			Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
			_ => return Resolution::NotFound,
		};
		match self
			.resources
			.borrow()
			.get(&(host, url.path().to_owned()))
		{
			Some(resource) => Resolution::Found(resource.clone()),
			None => Resolution::NotFound,
		}
	}
}
