use anyhow::Context;

pub use http::uri::{
	Authority as UriAuthority,
	Parts as UriParts,
	Scheme as UriScheme,
};

pub use hyper::{
	Method,
	StatusCode,
	Uri,
	body::Bytes,
	header::{
		AUTHORIZATION,
		CONTENT_LENGTH,
		CONTENT_TYPE,
		HeaderMap,
		HeaderName,
		HeaderValue,
	},
};

#[cfg(feature = "fake")]
pub mod fake;

/// An HTTP request as the API clients see it. The body, if any, is sent as-is.
#[derive(Clone, Debug)]
pub struct Request {
	pub method: Method,
	pub uri: Uri,
	pub headers: HeaderMap,
	pub body: Option<Bytes>,
}

impl Request {
	pub fn new(method: Method, uri: Uri) -> Self {
		Request {
			method,
			uri,
			headers: Default::default(),
			body: None,
		}
	}
}

/// A fully-read HTTP response.
#[derive(Clone, Debug)]
pub struct Response {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: Bytes,
}

impl Response {
	pub fn is_json(&self) -> bool {
		self.headers.get(CONTENT_TYPE)
			.and_then(|content_type| content_type.to_str().ok())
			.is_some_and(|content_type| content_type == "application/json" || content_type.starts_with("application/json;"))
	}
}

/// Sends a request and reads the whole response.
///
/// Implementations are not required to be `Send`; everything runs on a single-threaded runtime.
pub trait Transport {
	fn send(&self, req: Request) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<Response>> + '_>>;
}

pub struct Client {
	inner: hyper_util::client::legacy::Client<
		hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
		http_body_util::Full<Bytes>,
	>,
	user_agent: HeaderValue,
}

impl Client {
	pub fn new(user_agent: HeaderValue) -> anyhow::Result<Self> {
		let connector =
			hyper_rustls::HttpsConnectorBuilder::new()
			.with_webpki_roots()
			.https_or_http()
			.enable_http1()
			.build();

		let inner = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new()).build(connector);

		Ok(Client {
			inner,
			user_agent,
		})
	}
}

impl Transport for Client {
	fn send(&self, req: Request) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<Response>> + '_>> {
		Box::pin(async move {
			let Request { method, uri, mut headers, body } = req;

			if body.is_none() && method != Method::GET && method != Method::HEAD {
				headers.insert(CONTENT_LENGTH, 0.into());
			}
			headers.insert(hyper::header::USER_AGENT, self.user_agent.clone());

			let mut req = hyper::Request::new(http_body_util::Full::new(body.unwrap_or_default()));
			*req.method_mut() = method;
			*req.uri_mut() = uri;
			*req.headers_mut() = headers;

			let res = self.inner.request(req).await.context("could not execute request")?;

			let (http::response::Parts { status, headers, .. }, body) = res.into_parts();

			let body =
				http_body_util::BodyExt::collect(body).await
				.context("could not read response body")?
				.to_bytes();

			Ok(Response {
				status,
				headers,
				body,
			})
		})
	}
}
