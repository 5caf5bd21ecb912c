//! An in-memory [`Transport`](crate::Transport) that answers requests with a caller-supplied function
//! and records every request it receives.

pub struct FakeTransport {
	handler: Box<dyn Fn(&crate::Request) -> anyhow::Result<crate::Response>>,
	requests: std::cell::RefCell<Vec<crate::Request>>,
}

impl FakeTransport {
	pub fn new(handler: impl Fn(&crate::Request) -> anyhow::Result<crate::Response> + 'static) -> Self {
		FakeTransport {
			handler: Box::new(handler),
			requests: Default::default(),
		}
	}

	pub fn requests(&self) -> Vec<crate::Request> {
		self.requests.borrow().clone()
	}

	/// The `(method, path)` of every request received so far, in order.
	pub fn calls(&self) -> Vec<(crate::Method, String)> {
		self.requests.borrow().iter()
			.map(|req| (req.method.clone(), req.uri.path().to_owned()))
			.collect()
	}
}

impl crate::Transport for FakeTransport {
	fn send(&self, req: crate::Request) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<crate::Response>> + '_>> {
		let res = (self.handler)(&req);
		self.requests.borrow_mut().push(req);
		Box::pin(std::future::ready(res))
	}
}

pub fn json_response(status: u16, body: &serde_json::Value) -> crate::Response {
	let mut headers = crate::HeaderMap::new();
	headers.insert(crate::CONTENT_TYPE, crate::HeaderValue::from_static("application/json; charset=utf-8"));
	crate::Response {
		status: crate::StatusCode::from_u16(status).expect("valid status code"),
		headers,
		body: serde_json::to_vec(body).expect("serializable").into(),
	}
}

pub fn text_response(status: u16, body: &'static str) -> crate::Response {
	let mut headers = crate::HeaderMap::new();
	headers.insert(crate::CONTENT_TYPE, crate::HeaderValue::from_static("text/plain"));
	crate::Response {
		status: crate::StatusCode::from_u16(status).expect("valid status code"),
		headers,
		body: crate::Bytes::from_static(body.as_bytes()),
	}
}

pub fn empty_response(status: u16) -> crate::Response {
	crate::Response {
		status: crate::StatusCode::from_u16(status).expect("valid status code"),
		headers: Default::default(),
		body: Default::default(),
	}
}

pub fn with_header(mut res: crate::Response, name: &'static str, value: &str) -> crate::Response {
	res.headers.insert(
		crate::HeaderName::from_static(name),
		value.parse().expect("valid header value"),
	);
	res
}
