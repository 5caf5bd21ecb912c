use anyhow::Context;

#[derive(Clone, Debug)]
pub enum Body {
	Empty,
	Json(serde_json::Value),

	/// The body could not be parsed as JSON.
	Raw(String),
}

/// An ARM response. Every non-2xx response carries an `error`.
#[derive(Clone, Debug)]
pub struct Response {
	pub status: http_common::StatusCode,
	pub headers: http_common::HeaderMap,
	pub body: Body,
	pub error: Option<crate::ApiError>,
}

impl Response {
	pub(crate) fn new(res: http_common::Response) -> Self {
		let http_common::Response { status, headers, body } = res;

		let body =
			if body.is_empty() {
				Body::Empty
			}
			else {
				match serde_json::from_slice(&body) {
					Ok(value) => Body::Json(value),
					Err(_) => Body::Raw(String::from_utf8_lossy(&body).into_owned()),
				}
			};

		let error = (!status.is_success()).then(|| crate::ApiError::from_body(status, &body));

		Response {
			status,
			headers,
			body,
			error,
		}
	}

	pub fn header_str(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// The `status` field of a JSON body, as returned by long-running operation status endpoints.
	pub fn body_status(&self) -> Option<&str> {
		match &self.body {
			Body::Json(value) => value.get("status").and_then(serde_json::Value::as_str),
			Body::Empty | Body::Raw(_) => None,
		}
	}

	pub fn json<T>(&self) -> anyhow::Result<T> where T: serde::de::DeserializeOwned {
		match &self.body {
			Body::Json(value) => T::deserialize(value).context("could not deserialize response body"),
			Body::Raw(text) => Err(anyhow::anyhow!("response body is not JSON: {text}")),
			Body::Empty => Err(anyhow::anyhow!("response body is empty")),
		}
	}

	/// Converts a failed response into its error.
	pub fn into_result(mut self) -> Result<Self, crate::ApiError> {
		match self.error.take() {
			Some(err) => Err(err),
			None => Ok(self),
		}
	}
}

#[cfg(test)]
mod tests {
	#[test]
	fn non_success_always_has_error() {
		let res = super::Response::new(http_common::fake::text_response(500, "oops"));
		assert!(matches!(res.body, super::Body::Raw(ref text) if text == "oops"));
		assert!(matches!(res.error, Some(crate::ApiError { kind: crate::ApiErrorKind::Deserialization { .. }, .. })));

		let res = super::Response::new(http_common::fake::empty_response(204));
		assert!(matches!(res.body, super::Body::Empty));
		assert!(res.error.is_none());
	}
}
