/// An ARM API call that did not succeed.
#[derive(Clone, Debug)]
pub struct ApiError {
	pub status: http_common::StatusCode,
	pub kind: ApiErrorKind,
}

#[derive(Clone, Debug)]
pub enum ApiErrorKind {
	/// The service returned an error, described by its `{ "error": { "code", "message", "details" } }` body if it had one.
	Api {
		code: Option<String>,
		message: String,
		details: Vec<serde_json::Value>,
	},

	/// The response body was not JSON.
	Deserialization {
		body: String,
		parse_error: String,
	},
}

#[derive(serde::Deserialize)]
struct ErrorBody {
	code: Option<String>,
	message: Option<String>,
	#[serde(default)]
	details: Vec<serde_json::Value>,
}

impl ApiError {
	pub fn code(&self) -> Option<&str> {
		match &self.kind {
			ApiErrorKind::Api { code, .. } => code.as_deref(),
			ApiErrorKind::Deserialization { .. } => None,
		}
	}

	pub(crate) fn from_body(status: http_common::StatusCode, body: &crate::Body) -> Self {
		Self::from_body_or(status, body, || format!("request failed with status {status}"))
	}

	/// The error of a long-running operation that finished with `operation_status` instead of `Succeeded`.
	pub(crate) fn from_operation(status: http_common::StatusCode, body: &crate::Body, operation_status: &str) -> Self {
		Self::from_body_or(status, body, || format!("long-running operation finished with status {operation_status}"))
	}

	fn from_body_or(status: http_common::StatusCode, body: &crate::Body, generic_message: impl FnOnce() -> String) -> Self {
		let kind = match body {
			crate::Body::Json(value) => {
				let error_body =
					value.get("error")
					.and_then(|error| <ErrorBody as serde::Deserialize>::deserialize(error).ok());
				match error_body {
					Some(ErrorBody { code, message, details }) => ApiErrorKind::Api {
						code,
						message: message.unwrap_or_else(generic_message),
						details,
					},

					None => ApiErrorKind::Api {
						code: None,
						message: generic_message(),
						details: vec![],
					},
				}
			},

			crate::Body::Raw(text) => ApiErrorKind::Deserialization {
				body: text.clone(),
				parse_error:
					serde_json::from_str::<serde_json::Value>(text)
					.err()
					.map(|err| err.to_string())
					.unwrap_or_default(),
			},

			crate::Body::Empty => ApiErrorKind::Api {
				code: None,
				message: generic_message(),
				details: vec![],
			},
		};

		ApiError { status, kind }
	}
}

impl std::fmt::Display for ApiError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.kind {
			ApiErrorKind::Api { code: Some(code), message, .. } => write!(f, "{code} - {message}")?,
			ApiErrorKind::Api { code: None, message, .. } => f.write_str(message)?,
			ApiErrorKind::Deserialization { body, parse_error } => write!(f, "could not parse response body ({parse_error}): {body}")?,
		}

		write!(f, " (CODE: {})", self.status.as_u16())
	}
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
	#[test]
	fn structured_error() {
		let body = crate::Body::Json(serde_json::json!({
			"error": {
				"code": "ResourceGroupNotFound",
				"message": "Resource group 'rg' could not be found.",
			},
		}));
		let err = super::ApiError::from_body(http_common::StatusCode::NOT_FOUND, &body);
		assert_eq!(err.code(), Some("ResourceGroupNotFound"));
		assert_eq!(err.to_string(), "ResourceGroupNotFound - Resource group 'rg' could not be found. (CODE: 404)");
	}

	#[test]
	fn generic_error_without_error_body() {
		let err = super::ApiError::from_body(http_common::StatusCode::BAD_GATEWAY, &crate::Body::Empty);
		assert_eq!(err.code(), None);
		assert_eq!(err.to_string(), "request failed with status 502 Bad Gateway (CODE: 502)");
	}

	#[test]
	fn unparseable_body() {
		let body = crate::Body::Raw("<html>Service Unavailable</html>".to_owned());
		let err = super::ApiError::from_body(http_common::StatusCode::SERVICE_UNAVAILABLE, &body);
		let super::ApiErrorKind::Deserialization { body, parse_error } = &err.kind else { panic!("{err:?}") };
		assert_eq!(body, "<html>Service Unavailable</html>");
		assert!(!parse_error.is_empty());
	}
}
