use anyhow::Context;

pub mod compute;

pub mod network;

pub mod resources;

/// A reference to another resource by ID.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SubResource {
	pub id: String,
}

pub struct Client<'a> {
	subscription_id: &'a str,
	scheme: http_common::UriScheme,
	authority: http_common::UriAuthority,

	tokens: &'a dyn crate::TokenProvider,
	transport: &'a dyn http_common::Transport,
	poll_policy: crate::lro::PollPolicy,
	logger: &'a log2::Logger,
}

impl<'a> Client<'a> {
	pub fn new(
		subscription_id: &'a str,
		tokens: &'a dyn crate::TokenProvider,
		transport: &'a dyn http_common::Transport,
		logger: &'a log2::Logger,
	) -> Self {
		Client {
			subscription_id,
			scheme: http_common::UriScheme::HTTPS,
			authority: http_common::UriAuthority::from_static("management.azure.com"),

			tokens,
			transport,
			poll_policy: Default::default(),
			logger,
		}
	}

	/// Sends requests to the given ARM endpoint, such as an Azure Stack or sovereign cloud one, instead of the public cloud.
	pub fn with_base_url(mut self, base_url: &str) -> anyhow::Result<Self> {
		let base_url: http_common::Uri = base_url.parse().context("could not parse ARM base URL")?;
		let http_common::UriParts { scheme, authority, .. } = base_url.into_parts();
		self.scheme = scheme.context("ARM base URL has no scheme")?;
		self.authority = authority.context("ARM base URL has no host")?;
		Ok(self)
	}

	#[must_use]
	pub fn with_poll_policy(mut self, poll_policy: crate::lro::PollPolicy) -> Self {
		self.poll_policy = poll_policy;
		self
	}

	pub fn poll_policy(&self) -> &crate::lro::PollPolicy {
		&self.poll_policy
	}

	/// Sends an authenticated request.
	///
	/// HTTP failures are returned in the response's `error`. If the token has expired, it is refreshed
	/// and the request is retried once.
	pub async fn send(
		&self,
		method: http_common::Method,
		uri: http_common::Uri,
		body: Option<http_common::Bytes>,
	) -> anyhow::Result<crate::Response> {
		let mut authorization = self.tokens.token(false).await.context("could not get API authorization")?;
		let mut refreshed = false;

		loop {
			let mut req = http_common::Request::new(method.clone(), uri.clone());
			req.headers.insert(http_common::AUTHORIZATION, authorization.clone());
			req.headers.insert(http_common::CONTENT_TYPE, crate::APPLICATION_JSON);
			req.body = body.clone();

			let res = match self.transport.send(req).await {
				Ok(res) => crate::Response::new(res),

				Err(err) => {
					if is_certificate_error(&err) {
						self.logger.report_warning(format_args!(
							"could not verify the TLS certificate of {}; if the agent reaches it through a TLS-intercepting proxy, bypass the proxy for this host",
							self.authority,
						));
					}

					return Err(err.context(format!("could not execute {method} {uri}")));
				},
			};

			if let Some(correlation_id) = res.header_str("x-ms-correlation-request-id") {
				log::debug!("correlation ID from ARM API call response: {correlation_id}");
			}

			if
				!refreshed &&
				res.status == http_common::StatusCode::UNAUTHORIZED &&
				res.error.as_ref().and_then(crate::ApiError::code) == Some("ExpiredAuthenticationToken")
			{
				authorization = self.tokens.token(true).await.context("could not refresh API authorization")?;
				refreshed = true;
				continue;
			}

			return Ok(res);
		}
	}

	fn make_uri(
		&self,
		path: std::fmt::Arguments<'_>,
		query: &[(&str, &str)],
		api_version: &str,
	) -> anyhow::Result<http_common::Uri> {
		validate_name("subscription ID", self.subscription_id)?;

		let query: Vec<_> =
			query.iter()
			.map(|&(name, value)| format!("{name}={}", Segment(value)))
			.chain(std::iter::once(format!("api-version={}", Segment(api_version))))
			.collect();

		let mut url: http_common::UriParts = Default::default();
		url.scheme = Some(self.scheme.clone());
		url.authority = Some(self.authority.clone());
		url.path_and_query = Some(
			format!("/subscriptions/{}{path}?{}", Segment(self.subscription_id), query.join("&"))
			.try_into().context("could not parse request URL")?,
		);
		let url = http_common::Uri::from_parts(url).context("could not parse request URL")?;
		Ok(url)
	}

	async fn get<T>(&self, uri: http_common::Uri) -> anyhow::Result<T> where T: serde::de::DeserializeOwned {
		let res = self.send(http_common::Method::GET, uri, None).await?.into_result()?;
		res.json()
	}

	/// Gets every page of a `{ "value": [...], "nextLink": ... }` list.
	async fn list<T>(&self, uri: http_common::Uri) -> anyhow::Result<Vec<T>> where T: serde::de::DeserializeOwned {
		#[derive(serde::Deserialize)]
		struct Page<T> {
			#[serde(default = "Vec::new")]
			value: Vec<T>,

			#[serde(rename = "nextLink")]
			next_link: Option<String>,
		}

		let mut result = vec![];

		let mut next = Some(uri);
		while let Some(uri) = next {
			let Page { value, next_link } = self.get(uri).await?;
			result.extend(value);

			next =
				next_link
				.filter(|next_link| !next_link.is_empty())
				.map(|next_link| next_link.parse())
				.transpose()
				.context("could not parse nextLink")?;
		}

		Ok(result)
	}

	/// Sends a mutating request and waits for the long-running operation it starts, if any.
	///
	/// A success response without an operation header is the final result. A PUT that finishes asynchronously
	/// returns the resource as it is after the operation.
	async fn complete(
		&self,
		method: http_common::Method,
		uri: http_common::Uri,
		body: Option<http_common::Bytes>,
	) -> anyhow::Result<crate::Response> {
		let is_put = method == http_common::Method::PUT;

		let res = self.send(method, uri.clone(), body).await?.into_result()?;

		let Some(operation) = crate::lro::Operation::detect(&res)? else {
			if res.status == http_common::StatusCode::ACCEPTED {
				return Err(crate::lro::PollError::InvalidResponse.into());
			}

			return Ok(res);
		};

		let res = crate::lro::poll(self, &operation).await?.into_result()?;

		if let crate::lro::Operation::AsyncOperation(_) = operation {
			match res.body_status() {
				Some("Succeeded") => (),
				status => return Err(crate::ApiError::from_operation(res.status, &res.body, status.unwrap_or("unknown")).into()),
			}

			if is_put {
				let res = self.send(http_common::Method::GET, uri, None).await?.into_result()?;
				return Ok(res);
			}
		}

		Ok(res)
	}
}

fn json_body<T>(value: &T) -> anyhow::Result<http_common::Bytes> where T: serde::Serialize {
	let body = serde_json::to_vec(value).context("could not serialize request body")?;
	Ok(body.into())
}

fn validate_name(kind: &str, name: &str) -> anyhow::Result<()> {
	if name.trim().is_empty() {
		anyhow::bail!("{kind} cannot be empty");
	}

	Ok(())
}

fn validate_resource_group_name(name: &str) -> anyhow::Result<()> {
	validate_name("resource group name", name)?;

	if name.chars().count() > 90 {
		anyhow::bail!("resource group name {name:?} is longer than 90 characters");
	}

	if !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')')) {
		anyhow::bail!("resource group name {name:?} can only contain alphanumeric characters, '-', '_', '.', '(' and ')'");
	}

	Ok(())
}

fn is_certificate_error(err: &anyhow::Error) -> bool {
	err.chain().any(|err| {
		let err = err.to_string();
		err.contains("certificate") || err.contains("UnknownIssuer") || err.contains("NotValidForName")
	})
}

/// Same as JavaScript's `encodeURIComponent`
const COMPONENT: &percent_encoding::AsciiSet =
	&percent_encoding::NON_ALPHANUMERIC
	.remove(b'-')
	.remove(b'_')
	.remove(b'.')
	.remove(b'!')
	.remove(b'~')
	.remove(b'*')
	.remove(b'\'')
	.remove(b'(')
	.remove(b')');

/// Percent-encodes a path segment or query value.
struct Segment<'a>(&'a str);

impl std::fmt::Display for Segment<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Display::fmt(&percent_encoding::utf8_percent_encode(self.0, COMPONENT), f)
	}
}
