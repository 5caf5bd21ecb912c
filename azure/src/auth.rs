use anyhow::Context;

pub enum Auth {
	ManagedIdentity {
		endpoint: String,

		/// Set for the App Service flavor of managed identity (`MSI_SECRET`). The VM metadata endpoint takes no secret.
		secret: Option<http_common::HeaderValue>,
	},

	ServicePrincipal {
		authority_url: String,
		client_id: String,
		client_secret: String,
		tenant_id: String,
	},
}

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

impl Auth {
	/// The managed identity of the machine the task runs on.
	///
	/// Uses `MSI_ENDPOINT` and `MSI_SECRET` if they are set, otherwise the VM instance metadata endpoint.
	pub fn managed_identity_from_env() -> anyhow::Result<Self> {
		if let (Ok(endpoint), Ok(secret)) = (std::env::var("MSI_ENDPOINT"), std::env::var("MSI_SECRET")) {
			let secret: http_common::HeaderValue = secret.try_into().context("could not parse MSI_SECRET as HeaderValue")?;
			return Ok(Auth::ManagedIdentity {
				endpoint,
				secret: Some(secret),
			});
		}

		Ok(Auth::ManagedIdentity {
			endpoint: IMDS_ENDPOINT.to_owned(),
			secret: None,
		})
	}

	async fn get_authorization(&self, transport: &dyn http_common::Transport, resource: &str) -> anyhow::Result<http_common::HeaderValue> {
		#[derive(serde::Deserialize)]
		struct Response {
			access_token: String,
			token_type: String,
		}

		let req = match self {
			Auth::ManagedIdentity { endpoint, secret } => {
				let api_version = if secret.is_some() { "2017-09-01" } else { "2018-02-01" };
				let query =
					form_urlencoded::Serializer::new(String::new())
					.append_pair("resource", resource)
					.append_pair("api-version", api_version)
					.finish();
				let uri: http_common::Uri = format!("{endpoint}?{query}").try_into().context("could not construct authorization request URI")?;

				let mut req = http_common::Request::new(http_common::Method::GET, uri);
				match secret {
					Some(secret) => { req.headers.insert(http_common::HeaderName::from_static("secret"), secret.clone()); },
					None => { req.headers.insert(http_common::HeaderName::from_static("metadata"), http_common::HeaderValue::from_static("true")); },
				}
				req
			},

			Auth::ServicePrincipal { authority_url, client_id, client_secret, tenant_id } => {
				let body =
					form_urlencoded::Serializer::new(String::new())
					.append_pair("grant_type", "client_credentials")
					.append_pair("client_id", client_id)
					.append_pair("client_secret", client_secret)
					.append_pair("resource", resource)
					.finish();
				let uri: http_common::Uri =
					format!("{}/{tenant_id}/oauth2/token", authority_url.trim_end_matches('/'))
					.try_into().context("could not construct authorization request URI")?;

				let mut req = http_common::Request::new(http_common::Method::POST, uri);
				req.headers.insert(http_common::CONTENT_TYPE, http_common::HeaderValue::from_static("application/x-www-form-urlencoded"));
				req.body = Some(body.into());
				req
			},
		};

		let res = transport.send(req).await.context("could not get authorization")?;
		if res.status != http_common::StatusCode::OK || !res.is_json() {
			anyhow::bail!(
				"could not get authorization: token endpoint returned {}: {}",
				res.status,
				String::from_utf8_lossy(&res.body),
			);
		}

		let Response { access_token, token_type } = serde_json::from_slice(&res.body).context("could not parse token response")?;

		let header_value: http_common::HeaderValue = format!("{token_type} {access_token}").try_into().context("could not parse token as HeaderValue")?;
		Ok(header_value)
	}
}

/// Produces the `Authorization` header value for API requests.
pub trait TokenProvider {
	/// Returns the cached token, or fetches a new one if there is none or `force_refresh` is set.
	fn token(&self, force_refresh: bool) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<http_common::HeaderValue>> + '_>>;
}

pub struct Credentials<'a> {
	auth: &'a Auth,
	resource: String,
	transport: &'a dyn http_common::Transport,
	cached: tokio::sync::Mutex<Option<http_common::HeaderValue>>,
	logger: &'a log2::Logger,
}

impl<'a> Credentials<'a> {
	pub fn new(
		auth: &'a Auth,
		resource: String,
		transport: &'a dyn http_common::Transport,
		logger: &'a log2::Logger,
	) -> Self {
		Credentials {
			auth,
			resource,
			transport,
			cached: Default::default(),
			logger,
		}
	}
}

impl TokenProvider for Credentials<'_> {
	fn token(&self, force_refresh: bool) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<http_common::HeaderValue>> + '_>> {
		Box::pin(async move {
			// Held across the fetch so that concurrent callers share one token request.
			let mut cached = self.cached.lock().await;

			if !force_refresh {
				if let Some(authorization) = &*cached {
					return Ok(authorization.clone());
				}
			}

			let log2::Secret(authorization) =
				self.logger.report_operation("azure/authorization", &self.resource, <log2::ScopedObjectOperation<'_>>::Get, async {
					let authorization = self.auth.get_authorization(self.transport, &self.resource).await?;
					Ok::<_, anyhow::Error>(log2::Secret(authorization))
				}).await?;

			*cached = Some(authorization.clone());
			Ok(authorization)
		})
	}
}

#[cfg(test)]
mod tests {
	use http_common::fake::{json_response, text_response, FakeTransport};

	use super::TokenProvider;

	fn service_principal() -> super::Auth {
		super::Auth::ServicePrincipal {
			authority_url: "https://login.windows.net/".to_owned(),
			client_id: "client".to_owned(),
			client_secret: "s3cr=t&".to_owned(),
			tenant_id: "tenant".to_owned(),
		}
	}

	#[tokio::test]
	async fn caches_until_forced() {
		let issued = std::rc::Rc::new(std::cell::Cell::new(0_u32));
		let transport = FakeTransport::new({
			let issued = issued.clone();
			move |_: &http_common::Request| {
				issued.set(issued.get() + 1);
				Ok(json_response(200, &serde_json::json!({
					"access_token": format!("token{}", issued.get()),
					"token_type": "Bearer",
				})))
			}
		});
		let auth = service_principal();
		let logger = log2::Logger::new(None);
		let credentials = super::Credentials::new(&auth, "https://management.azure.com/".to_owned(), &transport, &logger);

		assert_eq!(credentials.token(false).await.unwrap(), "Bearer token1");
		assert_eq!(credentials.token(false).await.unwrap(), "Bearer token1");
		assert_eq!(credentials.token(true).await.unwrap(), "Bearer token2");
		assert_eq!(credentials.token(false).await.unwrap(), "Bearer token2");
		assert_eq!(issued.get(), 2);

		let requests = transport.requests();
		assert_eq!(requests[0].method, http_common::Method::POST);
		assert_eq!(requests[0].uri, "https://login.windows.net/tenant/oauth2/token");
		let body = std::str::from_utf8(requests[0].body.as_deref().unwrap()).unwrap();
		assert!(body.contains("grant_type=client_credentials"));
		assert!(body.contains("client_secret=s3cr%3Dt%26"));
		assert!(body.contains("resource=https%3A%2F%2Fmanagement.azure.com%2F"));
	}

	#[tokio::test]
	async fn token_endpoint_failure_is_an_error() {
		let transport = FakeTransport::new(|_| Ok(text_response(401, "AADSTS7000215: Invalid client secret")));
		let auth = service_principal();
		let logger = log2::Logger::new(None);
		let credentials = super::Credentials::new(&auth, "https://management.azure.com/".to_owned(), &transport, &logger);

		let err = credentials.token(false).await.unwrap_err();
		assert!(format!("{err:?}").contains("AADSTS7000215"));
	}

	#[tokio::test]
	async fn managed_identity_uses_metadata_header() {
		let transport = FakeTransport::new(|_| Ok(json_response(200, &serde_json::json!({
			"access_token": "abc",
			"token_type": "Bearer",
		}))));
		let auth = super::Auth::ManagedIdentity { endpoint: super::IMDS_ENDPOINT.to_owned(), secret: None };
		let logger = log2::Logger::new(None);
		let credentials = super::Credentials::new(&auth, "https://management.azure.com/".to_owned(), &transport, &logger);

		assert_eq!(credentials.token(false).await.unwrap(), "Bearer abc");

		let requests = transport.requests();
		assert_eq!(requests[0].method, http_common::Method::GET);
		assert_eq!(requests[0].headers["metadata"], "true");
		assert_eq!(requests[0].uri.query(), Some("resource=https%3A%2F%2Fmanagement.azure.com%2F&api-version=2018-02-01"));
	}
}
