use std::collections::BTreeMap;

/// A service connection, as exposed to the task by the agent.
#[derive(Debug)]
pub struct Endpoint {
	pub id: String,
	pub url: String,
	pub auth_scheme: Option<String>,
	auth_parameters: BTreeMap<String, log2::Secret<String>>,
	data: BTreeMap<String, String>,
}

const DEFAULT_AUTHORITY_URL: &str = "https://login.windows.net/";

impl Endpoint {
	pub fn from_env(id: &str) -> anyhow::Result<Self> {
		Self::from_vars(id, std::env::vars())
	}

	fn from_vars(id: &str, vars: impl IntoIterator<Item = (String, String)>) -> anyhow::Result<Self> {
		let key = id.to_ascii_uppercase();
		let url_name = format!("ENDPOINT_URL_{key}");
		let auth_scheme_name = format!("ENDPOINT_AUTH_SCHEME_{key}");
		let auth_parameter_prefix = format!("ENDPOINT_AUTH_PARAMETER_{key}_");
		let data_prefix = format!("ENDPOINT_DATA_{key}_");

		let mut url = None;
		let mut auth_scheme = None;
		let mut auth_parameters = BTreeMap::new();
		let mut data = BTreeMap::new();

		for (name, value) in vars {
			if name == url_name {
				url = Some(value);
			}
			else if name == auth_scheme_name {
				auth_scheme = Some(value);
			}
			else if let Some(parameter) = name.strip_prefix(&auth_parameter_prefix) {
				auth_parameters.insert(parameter.to_ascii_lowercase(), log2::Secret(value));
			}
			else if let Some(parameter) = name.strip_prefix(&data_prefix) {
				data.insert(parameter.to_ascii_lowercase(), value);
			}
		}

		let url = url.ok_or_else(|| anyhow::anyhow!("service connection {id} has no URL; {url_name} is not set"))?;

		Ok(Endpoint {
			id: id.to_owned(),
			url,
			auth_scheme,
			auth_parameters,
			data,
		})
	}

	pub fn auth_parameter(&self, key: &str) -> anyhow::Result<&str> {
		match self.auth_parameters.get(&key.to_ascii_lowercase()) {
			Some(log2::Secret(value)) if !value.is_empty() => Ok(value),
			_ => Err(anyhow::anyhow!("service connection {} has no {key} authorization parameter", self.id)),
		}
	}

	pub fn data(&self, key: &str) -> Option<&str> {
		self.data.get(&key.to_ascii_lowercase()).map(String::as_str).filter(|value| !value.is_empty())
	}

	/// The ID of the subscription that the service connection is scoped to.
	pub fn subscription_id(&self) -> anyhow::Result<&str> {
		self.data("subscriptionId").ok_or_else(|| anyhow::anyhow!("service connection {} has no subscription ID", self.id))
	}

	/// The credentials of the service connection.
	///
	/// The `ManagedServiceIdentity` scheme uses the identity of the machine the agent runs on.
	/// Every other scheme is treated as a service principal with a client secret.
	pub fn azure_auth(&self) -> anyhow::Result<azure::Auth> {
		if self.auth_scheme.as_deref().is_some_and(|scheme| scheme.eq_ignore_ascii_case("ManagedServiceIdentity")) {
			return azure::Auth::managed_identity_from_env();
		}

		Ok(azure::Auth::ServicePrincipal {
			authority_url: self.data("environmentAuthorityUrl").unwrap_or(DEFAULT_AUTHORITY_URL).to_owned(),
			client_id: self.auth_parameter("servicePrincipalId")?.to_owned(),
			client_secret: self.auth_parameter("servicePrincipalKey")?.to_owned(),
			tenant_id: self.auth_parameter("tenantId")?.to_owned(),
		})
	}
}

#[cfg(test)]
mod tests {
	fn vars(vars: &[(&str, &str)]) -> Vec<(String, String)> {
		vars.iter().map(|&(name, value)| (name.to_owned(), value.to_owned())).collect()
	}

	#[test]
	fn service_principal() {
		let endpoint = super::Endpoint::from_vars("conn1", vars(&[
			("ENDPOINT_URL_CONN1", "https://management.azure.com/"),
			("ENDPOINT_AUTH_SCHEME_CONN1", "ServicePrincipal"),
			("ENDPOINT_AUTH_PARAMETER_CONN1_SERVICEPRINCIPALID", "client"),
			("ENDPOINT_AUTH_PARAMETER_CONN1_SERVICEPRINCIPALKEY", "secret"),
			("ENDPOINT_AUTH_PARAMETER_CONN1_TENANTID", "tenant"),
			("ENDPOINT_DATA_CONN1_SUBSCRIPTIONID", "sub"),
			("ENDPOINT_URL_CONN2", "https://example.org/"),
		])).unwrap();

		assert_eq!(endpoint.url, "https://management.azure.com/");
		assert_eq!(endpoint.subscription_id().unwrap(), "sub");
		assert!(!format!("{endpoint:?}").contains("secret"));

		let azure::Auth::ServicePrincipal { authority_url, client_id, client_secret, tenant_id } = endpoint.azure_auth().unwrap() else {
			panic!("expected service principal");
		};
		assert_eq!(authority_url, "https://login.windows.net/");
		assert_eq!(client_id, "client");
		assert_eq!(client_secret, "secret");
		assert_eq!(tenant_id, "tenant");
	}

	#[test]
	fn missing_parameters() {
		let err = super::Endpoint::from_vars("conn1", vars(&[])).unwrap_err();
		assert!(err.to_string().contains("ENDPOINT_URL_CONN1"), "{err}");

		let endpoint = super::Endpoint::from_vars("conn1", vars(&[
			("ENDPOINT_URL_CONN1", "https://management.azure.com/"),
			("ENDPOINT_AUTH_PARAMETER_CONN1_SERVICEPRINCIPALID", "client"),
			("ENDPOINT_AUTH_PARAMETER_CONN1_TENANTID", ""),
		])).unwrap();
		assert!(endpoint.subscription_id().is_err());
		let Err(err) = endpoint.azure_auth() else { panic!("expected an error") };
		assert!(err.to_string().contains("servicePrincipalKey"), "{err}");
	}

	#[test]
	fn managed_identity() {
		let endpoint = super::Endpoint::from_vars("conn1", vars(&[
			("ENDPOINT_URL_CONN1", "https://management.azure.com/"),
			("ENDPOINT_AUTH_SCHEME_CONN1", "ManagedServiceIdentity"),
		])).unwrap();
		assert!(matches!(endpoint.azure_auth().unwrap(), azure::Auth::ManagedIdentity { .. }));
	}
}
