use super::Segment;

const API_VERSION: &str = "2016-07-01";

#[derive(Clone, Debug, serde::Deserialize)]
pub struct ResourceGroup {
	pub id: String,
	pub name: String,
	pub location: String,

	#[serde(default)]
	pub properties: ResourceGroupProperties,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct ResourceGroupProperties {
	#[serde(rename = "provisioningState")]
	pub provisioning_state: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct Deployment {
	pub properties: DeploymentProperties,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct DeploymentProperties {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub template: Option<serde_json::Value>,

	#[serde(rename = "templateLink", skip_serializing_if = "Option::is_none")]
	pub template_link: Option<TemplateLink>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<serde_json::Map<String, serde_json::Value>>,

	#[serde(rename = "parametersLink", skip_serializing_if = "Option::is_none")]
	pub parameters_link: Option<TemplateLink>,

	pub mode: DeploymentMode,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct TemplateLink {
	pub uri: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum DeploymentMode {
	Incremental,
	Complete,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct DeploymentExtended {
	pub id: String,
	pub name: String,

	#[serde(default)]
	pub properties: DeploymentPropertiesExtended,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct DeploymentPropertiesExtended {
	#[serde(rename = "provisioningState")]
	pub provisioning_state: Option<String>,

	#[serde(rename = "correlationId")]
	pub correlation_id: Option<String>,

	pub outputs: Option<serde_json::Value>,

	pub error: Option<ErrorDetail>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct ErrorDetail {
	pub code: Option<String>,
	pub message: Option<String>,

	#[serde(default)]
	pub details: Vec<ErrorDetail>,
}

impl std::fmt::Display for ErrorDetail {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match (&self.code, &self.message) {
			(Some(code), Some(message)) => write!(f, "{code} - {message}"),
			(Some(code), None) => f.write_str(code),
			(None, Some(message)) => f.write_str(message),
			(None, None) => f.write_str("unknown error"),
		}
	}
}

/// The result of validating a deployment. The template is valid if `error` is unset.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct DeploymentValidateResult {
	pub error: Option<ErrorDetail>,
	pub properties: Option<DeploymentPropertiesExtended>,
}

impl super::Client<'_> {
	pub async fn resource_group_check_existence(&self, resource_group_name: &str) -> anyhow::Result<bool> {
		self.logger.report_operation("azure/resources/resource_group", resource_group_name, <log2::ScopedObjectOperation<'_>>::Get, async {
			let uri = self.resource_group_uri(resource_group_name, format_args!(""))?;
			let res = self.send(http_common::Method::HEAD, uri, None).await?;
			match res.status {
				http_common::StatusCode::NO_CONTENT | http_common::StatusCode::OK => Ok(true),
				http_common::StatusCode::NOT_FOUND => Ok(false),
				_ => Err(res.into_result().err().map_or_else(|| anyhow::anyhow!("unexpected response"), Into::into)),
			}
		}).await
	}

	pub async fn resource_group_create_or_update(&self, resource_group_name: &str, location: &str) -> anyhow::Result<ResourceGroup> {
		#[derive(serde::Serialize)]
		struct Request<'a> {
			name: &'a str,
			location: &'a str,
		}

		self.logger.report_operation(
			"azure/resources/resource_group",
			resource_group_name,
			log2::ScopedObjectOperation::Create { value: format_args!("{location}") },
			async {
				super::validate_name("location", location)?;
				let uri = self.resource_group_uri(resource_group_name, format_args!(""))?;
				let body = super::json_body(&Request { name: resource_group_name, location })?;
				let res = self.complete(http_common::Method::PUT, uri, Some(body)).await?;
				res.json()
			},
		).await
	}

	pub async fn resource_group_delete(&self, resource_group_name: &str) -> anyhow::Result<()> {
		self.logger.report_operation("azure/resources/resource_group", resource_group_name, <log2::ScopedObjectOperation<'_>>::Delete, async {
			let uri = self.resource_group_uri(resource_group_name, format_args!(""))?;
			let _ = self.complete(http_common::Method::DELETE, uri, None).await?;
			Ok::<_, anyhow::Error>(())
		}).await
	}

	/// Validates the deployment without running it. Both a valid and an invalid template produce `Ok`.
	pub async fn deployment_validate(
		&self,
		resource_group_name: &str,
		deployment_name: &str,
		deployment: &Deployment,
	) -> anyhow::Result<DeploymentValidateResult> {
		self.logger.report_operation(
			"azure/resources/deployment",
			(resource_group_name, deployment_name),
			log2::ScopedObjectOperation::Action { name: "validate" },
			async {
				super::validate_name("deployment name", deployment_name)?;
				let uri = self.resource_group_uri(
					resource_group_name,
					format_args!("/providers/Microsoft.Resources/deployments/{}/validate", Segment(deployment_name)),
				)?;
				let res = self.send(http_common::Method::POST, uri, Some(super::json_body(deployment)?)).await?;
				match res.status {
					http_common::StatusCode::OK | http_common::StatusCode::BAD_REQUEST => res.json(),
					_ => Err(res.into_result().err().map_or_else(|| anyhow::anyhow!("unexpected response"), Into::into)),
				}
			},
		).await
	}

	/// Starts the deployment and waits for it to finish. Fails unless it finished with provisioning state `Succeeded`.
	pub async fn deployment_create_or_update(
		&self,
		resource_group_name: &str,
		deployment_name: &str,
		deployment: &Deployment,
	) -> anyhow::Result<DeploymentExtended> {
		self.logger.report_operation(
			"azure/resources/deployment",
			(resource_group_name, deployment_name),
			log2::ScopedObjectOperation::Create { value: format_args!("{:?}", deployment.properties.mode) },
			async {
				super::validate_name("deployment name", deployment_name)?;
				let uri = self.resource_group_uri(
					resource_group_name,
					format_args!("/providers/Microsoft.Resources/deployments/{}", Segment(deployment_name)),
				)?;
				let res = self.complete(http_common::Method::PUT, uri, Some(super::json_body(deployment)?)).await?;
				let result: DeploymentExtended = res.json()?;

				let state = result.properties.provisioning_state.as_deref().unwrap_or("unknown");
				if state == "Succeeded" {
					return Ok(result);
				}

				match &result.properties.error {
					Some(error) => Err(anyhow::anyhow!("deployment {deployment_name} finished with provisioning state {state}: {error}")),
					None => Err(anyhow::anyhow!("deployment {deployment_name} finished with provisioning state {state}")),
				}
			},
		).await
	}

	fn resource_group_uri(&self, resource_group_name: &str, rest: std::fmt::Arguments<'_>) -> anyhow::Result<http_common::Uri> {
		super::validate_resource_group_name(resource_group_name)?;

		self.make_uri(format_args!("/resourcegroups/{}{rest}", Segment(resource_group_name)), &[], API_VERSION)
	}
}
