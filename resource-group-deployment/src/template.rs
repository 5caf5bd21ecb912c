//! The ARM template deployment of a resource group.

use anyhow::Context;

use azure::management::resources::{Deployment, DeploymentProperties, TemplateLink};

use crate::{DeploymentMode, TemplateSource};

type Parameters = serde_json::Map<String, serde_json::Value>;

pub(crate) async fn deployment(
	source: &TemplateSource,
	override_parameters: &Parameters,
	mode: DeploymentMode,
	transport: &dyn http_common::Transport,
) -> anyhow::Result<Deployment> {
	let mode = match mode {
		DeploymentMode::Complete => azure::management::resources::DeploymentMode::Complete,
		DeploymentMode::Incremental | DeploymentMode::Validation => azure::management::resources::DeploymentMode::Incremental,
	};

	let properties = match source {
		TemplateSource::LinkedArtifact { template_file, parameters_file } => {
			let template = read_json(template_file).context("could not load template")?;

			let mut parameters = match parameters_file {
				Some(parameters_file) if !parameters_file.is_dir() =>
					parameters_of(read_json(parameters_file)?)
					.with_context(|| format!("could not load parameters from {}", parameters_file.display()))?,
				_ => Default::default(),
			};
			parameters.extend(override_parameters.clone());

			DeploymentProperties {
				template: Some(template),
				template_link: None,
				parameters: Some(parameters),
				parameters_link: None,
				mode,
			}
		},

		TemplateSource::Url { template_link, parameters_link } => {
			let (parameters, parameters_link) = match (parameters_link, override_parameters.is_empty()) {
				(Some(parameters_link), true) => (None, Some(TemplateLink { uri: parameters_link.clone() })),

				// ARM can't merge overrides into a linked parameters file, so download it and send the merged parameters inline.
				(Some(parameters_link), false) => {
					let mut parameters = download_parameters(transport, parameters_link).await?;
					parameters.extend(override_parameters.clone());
					(Some(parameters), None)
				},

				(None, true) => (None, None),

				(None, false) => (Some(override_parameters.clone()), None),
			};

			DeploymentProperties {
				template: None,
				template_link: Some(TemplateLink { uri: template_link.clone() }),
				parameters,
				parameters_link,
				mode,
			}
		},
	};

	Ok(Deployment { properties })
}

/// The template file's name without extensions, followed by the current UTC date and time.
pub(crate) fn deployment_name(source: &TemplateSource, now: time::OffsetDateTime) -> anyhow::Result<String> {
	let file_name = match source {
		TemplateSource::LinkedArtifact { template_file, .. } =>
			template_file.file_name().map(|file_name| file_name.to_string_lossy().into_owned()).unwrap_or_default(),

		TemplateSource::Url { template_link, .. } => {
			let path = template_link.split(['?', '#']).next().unwrap_or_default();
			path.rsplit('/').next().unwrap_or_default().to_owned()
		},
	};

	let stem = file_name.split('.').next().unwrap_or_default();
	let mut name: String =
		stem.chars()
		.filter(|&c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '(' | ')'))
		.take(48)
		.collect();
	if name.is_empty() {
		name.push_str("deployment");
	}

	let timestamp =
		now.to_offset(time::UtcOffset::UTC)
		.format(time::macros::format_description!("[year][month][day]-[hour][minute][second]"))
		.context("could not format deployment timestamp")?;
	Ok(format!("{name}-{timestamp}"))
}

/// Validates the deployment, and logs every error ARM found in it.
pub(crate) async fn validate(
	client: &azure::management::Client<'_>,
	logger: &log2::Logger,
	resource_group_name: &str,
	deployment_name: &str,
	deployment: &Deployment,
) -> anyhow::Result<()> {
	let result = client.deployment_validate(resource_group_name, deployment_name, deployment).await?;

	let Some(error) = result.error else {
		logger.report_message(format_args!("template of deployment {deployment_name} is valid"));
		return Ok(());
	};

	for (i, detail) in error.details.iter().enumerate() {
		logger.report_warning(format_args!("template validation error {}: {detail}", i + 1));
	}

	Err(anyhow::anyhow!("template of deployment {deployment_name} to resource group {resource_group_name} is not valid: {error}"))
}

fn read_json(path: &std::path::Path) -> anyhow::Result<serde_json::Value> {
	let contents = std::fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
	let value = serde_json::from_slice(&contents).with_context(|| format!("could not parse {}", path.display()))?;
	Ok(value)
}

fn parameters_of(parameters_file: serde_json::Value) -> anyhow::Result<Parameters> {
	match parameters_file {
		serde_json::Value::Object(mut parameters_file) => match parameters_file.remove("parameters") {
			Some(serde_json::Value::Object(parameters)) => Ok(parameters),
			Some(_) => Err(anyhow::anyhow!("parameters is not a JSON object")),
			None => Err(anyhow::anyhow!("parameters file has no parameters")),
		},

		_ => Err(anyhow::anyhow!("parameters file is not a JSON object")),
	}
}

async fn download_parameters(transport: &dyn http_common::Transport, parameters_link: &str) -> anyhow::Result<Parameters> {
	let uri: http_common::Uri = parameters_link.parse().with_context(|| format!("could not parse parameters file link {parameters_link}"))?;

	let res =
		transport.send(http_common::Request::new(http_common::Method::GET, uri)).await
		.with_context(|| format!("could not download parameters file {parameters_link}"))?;
	if res.status != http_common::StatusCode::OK {
		anyhow::bail!("could not download parameters file {parameters_link}: {}", res.status);
	}

	let parameters_file = serde_json::from_slice(&res.body).with_context(|| format!("could not parse parameters file {parameters_link}"))?;
	parameters_of(parameters_file).with_context(|| format!("could not load parameters from {parameters_link}"))
}
