use anyhow::Context;

/// The inputs of the task, named as the agent exposes them.
#[derive(Debug, serde::Deserialize)]
pub struct Inputs {
	/// The ID of the Azure Resource Manager service connection.
	#[serde(rename = "connectedservicename")]
	pub connected_service_name: String,

	pub action: Action,

	#[serde(rename = "resourcegroupname")]
	pub resource_group_name: String,

	pub location: Option<String>,

	#[serde(rename = "templatelocation", default)]
	pub template_location: TemplateLocation,

	#[serde(rename = "csmfile")]
	pub csm_file: Option<std::path::PathBuf>,

	#[serde(rename = "csmparametersfile")]
	pub csm_parameters_file: Option<std::path::PathBuf>,

	#[serde(rename = "csmfilelink")]
	pub csm_file_link: Option<String>,

	#[serde(rename = "csmparametersfilelink")]
	pub csm_parameters_file_link: Option<String>,

	#[serde(rename = "overrideparameters")]
	pub override_parameters: Option<String>,

	#[serde(rename = "deploymentmode", default)]
	pub deployment_mode: DeploymentMode,

	#[serde(rename = "enabledeploymentprerequisites", deserialize_with = "pipeline::inputs::bool", default)]
	pub enable_deployment_prerequisites: bool,

	#[serde(rename = "outputvariable")]
	pub output_variable: Option<String>,

	/// How long to wait for each long-running operation, in minutes. Unbounded if not set.
	#[serde(deserialize_with = "deserialize_timeout", default)]
	pub timeout: Option<std::time::Duration>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
	CreateOrUpdateResourceGroup,
	DeleteResourceGroup,
	SelectResourceGroup,
	VirtualMachines(VirtualMachineAction),
}

impl<'de> serde::Deserialize<'de> for Action {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: serde::Deserializer<'de> {
		struct Visitor;

		impl serde::de::Visitor<'_> for Visitor {
			type Value = Action;

			fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				f.write_str("one of ")?;
				f.write_str(r#""Create Or Update Resource Group", "DeleteRG", "Select Resource Group", "#)?;
				f.write_str(r#""Start", "Stop", "Restart", "Delete""#)?;
				Ok(())
			}

			fn visit_str<E>(self, s: &str) -> Result<Self::Value, E> where E: serde::de::Error {
				Ok(match s {
					"Create Or Update Resource Group" => Action::CreateOrUpdateResourceGroup,
					"DeleteRG" => Action::DeleteResourceGroup,
					"Select Resource Group" => Action::SelectResourceGroup,
					"Start" => Action::VirtualMachines(VirtualMachineAction::Start),
					"Stop" => Action::VirtualMachines(VirtualMachineAction::Stop),
					"Restart" => Action::VirtualMachines(VirtualMachineAction::Restart),
					"Delete" => Action::VirtualMachines(VirtualMachineAction::Delete),

					s => return Err(serde::de::Error::invalid_value(serde::de::Unexpected::Str(s), &self)),
				})
			}
		}

		deserializer.deserialize_str(Visitor)
	}
}

/// An action applied to every VM of the resource group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VirtualMachineAction {
	Start,
	Stop,
	Restart,
	Delete,
}

impl std::fmt::Display for VirtualMachineAction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			VirtualMachineAction::Start => "start",
			VirtualMachineAction::Stop => "stop",
			VirtualMachineAction::Restart => "restart",
			VirtualMachineAction::Delete => "delete",
		})
	}
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize)]
pub enum TemplateLocation {
	#[default]
	#[serde(rename = "Linked artifact")]
	LinkedArtifact,

	#[serde(rename = "URL of the file")]
	Url,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize)]
pub enum DeploymentMode {
	#[default]
	Incremental,
	Complete,

	/// Only validate the template. Nothing is deployed.
	Validation,
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<std::time::Duration>, D::Error> where D: serde::Deserializer<'de> {
	let value: std::borrow::Cow<'de, str> = serde::Deserialize::deserialize(deserializer)?;
	let minutes: u64 = value.trim().parse().map_err(|_| serde::de::Error::invalid_value(serde::de::Unexpected::Str(&value), &"a number of minutes"))?;
	Ok((minutes > 0).then(|| std::time::Duration::from_secs(minutes.saturating_mul(60))))
}

/// Where the template of a deployment comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TemplateSource {
	/// Template and parameters files on the agent.
	LinkedArtifact {
		template_file: std::path::PathBuf,
		parameters_file: Option<std::path::PathBuf>,
	},

	/// Template and parameters files that ARM downloads itself.
	Url {
		template_link: String,
		parameters_link: Option<String>,
	},
}

/// The validated parameters of one run of the task.
pub struct TaskParameters {
	pub subscription_id: String,

	/// The ARM endpoint of the service connection.
	pub arm_url: String,

	pub auth: azure::Auth,

	pub resource_group_name: String,
	pub action: Action,
	pub location: Option<String>,

	/// Set if the action is [`Action::CreateOrUpdateResourceGroup`].
	pub template: Option<TemplateSource>,

	/// Parameters that replace the ones in the parameters file, in ARM's `{ "name": { "value": ... } }` form.
	pub override_parameters: serde_json::Map<String, serde_json::Value>,

	pub deployment_mode: DeploymentMode,
	pub enable_deployment_prerequisites: bool,
	pub output_variable: Option<String>,
	pub timeout: Option<std::time::Duration>,
}

impl TaskParameters {
	pub fn new(inputs: &Inputs, endpoint: &pipeline::Endpoint) -> anyhow::Result<Self> {
		let subscription_id = endpoint.subscription_id()?.to_owned();
		let auth = endpoint.azure_auth()?;
		Self::from_inputs(inputs, subscription_id, endpoint.url.clone(), auth)
	}

	fn from_inputs(inputs: &Inputs, subscription_id: String, arm_url: String, auth: azure::Auth) -> anyhow::Result<Self> {
		let resource_group_name = inputs.resource_group_name.trim();
		if resource_group_name.is_empty() {
			anyhow::bail!("resource group name is required");
		}

		let output_variable = inputs.output_variable.as_deref().map(str::trim).filter(|output_variable| !output_variable.is_empty());
		if inputs.action == Action::SelectResourceGroup && output_variable.is_none() {
			anyhow::bail!("an output variable is required to select resource group {resource_group_name}");
		}

		let template =
			if inputs.action == Action::CreateOrUpdateResourceGroup {
				Some(match inputs.template_location {
					TemplateLocation::LinkedArtifact => TemplateSource::LinkedArtifact {
						template_file: inputs.csm_file.clone().context("template file is required")?,
						parameters_file: inputs.csm_parameters_file.clone().filter(|path| !path.as_os_str().is_empty()),
					},

					TemplateLocation::Url => TemplateSource::Url {
						template_link: non_empty(inputs.csm_file_link.as_deref()).context("template link is required")?.to_owned(),
						parameters_link: non_empty(inputs.csm_parameters_file_link.as_deref()).map(ToOwned::to_owned),
					},
				})
			}
			else {
				None
			};

		let override_parameters = match non_empty(inputs.override_parameters.as_deref()) {
			Some(override_parameters) => crate::override_parameters::parse(override_parameters).context("could not parse override parameters")?,
			None => Default::default(),
		};

		Ok(TaskParameters {
			subscription_id,
			arm_url,
			auth,
			resource_group_name: resource_group_name.to_owned(),
			action: inputs.action,
			location: non_empty(inputs.location.as_deref()).map(ToOwned::to_owned),
			template,
			override_parameters,
			deployment_mode: inputs.deployment_mode,
			enable_deployment_prerequisites: inputs.enable_deployment_prerequisites,
			output_variable: output_variable.map(ToOwned::to_owned),
			timeout: inputs.timeout,
		})
	}
}

fn non_empty(s: Option<&str>) -> Option<&str> {
	s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
	fn inputs(inputs: serde_json::Value) -> super::Inputs {
		serde_json::from_value(inputs).unwrap()
	}

	fn auth() -> azure::Auth {
		azure::Auth::ServicePrincipal {
			authority_url: "https://login.windows.net/".to_owned(),
			client_id: "client".to_owned(),
			client_secret: "secret".to_owned(),
			tenant_id: "tenant".to_owned(),
		}
	}

	fn parameters(inputs: &super::Inputs) -> anyhow::Result<super::TaskParameters> {
		super::TaskParameters::from_inputs(inputs, "sub".to_owned(), "https://management.azure.com/".to_owned(), auth())
	}

	#[test]
	fn create_or_update_from_url() {
		let inputs = inputs(serde_json::json!({
			"connectedservicename": "conn1",
			"action": "Create Or Update Resource Group",
			"resourcegroupname": " rg ",
			"location": "West US",
			"templatelocation": "URL of the file",
			"csmfilelink": "https://example.org/azuredeploy.json",
			"overrideparameters": "-vmSize Small",
			"deploymentmode": "Complete",
			"enabledeploymentprerequisites": "true",
			"timeout": "30",
		}));
		let parameters = parameters(&inputs).unwrap();

		assert_eq!(parameters.resource_group_name, "rg");
		assert_eq!(parameters.location.as_deref(), Some("West US"));
		assert_eq!(parameters.template, Some(super::TemplateSource::Url {
			template_link: "https://example.org/azuredeploy.json".to_owned(),
			parameters_link: None,
		}));
		assert_eq!(parameters.override_parameters["vmSize"], serde_json::json!({ "value": "Small" }));
		assert_eq!(parameters.deployment_mode, super::DeploymentMode::Complete);
		assert!(parameters.enable_deployment_prerequisites);
		assert_eq!(parameters.timeout, Some(std::time::Duration::from_secs(30 * 60)));
	}

	#[test]
	fn defaults() {
		let inputs = inputs(serde_json::json!({
			"connectedservicename": "conn1",
			"action": "Create Or Update Resource Group",
			"resourcegroupname": "rg",
			"csmfile": "/agent/_work/r1/a/azuredeploy.json",
		}));
		assert_eq!(inputs.template_location, super::TemplateLocation::LinkedArtifact);
		assert_eq!(inputs.deployment_mode, super::DeploymentMode::Incremental);
		assert!(!inputs.enable_deployment_prerequisites);
		assert_eq!(inputs.timeout, None);

		let parameters = parameters(&inputs).unwrap();
		assert_eq!(parameters.template, Some(super::TemplateSource::LinkedArtifact {
			template_file: "/agent/_work/r1/a/azuredeploy.json".into(),
			parameters_file: None,
		}));
		assert!(parameters.override_parameters.is_empty());
	}

	#[test]
	fn actions() {
		for (action, expected) in [
			("DeleteRG", super::Action::DeleteResourceGroup),
			("Stop", super::Action::VirtualMachines(super::VirtualMachineAction::Stop)),
			("Delete", super::Action::VirtualMachines(super::VirtualMachineAction::Delete)),
		] {
			let inputs = inputs(serde_json::json!({ "connectedservicename": "conn1", "action": action, "resourcegroupname": "rg" }));
			assert_eq!(inputs.action, expected);
			assert_eq!(parameters(&inputs).unwrap().template, None);
		}

		serde_json::from_value::<super::Inputs>(serde_json::json!({ "connectedservicename": "conn1", "action": "Deallocate", "resourcegroupname": "rg" })).unwrap_err();
	}

	#[test]
	fn invalid() {
		let select_without_output_variable = inputs(serde_json::json!({
			"connectedservicename": "conn1",
			"action": "Select Resource Group",
			"resourcegroupname": "rg",
			"outputvariable": " ",
		}));
		assert!(parameters(&select_without_output_variable).is_err());

		let create_without_template = inputs(serde_json::json!({
			"connectedservicename": "conn1",
			"action": "Create Or Update Resource Group",
			"resourcegroupname": "rg",
			"templatelocation": "URL of the file",
		}));
		assert!(parameters(&create_without_template).is_err());

		let empty_resource_group_name = inputs(serde_json::json!({ "connectedservicename": "conn1", "action": "Start", "resourcegroupname": "  " }));
		assert!(parameters(&empty_resource_group_name).is_err());
	}
}
