use super::Segment;

const API_VERSION: &str = "2016-03-30";

#[derive(Clone, Debug, serde::Deserialize)]
pub struct VirtualMachine {
	pub id: String,
	pub name: String,
	pub location: String,

	#[serde(default)]
	pub tags: std::collections::BTreeMap<String, String>,

	pub properties: VirtualMachineProperties,
}

impl VirtualMachine {
	pub fn is_windows(&self) -> bool {
		self.properties.storage_profile.os_disk.as_ref()
			.and_then(|os_disk| os_disk.os_type.as_deref())
			.is_some_and(|os_type| os_type.eq_ignore_ascii_case("Windows"))
	}
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct VirtualMachineProperties {
	#[serde(default, rename = "networkProfile")]
	pub network_profile: NetworkProfile,

	#[serde(default, rename = "storageProfile")]
	pub storage_profile: StorageProfile,

	#[serde(rename = "provisioningState")]
	pub provisioning_state: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct NetworkProfile {
	#[serde(default, rename = "networkInterfaces")]
	pub network_interfaces: Vec<super::SubResource>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct StorageProfile {
	#[serde(rename = "osDisk")]
	pub os_disk: Option<OsDisk>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct OsDisk {
	#[serde(rename = "osType")]
	pub os_type: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct InstanceView {
	#[serde(default)]
	pub statuses: Vec<InstanceViewStatus>,

	#[serde(default)]
	pub substatuses: Vec<InstanceViewStatus>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct InstanceViewStatus {
	pub code: Option<String>,
	pub level: Option<String>,

	#[serde(rename = "displayStatus")]
	pub display_status: Option<String>,

	pub message: Option<String>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct VirtualMachineExtension {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub r#type: Option<String>,

	pub location: String,

	pub properties: VirtualMachineExtensionProperties,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct VirtualMachineExtensionProperties {
	pub publisher: String,

	#[serde(rename = "type")]
	pub r#type: String,

	#[serde(rename = "typeHandlerVersion")]
	pub type_handler_version: String,

	#[serde(default, rename = "autoUpgradeMinorVersion")]
	pub auto_upgrade_minor_version: bool,

	#[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
	pub settings: serde_json::Value,

	#[serde(rename = "provisioningState", skip_serializing)]
	pub provisioning_state: Option<String>,

	#[serde(rename = "instanceView", skip_serializing)]
	pub instance_view: Option<InstanceView>,
}

impl super::Client<'_> {
	pub async fn virtual_machines_list(&self, resource_group_name: &str) -> anyhow::Result<Vec<VirtualMachine>> {
		self.logger.report_operation("azure/compute/virtual_machine", (resource_group_name, "*"), <log2::ScopedObjectOperation<'_>>::List, async {
			super::validate_resource_group_name(resource_group_name)?;

			let uri = self.make_uri(
				format_args!("/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines", Segment(resource_group_name)),
				&[],
				API_VERSION,
			)?;
			self.list(uri).await
		}).await
	}

	pub async fn virtual_machine_get(&self, resource_group_name: &str, vm_name: &str) -> anyhow::Result<VirtualMachine> {
		self.logger.report_operation("azure/compute/virtual_machine", (resource_group_name, vm_name), <log2::ScopedObjectOperation<'_>>::Get, async {
			let uri = self.virtual_machine_uri(resource_group_name, vm_name, "")?;
			self.get(uri).await
		}).await
	}

	pub async fn virtual_machine_start(&self, resource_group_name: &str, vm_name: &str) -> anyhow::Result<()> {
		self.virtual_machine_action(resource_group_name, vm_name, "start").await
	}

	pub async fn virtual_machine_power_off(&self, resource_group_name: &str, vm_name: &str) -> anyhow::Result<()> {
		self.virtual_machine_action(resource_group_name, vm_name, "powerOff").await
	}

	pub async fn virtual_machine_restart(&self, resource_group_name: &str, vm_name: &str) -> anyhow::Result<()> {
		self.virtual_machine_action(resource_group_name, vm_name, "restart").await
	}

	pub async fn virtual_machine_delete(&self, resource_group_name: &str, vm_name: &str) -> anyhow::Result<()> {
		self.logger.report_operation("azure/compute/virtual_machine", (resource_group_name, vm_name), <log2::ScopedObjectOperation<'_>>::Delete, async {
			let uri = self.virtual_machine_uri(resource_group_name, vm_name, "")?;
			let _ = self.complete(http_common::Method::DELETE, uri, None).await?;
			Ok::<_, anyhow::Error>(())
		}).await
	}

	pub async fn virtual_machine_extension_get(
		&self,
		resource_group_name: &str,
		vm_name: &str,
		extension_name: &str,
		instance_view: bool,
	) -> anyhow::Result<VirtualMachineExtension> {
		self.logger.report_operation("azure/compute/virtual_machine_extension", (resource_group_name, vm_name, extension_name), <log2::ScopedObjectOperation<'_>>::Get, async {
			let uri = self.virtual_machine_extension_uri(resource_group_name, vm_name, extension_name, instance_view)?;
			self.get(uri).await
		}).await
	}

	pub async fn virtual_machine_extension_create_or_update(
		&self,
		resource_group_name: &str,
		vm_name: &str,
		extension_name: &str,
		extension: &VirtualMachineExtension,
	) -> anyhow::Result<VirtualMachineExtension> {
		self.logger.report_operation(
			"azure/compute/virtual_machine_extension",
			(resource_group_name, vm_name, extension_name),
			log2::ScopedObjectOperation::Create { value: format_args!("{:?}", extension.properties.settings) },
			async {
				let uri = self.virtual_machine_extension_uri(resource_group_name, vm_name, extension_name, false)?;
				let res = self.complete(http_common::Method::PUT, uri, Some(super::json_body(extension)?)).await?;
				res.json()
			},
		).await
	}

	pub async fn virtual_machine_extension_delete(&self, resource_group_name: &str, vm_name: &str, extension_name: &str) -> anyhow::Result<()> {
		self.logger.report_operation("azure/compute/virtual_machine_extension", (resource_group_name, vm_name, extension_name), <log2::ScopedObjectOperation<'_>>::Delete, async {
			let uri = self.virtual_machine_extension_uri(resource_group_name, vm_name, extension_name, false)?;
			let _ = self.complete(http_common::Method::DELETE, uri, None).await?;
			Ok::<_, anyhow::Error>(())
		}).await
	}

	async fn virtual_machine_action(&self, resource_group_name: &str, vm_name: &str, action: &str) -> anyhow::Result<()> {
		self.logger.report_operation("azure/compute/virtual_machine", (resource_group_name, vm_name), log2::ScopedObjectOperation::Action { name: action }, async {
			let uri = self.virtual_machine_uri(resource_group_name, vm_name, action)?;
			let _ = self.complete(http_common::Method::POST, uri, None).await?;
			Ok::<_, anyhow::Error>(())
		}).await
	}

	fn virtual_machine_uri(&self, resource_group_name: &str, vm_name: &str, action: &str) -> anyhow::Result<http_common::Uri> {
		super::validate_resource_group_name(resource_group_name)?;
		super::validate_name("virtual machine name", vm_name)?;

		let separator = if action.is_empty() { "" } else { "/" };
		self.make_uri(
			format_args!(
				"/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}{separator}{action}",
				Segment(resource_group_name),
				Segment(vm_name),
			),
			&[],
			API_VERSION,
		)
	}

	fn virtual_machine_extension_uri(
		&self,
		resource_group_name: &str,
		vm_name: &str,
		extension_name: &str,
		instance_view: bool,
	) -> anyhow::Result<http_common::Uri> {
		super::validate_resource_group_name(resource_group_name)?;
		super::validate_name("virtual machine name", vm_name)?;
		super::validate_name("extension name", extension_name)?;

		let query: &[_] = if instance_view { &[("$expand", "instanceView")] } else { &[] };
		self.make_uri(
			format_args!(
				"/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}/extensions/{}",
				Segment(resource_group_name),
				Segment(vm_name),
				Segment(extension_name),
			),
			query,
			API_VERSION,
		)
	}
}
