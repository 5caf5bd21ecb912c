//! The custom script extension that configures the WinRM HTTPS listener inside a Windows VM.

use azure::management::compute::{VirtualMachine, VirtualMachineExtension, VirtualMachineExtensionProperties};

pub(crate) const NAME: &str = "CustomScriptExtension";

const PUBLISHER: &str = "Microsoft.Compute";
const TYPE: &str = "CustomScriptExtension";
const TYPE_HANDLER_VERSION: &str = "1.7";

pub(crate) const FILE_URIS: [&str; 3] = [
	"https://raw.githubusercontent.com/Azure/azure-quickstart-templates/master/201-vm-winrm-windows/ConfigureWinRM.ps1",
	"https://raw.githubusercontent.com/Azure/azure-quickstart-templates/master/201-vm-winrm-windows/makecert.exe",
	"https://raw.githubusercontent.com/Azure/azure-quickstart-templates/master/201-vm-winrm-windows/winrmconf.cmd",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Action {
	None,
	Install,
	RemoveThenInstall,
}

fn desired(location: &str, fqdn: &str) -> VirtualMachineExtension {
	VirtualMachineExtension {
		id: None,
		name: Some(NAME.to_owned()),
		r#type: Some("Microsoft.Compute/virtualMachines/extensions".to_owned()),
		location: location.to_owned(),
		properties: VirtualMachineExtensionProperties {
			publisher: PUBLISHER.to_owned(),
			r#type: TYPE.to_owned(),
			type_handler_version: TYPE_HANDLER_VERSION.to_owned(),
			auto_upgrade_minor_version: true,
			settings: serde_json::json!({
				"fileUris": FILE_URIS,
				"commandToExecute": format!("powershell.exe -File ConfigureWinRM.ps1 {fqdn}"),
			}),
			provisioning_state: None,
			instance_view: None,
		},
	}
}

fn action(existing: &VirtualMachineExtension) -> Action {
	let file_uris = existing.properties.settings.get("fileUris").and_then(serde_json::Value::as_array);
	let has_file_uris = file_uris.is_some_and(|file_uris| file_uris.iter().map(serde_json::Value::as_str).eq(FILE_URIS.iter().copied().map(Some)));
	if !has_file_uris {
		return Action::Install;
	}

	if existing.properties.provisioning_state.as_deref() != Some("Succeeded") {
		return Action::RemoveThenInstall;
	}

	// The script can succeed as far as the extension is concerned while still having failed to configure the listener.
	let wrote_to_stderr =
		existing.properties.instance_view.iter()
		.flat_map(|instance_view| &instance_view.substatuses)
		.any(|status|
			status.code.as_deref().is_some_and(|code| code.contains("ComponentStatus/StdErr")) &&
			status.message.as_deref().is_some_and(|message| !message.trim().is_empty()));
	if wrote_to_stderr {
		return Action::Install;
	}

	Action::None
}

/// Makes sure the extension is installed on the VM and ran successfully.
pub(crate) async fn ensure(
	client: &azure::management::Client<'_>,
	logger: &log2::Logger,
	resource_group_name: &str,
	vm: &VirtualMachine,
	fqdn: &str,
) -> anyhow::Result<()> {
	let action = match client.virtual_machine_extension_get(resource_group_name, &vm.name, NAME, true).await {
		Ok(existing) => action(&existing),
		Err(err) => {
			log::debug!("could not get {NAME} of {}, treating it as not installed: {err:?}", vm.name);
			Action::Install
		},
	};

	match action {
		Action::None => {
			logger.report_state("azure/compute/virtual_machine_extension", (resource_group_name, &*vm.name, NAME), format_args!("already configured"));
			return Ok(());
		},

		Action::Install => (),

		Action::RemoveThenInstall =>
			client.virtual_machine_extension_delete(resource_group_name, &vm.name, NAME).await?,
	}

	let installed = async {
		let extension = client.virtual_machine_extension_create_or_update(resource_group_name, &vm.name, NAME, &desired(&vm.location, fqdn)).await?;
		match extension.properties.provisioning_state.as_deref() {
			Some("Succeeded") => Ok(()),
			state => Err(anyhow::anyhow!("{NAME} finished with provisioning state {}", state.unwrap_or("unknown"))),
		}
	}.await;

	if let Err(err) = installed {
		// Best effort. The VM is reported as failed either way.
		if let Err(remove_err) = client.virtual_machine_extension_delete(resource_group_name, &vm.name, NAME).await {
			logger.report_warning(format_args!("could not remove {NAME} from {} after it failed to install: {remove_err:#}", vm.name));
		}

		return Err(err.context(format!("could not install {NAME} on {}", vm.name)));
	}

	Ok(())
}
