use crate::VirtualMachineAction;

/// Applies the action to every VM of the resource group concurrently. Fails if it failed for any of them.
pub(crate) async fn run(
	client: &azure::management::Client<'_>,
	logger: &log2::Logger,
	resource_group_name: &str,
	action: VirtualMachineAction,
) -> anyhow::Result<()> {
	let virtual_machines = client.virtual_machines_list(resource_group_name).await?;
	if virtual_machines.is_empty() {
		logger.report_message(format_args!("resource group {resource_group_name} has no virtual machines to {action}"));
		return Ok(());
	}

	let results = futures_util::future::join_all(virtual_machines.iter().map(|vm| async move {
		let result = match action {
			VirtualMachineAction::Start => client.virtual_machine_start(resource_group_name, &vm.name).await,
			VirtualMachineAction::Stop => client.virtual_machine_power_off(resource_group_name, &vm.name).await,
			VirtualMachineAction::Restart => client.virtual_machine_restart(resource_group_name, &vm.name).await,
			VirtualMachineAction::Delete => client.virtual_machine_delete(resource_group_name, &vm.name).await,
		};
		(&*vm.name, result)
	})).await;

	let mut failed = vec![];
	for (vm_name, result) in results {
		match result {
			Ok(()) => logger.report_state("azure/compute/virtual_machine", (resource_group_name, vm_name), format_args!("{action} succeeded")),

			Err(err) => {
				logger.report_error(&err.context(format!("could not {action} virtual machine {vm_name}")));
				failed.push(vm_name);
			},
		}
	}

	if !failed.is_empty() {
		anyhow::bail!("could not {action} virtual machines {failed:?} of resource group {resource_group_name}");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use http_common::fake::{empty_response, json_response, FakeTransport};

	fn vm(name: &str) -> serde_json::Value {
		serde_json::json!({
			"id": format!("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/{name}"),
			"name": name,
			"location": "westus",
			"properties": {},
		})
	}

	#[tokio::test]
	async fn every_vm_is_attempted() {
		let transport = FakeTransport::new(|req| Ok(
			if req.method == http_common::Method::GET {
				json_response(200, &serde_json::json!({ "value": [vm("vm1"), vm("vm2"), vm("vm3")] }))
			}
			else if req.uri.path().contains("/vm2/") {
				json_response(409, &serde_json::json!({ "error": { "code": "OperationNotAllowed", "message": "VM is being deleted" } }))
			}
			else {
				empty_response(200)
			}
		));
		let tokens = azure::fake::FakeTokens::default();
		let logger = log2::Logger::new(None);
		let client = azure::management::Client::new("sub", &tokens, &transport, &logger);

		let err = super::run(&client, &logger, "rg", crate::VirtualMachineAction::Stop).await.unwrap_err();
		assert_eq!(err.to_string(), r#"could not stop virtual machines ["vm2"] of resource group rg"#);

		let mut power_offs: Vec<_> =
			transport.calls().into_iter()
			.filter(|(method, _)| *method == http_common::Method::POST)
			.map(|(_, path)| path)
			.collect();
		power_offs.sort();
		assert_eq!(power_offs, [
			"/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1/powerOff",
			"/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm2/powerOff",
			"/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm3/powerOff",
		]);
	}

	#[tokio::test]
	async fn no_vms() {
		let transport = FakeTransport::new(|_| Ok(json_response(200, &serde_json::json!({ "value": [] }))));
		let tokens = azure::fake::FakeTokens::default();
		let logger = log2::Logger::new(None);
		let client = azure::management::Client::new("sub", &tokens, &transport, &logger);

		super::run(&client, &logger, "rg", crate::VirtualMachineAction::Delete).await.unwrap();
		assert_eq!(transport.requests().len(), 1);
	}
}
