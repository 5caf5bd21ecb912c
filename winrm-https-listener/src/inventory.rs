use anyhow::Context;

use azure::management::{compute::VirtualMachine, network::{LoadBalancer, NetworkInterface, PublicIpAddress}};

/// The resources of a resource group that determine how its VMs are reached.
pub(crate) struct Inventory {
	pub(crate) virtual_machines: Vec<VirtualMachine>,
	pub(crate) public_ip_addresses: Vec<PublicIpAddress>,
	pub(crate) network_interfaces: Vec<NetworkInterface>,
	pub(crate) load_balancers: Vec<LoadBalancer>,
}

impl Inventory {
	pub(crate) async fn discover(client: &azure::management::Client<'_>, resource_group_name: &str) -> anyhow::Result<Self> {
		let (virtual_machines, public_ip_addresses, network_interfaces, load_balancers) =
			futures_util::future::try_join4(
				client.virtual_machines_list(resource_group_name),
				client.public_ip_addresses_list(resource_group_name),
				client.network_interfaces_list(resource_group_name),
				client.load_balancers_list(resource_group_name),
			).await
			.with_context(|| format!("could not discover resources of resource group {resource_group_name}"))?;

		Ok(Inventory {
			virtual_machines,
			public_ip_addresses,
			network_interfaces,
			load_balancers,
		})
	}
}
