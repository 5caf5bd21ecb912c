//! Works out the public address and WinRM HTTPS port of every virtual machine.
//!
//! Each step is a function from the discovered resources (and the previous step's map) to a new map.
//! All maps are keyed by resource ID.

use std::collections::BTreeMap;

use azure::management::network::{LoadBalancer, NetworkInterface, PublicIpAddress};

pub(crate) const WINRM_HTTPS_PORT: u16 = 5986;

const NOT_ASSIGNED: &str = "Not Assigned";

/// The public address and WinRM HTTPS front-end port of each virtual machine, keyed by VM ID.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConnectionDetails {
	pub fqdns: BTreeMap<String, String>,
	pub ports: BTreeMap<String, u16>,
}

pub(crate) fn connection_details(inventory: &crate::inventory::Inventory) -> ConnectionDetails {
	let mut fqdns = by_virtual_machine(
		&addresses_by_ip_configuration(&inventory.public_ip_addresses),
		&inventory.network_interfaces,
	);

	let load_balancer_fqdns = by_virtual_machine_through_nat_rules(
		&addresses_by_nat_rule(&inventory.load_balancers, &inventory.public_ip_addresses),
		&inventory.network_interfaces,
	);
	for (vm_id, fqdn) in load_balancer_fqdns {
		fqdns.entry(vm_id).or_insert(fqdn);
	}

	let ports = by_virtual_machine(
		&winrm_ports_by_ip_configuration(&inventory.load_balancers),
		&inventory.network_interfaces,
	);

	ConnectionDetails { fqdns, ports }
}

/// Public IP address ID -> its DNS name, or its IP address if it has no DNS name.
fn address(public_ip_address: &PublicIpAddress) -> String {
	let properties = &public_ip_address.properties;
	properties.dns_settings.as_ref().and_then(|dns_settings| dns_settings.fqdn.clone())
		.or_else(|| properties.ip_address.clone())
		.unwrap_or_else(|| NOT_ASSIGNED.to_owned())
}

/// IP configuration ID -> address of the public IP assigned to it.
fn addresses_by_ip_configuration(public_ip_addresses: &[PublicIpAddress]) -> BTreeMap<String, String> {
	public_ip_addresses.iter()
		.filter_map(|public_ip_address| {
			let ip_configuration = public_ip_address.properties.ip_configuration.as_ref()?;
			Some((ip_configuration.id.clone(), address(public_ip_address)))
		})
		.collect()
}

/// Inbound NAT rule ID -> address of the public IP of the load balancer front-end that the rule belongs to.
fn addresses_by_nat_rule(load_balancers: &[LoadBalancer], public_ip_addresses: &[PublicIpAddress]) -> BTreeMap<String, String> {
	let addresses: BTreeMap<_, _> =
		public_ip_addresses.iter()
		.map(|public_ip_address| (&*public_ip_address.id, address(public_ip_address)))
		.collect();

	let mut result = BTreeMap::new();

	for load_balancer in load_balancers {
		for frontend_ip_configuration in &load_balancer.properties.frontend_ip_configurations {
			let properties = &frontend_ip_configuration.properties;
			let Some(address) =
				properties.public_ip_address.as_ref()
				.and_then(|public_ip_address| addresses.get(&*public_ip_address.id))
			else { continue; };

			for nat_rule in &properties.inbound_nat_rules {
				result.insert(nat_rule.id.clone(), address.clone());
			}
		}
	}

	result
}

/// Back-end IP configuration ID -> front-end port, for the inbound NAT rules that forward to the WinRM HTTPS port.
pub(crate) fn winrm_ports_by_ip_configuration(load_balancers: &[LoadBalancer]) -> BTreeMap<String, u16> {
	load_balancers.iter()
		.flat_map(|load_balancer| &load_balancer.properties.inbound_nat_rules)
		.filter(|nat_rule| nat_rule.properties.backend_port == WINRM_HTTPS_PORT)
		.filter_map(|nat_rule| {
			let backend_ip_configuration = nat_rule.properties.backend_ip_configuration.as_ref()?;
			Some((backend_ip_configuration.id.clone(), nat_rule.properties.frontend_port))
		})
		.collect()
}

/// Re-keys a map keyed by network interface IP configuration ID to be keyed by the ID of the VM that owns the network interface.
fn by_virtual_machine<T>(by_ip_configuration: &BTreeMap<String, T>, network_interfaces: &[NetworkInterface]) -> BTreeMap<String, T> where T: Clone {
	let mut result = BTreeMap::new();

	for network_interface in network_interfaces {
		let Some(virtual_machine) = &network_interface.properties.virtual_machine else { continue; };

		for ip_configuration in &network_interface.properties.ip_configurations {
			if let Some(value) = by_ip_configuration.get(&ip_configuration.id) {
				result.entry(virtual_machine.id.clone()).or_insert_with(|| value.clone());
			}
		}
	}

	result
}

/// Re-keys a map keyed by inbound NAT rule ID to be keyed by the ID of the VM whose network interface references the rule.
fn by_virtual_machine_through_nat_rules<T>(by_nat_rule: &BTreeMap<String, T>, network_interfaces: &[NetworkInterface]) -> BTreeMap<String, T> where T: Clone {
	let mut result = BTreeMap::new();

	for network_interface in network_interfaces {
		let Some(virtual_machine) = &network_interface.properties.virtual_machine else { continue; };

		let values =
			network_interface.properties.ip_configurations.iter()
			.flat_map(|ip_configuration| &ip_configuration.properties.load_balancer_inbound_nat_rules)
			.filter_map(|nat_rule| by_nat_rule.get(&nat_rule.id));
		for value in values {
			result.entry(virtual_machine.id.clone()).or_insert_with(|| value.clone());
		}
	}

	result
}

/// Returns the names of the VMs that do not have an address. If `require_any` is set, fails if none of them has one.
pub(crate) fn check_availability<'a>(
	virtual_machines: &'a [azure::management::compute::VirtualMachine],
	fqdns: &BTreeMap<String, String>,
	require_any: bool,
) -> anyhow::Result<Vec<&'a str>> {
	let missing: Vec<_> =
		virtual_machines.iter()
		.filter(|vm| !fqdns.contains_key(&vm.id))
		.map(|vm| &*vm.name)
		.collect();

	if require_any && !virtual_machines.is_empty() && missing.len() == virtual_machines.len() {
		anyhow::bail!("none of the virtual machines in the resource group have a public IP address or an inbound NAT rule");
	}

	Ok(missing)
}

#[cfg(test)]
pub(crate) mod tests {
	pub(crate) const RG: &str = "/subscriptions/sub/resourceGroups/rg/providers";

	pub(crate) fn vm(name: &str, os_type: &str) -> serde_json::Value {
		serde_json::json!({
			"id": format!("{RG}/Microsoft.Compute/virtualMachines/{name}"),
			"name": name,
			"location": "westus",
			"properties": {
				"storageProfile": { "osDisk": { "osType": os_type } },
				"networkProfile": { "networkInterfaces": [{ "id": format!("{RG}/Microsoft.Network/networkInterfaces/{name}-nic") }] },
			},
		})
	}

	pub(crate) fn nic(vm_name: &str, nat_rules: &[&str]) -> serde_json::Value {
		let nat_rules: Vec<_> = nat_rules.iter().map(|name| serde_json::json!({ "id": format!("{RG}/Microsoft.Network/loadBalancers/lb/inboundNatRules/{name}") })).collect();
		serde_json::json!({
			"id": format!("{RG}/Microsoft.Network/networkInterfaces/{vm_name}-nic"),
			"name": format!("{vm_name}-nic"),
			"location": "westus",
			"properties": {
				"ipConfigurations": [{
					"id": ip_configuration(vm_name),
					"name": "ipconfig1",
					"properties": {
						"privateIPAddress": "10.0.0.4",
						"loadBalancerInboundNatRules": nat_rules,
					},
				}],
				"virtualMachine": { "id": format!("{RG}/Microsoft.Compute/virtualMachines/{vm_name}") },
			},
		})
	}

	pub(crate) fn ip_configuration(vm_name: &str) -> String {
		format!("{RG}/Microsoft.Network/networkInterfaces/{vm_name}-nic/ipConfigurations/ipconfig1")
	}

	pub(crate) fn public_ip(name: &str, ip_configuration: Option<&str>, fqdn: Option<&str>, ip_address: Option<&str>) -> serde_json::Value {
		let mut properties = serde_json::Map::new();
		if let Some(ip_configuration) = ip_configuration {
			properties.insert("ipConfiguration".to_owned(), serde_json::json!({ "id": ip_configuration }));
		}
		if let Some(fqdn) = fqdn {
			properties.insert("dnsSettings".to_owned(), serde_json::json!({ "fqdn": fqdn }));
		}
		if let Some(ip_address) = ip_address {
			properties.insert("ipAddress".to_owned(), ip_address.into());
		}
		serde_json::json!({
			"id": format!("{RG}/Microsoft.Network/publicIPAddresses/{name}"),
			"name": name,
			"properties": properties,
		})
	}

	/// A load balancer whose front-end uses public IP `lb-ip`, with `(name, frontend port, backend port, backend VM)` NAT rules
	/// and a backend pool containing the given VMs.
	pub(crate) fn load_balancer(nat_rules: &[(&str, u16, u16, Option<&str>)], backend_pool: &[&str]) -> serde_json::Value {
		let frontend_id = format!("{RG}/Microsoft.Network/loadBalancers/lb/frontendIPConfigurations/fe");
		let rules: Vec<_> =
			nat_rules.iter()
			.map(|&(name, frontend_port, backend_port, backend_vm)| {
				let mut properties = serde_json::json!({
					"frontendIPConfiguration": { "id": frontend_id },
					"protocol": "Tcp",
					"frontendPort": frontend_port,
					"backendPort": backend_port,
				});
				if let Some(backend_vm) = backend_vm {
					properties["backendIPConfiguration"] = serde_json::json!({ "id": ip_configuration(backend_vm) });
				}
				serde_json::json!({
					"id": format!("{RG}/Microsoft.Network/loadBalancers/lb/inboundNatRules/{name}"),
					"name": name,
					"properties": properties,
				})
			})
			.collect();
		let rule_ids: Vec<_> = rules.iter().map(|rule| serde_json::json!({ "id": rule["id"] })).collect();
		let backend_ip_configurations: Vec<_> = backend_pool.iter().map(|vm| serde_json::json!({ "id": ip_configuration(vm) })).collect();

		serde_json::json!({
			"id": format!("{RG}/Microsoft.Network/loadBalancers/lb"),
			"name": "lb",
			"location": "westus",
			"properties": {
				"frontendIPConfigurations": [{
					"id": frontend_id,
					"name": "fe",
					"properties": {
						"publicIPAddress": { "id": format!("{RG}/Microsoft.Network/publicIPAddresses/lb-ip") },
						"inboundNatRules": rule_ids,
					},
				}],
				"backendAddressPools": [{
					"id": format!("{RG}/Microsoft.Network/loadBalancers/lb/backendAddressPools/pool"),
					"name": "pool",
					"properties": { "backendIPConfigurations": backend_ip_configurations },
				}],
				"inboundNatRules": rules,
			},
		})
	}

	pub(crate) fn parse<T>(values: Vec<serde_json::Value>) -> Vec<T> where T: serde::de::DeserializeOwned {
		values.into_iter().map(|value| serde_json::from_value(value).unwrap()).collect()
	}

	fn vm_id(name: &str) -> String {
		format!("{RG}/Microsoft.Compute/virtualMachines/{name}")
	}

	#[test]
	fn public_ip_takes_precedence_over_load_balancer() {
		let inventory = crate::inventory::Inventory {
			virtual_machines: parse(vec![vm("vm1", "Windows"), vm("vm2", "Windows"), vm("vm3", "Windows")]),
			public_ip_addresses: parse(vec![
				public_ip("vm1-ip", Some(&ip_configuration("vm1")), Some("vm1.westus.cloudapp.azure.com"), Some("203.0.113.1")),
				public_ip("vm2-ip", Some(&ip_configuration("vm2")), None, Some("203.0.113.2")),
				public_ip("lb-ip", None, Some("lb.westus.cloudapp.azure.com"), None),
			]),
			network_interfaces: parse(vec![nic("vm1", &["vm1-winrm"]), nic("vm2", &[]), nic("vm3", &["vm3-winrm"])]),
			load_balancers: parse(vec![load_balancer(
				&[("vm1-winrm", 50001, 5986, Some("vm1")), ("vm3-winrm", 50003, 5986, Some("vm3"))],
				&["vm1", "vm3"],
			)]),
		};

		let details = super::connection_details(&inventory);
		assert_eq!(details.fqdns, std::collections::BTreeMap::from([
			(vm_id("vm1"), "vm1.westus.cloudapp.azure.com".to_owned()),
			(vm_id("vm2"), "203.0.113.2".to_owned()),
			(vm_id("vm3"), "lb.westus.cloudapp.azure.com".to_owned()),
		]));
		assert_eq!(details.ports, std::collections::BTreeMap::from([(vm_id("vm1"), 50001), (vm_id("vm3"), 50003)]));
	}

	#[test]
	fn unassigned_public_ip() {
		let public_ip_addresses: Vec<azure::management::network::PublicIpAddress> =
			parse(vec![public_ip("vm1-ip", Some(&ip_configuration("vm1")), None, None)]);
		let addresses = super::addresses_by_ip_configuration(&public_ip_addresses);
		assert_eq!(addresses[&ip_configuration("vm1")], "Not Assigned");
	}

	#[test]
	fn only_winrm_nat_rules_give_ports() {
		let load_balancers: Vec<azure::management::network::LoadBalancer> = parse(vec![load_balancer(
			&[("rdp", 50001, 3389, Some("vm1")), ("winrm", 50002, 5986, Some("vm1")), ("pending", 50003, 5986, None)],
			&["vm1"],
		)]);
		let ports = super::winrm_ports_by_ip_configuration(&load_balancers);
		assert_eq!(ports, std::collections::BTreeMap::from([(ip_configuration("vm1"), 50002)]));
	}

	#[test]
	fn availability() {
		let vms: Vec<azure::management::compute::VirtualMachine> = parse(vec![vm("vm1", "Windows"), vm("vm2", "Windows")]);

		let all = std::collections::BTreeMap::from([(vm_id("vm1"), "a".to_owned()), (vm_id("vm2"), "b".to_owned())]);
		assert!(super::check_availability(&vms, &all, true).unwrap().is_empty());

		let some = std::collections::BTreeMap::from([(vm_id("vm2"), "b".to_owned())]);
		assert_eq!(super::check_availability(&vms, &some, true).unwrap(), ["vm1"]);

		super::check_availability(&vms, &Default::default(), true).unwrap_err();
		assert_eq!(super::check_availability(&vms, &Default::default(), false).unwrap(), ["vm1", "vm2"]);
		assert!(super::check_availability(&[], &Default::default(), true).unwrap().is_empty());
	}
}
