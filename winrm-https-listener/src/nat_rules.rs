//! Inbound NAT rules that forward a front-end port of a load balancer to the WinRM HTTPS port of each VM in its back-end pool.

use std::collections::{BTreeMap, BTreeSet};

use azure::management::{
	network::{InboundNatRule, InboundNatRuleProperties, LoadBalancer, NetworkInterface},
	SubResource,
};

use crate::resolve::WINRM_HTTPS_PORT;

fn rule_name(frontend_port: u16) -> String {
	format!("winRMHttpsRule{frontend_port}")
}

/// Back-end pool IP configurations of the load balancer that no inbound NAT rule forwards the WinRM HTTPS port to.
fn unmapped_backend_ip_configurations(load_balancer: &LoadBalancer) -> Vec<String> {
	let mapped = crate::resolve::winrm_ports_by_ip_configuration(std::slice::from_ref(load_balancer));

	let mut seen = BTreeSet::new();
	load_balancer.properties.backend_address_pools.iter()
		.flat_map(|pool| &pool.properties.backend_ip_configurations)
		.map(|ip_configuration| &ip_configuration.id)
		.filter(|id| !mapped.contains_key(*id) && seen.insert(*id))
		.cloned()
		.collect()
}

/// The first `count` front-end ports starting from the WinRM HTTPS port that are not already in use.
fn assign_frontend_ports(used: &BTreeSet<u16>, count: usize) -> Vec<u16> {
	(WINRM_HTTPS_PORT..=u16::MAX)
		.filter(|port| !used.contains(port))
		.take(count)
		.collect()
}

/// Adds the rule IDs to the IP configurations that they forward to. Returns the indices of the network interfaces that were modified.
fn attach(network_interfaces: &mut [NetworkInterface], rule_ids: &BTreeMap<String, String>) -> Vec<usize> {
	let mut modified = vec![];

	for (i, network_interface) in network_interfaces.iter_mut().enumerate() {
		let mut is_modified = false;

		for ip_configuration in &mut network_interface.properties.ip_configurations {
			let Some(rule_id) = rule_ids.get(&ip_configuration.id) else { continue; };

			let nat_rules = &mut ip_configuration.properties.load_balancer_inbound_nat_rules;
			if !nat_rules.iter().any(|nat_rule| nat_rule.id == *rule_id) {
				nat_rules.push(SubResource { id: rule_id.clone() });
				is_modified = true;
			}
		}

		if is_modified {
			modified.push(i);
		}
	}

	modified
}

/// Names of the given newly-added rules that did not end up forwarding the WinRM HTTPS port to an IP configuration.
fn stale_rules(load_balancer: &LoadBalancer, added: &BTreeSet<String>) -> BTreeSet<String> {
	load_balancer.properties.inbound_nat_rules.iter()
		.filter(|rule| added.contains(&rule.name))
		.filter(|rule| rule.properties.backend_port != WINRM_HTTPS_PORT || rule.properties.backend_ip_configuration.is_none())
		.map(|rule| rule.name.clone())
		.collect()
}

/// Adds the WinRM HTTPS inbound NAT rules of every load balancer, and references them from the network interfaces of the VMs they forward to.
pub(crate) async fn add(
	client: &azure::management::Client<'_>,
	logger: &log2::Logger,
	resource_group_name: &str,
	load_balancers: Vec<LoadBalancer>,
	mut network_interfaces: Vec<NetworkInterface>,
) -> anyhow::Result<()> {
	for mut load_balancer in load_balancers {
		let unmapped = unmapped_backend_ip_configurations(&load_balancer);
		if unmapped.is_empty() {
			logger.report_state("azure/network/load_balancer", (resource_group_name, &*load_balancer.name), format_args!("has WinRM HTTPS rules for every back-end"));
			continue;
		}

		let Some(frontend_ip_configuration) = load_balancer.properties.frontend_ip_configurations.first() else {
			logger.report_warning(format_args!("load balancer {} has no front-end IP configuration to add WinRM HTTPS rules to", load_balancer.name));
			continue;
		};
		let frontend_ip_configuration = SubResource { id: frontend_ip_configuration.id.clone() };

		let used: BTreeSet<_> = load_balancer.properties.inbound_nat_rules.iter().map(|rule| rule.properties.frontend_port).collect();
		let frontend_ports = assign_frontend_ports(&used, unmapped.len());
		if frontend_ports.len() < unmapped.len() {
			anyhow::bail!("load balancer {} has no free front-end ports left for WinRM HTTPS rules", load_balancer.name);
		}

		let mut rule_names: BTreeMap<String, String> = Default::default();
		for (ip_configuration_id, frontend_port) in unmapped.into_iter().zip(frontend_ports) {
			let name = rule_name(frontend_port);
			load_balancer.properties.inbound_nat_rules.push(InboundNatRule {
				id: None,
				name: name.clone(),
				properties: InboundNatRuleProperties {
					frontend_ip_configuration: Some(frontend_ip_configuration.clone()),
					backend_ip_configuration: None,
					protocol: "Tcp".to_owned(),
					frontend_port,
					backend_port: WINRM_HTTPS_PORT,
					idle_timeout_in_minutes: Some(4),
					enable_floating_ip: Some(false),
					other: Default::default(),
				},
				other: Default::default(),
			});
			rule_names.insert(ip_configuration_id, name);
		}

		let load_balancer = client.load_balancer_create_or_update(resource_group_name, &load_balancer).await?;

		let rule_ids: BTreeMap<_, _> =
			rule_names.iter()
			.filter_map(|(ip_configuration_id, name)| {
				let rule = load_balancer.properties.inbound_nat_rules.iter().find(|rule| rule.name == *name)?;
				Some((ip_configuration_id.clone(), rule.id.clone()?))
			})
			.collect();

		for i in attach(&mut network_interfaces, &rule_ids) {
			let updated = client.network_interface_create_or_update(resource_group_name, &network_interfaces[i]).await?;
			network_interfaces[i] = updated;
		}

		let mut load_balancer = client.load_balancer_get(resource_group_name, &load_balancer.name).await?;
		let stale = stale_rules(&load_balancer, &rule_names.into_values().collect());
		if !stale.is_empty() {
			logger.report_warning(format_args!(
				"removing inbound NAT rules {stale:?} of load balancer {} that do not forward to a WinRM HTTPS listener",
				load_balancer.name,
			));
			load_balancer.properties.inbound_nat_rules.retain(|rule| !stale.contains(&rule.name));
			let _ = client.load_balancer_create_or_update(resource_group_name, &load_balancer).await?;
		}
	}

	Ok(())
}
