//! Network resources.
//!
//! Network interfaces and load balancers are updated by reading them, modifying them and writing them back,
//! so their types keep every property they do not model in `other` to send it back unchanged.

use super::{Segment, SubResource};

const API_VERSION: &str = "2016-09-01";

type Other = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NetworkInterface {
	pub id: String,
	pub name: String,
	pub location: String,
	pub properties: NetworkInterfaceProperties,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NetworkInterfaceProperties {
	#[serde(default, rename = "ipConfigurations")]
	pub ip_configurations: Vec<NetworkInterfaceIpConfiguration>,

	#[serde(rename = "virtualMachine", skip_serializing_if = "Option::is_none")]
	pub virtual_machine: Option<SubResource>,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NetworkInterfaceIpConfiguration {
	pub id: String,
	pub properties: NetworkInterfaceIpConfigurationProperties,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NetworkInterfaceIpConfigurationProperties {
	#[serde(rename = "publicIPAddress", skip_serializing_if = "Option::is_none")]
	pub public_ip_address: Option<SubResource>,

	#[serde(default, rename = "loadBalancerBackendAddressPools", skip_serializing_if = "Vec::is_empty")]
	pub load_balancer_backend_address_pools: Vec<SubResource>,

	#[serde(default, rename = "loadBalancerInboundNatRules", skip_serializing_if = "Vec::is_empty")]
	pub load_balancer_inbound_nat_rules: Vec<SubResource>,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct PublicIpAddress {
	pub id: String,
	pub name: String,
	pub properties: PublicIpAddressProperties,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct PublicIpAddressProperties {
	#[serde(rename = "ipAddress")]
	pub ip_address: Option<String>,

	#[serde(rename = "ipConfiguration")]
	pub ip_configuration: Option<SubResource>,

	#[serde(rename = "dnsSettings")]
	pub dns_settings: Option<PublicIpAddressDnsSettings>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct PublicIpAddressDnsSettings {
	pub fqdn: Option<String>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct LoadBalancer {
	pub id: String,
	pub name: String,
	pub location: String,
	pub properties: LoadBalancerProperties,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct LoadBalancerProperties {
	#[serde(default, rename = "frontendIPConfigurations")]
	pub frontend_ip_configurations: Vec<FrontendIpConfiguration>,

	#[serde(default, rename = "backendAddressPools")]
	pub backend_address_pools: Vec<BackendAddressPool>,

	#[serde(default, rename = "inboundNatRules")]
	pub inbound_nat_rules: Vec<InboundNatRule>,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct FrontendIpConfiguration {
	pub id: String,
	pub properties: FrontendIpConfigurationProperties,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct FrontendIpConfigurationProperties {
	#[serde(rename = "publicIPAddress", skip_serializing_if = "Option::is_none")]
	pub public_ip_address: Option<SubResource>,

	#[serde(default, rename = "inboundNatRules", skip_serializing_if = "Vec::is_empty")]
	pub inbound_nat_rules: Vec<SubResource>,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct BackendAddressPool {
	pub id: String,
	pub properties: BackendAddressPoolProperties,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct BackendAddressPoolProperties {
	#[serde(default, rename = "backendIPConfigurations", skip_serializing_if = "Vec::is_empty")]
	pub backend_ip_configurations: Vec<SubResource>,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct InboundNatRule {
	/// Unset for a rule that has not been created yet.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,

	pub name: String,
	pub properties: InboundNatRuleProperties,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct InboundNatRuleProperties {
	#[serde(rename = "frontendIPConfiguration", skip_serializing_if = "Option::is_none")]
	pub frontend_ip_configuration: Option<SubResource>,

	/// Set by the service once a network interface IP configuration references the rule.
	#[serde(rename = "backendIPConfiguration", skip_serializing_if = "Option::is_none")]
	pub backend_ip_configuration: Option<SubResource>,

	pub protocol: String,

	#[serde(rename = "frontendPort")]
	pub frontend_port: u16,

	#[serde(rename = "backendPort")]
	pub backend_port: u16,

	#[serde(rename = "idleTimeoutInMinutes", skip_serializing_if = "Option::is_none")]
	pub idle_timeout_in_minutes: Option<u32>,

	#[serde(rename = "enableFloatingIP", skip_serializing_if = "Option::is_none")]
	pub enable_floating_ip: Option<bool>,

	#[serde(flatten)]
	pub other: Other,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct NetworkSecurityGroup {
	pub id: String,
	pub name: String,
	pub location: String,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct SecurityRule {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	pub properties: SecurityRuleProperties,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct SecurityRuleProperties {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,

	pub protocol: String,

	#[serde(rename = "sourcePortRange")]
	pub source_port_range: String,

	#[serde(rename = "destinationPortRange")]
	pub destination_port_range: String,

	#[serde(rename = "sourceAddressPrefix")]
	pub source_address_prefix: String,

	#[serde(rename = "destinationAddressPrefix")]
	pub destination_address_prefix: String,

	pub access: String,
	pub priority: u32,
	pub direction: String,

	#[serde(rename = "provisioningState", skip_serializing)]
	pub provisioning_state: Option<String>,
}

impl super::Client<'_> {
	pub async fn network_interfaces_list(&self, resource_group_name: &str) -> anyhow::Result<Vec<NetworkInterface>> {
		self.logger.report_operation("azure/network/network_interface", (resource_group_name, "*"), <log2::ScopedObjectOperation<'_>>::List, async {
			let uri = self.network_uri(resource_group_name, format_args!("networkInterfaces"))?;
			self.list(uri).await
		}).await
	}

	pub async fn network_interface_create_or_update(
		&self,
		resource_group_name: &str,
		network_interface: &NetworkInterface,
	) -> anyhow::Result<NetworkInterface> {
		let name = &*network_interface.name;
		self.logger.report_operation(
			"azure/network/network_interface",
			(resource_group_name, name),
			log2::ScopedObjectOperation::Create { value: format_args!("{} IP configurations", network_interface.properties.ip_configurations.len()) },
			async {
				super::validate_name("network interface name", name)?;
				let uri = self.network_uri(resource_group_name, format_args!("networkInterfaces/{}", Segment(name)))?;
				let res = self.complete(http_common::Method::PUT, uri, Some(super::json_body(network_interface)?)).await?;
				res.json()
			},
		).await
	}

	pub async fn public_ip_addresses_list(&self, resource_group_name: &str) -> anyhow::Result<Vec<PublicIpAddress>> {
		self.logger.report_operation("azure/network/public_ip_address", (resource_group_name, "*"), <log2::ScopedObjectOperation<'_>>::List, async {
			let uri = self.network_uri(resource_group_name, format_args!("publicIPAddresses"))?;
			self.list(uri).await
		}).await
	}

	pub async fn load_balancers_list(&self, resource_group_name: &str) -> anyhow::Result<Vec<LoadBalancer>> {
		self.logger.report_operation("azure/network/load_balancer", (resource_group_name, "*"), <log2::ScopedObjectOperation<'_>>::List, async {
			let uri = self.network_uri(resource_group_name, format_args!("loadBalancers"))?;
			self.list(uri).await
		}).await
	}

	pub async fn load_balancer_get(&self, resource_group_name: &str, load_balancer_name: &str) -> anyhow::Result<LoadBalancer> {
		self.logger.report_operation("azure/network/load_balancer", (resource_group_name, load_balancer_name), <log2::ScopedObjectOperation<'_>>::Get, async {
			super::validate_name("load balancer name", load_balancer_name)?;
			let uri = self.network_uri(resource_group_name, format_args!("loadBalancers/{}", Segment(load_balancer_name)))?;
			self.get(uri).await
		}).await
	}

	pub async fn load_balancer_create_or_update(&self, resource_group_name: &str, load_balancer: &LoadBalancer) -> anyhow::Result<LoadBalancer> {
		let name = &*load_balancer.name;
		self.logger.report_operation(
			"azure/network/load_balancer",
			(resource_group_name, name),
			log2::ScopedObjectOperation::Create { value: format_args!("{} inbound NAT rules", load_balancer.properties.inbound_nat_rules.len()) },
			async {
				super::validate_name("load balancer name", name)?;
				let uri = self.network_uri(resource_group_name, format_args!("loadBalancers/{}", Segment(name)))?;
				let res = self.complete(http_common::Method::PUT, uri, Some(super::json_body(load_balancer)?)).await?;
				res.json()
			},
		).await
	}

	pub async fn network_security_groups_list(&self, resource_group_name: &str) -> anyhow::Result<Vec<NetworkSecurityGroup>> {
		self.logger.report_operation("azure/network/network_security_group", (resource_group_name, "*"), <log2::ScopedObjectOperation<'_>>::List, async {
			let uri = self.network_uri(resource_group_name, format_args!("networkSecurityGroups"))?;
			self.list(uri).await
		}).await
	}

	pub async fn security_rule_get(
		&self,
		resource_group_name: &str,
		network_security_group_name: &str,
		security_rule_name: &str,
	) -> anyhow::Result<SecurityRule> {
		self.logger.report_operation(
			"azure/network/security_rule",
			(resource_group_name, network_security_group_name, security_rule_name),
			<log2::ScopedObjectOperation<'_>>::Get,
			async {
				let uri = self.security_rule_uri(resource_group_name, network_security_group_name, security_rule_name)?;
				self.get(uri).await
			},
		).await
	}

	pub async fn security_rule_create_or_update(
		&self,
		resource_group_name: &str,
		network_security_group_name: &str,
		security_rule_name: &str,
		security_rule: &SecurityRule,
	) -> anyhow::Result<SecurityRule> {
		self.logger.report_operation(
			"azure/network/security_rule",
			(resource_group_name, network_security_group_name, security_rule_name),
			log2::ScopedObjectOperation::Create { value: format_args!("priority {}", security_rule.properties.priority) },
			async {
				let uri = self.security_rule_uri(resource_group_name, network_security_group_name, security_rule_name)?;
				let res = self.complete(http_common::Method::PUT, uri, Some(super::json_body(security_rule)?)).await?;
				res.json()
			},
		).await
	}

	fn network_uri(&self, resource_group_name: &str, resource: std::fmt::Arguments<'_>) -> anyhow::Result<http_common::Uri> {
		super::validate_resource_group_name(resource_group_name)?;

		self.make_uri(
			format_args!("/resourceGroups/{}/providers/Microsoft.Network/{resource}", Segment(resource_group_name)),
			&[],
			API_VERSION,
		)
	}

	fn security_rule_uri(
		&self,
		resource_group_name: &str,
		network_security_group_name: &str,
		security_rule_name: &str,
	) -> anyhow::Result<http_common::Uri> {
		super::validate_name("network security group name", network_security_group_name)?;
		super::validate_name("security rule name", security_rule_name)?;

		self.network_uri(
			resource_group_name,
			format_args!("networkSecurityGroups/{}/securityRules/{}", Segment(network_security_group_name), Segment(security_rule_name)),
		)
	}
}

#[cfg(test)]
mod tests {
	use http_common::fake::{json_response, FakeTransport};

	fn load_balancer() -> serde_json::Value {
		serde_json::json!({
			"id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/lb",
			"name": "lb",
			"location": "westus",
			"etag": "W/\"1\"",
			"properties": {
				"provisioningState": "Succeeded",
				"frontendIPConfigurations": [{
					"id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/lb/frontendIPConfigurations/fe",
					"name": "fe",
					"properties": {
						"publicIPAddress": { "id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/ip" },
						"inboundNatRules": [{ "id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/lb/inboundNatRules/rdp" }],
					},
				}],
				"inboundNatRules": [{
					"id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/lb/inboundNatRules/rdp",
					"name": "rdp",
					"properties": {
						"frontendIPConfiguration": { "id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/lb/frontendIPConfigurations/fe" },
						"protocol": "Tcp",
						"frontendPort": 50001,
						"backendPort": 3389,
						"enableFloatingIP": false,
					},
				}],
				"loadBalancingRules": [{ "name": "http" }],
			},
		})
	}

	#[tokio::test]
	async fn load_balancer_keeps_unknown_properties() {
		let transport = FakeTransport::new(|req| Ok(
			if req.method == http_common::Method::PUT {
				let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
				json_response(200, &body)
			}
			else {
				json_response(200, &load_balancer())
			}
		));
		let tokens = crate::fake::FakeTokens::default();
		let logger = log2::Logger::new(None);
		let client = crate::management::Client::new("sub", &tokens, &transport, &logger);

		let mut lb = client.load_balancer_get("rg", "lb").await.unwrap();
		assert_eq!(lb.properties.inbound_nat_rules[0].properties.backend_port, 3389);
		assert_eq!(lb.properties.frontend_ip_configurations[0].properties.inbound_nat_rules.len(), 1);

		lb.properties.inbound_nat_rules[0].properties.frontend_port = 50002;
		let _ = client.load_balancer_create_or_update("rg", &lb).await.unwrap();

		let requests = transport.requests();
		assert_eq!(requests[1].method, http_common::Method::PUT);
		assert_eq!(
			requests[1].uri,
			"https://management.azure.com/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/lb?api-version=2016-09-01",
		);
		let body: serde_json::Value = serde_json::from_slice(requests[1].body.as_deref().unwrap()).unwrap();
		assert_eq!(body["etag"], "W/\"1\"");
		assert_eq!(body["properties"]["loadBalancingRules"][0]["name"], "http");
		assert_eq!(body["properties"]["frontendIPConfigurations"][0]["name"], "fe");
		assert_eq!(body["properties"]["inboundNatRules"][0]["properties"]["frontendPort"], 50002);
		assert_eq!(body["properties"]["inboundNatRules"][0]["properties"]["enableFloatingIP"], false);
	}

	#[tokio::test]
	async fn public_ip_addresses() {
		let transport = FakeTransport::new(|_| Ok(json_response(200, &serde_json::json!({
			"value": [
				{
					"id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/ip1",
					"name": "ip1",
					"properties": {
						"ipAddress": "203.0.113.1",
						"dnsSettings": { "fqdn": "vm1.westus.cloudapp.azure.com" },
						"ipConfiguration": { "id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic1/ipConfigurations/ipconfig1" },
					},
				},
				{
					"id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/ip2",
					"name": "ip2",
					"properties": {},
				},
			],
		}))));
		let tokens = crate::fake::FakeTokens::default();
		let logger = log2::Logger::new(None);
		let client = crate::management::Client::new("sub", &tokens, &transport, &logger);

		let ips = client.public_ip_addresses_list("rg").await.unwrap();
		assert_eq!(ips[0].properties.dns_settings.as_ref().unwrap().fqdn.as_deref(), Some("vm1.westus.cloudapp.azure.com"));
		assert!(ips[1].properties.ip_configuration.is_none());
		assert_eq!(transport.calls()[0].1, "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses");
	}

	#[tokio::test]
	async fn security_rule_request_body() {
		let transport = FakeTransport::new(|req| Ok(json_response(201, &serde_json::from_slice(req.body.as_deref().unwrap()).unwrap())));
		let tokens = crate::fake::FakeTokens::default();
		let logger = log2::Logger::new(None);
		let client = crate::management::Client::new("sub", &tokens, &transport, &logger);

		let rule = super::SecurityRule {
			id: None,
			name: None,
			properties: super::SecurityRuleProperties {
				description: None,
				protocol: "*".to_owned(),
				source_port_range: "*".to_owned(),
				destination_port_range: "5986".to_owned(),
				source_address_prefix: "*".to_owned(),
				destination_address_prefix: "*".to_owned(),
				access: "Allow".to_owned(),
				priority: 3986,
				direction: "Inbound".to_owned(),
				provisioning_state: None,
			},
		};
		let created = client.security_rule_create_or_update("rg", "nsg", "rule", &rule).await.unwrap();
		assert_eq!(created.properties.priority, 3986);

		let body: serde_json::Value = serde_json::from_slice(transport.requests()[0].body.as_deref().unwrap()).unwrap();
		assert_eq!(body, serde_json::json!({
			"properties": {
				"protocol": "*",
				"sourcePortRange": "*",
				"destinationPortRange": "5986",
				"sourceAddressPrefix": "*",
				"destinationAddressPrefix": "*",
				"access": "Allow",
				"priority": 3986,
				"direction": "Inbound",
			},
		}));
		assert_eq!(
			transport.calls()[0].1,
			"/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkSecurityGroups/nsg/securityRules/rule",
		);
	}
}
