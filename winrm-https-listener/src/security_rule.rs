use azure::management::network::{SecurityRule, SecurityRuleProperties};

pub(crate) const NAME: &str = "VSO-Custom-WinRM-Https-Port";

/// How the inbound rule is retried when creating it fails, for example because its priority is already taken by another rule.
#[derive(Clone, Copy, Debug)]
pub struct RetryStrategy {
	pub initial_priority: u32,
	pub priority_increment: u32,
	pub max_retries: u32,
}

impl Default for RetryStrategy {
	fn default() -> Self {
		RetryStrategy {
			initial_priority: 3986,
			priority_increment: 50,
			max_retries: 3,
		}
	}
}

impl RetryStrategy {
	/// The priority of the first attempt followed by that of each retry.
	fn priorities(self) -> impl Iterator<Item = u32> {
		(0..=self.max_retries).map(move |attempt| self.initial_priority + attempt * self.priority_increment)
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecurityRuleOutcome {
	AlreadyPresent,
	Added { priority: u32 },
}

fn rule(priority: u32) -> SecurityRule {
	SecurityRule {
		id: None,
		name: Some(NAME.to_owned()),
		properties: SecurityRuleProperties {
			description: Some("Allows inbound WinRM HTTPS connections".to_owned()),
			protocol: "*".to_owned(),
			source_port_range: "*".to_owned(),
			destination_port_range: crate::resolve::WINRM_HTTPS_PORT.to_string(),
			source_address_prefix: "*".to_owned(),
			destination_address_prefix: "*".to_owned(),
			access: "Allow".to_owned(),
			priority,
			direction: "Inbound".to_owned(),
			provisioning_state: None,
		},
	}
}

/// Adds the inbound WinRM HTTPS rule to the network security group unless it already has it.
pub(crate) async fn ensure(
	client: &azure::management::Client<'_>,
	logger: &log2::Logger,
	resource_group_name: &str,
	network_security_group_name: &str,
	retry_strategy: RetryStrategy,
) -> anyhow::Result<SecurityRuleOutcome> {
	if client.security_rule_get(resource_group_name, network_security_group_name, NAME).await.is_ok() {
		logger.report_state("azure/network/security_rule", (resource_group_name, network_security_group_name, NAME), format_args!("already present"));
		return Ok(SecurityRuleOutcome::AlreadyPresent);
	}

	let mut last_err = None;

	for priority in retry_strategy.priorities() {
		match client.security_rule_create_or_update(resource_group_name, network_security_group_name, NAME, &rule(priority)).await {
			Ok(_) => return Ok(SecurityRuleOutcome::Added { priority }),

			Err(err) => {
				logger.report_warning(format_args!(
					"could not add {NAME} to network security group {network_security_group_name} at priority {priority}: {err:#}",
				));
				last_err = Some(err);
			},
		}
	}

	let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no attempts were made"));
	Err(err.context(format!(
		"could not add {NAME} to network security group {network_security_group_name} after {} retries",
		retry_strategy.max_retries,
	)))
}

#[cfg(test)]
mod tests {
	use http_common::fake::{json_response, FakeTransport};

	#[test]
	fn priorities() {
		assert_eq!(super::RetryStrategy::default().priorities().collect::<Vec<_>>(), [3986, 4036, 4086, 4136]);
		let no_retries = super::RetryStrategy { max_retries: 0, ..Default::default() };
		assert_eq!(no_retries.priorities().collect::<Vec<_>>(), [3986]);
	}

	fn priority_conflict() -> http_common::Response {
		json_response(400, &serde_json::json!({
			"error": { "code": "SecurityRuleConflict", "message": "Rules cannot have the same Priority and Direction." },
		}))
	}

	#[tokio::test]
	async fn retries_with_higher_priority() {
		let transport = FakeTransport::new(|req| Ok(
			if req.method == http_common::Method::GET {
				json_response(404, &serde_json::json!({ "error": { "code": "NotFound", "message": "not found" } }))
			}
			else {
				let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
				if body["properties"]["priority"] == 4036 { json_response(201, &body) } else { priority_conflict() }
			}
		));
		let tokens = azure::fake::FakeTokens::default();
		let logger = log2::Logger::new(None);
		let client = azure::management::Client::new("sub", &tokens, &transport, &logger);

		let outcome = super::ensure(&client, &logger, "rg", "nsg", Default::default()).await.unwrap();
		assert_eq!(outcome, super::SecurityRuleOutcome::Added { priority: 4036 });
		assert_eq!(transport.requests().len(), 3);
	}

	#[tokio::test]
	async fn gives_up_after_max_retries() {
		let transport = FakeTransport::new(|req| Ok(
			if req.method == http_common::Method::GET {
				json_response(404, &serde_json::json!({ "error": { "code": "NotFound", "message": "not found" } }))
			}
			else {
				priority_conflict()
			}
		));
		let tokens = azure::fake::FakeTokens::default();
		let logger = log2::Logger::new(None);
		let client = azure::management::Client::new("sub", &tokens, &transport, &logger);

		let err = super::ensure(&client, &logger, "rg", "nsg", Default::default()).await.unwrap_err();
		assert!(err.to_string().contains("after 3 retries"), "{err:?}");

		let priorities: Vec<_> =
			transport.requests().iter()
			.filter(|req| req.method == http_common::Method::PUT)
			.map(|req| serde_json::from_slice::<serde_json::Value>(req.body.as_deref().unwrap()).unwrap()["properties"]["priority"].as_u64().unwrap())
			.collect();
		assert_eq!(priorities, [3986, 4036, 4086, 4136]);
	}
}
