//! Makes the Windows VMs of a resource group reachable over WinRM HTTPS.

mod extension;

mod inventory;

mod nat_rules;

mod resolve;
pub use resolve::ConnectionDetails;

mod security_rule;
pub use security_rule::{RetryStrategy, SecurityRuleOutcome};

/// A VM and where its WinRM HTTPS listener can be reached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Machine {
	pub id: String,
	pub name: String,

	/// Unset if the VM has neither a public IP address nor an inbound NAT rule.
	pub fqdn: Option<String>,

	pub winrm_https_port: u16,
	pub tags: std::collections::BTreeMap<String, String>,
}

pub struct WinRmHttpsListener<'a> {
	client: &'a azure::management::Client<'a>,
	resource_group_name: &'a str,
	retry_strategy: RetryStrategy,
	logger: &'a log2::Logger,
}

impl<'a> WinRmHttpsListener<'a> {
	pub fn new(client: &'a azure::management::Client<'a>, resource_group_name: &'a str, logger: &'a log2::Logger) -> Self {
		WinRmHttpsListener {
			client,
			resource_group_name,
			retry_strategy: Default::default(),
			logger,
		}
	}

	#[must_use]
	pub fn with_retry_strategy(mut self, retry_strategy: RetryStrategy) -> Self {
		self.retry_strategy = retry_strategy;
		self
	}

	/// Resolves the address and WinRM HTTPS port of every VM in the resource group.
	///
	/// If `configure` is set, also configures the listener inside every Windows VM and opens the port in every network security group,
	/// and fails if none of the VMs has an address. Otherwise VMs without an address are only warned about.
	/// Every VM and network security group is processed even if some of them fail, and the failures are returned together.
	pub async fn enable(&self, configure: bool) -> anyhow::Result<Vec<Machine>> {
		let inventory = inventory::Inventory::discover(self.client, self.resource_group_name).await?;

		let ConnectionDetails { mut fqdns, mut ports } = resolve::connection_details(&inventory);

		let missing = resolve::check_availability(&inventory.virtual_machines, &fqdns, configure)?;
		if !missing.is_empty() {
			self.logger.report_warning(format_args!(
				"virtual machines {missing:?} have neither a public IP address nor an inbound NAT rule and will not be reachable over WinRM HTTPS",
			));
		}

		let machines: Vec<_> =
			inventory.virtual_machines.iter()
			.map(|vm| Machine {
				id: vm.id.clone(),
				name: vm.name.clone(),
				fqdn: fqdns.remove(&vm.id),
				winrm_https_port: ports.remove(&vm.id).unwrap_or(resolve::WINRM_HTTPS_PORT),
				tags: vm.tags.clone(),
			})
			.collect();

		for machine in &machines {
			self.logger.report_state(
				"azure/compute/virtual_machine",
				(self.resource_group_name, &*machine.name),
				format_args!("WinRM HTTPS endpoint {}:{}", machine.fqdn.as_deref().unwrap_or("<none>"), machine.winrm_https_port),
			);
		}

		if !configure {
			return Ok(machines);
		}

		let mut failures = vec![];

		let extension_results = futures_util::future::join_all(
			inventory.virtual_machines.iter().zip(&machines)
			.filter_map(|(vm, machine)| {
				if !vm.is_windows() {
					self.logger.report_state("azure/compute/virtual_machine", (self.resource_group_name, &*vm.name), format_args!("is not a Windows machine"));
					return None;
				}

				let Some(fqdn) = &machine.fqdn else {
					self.logger.report_warning(format_args!("skipping {} because it has no public address", vm.name));
					return None;
				};

				Some(async move {
					let result = extension::ensure(self.client, self.logger, self.resource_group_name, vm, fqdn).await;
					(&*vm.name, result)
				})
			}),
		).await;
		for (vm_name, result) in extension_results {
			if let Err(err) = result {
				self.logger.report_error(&err);
				failures.push(format!("virtual machine {vm_name}: {err:#}"));
			}
		}

		let network_security_groups = self.client.network_security_groups_list(self.resource_group_name).await?;
		for network_security_group in &network_security_groups {
			let result = security_rule::ensure(
				self.client,
				self.logger,
				self.resource_group_name,
				&network_security_group.name,
				self.retry_strategy,
			).await;
			if let Err(err) = result {
				self.logger.report_error(&err);
				failures.push(format!("network security group {}: {err:#}", network_security_group.name));
			}
		}

		if !failures.is_empty() {
			anyhow::bail!("could not enable WinRM HTTPS on every resource of resource group {}: {}", self.resource_group_name, failures.join("; "));
		}

		Ok(machines)
	}

	/// Adds inbound NAT rules to every load balancer in the resource group, so that every VM in their back-end pools
	/// can be reached over WinRM HTTPS through a front-end port of the load balancer.
	pub async fn add_inbound_nat_rules(&self) -> anyhow::Result<()> {
		let (load_balancers, network_interfaces) =
			futures_util::future::try_join(
				self.client.load_balancers_list(self.resource_group_name),
				self.client.network_interfaces_list(self.resource_group_name),
			).await?;

		nat_rules::add(self.client, self.logger, self.resource_group_name, load_balancers, network_interfaces).await
	}
}
