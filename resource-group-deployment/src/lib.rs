//! Creates, updates, selects or deletes an Azure resource group, or starts, stops, restarts or deletes its VMs.

use anyhow::Context;

pub mod environment;

mod override_parameters;

mod parameters;
pub use parameters::{Action, DeploymentMode, Inputs, TaskParameters, TemplateLocation, TemplateSource, VirtualMachineAction};

mod template;

mod virtual_machines;

pub struct Task;

impl pipeline::Handler for Task {
	type Inputs = Inputs;

	fn handle<'this>(
		&'this self,
		inputs: &'this Inputs,
		context: &'this pipeline::Context<'_>,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'this>> {
		Box::pin(async move {
			let endpoint = pipeline::Endpoint::from_env(&inputs.connected_service_name)?;
			let parameters = TaskParameters::new(inputs, &endpoint)?;

			let user_agent: http_common::HeaderValue =
				concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
				.parse().expect("hard-coded user agent is valid HeaderValue");
			let transport = http_common::Client::new(user_agent).context("could not initialize HTTP client")?;

			let credentials = azure::Credentials::new(&parameters.auth, parameters.arm_url.clone(), &transport, context.logger);

			let poll_policy = azure::lro::PollPolicy {
				timeout: parameters.timeout,
				cancellation: Some(context.cancellation.clone()),
				..Default::default()
			};
			let client =
				azure::management::Client::new(&parameters.subscription_id, &credentials, &transport, context.logger)
				.with_base_url(&parameters.arm_url)
				.context("could not initialize Azure Management API client")?
				.with_poll_policy(poll_policy);

			run(&parameters, &client, &transport, context).await
		})
	}
}

/// Runs the action of the task against the resource group.
pub async fn run(
	parameters: &TaskParameters,
	client: &azure::management::Client<'_>,
	transport: &dyn http_common::Transport,
	context: &pipeline::Context<'_>,
) -> anyhow::Result<()> {
	let logger = context.logger;
	let resource_group_name = &*parameters.resource_group_name;

	match parameters.action {
		Action::CreateOrUpdateResourceGroup => {
			create_or_update(parameters, client, transport, context).await
				.with_context(|| format!("could not create or update resource group {resource_group_name}"))?;
			logger.report_message(format_args!("deployed to resource group {resource_group_name}"));
		},

		Action::DeleteResourceGroup => {
			client.resource_group_delete(resource_group_name).await
				.with_context(|| format!("could not delete resource group {resource_group_name}"))?;
			logger.report_message(format_args!("deleted resource group {resource_group_name}"));
		},

		Action::SelectResourceGroup => {
			prepare_machines(parameters, client, context).await
				.with_context(|| format!("could not select resource group {resource_group_name}"))?;
		},

		Action::VirtualMachines(action) =>
			virtual_machines::run(client, logger, resource_group_name, action).await?,
	}

	Ok(())
}

async fn create_or_update(
	parameters: &TaskParameters,
	client: &azure::management::Client<'_>,
	transport: &dyn http_common::Transport,
	context: &pipeline::Context<'_>,
) -> anyhow::Result<()> {
	let logger = context.logger;
	let resource_group_name = &*parameters.resource_group_name;
	let template = parameters.template.as_ref().context("no template to deploy")?;

	if !client.resource_group_check_existence(resource_group_name).await? {
		let location = parameters.location.as_deref().context("resource group does not exist and no location was given to create it in")?;
		let _ = client.resource_group_create_or_update(resource_group_name, location).await?;
	}

	let deployment = template::deployment(template, &parameters.override_parameters, parameters.deployment_mode, transport).await?;
	let deployment_name = template::deployment_name(template, time::OffsetDateTime::now_utc())?;

	if parameters.deployment_mode == DeploymentMode::Validation {
		return template::validate(client, logger, resource_group_name, &deployment_name, &deployment).await;
	}

	let result = client.deployment_create_or_update(resource_group_name, &deployment_name, &deployment).await?;
	if let Some(correlation_id) = &result.properties.correlation_id {
		logger.report_state("azure/resources/deployment", (resource_group_name, &*deployment_name), format_args!("correlation ID {correlation_id}"));
	}

	prepare_machines(parameters, client, context).await
}

/// Enables WinRM HTTPS on the machines of the resource group if requested, then publishes them to the output variable if one is set.
async fn prepare_machines(
	parameters: &TaskParameters,
	client: &azure::management::Client<'_>,
	context: &pipeline::Context<'_>,
) -> anyhow::Result<()> {
	let resource_group_name = &*parameters.resource_group_name;
	let listener = winrm_https_listener::WinRmHttpsListener::new(client, resource_group_name, context.logger);

	let machines =
		if parameters.enable_deployment_prerequisites {
			listener.add_inbound_nat_rules().await?;
			Some(listener.enable(true).await?)
		}
		else {
			None
		};

	let Some(output_variable) = parameters.output_variable.as_deref() else {
		return Ok(());
	};

	let machines = match machines {
		Some(machines) => machines,
		None => listener.enable(false).await?,
	};
	environment::register(context, output_variable, resource_group_name, &machines).context("could not register environment")?;

	Ok(())
}
