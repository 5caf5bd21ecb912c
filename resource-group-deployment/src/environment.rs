//! The machines of a resource group, published as a pipeline variable so that later tasks can deploy to them.

use std::collections::BTreeMap;

pub const FQDN_PROPERTY: &str = "Microsoft-Vslabs-MG-Resource-FQDN";
pub const WINRM_HTTPS_PORT_PROPERTY: &str = "WinRM_Https";

#[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Environment {
	pub name: String,

	#[serde(rename = "createdDate", with = "rfc3339_millis")]
	pub created: time::OffsetDateTime,

	pub project: Option<String>,

	#[serde(rename = "resourceGroupName")]
	pub resource_group_name: String,

	pub resources: Vec<Resource>,
}

#[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Resource {
	pub id: String,
	pub name: String,
	pub properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PropertyValue {
	#[serde(rename = "isSecure")]
	pub is_secure: bool,

	pub data: String,
}

impl PropertyValue {
	fn plain(data: String) -> Self {
		PropertyValue { is_secure: false, data }
	}
}

impl Environment {
	pub fn new(
		name: &str,
		project: Option<&str>,
		resource_group_name: &str,
		machines: &[winrm_https_listener::Machine],
		created: time::OffsetDateTime,
	) -> Self {
		let resources =
			machines.iter()
			.map(|machine| {
				let mut properties: BTreeMap<_, _> =
					machine.tags.iter()
					.map(|(name, value)| (name.clone(), PropertyValue::plain(value.clone())))
					.collect();
				if let Some(fqdn) = &machine.fqdn {
					properties.insert(FQDN_PROPERTY.to_owned(), PropertyValue::plain(fqdn.clone()));
				}
				properties.insert(WINRM_HTTPS_PORT_PROPERTY.to_owned(), PropertyValue::plain(machine.winrm_https_port.to_string()));

				Resource {
					id: machine.id.clone(),
					name: machine.name.clone(),
					properties,
				}
			})
			.collect();

		Environment {
			name: name.to_owned(),
			created: created - time::Duration::nanoseconds(i64::from(created.nanosecond() % 1_000_000)),
			project: project.map(ToOwned::to_owned),
			resource_group_name: resource_group_name.to_owned(),
			resources,
		}
	}
}

/// Publishes the machines of the resource group as the JSON value of the output variable.
pub(crate) fn register(
	context: &pipeline::Context<'_>,
	output_variable: &str,
	resource_group_name: &str,
	machines: &[winrm_https_listener::Machine],
) -> anyhow::Result<()> {
	let environment = Environment::new(
		output_variable,
		context.variables.team_project.as_deref(),
		resource_group_name,
		machines,
		time::OffsetDateTime::now_utc(),
	);
	let value = serde_json::to_string(&environment)?;
	context.set_variable(output_variable, &value, false);
	context.logger.report_message(format_args!(
		"registered {} machines of resource group {resource_group_name} as {output_variable}",
		environment.resources.len(),
	));
	Ok(())
}

mod rfc3339_millis {
	pub(super) fn serialize<S>(value: &time::OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> where S: serde::Serializer {
		let value =
			value.to_offset(time::UtcOffset::UTC)
			.format(time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"))
			.map_err(serde::ser::Error::custom)?;
		serializer.serialize_str(&value)
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<time::OffsetDateTime, D::Error> where D: serde::Deserializer<'de> {
		let value: std::borrow::Cow<'de, str> = serde::Deserialize::deserialize(deserializer)?;
		time::OffsetDateTime::parse(&value, &time::format_description::well_known::Rfc3339).map_err(serde::de::Error::custom)
	}
}
