//! Task inputs.
//!
//! The agent exposes each input `fooBar` as the env var `INPUT_FOOBAR`. The inputs are collected into a JSON object
//! keyed by the lowercased input name, so the type they are deserialized into names its fields in lowercase.
//! Inputs that are set to the empty string are treated as not set.

use anyhow::Context;

const PREFIX: &str = "INPUT_";

pub(crate) fn from_env<T>() -> anyhow::Result<T> where T: serde::de::DeserializeOwned {
	from_vars(std::env::vars())
}

pub(crate) fn from_vars<T>(vars: impl IntoIterator<Item = (String, String)>) -> anyhow::Result<T> where T: serde::de::DeserializeOwned {
	let inputs: serde_json::Map<_, _> =
		vars.into_iter()
		.filter_map(|(name, value)| {
			let name = name.strip_prefix(PREFIX)?;
			if value.is_empty() {
				return None;
			}
			Some((name.to_ascii_lowercase(), serde_json::Value::String(value)))
		})
		.collect();

	let inputs = serde_json::from_value(serde_json::Value::Object(inputs)).context("could not parse task inputs")?;
	Ok(inputs)
}

/// For `#[serde(deserialize_with)]` on boolean inputs, which the agent passes as `"true"` or `"false"` in any case.
pub fn bool<'de, D>(deserializer: D) -> Result<bool, D::Error> where D: serde::Deserializer<'de> {
	let value: std::borrow::Cow<'de, str> = serde::Deserialize::deserialize(deserializer)?;
	if value.eq_ignore_ascii_case("true") {
		Ok(true)
	}
	else if value.eq_ignore_ascii_case("false") {
		Ok(false)
	}
	else {
		Err(serde::de::Error::invalid_value(serde::de::Unexpected::Str(&value), &"true or false"))
	}
}
