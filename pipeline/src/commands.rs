//! Logging commands understood by the pipeline agent. Each is a single `##vso[area.action key=value;]message` line on stdout.

use std::fmt::Write;

pub(crate) struct Command<'a> {
	name: &'a str,
	properties: Vec<(&'a str, &'a str)>,
	message: &'a str,
}

impl<'a> Command<'a> {
	pub(crate) fn new(name: &'a str, message: &'a str) -> Self {
		Command {
			name,
			properties: vec![],
			message,
		}
	}

	#[must_use]
	pub(crate) fn property(mut self, name: &'a str, value: &'a str) -> Self {
		self.properties.push((name, value));
		self
	}
}

impl std::fmt::Display for Command<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "##vso[{}", self.name)?;
		for (i, &(name, value)) in self.properties.iter().enumerate() {
			f.write_char(if i == 0 { ' ' } else { ';' })?;
			write!(f, "{name}={}", Escaped { s: value, is_property: true })?;
		}
		if !self.properties.is_empty() {
			f.write_char(';')?;
		}
		write!(f, "]{}", Escaped { s: self.message, is_property: false })
	}
}

struct Escaped<'a> {
	s: &'a str,
	is_property: bool,
}

impl std::fmt::Display for Escaped<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for c in self.s.chars() {
			match c {
				'%' => f.write_str("%AZP25")?,
				'\r' => f.write_str("%0D")?,
				'\n' => f.write_str("%0A")?,
				';' if self.is_property => f.write_str("%3B")?,
				']' if self.is_property => f.write_str("%5D")?,
				c => f.write_char(c)?,
			}
		}
		Ok(())
	}
}

/// The final result of the task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskResult {
	Succeeded,
	Failed,
}

impl TaskResult {
	fn as_str(self) -> &'static str {
		match self {
			TaskResult::Succeeded => "Succeeded",
			TaskResult::Failed => "Failed",
		}
	}
}

pub(crate) fn set_variable(name: &str, value: &str, is_secret: bool) -> String {
	Command::new("task.setvariable", value)
		.property("variable", name)
		.property("issecret", if is_secret { "true" } else { "false" })
		.to_string()
}

pub(crate) fn complete(result: TaskResult, message: &str) -> String {
	Command::new("task.complete", message)
		.property("result", result.as_str())
		.to_string()
}

pub(crate) fn log_issue(r#type: &str, message: &str) -> String {
	Command::new("task.logissue", message)
		.property("type", r#type)
		.to_string()
}

/// Attaches the file to the logs of the task.
pub(crate) fn upload_file(path: &str) -> String {
	Command::new("task.uploadfile", path).to_string()
}

pub(crate) fn debug(message: &str) -> String {
	Command::new("task.debug", message).to_string()
}
