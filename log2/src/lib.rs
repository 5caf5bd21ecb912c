mod object_id;
pub use object_id::ObjectId;
use object_id::DisplayObjectId;

pub struct Logger {
	collection_id: Option<String>,
	inner: std::sync::Mutex<LoggerInner>,
}

struct LoggerInner {
	task_instance_id: Option<String>,
	sequence_number: usize,
	records: Vec<u8>,
}

impl Logger {
	pub fn new(task_instance_id: Option<String>) -> Self {
		Logger {
			collection_id: None,
			inner: std::sync::Mutex::new(LoggerInner {
				task_instance_id,
				sequence_number: 0,
				records: vec![],
			}),
		}
	}

	/// Tags every record with the ID of the project collection that the task runs in.
	#[must_use]
	pub fn with_collection_id(mut self, collection_id: Option<String>) -> Self {
		self.collection_id = collection_id;
		self
	}

	pub fn report_error(&self, err: &anyhow::Error) {
		self.report_inner(Report::Error { err });
	}

	pub fn report_warning(&self, message: std::fmt::Arguments<'_>) {
		self.report_inner(Report::Warning { message });
	}

	pub fn report_message(&self, message: std::fmt::Arguments<'_>) {
		self.report_inner(Report::Message { message });
	}

	pub async fn report_operation<F>(
		&self,
		object_type: &str,
		object_id: impl ObjectId,
		operation: ScopedObjectOperation<'_>,
		f: F,
	) -> F::Output
	where
		F: std::future::Future,
		F::Output: std::fmt::Debug,
	{
		let id = DisplayObjectId(object_id).to_string();
		let id = &*id;

		match operation {
			ScopedObjectOperation::Action { name } => {
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::ActionStart { name } });
				let result = f.await;
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::ActionEnd { name } });
				result
			},

			ScopedObjectOperation::Create { value } => {
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::CreateStart { value } });
				let result = f.await;
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::CreateEnd });
				result
			},

			ScopedObjectOperation::Delete => {
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::DeleteStart });
				let result = f.await;
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::DeleteEnd });
				result
			},

			ScopedObjectOperation::Get => {
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::GetStart });
				let result = f.await;
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::GetEnd { value: format_args!("{result:?}") } });
				result
			},

			ScopedObjectOperation::List => {
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::ListStart });
				let result = f.await;
				self.report_inner(Report::ObjectOperation { r#type: object_type, id, operation: ObjectOperation::ListEnd });
				result
			},
		}
	}

	pub fn report_state(&self, object_type: &str, object_id: impl ObjectId, state: std::fmt::Arguments<'_>) {
		let id = DisplayObjectId(object_id).to_string();
		self.report_inner(Report::ObjectState { r#type: object_type, id: &id, state });
	}

	/// Takes the structured records accumulated so far, as newline-delimited JSON.
	pub fn take_records(&self) -> Vec<u8> {
		let mut inner = self.inner.lock().expect("logger mutex poisoned");
		std::mem::take(&mut inner.records)
	}

	fn report_inner(&self, report: Report<'_>) {
		let timestamp = time::OffsetDateTime::now_utc();

		{
			let mut inner = self.inner.lock().expect("logger mutex poisoned");
			let LoggerInner { task_instance_id, sequence_number, records } = &mut *inner;

			*sequence_number += 1;

			let record = serde_json::to_vec(&Record {
				timestamp,
				sequence_number: *sequence_number,
				collection_id: self.collection_id.as_deref(),
				task_instance_id: task_instance_id.as_deref(),
				report,
			}).expect("could not serialize log record");
			records.extend_from_slice(&record);
			records.push(b'\n');
		}

		log::log!(report.level(), "{report}");
	}
}

#[derive(Clone, Copy)]
pub enum ScopedObjectOperation<'a> {
	Action { name: &'a str },
	Create { value: std::fmt::Arguments<'a> },
	Delete,
	Get,
	List,
}

#[derive(serde::Deserialize)]
pub struct Secret<T>(pub T);

impl<T> std::fmt::Debug for Secret<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("******")
	}
}

struct Record<'a> {
	timestamp: time::OffsetDateTime,
	sequence_number: usize,
	collection_id: Option<&'a str>,
	task_instance_id: Option<&'a str>,
	report: Report<'a>,
}

#[derive(Clone, Copy)]
enum Report<'a> {
	Error {
		err: &'a anyhow::Error,
	},

	Warning {
		message: std::fmt::Arguments<'a>,
	},

	Message {
		message: std::fmt::Arguments<'a>,
	},

	ObjectOperation {
		r#type: &'a str,
		id: &'a str,
		operation: ObjectOperation<'a>,
	},

	ObjectState {
		r#type: &'a str,
		id: &'a str,
		state: std::fmt::Arguments<'a>,
	},
}

impl Report<'_> {
	fn level(&self) -> log::Level {
		match self {
			Report::Error { .. } => log::Level::Error,
			Report::Warning { .. } => log::Level::Warn,
			Report::ObjectOperation { operation: ObjectOperation::GetEnd { .. }, .. } => log::Level::Debug,
			_ => log::Level::Info,
		}
	}
}

impl std::fmt::Display for Report<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Report::Error { err } => write!(f, "{err:?}"),
			Report::Warning { message } | Report::Message { message } => write!(f, "{message}"),
			Report::ObjectOperation { r#type, id, operation } => write!(f, "{type} {id}: {operation}"),
			Report::ObjectState { r#type, id, state } => write!(f, "{type} {id} {state}"),
		}
	}
}

#[derive(Clone, Copy)]
enum ObjectOperation<'a> {
	ActionStart { name: &'a str },
	ActionEnd { name: &'a str },

	CreateStart { value: std::fmt::Arguments<'a> },
	CreateEnd,

	DeleteStart,
	DeleteEnd,

	GetStart,
	GetEnd { value: std::fmt::Arguments<'a> },

	ListStart,
	ListEnd,
}

impl ObjectOperation<'_> {
	fn name(&self) -> &'static str {
		match self {
			ObjectOperation::ActionStart { .. } => "ActionStart",
			ObjectOperation::ActionEnd { .. } => "ActionEnd",
			ObjectOperation::CreateStart { .. } => "CreateStart",
			ObjectOperation::CreateEnd => "CreateEnd",
			ObjectOperation::DeleteStart => "DeleteStart",
			ObjectOperation::DeleteEnd => "DeleteEnd",
			ObjectOperation::GetStart => "GetStart",
			ObjectOperation::GetEnd { .. } => "GetEnd",
			ObjectOperation::ListStart => "ListStart",
			ObjectOperation::ListEnd => "ListEnd",
		}
	}
}

impl std::fmt::Display for ObjectOperation<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())?;
		match self {
			ObjectOperation::ActionStart { name } | ObjectOperation::ActionEnd { name } => write!(f, " {name}"),
			ObjectOperation::CreateStart { value } | ObjectOperation::GetEnd { value } => write!(f, " {value}"),
			_ => Ok(()),
		}
	}
}

impl serde::Serialize for Record<'_> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: serde::Serializer {
		use serde::ser::SerializeStruct;

		let Record {
			timestamp,
			sequence_number,
			collection_id,
			task_instance_id,
			report,
		} = self;

		let mut serializer = serializer.serialize_struct("Record", 1)?;

		serializer.serialize_field("TimeCollected", &SerializeWith(timestamp))?;
		if let Some(collection_id) = collection_id {
			serializer.serialize_field("CollectionId", collection_id)?;
		}
		if let Some(task_instance_id) = task_instance_id {
			serializer.serialize_field("TaskInstanceId", task_instance_id)?;
		}
		serializer.serialize_field("SequenceNumber", sequence_number)?;
		serializer.serialize_field("Level", &SerializeWith(report.level()))?;

		match report {
			Report::Error { err } => {
				serializer.serialize_field("Exception", &format!("{err:?}"))?;
			},

			Report::Warning { message } | Report::Message { message } => {
				serializer.serialize_field("Message", &SerializeWith(message))?;
			},

			Report::ObjectOperation { r#type, id, operation } => {
				serializer.serialize_field("ObjectType", r#type)?;
				serializer.serialize_field("ObjectId", id)?;
				serializer.serialize_field("ObjectOperation", operation.name())?;
				match operation {
					ObjectOperation::ActionStart { name } | ObjectOperation::ActionEnd { name } =>
						serializer.serialize_field("ObjectAction", name)?,

					ObjectOperation::CreateStart { value } | ObjectOperation::GetEnd { value } =>
						serializer.serialize_field("ObjectValue", &SerializeWith(value))?,

					_ => (),
				}
			},

			Report::ObjectState { r#type, id, state } => {
				serializer.serialize_field("ObjectType", r#type)?;
				serializer.serialize_field("ObjectId", id)?;
				serializer.serialize_field("ObjectState", &SerializeWith(state))?;
			},
		}

		serializer.end()
	}
}

struct SerializeWith<T>(T);

impl serde::Serialize for SerializeWith<&'_ time::OffsetDateTime> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: serde::Serializer {
		let timestamp = self.0.format(&time::format_description::well_known::Rfc3339).map_err(serde::ser::Error::custom)?;
		serializer.serialize_str(&timestamp)
	}
}

impl serde::Serialize for SerializeWith<&'_ std::fmt::Arguments<'_>> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: serde::Serializer {
		serializer.collect_str(self.0)
	}
}

impl serde::Serialize for SerializeWith<log::Level> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: serde::Serializer {
		match self.0 {
			log::Level::Debug => serializer.serialize_str("Debug"),
			log::Level::Error => serializer.serialize_str("Error"),
			log::Level::Info => serializer.serialize_str("Information"),
			log::Level::Trace => serializer.serialize_str("Trace"),
			log::Level::Warn => serializer.serialize_str("Warning"),
		}
	}
}

#[cfg(test)]
mod tests {
	#[test]
	fn records_are_sequenced_json_lines() {
		let logger = super::Logger::new(Some("1234".to_owned()));
		logger.report_message(format_args!("hello {}", "world"));
		logger.report_state("azure/compute/virtual_machine", ("rg", "vm1"), format_args!("started"));

		let records = logger.take_records();
		let records: Vec<serde_json::Value> =
			std::str::from_utf8(&records).unwrap()
			.lines()
			.map(|line| serde_json::from_str(line).unwrap())
			.collect();
		assert_eq!(records.len(), 2);

		assert_eq!(records[0]["SequenceNumber"], 1);
		assert_eq!(records[0]["TaskInstanceId"], "1234");
		assert_eq!(records[0]["Level"], "Information");
		assert_eq!(records[0]["Message"], "hello world");

		assert_eq!(records[1]["SequenceNumber"], 2);
		assert_eq!(records[1]["ObjectType"], "azure/compute/virtual_machine");
		assert_eq!(records[1]["ObjectId"], "rg/vm1");
		assert_eq!(records[1]["ObjectState"], "started");

		assert!(logger.take_records().is_empty());
	}

	#[test]
	fn records_carry_collection_id() {
		let logger = super::Logger::new(None).with_collection_id(Some("c0ffee".to_owned()));
		logger.report_warning(format_args!("careful"));

		let records = logger.take_records();
		let record: serde_json::Value = serde_json::from_slice(records.strip_suffix(b"\n").unwrap()).unwrap();
		assert_eq!(record["CollectionId"], "c0ffee");
		assert_eq!(record["Level"], "Warning");
		assert!(record.get("TaskInstanceId").is_none());

		let logger = super::Logger::new(None);
		logger.report_message(format_args!("hello"));
		let record: serde_json::Value = serde_json::from_slice(logger.take_records().strip_suffix(b"\n").unwrap()).unwrap();
		assert!(record.get("CollectionId").is_none());
	}

	#[test]
	fn secret_is_redacted() {
		assert_eq!(format!("{:?}", super::Secret("hunter2")), "******");
	}
}
