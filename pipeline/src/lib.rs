//! Hosts a pipeline task: reads its inputs, runs it on a single-threaded runtime, and reports its result to the agent.

mod commands;
pub use commands::TaskResult;

mod endpoint;
pub use endpoint::Endpoint;

pub mod inputs;

pub trait Handler {
	type Inputs: serde::de::DeserializeOwned;

	fn handle<'this>(
		&'this self,
		inputs: &'this Self::Inputs,
		context: &'this Context<'_>,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'this>>;
}

/// Runs the task to completion.
///
/// This is the only place where an error becomes a failed task. The error is also returned
/// so that the process exits with a non-zero code.
pub fn run(handler: impl Handler) -> anyhow::Result<()> {
	let variables = Variables::from_env();

	{
		let logger = GlobalLogger;
		log::set_logger(Box::leak(Box::new(logger))).expect("could not set global logger");
		log::set_max_level(if variables.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info });
	}

	let runtime =
		tokio::runtime::Builder::new_current_thread()
		.enable_io()
		.enable_time()
		.build()?;
	let local_set = tokio::task::LocalSet::new();
	local_set.block_on(&runtime, run_inner(handler, variables))
}

async fn run_inner<H>(handler: H, variables: Variables) -> anyhow::Result<()> where H: Handler {
	let logger = log2::Logger::new(variables.task_instance_id.clone()).with_collection_id(variables.collection_id.clone());
	let context = Context::new(&logger, variables);

	let cancellation = context.cancellation.clone();
	let _ctrl_c = tokio::task::spawn_local(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			log::warn!("cancelling the task");
			cancellation.cancel();
		}
	});

	let result = async {
		let inputs: H::Inputs = inputs::from_env()?;
		handler.handle(&inputs, &context).await
	}.await;

	finish(&context, result)
}

fn finish(context: &Context<'_>, result: anyhow::Result<()>) -> anyhow::Result<()> {
	match result {
		Ok(()) => {
			upload_records(context);
			context.write(commands::complete(TaskResult::Succeeded, ""));
			Ok(())
		},

		Err(err) => {
			context.logger.report_error(&err);
			upload_records(context);
			context.write(commands::complete(TaskResult::Failed, &format!("{err:#}")));
			Err(err)
		},
	}
}

/// Writes the structured log records of the task to the agent's temp directory and attaches the file to the task's logs.
fn upload_records(context: &Context<'_>) {
	let records = context.logger.take_records();
	if records.is_empty() {
		return;
	}

	let directory = context.variables.temp_directory.clone().unwrap_or_else(std::env::temp_dir);
	let file_name = format!("log-records-{}.ndjson", context.variables.task_instance_id.as_deref().unwrap_or("task"));
	let path = directory.join(file_name);

	match std::fs::write(&path, &records) {
		Ok(()) => context.write(commands::upload_file(&path.to_string_lossy())),
		Err(err) => log::warn!("could not write log records to {}: {err}", path.display()),
	}
}

/// Well-known variables that the agent sets for every task.
#[derive(Clone, Debug, Default)]
pub struct Variables {
	pub team_project: Option<String>,
	pub collection_id: Option<String>,
	pub task_instance_id: Option<String>,

	/// Where the task may write files that the agent cleans up after the job.
	pub temp_directory: Option<std::path::PathBuf>,

	pub debug: bool,
}

impl Variables {
	fn from_env() -> Self {
		let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());

		Variables {
			team_project: var("SYSTEM_TEAMPROJECT"),
			collection_id: var("SYSTEM_COLLECTIONID"),
			task_instance_id: var("SYSTEM_TASKINSTANCEID"),
			temp_directory: var("AGENT_TEMPDIRECTORY").map(Into::into),
			debug: var("SYSTEM_DEBUG").is_some_and(|value| value.eq_ignore_ascii_case("true")),
		}
	}
}

pub struct Context<'a> {
	pub logger: &'a log2::Logger,
	pub variables: Variables,

	/// Cancelled when the agent cancels the task.
	pub cancellation: tokio_util::sync::CancellationToken,

	captured: Option<std::cell::RefCell<Vec<String>>>,
}

impl<'a> Context<'a> {
	fn new(logger: &'a log2::Logger, variables: Variables) -> Self {
		Context {
			logger,
			variables,
			cancellation: Default::default(),
			captured: None,
		}
	}

	/// A context whose logging commands are kept in memory instead of being written to stdout. See [`Context::take_output`].
	pub fn capturing(logger: &'a log2::Logger, variables: Variables) -> Self {
		Context {
			captured: Some(Default::default()),
			..Context::new(logger, variables)
		}
	}

	/// Sets a pipeline variable that subsequent tasks can read.
	pub fn set_variable(&self, name: &str, value: &str, is_secret: bool) {
		self.write(commands::set_variable(name, value, is_secret));
	}

	/// Takes the logging commands written so far by a context created with [`Context::capturing`].
	pub fn take_output(&self) -> Vec<String> {
		match &self.captured {
			Some(captured) => std::mem::take(&mut *captured.borrow_mut()),
			None => vec![],
		}
	}

	fn write(&self, line: String) {
		match &self.captured {
			Some(captured) => captured.borrow_mut().push(line),
			None => println!("{line}"),
		}
	}
}

struct GlobalLogger;

impl log::Log for GlobalLogger {
	fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
		metadata.level() <= log::max_level()
	}

	fn log(&self, record: &log::Record<'_>) {
		if !self.enabled(record.metadata()) {
			return;
		}

		println!("{}", format_record(record.level(), &record.args().to_string()));
	}

	fn flush(&self) {
	}
}

fn format_record(level: log::Level, message: &str) -> String {
	match level {
		log::Level::Error => commands::log_issue("error", message),
		log::Level::Warn => commands::log_issue("warning", message),
		log::Level::Info => message.to_owned(),
		log::Level::Debug | log::Level::Trace => commands::debug(message),
	}
}

#[cfg(test)]
mod tests {
	#[test]
	fn format_record() {
		assert_eq!(super::format_record(log::Level::Info, "deploying d1"), "deploying d1");
		assert_eq!(super::format_record(log::Level::Debug, "x-ms-correlation-request-id: 1"), "##vso[task.debug]x-ms-correlation-request-id: 1");
		assert_eq!(super::format_record(log::Level::Warn, "vm2 has no FQDN"), "##vso[task.logissue type=warning;]vm2 has no FQDN");
		assert_eq!(super::format_record(log::Level::Error, "a\nb"), "##vso[task.logissue type=error;]a%0Ab");
	}

	#[test]
	fn finish() {
		let temp_directory = std::env::temp_dir().join(format!("pipeline-test-{}", std::process::id()));
		std::fs::create_dir_all(&temp_directory).unwrap();

		let logger = log2::Logger::new(Some("instance".to_owned())).with_collection_id(Some("collection".to_owned()));
		let variables = super::Variables {
			task_instance_id: Some("instance".to_owned()),
			temp_directory: Some(temp_directory.clone()),
			..Default::default()
		};
		let context = super::Context::capturing(&logger, variables);

		context.set_variable("env", "{}", false);
		super::finish(&context, Ok(())).unwrap();
		assert_eq!(context.take_output(), [
			"##vso[task.setvariable variable=env;issecret=false;]{}",
			"##vso[task.complete result=Succeeded;]",
		]);

		let err = super::finish(&context, Err(anyhow::anyhow!("no such resource group").context("could not delete rg"))).unwrap_err();
		assert_eq!(err.to_string(), "could not delete rg");

		let records_file = temp_directory.join("log-records-instance.ndjson");
		assert_eq!(context.take_output(), [
			format!("##vso[task.uploadfile]{}", records_file.display()),
			"##vso[task.complete result=Failed;]could not delete rg: no such resource group".to_owned(),
		]);

		let records = std::fs::read_to_string(&records_file).unwrap();
		assert!(records.contains("no such resource group"), "{records}");
		assert!(records.contains("\"TaskInstanceId\":\"instance\""), "{records}");
		assert!(records.contains("\"CollectionId\":\"collection\""), "{records}");
		assert!(logger.take_records().is_empty());

		std::fs::remove_dir_all(&temp_directory).unwrap();
	}
}
