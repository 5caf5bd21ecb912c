//! Polling of long-running ARM operations.
//!
//! A mutating call that continues asynchronously returns either an `azure-asyncoperation` header,
//! whose URI reports `{ "status": "InProgress" | ... }` until the operation ends,
//! or a `location` header with status 202, whose URI keeps returning 202 until the operation ends.

use anyhow::Context;

/// How a long-running operation is polled.
#[derive(Clone, Debug)]
pub struct PollPolicy {
	/// The fixed delay between polls.
	pub interval: std::time::Duration,

	/// Fail the operation once this much time has passed since the first poll.
	pub timeout: Option<std::time::Duration>,

	/// Fail the operation after this many polls.
	pub max_attempts: Option<usize>,

	pub cancellation: Option<tokio_util::sync::CancellationToken>,
}

impl Default for PollPolicy {
	fn default() -> Self {
		PollPolicy {
			interval: std::time::Duration::from_secs(30),
			timeout: None,
			max_attempts: None,
			cancellation: None,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
	/// Poll until the body's `status` is no longer `InProgress`.
	AsyncOperation(http_common::Uri),

	/// Poll until the status code is no longer 202.
	Location(http_common::Uri),
}

impl Operation {
	/// Finds the operation started by the given response, if any.
	pub fn detect(res: &crate::Response) -> anyhow::Result<Option<Self>> {
		if let Some(uri) = res.header_str("azure-asyncoperation") {
			let uri: http_common::Uri = uri.parse().context("could not parse azure-asyncoperation header")?;
			return Ok(Some(Operation::AsyncOperation(uri)));
		}

		if res.status == http_common::StatusCode::ACCEPTED {
			if let Some(uri) = res.header_str("location") {
				let uri: http_common::Uri = uri.parse().context("could not parse location header")?;
				return Ok(Some(Operation::Location(uri)));
			}
		}

		Ok(None)
	}

	fn uri(&self) -> &http_common::Uri {
		match self {
			Operation::AsyncOperation(uri) | Operation::Location(uri) => uri,
		}
	}

	fn is_in_progress(&self, res: &crate::Response) -> bool {
		match self {
			Operation::AsyncOperation(_) => res.body_status() == Some("InProgress"),
			Operation::Location(_) => res.status == http_common::StatusCode::ACCEPTED,
		}
	}
}

#[derive(Debug)]
pub enum PollError {
	/// The response did not describe a long-running operation.
	InvalidResponse,
	TimedOut { elapsed: std::time::Duration },
	TooManyAttempts { attempts: usize },
	Cancelled,
}

impl std::fmt::Display for PollError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			PollError::InvalidResponse => f.write_str("invalid response: expected an azure-asyncoperation header, or a location header with status 202"),
			PollError::TimedOut { elapsed } => write!(f, "timed out after {}s waiting for long-running operation", elapsed.as_secs()),
			PollError::TooManyAttempts { attempts } => write!(f, "long-running operation did not finish after {attempts} polls"),
			PollError::Cancelled => f.write_str("cancelled while waiting for long-running operation"),
		}
	}
}

impl std::error::Error for PollError {}

/// Waits for the operation started by `initial` to finish and returns the final poll response unchanged.
///
/// Fails with [`PollError::InvalidResponse`] if `initial` did not start an operation.
pub async fn long_running_operation_result(client: &crate::management::Client<'_>, initial: &crate::Response) -> anyhow::Result<crate::Response> {
	let operation = Operation::detect(initial)?.ok_or(PollError::InvalidResponse)?;
	poll(client, &operation).await
}

/// Polls the operation until it leaves its in-progress state and returns the final poll response unchanged.
pub async fn poll(client: &crate::management::Client<'_>, operation: &Operation) -> anyhow::Result<crate::Response> {
	let PollPolicy { interval, timeout, max_attempts, cancellation } = client.poll_policy();

	let start = tokio::time::Instant::now();
	let mut attempts = 0_usize;

	loop {
		let res = client.send(http_common::Method::GET, operation.uri().clone(), None).await?;
		attempts += 1;
		log::debug!("long-running operation {} poll {attempts}: status code {}, status {:?}", operation.uri(), res.status, res.body_status());

		if !operation.is_in_progress(&res) {
			return Ok(res);
		}

		if max_attempts.is_some_and(|max_attempts| attempts >= max_attempts) {
			return Err(PollError::TooManyAttempts { attempts }.into());
		}

		let elapsed = start.elapsed();
		if timeout.is_some_and(|timeout| elapsed >= timeout) {
			return Err(PollError::TimedOut { elapsed }.into());
		}

		match cancellation {
			Some(cancellation) => tokio::select! {
				() = tokio::time::sleep(*interval) => (),
				() = cancellation.cancelled() => return Err(PollError::Cancelled.into()),
			},

			None => tokio::time::sleep(*interval).await,
		}
	}
}
