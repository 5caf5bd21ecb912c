//! A [`TokenProvider`](crate::TokenProvider) that hands out `Bearer token<N>`, where `N` goes up on every forced refresh.

#[derive(Default)]
pub struct FakeTokens {
	requests: std::cell::Cell<usize>,
	forced_refreshes: std::cell::Cell<usize>,
}

impl FakeTokens {
	/// Number of times a token was asked for.
	pub fn requests(&self) -> usize {
		self.requests.get()
	}

	pub fn forced_refreshes(&self) -> usize {
		self.forced_refreshes.get()
	}
}

impl crate::TokenProvider for FakeTokens {
	fn token(&self, force_refresh: bool) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<http_common::HeaderValue>> + '_>> {
		self.requests.set(self.requests.get() + 1);
		if force_refresh {
			self.forced_refreshes.set(self.forced_refreshes.get() + 1);
		}

		let token: anyhow::Result<http_common::HeaderValue> = http_common::HeaderValue::try_from(format!("Bearer token{}", self.forced_refreshes.get() + 1)).map_err(Into::into);
		Box::pin(std::future::ready(token))
	}
}
