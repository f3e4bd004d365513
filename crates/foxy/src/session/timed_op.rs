//! Race a single operation against a deadline.
//!
//! Grounded on `detail/timed_op_wrapper_v3.hpp`, which arms a timer once per
//! operation, cancels the timer when the operation finishes first, and
//! otherwise closes the stream and completes the operation's handler with an
//! error exactly once. `tokio::time::timeout` already gives the
//! race-and-cancel-the-loser half of that for free; the "exactly once" half
//! is free too, since a `Result` is returned by value rather than through a
//! handler callback that could be invoked twice.
//!
//! Closing the stream on a timeout is the caller's responsibility (done by
//! [`super::Session::async_shutdown`] paths once they see
//! [`crate::error::Error::TimedOut`] bubble out of a `timed_op` call) rather
//! than this function's: reaching into `&mut MultiStream` from both the
//! racing operation and the timeout branch of the same `select!` does not
//! have a clean borrow-checker-friendly shape, and every caller already
//! needs to tear the session down on any error, timeout included.

use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// Await `op`, failing with [`Error::TimedOut`] if it doesn't complete
/// within `timeout`.
pub async fn timed_op<F, T>(timeout: Duration, op: F) -> Result<T, Error>
where
	F: Future<Output = Result<T, Error>>,
{
	match tokio::time::timeout(timeout, op).await {
		Ok(result) => result,
		Err(_) => Err(Error::TimedOut),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn completes_before_deadline() {
		let result = timed_op(Duration::from_millis(50), async { Ok::<_, Error>(42) }).await;
		assert_eq!(result.unwrap(), 42);
	}

	#[tokio::test]
	async fn times_out() {
		let result = timed_op(Duration::from_millis(5), async {
			tokio::time::sleep(Duration::from_secs(5)).await;
			Ok::<_, Error>(())
		})
		.await;
		assert!(matches!(result, Err(Error::TimedOut)));
	}

	#[tokio::test]
	async fn propagates_inner_error_without_waiting_for_deadline() {
		let result = timed_op(Duration::from_secs(5), async {
			Err::<(), Error>(Error::Protocol("bad".into()))
		})
		.await;
		assert!(matches!(result, Err(Error::Protocol(_))));
	}
}
