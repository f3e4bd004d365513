//! Graceful shutdown primitive.
//!
//! Used by [`foxy::Listener`](../../foxy/struct.Listener.html) to stop
//! accepting new connections while letting in-flight ones finish their own
//! per-op timeouts and RFC 7230 §6.6 teardown. Trimmed down from
//! `agent-core::drain`, which additionally wraps hyper connection futures
//! for graceful HTTP/2 drains — not needed here since every connection
//! already tears itself down via `Session::async_shutdown`.

use tokio::sync::{mpsc, watch};

/// Construct a new trigger/watcher pair. The trigger signals the drain and
/// waits for every clone of the watcher to be dropped; the watcher should be
/// held by anything that wants to delay the drain until it is done with its
/// own work.
pub fn new() -> (DrainTrigger, DrainWatcher) {
	let (signal_tx, signal_rx) = watch::channel(false);
	let (drained_tx, drained_rx) = mpsc::channel::<std::convert::Infallible>(1);
	(
		DrainTrigger {
			drained_rx,
			signal_tx,
		},
		DrainWatcher {
			drained_tx,
			signal_rx,
		},
	)
}

/// Signals a drain and waits for every outstanding [`DrainWatcher`] to be
/// dropped.
#[derive(Debug)]
pub struct DrainTrigger {
	drained_rx: mpsc::Receiver<std::convert::Infallible>,
	signal_tx: watch::Sender<bool>,
}

impl DrainTrigger {
	/// Signal all watchers to begin draining and wait until every handle has
	/// been released.
	pub async fn drain(mut self) {
		let _ = self.signal_tx.send(true);
		// Recv on an empty, never-sent channel resolves once every sender
		// clone (held by a `DrainWatcher`) has been dropped.
		let _ = self.drained_rx.recv().await;
	}
}

/// Held by work that should delay a drain until it completes.
#[derive(Clone, Debug)]
pub struct DrainWatcher {
	drained_tx: mpsc::Sender<std::convert::Infallible>,
	signal_rx: watch::Receiver<bool>,
}

impl DrainWatcher {
	/// Resolves once [`DrainTrigger::drain`] has been called.
	pub async fn signaled(&mut self) {
		let _ = self.signal_rx.wait_for(|signaled| *signaled).await;
	}

	/// Non-blocking check for whether a drain has already started.
	pub fn is_signaled(&self) -> bool {
		*self.signal_rx.borrow()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn drain_waits_for_watchers() {
		let (trigger, watcher) = new();
		let mut w = watcher.clone();
		drop(watcher);

		let handle = tokio::spawn(async move {
			w.signaled().await;
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		});

		trigger.drain().await;
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn drain_completes_immediately_with_no_watchers() {
		let (trigger, watcher) = new();
		drop(watcher);
		trigger.drain().await;
	}
}
