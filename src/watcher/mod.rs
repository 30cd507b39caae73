//! Change watcher
//!
//! Runs a dedicated notification thread that blocks on an OS change source
//! and invokes a callback whenever the appearance subtree changes. The
//! callback carries no payload; receivers re-read the appearance store.

#[cfg(windows)]
pub mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[cfg(windows)]
pub use registry::registry_change_watcher;

/// Callback fired on the notification thread
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// How long the notification thread blocks before re-checking the stop signal
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long `start` waits for the notification thread to subscribe
const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Watcher errors
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to resolve current user identity: {0}")]
    Identity(String),
    #[error("Failed to open watched key: {0}")]
    Open(String),
    #[error("Change notification failed: {0}")]
    Notify(String),
    #[error("Notification thread did not report readiness")]
    StartTimeout,
    #[error("Failed to spawn notification thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Notification thread panicked")]
    ThreadPanicked,
    #[error("External change detection disabled")]
    Disabled,
}

/// Blocking source of change notifications.
///
/// Created and used only on the notification thread, so it may hold
/// thread-affine OS handles.
pub trait ChangeSource {
    /// Register for the next notification. Called before the subscription
    /// reports ready, and again after every change before the callback runs,
    /// so a change landing while the callback reads is never missed.
    fn arm(&mut self) -> Result<(), WatchError>;

    /// Wait up to `timeout`; `Ok(true)` means the watched subtree changed.
    fn wait(&mut self, timeout: Duration) -> Result<bool, WatchError>;
}

/// Opens a change source on the notification thread
pub type SourceFactory = Arc<dyn Fn() -> Result<Box<dyn ChangeSource>, WatchError> + Send + Sync>;

/// Subscription to external appearance changes
pub trait ChangeWatcher: Send {
    /// Subscribe. Returns false (and holds no resources) if the subscription
    /// could not be established.
    fn start(&mut self, on_change: ChangeCallback) -> bool;

    /// Cancel the subscription. Idempotent; safe from the notification thread.
    fn stop(&mut self) -> Result<(), WatchError>;

    /// Signal the subscription to end without waiting for the notification
    /// thread. At most one callback already in flight may still run.
    fn cancel(&mut self);

    fn is_started(&self) -> bool;
}

/// Thread-backed watch subscription over any [`ChangeSource`]
pub struct WatchSubscription {
    name: &'static str,
    open_source: SourceFactory,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), WatchError>>>,
}

impl WatchSubscription {
    pub fn new(name: &'static str, open_source: SourceFactory) -> Self {
        Self {
            name,
            open_source,
            stop_flag: Arc::new(AtomicBool::new(true)),
            thread: None,
        }
    }

    /// A subscription that never starts (external sync switched off)
    pub fn disabled() -> Self {
        Self::new("disabled", Arc::new(|| Err(WatchError::Disabled)))
    }

    fn spawn(&mut self, on_change: ChangeCallback) -> Result<(), WatchError> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), WatchError>>(1);
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = stop_flag.clone();

        let open_source = self.open_source.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-watcher", self.name))
            .spawn(move || {
                let opened = open_source().and_then(|mut source| {
                    source.arm()?;
                    Ok(source)
                });
                let mut source = match opened {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };

                while !stop_flag.load(Ordering::SeqCst) {
                    match source.wait(POLL_INTERVAL) {
                        Ok(true) => {
                            if stop_flag.load(Ordering::SeqCst) {
                                break;
                            }
                            // Re-arm before the callback reads the store
                            let rearmed = source.arm();
                            on_change();
                            if let Err(e) = rearmed {
                                tracing::warn!("Change notifications ended: {}", e);
                                stop_flag.store(true, Ordering::SeqCst);
                                return Err(e);
                            }
                        }
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!("Change notifications ended: {}", e);
                            stop_flag.store(true, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                }
                Ok(())
            })?;

        let ready = ready_rx
            .recv_timeout(START_TIMEOUT)
            .unwrap_or(Err(WatchError::StartTimeout));

        match ready {
            Ok(()) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.stop_flag.store(true, Ordering::SeqCst);
                if !matches!(e, WatchError::StartTimeout) {
                    let _ = handle.join();
                }
                Err(e)
            }
        }
    }
}

impl ChangeWatcher for WatchSubscription {
    fn start(&mut self, on_change: ChangeCallback) -> bool {
        if self.is_started() {
            return true;
        }

        match self.spawn(on_change) {
            Ok(()) => {
                tracing::info!("Watching {} for external changes", self.name);
                true
            }
            Err(WatchError::Disabled) => {
                tracing::info!("External change detection disabled");
                false
            }
            Err(e) => {
                tracing::warn!("Could not watch {} for external changes: {}", self.name, e);
                false
            }
        }
    }

    fn stop(&mut self) -> Result<(), WatchError> {
        self.stop_flag.store(true, Ordering::SeqCst);
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        // Stopping from inside a callback: the loop sees the flag on return
        if handle.thread().id() == std::thread::current().id() {
            tracing::debug!("{} watcher stopped from its own thread", self.name);
            return Ok(());
        }

        let result = handle.join().map_err(|_| WatchError::ThreadPanicked)?;
        tracing::debug!("{} watcher stopped", self.name);
        result
    }

    fn cancel(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if self.thread.take().is_some() {
            tracing::debug!("{} watcher detached", self.name);
        }
    }

    fn is_started(&self) -> bool {
        self.thread.is_some() && !self.stop_flag.load(Ordering::SeqCst)
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Error stopping {} watcher: {}", self.name, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Change source driven by a channel; each message is one change
    pub(crate) struct ChannelSource(pub Receiver<()>);

    impl ChangeSource for ChannelSource {
        fn arm(&mut self) -> Result<(), WatchError> {
            Ok(())
        }

        fn wait(&mut self, timeout: Duration) -> Result<bool, WatchError> {
            match self.0.recv_timeout(timeout) {
                Ok(()) => Ok(true),
                Err(RecvTimeoutError::Timeout) => Ok(false),
                Err(RecvTimeoutError::Disconnected) => Err(WatchError::Notify("closed".into())),
            }
        }
    }

    pub(crate) fn channel_subscription() -> (WatchSubscription, Sender<()>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sub = WatchSubscription::new(
            "test",
            Arc::new(move || Ok(Box::new(ChannelSource(rx.clone())) as Box<dyn ChangeSource>)),
        );
        (sub, tx)
    }

    pub(crate) fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    fn counting_callback() -> (ChangeCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: ChangeCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (callback, count)
    }

    #[test]
    fn test_callback_fires_on_notification_thread() {
        let (mut sub, tx) = channel_subscription();
        let caller = std::thread::current().id();
        let seen = Arc::new(Mutex::new(None));
        let seen_cb = seen.clone();

        assert!(sub.start(Arc::new(move || {
            *seen_cb.lock().unwrap() = Some(std::thread::current().id());
        })));
        tx.send(()).unwrap();

        assert!(wait_until(|| seen.lock().unwrap().is_some()));
        assert_ne!(seen.lock().unwrap().unwrap(), caller);
        sub.stop().unwrap();
    }

    #[test]
    fn test_stop_twice_is_noop_without_duplicate_delivery() {
        let (mut sub, tx) = channel_subscription();
        let (callback, count) = counting_callback();

        assert!(sub.start(callback));
        assert!(sub.is_started());
        tx.send(()).unwrap();
        assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));

        assert!(sub.stop().is_ok());
        assert!(sub.stop().is_ok());
        assert!(!sub.is_started());

        tx.send(()).unwrap();
        std::thread::sleep(POLL_INTERVAL * 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_subscription_returns_false() {
        let mut sub = WatchSubscription::new(
            "broken",
            Arc::new(|| Err(WatchError::Open("access denied".into()))),
        );
        let (callback, _) = counting_callback();

        assert!(!sub.start(callback));
        assert!(!sub.is_started());
        assert!(sub.stop().is_ok());
    }

    #[test]
    fn test_disabled_never_starts() {
        let mut sub = WatchSubscription::disabled();
        let (callback, _) = counting_callback();
        assert!(!sub.start(callback));
        assert!(sub.stop().is_ok());
    }

    #[test]
    fn test_start_twice_keeps_single_subscription() {
        let (mut sub, tx) = channel_subscription();
        let (callback, count) = counting_callback();

        assert!(sub.start(callback.clone()));
        assert!(sub.start(callback));
        tx.send(()).unwrap();
        assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));
        std::thread::sleep(POLL_INTERVAL);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        sub.stop().unwrap();
    }

    #[test]
    fn test_stop_from_callback_does_not_deadlock() {
        let (sub, tx) = channel_subscription();
        let sub = Arc::new(Mutex::new(sub));
        let stopped = Arc::new(AtomicBool::new(false));

        let sub_cb = sub.clone();
        let stopped_cb = stopped.clone();
        let started = sub.lock().unwrap().start(Arc::new(move || {
            let result = sub_cb.lock().unwrap().stop();
            stopped_cb.store(result.is_ok(), Ordering::SeqCst);
        }));
        assert!(started);

        tx.send(()).unwrap();
        assert!(wait_until(|| stopped.load(Ordering::SeqCst)));
        assert!(!sub.lock().unwrap().is_started());
    }

    #[test]
    fn test_source_error_surfaces_on_stop() {
        let (tx, rx) = crossbeam_channel::unbounded::<()>();
        let mut sub = WatchSubscription::new(
            "closing",
            Arc::new(move || Ok(Box::new(ChannelSource(rx.clone())) as Box<dyn ChangeSource>)),
        );
        let (callback, _) = counting_callback();
        assert!(sub.start(callback));

        // Disconnect: the source reports an error and the thread ends
        drop(tx);
        assert!(wait_until(|| !sub.is_started()));
        assert!(matches!(sub.stop(), Err(WatchError::Notify(_))));
        assert!(sub.stop().is_ok());
    }

    #[test]
    fn test_cancel_ends_delivery_without_joining() {
        let (mut sub, tx) = channel_subscription();
        let (callback, count) = counting_callback();
        assert!(sub.start(callback));

        sub.cancel();
        assert!(!sub.is_started());
        assert!(sub.stop().is_ok());

        std::thread::sleep(POLL_INTERVAL * 2);
        let _ = tx.send(());
        std::thread::sleep(POLL_INTERVAL * 2);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    /// Source that reports one change per queued message and logs every
    /// `arm` call; arming fails once `fail_arm_after` calls have succeeded
    struct ScriptedSource {
        changes: Receiver<()>,
        log: Arc<Mutex<Vec<&'static str>>>,
        arms: usize,
        fail_arm_after: Option<usize>,
    }

    impl ChangeSource for ScriptedSource {
        fn arm(&mut self) -> Result<(), WatchError> {
            if self.fail_arm_after == Some(self.arms) {
                return Err(WatchError::Notify("arm refused".into()));
            }
            self.arms += 1;
            self.log.lock().unwrap().push("arm");
            Ok(())
        }

        fn wait(&mut self, timeout: Duration) -> Result<bool, WatchError> {
            Ok(self.changes.recv_timeout(timeout).is_ok())
        }
    }

    fn scripted_subscription(
        fail_arm_after: Option<usize>,
    ) -> (WatchSubscription, Sender<()>, Arc<Mutex<Vec<&'static str>>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let log = Arc::new(Mutex::new(Vec::new()));
        let source_log = log.clone();
        let sub = WatchSubscription::new(
            "scripted",
            Arc::new(move || {
                Ok(Box::new(ScriptedSource {
                    changes: rx.clone(),
                    log: source_log.clone(),
                    arms: 0,
                    fail_arm_after,
                }) as Box<dyn ChangeSource>)
            }),
        );
        (sub, tx, log)
    }

    #[test]
    fn test_first_arm_failure_fails_start() {
        let (mut sub, _tx, log) = scripted_subscription(Some(0));
        let (callback, _) = counting_callback();

        assert!(!sub.start(callback));
        assert!(!sub.is_started());
        assert!(log.lock().unwrap().is_empty());
        assert!(sub.stop().is_ok());
    }

    #[test]
    fn test_armed_before_ready_and_rearmed_before_callback() {
        let (mut sub, tx, log) = scripted_subscription(None);
        let log_cb = log.clone();

        assert!(sub.start(Arc::new(move || {
            log_cb.lock().unwrap().push("callback");
        })));
        assert_eq!(*log.lock().unwrap(), vec!["arm"]);

        tx.send(()).unwrap();
        assert!(wait_until(|| log.lock().unwrap().len() == 3));
        assert_eq!(*log.lock().unwrap(), vec!["arm", "arm", "callback"]);
        sub.stop().unwrap();
    }

    #[test]
    fn test_rearm_failure_delivers_change_then_ends() {
        let (mut sub, tx, _log) = scripted_subscription(Some(1));
        let (callback, count) = counting_callback();
        assert!(sub.start(callback));

        tx.send(()).unwrap();
        assert!(wait_until(|| count.load(Ordering::SeqCst) == 1));
        assert!(wait_until(|| !sub.is_started()));
        assert!(matches!(sub.stop(), Err(WatchError::Notify(_))));
    }
}
