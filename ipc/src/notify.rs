//! # Notification Dispatcher
//!
//! Classifies firmware-initiated messages. Firmware-ready completes the boot
//! handshake directly from the interrupt path; every other notification is
//! queued there and delivered to subscribers later, from thread context, by
//! [`NotificationDispatcher::process_pending`].

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use cadenza_hal::Completion;
use spin::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::header::{decode_notification, MsgExtension, MsgHeader, NotificationType};

/// Notifications held before the oldest are dropped
pub const NOTIFICATION_QUEUE_DEPTH: usize = 64;

// =============================================================================
// TYPES
// =============================================================================

/// Firmware boot progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FwBootState {
    /// Boot not attempted
    NotStarted,
    /// Waiting for firmware-ready
    BootInProgress,
    /// Firmware reported ready
    BootComplete,
    /// Boot timed out or was aborted
    BootFailed,
}

/// A queued firmware notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Raw header
    pub header: MsgHeader,
    /// Raw extension
    pub extension: MsgExtension,
    /// Decoded type, if known
    pub kind: Option<NotificationType>,
}

/// Subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Notification callback
pub type NotificationHandler = Box<dyn Fn(&Notification) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    /// `None` receives every notification
    topic: Option<NotificationType>,
    handler: NotificationHandler,
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// Router for firmware-initiated messages
pub struct NotificationDispatcher {
    boot_state: Mutex<FwBootState>,
    queue: Mutex<VecDeque<Notification>>,
    subscriptions: RwLock<Vec<Subscription>>,
    completion: Arc<dyn Completion>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl NotificationDispatcher {
    /// Create a dispatcher waking boot waiters through `completion`
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self {
            boot_state: Mutex::new(FwBootState::NotStarted),
            queue: Mutex::new(VecDeque::with_capacity(NOTIFICATION_QUEUE_DEPTH)),
            subscriptions: RwLock::new(Vec::new()),
            completion,
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Current boot state
    pub fn boot_state(&self) -> FwBootState {
        *self.boot_state.lock()
    }

    /// Start waiting for firmware-ready
    pub fn begin_boot(&self) {
        *self.boot_state.lock() = FwBootState::BootInProgress;
    }

    /// Abort the boot handshake
    pub fn fail_boot(&self) {
        *self.boot_state.lock() = FwBootState::BootFailed;
        self.completion.wake();
    }

    /// Forget boot progress, e.g. after the firmware is unloaded
    pub fn reset_boot(&self) {
        *self.boot_state.lock() = FwBootState::NotStarted;
    }

    /// Block until firmware-ready arrives or `timeout` elapses
    pub fn wait_fw_ready(&self, timeout: Duration) -> Result<()> {
        self.completion.wait_timeout(timeout, &|| {
            matches!(
                *self.boot_state.lock(),
                FwBootState::BootComplete | FwBootState::BootFailed
            )
        });

        let mut state = self.boot_state.lock();
        match *state {
            FwBootState::BootComplete => Ok(()),
            FwBootState::BootInProgress => {
                *state = FwBootState::BootFailed;
                log::error!("ipc: firmware boot timed out after {:?}", timeout);
                Err(Error::FirmwareNotReady)
            },
            _ => Err(Error::FirmwareNotReady),
        }
    }

    /// Classify a firmware-initiated message; interrupt context
    pub fn dispatch(&self, header: MsgHeader, extension: MsgExtension) {
        let decoded = decode_notification(header);
        if !decoded.is_notification() {
            log::warn!(
                "ipc: ignoring firmware message type {} header {:#010x}",
                decoded.msg_type,
                header.raw()
            );
            return;
        }

        let kind = decoded.kind();
        if kind == Some(NotificationType::FwReady) {
            self.firmware_ready();
            return;
        }

        let mut queue = self.queue.lock();
        if queue.len() >= NOTIFICATION_QUEUE_DEPTH {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(Notification {
            header,
            extension,
            kind,
        });
    }

    fn firmware_ready(&self) {
        let mut state = self.boot_state.lock();
        if *state != FwBootState::BootInProgress {
            log::warn!("ipc: unexpected firmware ready in state {:?}", *state);
            return;
        }
        *state = FwBootState::BootComplete;
        drop(state);
        log::info!("ipc: firmware ready");
        self.completion.wake();
    }

    /// Register a handler for `topic`, or for everything with `None`
    pub fn subscribe(&self, topic: Option<NotificationType>, handler: NotificationHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription { id, topic, handler });
        id
    }

    /// Remove a handler
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|sub| sub.id != id);
        subs.len() != before
    }

    /// Deliver queued notifications; thread context. Returns the count.
    ///
    /// Handlers run under the subscription lock and must not subscribe.
    pub fn process_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            let Some(notification) = self.queue.lock().pop_front() else {
                break;
            };
            let subs = self.subscriptions.read();
            let mut seen = false;
            for sub in subs.iter().filter(|s| s.topic.is_none() || s.topic == notification.kind) {
                (sub.handler)(&notification);
                seen = true;
            }
            if !seen {
                log::debug!(
                    "ipc: no subscriber for notification {:#010x}",
                    notification.header.raw()
                );
            }
            delivered += 1;
        }
        delivered
    }

    /// Notifications waiting for delivery
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Notifications dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("boot_state", &self.boot_state())
            .field("pending", &self.pending())
            .field("subscriptions", &self.subscriptions.read().len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_hal::CondvarCompletion;
    use core::sync::atomic::AtomicUsize;
    use crate::header::GlobalMsgType;

    fn dispatcher() -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(CondvarCompletion::new()))
    }

    fn notification(kind: NotificationType) -> MsgHeader {
        MsgHeader::global(GlobalMsgType::Notification).with_instance(kind.raw())
    }

    #[test]
    fn test_fw_ready_completes_boot() {
        let d = dispatcher();
        d.begin_boot();
        d.dispatch(notification(NotificationType::FwReady), MsgExtension::EMPTY);
        assert_eq!(d.boot_state(), FwBootState::BootComplete);
        assert!(d.wait_fw_ready(Duration::from_millis(10)).is_ok());
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn test_fw_ready_outside_boot_ignored() {
        let d = dispatcher();
        d.dispatch(notification(NotificationType::FwReady), MsgExtension::EMPTY);
        assert_eq!(d.boot_state(), FwBootState::NotStarted);
    }

    #[test]
    fn test_boot_timeout() {
        let d = dispatcher();
        d.begin_boot();
        assert_eq!(d.wait_fw_ready(Duration::from_millis(20)), Err(Error::FirmwareNotReady));
        assert_eq!(d.boot_state(), FwBootState::BootFailed);
    }

    #[test]
    fn test_non_notification_ignored() {
        let d = dispatcher();
        d.dispatch(MsgHeader::global(GlobalMsgType::CreatePipeline), MsgExtension::EMPTY);
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn test_delivery_by_topic() {
        let d = dispatcher();
        let resource = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));
        {
            let resource = resource.clone();
            d.subscribe(
                Some(NotificationType::ResourceEvent),
                Box::new(move |_| {
                    resource.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        let all_id = {
            let all = all.clone();
            d.subscribe(
                None,
                Box::new(move |_| {
                    all.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };

        d.dispatch(notification(NotificationType::ResourceEvent), MsgExtension::from_raw(3));
        d.dispatch(notification(NotificationType::LogBufferStatus), MsgExtension::EMPTY);
        assert_eq!(d.pending(), 2);
        assert_eq!(resource.load(Ordering::SeqCst), 0);

        assert_eq!(d.process_pending(), 2);
        assert_eq!(resource.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);

        assert!(d.unsubscribe(all_id));
        assert!(!d.unsubscribe(all_id));
        d.dispatch(notification(NotificationType::ResourceEvent), MsgExtension::EMPTY);
        d.process_pending();
        assert_eq!(all.load(Ordering::SeqCst), 2);
        assert_eq!(resource.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_queue_overflow_drops_oldest() {
        let d = dispatcher();
        for i in 0..NOTIFICATION_QUEUE_DEPTH + 3 {
            d.dispatch(
                notification(NotificationType::TimestampCaptured),
                MsgExtension::from_raw(i as u32),
            );
        }
        assert_eq!(d.pending(), NOTIFICATION_QUEUE_DEPTH);
        assert_eq!(d.dropped(), 3);
        let first = d.queue.lock().front().copied().unwrap();
        assert_eq!(first.extension.raw(), 3);
    }
}
