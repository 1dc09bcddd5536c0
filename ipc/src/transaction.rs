//! # Transaction Engine
//!
//! The only path by which a command becomes a firmware round trip.
//!
//! ```text
//!   caller thread                         interrupt path
//!   ─────────────                         ──────────────
//!   tx_lock ──┐
//!   write payload
//!   arm pending (complete = false)
//!   signal_request ───────── DSP ───────► take_reply
//!   wait_timeout ◄───────────────────────  pending: reply + complete = true
//!   classify reply                         wake, signal_reply_done
//!   tx_lock ──┘
//! ```
//!
//! One request is outstanding at a time. A caller that times out leaves the
//! slot behind; a reply that shows up later finds no matching request in
//! flight and is dropped.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cadenza_hal::{Completion, Mailbox};
use spin::Mutex;

use crate::config::IpcConfig;
use crate::error::{Error, Result};
use crate::header::{
    MsgExtension, MsgHeader, MAX_LARGE_CONFIG_BLOCK, MSG_TARGET_MASK, MSG_TYPE_MASK,
};
use crate::notify::NotificationDispatcher;
use crate::status::FwStatus;

// =============================================================================
// REPLY
// =============================================================================

/// Reply words of a completed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Reply header
    pub header: MsgHeader,
    /// Reply extension
    pub extension: MsgExtension,
}

impl Reply {
    /// Firmware status
    pub fn status(&self) -> FwStatus {
        FwStatus::new(self.header.status())
    }
}

// =============================================================================
// PENDING TRANSACTION
// =============================================================================

#[derive(Debug, Default)]
struct PendingTransaction {
    header: MsgHeader,
    extension: MsgExtension,
    in_flight: bool,
    complete: bool,
    reply: Option<Reply>,
    reply_data: Vec<u8>,
}

impl PendingTransaction {
    fn arm(&mut self, header: MsgHeader, extension: MsgExtension, reply_len: usize) {
        self.header = header;
        self.extension = extension;
        self.in_flight = true;
        self.complete = false;
        self.reply = None;
        self.reply_data.clear();
        self.reply_data.resize(reply_len, 0);
    }

    fn retire(&mut self) -> Option<Reply> {
        self.in_flight = false;
        self.reply.take()
    }

    /// Whether `reply` answers the request in flight
    fn matches(&self, reply: MsgHeader) -> bool {
        const KEY: u32 = MSG_TARGET_MASK | MSG_TYPE_MASK;
        self.in_flight && !self.complete && reply.raw() & KEY == self.header.raw() & KEY
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Transaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    /// Requests handed to the firmware
    pub sent: u64,
    /// Replies matched to a request
    pub completed: u64,
    /// Replies with a non-zero status
    pub rejected: u64,
    /// Requests that got no reply in time
    pub timeouts: u64,
    /// Replies with no matching request
    pub stale_replies: u64,
    /// Large-config blocks sent
    pub fragments: u64,
}

#[derive(Debug, Default)]
struct TxCounters {
    sent: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    timeouts: AtomicU64,
    stale_replies: AtomicU64,
    fragments: AtomicU64,
}

impl TxCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TxStats {
        TxStats {
            sent: self.sent.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            stale_replies: self.stale_replies.load(Ordering::Relaxed),
            fragments: self.fragments.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// FRAGMENTATION
// =============================================================================

/// One block of a fragmented transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Byte offset into the payload
    pub offset: usize,
    /// Block length, never zero
    pub len: usize,
    /// First block of the transfer
    pub first: bool,
    /// Last block of the transfer
    pub last: bool,
}

/// Iterator splitting `total` bytes into blocks of at most `capacity`
#[derive(Debug, Clone)]
pub struct Fragments {
    total: usize,
    capacity: usize,
    offset: usize,
}

/// Split a payload of `total` bytes for a box of `capacity` bytes
pub fn fragments(total: usize, capacity: usize) -> Fragments {
    Fragments {
        total,
        capacity,
        offset: 0,
    }
}

impl Iterator for Fragments {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        if self.offset >= self.total || self.capacity == 0 {
            return None;
        }
        let len = (self.total - self.offset).min(self.capacity);
        let fragment = Fragment {
            offset: self.offset,
            len,
            first: self.offset == 0,
            last: self.offset + len == self.total,
        };
        self.offset += len;
        Some(fragment)
    }
}

// =============================================================================
// TRANSMIT LOCK
// =============================================================================

/// Serializes round trips; a contending caller sleeps under `std`
#[derive(Debug, Default)]
struct TxLock {
    #[cfg(feature = "std")]
    inner: std::sync::Mutex<()>,
    #[cfg(not(feature = "std"))]
    inner: Mutex<()>,
}

#[cfg(feature = "std")]
type TxGuard<'a> = std::sync::MutexGuard<'a, ()>;
#[cfg(not(feature = "std"))]
type TxGuard<'a> = spin::MutexGuard<'a, ()>;

impl TxLock {
    #[cfg(feature = "std")]
    fn lock(&self) -> TxGuard<'_> {
        // the lock guards no data
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[cfg(not(feature = "std"))]
    fn lock(&self) -> TxGuard<'_> {
        self.inner.lock()
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Serializing request/reply engine over a [`Mailbox`]
pub struct TransactionEngine {
    mailbox: Mailbox,
    config: IpcConfig,
    /// Held for a full round trip, call-thread context only
    tx_lock: TxLock,
    /// Short critical sections shared with the interrupt path
    pending: Mutex<PendingTransaction>,
    completion: Arc<dyn Completion>,
    notifications: NotificationDispatcher,
    disabled: AtomicBool,
    counters: TxCounters,
}

impl TransactionEngine {
    /// Create an engine; the mailbox must be negotiated already
    pub fn new(mailbox: Mailbox, config: IpcConfig, completion: Arc<dyn Completion>) -> Self {
        mailbox.enable_interrupts();
        Self {
            notifications: NotificationDispatcher::new(completion.clone()),
            mailbox,
            config,
            tx_lock: TxLock::default(),
            pending: Mutex::new(PendingTransaction::default()),
            completion,
            disabled: AtomicBool::new(false),
            counters: TxCounters::default(),
        }
    }

    /// Create an engine waiting on a condition variable
    #[cfg(feature = "std")]
    pub fn with_condvar(mailbox: Mailbox, config: IpcConfig) -> Self {
        Self::new(mailbox, config, Arc::new(cadenza_hal::CondvarCompletion::new()))
    }

    /// Engine configuration
    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    /// Underlying mailbox
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Firmware notification dispatcher
    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    /// Counter snapshot
    pub fn stats(&self) -> TxStats {
        self.counters.snapshot()
    }

    /// Refuse every further request
    pub fn disable(&self) {
        log::debug!("ipc: transport disabled");
        self.disabled.store(true, Ordering::Release);
    }

    /// Accept requests again
    pub fn enable(&self) {
        self.disabled.store(false, Ordering::Release);
    }

    /// Whether requests are refused
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Send a request and wait for its reply
    pub fn send(&self, header: MsgHeader, extension: MsgExtension, payload: &[u8]) -> Result<Reply> {
        self.transact(header, extension, payload, None)
    }

    /// Send a request and copy up to `reply_data.len()` reply bytes
    pub fn send_with_reply(
        &self,
        header: MsgHeader,
        extension: MsgExtension,
        payload: &[u8],
        reply_data: &mut [u8],
    ) -> Result<Reply> {
        self.transact(header, extension, payload, Some(reply_data))
    }

    /// Send `data` as a sequence of large-config-set blocks
    ///
    /// `header` must address the module instance. Blocks fill the outbound
    /// box; the first and last carry their flags. The first failing block
    /// aborts the transfer. Returns the number of blocks sent.
    pub fn send_large_config(&self, header: MsgHeader, param_id: u8, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(Error::InvalidParameter("empty large config payload"));
        }
        let capacity = self.mailbox.outbound_capacity().min(MAX_LARGE_CONFIG_BLOCK);

        let mut sent = 0;
        for fragment in fragments(data.len(), capacity) {
            let extension = MsgExtension::large_config(
                fragment.len as u32,
                param_id,
                fragment.first,
                fragment.last,
            );
            let block = &data[fragment.offset..fragment.offset + fragment.len];
            if let Err(err) = self.send(header, extension, block) {
                log::error!(
                    "ipc: large config block {} at offset {} failed for module {} instance {}: {}",
                    sent,
                    fragment.offset,
                    header.module_id(),
                    header.instance_id(),
                    err
                );
                return Err(err);
            }
            TxCounters::bump(&self.counters.fragments);
            sent += 1;
        }
        Ok(sent)
    }

    /// Read a configuration block into `buf`, returning its length
    pub fn get_large_config(&self, header: MsgHeader, param_id: u8, buf: &mut [u8]) -> Result<usize> {
        let capacity = self.mailbox.inbound_capacity().min(MAX_LARGE_CONFIG_BLOCK);
        let request_len = buf.len().min(capacity);
        let extension = MsgExtension::large_config(request_len as u32, param_id, true, true);
        let reply = self.send_with_reply(header, extension, &[], &mut buf[..request_len])?;
        Ok((reply.extension.block_size() as usize).min(request_len))
    }

    fn transact(
        &self,
        header: MsgHeader,
        extension: MsgExtension,
        payload: &[u8],
        reply_data: Option<&mut [u8]>,
    ) -> Result<Reply> {
        if self.is_disabled() {
            return Err(Error::Disabled);
        }
        let capacity = self.mailbox.outbound_capacity();
        if payload.len() > capacity {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                capacity,
            });
        }
        let reply_len = reply_data
            .as_ref()
            .map_or(0, |buf| buf.len().min(self.mailbox.inbound_capacity()));

        let _tx = self.tx_lock.lock();
        if self.is_disabled() {
            return Err(Error::Disabled);
        }

        log::debug!(
            "ipc: tx header {:#010x} extension {:#010x} payload {} bytes",
            header.raw(),
            extension.raw(),
            payload.len()
        );

        self.mailbox.write_outbound(0, payload)?;
        self.pending.lock().arm(header, extension, reply_len);
        self.mailbox.signal_request(header.raw(), extension.raw());
        TxCounters::bump(&self.counters.sent);

        self.completion
            .wait_timeout(self.config.tx_timeout, &|| self.pending.lock().complete);

        let mut pending = self.pending.lock();
        let reply = match pending.retire() {
            Some(reply) => reply,
            None => {
                drop(pending);
                TxCounters::bump(&self.counters.timeouts);
                log::error!(
                    "ipc: timed out for header {:#010x} extension {:#010x}",
                    header.raw(),
                    extension.raw()
                );
                return Err(Error::Timeout { header, extension });
            },
        };
        if let Some(buf) = reply_data {
            buf[..reply_len].copy_from_slice(&pending.reply_data[..reply_len]);
        }
        drop(pending);

        let status = reply.status();
        if !status.is_success() {
            TxCounters::bump(&self.counters.rejected);
            return Err(Error::Rejected { header, status });
        }
        Ok(reply)
    }

    // =========================================================================
    // INTERRUPT PATH
    // =========================================================================

    /// Service the doorbell interrupt
    ///
    /// Completes the pending transaction on a reply and queues firmware
    /// notifications. Never blocks. Returns whether any event was found.
    pub fn handle_irq(&self) -> bool {
        let mut handled = false;

        if let Some((header, extension)) = self.mailbox.take_reply() {
            self.complete(MsgHeader::from_raw(header), MsgExtension::from_raw(extension));
            self.mailbox.signal_reply_done();
            handled = true;
        }

        if let Some((header, extension)) = self.mailbox.take_notification() {
            let header = MsgHeader::from_raw(header);
            let extension = MsgExtension::from_raw(extension);
            if header.is_reply() {
                // cAVS firmware reports some replies as DSP-initiated messages
                self.complete(header, extension);
            } else {
                self.notifications.dispatch(header, extension);
            }
            self.mailbox.signal_notification_done();
            handled = true;
        }

        if !handled {
            log::trace!("ipc: spurious interrupt");
        }
        handled
    }

    fn complete(&self, header: MsgHeader, extension: MsgExtension) {
        let mut pending = self.pending.lock();
        if !pending.matches(header) {
            drop(pending);
            TxCounters::bump(&self.counters.stale_replies);
            log::warn!("ipc: dropping unexpected reply {:#010x}", header.raw());
            return;
        }

        if !pending.reply_data.is_empty() {
            if let Err(err) = self.mailbox.read_inbound(0, &mut pending.reply_data) {
                log::error!("ipc: failed to read reply payload: {}", err);
            }
        }
        pending.reply = Some(Reply { header, extension });
        pending.complete = true;
        drop(pending);

        let status = FwStatus::new(header.status());
        if !status.is_success() {
            log::error!("ipc: firmware reported error: {}", status);
        }
        TxCounters::bump(&self.counters.completed);
        self.completion.wake();
    }
}

impl fmt::Debug for TransactionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionEngine")
            .field("mailbox", &self.mailbox)
            .field("config", &self.config)
            .field("disabled", &self.is_disabled())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{GlobalMsgType, ModuleMsgType};
    use crate::sim::{SimFirmware, SimResponse};
    use alloc::string::ToString;
    use alloc::vec;
    use cadenza_hal::{MailboxLayout, MemoryMailboxHw, MAILBOX_DEFAULT_SIZE};
    use core::time::Duration;
    use std::thread;
    use std::time::Instant;

    fn set_header() -> MsgHeader {
        MsgHeader::module(ModuleMsgType::LargeConfigSet, 4, 1)
    }

    #[test]
    fn test_fragment_boundaries() {
        let cap = MAILBOX_DEFAULT_SIZE;
        assert_eq!(fragments(cap, cap).count(), 1);
        assert_eq!(fragments(cap - 1, cap).count(), 1);

        let split: Vec<_> = fragments(cap + 1, cap).collect();
        assert_eq!(split.len(), 2);
        assert_eq!(split[0], Fragment { offset: 0, len: cap, first: true, last: false });
        assert_eq!(split[1], Fragment { offset: cap, len: 1, first: false, last: true });
    }

    #[test]
    fn test_fragments_never_empty() {
        assert_eq!(fragments(0, 16).count(), 0);
        assert_eq!(fragments(16, 0).count(), 0);
        for total in 1..70 {
            let parts: Vec<_> = fragments(total, 16).collect();
            assert!(parts.iter().all(|f| f.len > 0));
            assert_eq!(parts.iter().map(|f| f.len).sum::<usize>(), total);
            assert!(parts[0].first);
            assert!(parts[parts.len() - 1].last);
            assert_eq!(parts.iter().filter(|f| f.last).count(), 1);
        }
    }

    #[test]
    fn test_send_success() {
        let sim = SimFirmware::start(|_| SimResponse::ok());
        let header = MsgHeader::global(GlobalMsgType::CreatePipeline).with_instance(1);
        let reply = sim.engine().send(header, MsgExtension::EMPTY, &[1, 2, 3]).unwrap();
        assert!(reply.header.is_reply());
        assert!(reply.status().is_success());

        let requests = sim.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header, header);
        assert_eq!(sim.engine().stats().completed, 1);
    }

    #[test]
    fn test_rejected_reports_status() {
        let sim = SimFirmware::start(|_| SimResponse::status(9));
        let header = MsgHeader::module(ModuleMsgType::Bind, 3, 1);
        let err = sim.engine().send(header, MsgExtension::EMPTY, &[]).unwrap_err();
        assert_eq!(err.status(), Some(FwStatus::NOT_FOUND));
        assert!(err.to_string().contains("resource not found"));
        assert_eq!(sim.engine().stats().rejected, 1);
    }

    #[test]
    fn test_timeout_waits_full_deadline() {
        let config = IpcConfig::default().with_tx_timeout(Duration::from_millis(60));
        let sim = SimFirmware::start_with_config(config, |_| SimResponse::Silent);
        let header = MsgHeader::global(GlobalMsgType::DeletePipeline);

        let start = Instant::now();
        let err = sim.engine().send(header, MsgExtension::EMPTY, &[]).unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(err, Error::Timeout { header, extension: MsgExtension::EMPTY });
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(sim.engine().stats().timeouts, 1);
    }

    #[test]
    fn test_disabled_fails_fast() {
        let sim = SimFirmware::start(|_| SimResponse::ok());
        sim.engine().disable();
        let header = MsgHeader::global(GlobalMsgType::CreatePipeline);
        assert_eq!(sim.engine().send(header, MsgExtension::EMPTY, &[]), Err(Error::Disabled));
        sim.flush();
        assert!(sim.requests().is_empty());

        sim.engine().enable();
        assert!(sim.engine().send(header, MsgExtension::EMPTY, &[]).is_ok());
    }

    #[test]
    fn test_payload_too_large() {
        let sim = SimFirmware::start(|_| SimResponse::ok());
        let big = vec![0u8; MAILBOX_DEFAULT_SIZE + 1];
        let err = sim
            .engine()
            .send(MsgHeader::module(ModuleMsgType::InitInstance, 1, 1), MsgExtension::EMPTY, &big)
            .unwrap_err();
        assert_eq!(
            err,
            Error::PayloadTooLarge { len: MAILBOX_DEFAULT_SIZE + 1, capacity: MAILBOX_DEFAULT_SIZE }
        );
    }

    #[test]
    fn test_large_config_fragment_counts() {
        let sim = SimFirmware::start(|_| SimResponse::ok());
        let cap = MAILBOX_DEFAULT_SIZE;

        for &(size, blocks) in &[(cap, 1usize), (cap - 1, 1), (cap + 1, 2)] {
            sim.clear_requests();
            let data: Vec<u8> = (0..size).map(|i| i as u8).collect();
            let sent = sim.engine().send_large_config(set_header(), 0x21, &data).unwrap();
            assert_eq!(sent, blocks);

            let requests = sim.requests();
            assert_eq!(requests.len(), blocks);
            for (idx, req) in requests.iter().enumerate() {
                assert_eq!(req.extension.is_first_block(), idx == 0);
                assert_eq!(req.extension.is_last_block(), idx == blocks - 1);
                assert_eq!(req.extension.param_id(), 0x21);
                assert_eq!(req.extension.block_size() as usize, req.payload.len());
            }
            let joined: Vec<u8> = requests.iter().flat_map(|r| r.payload.clone()).collect();
            assert_eq!(joined, data);
        }
    }

    #[test]
    fn test_large_config_aborts_on_failure() {
        let sim = SimFirmware::start(|req| {
            if req.extension.is_first_block() {
                SimResponse::ok()
            } else {
                SimResponse::status(121)
            }
        });
        let data = vec![7u8; 3 * MAILBOX_DEFAULT_SIZE];
        let err = sim.engine().send_large_config(set_header(), 1, &data).unwrap_err();
        assert_eq!(err.status(), Some(FwStatus::new(121)));
        assert_eq!(sim.requests().len(), 2);
        assert_eq!(sim.engine().stats().fragments, 1);
    }

    #[test]
    fn test_large_config_rejects_empty() {
        let sim = SimFirmware::start(|_| SimResponse::ok());
        assert!(matches!(
            sim.engine().send_large_config(set_header(), 1, &[]),
            Err(Error::InvalidParameter(_))
        ));
        sim.flush();
        assert!(sim.requests().is_empty());
    }

    #[test]
    fn test_get_large_config() {
        let sim = SimFirmware::start(|req| {
            SimResponse::ok()
                .with_extension(MsgExtension::large_config(5, req.extension.param_id(), true, true))
                .with_data(vec![10, 20, 30, 40, 50])
        });
        let header = MsgHeader::module(ModuleMsgType::LargeConfigGet, 4, 1);
        let mut buf = [0u8; 16];
        let len = sim.engine().get_large_config(header, 3, &mut buf).unwrap();
        assert_eq!(len, 5);
        assert_eq!(&buf[..len], &[10, 20, 30, 40, 50]);
        assert_eq!(sim.requests()[0].extension.block_size(), 16);
    }

    #[test]
    fn test_late_reply_is_absorbed() {
        let config = IpcConfig::default().with_tx_timeout(Duration::from_millis(30));
        let sim = SimFirmware::start_with_config(config, |_| SimResponse::Late {
            delay: Duration::from_millis(100),
            status: 0,
        });
        let header = MsgHeader::global(GlobalMsgType::SetPipelineState);
        assert!(matches!(
            sim.engine().send(header, MsgExtension::EMPTY, &[]),
            Err(Error::Timeout { .. })
        ));

        sim.flush();
        assert_eq!(sim.engine().stats().stale_replies, 1);

        sim.set_handler(|_| SimResponse::ok());
        assert!(sim.engine().send(header, MsgExtension::EMPTY, &[]).is_ok());
        assert_eq!(sim.engine().stats().completed, 1);
    }

    /// User plus system time of this process, in clock ticks
    #[cfg(target_os = "linux")]
    fn process_cpu_ticks() -> u64 {
        let stat = std::fs::read_to_string("/proc/self/stat").unwrap();
        let fields: Vec<&str> = stat[stat.rfind(')').unwrap() + 2..].split(' ').collect();
        fields[11].parse::<u64>().unwrap() + fields[12].parse::<u64>().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_contending_caller_sleeps() {
        let config = IpcConfig::default().with_tx_timeout(Duration::from_millis(400));
        let sim = SimFirmware::start_with_config(config, |_| SimResponse::Silent);
        let header = MsgHeader::global(GlobalMsgType::SetPipelineState);

        let first = {
            let engine = sim.engine().clone();
            thread::spawn(move || engine.send(header, MsgExtension::EMPTY, &[]))
        };
        thread::sleep(Duration::from_millis(20));

        let ticks = process_cpu_ticks();
        let start = Instant::now();
        let second = sim.engine().send(header, MsgExtension::EMPTY, &[]);
        let blocked = start.elapsed();
        let spent = process_cpu_ticks() - ticks;

        assert!(matches!(first.join().unwrap(), Err(Error::Timeout { .. })));
        assert!(matches!(second, Err(Error::Timeout { .. })));
        assert!(blocked >= Duration::from_millis(600));
        // ticks are 10 ms; a spinning waiter would account for ~78
        assert!(spent < 20, "waiting used {} cpu ticks over {:?}", spent, blocked);
    }

    #[test]
    fn test_concurrent_callers_are_serialized() {
        let sim = SimFirmware::start(|_| SimResponse::ok());
        let engine = sim.engine().clone();
        let workers: Vec<_> = (0..4u8)
            .map(|id| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for n in 0..10u16 {
                        let header = MsgHeader::module(ModuleMsgType::ConfigSet, n, id);
                        engine.send(header, MsgExtension::EMPTY, &[id]).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(sim.requests().len(), 40);
        assert_eq!(engine.stats().sent, 40);
        assert_eq!(engine.stats().completed, 40);
    }

    #[test]
    fn test_reply_through_dsp_request_register() {
        let hw = Arc::new(MemoryMailboxHw::new(2 * MAILBOX_DEFAULT_SIZE));
        let mailbox = Mailbox::new(hw.clone(), MailboxLayout::default()).unwrap();
        let engine = Arc::new(TransactionEngine::with_condvar(mailbox, IpcConfig::default()));
        let header = MsgHeader::global(GlobalMsgType::CreatePipeline);

        let caller = {
            let engine = engine.clone();
            thread::spawn(move || engine.send(header, MsgExtension::EMPTY, &[]))
        };
        while hw.fw_take_request().is_none() {
            thread::yield_now();
        }
        assert!(hw.fw_post_message(header.reply(0).raw(), 0));
        assert!(engine.handle_irq());

        assert!(caller.join().unwrap().is_ok());
        assert!(hw.fw_message_acked());
    }

    #[test]
    fn test_spurious_irq() {
        let hw = Arc::new(MemoryMailboxHw::new(2 * MAILBOX_DEFAULT_SIZE));
        let mailbox = Mailbox::new(hw.clone(), MailboxLayout::default()).unwrap();
        let engine = TransactionEngine::with_condvar(mailbox, IpcConfig::default());
        assert!(!engine.handle_irq());

        hw.fw_complete_request(MsgHeader::global(GlobalMsgType::CreatePipeline).reply(0).raw(), 0);
        assert!(engine.handle_irq());
        assert_eq!(engine.stats().stale_replies, 1);
    }
}
