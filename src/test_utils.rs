//! In-memory fake collaborators.
//!
//! A minimal, synchronous, introspectable stand-in for every trait this
//! crate calls out to, so the async lifecycle core can be exercised without
//! a real fd subsystem, thread, timer wheel, or handle table behind it.
//! Exposed (but hidden from docs) so both this crate's unit tests and its
//! `tests/*.rs` integration tests can share one fake harness instead of each
//! hand-rolling their own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::async_op::AsyncHandle;
use crate::collab::{
  ApcCall, CompletionPort, EventObj, Fd, HandleTable, RequestReply, Thread,
  TimerQueue, WaitEntry,
};
use crate::error::Status;
use crate::ids::{AsyncId, CompKey, ObjHandle, ObjId};
use crate::iosb::OutBuf;

/// A fake fd: records reselect/signaled calls, optionally bound to a
/// completion port, and cancels synchronously the way a non-blocking
/// backend's `fd_cancel_async` would.
pub struct FakeFd {
  user: ObjId,
  overlapped: AtomicBool,
  signaled: AtomicBool,
  reselect_calls: AtomicU64,
  dequeued: Mutex<Vec<AsyncId>>,
  completion: Mutex<Option<(Arc<dyn CompletionPort>, CompKey)>>,
}

impl FakeFd {
  pub fn new(user: ObjId) -> Arc<Self> {
    Arc::new(FakeFd {
      user,
      overlapped: AtomicBool::new(true),
      signaled: AtomicBool::new(false),
      reselect_calls: AtomicU64::new(0),
      dequeued: Mutex::new(Vec::new()),
      completion: Mutex::new(None),
    })
  }

  pub fn set_overlapped(&self, overlapped: bool) {
    self.overlapped.store(overlapped, Ordering::SeqCst);
  }

  pub fn set_completion(&self, port: Arc<dyn CompletionPort>, key: CompKey) {
    *self.completion.lock().unwrap() = Some((port, key));
  }

  pub fn reselect_calls(&self) -> u64 {
    self.reselect_calls.load(Ordering::SeqCst)
  }

  pub fn is_signaled(&self) -> bool {
    self.signaled.load(Ordering::SeqCst)
  }

  pub fn dequeued(&self) -> Vec<AsyncId> {
    self.dequeued.lock().unwrap().clone()
  }
}

impl Fd for FakeFd {
  fn user(&self) -> ObjId {
    self.user
  }

  fn completion(&self) -> Option<(Arc<dyn CompletionPort>, CompKey)> {
    self.completion.lock().unwrap().clone()
  }

  fn reselect(&self) {
    self.reselect_calls.fetch_add(1, Ordering::SeqCst);
  }

  fn cancel_async(&self, async_: &AsyncHandle) {
    async_.terminate(Status::Cancelled);
  }

  fn dequeue(&self, async_id: AsyncId) {
    self.dequeued.lock().unwrap().push(async_id);
  }

  fn is_overlapped(&self) -> bool {
    self.overlapped.load(Ordering::SeqCst)
  }

  fn set_signaled(&self, signaled: bool) {
    self.signaled.store(signaled, Ordering::SeqCst);
  }
}

/// A fake client thread: records every APC queued to it instead of
/// delivering it anywhere. Tests that want to exercise the reentrancy this
/// crate is built to tolerate can call [`FakeThread::reply_synchronously`]
/// to have queued `ASYNC_IO` APCs immediately trigger a matching
/// `set_result` call, the way a cooperative client stub might.
pub struct FakeThread {
  apcs: Mutex<Vec<ApcCall>>,
}

impl FakeThread {
  pub fn new() -> Arc<Self> {
    Arc::new(FakeThread { apcs: Mutex::new(Vec::new()) })
  }

  pub fn apcs(&self) -> Vec<ApcCall> {
    self.apcs.lock().unwrap().clone()
  }

  pub fn take_apcs(&self) -> Vec<ApcCall> {
    std::mem::take(&mut self.apcs.lock().unwrap())
  }
}

impl Thread for FakeThread {
  fn queue_apc(&self, _source: Option<&AsyncHandle>, call: ApcCall) {
    self.apcs.lock().unwrap().push(call);
  }
}

/// A fake timer queue: `arm` stores the callback instead of scheduling it;
/// tests fire it explicitly via [`FakeTimerQueue::fire`] / `fire_all`.
pub struct FakeTimerQueue {
  next: AtomicU64,
  pending: Mutex<HashMap<u64, Box<dyn FnOnce() + Send>>>,
}

impl FakeTimerQueue {
  pub fn new() -> Arc<Self> {
    Arc::new(FakeTimerQueue { next: AtomicU64::new(1), pending: Mutex::new(HashMap::new()) })
  }

  pub fn fire(&self, id: u64) {
    let cb = self.pending.lock().unwrap().remove(&id);
    if let Some(cb) = cb {
      cb();
    }
  }

  pub fn fire_all(&self) {
    let cbs: Vec<_> = self.pending.lock().unwrap().drain().map(|(_, c)| c).collect();
    for cb in cbs {
      cb();
    }
  }

  pub fn len(&self) -> usize {
    self.pending.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl TimerQueue for FakeTimerQueue {
  fn arm(&self, _delay: Duration, callback: Box<dyn FnOnce() + Send>) -> u64 {
    let id = self.next.fetch_add(1, Ordering::SeqCst);
    self.pending.lock().unwrap().insert(id, callback);
    id
  }

  fn cancel(&self, timer: u64) {
    self.pending.lock().unwrap().remove(&timer);
  }
}

/// One posted completion, captured for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRecord {
  pub key: CompKey,
  pub cvalue: u64,
  pub status: Status,
  pub information: u64,
}

/// A fake completion port: just records every post.
pub struct FakeCompletionPort {
  records: Mutex<Vec<CompletionRecord>>,
}

impl FakeCompletionPort {
  pub fn new() -> Arc<Self> {
    Arc::new(FakeCompletionPort { records: Mutex::new(Vec::new()) })
  }

  pub fn records(&self) -> Vec<CompletionRecord> {
    self.records.lock().unwrap().clone()
  }
}

impl CompletionPort for FakeCompletionPort {
  fn add_completion(&self, key: CompKey, cvalue: u64, status: Status, information: u64) {
    self.records.lock().unwrap().push(CompletionRecord { key, cvalue, status, information });
  }
}

/// A fake event object.
pub struct FakeEvent {
  set: AtomicBool,
}

impl FakeEvent {
  pub fn new() -> Arc<Self> {
    Arc::new(FakeEvent { set: AtomicBool::new(false) })
  }

  pub fn is_set(&self) -> bool {
    self.set.load(Ordering::SeqCst)
  }
}

impl EventObj for FakeEvent {
  fn set(&self) {
    self.set.store(true, Ordering::SeqCst);
  }

  fn reset(&self) {
    self.set.store(false, Ordering::SeqCst);
  }
}

/// A fake process handle table. [`FakeHandleTable::set_exhausted`] lets
/// tests exercise the "wait handle allocation fails" path in
/// `create_request_async`.
pub struct FakeHandleTable {
  next: AtomicU64,
  exhausted: AtomicBool,
  closed: Mutex<Vec<ObjHandle>>,
}

impl FakeHandleTable {
  pub fn new() -> Arc<Self> {
    Arc::new(FakeHandleTable {
      next: AtomicU64::new(1),
      exhausted: AtomicBool::new(false),
      closed: Mutex::new(Vec::new()),
    })
  }

  pub fn set_exhausted(&self, exhausted: bool) {
    self.exhausted.store(exhausted, Ordering::SeqCst);
  }

  pub fn closed(&self) -> Vec<ObjHandle> {
    self.closed.lock().unwrap().clone()
  }
}

impl HandleTable for FakeHandleTable {
  fn alloc(&self, _async_: Arc<AsyncHandle>) -> Option<ObjHandle> {
    if self.exhausted.load(Ordering::SeqCst) {
      return None;
    }
    Some(ObjHandle(self.next.fetch_add(1, Ordering::SeqCst)))
  }

  fn close(&self, handle: ObjHandle) {
    self.closed.lock().unwrap().push(handle);
  }
}

/// A fake wait-queue entry.
pub struct FakeWaitEntry {
  status: Mutex<Option<Status>>,
  woken: AtomicBool,
}

impl FakeWaitEntry {
  pub fn new() -> Arc<Self> {
    Arc::new(FakeWaitEntry { status: Mutex::new(None), woken: AtomicBool::new(false) })
  }

  pub fn status(&self) -> Option<Status> {
    *self.status.lock().unwrap()
  }

  pub fn woken(&self) -> bool {
    self.woken.load(Ordering::SeqCst)
  }
}

impl WaitEntry for FakeWaitEntry {
  fn set_status(&self, status: Status) {
    *self.status.lock().unwrap() = Some(status);
  }

  fn wake(&self) {
    self.woken.store(true, Ordering::SeqCst);
  }
}

/// A fake request/reply buffer.
pub struct FakeReply {
  max: usize,
  pub size: u64,
  pub data: Option<OutBuf>,
}

impl FakeReply {
  pub fn new(max: usize) -> Self {
    FakeReply { max, size: 0, data: None }
  }
}

impl RequestReply for FakeReply {
  fn req_data(&self) -> &[u8] {
    &[]
  }

  fn reply_max_size(&self) -> usize {
    self.max
  }

  fn set_reply_data(&mut self, data: OutBuf) {
    self.data = Some(data);
  }

  fn set_reply_size(&mut self, size: u64) {
    self.size = size;
  }
}

/// A bundle of one fake of each collaborator, enough to create and drive
/// asyncs in tests without repeating the boilerplate at every call site.
pub struct FakeCollaborators {
  fd: Arc<FakeFd>,
  thread: Arc<FakeThread>,
  timers: Arc<FakeTimerQueue>,
  handles: Arc<FakeHandleTable>,
}

impl FakeCollaborators {
  pub fn new() -> Self {
    FakeCollaborators {
      fd: FakeFd::new(ObjId(1)),
      thread: FakeThread::new(),
      timers: FakeTimerQueue::new(),
      handles: FakeHandleTable::new(),
    }
  }

  pub fn fd(&self) -> Arc<dyn Fd> {
    self.fd.clone()
  }

  pub fn fake_fd(&self) -> Arc<FakeFd> {
    self.fd.clone()
  }

  pub fn thread(&self) -> Arc<dyn Thread> {
    self.thread.clone()
  }

  pub fn fake_thread(&self) -> Arc<FakeThread> {
    self.thread.clone()
  }

  pub fn timers(&self) -> Arc<dyn TimerQueue> {
    self.timers.clone()
  }

  pub fn fake_timers(&self) -> Arc<FakeTimerQueue> {
    self.timers.clone()
  }

  pub fn handle_table(&self) -> Arc<dyn HandleTable> {
    self.handles.clone()
  }

  pub fn fake_handles(&self) -> Arc<FakeHandleTable> {
    self.handles.clone()
  }
}

impl Default for FakeCollaborators {
  fn default() -> Self {
    Self::new()
  }
}
