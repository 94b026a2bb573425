//! The process-wide async registry (`process->asyncs`).
//!
//! Every live async is threaded onto an intrusive, non-owning list off its
//! owning process, used by `cancel_async` (filtered cancellation) and
//! `get_async_result` (lookup by the client's `user_arg`). It isn't an
//! owning reference; the list survives as long as the async does for
//! other reasons (a queue, a handle, a thread), and the async removes
//! itself on destruction. [`AsyncRegistry`] mirrors that directly with
//! `Weak` entries rather than a [`scc::HashMap`] of strong handles (a
//! generation-tagged slot arena doesn't apply here: that shape hands out
//! recyclable slot indices to a hot submission path, where this registry
//! only ever needs a stable id an async already carries and a place to
//! self-remove from).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_queue::ArrayQueue;

use crate::async_op::Async;
use crate::ids::AsyncId;
use crate::iosb::Iosb;

/// Process-wide, non-owning index of live asyncs (`process->asyncs`).
///
/// Ids are handed out from a recycled pool (`with_capacity`, a free-list of
/// recycled indices) without a generation tag: a slot arena typically needs
/// generations because it hands callers a strong index into a reused slot,
/// and a stale index would otherwise silently address a different, live
/// operation. Here the registry only ever holds [`Weak`] references, so a
/// stale id simply fails to upgrade: recycling ids just bounds the
/// table's size, it is never a safety requirement.
pub struct AsyncRegistry {
  entries: scc::HashMap<AsyncId, Weak<Async>>,
  next_id: AtomicU64,
  free_ids: ArrayQueue<AsyncId>,
}

impl AsyncRegistry {
  pub fn new() -> Arc<Self> {
    Self::with_capacity(1024)
  }

  /// `with_capacity`: sizes the id-recycling pool to `cap` so a host can
  /// match it to its expected concurrent-request count. `cap` must be a
  /// power of two.
  pub fn with_capacity(cap: usize) -> Arc<Self> {
    assert!(cap.is_power_of_two(), "capacity provided was not a power of 2, provided value = {cap}");
    Arc::new(AsyncRegistry {
      entries: scc::HashMap::with_capacity(cap),
      next_id: AtomicU64::new(0),
      free_ids: ArrayQueue::new(cap),
    })
  }

  /// Allocates a fresh [`AsyncId`], preferring a recycled one.
  pub(crate) fn alloc_id(&self) -> AsyncId {
    self.free_ids.pop().unwrap_or_else(|| AsyncId(self.next_id.fetch_add(1, Ordering::Relaxed)))
  }

  /// Registers `async_`. Called once, from [`crate::async_op::Async::create`].
  pub fn insert(&self, async_: &Arc<Async>) {
    let _ = self.entries.insert(async_.id(), Arc::downgrade(async_));
  }

  /// Deregisters `id`. Called from the async's own `Drop`, the way a host
  /// would remove the async's `process_entry` when its last reference goes
  /// away.
  pub fn remove(&self, id: AsyncId) {
    self.entries.remove(&id);
    let _ = self.free_ids.push(id);
  }

  /// `cancel_async`: cancels every live, non-terminated async matching
  /// `filter`, restarting the scan after each cancellation since
  /// [`crate::collab::Fd::cancel_async`] may synchronously terminate (and
  /// thus mutate) arbitrarily many other entries. Returns the count
  /// cancelled.
  pub fn cancel(&self, filter: impl Fn(&Async) -> bool) -> usize {
    let mut cancelled = 0;
    loop {
      let snapshot = self.snapshot();
      let Some(target) =
        snapshot.iter().find(|a| !a.is_terminated() && filter(a))
      else {
        break;
      };
      let Some(fd) = target.fd_for_cancel() else {
        continue;
      };
      fd.cancel_async(target);
      cancelled += 1;
    }
    cancelled
  }

  /// `cancel_process_asyncs`: cancels every live async unconditionally.
  pub fn cancel_all(&self) -> usize {
    self.cancel(|_| true)
  }

  /// `get_async_result`: the IOSB of the async whose `data.user` equals
  /// `user`, if one is currently registered.
  pub fn get_result(&self, user: u64) -> Option<Arc<Iosb>> {
    self.snapshot().into_iter().find(|a| a.user_data() == user).and_then(|a| a.iosb().cloned())
  }

  fn snapshot(&self) -> Vec<Arc<Async>> {
    let mut out = Vec::new();
    self.entries.scan(|_, weak| {
      if let Some(a) = weak.upgrade() {
        out.push(a);
      }
    });
    out
  }

  pub fn len(&self) -> usize {
    self.snapshot().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
