//! Per-fd async queues.
//!
//! An [`AsyncQueue`] is the FIFO a host's `Fd` implementation embeds for
//! each underlying resource: asyncs that can't complete synchronously wait
//! here in submission order. It's a plain data structure; readiness
//! evaluation and reselection are the host's job (via [`crate::collab::Fd`]),
//! this type only keeps the list and the handful of whole-queue operations
//! a host needs performed on it.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::async_op::Async;
use crate::error::Status;
use crate::ids::AsyncId;
use crate::sync::Mutex;

/// A FIFO queue of outstanding asyncs bound to a single fd.
#[derive(Default)]
pub struct AsyncQueue {
  entries: Mutex<VecDeque<Arc<Async>>>,
}

impl AsyncQueue {
  pub fn new() -> Self {
    AsyncQueue { entries: Mutex::new(VecDeque::new()) }
  }

  /// Sizes the backing deque's initial capacity to `cap`, the way a
  /// registry lets a host match it to its expected concurrent-request
  /// count. `cap` must be a power of two.
  pub fn with_capacity(cap: usize) -> Self {
    assert!(cap.is_power_of_two(), "capacity provided was not a power of 2, provided value = {cap}");
    AsyncQueue { entries: Mutex::new(VecDeque::with_capacity(cap)) }
  }

  /// `queue_async`: appends `async_` to the tail of the queue. The queue
  /// keeps a strong reference for as long as the async is on it.
  pub fn queue(&self, async_: Arc<Async>) {
    self.entries.lock().push_back(async_);
  }

  /// `free_async_queue`: terminates every queued async with
  /// [`Status::HandlesClosed`] and empties the queue, called when the fd
  /// owning this queue is being destroyed.
  pub fn free(&self) {
    let drained: Vec<_> = self.entries.lock().drain(..).collect();
    for async_ in drained {
      async_.terminate(Status::HandlesClosed);
    }
  }

  /// `async_waiting`: `true` if the head of the queue has not yet been
  /// terminated, i.e. there's still an operation a reselect could satisfy.
  pub fn is_waiting(&self) -> bool {
    self.entries.lock().front().is_some_and(|a| !a.is_terminated())
  }

  /// `find_pending_async`: the first non-terminated entry, if any.
  pub fn find_pending(&self) -> Option<Arc<Async>> {
    self.entries.lock().iter().find(|a| !a.is_terminated()).cloned()
  }

  /// `async_wake_up`: terminates queued asyncs with `status`, in order.
  /// When `status` is [`Status::Alerted`] only the first entry is woken:
  /// only a single ready result needs to be handed off at a time, and
  /// waking more would race the client over who services it.
  pub fn wake_up(&self, status: Status) {
    let snapshot: Vec<_> = self.entries.lock().iter().cloned().collect();
    for async_ in snapshot {
      async_.terminate(status);
      if status == Status::Alerted {
        break;
      }
    }
  }

  /// Removes `id` from the queue if present, returning it. Called from
  /// [`crate::async_op::Async::set_result`] once an async has been
  /// acknowledged by the client and no longer needs to occupy a slot.
  pub fn remove(&self, id: AsyncId) -> Option<Arc<Async>> {
    let mut entries = self.entries.lock();
    let pos = entries.iter().position(|a| a.id() == id)?;
    entries.remove(pos)
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ids::IosbCookie;
  use crate::registry::AsyncRegistry;
  use crate::test_utils::FakeCollaborators;

  fn make_async(col: &FakeCollaborators, registry: &Arc<AsyncRegistry>, user: u64) -> Arc<Async> {
    crate::async_op::Async::create(
      col.fd(),
      col.thread(),
      col.timers(),
      crate::async_op::AsyncData {
        user,
        apc: None,
        apc_context: 0,
        iosb_cookie: IosbCookie(user),
      },
      None,
      Some(crate::iosb::Iosb::new(IosbCookie(user))),
      registry,
    )
    .expect("create")
  }

  #[test]
  fn fifo_order_is_preserved() {
    let col = FakeCollaborators::new();
    let registry = AsyncRegistry::new();
    let queue = AsyncQueue::new();
    let a = make_async(&col, &registry, 1);
    let b = make_async(&col, &registry, 2);
    queue.queue(a.clone());
    queue.queue(b.clone());
    assert_eq!(queue.find_pending().unwrap().id(), a.id());
  }

  #[test]
  fn free_terminates_everything_with_handles_closed() {
    let col = FakeCollaborators::new();
    let registry = AsyncRegistry::new();
    let queue = AsyncQueue::new();
    let a = make_async(&col, &registry, 1);
    queue.queue(a.clone());
    queue.free();
    assert!(a.is_terminated());
    assert!(queue.is_empty());
  }

  #[test]
  fn wake_up_alerted_only_wakes_first() {
    let col = FakeCollaborators::new();
    let registry = AsyncRegistry::new();
    let queue = AsyncQueue::new();
    let a = make_async(&col, &registry, 1);
    let b = make_async(&col, &registry, 2);
    queue.queue(a.clone());
    queue.queue(b.clone());
    queue.wake_up(Status::Alerted);
    assert!(a.is_terminated());
    assert!(!b.is_terminated());
  }
}
