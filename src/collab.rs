//! Collaborator trait boundaries.
//!
//! Everything in this module is something the async core *calls into* but
//! does not implement: the fd subsystem, the APC delivery mechanism, the
//! completion-port object, the event primitive, the generic wait-queue
//! machinery, the handle table, and the timer-user framework. A C-style
//! kernel object server would wire these up as plain function pointers
//! against a concrete object model; here they are trait objects the
//! embedding host supplies, so the async core's waitable-object behavior is
//! expressed against a fixed interface rather than a concrete backend.

use std::time::Duration;

use crate::async_op::AsyncHandle;
use crate::error::Status;
use crate::ids::{CompKey, ObjHandle, ObjId};
use std::sync::Arc;

/// The `data.apc` payload carried by an async, forwarded opaquely to the
/// client: the server never calls through it, it only reports it back in
/// `APC_USER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApcTarget {
  /// Client-supplied function pointer, opaque to the server.
  pub func: u64,
  /// Client-supplied context argument, opaque to the server.
  pub context: u64,
}

/// Completion-port reporting flags attached to a request-based async at
/// creation time (mirrors `FILE_SKIP_COMPLETION_PORT_ON_SUCCESS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompFlags(u32);

impl CompFlags {
  pub const NONE: CompFlags = CompFlags(0);
  pub const SKIP_COMPLETION_PORT_ON_SUCCESS: CompFlags = CompFlags(1 << 1);

  pub const fn contains(self, other: CompFlags) -> bool {
    self.0 & other.0 == other.0
  }
}

impl std::ops::BitOr for CompFlags {
  type Output = CompFlags;
  fn bitor(self, rhs: CompFlags) -> CompFlags {
    CompFlags(self.0 | rhs.0)
  }
}

/// Wire-visible APC payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApcCall {
  /// `APC_ASYNC_IO { user, sb, status }`. `status` is [`Status::Alerted`]
  /// when the client must make an extra round trip to fetch result data,
  /// otherwise the async's terminal status.
  AsyncIo { user: u64, iosb_cookie: u64, status: Status },
  /// `APC_USER { func, args: [apc_context, iosb_cookie, 0] }`.
  User { func: u64, apc_context: u64, iosb_cookie: u64 },
}

/// The client thread an async is bound to, and the only path by which the
/// core delivers an APC.
///
/// `source` is `Some` only for the `ASYNC_IO` APC queued from
/// [`crate::async_op::AsyncHandle::terminate`]; it lets a host APC queue
/// keep the async alive across the call.
pub trait Thread: Send + Sync {
  /// Queues `call` for delivery to this thread. May run the client's reply
  /// (and thus re-enter [`AsyncHandle::set_result`]) synchronously before
  /// returning; the core is written to tolerate that.
  fn queue_apc(&self, source: Option<&AsyncHandle>, call: ApcCall);
}

/// An fd-backed resource an async is bound to.
pub trait Fd: Send + Sync {
  /// `get_fd_user`: identity used by `cancel_async`'s object filter.
  fn user(&self) -> ObjId;

  /// `fd_get_completion`: the completion port (and its key) associated
  /// with this fd, if any.
  fn completion(&self) -> Option<(Arc<dyn CompletionPort>, CompKey)>;

  /// `fd_reselect_async`: re-evaluate this fd's own queue after a state
  /// change on one of the asyncs it holds (the fd owns its
  /// [`crate::queue::AsyncQueue`] as a private field, so this doesn't need
  /// the queue passed in separately).
  fn reselect(&self);

  /// `fd_cancel_async`: cancel `async_` at the fd layer. Implementations
  /// are expected to synchronously call
  /// `async_.terminate(Status::Cancelled)` once the underlying I/O has been
  /// cancelled (or immediately, if cancellation is itself synchronous);
  /// this is the re-entrant call the core's concurrency model is built
  /// around.
  fn cancel_async(&self, async_: &AsyncHandle);

  /// Detaches `async_id` from this fd's queue, if it is still on it. A
  /// no-op if it already isn't, callers need not track queued-ness
  /// themselves.
  fn dequeue(&self, async_id: crate::ids::AsyncId);

  /// `is_fd_overlapped`: whether this fd's I/O may legitimately return
  /// PENDING and complete later.
  fn is_overlapped(&self) -> bool;

  /// `set_fd_signaled`: raise or clear this fd's own signalled flag (used
  /// when an async without an explicit event completes).
  fn set_signaled(&self, signaled: bool);
}

/// A completion port associated with an fd.
pub trait CompletionPort: Send + Sync {
  fn add_completion(
    &self,
    key: CompKey,
    cvalue: u64,
    status: Status,
    information: u64,
  );
}

/// A waitable event object.
pub trait EventObj: Send + Sync {
  fn set(&self);
  fn reset(&self);
}

/// One registered waiter on an async's waitable-object surface
/// (`add_queue` / `remove_queue` / `set_wait_status`).
pub trait WaitEntry: Send + Sync {
  /// `set_wait_status`: record the status the waiter should observe.
  fn set_status(&self, status: Status);
  /// `wake_up`: notify this waiter that the object it's waiting on may now
  /// be satisfiable.
  fn wake(&self);
}

/// The owning process's handle table (`alloc_handle` / `close_handle`),
/// used only for the preallocated waitable `wait_handle`.
pub trait HandleTable: Send + Sync {
  /// `alloc_handle(process, obj, SYNCHRONIZE, 0)`.
  fn alloc(&self, async_: Arc<AsyncHandle>) -> Option<ObjHandle>;
  /// `close_handle(process, handle)`.
  fn close(&self, handle: ObjHandle);
}

/// A single-shot timer (`add_timeout_user` / `remove_timeout_user`).
pub trait TimerQueue: Send + Sync {
  /// Arms a timer that invokes `callback` once after `delay`. Returns an
  /// opaque handle that can be passed to [`TimerQueue::cancel`].
  fn arm(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> u64;
  /// Cancels a previously armed timer. A no-op if it already fired.
  fn cancel(&self, timer: u64);
}

/// The request/reply marshalling layer backing a single client request
/// (`get_req_data` / `get_req_data_size` / `get_reply_max_size` /
/// `set_reply_data_ptr`).
pub trait RequestReply {
  /// `get_req_data` + `get_req_data_size`.
  fn req_data(&self) -> &[u8];
  /// `get_reply_max_size`.
  fn reply_max_size(&self) -> usize;
  /// `set_reply_data_ptr`: hands ownership of `data` to the reply path.
  fn set_reply_data(&mut self, data: crate::iosb::OutBuf);
  /// The reply's `size` field, written with the IOSB's `result`.
  fn set_reply_size(&mut self, size: u64);
}
