//! The closed error/status taxonomy used throughout the async core.
//!
//! `Status` plays the role an NTSTATUS-style code plays in a kernel-like
//! object server: it is both the "this call failed" error type and the
//! terminal value stored in an [`crate::iosb::Iosb`] once an async
//! completes. `Pending` and `Alerted` are not failures at all: they are
//! valid, expected values of the same enum, which is why every fallible
//! entry point in this crate returns `Status` rather than splitting
//! "errors" and "in-band completion codes" into two types.

use std::fmt;

/// Status code reported by an async operation, stored in its IOSB, and
/// propagated to the client via APC / completion port / waitable handle.
///
/// `Pending` and `Alerted` are non-terminal from the core's point of view:
/// `Pending` means "not finished yet", and `Alerted` means "finished, but
/// the client has not yet acknowledged via [`crate::async_op::AsyncHandle::set_result`]".
/// Every other variant is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Status {
  /// The operation has not completed yet.
  Pending,
  /// The operation completed and the client has been notified, but has not
  /// yet acknowledged (see [`crate::async_op::AsyncHandle::set_result`]).
  Alerted,
  /// The operation completed successfully.
  Success,
  /// The operation was cancelled via `cancel_async`.
  Cancelled,
  /// A caller-chosen timeout fired before the operation completed.
  Timeout,
  /// The owning fd (or its queue) was torn down while the async was live.
  HandlesClosed,
  /// A request's parameters violated a core invariant (e.g. a completion
  /// port and a client APC were both requested at creation time).
  InvalidParameter,
  /// `cancel_async` was given an iosb cookie filter that matched nothing.
  NotFound,
  /// An allocation failed.
  NoMemory,
  /// A caller-supplied terminal status outside the above set (e.g. an I/O
  /// error code from the embedding host's own error space).
  Other(u32),
}

impl Status {
  /// `true` for [`Status::Pending`], the only status under which an
  /// [`crate::iosb::Iosb`] is not yet considered terminated.
  pub const fn is_pending(self) -> bool {
    matches!(self, Status::Pending)
  }

  /// `true` for anything other than [`Status::Pending`] and
  /// [`Status::Success`], i.e. this status represents a failure a client
  /// should surface, as opposed to a routine non-terminal or successful
  /// state.
  pub const fn is_error(self) -> bool {
    !matches!(self, Status::Pending | Status::Alerted | Status::Success)
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Status::Pending => f.write_str("operation is pending"),
      Status::Alerted => f.write_str("operation alerted, awaiting client ack"),
      Status::Success => f.write_str("operation completed successfully"),
      Status::Cancelled => f.write_str("operation was cancelled"),
      Status::Timeout => f.write_str("operation timed out"),
      Status::HandlesClosed => f.write_str("owning handles were closed"),
      Status::InvalidParameter => f.write_str("invalid parameter"),
      Status::NotFound => f.write_str("no matching async found"),
      Status::NoMemory => f.write_str("allocation failed"),
      Status::Other(code) => write!(f, "status {code:#x}"),
    }
  }
}

impl std::error::Error for Status {}
