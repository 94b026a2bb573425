//! Small opaque identifier types shared across the core.
//!
//! These stand in for raw pointer identity (`get_fd_user(fd) == obj`,
//! `async->data.iosb == iosb`). The host assigns them; the core only ever
//! compares them for equality.

use std::fmt;

macro_rules! opaque_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct $name(pub u64);

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", stringify!($name), self.0)
      }
    }
  };
}

opaque_id!(
  /// Identity of an fd's `get_fd_user` object, used to match `cancel_async`'s
  /// `obj_filter` against the fd an async is (or was) bound to.
  ObjId
);

opaque_id!(
  /// Opaque client-side pointer used to correlate an IOSB across the
  /// request/reply boundary; matched by `cancel_async`'s iosb-cookie filter
  /// and returned unchanged in `APC_USER`'s second argument.
  IosbCookie
);

opaque_id!(
  /// Completion-key associated with an fd's completion port, returned by
  /// the `Fd::completion` collaborator hook and forwarded verbatim to
  /// `CompletionPort::add_completion`.
  CompKey
);

opaque_id!(
  /// A preallocated waitable handle on the owning process's handle table.
  /// Zero is used as the sentinel for "no handle", the way a null
  /// `obj_handle_t` would be used in a C implementation.
  ObjHandle
);

opaque_id!(
  /// Stable key identifying an [`crate::async_op::Async`] inside an
  /// [`crate::registry::AsyncRegistry`].
  AsyncId
);
