//! # kio: the async I/O lifecycle core of a kernel-like object server
//!
//! `kio` is the part of a multi-process, kernel-like object server that
//! mediates overlapped I/O between client processes and file-descriptor
//! backed resources: the lifecycle manager for a single outstanding
//! asynchronous operation. An [`Async`] is simultaneously a waitable
//! primitive, a queue entry, a timer owner, a completion-port client and an
//! APC source, and this crate keeps it consistent under arbitrary
//! interleavings of cancellation, timeout, client-side reply, and teardown
//! of the fd/thread/process it's bound to.
//!
//! This crate does **not** implement the fd subsystem, the APC delivery
//! mechanism, the completion-port object, the event primitive, the
//! wait-queue framework, the handle table, the timer wheel, or the
//! request/reply marshalling layer; those are collaborators a host
//! implements against the traits in [`collab`]. See that module's
//! documentation for the full boundary.
//!
//! ## Core types
//!
//! - [`Iosb`] is the terminal record of a single async: status, result
//!   count, optional output buffer.
//! - [`Async`] is the state machine itself.
//! - [`AsyncQueue`] is the per-fd FIFO a host's [`collab::Fd`] embeds.
//! - [`AsyncRegistry`] is the process-wide index backing `cancel_async` and
//!   `get_async_result`.
//!
//! ## A minimal walkthrough
//!
//! ```rust
//! use kio::{AsyncData, AsyncRegistry, Async, CompFlags, IosbCookie, Status};
//! use kio::test_utils::{FakeCollaborators, FakeReply};
//!
//! let registry = AsyncRegistry::new();
//! let collaborators = FakeCollaborators::new();
//!
//! let (async_op, _wait_handle) = Async::create_request_async(
//!     collaborators.fd(),
//!     collaborators.thread(),
//!     collaborators.timers(),
//!     collaborators.handle_table(),
//!     CompFlags::NONE,
//!     AsyncData { user: 1, apc: None, apc_context: 0, iosb_cookie: IosbCookie(1) },
//!     None,
//!     &registry,
//! ).expect("create_request_async");
//!
//! // The handler completed synchronously with 8 bytes of result data, and
//! // delivers it to the reply itself before handing off.
//! async_op.iosb().unwrap().complete(Status::Success, 8, Some(vec![0u8; 8].into()));
//! let mut reply = FakeReply::new(64);
//! async_op.iosb().unwrap().deliver_to(&mut reply);
//!
//! let (status, result, wait_handle) = async_op.handoff(Status::Success, &mut reply, false);
//! assert_eq!(status, Status::Success);
//! assert_eq!(result, 8);
//! assert!(wait_handle.is_none()); // delivered inline, no round trip needed
//! ```

pub mod async_op;
pub mod collab;
pub mod error;
pub mod ids;
pub mod iosb;
pub mod queue;
pub mod registry;
pub mod requests;
mod sync;

#[cfg_attr(docsrs, doc(hidden))]
pub mod test_utils;

pub use async_op::{Async, AsyncData, AsyncHandle};
pub use collab::{
  ApcCall, ApcTarget, CompFlags, CompletionPort, EventObj, Fd, HandleTable,
  RequestReply, Thread, TimerQueue, WaitEntry,
};
pub use error::Status;
pub use ids::{AsyncId, CompKey, IosbCookie, ObjHandle, ObjId};
pub use iosb::{Iosb, OutBuf};
pub use queue::AsyncQueue;
pub use registry::AsyncRegistry;
pub use requests::{cancel_async, get_async_result};
