//! I/O status blocks.
//!
//! An [`Iosb`] is the terminal record of a single async: the status it
//! finished with, the byte count it reports, and (optionally) an output
//! buffer the client fetches on its own terms rather than having pushed to
//! it. It's reference-counted because the owning [`crate::async_op::Async`]
//! and a client that calls `get_async_result` to fetch it may race.

use std::sync::Arc;

use crate::error::Status;
use crate::ids::IosbCookie;
use crate::sync::Mutex;

/// An IOSB's output payload, detached and handed to the request/reply layer
/// exactly once (`set_reply_data_ptr`'s ownership transfer).
#[derive(Debug, Clone)]
pub enum OutBuf {
  #[cfg(feature = "bytes")]
  Bytes(bytes::Bytes),
  Owned(Arc<[u8]>),
}

impl OutBuf {
  pub fn as_slice(&self) -> &[u8] {
    match self {
      #[cfg(feature = "bytes")]
      OutBuf::Bytes(b) => b,
      OutBuf::Owned(b) => b,
    }
  }

  pub fn len(&self) -> usize {
    self.as_slice().len()
  }

  pub fn is_empty(&self) -> bool {
    self.as_slice().is_empty()
  }
}

impl From<Vec<u8>> for OutBuf {
  fn from(v: Vec<u8>) -> Self {
    OutBuf::Owned(v.into())
  }
}

#[cfg(feature = "bytes")]
impl From<bytes::Bytes> for OutBuf {
  fn from(b: bytes::Bytes) -> Self {
    OutBuf::Bytes(b)
  }
}

#[derive(Debug, Default)]
struct IosbState {
  status: Option<Status>,
  result: u64,
  out: Option<OutBuf>,
  /// Set once the output buffer has been handed off to a request/reply
  /// layer via [`Iosb::deliver_to`]; a second attempt is a caller bug, not
  /// a race this type arbitrates.
  delivered: bool,
}

/// A single async's I/O status block: terminal status, result count, and an
/// optional output buffer.
///
/// Identified by an opaque [`IosbCookie`] the host assigns at creation time
/// and that the core never interprets beyond equality: comparing raw
/// `iosb` pointers for identity rather than interpreting them.
#[derive(Debug)]
pub struct Iosb {
  cookie: IosbCookie,
  state: Mutex<IosbState>,
}

impl Iosb {
  pub fn new(cookie: IosbCookie) -> Arc<Self> {
    Arc::new(Iosb { cookie, state: Mutex::new(IosbState::default()) })
  }

  pub fn cookie(&self) -> IosbCookie {
    self.cookie
  }

  /// `true` once a terminal status has been recorded (an IOSB without a
  /// status is still owned by a pending async).
  pub fn is_complete(&self) -> bool {
    self.state.lock().status.is_some()
  }

  /// Records the terminal status, result count and (optional) output
  /// buffer. Called exactly once, from
  /// [`crate::async_op::AsyncHandle::set_result`] at the point the async
  /// becomes terminal; a second call would indicate the core re-completed
  /// an async it shouldn't have, so it overwrites rather than panics;
  /// callers are expected to uphold the one-shot discipline themselves.
  pub fn complete(&self, status: Status, result: u64, out: Option<OutBuf>) {
    let mut state = self.state.lock();
    state.status = Some(status);
    state.result = result;
    state.out = out;
  }

  /// The status recorded by [`Iosb::complete`], or [`Status::Pending`] if
  /// none yet.
  pub fn status(&self) -> Status {
    self.state.lock().status.unwrap_or(Status::Pending)
  }

  pub fn result(&self) -> u64 {
    self.state.lock().result
  }

  /// Sets the terminal status only if none has been recorded yet, leaving
  /// any result or output buffer untouched. Used by
  /// [`crate::async_op::Async::terminate`], which only ever introduces a
  /// provisional status: the result and output data come later, from
  /// whichever of [`Iosb::complete`] or [`Iosb::set_final`] actually
  /// completes the request.
  pub fn set_status_if_pending(&self, status: Status) {
    let mut state = self.state.lock();
    if state.status.is_none() {
      state.status = Some(status);
    }
  }

  /// Overwrites the terminal status and result, leaving any output buffer
  /// untouched. Used by [`crate::async_op::Async::set_result`] to record
  /// the value a client reports back after performing I/O on the server's
  /// behalf, which never carries its own output buffer.
  pub fn set_final(&self, status: Status, result: u64) {
    let mut state = self.state.lock();
    state.status = Some(status);
    state.result = result;
  }

  /// `true` if an output buffer is recorded and has not yet been consumed
  /// by [`Iosb::deliver_to`].
  pub fn has_output(&self) -> bool {
    let state = self.state.lock();
    !state.delivered && state.out.is_some()
  }

  /// Detaches the output buffer into `reply`, per `set_reply_data_ptr`'s
  /// ownership-transfer semantics: copies up to `reply.reply_max_size()`
  /// bytes, truncating rather than dropping the data if it doesn't fit, and
  /// always returns the real terminal status. A buffer with no data at all
  /// is a no-op; not every request produces extra output data.
  pub fn deliver_to(&self, reply: &mut dyn crate::collab::RequestReply) -> Status {
    let mut state = self.state.lock();
    let Some(out) = state.out.take() else {
      return state.status.unwrap_or(Status::Pending);
    };
    state.delivered = true;
    let status = state.status.unwrap_or(Status::Pending);
    let result = state.result;
    let max = reply.reply_max_size();
    drop(state);
    reply.set_reply_size(result);
    if out.len() > max {
      reply.set_reply_data(OutBuf::Owned(out.as_slice()[..max].into()));
    } else {
      reply.set_reply_data(out);
    }
    status
  }
}
