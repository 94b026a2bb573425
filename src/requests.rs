//! Client-visible request handlers: thin dispatch into the core. The
//! `cancel_async` and `get_async_result` request handlers are themselves
//! thin wrappers around `AsyncRegistry::cancel`/the process async list.

use std::sync::Arc;

use crate::collab::{RequestReply, Thread};
use crate::error::Status;
use crate::ids::{IosbCookie, ObjId};
use crate::registry::AsyncRegistry;

/// **cancel_async**(handle, only_thread, iosb): cancels every non-terminated
/// async in `registry` whose fd user, owning thread, and iosb cookie match
/// every filter that's `Some`. Returns the count cancelled;
/// [`Status::NotFound`] if `iosb_cookie` was given and nothing matched.
pub fn cancel_async(
  registry: &AsyncRegistry,
  obj: Option<ObjId>,
  thread: Option<&Arc<dyn Thread>>,
  iosb_cookie: Option<IosbCookie>,
) -> Result<usize, Status> {
  let cancelled = registry.cancel(|async_| {
    if let Some(obj) = obj {
      if async_.fd_user() != Some(obj) {
        return false;
      }
    }
    if let Some(thread) = thread {
      if !async_.owned_by(thread) {
        return false;
      }
    }
    if let Some(cookie) = iosb_cookie {
      if async_.iosb_cookie() != cookie {
        return false;
      }
    }
    true
  });

  if cancelled == 0 && iosb_cookie.is_some() {
    return Err(Status::NotFound);
  }
  Ok(cancelled)
}

/// **get_async_result**(user_arg): finds the first async in `registry`
/// whose `data.user == user_arg`; if none, [`Status::InvalidParameter`];
/// else delivers its iosb's output buffer into `reply` (detaching
/// ownership) and returns the iosb's status.
pub fn get_async_result(
  registry: &AsyncRegistry,
  user_arg: u64,
  reply: &mut dyn RequestReply,
) -> Status {
  match registry.get_result(user_arg) {
    None => Status::InvalidParameter,
    Some(iosb) => iosb.deliver_to(reply),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::async_op::{Async, AsyncData};
  use crate::collab::CompFlags;
  use crate::error::Status;
  use crate::ids::IosbCookie;
  use crate::test_utils::{FakeCollaborators, FakeReply};

  fn data(user: u64, cookie: u64) -> AsyncData {
    AsyncData { user, apc: None, apc_context: 0, iosb_cookie: IosbCookie(cookie) }
  }

  #[test]
  fn cancel_async_with_no_filters_cancels_everything() {
    let col = FakeCollaborators::new();
    let registry = AsyncRegistry::new();
    let a = Async::create(
      col.fd(),
      col.thread(),
      col.timers(),
      data(1, 1),
      None,
      Some(crate::iosb::Iosb::new(IosbCookie(1))),
      &registry,
    )
    .expect("create");
    let b = Async::create(
      col.fd(),
      col.thread(),
      col.timers(),
      data(2, 2),
      None,
      Some(crate::iosb::Iosb::new(IosbCookie(2))),
      &registry,
    )
    .expect("create");

    let cancelled = cancel_async(&registry, None, None, None).expect("cancel");
    assert_eq!(cancelled, 2);
    assert!(a.is_terminated());
    assert!(b.is_terminated());
    assert_eq!(a.iosb().unwrap().status(), Status::Cancelled);
  }

  #[test]
  fn cancel_async_second_pass_reports_not_found_for_cookie_filter() {
    let col = FakeCollaborators::new();
    let registry = AsyncRegistry::new();
    let _a = Async::create(
      col.fd(),
      col.thread(),
      col.timers(),
      data(1, 1),
      None,
      Some(crate::iosb::Iosb::new(IosbCookie(1))),
      &registry,
    )
    .expect("create");

    assert_eq!(cancel_async(&registry, None, None, None).unwrap(), 1);
    let err = cancel_async(&registry, None, None, Some(IosbCookie(1))).unwrap_err();
    assert_eq!(err, Status::NotFound);
  }

  #[test]
  fn get_async_result_returns_invalid_parameter_when_not_found() {
    let registry = AsyncRegistry::new();
    let mut reply = FakeReply::new(64);
    assert_eq!(get_async_result(&registry, 42, &mut reply), Status::InvalidParameter);
  }

  #[test]
  fn get_async_result_delivers_output_and_status() {
    let col = FakeCollaborators::new();
    let registry = AsyncRegistry::new();
    let (async_, _handle) = Async::create_request_async(
      col.fd(),
      col.thread(),
      col.timers(),
      col.handle_table(),
      CompFlags::NONE,
      data(42, 42),
      None,
      &registry,
    )
    .expect("create");
    async_.iosb().unwrap().complete(Status::Success, 16, Some(vec![9u8; 16].into()));

    let mut reply = FakeReply::new(64);
    let status = get_async_result(&registry, 42, &mut reply);
    assert_eq!(status, Status::Success);
    assert_eq!(reply.size, 16);
    assert_eq!(reply.data.unwrap().as_slice(), &[9u8; 16]);
  }
}
