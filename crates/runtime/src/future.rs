//! Promise/Future: a single-assignment cell with blocking wait.
//!
//! The Promise is the write end, the Future the read end; both are heap
//! objects sharing one completion cell. A Promise completes exactly once
//! (value or error); completing twice traps `DomainError`. `future_get`
//! blocks until completion and traps `DomainError` when the promise was
//! rejected; the timed and non-blocking variants return NULL instead of
//! trapping. Completion happens-before any observation of the value from
//! another thread (the cell's mutex orders the handoff).

use crate::heap::{self, RtHandle, RtStr};
use crate::string::str_bytes;
use crate::trap::{self, TrapKind};
use std::ptr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

enum Completion {
    Pending,
    /// Retained value handle (may be NULL).
    Value(RtHandle),
    Error(String),
}

struct Cell {
    completion: Mutex<Completion>,
    done: Condvar,
}

// The raw handle inside `Completion::Value` crosses threads; the cell's
// mutex serializes all access and the refcount is atomic.
unsafe impl Send for Cell {}
unsafe impl Sync for Cell {}

impl Drop for Cell {
    fn drop(&mut self) {
        let slot = self.completion.get_mut().expect("promise mutex poisoned");
        if let Completion::Value(v) = slot {
            heap::release(*v);
        }
    }
}

struct RtPromise {
    cell: Arc<Cell>,
    /// Lazily created, cached so repeated calls return the same Future.
    future: RtHandle,
}

struct RtFuture {
    cell: Arc<Cell>,
}

unsafe fn finalize_promise(p: RtHandle) {
    unsafe {
        let promise = &mut *(p as *mut RtPromise);
        heap::release(promise.future);
        ptr::drop_in_place(promise);
    }
}

unsafe fn finalize_future(p: RtHandle) {
    unsafe { ptr::drop_in_place(p as *mut RtFuture) };
}

fn get_promise<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtPromise> {
    let r = unsafe { heap::object_ref::<RtPromise>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("promise: {} on a null handle", op));
    }
    r
}

fn get_future<'a>(h: RtHandle, op: &str) -> Option<&'a RtFuture> {
    let r = unsafe { heap::object_ref::<RtFuture>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("future: {} on a null handle", op));
    }
    r.map(|f| &*f)
}

pub fn promise_new() -> RtHandle {
    let cell = Arc::new(Cell {
        completion: Mutex::new(Completion::Pending),
        done: Condvar::new(),
    });
    heap::alloc_object(
        RtPromise {
            cell,
            future: ptr::null_mut(),
        },
        finalize_promise,
    )
}

/// The Future tied to this Promise; every call returns the same object,
/// retained for the caller.
pub fn promise_get_future(h: RtHandle) -> RtHandle {
    let Some(promise) = get_promise(h, "get_future") else {
        return ptr::null_mut();
    };
    if promise.future.is_null() {
        promise.future = heap::alloc_object(
            RtFuture {
                cell: Arc::clone(&promise.cell),
            },
            finalize_future,
        );
    }
    heap::retain(promise.future);
    promise.future
}

fn complete(cell: &Cell, completion: Completion) -> bool {
    let mut slot = cell.completion.lock().expect("promise mutex poisoned");
    if !matches!(*slot, Completion::Pending) {
        if let Completion::Value(v) = completion {
            heap::release(v);
        }
        trap::raise(TrapKind::DomainError, "promise: completed twice");
        return false;
    }
    *slot = completion;
    cell.done.notify_all();
    true
}

/// Resolve with a value (retained by the promise until consumed or
/// dropped). Resolving or rejecting twice traps `DomainError`.
pub fn promise_set(h: RtHandle, value: RtHandle) {
    let Some(promise) = get_promise(h, "set") else { return };
    heap::retain(value);
    complete(&promise.cell, Completion::Value(value));
}

/// Reject with an error message. Resolving or rejecting twice traps
/// `DomainError`.
pub fn promise_set_error(h: RtHandle, error: RtStr) {
    let Some(promise) = get_promise(h, "set_error") else { return };
    let msg = String::from_utf8_lossy(unsafe { str_bytes(error) }).into_owned();
    complete(&promise.cell, Completion::Error(msg));
}

/// Block until completion. Returns a retained value handle, or traps
/// `DomainError` with the rejection message.
pub fn future_get(h: RtHandle) -> RtHandle {
    let Some(future) = get_future(h, "get") else {
        return ptr::null_mut();
    };
    let mut slot = future.cell.completion.lock().expect("promise mutex poisoned");
    while matches!(*slot, Completion::Pending) {
        slot = future.cell.done.wait(slot).expect("promise mutex poisoned");
    }
    read_completion(&slot)
}

/// Non-blocking read: NULL while pending.
pub fn future_try_get(h: RtHandle) -> RtHandle {
    let Some(future) = get_future(h, "try_get") else {
        return ptr::null_mut();
    };
    let slot = future.cell.completion.lock().expect("promise mutex poisoned");
    if matches!(*slot, Completion::Pending) {
        return ptr::null_mut();
    }
    read_completion(&slot)
}

/// Wait up to `ms` milliseconds; NULL on timeout.
pub fn future_get_for(h: RtHandle, ms: i64) -> RtHandle {
    let Some(future) = get_future(h, "get_for") else {
        return ptr::null_mut();
    };
    let deadline = Duration::from_millis(ms.max(0) as u64);
    let slot = future.cell.completion.lock().expect("promise mutex poisoned");
    let (slot, result) = future
        .cell
        .done
        .wait_timeout_while(slot, deadline, |c| matches!(*c, Completion::Pending))
        .expect("promise mutex poisoned");
    if result.timed_out() && matches!(*slot, Completion::Pending) {
        return ptr::null_mut();
    }
    read_completion(&slot)
}

pub fn future_done(h: RtHandle) -> bool {
    unsafe { heap::object_ref::<RtFuture>(h) }.map_or(false, |f| {
        !matches!(
            *f.cell.completion.lock().expect("promise mutex poisoned"),
            Completion::Pending
        )
    })
}

fn read_completion(slot: &Completion) -> RtHandle {
    match slot {
        Completion::Value(v) => {
            heap::retain(*v);
            *v
        }
        Completion::Error(msg) => {
            trap::raise(TrapKind::DomainError, format!("promise rejected: {}", msg));
            ptr::null_mut()
        }
        Completion::Pending => unreachable!("caller checked for completion"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{refcount, release, retain};
    use crate::string::{str_eq, str_new};
    use crate::trap::{clear_pending, take_pending};

    #[derive(Clone, Copy)]
    struct SendHandle(RtHandle);
    unsafe impl Send for SendHandle {}

    #[test]
    fn resolve_then_get() {
        let p = promise_new();
        let f = promise_get_future(p);
        let v = str_new("42");
        promise_set(p, v);
        assert!(future_done(f));
        let got = future_get(f);
        assert!(str_eq(got, v));
        release(got);
        release(f);
        release(p);
        assert_eq!(refcount(v), 1);
        release(v);
    }

    #[test]
    fn get_future_is_stable() {
        let p = promise_new();
        let a = promise_get_future(p);
        let b = promise_get_future(p);
        assert_eq!(a, b);
        release(a);
        release(b);
        release(p);
    }

    #[test]
    fn double_completion_traps() {
        clear_pending();
        let p = promise_new();
        let v = str_new("x");
        promise_set(p, v);
        promise_set(p, v);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        release(p);
        release(v);
    }

    #[test]
    fn rejection_propagates_on_get() {
        clear_pending();
        let p = promise_new();
        let f = promise_get_future(p);
        let e = str_new("boom");
        promise_set_error(p, e);
        assert!(future_get(f).is_null());
        let t = take_pending().unwrap();
        assert_eq!(t.kind, TrapKind::DomainError);
        assert!(t.message.contains("boom"));
        release(e);
        release(f);
        release(p);
    }

    #[test]
    fn try_get_and_timeout_return_null_while_pending() {
        let p = promise_new();
        let f = promise_get_future(p);
        assert!(future_try_get(f).is_null());
        assert!(future_get_for(f, 10).is_null());
        release(f);
        release(p);
    }

    /// Resolution from another thread happens-before the waiter's
    /// observation of the value.
    #[test]
    fn cross_thread_resolution_is_visible() {
        let p = promise_new();
        let f = promise_get_future(p);
        retain(p);
        let handle = SendHandle(p);
        let resolver = std::thread::spawn(move || {
            let h = handle;
            std::thread::sleep(std::time::Duration::from_millis(10));
            let v = str_new("42");
            promise_set(h.0, v);
            release(v);
            release(h.0);
        });
        let got = future_get(f);
        assert_eq!(crate::string::str_to_int(got), 42);
        release(got);
        resolver.join().unwrap();
        release(f);
        release(p);
    }
}
