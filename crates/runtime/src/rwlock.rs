//! Reader-writer lock with writer preference.
//!
//! Readers are held out while a writer is active or queued. Exiting
//! without a matching enter traps `DomainError`; `write_exit` from a
//! thread that does not hold the write lock traps likewise.

use crate::heap::{self, RtHandle};
use crate::trap::{self, TrapKind};
use std::ptr;
use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;

struct LockState {
    readers: i64,
    writer: Option<ThreadId>,
    writers_waiting: i64,
}

struct RtRwLock {
    state: Mutex<LockState>,
    changed: Condvar,
}

unsafe fn finalize(p: RtHandle) {
    unsafe { ptr::drop_in_place(p as *mut RtRwLock) };
}

fn get_lock<'a>(h: RtHandle, op: &str) -> Option<&'a RtRwLock> {
    let r = unsafe { heap::object_ref::<RtRwLock>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("rwlock: {} on a null handle", op));
    }
    r.map(|l| &*l)
}

pub fn rwlock_new() -> RtHandle {
    heap::alloc_object(
        RtRwLock {
            state: Mutex::new(LockState {
                readers: 0,
                writer: None,
                writers_waiting: 0,
            }),
            changed: Condvar::new(),
        },
        finalize,
    )
}

pub fn rwlock_read_enter(h: RtHandle) {
    let Some(lock) = get_lock(h, "read_enter") else { return };
    let mut state = lock.state.lock().expect("rwlock mutex poisoned");
    // Writer preference: queued writers hold new readers out.
    while state.writer.is_some() || state.writers_waiting > 0 {
        state = lock.changed.wait(state).expect("rwlock mutex poisoned");
    }
    state.readers += 1;
}

pub fn rwlock_read_exit(h: RtHandle) {
    let Some(lock) = get_lock(h, "read_exit") else { return };
    let mut state = lock.state.lock().expect("rwlock mutex poisoned");
    if state.readers == 0 {
        trap::raise(TrapKind::DomainError, "rwlock: read_exit without a matching enter");
        return;
    }
    state.readers -= 1;
    if state.readers == 0 {
        lock.changed.notify_all();
    }
}

pub fn rwlock_write_enter(h: RtHandle) {
    let Some(lock) = get_lock(h, "write_enter") else { return };
    let mut state = lock.state.lock().expect("rwlock mutex poisoned");
    state.writers_waiting += 1;
    while state.writer.is_some() || state.readers > 0 {
        state = lock.changed.wait(state).expect("rwlock mutex poisoned");
    }
    state.writers_waiting -= 1;
    state.writer = Some(std::thread::current().id());
}

pub fn rwlock_write_exit(h: RtHandle) {
    let Some(lock) = get_lock(h, "write_exit") else { return };
    let mut state = lock.state.lock().expect("rwlock mutex poisoned");
    if state.writer != Some(std::thread::current().id()) {
        trap::raise(
            TrapKind::DomainError,
            "rwlock: write_exit from a thread that does not hold the write lock",
        );
        return;
    }
    state.writer = None;
    lock.changed.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{release, retain};
    use crate::trap::{clear_pending, take_pending};
    use std::time::Duration;

    #[derive(Clone, Copy)]
    struct SendHandle(RtHandle);
    unsafe impl Send for SendHandle {}

    #[test]
    fn readers_share_writers_exclude() {
        let l = rwlock_new();
        rwlock_read_enter(l);
        rwlock_read_enter(l);
        rwlock_read_exit(l);
        rwlock_read_exit(l);
        rwlock_write_enter(l);
        rwlock_write_exit(l);
        release(l);
    }

    #[test]
    fn unmatched_exits_trap() {
        clear_pending();
        let l = rwlock_new();
        rwlock_read_exit(l);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        rwlock_write_exit(l);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        release(l);
    }

    #[test]
    fn writer_blocks_reader() {
        let l = rwlock_new();
        rwlock_write_enter(l);
        retain(l);
        let handle = SendHandle(l);
        let reader = std::thread::spawn(move || {
            let h = handle;
            rwlock_read_enter(h.0);
            rwlock_read_exit(h.0);
            release(h.0);
            true
        });
        std::thread::sleep(Duration::from_millis(20));
        assert!(!reader.is_finished());
        rwlock_write_exit(l);
        assert!(reader.join().unwrap());
        release(l);
    }
}
