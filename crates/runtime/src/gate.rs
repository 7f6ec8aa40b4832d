//! Gate: a counting semaphore on a host mutex + condition variable.
//!
//! Construction with a negative permit count traps `DomainError`, as does
//! leaving with a negative count or operating on a NULL gate. The timed
//! enter returns a success flag instead of trapping on timeout.

use crate::heap::{self, RtHandle};
use crate::trap::{self, TrapKind};
use std::ptr;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct RtGate {
    permits: Mutex<i64>,
    available: Condvar,
}

unsafe fn finalize(p: RtHandle) {
    unsafe { ptr::drop_in_place(p as *mut RtGate) };
}

fn get_gate<'a>(h: RtHandle, op: &str) -> Option<&'a RtGate> {
    let r = unsafe { heap::object_ref::<RtGate>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("gate: {} on a null handle", op));
    }
    r.map(|g| &*g)
}

pub fn gate_new(permits: i64) -> RtHandle {
    if permits < 0 {
        trap::raise(
            TrapKind::DomainError,
            format!("gate: negative permit count {}", permits),
        );
        return ptr::null_mut();
    }
    heap::alloc_object(
        RtGate {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        },
        finalize,
    )
}

/// Block until a permit is available, then take it.
pub fn gate_enter(h: RtHandle) {
    let Some(gate) = get_gate(h, "enter") else { return };
    let mut permits = gate.permits.lock().expect("gate mutex poisoned");
    while *permits == 0 {
        permits = gate.available.wait(permits).expect("gate mutex poisoned");
    }
    *permits -= 1;
}

/// Try to take a permit within `ms` milliseconds; returns whether one
/// was taken.
pub fn gate_try_enter_for(h: RtHandle, ms: i64) -> bool {
    let Some(gate) = get_gate(h, "try_enter_for") else {
        return false;
    };
    let deadline = Duration::from_millis(ms.max(0) as u64);
    let mut permits = gate.permits.lock().expect("gate mutex poisoned");
    if *permits == 0 {
        let (guard, result) = gate
            .available
            .wait_timeout_while(permits, deadline, |p| *p == 0)
            .expect("gate mutex poisoned");
        permits = guard;
        if result.timed_out() && *permits == 0 {
            return false;
        }
    }
    *permits -= 1;
    true
}

/// Return `count` permits. A negative count traps `DomainError`.
pub fn gate_leave(h: RtHandle, count: i64) {
    let Some(gate) = get_gate(h, "leave") else { return };
    if count < 0 {
        trap::raise(
            TrapKind::DomainError,
            format!("gate: leave with negative count {}", count),
        );
        return;
    }
    let mut permits = gate.permits.lock().expect("gate mutex poisoned");
    *permits += count;
    for _ in 0..count {
        gate.available.notify_one();
    }
}

pub fn gate_count(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtGate>(h) }
        .map_or(0, |g| *g.permits.lock().expect("gate mutex poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{release, retain};
    use crate::trap::{clear_pending, take_pending};

    /// Raw handles are not Send; tests that cross threads wrap them.
    #[derive(Clone, Copy)]
    struct SendHandle(RtHandle);
    unsafe impl Send for SendHandle {}

    #[test]
    fn permits_count_down_and_up() {
        let g = gate_new(2);
        gate_enter(g);
        gate_enter(g);
        assert_eq!(gate_count(g), 0);
        assert!(!gate_try_enter_for(g, 10));
        gate_leave(g, 1);
        assert!(gate_try_enter_for(g, 10));
        gate_leave(g, 2);
        assert_eq!(gate_count(g), 2);
        release(g);
    }

    #[test]
    fn negative_construction_and_leave_trap() {
        clear_pending();
        assert!(gate_new(-1).is_null());
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        let g = gate_new(0);
        gate_leave(g, -2);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        release(g);
    }

    #[test]
    fn blocked_enter_wakes_on_leave() {
        let g = gate_new(0);
        retain(g);
        let handle = SendHandle(g);
        let waiter = std::thread::spawn(move || {
            let h = handle;
            gate_enter(h.0);
            release(h.0);
            true
        });
        std::thread::sleep(Duration::from_millis(20));
        gate_leave(g, 1);
        assert!(waiter.join().unwrap());
        release(g);
    }
}
