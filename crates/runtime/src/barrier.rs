//! Barrier: an N-party rendezvous with a generation counter.
//!
//! The last arriver releases the generation and everyone observes the new
//! generation number. `reset` while any thread is waiting traps
//! `DomainError`.

use crate::heap::{self, RtHandle};
use crate::trap::{self, TrapKind};
use std::ptr;
use std::sync::{Condvar, Mutex};

struct BarrierState {
    waiting: i64,
    generation: i64,
}

struct RtBarrier {
    parties: i64,
    state: Mutex<BarrierState>,
    released: Condvar,
}

unsafe fn finalize(p: RtHandle) {
    unsafe { ptr::drop_in_place(p as *mut RtBarrier) };
}

fn get_barrier<'a>(h: RtHandle, op: &str) -> Option<&'a RtBarrier> {
    let r = unsafe { heap::object_ref::<RtBarrier>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("barrier: {} on a null handle", op));
    }
    r.map(|b| &*b)
}

pub fn barrier_new(parties: i64) -> RtHandle {
    if parties <= 0 {
        trap::raise(
            TrapKind::DomainError,
            format!("barrier: party count {} must be positive", parties),
        );
        return ptr::null_mut();
    }
    heap::alloc_object(
        RtBarrier {
            parties,
            state: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
            }),
            released: Condvar::new(),
        },
        finalize,
    )
}

/// Arrive and wait for the rest of the party; returns the generation
/// number that was completed.
pub fn barrier_arrive(h: RtHandle) -> i64 {
    let Some(barrier) = get_barrier(h, "arrive") else {
        return -1;
    };
    let mut state = barrier.state.lock().expect("barrier mutex poisoned");
    let gen_at_entry = state.generation;
    state.waiting += 1;
    if state.waiting == barrier.parties {
        state.waiting = 0;
        state.generation += 1;
        barrier.released.notify_all();
        return state.generation;
    }
    while state.generation == gen_at_entry {
        state = barrier.released.wait(state).expect("barrier mutex poisoned");
    }
    state.generation
}

pub fn barrier_waiting(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtBarrier>(h) }
        .map_or(0, |b| b.state.lock().expect("barrier mutex poisoned").waiting)
}

/// Reset to a fresh generation; traps `DomainError` while any thread is
/// waiting.
pub fn barrier_reset(h: RtHandle) {
    let Some(barrier) = get_barrier(h, "reset") else { return };
    let mut state = barrier.state.lock().expect("barrier mutex poisoned");
    if state.waiting != 0 {
        trap::raise(
            TrapKind::DomainError,
            format!("barrier: reset with {} thread(s) waiting", state.waiting),
        );
        return;
    }
    state.generation = 0;
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
    fn party_of_two_rendezvous() {
        let b = barrier_new(2);
        retain(b);
        let handle = SendHandle(b);
        let other = std::thread::spawn(move || {
            let h = handle;
            let g = barrier_arrive(h.0);
            release(h.0);
            g
        });
        std::thread::sleep(Duration::from_millis(10));
        let g = barrier_arrive(b);
        assert_eq!(g, 1);
        assert_eq!(other.join().unwrap(), 1);
        assert_eq!(barrier_waiting(b), 0);
        release(b);
    }

    #[test]
    fn reset_while_waiting_traps() {
        clear_pending();
        let b = barrier_new(2);
        retain(b);
        let handle = SendHandle(b);
        let waiter = std::thread::spawn(move || {
            let h = handle;
            barrier_arrive(h.0);
            release(h.0);
        });
        // Let the helper block.
        while barrier_waiting(b) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        barrier_reset(b);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        // Release the waiter and clean up.
        barrier_arrive(b);
        waiter.join().unwrap();
        release(b);
    }

    #[test]
    fn non_positive_party_count_traps() {
        clear_pending();
        assert!(barrier_new(0).is_null());
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
    }
}
