//! Fixed-capacity slot pool: acquire hands out slot indices, release
//! returns them. Exhaustion is a sentinel (-1), misuse is a trap.

use crate::heap::{self, RtHandle};
use crate::trap::{self, TrapKind};
use std::ptr;

struct RtObjPool {
    in_use: Vec<bool>,
    free: Vec<usize>,
}

unsafe fn finalize(p: RtHandle) {
    unsafe { ptr::drop_in_place(p as *mut RtObjPool) };
}

fn get_pool<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtObjPool> {
    let r = unsafe { heap::object_ref::<RtObjPool>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("objpool: {} on a null handle", op));
    }
    r
}

pub fn objpool_new(capacity: i64) -> RtHandle {
    if capacity < 0 {
        trap::raise(
            TrapKind::DomainError,
            format!("objpool: negative capacity {}", capacity),
        );
        return ptr::null_mut();
    }
    let capacity = capacity as usize;
    heap::alloc_object(
        RtObjPool {
            in_use: vec![false; capacity],
            free: (0..capacity).rev().collect(),
        },
        finalize,
    )
}

/// Slot index, or -1 when the pool is exhausted.
pub fn objpool_acquire(h: RtHandle) -> i64 {
    let Some(pool) = get_pool(h, "acquire") else {
        return -1;
    };
    match pool.free.pop() {
        Some(slot) => {
            pool.in_use[slot] = true;
            slot as i64
        }
        None => -1,
    }
}

/// Return a slot. Releasing an out-of-range slot traps `Bounds`;
/// releasing a slot that is not in use traps `DomainError`.
pub fn objpool_release(h: RtHandle, slot: i64) {
    let Some(pool) = get_pool(h, "release") else { return };
    if slot < 0 || slot as usize >= pool.in_use.len() {
        trap::raise(
            TrapKind::Bounds,
            format!("index {} out of range for length {}", slot, pool.in_use.len()),
        );
        return;
    }
    let slot = slot as usize;
    if !pool.in_use[slot] {
        trap::raise(
            TrapKind::DomainError,
            format!("objpool: slot {} released twice", slot),
        );
        return;
    }
    pool.in_use[slot] = false;
    pool.free.push(slot);
}

pub fn objpool_in_use(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtObjPool>(h) }
        .map_or(0, |p| p.in_use.iter().filter(|&&b| b).count() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::release;
    use crate::trap::{clear_pending, take_pending};

    #[test]
    fn acquire_release_cycle() {
        let p = objpool_new(2);
        let a = objpool_acquire(p);
        let b = objpool_acquire(p);
        assert!(a >= 0 && b >= 0 && a != b);
        assert_eq!(objpool_acquire(p), -1);
        assert_eq!(objpool_in_use(p), 2);
        objpool_release(p, a);
        assert_eq!(objpool_in_use(p), 1);
        assert_eq!(objpool_acquire(p), a);
        release(p);
    }

    #[test]
    fn double_release_traps() {
        clear_pending();
        let p = objpool_new(1);
        let s = objpool_acquire(p);
        objpool_release(p, s);
        objpool_release(p, s);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        objpool_release(p, 9);
        assert_eq!(take_pending().unwrap().kind, TrapKind::Bounds);
        release(p);
    }
}
