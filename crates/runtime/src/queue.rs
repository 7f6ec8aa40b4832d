//! FIFO queue of object handles.

use crate::heap::{self, RtHandle};
use crate::trap::{self, TrapKind};
use std::collections::VecDeque;
use std::ptr;

struct RtQueue {
    items: VecDeque<RtHandle>,
}

unsafe fn finalize(p: RtHandle) {
    unsafe {
        let q = &mut *(p as *mut RtQueue);
        for &h in &q.items {
            heap::release(h);
        }
        ptr::drop_in_place(q);
    }
}

fn get<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtQueue> {
    let r = unsafe { heap::object_ref::<RtQueue>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("queue: {} on a null handle", op));
    }
    r
}

pub fn queue_new() -> RtHandle {
    heap::alloc_object(
        RtQueue {
            items: VecDeque::new(),
        },
        finalize,
    )
}

pub fn queue_len(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtQueue>(h) }.map_or(0, |q| q.items.len() as i64)
}

pub fn queue_enqueue(h: RtHandle, item: RtHandle) {
    if let Some(q) = get(h, "enqueue") {
        heap::retain(item);
        q.items.push_back(item);
    }
}

/// Removes and returns the oldest element; the stored reference transfers
/// to the caller. Empty queues trap `DomainError`.
pub fn queue_dequeue(h: RtHandle) -> RtHandle {
    let Some(q) = get(h, "dequeue") else {
        return ptr::null_mut();
    };
    match q.items.pop_front() {
        Some(item) => item,
        None => {
            trap::raise(TrapKind::DomainError, "dequeue on an empty queue");
            ptr::null_mut()
        }
    }
}

/// Returns a retained handle to the oldest element without removing it.
pub fn queue_front(h: RtHandle) -> RtHandle {
    let Some(q) = get(h, "front") else {
        return ptr::null_mut();
    };
    match q.items.front() {
        Some(&item) => {
            heap::retain(item);
            item
        }
        None => {
            trap::raise(TrapKind::DomainError, "front on an empty queue");
            ptr::null_mut()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{refcount, release};
    use crate::string::str_new;
    use crate::trap::{clear_pending, take_pending};

    #[test]
    fn fifo_order() {
        let q = queue_new();
        let a = str_new("first");
        let b = str_new("second");
        queue_enqueue(q, a);
        queue_enqueue(q, b);

        let out = queue_dequeue(q);
        assert_eq!(out, a);
        release(out);
        let front = queue_front(q);
        assert_eq!(front, b);
        release(front);

        release(q);
        assert_eq!(refcount(b), 1);
        release(a);
        release(b);
    }

    #[test]
    fn empty_discipline() {
        clear_pending();
        let q = queue_new();
        assert_eq!(queue_len(q), 0);
        assert!(queue_dequeue(q).is_null());
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        release(q);
    }
}
