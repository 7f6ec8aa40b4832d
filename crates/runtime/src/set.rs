//! Set of string members. Members are copied in; no handles are stored,
//! so the only discipline is the null-handle trap.

use crate::heap::{self, RtHandle, RtStr};
use crate::string::str_bytes;
use crate::trap::{self, TrapKind};
use std::collections::HashSet;
use std::ptr;

struct RtSet {
    members: HashSet<Vec<u8>>,
}

unsafe fn finalize(p: RtHandle) {
    unsafe { ptr::drop_in_place(p as *mut RtSet) };
}

fn get_set<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtSet> {
    let r = unsafe { heap::object_ref::<RtSet>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("set: {} on a null handle", op));
    }
    r
}

pub fn set_new() -> RtHandle {
    heap::alloc_object(
        RtSet {
            members: HashSet::new(),
        },
        finalize,
    )
}

pub fn set_len(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtSet>(h) }.map_or(0, |s| s.members.len() as i64)
}

/// True when the member was newly added.
pub fn set_add(h: RtHandle, member: RtStr) -> bool {
    get_set(h, "add")
        .map(|s| s.members.insert(unsafe { str_bytes(member) }.to_vec()))
        .unwrap_or(false)
}

pub fn set_has(h: RtHandle, member: RtStr) -> bool {
    unsafe { heap::object_ref::<RtSet>(h) }
        .map_or(false, |s| s.members.contains(unsafe { str_bytes(member) }))
}

/// True when the member was present.
pub fn set_remove(h: RtHandle, member: RtStr) -> bool {
    get_set(h, "remove")
        .map(|s| s.members.remove(unsafe { str_bytes(member) }))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::release;
    use crate::string::str_new;

    #[test]
    fn add_has_remove() {
        let s = set_new();
        let m = str_new("x");
        assert!(set_add(s, m));
        assert!(!set_add(s, m));
        assert!(set_has(s, m));
        assert_eq!(set_len(s), 1);
        assert!(set_remove(s, m));
        assert!(!set_remove(s, m));
        assert_eq!(set_len(s), 0);
        release(s);
        release(m);
    }
}
