//! Growable list of object handles.
//!
//! RC discipline: push and set retain, remove/clear/finalize release.
//! NULL elements are legal and skipped by retain/release.

use crate::heap::{self, RtHandle};
use crate::trap::{self, TrapKind};
use std::ptr;

struct RtList {
    items: Vec<RtHandle>,
}

unsafe fn finalize(p: RtHandle) {
    unsafe {
        let list = &mut *(p as *mut RtList);
        for &h in &list.items {
            heap::release(h);
        }
        ptr::drop_in_place(list);
    }
}

fn get<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtList> {
    let r = unsafe { heap::object_ref::<RtList>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("list: {} on a null handle", op));
    }
    r
}

pub fn list_new() -> RtHandle {
    heap::alloc_object(RtList { items: Vec::new() }, finalize)
}

pub fn list_len(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtList>(h) }.map_or(0, |l| l.items.len() as i64)
}

pub fn list_push(h: RtHandle, item: RtHandle) {
    if let Some(list) = get(h, "push") {
        heap::retain(item);
        list.items.push(item);
    }
}

/// Returns a retained handle (transfer to the caller).
pub fn list_get(h: RtHandle, idx: i64) -> RtHandle {
    let Some(list) = get(h, "get") else {
        return ptr::null_mut();
    };
    match index(list, idx) {
        Some(i) => {
            let item = list.items[i];
            heap::retain(item);
            item
        }
        None => ptr::null_mut(),
    }
}

pub fn list_set(h: RtHandle, idx: i64, item: RtHandle) {
    let Some(list) = get(h, "set") else { return };
    if let Some(i) = index(list, idx) {
        heap::retain(item);
        heap::release(list.items[i]);
        list.items[i] = item;
    }
}

pub fn list_remove(h: RtHandle, idx: i64) {
    let Some(list) = get(h, "remove") else { return };
    if let Some(i) = index(list, idx) {
        let old = list.items.remove(i);
        heap::release(old);
    }
}

pub fn list_clear(h: RtHandle) {
    let Some(list) = get(h, "clear") else { return };
    for &item in &list.items {
        heap::release(item);
    }
    list.items.clear();
}

fn index(list: &RtList, idx: i64) -> Option<usize> {
    if idx < 0 || idx as usize >= list.items.len() {
        trap::raise(
            TrapKind::Bounds,
            format!("index {} out of range for length {}", idx, list.items.len()),
        );
        return None;
    }
    Some(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{refcount, release};
    use crate::string::str_new;
    use crate::trap::{clear_pending, take_pending};

    #[test]
    fn push_get_set_remove() {
        let l = list_new();
        let a = str_new("a");
        let b = str_new("b");
        list_push(l, a);
        list_push(l, b);
        assert_eq!(list_len(l), 2);
        assert_eq!(refcount(a), 2);

        let got = list_get(l, 0);
        assert_eq!(got, a);
        assert_eq!(refcount(a), 3);
        release(got);

        list_set(l, 0, b);
        assert_eq!(refcount(a), 1);
        assert_eq!(refcount(b), 3);

        list_remove(l, 1);
        assert_eq!(list_len(l), 1);
        assert_eq!(refcount(b), 2);

        release(l);
        assert_eq!(refcount(b), 1);
        release(a);
        release(b);
    }

    #[test]
    fn out_of_range_traps_bounds() {
        clear_pending();
        let l = list_new();
        list_get(l, 0);
        assert_eq!(take_pending().unwrap().kind, TrapKind::Bounds);
        release(l);
    }

    #[test]
    fn null_elements_are_skipped() {
        let l = list_new();
        list_push(l, ptr::null_mut());
        assert_eq!(list_len(l), 1);
        assert!(list_get(l, 0).is_null());
        list_clear(l);
        assert_eq!(list_len(l), 0);
        release(l);
    }

    #[test]
    fn null_handle_traps_domain_error() {
        clear_pending();
        list_push(ptr::null_mut(), ptr::null_mut());
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
    }
}
