//! String-keyed map of object handles.
//!
//! Keys are copied into the map (no refcount involvement); values follow
//! the usual retain-on-insert / release-on-remove discipline. `get` on a
//! missing key returns NULL rather than trapping; membership is a query.

use crate::heap::{self, RtHandle, RtStr};
use crate::string::str_bytes;
use crate::trap::{self, TrapKind};
use std::collections::HashMap;
use std::ptr;

struct RtMap {
    entries: HashMap<Vec<u8>, RtHandle>,
}

unsafe fn finalize(p: RtHandle) {
    unsafe {
        let map = &mut *(p as *mut RtMap);
        for (_, &v) in map.entries.iter() {
            heap::release(v);
        }
        ptr::drop_in_place(map);
    }
}

fn get_map<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtMap> {
    let r = unsafe { heap::object_ref::<RtMap>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("map: {} on a null handle", op));
    }
    r
}

pub fn map_new() -> RtHandle {
    heap::alloc_object(
        RtMap {
            entries: HashMap::new(),
        },
        finalize,
    )
}

pub fn map_len(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtMap>(h) }.map_or(0, |m| m.entries.len() as i64)
}

pub fn map_put(h: RtHandle, key: RtStr, value: RtHandle) {
    let Some(map) = get_map(h, "put") else { return };
    let key = unsafe { str_bytes(key) }.to_vec();
    heap::retain(value);
    if let Some(old) = map.entries.insert(key, value) {
        heap::release(old);
    }
}

/// Retained handle to the value, or NULL when the key is absent.
pub fn map_get(h: RtHandle, key: RtStr) -> RtHandle {
    let Some(map) = get_map(h, "get") else {
        return ptr::null_mut();
    };
    match map.entries.get(unsafe { str_bytes(key) }) {
        Some(&v) => {
            heap::retain(v);
            v
        }
        None => ptr::null_mut(),
    }
}

pub fn map_has(h: RtHandle, key: RtStr) -> bool {
    unsafe { heap::object_ref::<RtMap>(h) }
        .map_or(false, |m| m.entries.contains_key(unsafe { str_bytes(key) }))
}

pub fn map_remove(h: RtHandle, key: RtStr) {
    let Some(map) = get_map(h, "remove") else { return };
    if let Some(old) = map.entries.remove(unsafe { str_bytes(key) }) {
        heap::release(old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{refcount, release};
    use crate::string::str_new;
    use crate::trap::{clear_pending, take_pending};

    #[test]
    fn put_get_remove() {
        let m = map_new();
        let k = str_new("answer");
        let v = str_new("forty-two");
        map_put(m, k, v);
        assert_eq!(map_len(m), 1);
        assert_eq!(refcount(v), 2);
        assert_eq!(refcount(k), 1); // keys are copied, not retained

        let got = map_get(m, k);
        assert_eq!(got, v);
        release(got);
        assert!(map_has(m, k));

        map_remove(m, k);
        assert_eq!(refcount(v), 1);
        assert!(!map_has(m, k));
        assert!(map_get(m, k).is_null());

        release(m);
        release(k);
        release(v);
    }

    #[test]
    fn overwrite_releases_old_value() {
        let m = map_new();
        let k = str_new("k");
        let a = str_new("a");
        let b = str_new("b");
        map_put(m, k, a);
        map_put(m, k, b);
        assert_eq!(refcount(a), 1);
        assert_eq!(refcount(b), 2);
        release(m);
        assert_eq!(refcount(b), 1);
        release(k);
        release(a);
        release(b);
    }

    #[test]
    fn null_map_traps() {
        clear_pending();
        let k = str_new("k");
        map_put(ptr::null_mut(), k, ptr::null_mut());
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        release(k);
    }
}
