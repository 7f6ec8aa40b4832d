//! Typed dynamic arrays: i32, i64, f64, string, and object-handle
//! element kinds, each with its own constructor, accessors, and resize.
//!
//! Resize follows copy-on-share: within capacity it adjusts the length
//! and zero-fills growth; past capacity with a sole owner it reallocates
//! in place; with a shared buffer it allocates fresh, copies the
//! overlapping prefix, and releases the old array. String and object
//! arrays retain on every store and release on overwrite, shrink, and
//! teardown. NULL slots are legal and skipped.
//!
//! Access helpers validate bounds and trap `Bounds` with the offending
//! index and current length; a NULL array traps `Bounds` with index 0 and
//! length 0.

use crate::heap::{self, ElemKind, HeapKind, RtHandle, RtStr};
use crate::trap::{self, TrapKind};
use std::ptr;

unsafe fn finalize_handle_array(p: RtHandle) {
    unsafe {
        let hdr = heap::header(p);
        let slots = std::slice::from_raw_parts(p as *const RtHandle, hdr.len);
        for &h in slots {
            heap::release(h);
        }
    }
}

fn finalizer_for(elem: ElemKind) -> Option<unsafe fn(RtHandle)> {
    elem.is_handle().then_some(finalize_handle_array as unsafe fn(RtHandle))
}

fn new_impl(elem: ElemKind, len: i64) -> RtHandle {
    if len < 0 {
        trap::raise(TrapKind::DomainError, format!("array: negative length {}", len));
        return ptr::null_mut();
    }
    heap::alloc(HeapKind::Array, elem, len as usize, len as usize, finalizer_for(elem))
}

/// Bounds-checked slot index; raises `Bounds` and returns `None` on a
/// NULL array or an out-of-range index.
fn checked_index(a: RtHandle, elem: ElemKind, idx: i64) -> Option<usize> {
    if a.is_null() {
        trap::raise(TrapKind::Bounds, "index 0 out of range for length 0");
        return None;
    }
    let hdr = unsafe { heap::header(a) };
    debug_assert_eq!(hdr.elem_kind, elem);
    if idx < 0 || idx as usize >= hdr.len {
        trap::raise(
            TrapKind::Bounds,
            format!("index {} out of range for length {}", idx, hdr.len),
        );
        return None;
    }
    Some(idx as usize)
}

fn len_impl(a: RtHandle) -> i64 {
    if a.is_null() {
        return 0;
    }
    unsafe { heap::header(a) }.len as i64
}

unsafe fn read_slot<T: Copy>(a: RtHandle, idx: usize) -> T {
    unsafe { *(a as *const T).add(idx) }
}

unsafe fn write_slot<T: Copy>(a: RtHandle, idx: usize, v: T) {
    unsafe { *(a as *mut T).add(idx) = v };
}

/// Shared resize logic. Returns the handle to use afterwards (possibly
/// the same, possibly fresh); on failure the original handle survives.
fn resize_impl(a: RtHandle, elem: ElemKind, new_len: i64) -> RtHandle {
    if new_len < 0 {
        trap::raise(TrapKind::DomainError, format!("array: negative length {}", new_len));
        return a;
    }
    let new_len = new_len as usize;
    if a.is_null() {
        return heap::alloc(HeapKind::Array, elem, new_len, new_len, finalizer_for(elem));
    }

    let hdr = unsafe { heap::header(a) };
    debug_assert_eq!(hdr.elem_kind, elem);
    let old_len = hdr.len;
    let elem_size = elem.size();

    if new_len <= hdr.cap {
        unsafe {
            if new_len < old_len && elem.is_handle() {
                // Dropped slots give up their references.
                for i in new_len..old_len {
                    let h: RtHandle = read_slot(a, i);
                    heap::release(h);
                    write_slot(a, i, ptr::null_mut::<u8>());
                }
            }
            if new_len > old_len {
                ptr::write_bytes(a.add(old_len * elem_size), 0, (new_len - old_len) * elem_size);
            }
            heap::header_mut(a).len = new_len;
        }
        return a;
    }

    if heap::refcount(a) == 1 {
        let grown = unsafe { heap::grow_array(a, new_len, new_len) };
        if grown.is_null() {
            trap::raise(TrapKind::DomainError, "array: allocation failure on resize");
            return a;
        }
        return grown;
    }

    // Shared buffer: allocate fresh, copy the overlapping prefix, release
    // the old array (its finalizer drops the old element references, so
    // handle elements are retained for the copy first).
    let fresh = heap::alloc(HeapKind::Array, elem, new_len, new_len, finalizer_for(elem));
    if fresh.is_null() {
        trap::raise(TrapKind::DomainError, "array: allocation failure on resize");
        return a;
    }
    let copy_len = old_len.min(new_len);
    unsafe {
        ptr::copy_nonoverlapping(a, fresh, copy_len * elem_size);
        if elem.is_handle() {
            for i in 0..copy_len {
                let h: RtHandle = read_slot(fresh, i);
                heap::retain(h);
            }
        }
    }
    heap::release(a);
    fresh
}

// --- i32 ---------------------------------------------------------------

pub fn arr_i32_new(len: i64) -> RtHandle {
    new_impl(ElemKind::I32, len)
}

pub fn arr_i32_len(a: RtHandle) -> i64 {
    len_impl(a)
}

/// Widened to i64 at the ABI.
pub fn arr_i32_get(a: RtHandle, idx: i64) -> i64 {
    match checked_index(a, ElemKind::I32, idx) {
        Some(i) => unsafe { read_slot::<i32>(a, i) as i64 },
        None => 0,
    }
}

/// Stores the low 32 bits.
pub fn arr_i32_put(a: RtHandle, idx: i64, v: i64) {
    if let Some(i) = checked_index(a, ElemKind::I32, idx) {
        unsafe { write_slot(a, i, v as i32) };
    }
}

pub fn arr_i32_resize(a: RtHandle, new_len: i64) -> RtHandle {
    resize_impl(a, ElemKind::I32, new_len)
}

// --- i64 ---------------------------------------------------------------

pub fn arr_i64_new(len: i64) -> RtHandle {
    new_impl(ElemKind::I64, len)
}

pub fn arr_i64_len(a: RtHandle) -> i64 {
    len_impl(a)
}

pub fn arr_i64_get(a: RtHandle, idx: i64) -> i64 {
    match checked_index(a, ElemKind::I64, idx) {
        Some(i) => unsafe { read_slot(a, i) },
        None => 0,
    }
}

pub fn arr_i64_put(a: RtHandle, idx: i64, v: i64) {
    if let Some(i) = checked_index(a, ElemKind::I64, idx) {
        unsafe { write_slot(a, i, v) };
    }
}

pub fn arr_i64_resize(a: RtHandle, new_len: i64) -> RtHandle {
    resize_impl(a, ElemKind::I64, new_len)
}

// --- f64 ---------------------------------------------------------------

pub fn arr_f64_new(len: i64) -> RtHandle {
    new_impl(ElemKind::F64, len)
}

pub fn arr_f64_len(a: RtHandle) -> i64 {
    len_impl(a)
}

pub fn arr_f64_get(a: RtHandle, idx: i64) -> f64 {
    match checked_index(a, ElemKind::F64, idx) {
        Some(i) => unsafe { read_slot(a, i) },
        None => 0.0,
    }
}

pub fn arr_f64_put(a: RtHandle, idx: i64, v: f64) {
    if let Some(i) = checked_index(a, ElemKind::F64, idx) {
        unsafe { write_slot(a, i, v) };
    }
}

pub fn arr_f64_resize(a: RtHandle, new_len: i64) -> RtHandle {
    resize_impl(a, ElemKind::F64, new_len)
}

// --- string handles ----------------------------------------------------

pub fn arr_str_new(len: i64) -> RtHandle {
    new_impl(ElemKind::Str, len)
}

pub fn arr_str_len(a: RtHandle) -> i64 {
    len_impl(a)
}

/// Returns a retained handle (transfer to the caller); NULL slots read
/// as NULL.
pub fn arr_str_get(a: RtHandle, idx: i64) -> RtStr {
    match checked_index(a, ElemKind::Str, idx) {
        Some(i) => unsafe {
            let s: RtStr = read_slot(a, i);
            heap::retain(s);
            s
        },
        None => ptr::null_mut(),
    }
}

/// Retains the new value, releases the previous occupant.
pub fn arr_str_put(a: RtHandle, idx: i64, v: RtStr) {
    if let Some(i) = checked_index(a, ElemKind::Str, idx) {
        unsafe {
            heap::retain(v);
            let old: RtStr = read_slot(a, i);
            heap::release(old);
            write_slot(a, i, v);
        }
    }
}

pub fn arr_str_resize(a: RtHandle, new_len: i64) -> RtHandle {
    resize_impl(a, ElemKind::Str, new_len)
}

// --- object handles ----------------------------------------------------

pub fn arr_obj_new(len: i64) -> RtHandle {
    new_impl(ElemKind::Obj, len)
}

pub fn arr_obj_len(a: RtHandle) -> i64 {
    len_impl(a)
}

pub fn arr_obj_get(a: RtHandle, idx: i64) -> RtHandle {
    match checked_index(a, ElemKind::Obj, idx) {
        Some(i) => unsafe {
            let h: RtHandle = read_slot(a, i);
            heap::retain(h);
            h
        },
        None => ptr::null_mut(),
    }
}

pub fn arr_obj_put(a: RtHandle, idx: i64, v: RtHandle) {
    if let Some(i) = checked_index(a, ElemKind::Obj, idx) {
        unsafe {
            heap::retain(v);
            let old: RtHandle = read_slot(a, i);
            heap::release(old);
            write_slot(a, i, v);
        }
    }
}

pub fn arr_obj_resize(a: RtHandle, new_len: i64) -> RtHandle {
    resize_impl(a, ElemKind::Obj, new_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{refcount, release, retain};
    use crate::string::str_new;
    use crate::trap::{clear_pending, take_pending};

    #[test]
    fn store_then_load() {
        let a = arr_i64_new(3);
        arr_i64_put(a, 0, 10);
        arr_i64_put(a, 2, -5);
        assert_eq!(arr_i64_get(a, 0), 10);
        assert_eq!(arr_i64_get(a, 1), 0);
        assert_eq!(arr_i64_get(a, 2), -5);
        assert_eq!(arr_i64_len(a), 3);
        release(a);
    }

    #[test]
    fn out_of_bounds_traps_with_index_and_length() {
        clear_pending();
        let a = arr_i64_new(2);
        arr_i64_get(a, 5);
        let t = take_pending().unwrap();
        assert_eq!(t.kind, TrapKind::Bounds);
        assert!(t.message.contains("index 5"));
        assert!(t.message.contains("length 2"));

        arr_i64_get(a, -1);
        assert_eq!(take_pending().unwrap().kind, TrapKind::Bounds);
        release(a);
    }

    #[test]
    fn null_array_traps_bounds_zero_zero() {
        clear_pending();
        arr_i64_get(ptr::null_mut(), 0);
        let t = take_pending().unwrap();
        assert_eq!(t.kind, TrapKind::Bounds);
        assert!(t.message.contains("index 0"));
        assert!(t.message.contains("length 0"));
        assert_eq!(arr_i64_len(ptr::null_mut()), 0);
    }

    #[test]
    fn resize_preserves_prefix_and_zero_fills() {
        let a = arr_i64_new(2);
        arr_i64_put(a, 0, 7);
        arr_i64_put(a, 1, 8);
        let a = arr_i64_resize(a, 5);
        assert_eq!(arr_i64_len(a), 5);
        assert_eq!(arr_i64_get(a, 0), 7);
        assert_eq!(arr_i64_get(a, 1), 8);
        assert_eq!(arr_i64_get(a, 4), 0);
        release(a);
    }

    #[test]
    fn shared_resize_copies() {
        let a = arr_i64_new(2);
        arr_i64_put(a, 0, 42);
        retain(a); // second owner
        let b = arr_i64_resize(a, 8);
        assert_ne!(a, b);
        assert_eq!(arr_i64_get(b, 0), 42);
        // The original is still alive under the other owner.
        assert_eq!(arr_i64_len(a), 2);
        assert_eq!(arr_i64_get(a, 0), 42);
        release(a);
        release(b);
    }

    #[test]
    fn string_array_refcount_discipline() {
        let a = arr_str_new(2);
        let s = str_new("a");
        assert_eq!(refcount(s), 1);
        arr_str_put(a, 0, s);
        assert_eq!(refcount(s), 2);

        // Resize preserving the element leaves its count alone.
        let a = arr_str_resize(a, 4);
        assert_eq!(refcount(s), 2);
        let got = arr_str_get(a, 0);
        assert_eq!(refcount(s), 3);
        release(got);

        // Finalizer releases the stored reference.
        release(a);
        assert_eq!(refcount(s), 1);
        release(s);
    }

    #[test]
    fn string_array_overwrite_releases_old() {
        let a = arr_str_new(1);
        let x = str_new("x");
        let y = str_new("y");
        arr_str_put(a, 0, x);
        assert_eq!(refcount(x), 2);
        arr_str_put(a, 0, y);
        assert_eq!(refcount(x), 1);
        assert_eq!(refcount(y), 2);
        release(a);
        assert_eq!(refcount(y), 1);
        release(x);
        release(y);
    }

    #[test]
    fn shrink_releases_dropped_handles() {
        let a = arr_str_new(3);
        let s = str_new("tail");
        arr_str_put(a, 2, s);
        assert_eq!(refcount(s), 2);
        let a = arr_str_resize(a, 1);
        assert_eq!(refcount(s), 1);
        // Growing back exposes a NULL slot, not the old value.
        let a = arr_str_resize(a, 3);
        assert!(arr_str_get(a, 2).is_null());
        release(a);
        release(s);
    }

    #[test]
    fn i32_truncates_on_store() {
        let a = arr_i32_new(1);
        arr_i32_put(a, 0, 0x1_2345_6789);
        assert_eq!(arr_i32_get(a, 0), 0x2345_6789);
        release(a);
    }

    #[test]
    fn negative_length_traps_domain_error() {
        clear_pending();
        let a = arr_f64_new(-1);
        assert!(a.is_null());
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
    }
}
