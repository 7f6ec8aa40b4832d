//! Heap-object protocol: header layout, allocation, retain/release.
//!
//! Every refcounted object is `HeapHeader + payload` in one contiguous
//! allocation. The public handle is a pointer to the payload start; the
//! header precedes it at a fixed negative offset. All helpers accept and
//! return payload pointers.
//!
//! # Safety invariants
//! - A non-null handle always points just past a live `HeapHeader`.
//! - `refcnt >= 1` while the object is reachable from any IL temp, slot,
//!   or collection; retain on a dead object is undefined behavior.
//! - `len <= cap` for arrays and strings.
//! - Object payloads carry a finalizer that releases nested references
//!   and drops the payload in place before the memory is freed.

use crate::heap_stats;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::atomic::{fence, AtomicU32, Ordering};

/// Handle to a refcounted heap object: a pointer to the payload start.
pub type RtHandle = *mut u8;

/// Handle to a runtime string (UTF-8 payload + NUL sentinel).
pub type RtStr = *mut u8;

/// What an allocation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeapKind {
    Array = 1,
    String = 2,
    Object = 3,
}

/// Element kind for arrays (strings are byte arrays; objects use `Byte`
/// with `cap` holding the payload size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElemKind {
    Byte = 0,
    I32 = 1,
    I64 = 2,
    F64 = 3,
    Str = 4,
    Obj = 5,
}

impl ElemKind {
    pub fn size(self) -> usize {
        match self {
            ElemKind::Byte => 1,
            ElemKind::I32 => 4,
            ElemKind::I64 | ElemKind::F64 | ElemKind::Str | ElemKind::Obj => 8,
        }
    }

    /// Str/Obj slots hold handles that the container retains.
    pub fn is_handle(self) -> bool {
        matches!(self, ElemKind::Str | ElemKind::Obj)
    }
}

/// Fixed-layout header preceding every payload.
#[repr(C)]
pub struct HeapHeader {
    pub kind: HeapKind,
    pub elem_kind: ElemKind,
    pub refcnt: AtomicU32,
    /// Element count (arrays), byte length (strings), 1 (objects).
    pub len: usize,
    /// Element capacity (arrays), byte capacity including the NUL
    /// (strings), payload byte size (objects).
    pub cap: usize,
    /// Runs with the payload pointer when the refcount hits zero.
    pub finalizer: Option<unsafe fn(RtHandle)>,
}

const HDR_SIZE: usize = size_of::<HeapHeader>();
const ALIGN: usize = if align_of::<HeapHeader>() > 8 {
    align_of::<HeapHeader>()
} else {
    8
};

/// Byte size of the payload as recorded in the header.
fn payload_bytes(hdr: &HeapHeader) -> usize {
    match hdr.kind {
        HeapKind::String | HeapKind::Object => hdr.cap,
        HeapKind::Array => hdr.cap * hdr.elem_kind.size(),
    }
}

fn layout_for(payload: usize) -> Option<Layout> {
    Layout::from_size_align(HDR_SIZE.checked_add(payload)?, ALIGN).ok()
}

/// Header of a live handle.
///
/// # Safety
/// `p` must be a non-null handle produced by [`alloc`] and not yet freed.
pub unsafe fn header<'a>(p: RtHandle) -> &'a HeapHeader {
    unsafe { &*(p.sub(HDR_SIZE) as *const HeapHeader) }
}

/// Mutable header access for length/capacity updates.
///
/// # Safety
/// Same as [`header`]; the caller must be the unique mutator.
pub unsafe fn header_mut<'a>(p: RtHandle) -> &'a mut HeapHeader {
    unsafe { &mut *(p.sub(HDR_SIZE) as *mut HeapHeader) }
}

/// Allocate a zero-filled heap object. Returns null when the size
/// overflows or the allocator fails; callers surface that as a sentinel.
pub fn alloc(
    kind: HeapKind,
    elem_kind: ElemKind,
    len: usize,
    cap: usize,
    finalizer: Option<unsafe fn(RtHandle)>,
) -> RtHandle {
    let payload = match kind {
        HeapKind::String | HeapKind::Object => cap,
        HeapKind::Array => match cap.checked_mul(elem_kind.size()) {
            Some(b) => b,
            None => return std::ptr::null_mut(),
        },
    };
    let Some(layout) = layout_for(payload) else {
        return std::ptr::null_mut();
    };
    let base = unsafe { alloc_zeroed(layout) };
    if base.is_null() {
        return std::ptr::null_mut();
    }
    unsafe {
        let hdr = base as *mut HeapHeader;
        hdr.write(HeapHeader {
            kind,
            elem_kind,
            refcnt: AtomicU32::new(1),
            len,
            cap,
            finalizer,
        });
        heap_stats::record_alloc(layout.size());
        base.add(HDR_SIZE)
    }
}

/// Allocate an object-kind heap cell holding `value`, with a finalizer
/// that releases nested references and drops the payload.
pub fn alloc_object<T>(value: T, finalizer: unsafe fn(RtHandle)) -> RtHandle {
    let p = alloc(
        HeapKind::Object,
        ElemKind::Byte,
        1,
        size_of::<T>().max(1),
        Some(finalizer),
    );
    if p.is_null() {
        return p;
    }
    unsafe { (p as *mut T).write(value) };
    p
}

/// Borrow an object payload as `&mut T`. Returns `None` for null handles.
///
/// # Safety
/// `p` must be null or a live object handle allocated for a `T`, and the
/// caller must not create overlapping references.
pub unsafe fn object_ref<'a, T>(p: RtHandle) -> Option<&'a mut T> {
    if p.is_null() {
        None
    } else {
        unsafe { Some(&mut *(p as *mut T)) }
    }
}

/// Increment the refcount. Null handles are legal and skipped.
pub fn retain(p: RtHandle) {
    if p.is_null() {
        return;
    }
    let hdr = unsafe { header(p) };
    let prev = hdr.refcnt.fetch_add(1, Ordering::AcqRel);
    debug_assert!(prev >= 1, "retain on a dead object");
}

/// Decrement the refcount; at zero, run the finalizer and free the
/// combined allocation. Null handles are legal and skipped.
pub fn release(p: RtHandle) {
    if p.is_null() {
        return;
    }
    let hdr = unsafe { header(p) };
    if hdr.refcnt.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    fence(Ordering::Acquire);
    unsafe {
        if let Some(fin) = hdr.finalizer {
            fin(p);
        }
        let payload = payload_bytes(header(p));
        let layout = layout_for(payload).expect("live object had a valid layout");
        heap_stats::record_free(layout.size());
        dealloc(p.sub(HDR_SIZE), layout);
    }
}

/// Grow an unshared array allocation in place via realloc, zero-filling
/// the new region and updating the header. Returns the possibly-moved
/// payload pointer, or null on allocation failure (the original stays
/// valid and unchanged).
///
/// # Safety
/// `p` must be a live array handle with `refcnt == 1`; `new_cap` must not
/// be smaller than the current capacity.
pub unsafe fn grow_array(p: RtHandle, new_len: usize, new_cap: usize) -> RtHandle {
    unsafe {
        let hdr = header(p);
        debug_assert_eq!(hdr.kind, HeapKind::Array);
        debug_assert!(new_cap >= hdr.cap);
        let elem = hdr.elem_kind.size();
        let old_payload = hdr.cap * elem;
        let Some(new_payload) = new_cap.checked_mul(elem) else {
            return std::ptr::null_mut();
        };
        let old_layout = layout_for(old_payload).expect("live object had a valid layout");
        let Some(new_layout) = layout_for(new_payload) else {
            return std::ptr::null_mut();
        };
        let base = std::alloc::realloc(p.sub(HDR_SIZE), old_layout, new_layout.size());
        if base.is_null() {
            return std::ptr::null_mut();
        }
        std::ptr::write_bytes(base.add(HDR_SIZE + old_payload), 0, new_payload - old_payload);
        heap_stats::record_resize(old_layout.size(), new_layout.size());
        let hdr = &mut *(base as *mut HeapHeader);
        hdr.cap = new_cap;
        hdr.len = new_len;
        base.add(HDR_SIZE)
    }
}

/// Current refcount, for tests and diagnostics.
pub fn refcount(p: RtHandle) -> u32 {
    if p.is_null() {
        return 0;
    }
    unsafe { header(p) }.refcnt.load(Ordering::Acquire)
}
