//! Runtime strings: immutable UTF-8 byte sequences with a cached length
//! and a NUL sentinel outside `len` but within `cap`.
//!
//! Every operation that "modifies" a string allocates a new one. Slicing
//! helpers are byte-indexed; a caller slicing mid-codepoint receives an
//! ill-formed fragment, which is defined but discouraged. Case mapping is
//! ASCII-only; multi-byte codepoints pass through unchanged. `str_flip`
//! is codepoint-aware.

use crate::heap::{self, ElemKind, HeapKind, RtStr};
use crate::trap::{self, TrapKind};

/// Allocate a runtime string from raw bytes (not required to be valid
/// UTF-8). Returns null on allocation failure.
pub fn str_from_bytes(bytes: &[u8]) -> RtStr {
    let p = heap::alloc(HeapKind::String, ElemKind::Byte, bytes.len(), bytes.len() + 1, None);
    if p.is_null() {
        return p;
    }
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), p, bytes.len());
        // alloc_zeroed already wrote the NUL sentinel.
    }
    p
}

/// Allocate a runtime string from a Rust string.
pub fn str_new(s: &str) -> RtStr {
    str_from_bytes(s.as_bytes())
}

/// Borrow the byte payload. Null handles read as the empty string.
///
/// # Safety
/// `s` must be null or a live string handle.
pub unsafe fn str_bytes<'a>(s: RtStr) -> &'a [u8] {
    if s.is_null() {
        return &[];
    }
    let hdr = unsafe { heap::header(s) };
    unsafe { std::slice::from_raw_parts(s, hdr.len) }
}

/// Byte length; null reads as 0.
pub fn str_len(s: RtStr) -> i64 {
    unsafe { str_bytes(s) }.len() as i64
}

pub fn str_concat(a: RtStr, b: RtStr) -> RtStr {
    let (ab, bb) = unsafe { (str_bytes(a), str_bytes(b)) };
    let mut out = Vec::with_capacity(ab.len() + bb.len());
    out.extend_from_slice(ab);
    out.extend_from_slice(bb);
    str_from_bytes(&out)
}

/// Byte-indexed substring with clamping: negative start or length reads
/// as 0, ranges past the end are truncated.
pub fn str_substr(s: RtStr, start: i64, len: i64) -> RtStr {
    let bytes = unsafe { str_bytes(s) };
    let start = start.max(0) as usize;
    let len = len.max(0) as usize;
    if start >= bytes.len() {
        return str_from_bytes(&[]);
    }
    let end = start.saturating_add(len).min(bytes.len());
    str_from_bytes(&bytes[start..end])
}

/// First `n` bytes.
pub fn str_left(s: RtStr, n: i64) -> RtStr {
    let bytes = unsafe { str_bytes(s) };
    let n = (n.max(0) as usize).min(bytes.len());
    str_from_bytes(&bytes[..n])
}

/// Last `n` bytes.
pub fn str_right(s: RtStr, n: i64) -> RtStr {
    let bytes = unsafe { str_bytes(s) };
    let n = (n.max(0) as usize).min(bytes.len());
    str_from_bytes(&bytes[bytes.len() - n..])
}

/// Bytes from `start` to the end.
pub fn str_mid2(s: RtStr, start: i64) -> RtStr {
    let bytes = unsafe { str_bytes(s) };
    let start = (start.max(0) as usize).min(bytes.len());
    str_from_bytes(&bytes[start..])
}

/// `len` bytes from `start`.
pub fn str_mid3(s: RtStr, start: i64, len: i64) -> RtStr {
    str_substr(s, start, len)
}

/// Byte offset of `needle` in `hay`, or -1 when absent.
pub fn str_instr2(hay: RtStr, needle: RtStr) -> i64 {
    str_instr3(0, hay, needle)
}

/// Byte offset of `needle` in `hay` searching from `start`, or -1.
pub fn str_instr3(start: i64, hay: RtStr, needle: RtStr) -> i64 {
    let hay = unsafe { str_bytes(hay) };
    let needle = unsafe { str_bytes(needle) };
    let start = (start.max(0) as usize).min(hay.len());
    if needle.is_empty() {
        return start as i64;
    }
    hay[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| (start + i) as i64)
        .unwrap_or(-1)
}

fn trim_impl(s: RtStr, left: bool, right: bool) -> RtStr {
    let bytes = unsafe { str_bytes(s) };
    let mut lo = 0;
    let mut hi = bytes.len();
    if left {
        while lo < hi && bytes[lo].is_ascii_whitespace() {
            lo += 1;
        }
    }
    if right {
        while hi > lo && bytes[hi - 1].is_ascii_whitespace() {
            hi -= 1;
        }
    }
    str_from_bytes(&bytes[lo..hi])
}

pub fn str_ltrim(s: RtStr) -> RtStr {
    trim_impl(s, true, false)
}

pub fn str_rtrim(s: RtStr) -> RtStr {
    trim_impl(s, false, true)
}

pub fn str_trim(s: RtStr) -> RtStr {
    trim_impl(s, true, true)
}

/// ASCII uppercase; bytes outside a-z pass through.
pub fn str_ucase(s: RtStr) -> RtStr {
    let out: Vec<u8> = unsafe { str_bytes(s) }
        .iter()
        .map(|b| b.to_ascii_uppercase())
        .collect();
    str_from_bytes(&out)
}

/// ASCII lowercase; bytes outside A-Z pass through.
pub fn str_lcase(s: RtStr) -> RtStr {
    let out: Vec<u8> = unsafe { str_bytes(s) }
        .iter()
        .map(|b| b.to_ascii_lowercase())
        .collect();
    str_from_bytes(&out)
}

/// Codepoint-aware reverse. Valid UTF-8 sequences move as units, so
/// `str_flip(str_flip(s)) == s` for every valid string; stray bytes in
/// ill-formed input move individually.
pub fn str_flip(s: RtStr) -> RtStr {
    let bytes = unsafe { str_bytes(s) };
    let mut units: Vec<&[u8]> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let w = utf8_width(bytes[i]);
        let end = (i + w).min(bytes.len());
        if w > 1 && bytes[i + 1..end].iter().all(|b| b & 0xC0 == 0x80) && end - i == w {
            units.push(&bytes[i..end]);
            i = end;
        } else {
            units.push(&bytes[i..i + 1]);
            i += 1;
        }
    }
    let mut out = Vec::with_capacity(bytes.len());
    for u in units.iter().rev() {
        out.extend_from_slice(u);
    }
    str_from_bytes(&out)
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

/// One-codepoint string. An invalid codepoint traps `DomainError` and
/// returns null.
pub fn str_chr(code: i64) -> RtStr {
    let Some(c) = u32::try_from(code).ok().and_then(char::from_u32) else {
        trap::raise(TrapKind::DomainError, format!("chr: invalid codepoint {}", code));
        return std::ptr::null_mut();
    };
    let mut buf = [0u8; 4];
    str_new(c.encode_utf8(&mut buf))
}

/// Code of the first byte. The empty string traps `DomainError`.
pub fn str_asc(s: RtStr) -> i64 {
    let bytes = unsafe { str_bytes(s) };
    match bytes.first() {
        Some(&b) => b as i64,
        None => {
            trap::raise(TrapKind::DomainError, "asc: empty string");
            -1
        }
    }
}

/// Byte equality.
pub fn str_eq(a: RtStr, b: RtStr) -> bool {
    unsafe { str_bytes(a) == str_bytes(b) }
}

/// Leading integer value after trimming; 0 when unparsable.
pub fn str_to_int(s: RtStr) -> i64 {
    let text = String::from_utf8_lossy(unsafe { str_bytes(s) });
    text.trim().parse().unwrap_or(0)
}

/// Numeric value after trimming; 0.0 when unparsable.
pub fn str_val(s: RtStr) -> f64 {
    let text = String::from_utf8_lossy(unsafe { str_bytes(s) });
    text.trim().parse().unwrap_or(0.0)
}

pub fn int_to_str(v: i64) -> RtStr {
    str_new(&v.to_string())
}

/// Shortest round-trip rendering.
pub fn f64_to_str(v: f64) -> RtStr {
    str_new(&format!("{}", v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::release;

    fn text(s: RtStr) -> String {
        let out = String::from_utf8_lossy(unsafe { str_bytes(s) }).into_owned();
        release(s);
        out
    }

    #[test]
    fn concat_and_len() {
        let a = str_new("foo");
        let b = str_new("bar");
        let c = str_concat(a, b);
        assert_eq!(str_len(c), 6);
        assert_eq!(text(c), "foobar");
        release(a);
        release(b);
    }

    #[test]
    fn byte_indexed_slicing() {
        let s = str_new("hello world");
        assert_eq!(text(str_left(s, 5)), "hello");
        assert_eq!(text(str_right(s, 5)), "world");
        assert_eq!(text(str_mid2(s, 6)), "world");
        assert_eq!(text(str_substr(s, 3, 2)), "lo");
        // Clamping.
        assert_eq!(text(str_left(s, 99)), "hello world");
        assert_eq!(text(str_substr(s, 99, 5)), "");
        assert_eq!(text(str_substr(s, -3, 5)), "hello");
        release(s);
    }

    #[test]
    fn case_mapping_is_ascii_only() {
        let s = str_new("Grüße 123");
        assert_eq!(text(str_ucase(s)), "GRüßE 123");
        assert_eq!(text(str_lcase(s)), "grüße 123");
        release(s);
    }

    #[test]
    fn trims() {
        let s = str_new("  padded\t ");
        assert_eq!(text(str_trim(s)), "padded");
        assert_eq!(text(str_ltrim(s)), "padded\t ");
        assert_eq!(text(str_rtrim(s)), "  padded");
        release(s);
    }

    #[test]
    fn flip_preserves_codepoints() {
        let s = str_new("café");
        assert_eq!(str_len(s), 5);
        let flipped = str_flip(s);
        assert_eq!(str_len(flipped), 5);
        let back = str_flip(flipped);
        assert!(str_eq(back, s));
        assert_eq!(text(flipped), "éfac");
        release(back);
        release(s);
    }

    #[test]
    fn flip_empty_and_ascii() {
        let e = str_new("");
        assert_eq!(text(str_flip(e)), "");
        release(e);
        let a = str_new("abc");
        assert_eq!(text(str_flip(a)), "cba");
        release(a);
    }

    #[test]
    fn instr_finds_byte_offsets() {
        let hay = str_new("one two two");
        let needle = str_new("two");
        assert_eq!(str_instr2(hay, needle), 4);
        assert_eq!(str_instr3(5, hay, needle), 8);
        let missing = str_new("three");
        assert_eq!(str_instr2(hay, missing), -1);
        release(hay);
        release(needle);
        release(missing);
    }

    #[test]
    fn chr_and_asc() {
        crate::trap::clear_pending();
        let s = str_chr(65);
        assert_eq!(text(s), "A");
        let e = str_new("A");
        assert_eq!(str_asc(e), 65);
        release(e);

        let bad = str_chr(-1);
        assert!(bad.is_null());
        let t = crate::trap::take_pending().unwrap();
        assert_eq!(t.kind, TrapKind::DomainError);
    }

    #[test]
    fn numeric_conversions() {
        let s = str_new(" 42 ");
        assert_eq!(str_to_int(s), 42);
        release(s);
        let f = str_new("2.5");
        assert_eq!(str_val(f), 2.5);
        release(f);
        let junk = str_new("n/a");
        assert_eq!(str_to_int(junk), 0);
        assert_eq!(str_val(junk), 0.0);
        release(junk);
        assert_eq!(text(int_to_str(-7)), "-7");
        assert_eq!(text(f64_to_str(1.5)), "1.5");
    }

    #[test]
    fn null_reads_as_empty() {
        let null: RtStr = std::ptr::null_mut();
        assert_eq!(str_len(null), 0);
        assert_eq!(text(str_left(null, 3)), "");
        let empty = str_new("");
        assert!(str_eq(null, empty));
        release(empty);
    }
}
