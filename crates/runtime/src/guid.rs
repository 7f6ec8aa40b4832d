//! GUID helpers. Byte order is preserved exactly, so
//! `guid_to_bytes(guid_from_bytes(b)) == b` for every 16-byte input.

use crate::heap::RtStr;
use crate::string::str_new;
use uuid::Uuid;

/// A fresh random (v4) GUID.
pub fn guid_new() -> Uuid {
    Uuid::new_v4()
}

pub fn guid_from_bytes(bytes: [u8; 16]) -> Uuid {
    Uuid::from_bytes(bytes)
}

pub fn guid_to_bytes(guid: Uuid) -> [u8; 16] {
    *guid.as_bytes()
}

/// Canonical lowercase hyphenated form.
pub fn guid_to_string(guid: Uuid) -> String {
    guid.hyphenated().to_string()
}

pub fn guid_parse(text: &str) -> Option<Uuid> {
    Uuid::parse_str(text).ok()
}

/// Runtime-string form of a fresh GUID, for the `rt_guid_new` extern.
pub fn guid_new_str() -> RtStr {
    str_new(&guid_to_string(guid_new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let b: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        assert_eq!(guid_to_bytes(guid_from_bytes(b)), b);
    }

    #[test]
    fn string_round_trip() {
        let g = guid_new();
        let s = guid_to_string(g);
        assert_eq!(guid_parse(&s), Some(g));
        assert_eq!(s.len(), 36);
    }

    #[test]
    fn v4_guids_are_distinct() {
        assert_ne!(guid_new(), guid_new());
    }
}
