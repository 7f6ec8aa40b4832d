//! 3x3 matrix helpers, row-major.
//!
//! IL reaches these through the `rt_mat3_*` externs, which represent a
//! matrix as a 9-element f64 array handle; a null handle or any other
//! length traps `DomainError`.

use crate::array;
use crate::heap::RtHandle;
use crate::trap::{self, TrapKind};
use std::ptr;

/// Row-major 3x3 matrix.
pub type Mat3 = [f64; 9];

pub fn mat3_identity() -> Mat3 {
    [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
}

pub fn mat3_transpose(m: Mat3) -> Mat3 {
    [m[0], m[3], m[6], m[1], m[4], m[7], m[2], m[5], m[8]]
}

pub fn mat3_mul(a: Mat3, b: Mat3) -> Mat3 {
    let mut out = [0.0; 9];
    for row in 0..3 {
        for col in 0..3 {
            let mut acc = 0.0;
            for k in 0..3 {
                acc += a[row * 3 + k] * b[k * 3 + col];
            }
            out[row * 3 + col] = acc;
        }
    }
    out
}

pub fn mat3_determinant(m: Mat3) -> f64 {
    m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
        + m[2] * (m[3] * m[7] - m[4] * m[6])
}

/// Read a matrix out of a 9-element f64 array handle; traps
/// `DomainError` on a null handle or any other length.
fn mat3_read(h: RtHandle) -> Option<Mat3> {
    let len = array::arr_f64_len(h);
    if len != 9 {
        trap::raise(
            TrapKind::DomainError,
            format!("mat3: expected a 9-element f64 array, got length {}", len),
        );
        return None;
    }
    let mut m = [0.0; 9];
    for (i, slot) in m.iter_mut().enumerate() {
        *slot = array::arr_f64_get(h, i as i64);
    }
    Some(m)
}

/// Allocate a fresh 9-element f64 array holding `m`.
fn mat3_write(m: Mat3) -> RtHandle {
    let h = array::arr_f64_new(9);
    if h.is_null() {
        return h;
    }
    for (i, v) in m.iter().enumerate() {
        array::arr_f64_put(h, i as i64, *v);
    }
    h
}

/// Fresh identity matrix, for the `rt_mat3_identity` extern.
pub fn mat3_identity_arr() -> RtHandle {
    mat3_write(mat3_identity())
}

/// Transposed copy; the input array is left untouched.
pub fn mat3_transpose_arr(h: RtHandle) -> RtHandle {
    match mat3_read(h) {
        Some(m) => mat3_write(mat3_transpose(m)),
        None => ptr::null_mut(),
    }
}

/// Product `a * b` as a fresh array.
pub fn mat3_mul_arr(a: RtHandle, b: RtHandle) -> RtHandle {
    match (mat3_read(a), mat3_read(b)) {
        (Some(ma), Some(mb)) => mat3_write(mat3_mul(ma, mb)),
        _ => ptr::null_mut(),
    }
}

/// Determinant; 0.0 on a malformed handle (after the trap is recorded).
pub fn mat3_det_arr(h: RtHandle) -> f64 {
    mat3_read(h).map_or(0.0, mat3_determinant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_is_an_involution() {
        let m: Mat3 = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let back = mat3_transpose(mat3_transpose(m));
        for i in 0..9 {
            assert_eq!(back[i].to_bits(), m[i].to_bits());
        }
    }

    #[test]
    fn identity_is_neutral() {
        let m: Mat3 = [2.0, 0.0, 1.0, -1.0, 3.0, 0.5, 0.0, 4.0, 1.0];
        assert_eq!(mat3_mul(m, mat3_identity()), m);
        assert_eq!(mat3_mul(mat3_identity(), m), m);
    }

    #[test]
    fn determinant_of_identity() {
        assert_eq!(mat3_determinant(mat3_identity()), 1.0);
        let singular: Mat3 = [1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 1.0, 0.0];
        assert_eq!(mat3_determinant(singular), 0.0);
    }

    #[test]
    fn array_handles_round_trip() {
        use crate::heap::release;

        let id = mat3_identity_arr();
        assert_eq!(array::arr_f64_len(id), 9);
        assert_eq!(mat3_det_arr(id), 1.0);

        let m = mat3_write([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let t = mat3_transpose_arr(m);
        assert_eq!(array::arr_f64_get(t, 3), 2.0);
        let tt = mat3_transpose_arr(t);
        for i in 0..9 {
            assert_eq!(array::arr_f64_get(tt, i), array::arr_f64_get(m, i));
        }

        let prod = mat3_mul_arr(m, id);
        for i in 0..9 {
            assert_eq!(array::arr_f64_get(prod, i), array::arr_f64_get(m, i));
        }

        release(prod);
        release(tt);
        release(t);
        release(m);
        release(id);
    }

    #[test]
    fn malformed_handles_trap_domain_error() {
        use crate::heap::release;
        use crate::trap::{clear_pending, take_pending};

        clear_pending();
        assert!(mat3_transpose_arr(std::ptr::null_mut()).is_null());
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);

        let short = array::arr_f64_new(4);
        assert_eq!(mat3_det_arr(short), 0.0);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        release(short);
    }
}
