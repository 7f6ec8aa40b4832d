//! Row-major 2D grid of object handles with per-axis bounds checks.

use crate::heap::{self, RtHandle};
use crate::trap::{self, TrapKind};
use std::ptr;

struct RtGrid2D {
    cols: usize,
    rows: usize,
    cells: Vec<RtHandle>,
}

unsafe fn finalize(p: RtHandle) {
    unsafe {
        let grid = &mut *(p as *mut RtGrid2D);
        for &h in &grid.cells {
            heap::release(h);
        }
        ptr::drop_in_place(grid);
    }
}

fn get_grid<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtGrid2D> {
    let r = unsafe { heap::object_ref::<RtGrid2D>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("grid2d: {} on a null handle", op));
    }
    r
}

pub fn grid2d_new(cols: i64, rows: i64) -> RtHandle {
    if cols < 0 || rows < 0 {
        trap::raise(
            TrapKind::DomainError,
            format!("grid2d: negative dimensions {}x{}", cols, rows),
        );
        return ptr::null_mut();
    }
    let (cols, rows) = (cols as usize, rows as usize);
    heap::alloc_object(
        RtGrid2D {
            cols,
            rows,
            cells: vec![ptr::null_mut(); cols * rows],
        },
        finalize,
    )
}

pub fn grid2d_cols(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtGrid2D>(h) }.map_or(0, |g| g.cols as i64)
}

pub fn grid2d_rows(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtGrid2D>(h) }.map_or(0, |g| g.rows as i64)
}

fn cell_index(grid: &RtGrid2D, col: i64, row: i64) -> Option<usize> {
    if col < 0 || col as usize >= grid.cols || row < 0 || row as usize >= grid.rows {
        trap::raise(
            TrapKind::Bounds,
            format!(
                "cell ({}, {}) out of range for {}x{} grid",
                col, row, grid.cols, grid.rows
            ),
        );
        return None;
    }
    Some(row as usize * grid.cols + col as usize)
}

/// Retained handle to the cell contents (NULL for empty cells).
pub fn grid2d_get(h: RtHandle, col: i64, row: i64) -> RtHandle {
    let Some(grid) = get_grid(h, "get") else {
        return ptr::null_mut();
    };
    match cell_index(grid, col, row) {
        Some(i) => {
            let cell = grid.cells[i];
            heap::retain(cell);
            cell
        }
        None => ptr::null_mut(),
    }
}

pub fn grid2d_set(h: RtHandle, col: i64, row: i64, value: RtHandle) {
    let Some(grid) = get_grid(h, "set") else { return };
    if let Some(i) = cell_index(grid, col, row) {
        heap::retain(value);
        heap::release(grid.cells[i]);
        grid.cells[i] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{refcount, release};
    use crate::string::str_new;
    use crate::trap::{clear_pending, take_pending};

    #[test]
    fn set_get_round_trip() {
        let g = grid2d_new(3, 2);
        assert_eq!(grid2d_cols(g), 3);
        assert_eq!(grid2d_rows(g), 2);
        let v = str_new("cell");
        grid2d_set(g, 2, 1, v);
        assert_eq!(refcount(v), 2);
        let got = grid2d_get(g, 2, 1);
        assert_eq!(got, v);
        release(got);
        assert!(grid2d_get(g, 0, 0).is_null());
        release(g);
        assert_eq!(refcount(v), 1);
        release(v);
    }

    #[test]
    fn per_axis_bounds() {
        clear_pending();
        let g = grid2d_new(2, 2);
        grid2d_get(g, 2, 0);
        assert_eq!(take_pending().unwrap().kind, TrapKind::Bounds);
        grid2d_get(g, 0, -1);
        assert_eq!(take_pending().unwrap().kind, TrapKind::Bounds);
        release(g);
    }
}
