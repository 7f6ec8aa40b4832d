//! Monotonic stopwatch.

use crate::heap::{self, RtHandle};
use crate::trap::{self, TrapKind};
use std::ptr;
use std::time::Instant;

struct RtTimer {
    started: Option<Instant>,
}

unsafe fn finalize(p: RtHandle) {
    unsafe { ptr::drop_in_place(p as *mut RtTimer) };
}

fn get_timer<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtTimer> {
    let r = unsafe { heap::object_ref::<RtTimer>(h) };
    if r.is_none() {
        trap::raise(TrapKind::DomainError, format!("timer: {} on a null handle", op));
    }
    r
}

pub fn timer_new() -> RtHandle {
    heap::alloc_object(RtTimer { started: None }, finalize)
}

pub fn timer_start(h: RtHandle) {
    if let Some(t) = get_timer(h, "start") {
        t.started = Some(Instant::now());
    }
}

/// Milliseconds since `start`; 0 before the first start.
pub fn timer_elapsed_ms(h: RtHandle) -> i64 {
    unsafe { heap::object_ref::<RtTimer>(h) }
        .and_then(|t| t.started)
        .map_or(0, |s| s.elapsed().as_millis() as i64)
}

pub fn timer_reset(h: RtHandle) {
    if let Some(t) = get_timer(h, "reset") {
        t.started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::release;

    #[test]
    fn elapsed_is_monotone() {
        let t = timer_new();
        assert_eq!(timer_elapsed_ms(t), 0);
        timer_start(t);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer_elapsed_ms(t) >= 5);
        timer_reset(t);
        assert_eq!(timer_elapsed_ms(t), 0);
        release(t);
    }
}
