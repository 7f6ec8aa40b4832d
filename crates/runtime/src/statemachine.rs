//! Named-state machine with an explicit transition table.
//!
//! States and transitions are registered up front; `goto` succeeds only
//! along a registered edge from the current state. Referencing an
//! unregistered state traps `DomainError`.

use crate::heap::{self, RtHandle, RtStr};
use crate::string::{str_bytes, str_from_bytes};
use crate::trap::{self, TrapKind};
use std::collections::HashSet;
use std::ptr;

struct RtStateMachine {
    states: Vec<Vec<u8>>,
    transitions: HashSet<(Vec<u8>, Vec<u8>)>,
    current: Option<Vec<u8>>,
}

unsafe fn finalize(p: RtHandle) {
    unsafe { ptr::drop_in_place(p as *mut RtStateMachine) };
}

fn get_sm<'a>(h: RtHandle, op: &str) -> Option<&'a mut RtStateMachine> {
    let r = unsafe { heap::object_ref::<RtStateMachine>(h) };
    if r.is_none() {
        trap::raise(
            TrapKind::DomainError,
            format!("statemachine: {} on a null handle", op),
        );
    }
    r
}

pub fn statemachine_new() -> RtHandle {
    heap::alloc_object(
        RtStateMachine {
            states: Vec::new(),
            transitions: HashSet::new(),
            current: None,
        },
        finalize,
    )
}

pub fn statemachine_add_state(h: RtHandle, name: RtStr) {
    let Some(sm) = get_sm(h, "add_state") else { return };
    let name = unsafe { str_bytes(name) }.to_vec();
    if !sm.states.contains(&name) {
        sm.states.push(name);
    }
}

pub fn statemachine_add_transition(h: RtHandle, from: RtStr, to: RtStr) {
    let Some(sm) = get_sm(h, "add_transition") else { return };
    let from = unsafe { str_bytes(from) }.to_vec();
    let to = unsafe { str_bytes(to) }.to_vec();
    if !sm.states.contains(&from) || !sm.states.contains(&to) {
        trap::raise(
            TrapKind::DomainError,
            "statemachine: transition references an unregistered state",
        );
        return;
    }
    sm.transitions.insert((from, to));
}

pub fn statemachine_set_initial(h: RtHandle, state: RtStr) {
    let Some(sm) = get_sm(h, "set_initial") else { return };
    let state = unsafe { str_bytes(state) }.to_vec();
    if !sm.states.contains(&state) {
        trap::raise(
            TrapKind::DomainError,
            "statemachine: initial state is not registered",
        );
        return;
    }
    sm.current = Some(state);
}

/// Follow a registered edge from the current state; returns whether the
/// transition was taken.
pub fn statemachine_goto(h: RtHandle, to: RtStr) -> bool {
    let Some(sm) = get_sm(h, "goto") else {
        return false;
    };
    let Some(cur) = sm.current.clone() else {
        trap::raise(TrapKind::DomainError, "statemachine: no initial state");
        return false;
    };
    let to = unsafe { str_bytes(to) }.to_vec();
    if sm.transitions.contains(&(cur, to.clone())) {
        sm.current = Some(to);
        true
    } else {
        false
    }
}

/// The current state as a fresh string; traps `DomainError` before an
/// initial state is set.
pub fn statemachine_current(h: RtHandle) -> RtStr {
    let Some(sm) = get_sm(h, "current") else {
        return ptr::null_mut();
    };
    match &sm.current {
        Some(cur) => str_from_bytes(cur),
        None => {
            trap::raise(TrapKind::DomainError, "statemachine: no initial state");
            ptr::null_mut()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::release;
    use crate::string::{str_eq, str_new};
    use crate::trap::{clear_pending, take_pending};

    #[test]
    fn walks_registered_edges_only() {
        let sm = statemachine_new();
        let idle = str_new("idle");
        let run = str_new("running");
        let done = str_new("done");
        statemachine_add_state(sm, idle);
        statemachine_add_state(sm, run);
        statemachine_add_state(sm, done);
        statemachine_add_transition(sm, idle, run);
        statemachine_add_transition(sm, run, done);
        statemachine_set_initial(sm, idle);

        assert!(!statemachine_goto(sm, done)); // no idle -> done edge
        assert!(statemachine_goto(sm, run));
        let cur = statemachine_current(sm);
        assert!(str_eq(cur, run));
        release(cur);
        assert!(statemachine_goto(sm, done));

        release(sm);
        release(idle);
        release(run);
        release(done);
    }

    #[test]
    fn unregistered_state_traps() {
        clear_pending();
        let sm = statemachine_new();
        let a = str_new("a");
        let ghost = str_new("ghost");
        statemachine_add_state(sm, a);
        statemachine_add_transition(sm, a, ghost);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        statemachine_current(sm);
        assert_eq!(take_pending().unwrap().kind, TrapKind::DomainError);
        release(sm);
        release(a);
        release(ghost);
    }
}
