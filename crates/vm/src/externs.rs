//! Extern registry: maps `rt_*` names to native handlers plus declared
//! signatures. User-supplied externs register at VM construction time;
//! the VM enforces arity at call time.
//!
//! Handler convention: handlers receive marshaled argument slots and
//! return one result slot. A returned `Str`/`Obj`/`Error` slot transfers
//! ownership to the caller (the handler retained or freshly allocated
//! it); faults are recorded in the runtime's pending-trap cell, never
//! unwound.

use crate::slot::Slot;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use viper_il::Type;
use viper_runtime::{
    array, barrier, future, gate, grid2d, guid, heap, list, map, mat3, math, objpool, queue,
    rwlock, set, stack, statemachine, string, timer, trap,
};

pub type ExternFn = fn(&[Slot]) -> Slot;

/// Declared signature of a registered extern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Signature {
    pub fn new(params: Vec<Type>, ret: Type) -> Signature {
        Signature { params, ret }
    }
}

pub struct ExternRegistry {
    entries: HashMap<String, (Signature, ExternFn)>,
}

impl ExternRegistry {
    /// Registry preloaded with every built-in runtime helper.
    pub fn with_runtime() -> ExternRegistry {
        let mut r = ExternRegistry {
            entries: HashMap::new(),
        };
        use Type::{Error, F64, I1, I64, Ptr, Str, Void};

        let mut put = |name: &str, params: Vec<Type>, ret: Type, f: ExternFn| {
            r.entries.insert(name.to_string(), (Signature::new(params, ret), f));
        };

        // Core traps and console I/O.
        put("rt_trap", vec![Str], Void, rt_trap);
        put("rt_abort", vec![Str], Void, rt_abort);
        put("rt_print_str", vec![Str], Void, rt_print_str);
        put("rt_print_i64", vec![I64], Void, rt_print_i64);
        put("rt_print_f64", vec![F64], Void, rt_print_f64);
        put("rt_input_line", vec![], Str, rt_input_line);

        // Strings.
        put("rt_len", vec![Str], I64, |a| Slot::Int(string::str_len(a[0].as_handle())));
        put("rt_concat", vec![Str, Str], Str, |a| {
            Slot::Str(string::str_concat(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_substr", vec![Str, I64, I64], Str, |a| {
            Slot::Str(string::str_substr(a[0].as_handle(), a[1].as_i64(), a[2].as_i64()))
        });
        put("rt_left", vec![Str, I64], Str, |a| {
            Slot::Str(string::str_left(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_right", vec![Str, I64], Str, |a| {
            Slot::Str(string::str_right(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_mid2", vec![Str, I64], Str, |a| {
            Slot::Str(string::str_mid2(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_mid3", vec![Str, I64, I64], Str, |a| {
            Slot::Str(string::str_mid3(a[0].as_handle(), a[1].as_i64(), a[2].as_i64()))
        });
        put("rt_instr2", vec![Str, Str], I64, |a| {
            Slot::Int(string::str_instr2(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_instr3", vec![I64, Str, Str], I64, |a| {
            Slot::Int(string::str_instr3(a[0].as_i64(), a[1].as_handle(), a[2].as_handle()))
        });
        put("rt_ltrim", vec![Str], Str, |a| Slot::Str(string::str_ltrim(a[0].as_handle())));
        put("rt_rtrim", vec![Str], Str, |a| Slot::Str(string::str_rtrim(a[0].as_handle())));
        put("rt_trim", vec![Str], Str, |a| Slot::Str(string::str_trim(a[0].as_handle())));
        put("rt_ucase", vec![Str], Str, |a| Slot::Str(string::str_ucase(a[0].as_handle())));
        put("rt_lcase", vec![Str], Str, |a| Slot::Str(string::str_lcase(a[0].as_handle())));
        put("rt_flip", vec![Str], Str, |a| Slot::Str(string::str_flip(a[0].as_handle())));
        put("rt_chr", vec![I64], Str, |a| Slot::Str(string::str_chr(a[0].as_i64())));
        put("rt_asc", vec![Str], I64, |a| Slot::Int(string::str_asc(a[0].as_handle())));
        put("rt_str_eq", vec![Str, Str], I1, |a| {
            Slot::Bool(string::str_eq(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_to_int", vec![Str], I64, |a| Slot::Int(string::str_to_int(a[0].as_handle())));
        put("rt_int_to_str", vec![I64], Str, |a| Slot::Str(string::int_to_str(a[0].as_i64())));
        put("rt_f64_to_str", vec![F64], Str, |a| Slot::Str(string::f64_to_str(a[0].as_f64())));
        put("rt_val", vec![Str], F64, |a| Slot::Float(string::str_val(a[0].as_handle())));
        put("rt_str", vec![F64], Str, |a| Slot::Str(string::f64_to_str(a[0].as_f64())));
        put("rt_str_retain", vec![Str], Void, |a| {
            heap::retain(a[0].as_handle());
            Slot::Unit
        });
        put("rt_str_release", vec![Str], Void, |a| {
            heap::release(a[0].as_handle());
            Slot::Unit
        });

        // Math.
        put("rt_sqrt", vec![F64], F64, |a| Slot::Float(math::sqrt(a[0].as_f64())));
        put("rt_floor", vec![F64], F64, |a| Slot::Float(math::floor(a[0].as_f64())));
        put("rt_ceil", vec![F64], F64, |a| Slot::Float(math::ceil(a[0].as_f64())));
        put("rt_sin", vec![F64], F64, |a| Slot::Float(math::sin(a[0].as_f64())));
        put("rt_cos", vec![F64], F64, |a| Slot::Float(math::cos(a[0].as_f64())));
        put("rt_pow", vec![F64, F64], F64, |a| {
            Slot::Float(math::pow(a[0].as_f64(), a[1].as_f64()))
        });
        put("rt_abs_i64", vec![I64], I64, |a| Slot::Int(math::abs_i64(a[0].as_i64())));
        put("rt_abs_f64", vec![F64], F64, |a| Slot::Float(math::abs_f64(a[0].as_f64())));
        put("rt_randomize_i64", vec![I64], Void, |a| {
            math::randomize_i64(a[0].as_i64());
            Slot::Unit
        });
        put("rt_rnd", vec![], F64, |_| Slot::Float(math::rnd()));
        put("rt_guid_new", vec![], Str, |_| Slot::Str(guid::guid_new_str()));

        // 3x3 matrices as 9-element f64 array handles.
        put("rt_mat3_identity", vec![], Ptr, |_| Slot::Obj(mat3::mat3_identity_arr()));
        put("rt_mat3_transpose", vec![Ptr], Ptr, |a| {
            Slot::Obj(mat3::mat3_transpose_arr(a[0].as_handle()))
        });
        put("rt_mat3_mul", vec![Ptr, Ptr], Ptr, |a| {
            Slot::Obj(mat3::mat3_mul_arr(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_mat3_det", vec![Ptr], F64, |a| {
            Slot::Float(mat3::mat3_det_arr(a[0].as_handle()))
        });

        // Raw allocation.
        put("rt_alloc", vec![I64], Ptr, rt_alloc);
        put("rt_const_cstr", vec![Ptr], Str, rt_const_cstr);

        // Typed arrays.
        put("rt_arr_i32_new", vec![I64], Ptr, |a| Slot::Obj(array::arr_i32_new(a[0].as_i64())));
        put("rt_arr_i32_len", vec![Ptr], I64, |a| Slot::Int(array::arr_i32_len(a[0].as_handle())));
        put("rt_arr_i32_get", vec![Ptr, I64], I64, |a| {
            Slot::Int(array::arr_i32_get(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_i32_put", vec![Ptr, I64, I64], Void, |a| {
            array::arr_i32_put(a[0].as_handle(), a[1].as_i64(), a[2].as_i64());
            Slot::Unit
        });
        put("rt_arr_i32_resize", vec![Ptr, I64], Ptr, |a| {
            Slot::Obj(array::arr_i32_resize(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_i64_new", vec![I64], Ptr, |a| Slot::Obj(array::arr_i64_new(a[0].as_i64())));
        put("rt_arr_i64_len", vec![Ptr], I64, |a| Slot::Int(array::arr_i64_len(a[0].as_handle())));
        put("rt_arr_i64_get", vec![Ptr, I64], I64, |a| {
            Slot::Int(array::arr_i64_get(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_i64_put", vec![Ptr, I64, I64], Void, |a| {
            array::arr_i64_put(a[0].as_handle(), a[1].as_i64(), a[2].as_i64());
            Slot::Unit
        });
        put("rt_arr_i64_resize", vec![Ptr, I64], Ptr, |a| {
            Slot::Obj(array::arr_i64_resize(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_f64_new", vec![I64], Ptr, |a| Slot::Obj(array::arr_f64_new(a[0].as_i64())));
        put("rt_arr_f64_len", vec![Ptr], I64, |a| Slot::Int(array::arr_f64_len(a[0].as_handle())));
        put("rt_arr_f64_get", vec![Ptr, I64], F64, |a| {
            Slot::Float(array::arr_f64_get(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_f64_put", vec![Ptr, I64, F64], Void, |a| {
            array::arr_f64_put(a[0].as_handle(), a[1].as_i64(), a[2].as_f64());
            Slot::Unit
        });
        put("rt_arr_f64_resize", vec![Ptr, I64], Ptr, |a| {
            Slot::Obj(array::arr_f64_resize(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_str_new", vec![I64], Ptr, |a| Slot::Obj(array::arr_str_new(a[0].as_i64())));
        put("rt_arr_str_len", vec![Ptr], I64, |a| Slot::Int(array::arr_str_len(a[0].as_handle())));
        put("rt_arr_str_get", vec![Ptr, I64], Str, |a| {
            Slot::Str(array::arr_str_get(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_str_put", vec![Ptr, I64, Str], Void, |a| {
            array::arr_str_put(a[0].as_handle(), a[1].as_i64(), a[2].as_handle());
            Slot::Unit
        });
        put("rt_arr_str_resize", vec![Ptr, I64], Ptr, |a| {
            Slot::Obj(array::arr_str_resize(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_obj_new", vec![I64], Ptr, |a| Slot::Obj(array::arr_obj_new(a[0].as_i64())));
        put("rt_arr_obj_len", vec![Ptr], I64, |a| Slot::Int(array::arr_obj_len(a[0].as_handle())));
        put("rt_arr_obj_get", vec![Ptr, I64], Ptr, |a| {
            Slot::Obj(array::arr_obj_get(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_obj_put", vec![Ptr, I64, Ptr], Void, |a| {
            array::arr_obj_put(a[0].as_handle(), a[1].as_i64(), a[2].as_handle());
            Slot::Unit
        });
        put("rt_arr_obj_resize", vec![Ptr, I64], Ptr, |a| {
            Slot::Obj(array::arr_obj_resize(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_arr_retain", vec![Ptr], Void, |a| {
            heap::retain(a[0].as_handle());
            Slot::Unit
        });
        put("rt_arr_release", vec![Ptr], Void, |a| {
            heap::release(a[0].as_handle());
            Slot::Unit
        });

        // Collections.
        put("rt_list_new", vec![], Ptr, |_| Slot::Obj(list::list_new()));
        put("rt_list_len", vec![Ptr], I64, |a| Slot::Int(list::list_len(a[0].as_handle())));
        put("rt_list_push", vec![Ptr, Ptr], Void, |a| {
            list::list_push(a[0].as_handle(), a[1].as_handle());
            Slot::Unit
        });
        put("rt_list_get", vec![Ptr, I64], Ptr, |a| {
            Slot::Obj(list::list_get(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_list_set", vec![Ptr, I64, Ptr], Void, |a| {
            list::list_set(a[0].as_handle(), a[1].as_i64(), a[2].as_handle());
            Slot::Unit
        });
        put("rt_list_remove", vec![Ptr, I64], Void, |a| {
            list::list_remove(a[0].as_handle(), a[1].as_i64());
            Slot::Unit
        });
        put("rt_list_clear", vec![Ptr], Void, |a| {
            list::list_clear(a[0].as_handle());
            Slot::Unit
        });
        put("rt_stack_new", vec![], Ptr, |_| Slot::Obj(stack::stack_new()));
        put("rt_stack_len", vec![Ptr], I64, |a| Slot::Int(stack::stack_len(a[0].as_handle())));
        put("rt_stack_push", vec![Ptr, Ptr], Void, |a| {
            stack::stack_push(a[0].as_handle(), a[1].as_handle());
            Slot::Unit
        });
        put("rt_stack_pop", vec![Ptr], Ptr, |a| Slot::Obj(stack::stack_pop(a[0].as_handle())));
        put("rt_stack_top", vec![Ptr], Ptr, |a| Slot::Obj(stack::stack_top(a[0].as_handle())));
        put("rt_queue_new", vec![], Ptr, |_| Slot::Obj(queue::queue_new()));
        put("rt_queue_len", vec![Ptr], I64, |a| Slot::Int(queue::queue_len(a[0].as_handle())));
        put("rt_queue_enqueue", vec![Ptr, Ptr], Void, |a| {
            queue::queue_enqueue(a[0].as_handle(), a[1].as_handle());
            Slot::Unit
        });
        put("rt_queue_dequeue", vec![Ptr], Ptr, |a| {
            Slot::Obj(queue::queue_dequeue(a[0].as_handle()))
        });
        put("rt_queue_front", vec![Ptr], Ptr, |a| {
            Slot::Obj(queue::queue_front(a[0].as_handle()))
        });
        put("rt_map_new", vec![], Ptr, |_| Slot::Obj(map::map_new()));
        put("rt_map_len", vec![Ptr], I64, |a| Slot::Int(map::map_len(a[0].as_handle())));
        put("rt_map_put", vec![Ptr, Str, Ptr], Void, |a| {
            map::map_put(a[0].as_handle(), a[1].as_handle(), a[2].as_handle());
            Slot::Unit
        });
        put("rt_map_get", vec![Ptr, Str], Ptr, |a| {
            Slot::Obj(map::map_get(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_map_has", vec![Ptr, Str], I1, |a| {
            Slot::Bool(map::map_has(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_map_remove", vec![Ptr, Str], Void, |a| {
            map::map_remove(a[0].as_handle(), a[1].as_handle());
            Slot::Unit
        });
        put("rt_set_new", vec![], Ptr, |_| Slot::Obj(set::set_new()));
        put("rt_set_len", vec![Ptr], I64, |a| Slot::Int(set::set_len(a[0].as_handle())));
        put("rt_set_add", vec![Ptr, Str], I1, |a| {
            Slot::Bool(set::set_add(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_set_has", vec![Ptr, Str], I1, |a| {
            Slot::Bool(set::set_has(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_set_remove", vec![Ptr, Str], I1, |a| {
            Slot::Bool(set::set_remove(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_grid2d_new", vec![I64, I64], Ptr, |a| {
            Slot::Obj(grid2d::grid2d_new(a[0].as_i64(), a[1].as_i64()))
        });
        put("rt_grid2d_cols", vec![Ptr], I64, |a| {
            Slot::Int(grid2d::grid2d_cols(a[0].as_handle()))
        });
        put("rt_grid2d_rows", vec![Ptr], I64, |a| {
            Slot::Int(grid2d::grid2d_rows(a[0].as_handle()))
        });
        put("rt_grid2d_get", vec![Ptr, I64, I64], Ptr, |a| {
            Slot::Obj(grid2d::grid2d_get(a[0].as_handle(), a[1].as_i64(), a[2].as_i64()))
        });
        put("rt_grid2d_set", vec![Ptr, I64, I64, Ptr], Void, |a| {
            grid2d::grid2d_set(a[0].as_handle(), a[1].as_i64(), a[2].as_i64(), a[3].as_handle());
            Slot::Unit
        });
        put("rt_objpool_new", vec![I64], Ptr, |a| {
            Slot::Obj(objpool::objpool_new(a[0].as_i64()))
        });
        put("rt_objpool_acquire", vec![Ptr], I64, |a| {
            Slot::Int(objpool::objpool_acquire(a[0].as_handle()))
        });
        put("rt_objpool_release", vec![Ptr, I64], Void, |a| {
            objpool::objpool_release(a[0].as_handle(), a[1].as_i64());
            Slot::Unit
        });
        put("rt_objpool_in_use", vec![Ptr], I64, |a| {
            Slot::Int(objpool::objpool_in_use(a[0].as_handle()))
        });
        put("rt_statemachine_new", vec![], Ptr, |_| {
            Slot::Obj(statemachine::statemachine_new())
        });
        put("rt_statemachine_add_state", vec![Ptr, Str], Void, |a| {
            statemachine::statemachine_add_state(a[0].as_handle(), a[1].as_handle());
            Slot::Unit
        });
        put("rt_statemachine_add_transition", vec![Ptr, Str, Str], Void, |a| {
            statemachine::statemachine_add_transition(
                a[0].as_handle(),
                a[1].as_handle(),
                a[2].as_handle(),
            );
            Slot::Unit
        });
        put("rt_statemachine_set_initial", vec![Ptr, Str], Void, |a| {
            statemachine::statemachine_set_initial(a[0].as_handle(), a[1].as_handle());
            Slot::Unit
        });
        put("rt_statemachine_goto", vec![Ptr, Str], I1, |a| {
            Slot::Bool(statemachine::statemachine_goto(a[0].as_handle(), a[1].as_handle()))
        });
        put("rt_statemachine_current", vec![Ptr], Str, |a| {
            Slot::Str(statemachine::statemachine_current(a[0].as_handle()))
        });
        put("rt_timer_new", vec![], Ptr, |_| Slot::Obj(timer::timer_new()));
        put("rt_timer_start", vec![Ptr], Void, |a| {
            timer::timer_start(a[0].as_handle());
            Slot::Unit
        });
        put("rt_timer_elapsed_ms", vec![Ptr], I64, |a| {
            Slot::Int(timer::timer_elapsed_ms(a[0].as_handle()))
        });
        put("rt_timer_reset", vec![Ptr], Void, |a| {
            timer::timer_reset(a[0].as_handle());
            Slot::Unit
        });
        put("rt_obj_retain", vec![Ptr], Void, |a| {
            heap::retain(a[0].as_handle());
            Slot::Unit
        });
        put("rt_obj_release", vec![Ptr], Void, |a| {
            heap::release(a[0].as_handle());
            Slot::Unit
        });

        // Concurrency primitives.
        put("rt_gate_new", vec![I64], Ptr, |a| Slot::Obj(gate::gate_new(a[0].as_i64())));
        put("rt_gate_enter", vec![Ptr], Void, |a| {
            gate::gate_enter(a[0].as_handle());
            Slot::Unit
        });
        put("rt_gate_try_enter_for", vec![Ptr, I64], I1, |a| {
            Slot::Bool(gate::gate_try_enter_for(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_gate_leave", vec![Ptr, I64], Void, |a| {
            gate::gate_leave(a[0].as_handle(), a[1].as_i64());
            Slot::Unit
        });
        put("rt_gate_count", vec![Ptr], I64, |a| Slot::Int(gate::gate_count(a[0].as_handle())));
        put("rt_barrier_new", vec![I64], Ptr, |a| {
            Slot::Obj(barrier::barrier_new(a[0].as_i64()))
        });
        put("rt_barrier_arrive", vec![Ptr], I64, |a| {
            Slot::Int(barrier::barrier_arrive(a[0].as_handle()))
        });
        put("rt_barrier_waiting", vec![Ptr], I64, |a| {
            Slot::Int(barrier::barrier_waiting(a[0].as_handle()))
        });
        put("rt_barrier_reset", vec![Ptr], Void, |a| {
            barrier::barrier_reset(a[0].as_handle());
            Slot::Unit
        });
        put("rt_rwlock_new", vec![], Ptr, |_| Slot::Obj(rwlock::rwlock_new()));
        put("rt_rwlock_read_enter", vec![Ptr], Void, |a| {
            rwlock::rwlock_read_enter(a[0].as_handle());
            Slot::Unit
        });
        put("rt_rwlock_read_exit", vec![Ptr], Void, |a| {
            rwlock::rwlock_read_exit(a[0].as_handle());
            Slot::Unit
        });
        put("rt_rwlock_write_enter", vec![Ptr], Void, |a| {
            rwlock::rwlock_write_enter(a[0].as_handle());
            Slot::Unit
        });
        put("rt_rwlock_write_exit", vec![Ptr], Void, |a| {
            rwlock::rwlock_write_exit(a[0].as_handle());
            Slot::Unit
        });
        put("rt_promise_new", vec![], Ptr, |_| Slot::Obj(future::promise_new()));
        put("rt_promise_get_future", vec![Ptr], Ptr, |a| {
            Slot::Obj(future::promise_get_future(a[0].as_handle()))
        });
        put("rt_promise_set", vec![Ptr, Ptr], Void, |a| {
            future::promise_set(a[0].as_handle(), a[1].as_handle());
            Slot::Unit
        });
        put("rt_promise_set_error", vec![Ptr, Str], Void, |a| {
            future::promise_set_error(a[0].as_handle(), a[1].as_handle());
            Slot::Unit
        });
        put("rt_future_get", vec![Ptr], Ptr, |a| {
            Slot::Obj(future::future_get(a[0].as_handle()))
        });
        put("rt_future_try_get", vec![Ptr], Ptr, |a| {
            Slot::Obj(future::future_try_get(a[0].as_handle()))
        });
        put("rt_future_get_for", vec![Ptr, I64], Ptr, |a| {
            Slot::Obj(future::future_get_for(a[0].as_handle(), a[1].as_i64()))
        });
        put("rt_future_done", vec![Ptr], I1, |a| {
            Slot::Bool(future::future_done(a[0].as_handle()))
        });

        // Trap error accessors.
        put("rt_err_kind", vec![Error], I64, |a| Slot::Int(trap::error_kind(a[0].as_handle())));
        put("rt_err_msg", vec![Error], Str, |a| Slot::Str(trap::error_message(a[0].as_handle())));
        put("rt_err_line", vec![Error], I64, |a| Slot::Int(trap::error_line(a[0].as_handle())));

        r
    }

    /// Register a user-supplied extern. Replaces any existing entry of
    /// the same name.
    pub fn register(&mut self, name: impl Into<String>, sig: Signature, f: ExternFn) {
        self.entries.insert(name.into(), (sig, f));
    }

    pub fn lookup(&self, name: &str) -> Option<&(Signature, ExternFn)> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }
}

fn rt_trap(args: &[Slot]) -> Slot {
    let msg = String::from_utf8_lossy(unsafe { string::str_bytes(args[0].as_handle()) }).into_owned();
    trap::raise(viper_runtime::TrapKind::DomainError, msg);
    Slot::Unit
}

fn rt_abort(args: &[Slot]) -> Slot {
    rt_trap(args)
}

fn rt_print_str(args: &[Slot]) -> Slot {
    let bytes = unsafe { string::str_bytes(args[0].as_handle()) };
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(bytes);
    let _ = out.flush();
    Slot::Unit
}

fn rt_print_i64(args: &[Slot]) -> Slot {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{}", args[0].as_i64());
    let _ = out.flush();
    Slot::Unit
}

fn rt_print_f64(args: &[Slot]) -> Slot {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{}", args[0].as_f64());
    let _ = out.flush();
    Slot::Unit
}

fn rt_input_line(_args: &[Slot]) -> Slot {
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Slot::Str(string::str_new(&line))
}

/// Zero-filled byte buffer, refcounted like every other heap object.
fn rt_alloc(args: &[Slot]) -> Slot {
    let size = args[0].as_i64();
    if size < 0 {
        trap::raise(
            viper_runtime::TrapKind::DomainError,
            format!("alloc: negative size {}", size),
        );
        return Slot::Obj(std::ptr::null_mut());
    }
    Slot::Obj(heap::alloc(
        heap::HeapKind::Array,
        heap::ElemKind::Byte,
        size as usize,
        size as usize,
        None,
    ))
}

/// Wrap the NUL-terminated prefix of a byte buffer as a string.
fn rt_const_cstr(args: &[Slot]) -> Slot {
    let p = args[0].as_handle();
    if p.is_null() {
        return Slot::Str(std::ptr::null_mut());
    }
    unsafe {
        let len = heap::header(p).len;
        let bytes = std::slice::from_raw_parts(p, len);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        Slot::Str(string::str_from_bytes(&bytes[..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::verify::known_extern_signature;
    use viper_runtime::heap::release;

    /// Every registered runtime helper must agree with the verifier's
    /// built-in signature table.
    #[test]
    fn registry_matches_verifier_table() {
        let r = ExternRegistry::with_runtime();
        let mut checked = 0;
        for name in r.names() {
            let (sig, _) = r.lookup(name).unwrap();
            let expected = known_extern_signature(name)
                .unwrap_or_else(|| panic!("registry entry {} missing from verifier table", name));
            assert_eq!(sig.params.as_slice(), expected.params, "{} params", name);
            assert_eq!(sig.ret, expected.ret, "{} return", name);
            checked += 1;
        }
        assert!(checked > 100, "expected the full runtime surface, saw {}", checked);
    }

    #[test]
    fn string_helpers_round_trip_through_slots() {
        let r = ExternRegistry::with_runtime();
        let (_, concat) = r.lookup("rt_concat").unwrap();
        let a = string::str_new("ab");
        let b = string::str_new("cd");
        let out = concat(&[Slot::Str(a), Slot::Str(b)]);
        match out {
            Slot::Str(s) => {
                assert_eq!(unsafe { string::str_bytes(s) }, b"abcd");
                release(s);
            }
            other => panic!("expected a string slot, got {:?}", other),
        }
        release(a);
        release(b);
    }

    #[test]
    fn user_externs_can_be_registered() {
        let mut r = ExternRegistry::with_runtime();
        fn times2(args: &[Slot]) -> Slot {
            Slot::Int(args[0].as_i64() * 2)
        }
        r.register(
            "user_times2",
            Signature::new(vec![Type::I64], Type::I64),
            times2,
        );
        let (sig, f) = r.lookup("user_times2").unwrap();
        assert_eq!(sig.ret, Type::I64);
        assert_eq!(f(&[Slot::Int(21)]), Slot::Int(42));
    }

    #[test]
    fn alloc_and_const_cstr() {
        let r = ExternRegistry::with_runtime();
        let (_, alloc) = r.lookup("rt_alloc").unwrap();
        let buf = match alloc(&[Slot::Int(8)]) {
            Slot::Obj(p) => p,
            other => panic!("expected an object slot, got {:?}", other),
        };
        unsafe {
            std::ptr::copy_nonoverlapping(b"hi\0rest".as_ptr(), buf, 7);
        }
        let (_, cstr) = r.lookup("rt_const_cstr").unwrap();
        match cstr(&[Slot::Obj(buf)]) {
            Slot::Str(s) => {
                assert_eq!(unsafe { string::str_bytes(s) }, b"hi");
                release(s);
            }
            other => panic!("expected a string slot, got {:?}", other),
        }
        release(buf);
    }
}
