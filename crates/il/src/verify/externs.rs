//! Built-in signature table for the `rt_*` runtime ABI.
//!
//! Every runtime helper callable from IL begins with `rt_`; integers cross
//! the boundary as native 64-bit, floats as f64, strings and heap objects
//! as opaque handles. The verifier rejects an extern declaration whose
//! name is in this table but whose signature disagrees with it.

use crate::types::Type;

/// Declared signature of a known runtime helper: parameter types and
/// return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternSig {
    pub params: &'static [Type],
    pub ret: Type,
}

const fn sig(params: &'static [Type], ret: Type) -> ExternSig {
    ExternSig { params, ret }
}

use Type::{Error, F64, I1, I64, Ptr, Str, Void};

/// Look up the expected signature of a known `rt_*` helper.
pub fn known_extern_signature(name: &str) -> Option<ExternSig> {
    Some(match name {
        // Core traps and console I/O.
        "rt_trap" => sig(&[Str], Void),
        "rt_abort" => sig(&[Str], Void),
        "rt_print_str" => sig(&[Str], Void),
        "rt_print_i64" => sig(&[I64], Void),
        "rt_print_f64" => sig(&[F64], Void),
        "rt_input_line" => sig(&[], Str),

        // Strings.
        "rt_len" => sig(&[Str], I64),
        "rt_concat" => sig(&[Str, Str], Str),
        "rt_substr" => sig(&[Str, I64, I64], Str),
        "rt_left" => sig(&[Str, I64], Str),
        "rt_right" => sig(&[Str, I64], Str),
        "rt_mid2" => sig(&[Str, I64], Str),
        "rt_mid3" => sig(&[Str, I64, I64], Str),
        "rt_instr2" => sig(&[Str, Str], I64),
        "rt_instr3" => sig(&[I64, Str, Str], I64),
        "rt_ltrim" => sig(&[Str], Str),
        "rt_rtrim" => sig(&[Str], Str),
        "rt_trim" => sig(&[Str], Str),
        "rt_ucase" => sig(&[Str], Str),
        "rt_lcase" => sig(&[Str], Str),
        "rt_flip" => sig(&[Str], Str),
        "rt_chr" => sig(&[I64], Str),
        "rt_asc" => sig(&[Str], I64),
        "rt_str_eq" => sig(&[Str, Str], I1),
        "rt_to_int" => sig(&[Str], I64),
        "rt_int_to_str" => sig(&[I64], Str),
        "rt_f64_to_str" => sig(&[F64], Str),
        "rt_val" => sig(&[Str], F64),
        "rt_str" => sig(&[F64], Str),
        "rt_str_retain" => sig(&[Str], Void),
        "rt_str_release" => sig(&[Str], Void),

        // Math.
        "rt_sqrt" => sig(&[F64], F64),
        "rt_floor" => sig(&[F64], F64),
        "rt_ceil" => sig(&[F64], F64),
        "rt_sin" => sig(&[F64], F64),
        "rt_cos" => sig(&[F64], F64),
        "rt_pow" => sig(&[F64, F64], F64),
        "rt_abs_i64" => sig(&[I64], I64),
        "rt_abs_f64" => sig(&[F64], F64),
        "rt_randomize_i64" => sig(&[I64], Void),
        "rt_rnd" => sig(&[], F64),
        "rt_guid_new" => sig(&[], Str),

        // 3x3 matrices as 9-element f64 array handles.
        "rt_mat3_identity" => sig(&[], Ptr),
        "rt_mat3_transpose" => sig(&[Ptr], Ptr),
        "rt_mat3_mul" => sig(&[Ptr, Ptr], Ptr),
        "rt_mat3_det" => sig(&[Ptr], F64),

        // Raw allocation.
        "rt_alloc" => sig(&[I64], Ptr),
        "rt_const_cstr" => sig(&[Ptr], Str),

        // Typed arrays. i32 elements widen to i64 at the ABI.
        "rt_arr_i32_new" => sig(&[I64], Ptr),
        "rt_arr_i32_len" => sig(&[Ptr], I64),
        "rt_arr_i32_get" => sig(&[Ptr, I64], I64),
        "rt_arr_i32_put" => sig(&[Ptr, I64, I64], Void),
        "rt_arr_i32_resize" => sig(&[Ptr, I64], Ptr),
        "rt_arr_i64_new" => sig(&[I64], Ptr),
        "rt_arr_i64_len" => sig(&[Ptr], I64),
        "rt_arr_i64_get" => sig(&[Ptr, I64], I64),
        "rt_arr_i64_put" => sig(&[Ptr, I64, I64], Void),
        "rt_arr_i64_resize" => sig(&[Ptr, I64], Ptr),
        "rt_arr_f64_new" => sig(&[I64], Ptr),
        "rt_arr_f64_len" => sig(&[Ptr], I64),
        "rt_arr_f64_get" => sig(&[Ptr, I64], F64),
        "rt_arr_f64_put" => sig(&[Ptr, I64, F64], Void),
        "rt_arr_f64_resize" => sig(&[Ptr, I64], Ptr),
        "rt_arr_str_new" => sig(&[I64], Ptr),
        "rt_arr_str_len" => sig(&[Ptr], I64),
        "rt_arr_str_get" => sig(&[Ptr, I64], Str),
        "rt_arr_str_put" => sig(&[Ptr, I64, Str], Void),
        "rt_arr_str_resize" => sig(&[Ptr, I64], Ptr),
        "rt_arr_obj_new" => sig(&[I64], Ptr),
        "rt_arr_obj_len" => sig(&[Ptr], I64),
        "rt_arr_obj_get" => sig(&[Ptr, I64], Ptr),
        "rt_arr_obj_put" => sig(&[Ptr, I64, Ptr], Void),
        "rt_arr_obj_resize" => sig(&[Ptr, I64], Ptr),
        "rt_arr_retain" => sig(&[Ptr], Void),
        "rt_arr_release" => sig(&[Ptr], Void),

        // Collections.
        "rt_list_new" => sig(&[], Ptr),
        "rt_list_len" => sig(&[Ptr], I64),
        "rt_list_push" => sig(&[Ptr, Ptr], Void),
        "rt_list_get" => sig(&[Ptr, I64], Ptr),
        "rt_list_set" => sig(&[Ptr, I64, Ptr], Void),
        "rt_list_remove" => sig(&[Ptr, I64], Void),
        "rt_list_clear" => sig(&[Ptr], Void),
        "rt_stack_new" => sig(&[], Ptr),
        "rt_stack_len" => sig(&[Ptr], I64),
        "rt_stack_push" => sig(&[Ptr, Ptr], Void),
        "rt_stack_pop" => sig(&[Ptr], Ptr),
        "rt_stack_top" => sig(&[Ptr], Ptr),
        "rt_queue_new" => sig(&[], Ptr),
        "rt_queue_len" => sig(&[Ptr], I64),
        "rt_queue_enqueue" => sig(&[Ptr, Ptr], Void),
        "rt_queue_dequeue" => sig(&[Ptr], Ptr),
        "rt_queue_front" => sig(&[Ptr], Ptr),
        "rt_map_new" => sig(&[], Ptr),
        "rt_map_len" => sig(&[Ptr], I64),
        "rt_map_put" => sig(&[Ptr, Str, Ptr], Void),
        "rt_map_get" => sig(&[Ptr, Str], Ptr),
        "rt_map_has" => sig(&[Ptr, Str], I1),
        "rt_map_remove" => sig(&[Ptr, Str], Void),
        "rt_set_new" => sig(&[], Ptr),
        "rt_set_len" => sig(&[Ptr], I64),
        "rt_set_add" => sig(&[Ptr, Str], I1),
        "rt_set_has" => sig(&[Ptr, Str], I1),
        "rt_set_remove" => sig(&[Ptr, Str], I1),
        "rt_grid2d_new" => sig(&[I64, I64], Ptr),
        "rt_grid2d_cols" => sig(&[Ptr], I64),
        "rt_grid2d_rows" => sig(&[Ptr], I64),
        "rt_grid2d_get" => sig(&[Ptr, I64, I64], Ptr),
        "rt_grid2d_set" => sig(&[Ptr, I64, I64, Ptr], Void),
        "rt_objpool_new" => sig(&[I64], Ptr),
        "rt_objpool_acquire" => sig(&[Ptr], I64),
        "rt_objpool_release" => sig(&[Ptr, I64], Void),
        "rt_objpool_in_use" => sig(&[Ptr], I64),
        "rt_statemachine_new" => sig(&[], Ptr),
        "rt_statemachine_add_state" => sig(&[Ptr, Str], Void),
        "rt_statemachine_add_transition" => sig(&[Ptr, Str, Str], Void),
        "rt_statemachine_set_initial" => sig(&[Ptr, Str], Void),
        "rt_statemachine_goto" => sig(&[Ptr, Str], I1),
        "rt_statemachine_current" => sig(&[Ptr], Str),
        "rt_timer_new" => sig(&[], Ptr),
        "rt_timer_start" => sig(&[Ptr], Void),
        "rt_timer_elapsed_ms" => sig(&[Ptr], I64),
        "rt_timer_reset" => sig(&[Ptr], Void),
        "rt_obj_retain" => sig(&[Ptr], Void),
        "rt_obj_release" => sig(&[Ptr], Void),

        // Concurrency primitives.
        "rt_gate_new" => sig(&[I64], Ptr),
        "rt_gate_enter" => sig(&[Ptr], Void),
        "rt_gate_try_enter_for" => sig(&[Ptr, I64], I1),
        "rt_gate_leave" => sig(&[Ptr, I64], Void),
        "rt_gate_count" => sig(&[Ptr], I64),
        "rt_barrier_new" => sig(&[I64], Ptr),
        "rt_barrier_arrive" => sig(&[Ptr], I64),
        "rt_barrier_waiting" => sig(&[Ptr], I64),
        "rt_barrier_reset" => sig(&[Ptr], Void),
        "rt_rwlock_new" => sig(&[], Ptr),
        "rt_rwlock_read_enter" => sig(&[Ptr], Void),
        "rt_rwlock_read_exit" => sig(&[Ptr], Void),
        "rt_rwlock_write_enter" => sig(&[Ptr], Void),
        "rt_rwlock_write_exit" => sig(&[Ptr], Void),
        "rt_promise_new" => sig(&[], Ptr),
        "rt_promise_get_future" => sig(&[Ptr], Ptr),
        "rt_promise_set" => sig(&[Ptr, Ptr], Void),
        "rt_promise_set_error" => sig(&[Ptr, Str], Void),
        "rt_future_get" => sig(&[Ptr], Ptr),
        "rt_future_try_get" => sig(&[Ptr], Ptr),
        "rt_future_get_for" => sig(&[Ptr, I64], Ptr),
        "rt_future_done" => sig(&[Ptr], I1),

        // Trap error accessors for handler blocks.
        "rt_err_kind" => sig(&[Error], I64),
        "rt_err_msg" => sig(&[Error], Str),
        "rt_err_line" => sig(&[Error], I64),

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_signatures() {
        let concat = known_extern_signature("rt_concat").unwrap();
        assert_eq!(concat.params, &[Type::Str, Type::Str]);
        assert_eq!(concat.ret, Type::Str);
        assert!(known_extern_signature("rt_nope").is_none());
        // Only rt_* names belong in the table.
        assert!(known_extern_signature("printf").is_none());
    }

    #[test]
    fn array_getters_widen_to_abi_types() {
        let get = known_extern_signature("rt_arr_i32_get").unwrap();
        assert_eq!(get.ret, Type::I64);
        let put = known_extern_signature("rt_arr_f64_put").unwrap();
        assert_eq!(put.params, &[Type::Ptr, Type::I64, Type::F64]);
    }
}
