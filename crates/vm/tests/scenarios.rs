//! End-to-end scenarios driving the whole pipeline: textual IL in,
//! verification, interpretation, runtime effects out.
//!
//! These tests share the process-global heap counters, so they run
//! serialized.

use serial_test::serial;
use viper_il::analysis::PostDomTree;
use viper_il::{parse_module, print_module, verify_module};
use viper_runtime::heap_stats;
use viper_runtime::TrapKind;
use viper_vm::vm::Outcome;
use viper_vm::{RunConfig, Slot, Vm, VmError};

fn load(src: &str) -> viper_il::Module {
    let m = parse_module(src).expect("scenario IL parses");
    verify_module(&m).unwrap_or_else(|e| panic!("scenario IL verifies: {:?}", e.notes));
    m
}

/// Arithmetic overflow caught by a handler, which resumes with a
/// sentinel. The program exits 0 and the descriptor names the add's
/// line.
#[test]
#[serial]
fn overflow_trap_with_handler_resumes() {
    let m = load(
        "\
extern @rt_err_kind(error) -> i64
extern @rt_err_line(error) -> i64

func @main() -> i64 {
entry:
  eh.push ^handler .loc 1:5:1
  %0 = iadd.ovf.i32 2147483647, 1 .loc 1:7:3
  eh.pop .loc 1:8:1
  ret 0 .loc 1:9:1
handler(%1: error, %2: resumetok):
  eh.entry .loc 1:10:1
  %3 = call @rt_err_kind(%1) -> i64 .loc 1:11:3
  %4 = call @rt_err_line(%1) -> i64 .loc 1:12:3
  resume.label %2, ^cont .loc 1:13:3
cont:
  ret 0 .loc 1:14:1
}
",
    );
    let mut vm = Vm::new(&m);
    let exit = vm.run().expect("handled trap continues");
    assert_eq!(exit, 0);
    let desc = vm.last_trap().expect("descriptor is queryable");
    assert_eq!(desc.kind, TrapKind::Overflow);
    assert_eq!(desc.loc.line, 7);
}

/// Refcount discipline across a string-array resize, observed through
/// the handle refcount and the heap's live-object counter.
#[test]
#[serial]
fn refcount_discipline_across_array_resize() {
    use viper_runtime::array::*;
    use viper_runtime::heap::{refcount, release};
    use viper_runtime::string::str_new;

    let live_before = heap_stats::live_objects();

    let arr = arr_str_new(2);
    let a = str_new("a");
    arr_str_put(arr, 0, a);
    assert_eq!(refcount(a), 2);

    let arr = arr_str_resize(arr, 4);
    assert_eq!(arr_str_len(arr), 4);
    assert_eq!(refcount(a), 2);
    assert!(arr_str_get(arr, 2).is_null());
    // arr_str_get returned a retained borrow of slot 0; drop it again.
    let got = arr_str_get(arr, 0);
    assert_eq!(refcount(a), 3);
    release(got);

    release(arr);
    assert_eq!(refcount(a), 1);
    release(a);

    assert_eq!(heap_stats::live_objects(), live_before);
}

/// Diamond CFG with block parameters: the merge block observes the
/// selected predecessor's argument, and the post-dominator tree has the
/// expected shape.
#[test]
#[serial]
fn block_parameter_diamond() {
    let m = load(
        "\
func @select(flag: i1) -> i64 {
entry:
  cbr %0, ^left, ^right .loc 1:2:1
left:
  br ^merge(1) .loc 1:3:1
right:
  br ^merge(2) .loc 1:4:1
merge(%1: i64):
  ret %1 .loc 1:5:1
}

func @main() -> i64 {
entry:
  %0 = call @select(true) -> i64 .loc 1:8:1
  ret %0 .loc 1:9:1
}
",
    );
    let mut vm = Vm::new(&m);
    let Outcome::Return(v) = vm.call("select", &[Slot::Bool(true)]).unwrap() else {
        panic!("select must not trap");
    };
    assert_eq!(v.as_i64(), 1);
    let Outcome::Return(v) = vm.call("select", &[Slot::Bool(false)]).unwrap() else {
        panic!("select must not trap");
    };
    assert_eq!(v.as_i64(), 2);

    let f = m.function("select").unwrap();
    let pdt = PostDomTree::compute(f);
    let entry = f.block_index("entry").unwrap();
    let left = f.block_index("left").unwrap();
    let right = f.block_index("right").unwrap();
    let merge = f.block_index("merge").unwrap();
    assert!(pdt.post_dominates(merge, entry));
    assert!(!pdt.post_dominates(left, right));
    assert!(!pdt.post_dominates(right, left));
}

/// An unhandled divide-by-zero produces the diagnostic format with the
/// faulting line and a non-zero exit.
#[test]
#[serial]
fn divide_by_zero_diagnostic() {
    let m = load(
        "\
func @main() -> i64 {
entry:
  %0 = sdiv.chk0.i64 10, 0 .loc 1:100:1
  ret %0 .loc 1:101:1
}
",
    );
    let mut vm = Vm::new(&m);
    match vm.run() {
        Err(VmError::Trap(desc)) => {
            assert_eq!(desc.kind, TrapKind::DivideByZero);
            let msg = desc.to_string();
            assert!(msg.contains("Trap: DivideByZero"), "{}", msg);
            assert!(msg.contains("line 100"), "{}", msg);
        }
        other => panic!("expected an uncaught trap, got {:?}", other.map(|_| ())),
    }
}

/// Promise resolution through the extern surface; the cross-thread
/// happens-before variant lives with the runtime primitive's own tests.
#[test]
#[serial]
fn promise_resolves_through_externs() {
    let m = load(
        "\
extern @rt_list_new() -> ptr
extern @rt_list_push(ptr, ptr) -> void
extern @rt_list_len(ptr) -> i64
extern @rt_promise_new() -> ptr
extern @rt_promise_get_future(ptr) -> ptr
extern @rt_promise_set(ptr, ptr) -> void
extern @rt_future_get(ptr) -> ptr

func @main() -> i64 {
entry:
  %0 = call @rt_promise_new() -> ptr .loc 1:3:1
  %1 = call @rt_promise_get_future(%0) -> ptr .loc 1:4:1
  %2 = call @rt_list_new() -> ptr .loc 1:5:1
  call @rt_list_push(%2, null) .loc 1:6:1
  call @rt_promise_set(%0, %2) .loc 1:7:1
  %3 = call @rt_future_get(%1) -> ptr .loc 1:8:1
  %4 = call @rt_list_len(%3) -> i64 .loc 1:9:1
  ret %4 .loc 1:10:1
}
",
    );
    assert_eq!(viper_vm::run_module(&m, RunConfig::default()).unwrap(), 1);
}

/// UTF-8 reverse preserves codepoints: "café" flips to "éfac", byte and
/// codepoint counts unchanged, and flipping twice restores the input.
#[test]
#[serial]
fn utf8_flip_preserves_codepoints() {
    let m = load(
        "\
extern @rt_flip(str) -> str
extern @rt_str_eq(str, str) -> i1
extern @rt_len(str) -> i64

global @word: str = \"caf\u{00e9}\"
global @flipped: str = \"\u{00e9}fac\"

func @main() -> i64 {
entry:
  %0 = call @rt_flip(@word) -> str .loc 1:8:1
  %1 = call @rt_str_eq(%0, @flipped) -> i1 .loc 1:9:1
  cbr %1, ^once_ok, ^bad .loc 1:10:1
once_ok:
  %2 = call @rt_flip(%0) -> str .loc 1:12:1
  %3 = call @rt_str_eq(%2, @word) -> i1 .loc 1:13:1
  cbr %3, ^twice_ok, ^bad .loc 1:14:1
twice_ok:
  %4 = call @rt_len(%0) -> i64 .loc 1:16:1
  ret %4 .loc 1:17:1
bad:
  ret -1 .loc 1:19:1
}
",
    );
    // "café" is five bytes; the flipped string keeps the byte length.
    assert_eq!(viper_vm::run_module(&m, RunConfig::default()).unwrap(), 5);
}

/// The canonical textual form round-trips through a file on disk.
#[test]
#[serial]
fn textual_form_round_trips_through_a_file() {
    let src = "\
extern @rt_print_i64(i64) -> void

func @main() -> i64 {
entry:
  %0 = const.i64 41 .loc 1:2:3
  %1 = iadd.ovf.i64 %0, 1 .loc 1:3:3
  call @rt_print_i64(%1) .loc 1:4:3
  ret %1 .loc 1:5:3
}
";
    let m = load(src);
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("module.vil");
    std::fs::write(&path, print_module(&m)).expect("write module");
    let reread = std::fs::read_to_string(&path).expect("read module");
    let m2 = parse_module(&reread).expect("reparse");
    assert_eq!(m2, m);
    assert_eq!(print_module(&m2), print_module(&m));
}

/// Transposing a matrix twice through the extern surface restores it:
/// the off-diagonal element moves on the first transpose and moves back
/// on the second.
#[test]
#[serial]
fn mat3_transpose_involution_through_externs() {
    let m = load(
        "\
extern @rt_arr_f64_new(i64) -> ptr
extern @rt_arr_f64_put(ptr, i64, f64) -> void
extern @rt_arr_f64_get(ptr, i64) -> f64
extern @rt_mat3_transpose(ptr) -> ptr
extern @rt_mat3_det(ptr) -> f64

func @main() -> i64 {
entry:
  %0 = call @rt_arr_f64_new(9) -> ptr .loc 1:8:1
  call @rt_arr_f64_put(%0, 1, 2.5) .loc 1:9:1
  %1 = call @rt_mat3_transpose(%0) -> ptr .loc 1:10:1
  %2 = call @rt_arr_f64_get(%1, 3) -> f64 .loc 1:11:1
  %3 = fcmp.eq %2, 2.5 .loc 1:12:1
  cbr %3, ^moved, ^bad .loc 1:13:1
moved:
  %4 = call @rt_mat3_transpose(%1) -> ptr .loc 1:15:1
  %5 = call @rt_arr_f64_get(%4, 1) -> f64 .loc 1:16:1
  %6 = fcmp.eq %5, 2.5 .loc 1:17:1
  cbr %6, ^restored, ^bad .loc 1:18:1
restored:
  %7 = call @rt_arr_f64_get(%4, 3) -> f64 .loc 1:20:1
  %8 = fcmp.eq %7, 0.0 .loc 1:21:1
  cbr %8, ^ok, ^bad .loc 1:22:1
ok:
  %9 = call @rt_mat3_det(%4) -> f64 .loc 1:24:1
  %10 = fcmp.eq %9, 0.0 .loc 1:25:1
  cbr %10, ^done, ^bad .loc 1:26:1
done:
  ret 0 .loc 1:28:1
bad:
  ret 1 .loc 1:30:1
}
",
    );
    assert_eq!(viper_vm::run_module(&m, RunConfig::default()).unwrap(), 0);
}

/// Resume tokens are single-use: consuming one twice traps DomainError.
#[test]
#[serial]
fn resume_token_is_consumed_once() {
    let m = load(
        "\
func @main() -> i64 {
entry:
  eh.push ^handler .loc 1:2:1
  %0 = sdiv.chk0.i64 1, 0 .loc 1:3:1
  eh.pop .loc 1:4:1
  ret 0 .loc 1:5:1
handler(%1: error, %2: resumetok):
  eh.entry .loc 1:6:1
  resume.label %2, ^again .loc 1:7:1
again:
  resume.label %2, ^done .loc 1:9:1
done:
  ret 0 .loc 1:11:1
}
",
    );
    let mut vm = Vm::new(&m);
    match vm.call("main", &[]).unwrap() {
        Outcome::Trap(desc) => {
            assert_eq!(desc.kind, TrapKind::DomainError);
            assert!(desc.message.contains("already consumed"), "{}", desc.message);
        }
        Outcome::Return(v) => panic!("token reuse must trap, returned {:?}", v),
    }
}
