//! Canonical textual form.
//!
//! One instruction per line; labels terminated with `:`; temps `%n`;
//! globals and externs `@name`; branch targets `^label`. Integers print in
//! decimal, floats in shortest round-trip form (always with a `.`, an
//! exponent, or one of `nan`/`inf` so the reader can tell them from
//! integers), booleans as `true`/`false`, the null handle as `null`.
//!
//! Grammar sketch:
//!
//! ```text
//! module      := (extern | global | func)*
//! extern      := "extern" "@" name "(" type,* ")" "->" type
//! global      := "global" "@" name ":" type "=" (string | value)
//! func        := "func" "@" name "(" (pname ":" type),* ")" "->" type "{" block+ "}"
//! block       := label ("(" ("%" id ":" type),* ")")? ":" instr*
//! instr       := ("%" id "=")? mnemonic args (".loc" file ":" line ":" col)?
//! ```
//!
//! Checked opcodes carry their width as a mnemonic suffix
//! (`iadd.ovf.i32`, `sdiv.chk0.i64`, `cast.fp_to_si.rte.chk.i16`), memory
//! ops their accessed type (`load.i64`, `store.f64`), comparisons their
//! predicate (`icmp.slt`, `fcmp.uno`). Non-void calls print their return
//! type after the argument list (`%3 = call @f(%0) -> i64`).
//!
//! `parse_module(print_module(m))` yields a module isomorphic to `m`; the
//! only normalization is that each function's temp high-water mark is
//! recomputed as the smallest cover of the ids in use.

mod parser;
mod printer;

pub use parser::{parse_module, ParseError};
pub use printer::{print_module, render_instr};

/// Shortest round-trip rendering of an `f64` that stays distinguishable
/// from an integer literal.
pub fn format_f64(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let s = format!("{}", v);
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Parse a float literal produced by [`format_f64`].
pub fn parse_f64(s: &str) -> Option<f64> {
    match s {
        "nan" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => s.parse().ok(),
    }
}
