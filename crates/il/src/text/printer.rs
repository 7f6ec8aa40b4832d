//! Module printer for the canonical textual form.

use super::format_f64;
use crate::instr::{Instr, Opcode};
use crate::module::{Block, Function, Global, GlobalInit, Module};
use crate::types::Type;
use crate::value::Value;
use std::fmt::Write;

/// Render a module in the canonical textual form.
pub fn print_module(m: &Module) -> String {
    let mut out = String::new();

    for e in &m.externs {
        let params: Vec<String> = e.params.iter().map(|t| t.to_string()).collect();
        let _ = writeln!(
            out,
            "extern @{}({}) -> {}",
            e.name,
            params.join(", "),
            e.ret_type
        );
    }
    if !m.externs.is_empty() {
        out.push('\n');
    }

    for g in &m.globals {
        print_global(&mut out, g);
    }
    if !m.globals.is_empty() {
        out.push('\n');
    }

    for (i, f) in m.functions.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        print_function(&mut out, f);
    }

    out
}

fn print_global(out: &mut String, g: &Global) {
    match &g.init {
        GlobalInit::Str(s) => {
            let _ = writeln!(out, "global @{}: {} = \"{}\"", g.name, g.ty, escape(s));
        }
        GlobalInit::Value(v) => {
            let _ = writeln!(out, "global @{}: {} = {}", g.name, g.ty, render_value(v));
        }
    }
}

fn print_function(out: &mut String, f: &Function) {
    let params: Vec<String> = f
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, p.ty))
        .collect();
    let _ = writeln!(
        out,
        "func @{}({}) -> {} {{",
        f.name,
        params.join(", "),
        f.ret_type
    );
    for b in &f.blocks {
        print_block(out, f, b);
    }
    out.push_str("}\n");
}

fn print_block(out: &mut String, f: &Function, b: &Block) {
    if b.params.is_empty() {
        let _ = writeln!(out, "{}:", b.label);
    } else {
        let params: Vec<String> = b
            .params
            .iter()
            .map(|p| format!("%{}: {}", p.id, p.ty))
            .collect();
        let _ = writeln!(out, "{}({}):", b.label, params.join(", "));
    }
    for i in &b.instructions {
        let _ = writeln!(out, "  {}", render_instr(f, i));
    }
}

/// Render one instruction (without indentation or newline). The owning
/// function supplies block-parameter counts so `cbr` argument groups can
/// be split back apart.
pub fn render_instr(f: &Function, i: &Instr) -> String {
    let mut s = String::new();
    if let Some(r) = i.result {
        let _ = write!(s, "%{} = ", r);
    }
    let _ = write!(s, "{}", mnemonic_with_suffix(i));

    match i.op {
        Opcode::Br => {
            let _ = write!(s, " {}", render_target(&i.labels[0], &i.operands));
        }
        Opcode::CBr => {
            let (t_args, f_args) = split_cbr_args(f, i);
            let _ = write!(
                s,
                " {}, {}, {}",
                render_value(&i.operands[0]),
                render_target(&i.labels[0], t_args),
                render_target(&i.labels[1], f_args)
            );
        }
        Opcode::EhPush => {
            let _ = write!(s, " ^{}", i.labels[0]);
        }
        Opcode::ResumeLabel => {
            let _ = write!(s, " {}, ^{}", render_value(&i.operands[0]), i.labels[0]);
        }
        Opcode::Call => {
            let args: Vec<String> = i.operands.iter().map(render_value).collect();
            let _ = write!(
                s,
                " @{}({})",
                i.callee.as_deref().unwrap_or(""),
                args.join(", ")
            );
            if i.ty != Type::Void {
                let _ = write!(s, " -> {}", i.ty);
            }
        }
        _ => {
            for (n, v) in i.operands.iter().enumerate() {
                if n == 0 {
                    let _ = write!(s, " {}", render_value(v));
                } else {
                    let _ = write!(s, ", {}", render_value(v));
                }
            }
        }
    }

    if i.loc.is_known() {
        let _ = write!(s, " .loc {}:{}:{}", i.loc.file_id, i.loc.line, i.loc.column);
    }
    s
}

/// `cbr` stores `[cond, true_args.., false_args..]`; the split point is
/// the true target's block-parameter count.
fn split_cbr_args<'a>(f: &Function, i: &'a Instr) -> (&'a [Value], &'a [Value]) {
    let rest = &i.operands[1..];
    let t = f
        .block(&i.labels[0])
        .map(|b| b.params.len())
        .unwrap_or(rest.len())
        .min(rest.len());
    (&rest[..t], &rest[t..])
}

fn render_target(label: &str, args: &[Value]) -> String {
    if args.is_empty() {
        format!("^{}", label)
    } else {
        let rendered: Vec<String> = args.iter().map(render_value).collect();
        format!("^{}({})", label, rendered.join(", "))
    }
}

fn mnemonic_with_suffix(i: &Instr) -> String {
    match i.op {
        Opcode::IAddOvf
        | Opcode::ISubOvf
        | Opcode::IMulOvf
        | Opcode::SDivChk0
        | Opcode::SRemChk0
        | Opcode::UDivChk0
        | Opcode::URemChk0
        | Opcode::CastFpToSiRteChk
        | Opcode::CastFpToUiRteChk
        | Opcode::Load
        | Opcode::Store => format!("{}.{}", i.op.mnemonic(), i.ty),
        _ => i.op.mnemonic(),
    }
}

fn render_value(v: &Value) -> String {
    match v {
        Value::ConstInt(n) => n.to_string(),
        Value::ConstFloat(x) => format_f64(*x),
        Value::ConstBool(b) => b.to_string(),
        Value::Temp(id) => format!("%{}", id),
        Value::GlobalRef(name) => format!("@{}", name),
        Value::Null => "null".to_string(),
    }
}

/// Escape a global string initializer.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
