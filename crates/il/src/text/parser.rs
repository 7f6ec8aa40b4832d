//! Parser for the canonical textual form.
//!
//! Line-oriented: every instruction sits on its own line, block headers end
//! with `:`, and a function body closes with `}`. Errors carry the
//! 1-indexed source line.

use super::parse_f64;
use crate::instr::{FloatPredicate, Instr, IntPredicate, Opcode, SourceLoc};
use crate::module::{Block, Extern, Function, FunctionParam, Global, GlobalInit, Module, Param};
use crate::types::Type;
use crate::value::{TempId, Value};
use std::fmt;

/// Parse failure with the offending source line.
#[derive(Debug)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse the canonical textual form back into a module.
pub fn parse_module(src: &str) -> Result<Module, ParseError> {
    let mut module = Module::new();
    let lines: Vec<(usize, &str)> = src
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with("//"))
        .collect();

    let mut pos = 0;
    while pos < lines.len() {
        let (lineno, line) = lines[pos];
        if let Some(rest) = line.strip_prefix("extern ") {
            module.externs.push(parse_extern(lineno, rest)?);
            pos += 1;
        } else if let Some(rest) = line.strip_prefix("global ") {
            module.globals.push(parse_global(lineno, rest)?);
            pos += 1;
        } else if let Some(rest) = line.strip_prefix("func ") {
            let f = parse_function(lineno, rest, &lines, &mut pos)?;
            module.functions.push(f);
        } else {
            return Err(ParseError::new(
                lineno,
                format!("expected extern, global, or func, got '{}'", line),
            ));
        }
    }

    Ok(module)
}

/// `@name(i64, str) -> void`
fn parse_extern(lineno: usize, rest: &str) -> Result<Extern, ParseError> {
    let mut t = Toks::new(lineno, rest)?;
    let name = t.expect_at_name()?;
    t.expect("(")?;
    let mut params = Vec::new();
    if !t.peek_is(")") {
        loop {
            params.push(t.expect_type()?);
            if !t.eat(",") {
                break;
            }
        }
    }
    t.expect(")")?;
    t.expect("->")?;
    let ret = t.expect_type()?;
    t.expect_end()?;
    Ok(Extern::new(name, ret, params))
}

/// `@name: str = "text"` or `@name: i64 = 42`
fn parse_global(lineno: usize, rest: &str) -> Result<Global, ParseError> {
    let mut t = Toks::new(lineno, rest)?;
    let name = t.expect_at_name()?;
    t.expect(":")?;
    let ty = t.expect_type()?;
    t.expect("=")?;
    let init = match t.next() {
        Some(tok) if tok.starts_with('"') => GlobalInit::Str(unescape(lineno, &tok)?),
        Some(tok) => GlobalInit::Value(value_from_token(lineno, &tok)?),
        None => return Err(ParseError::new(lineno, "missing global initializer")),
    };
    t.expect_end()?;
    Ok(Global { name, ty, init })
}

/// Parse a function starting at `lines[*pos]` (the `func` header line);
/// advances `*pos` past the closing `}`.
fn parse_function(
    header_line: usize,
    header: &str,
    lines: &[(usize, &str)],
    pos: &mut usize,
) -> Result<Function, ParseError> {
    // Header: `@name(a: i64, b: str) -> i64 {`
    let mut t = Toks::new(header_line, header)?;
    let name = t.expect_at_name()?;
    t.expect("(")?;
    let mut params = Vec::new();
    if !t.peek_is(")") {
        loop {
            let pname = t.next().ok_or_else(|| {
                ParseError::new(header_line, "expected parameter name")
            })?;
            t.expect(":")?;
            let pty = t.expect_type()?;
            params.push((pname, pty));
            if !t.eat(",") {
                break;
            }
        }
    }
    t.expect(")")?;
    t.expect("->")?;
    let ret = t.expect_type()?;
    t.expect("{")?;
    t.expect_end()?;

    let mut f = Function::new(name, ret);
    for (i, (pname, pty)) in params.into_iter().enumerate() {
        f.params.push(FunctionParam {
            name: pname,
            ty: pty,
            id: i as TempId,
        });
    }

    *pos += 1;
    let mut max_temp: Option<TempId> = f.params.iter().map(|p| p.id).max();

    loop {
        let Some(&(lineno, line)) = lines.get(*pos) else {
            return Err(ParseError::new(header_line, "unterminated function body"));
        };
        *pos += 1;

        if line == "}" {
            break;
        }

        if line.ends_with(':') {
            f.blocks.push(parse_block_header(lineno, line, &mut max_temp)?);
            continue;
        }

        let Some(block) = f.blocks.last_mut() else {
            return Err(ParseError::new(lineno, "instruction outside any block"));
        };
        let instr = parse_instr(lineno, line)?;
        if let Some(r) = instr.result {
            max_temp = Some(max_temp.map_or(r, |m| m.max(r)));
        }
        if instr.is_terminator() {
            block.terminated = true;
        }
        block.instructions.push(instr);
    }

    f.next_temp = max_temp.map_or(0, |m| m + 1);
    Ok(f)
}

/// `label:` or `label(%3: i64, %4: str):`
fn parse_block_header(
    lineno: usize,
    line: &str,
    max_temp: &mut Option<TempId>,
) -> Result<Block, ParseError> {
    let mut t = Toks::new(lineno, line)?;
    let label = t
        .next()
        .ok_or_else(|| ParseError::new(lineno, "expected block label"))?;
    let mut block = Block::new(label);
    if t.eat("(") {
        loop {
            let id = t.expect_temp()?;
            t.expect(":")?;
            let ty = t.expect_type()?;
            block.params.push(Param { id, ty });
            *max_temp = Some(max_temp.map_or(id, |m| m.max(id)));
            if !t.eat(",") {
                break;
            }
        }
        t.expect(")")?;
    }
    t.expect(":")?;
    t.expect_end()?;
    Ok(block)
}

/// One instruction line.
fn parse_instr(lineno: usize, line: &str) -> Result<Instr, ParseError> {
    let mut t = Toks::new(lineno, line)?;

    // Optional `%n =` result.
    let mut result = None;
    if let Some(tok) = t.peek() {
        if tok.starts_with('%') && t.toks.get(t.pos + 1).map(|s| s.as_str()) == Some("=") {
            result = Some(t.expect_temp()?);
            t.expect("=")?;
        }
    }

    let mn = t
        .next()
        .ok_or_else(|| ParseError::new(lineno, "expected opcode"))?;
    let (op, ty) = opcode_from_token(lineno, &mn)?;

    let mut instr = Instr::new(op, ty);
    instr.result = result;

    match op {
        Opcode::Br => {
            let (label, args) = parse_target(&mut t)?;
            instr.labels.push(label);
            instr.operands = args;
        }
        Opcode::CBr => {
            instr.operands.push(t.expect_value()?);
            t.expect(",")?;
            let (tl, mut ta) = parse_target(&mut t)?;
            t.expect(",")?;
            let (fl, mut fa) = parse_target(&mut t)?;
            instr.labels.push(tl);
            instr.labels.push(fl);
            instr.operands.append(&mut ta);
            instr.operands.append(&mut fa);
        }
        Opcode::EhPush => {
            instr.labels.push(t.expect_caret_label()?);
        }
        Opcode::ResumeLabel => {
            instr.operands.push(t.expect_value()?);
            t.expect(",")?;
            instr.labels.push(t.expect_caret_label()?);
        }
        Opcode::Call => {
            instr.callee = Some(t.expect_at_name()?);
            t.expect("(")?;
            if !t.peek_is(")") {
                loop {
                    instr.operands.push(t.expect_value()?);
                    if !t.eat(",") {
                        break;
                    }
                }
            }
            t.expect(")")?;
            if t.eat("->") {
                instr.ty = t.expect_type()?;
            }
        }
        _ => {
            // Comma-separated operand list until `.loc` or end of line.
            while let Some(tok) = t.peek() {
                if tok == ".loc" {
                    break;
                }
                instr.operands.push(t.expect_value()?);
                if !t.eat(",") {
                    break;
                }
            }
        }
    }

    if t.eat(".loc") {
        let file = t.expect_usize()?;
        t.expect(":")?;
        let line_no = t.expect_usize()?;
        t.expect(":")?;
        let col = t.expect_usize()?;
        instr.loc = SourceLoc::new(file, line_no, col);
    }
    t.expect_end()?;

    Ok(instr)
}

/// `^label` or `^label(v, v, ...)`
fn parse_target(t: &mut Toks) -> Result<(String, Vec<Value>), ParseError> {
    let label = t.expect_caret_label()?;
    let mut args = Vec::new();
    if t.eat("(") {
        if !t.peek_is(")") {
            loop {
                args.push(t.expect_value()?);
                if !t.eat(",") {
                    break;
                }
            }
        }
        t.expect(")")?;
    }
    Ok((label, args))
}

/// Token cursor over a single line.
struct Toks {
    line: usize,
    toks: Vec<String>,
    pos: usize,
}

impl Toks {
    fn new(line: usize, src: &str) -> Result<Toks, ParseError> {
        Ok(Toks {
            line,
            toks: tokenize(line, src)?,
            pos: 0,
        })
    }

    fn next(&mut self) -> Option<String> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn peek(&self) -> Option<&str> {
        self.toks.get(self.pos).map(|s| s.as_str())
    }

    fn peek_is(&self, tok: &str) -> bool {
        self.peek() == Some(tok)
    }

    fn eat(&mut self, tok: &str) -> bool {
        if self.peek_is(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &str) -> Result<(), ParseError> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            Some(t) => Err(ParseError::new(
                self.line,
                format!("expected '{}', got '{}'", tok, t),
            )),
            None => Err(ParseError::new(self.line, format!("expected '{}'", tok))),
        }
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.next() {
            None => Ok(()),
            Some(t) => Err(ParseError::new(
                self.line,
                format!("trailing token '{}'", t),
            )),
        }
    }

    fn expect_type(&mut self) -> Result<Type, ParseError> {
        match self.next() {
            Some(t) => Type::from_name(&t)
                .ok_or_else(|| ParseError::new(self.line, format!("unknown type '{}'", t))),
            None => Err(ParseError::new(self.line, "expected type")),
        }
    }

    /// `@name`
    fn expect_at_name(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(t) if t.starts_with('@') && t.len() > 1 => Ok(t[1..].to_string()),
            Some(t) => Err(ParseError::new(
                self.line,
                format!("expected @name, got '{}'", t),
            )),
            None => Err(ParseError::new(self.line, "expected @name")),
        }
    }

    /// `^label`
    fn expect_caret_label(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(t) if t.starts_with('^') && t.len() > 1 => Ok(t[1..].to_string()),
            Some(t) => Err(ParseError::new(
                self.line,
                format!("expected ^label, got '{}'", t),
            )),
            None => Err(ParseError::new(self.line, "expected ^label")),
        }
    }

    /// `%id`
    fn expect_temp(&mut self) -> Result<TempId, ParseError> {
        match self.next() {
            Some(t) if t.starts_with('%') => t[1..]
                .parse()
                .map_err(|_| ParseError::new(self.line, format!("bad temp '{}'", t))),
            Some(t) => Err(ParseError::new(
                self.line,
                format!("expected %temp, got '{}'", t),
            )),
            None => Err(ParseError::new(self.line, "expected %temp")),
        }
    }

    fn expect_value(&mut self) -> Result<Value, ParseError> {
        match self.next() {
            Some(t) => value_from_token(self.line, &t),
            None => Err(ParseError::new(self.line, "expected value")),
        }
    }

    fn expect_usize(&mut self) -> Result<u32, ParseError> {
        match self.next() {
            Some(t) => t
                .parse()
                .map_err(|_| ParseError::new(self.line, format!("expected number, got '{}'", t))),
            None => Err(ParseError::new(self.line, "expected number")),
        }
    }
}

fn value_from_token(line: usize, tok: &str) -> Result<Value, ParseError> {
    if let Some(rest) = tok.strip_prefix('%') {
        return rest
            .parse()
            .map(Value::Temp)
            .map_err(|_| ParseError::new(line, format!("bad temp '{}'", tok)));
    }
    if let Some(rest) = tok.strip_prefix('@') {
        return Ok(Value::GlobalRef(rest.to_string()));
    }
    match tok {
        "true" => return Ok(Value::ConstBool(true)),
        "false" => return Ok(Value::ConstBool(false)),
        "null" => return Ok(Value::Null),
        "nan" | "inf" | "-inf" => return Ok(Value::ConstFloat(parse_f64(tok).unwrap())),
        _ => {}
    }
    if tok.contains('.') || tok.contains('e') || tok.contains('E') {
        return parse_f64(tok)
            .map(Value::ConstFloat)
            .ok_or_else(|| ParseError::new(line, format!("bad float literal '{}'", tok)));
    }
    tok.parse()
        .map(Value::ConstInt)
        .map_err(|_| ParseError::new(line, format!("bad literal '{}'", tok)))
}

/// Split a line into tokens. Symbols `( ) , : =` separate; `->` survives
/// as one token; string literals keep their quotes for the caller.
fn tokenize(lineno: usize, src: &str) -> Result<Vec<String>, ParseError> {
    let mut toks = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '"' {
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if chars[i] == '"' {
                    break;
                }
                i += 1;
            }
            if i >= chars.len() {
                return Err(ParseError::new(lineno, "unclosed string literal"));
            }
            i += 1;
            toks.push(chars[start..i].iter().collect());
        } else if c == '-' && i + 1 < chars.len() && chars[i + 1] == '>' {
            toks.push("->".to_string());
            i += 2;
        } else if matches!(c, '(' | ')' | ',' | ':' | '=' | '{' | '}') {
            toks.push(c.to_string());
            i += 1;
        } else {
            let start = i;
            while i < chars.len()
                && !chars[i].is_whitespace()
                && !matches!(chars[i], '(' | ')' | ',' | ':' | '=' | '{' | '}')
            {
                // Keep `-inf` and negative numbers glued, but stop before
                // an arrow.
                if chars[i] == '-' && i + 1 < chars.len() && chars[i + 1] == '>' {
                    break;
                }
                i += 1;
            }
            toks.push(chars[start..i].iter().collect());
        }
    }
    Ok(toks)
}

fn unescape(line: usize, quoted: &str) -> Result<String, ParseError> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let chars: Vec<char> = inner.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        match chars.get(i) {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('x') => {
                let hi = chars.get(i + 1).and_then(|c| c.to_digit(16));
                let lo = chars.get(i + 2).and_then(|c| c.to_digit(16));
                match (hi, lo) {
                    (Some(h), Some(l)) => {
                        out.push(char::from_u32(h * 16 + l).unwrap_or('\u{fffd}'));
                        i += 2;
                    }
                    _ => return Err(ParseError::new(line, "bad \\x escape")),
                }
            }
            _ => return Err(ParseError::new(line, "bad escape sequence")),
        }
        i += 1;
    }
    Ok(out)
}

/// Decode a mnemonic token into an opcode and the instruction type it
/// implies (`Void` when the type comes from elsewhere, e.g. calls).
fn opcode_from_token(line: usize, tok: &str) -> Result<(Opcode, Type), ParseError> {
    // Fixed mnemonics first.
    let fixed = match tok {
        "add" => Some((Opcode::Add, Type::I64)),
        "sub" => Some((Opcode::Sub, Type::I64)),
        "mul" => Some((Opcode::Mul, Type::I64)),
        "and" => Some((Opcode::And, Type::I64)),
        "or" => Some((Opcode::Or, Type::I64)),
        "xor" => Some((Opcode::Xor, Type::I64)),
        "not" => Some((Opcode::Not, Type::I64)),
        "shl" => Some((Opcode::Shl, Type::I64)),
        "ashr" => Some((Opcode::AShr, Type::I64)),
        "lshr" => Some((Opcode::LShr, Type::I64)),
        "fadd" => Some((Opcode::FAdd, Type::F64)),
        "fsub" => Some((Opcode::FSub, Type::F64)),
        "fmul" => Some((Opcode::FMul, Type::F64)),
        "fdiv" => Some((Opcode::FDiv, Type::F64)),
        "cast.si_to_fp" => Some((Opcode::CastSiToFp, Type::F64)),
        "cast.ui_to_fp" => Some((Opcode::CastUiToFp, Type::F64)),
        "idx.chk" => Some((Opcode::IdxChk, Type::I64)),
        "const.i1" => Some((Opcode::ConstI1, Type::I1)),
        "const.i16" => Some((Opcode::ConstI16, Type::I16)),
        "const.i32" => Some((Opcode::ConstI32, Type::I32)),
        "const.i64" => Some((Opcode::ConstI64, Type::I64)),
        "const.f64" => Some((Opcode::ConstF64, Type::F64)),
        "alloca" => Some((Opcode::Alloca, Type::Ptr)),
        "br" => Some((Opcode::Br, Type::Void)),
        "cbr" => Some((Opcode::CBr, Type::Void)),
        "ret" => Some((Opcode::Ret, Type::Void)),
        "trap" => Some((Opcode::Trap, Type::Void)),
        "eh.push" => Some((Opcode::EhPush, Type::Void)),
        "eh.pop" => Some((Opcode::EhPop, Type::Void)),
        "eh.entry" => Some((Opcode::EhEntry, Type::Void)),
        "resume.label" => Some((Opcode::ResumeLabel, Type::Void)),
        "call" => Some((Opcode::Call, Type::Void)),
        _ => None,
    };
    if let Some(hit) = fixed {
        return Ok(hit);
    }

    // Predicate-suffixed comparisons.
    if let Some(p) = tok.strip_prefix("icmp.") {
        if let Some(pred) = IntPredicate::from_name(p) {
            return Ok((Opcode::ICmp(pred), Type::I1));
        }
    }
    if let Some(p) = tok.strip_prefix("fcmp.") {
        if let Some(pred) = FloatPredicate::from_name(p) {
            return Ok((Opcode::FCmp(pred), Type::I1));
        }
    }

    // Width-suffixed checked arithmetic, casts, and memory ops.
    let suffixed: &[(&str, fn() -> Opcode)] = &[
        ("iadd.ovf.", || Opcode::IAddOvf),
        ("isub.ovf.", || Opcode::ISubOvf),
        ("imul.ovf.", || Opcode::IMulOvf),
        ("sdiv.chk0.", || Opcode::SDivChk0),
        ("srem.chk0.", || Opcode::SRemChk0),
        ("udiv.chk0.", || Opcode::UDivChk0),
        ("urem.chk0.", || Opcode::URemChk0),
        ("cast.fp_to_si.rte.chk.", || Opcode::CastFpToSiRteChk),
        ("cast.fp_to_ui.rte.chk.", || Opcode::CastFpToUiRteChk),
        ("load.", || Opcode::Load),
        ("store.", || Opcode::Store),
    ];
    for (prefix, make) in suffixed {
        if let Some(suffix) = tok.strip_prefix(prefix) {
            let ty = Type::from_name(suffix)
                .ok_or_else(|| ParseError::new(line, format!("unknown type '{}'", suffix)))?;
            return Ok((make(), ty));
        }
    }

    Err(ParseError::new(line, format!("unknown opcode '{}'", tok)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::IrBuilder;
    use crate::text::print_module;

    fn sample_module() -> Module {
        let mut m = Module::new();
        m.externs.push(Extern::new(
            "rt_print_i64",
            Type::Void,
            vec![Type::I64],
        ));
        m.globals.push(Global {
            name: "greeting".into(),
            ty: Type::Str,
            init: GlobalInit::Str("hi \"there\"\n".into()),
        });

        let mut b = IrBuilder::new(&mut m);
        b.start_function("main", Type::I64, vec![]);
        let entry = b.create_block("entry");
        let (merge, ids) = b.create_block_with_params("merge", vec![Type::I64]);
        b.set_insert_point(entry);
        let t = b.emit_bin(
            Opcode::IAddOvf,
            Type::I32,
            Value::const_int(1),
            Value::const_int(2),
            SourceLoc::new(1, 10, 3),
        );
        b.emit_cbr(
            Value::const_bool(true),
            "merge",
            vec![Value::temp(t)],
            "merge",
            vec![Value::const_int(7)],
            SourceLoc::new(1, 11, 1),
        );
        b.set_insert_point(merge);
        b.emit_call(
            "rt_print_i64",
            Type::Void,
            vec![Value::temp(ids[0])],
            SourceLoc::new(1, 12, 1),
        );
        b.emit_ret(Some(Value::temp(ids[0])), SourceLoc::new(1, 13, 1));
        m
    }

    #[test]
    fn print_parse_round_trip() {
        let m = sample_module();
        let text = print_module(&m);
        let parsed = parse_module(&text).expect("round trip parse");
        assert_eq!(parsed, m);
    }

    #[test]
    fn round_trip_is_idempotent() {
        let m = sample_module();
        let once = print_module(&m);
        let twice = print_module(&parse_module(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn parses_float_and_null_operands() {
        let src = "\
func @f() -> f64 {
entry:
  %0 = fadd 1.5, -0.25
  %1 = fcmp.uno nan, 0.0
  ret %0
}
";
        let m = parse_module(src).unwrap();
        let f = m.function("f").unwrap();
        let i0 = &f.blocks[0].instructions[0];
        assert_eq!(i0.operands[0], Value::ConstFloat(1.5));
        let i1 = &f.blocks[0].instructions[1];
        assert_eq!(i1.op, Opcode::FCmp(FloatPredicate::Uno));
        assert!(matches!(i1.operands[0], Value::ConstFloat(v) if v.is_nan()));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let src = "func @f() -> void {\nentry:\n  frob %0\n}\n";
        let err = parse_module(src).unwrap_err();
        assert!(err.to_string().contains("unknown opcode"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn rejects_instruction_outside_block() {
        let src = "func @f() -> void {\n  ret\n}\n";
        let err = parse_module(src).unwrap_err();
        assert!(err.to_string().contains("outside any block"));
    }

    #[test]
    fn loc_suffix_round_trips() {
        let src = "\
func @f() -> i64 {
entry:
  %0 = const.i64 9 .loc 2:77:5
  ret %0 .loc 2:78:1
}
";
        let m = parse_module(src).unwrap();
        let i = &m.functions[0].blocks[0].instructions[0];
        assert_eq!(i.loc, SourceLoc::new(2, 77, 5));
        let printed = print_module(&m);
        assert!(printed.contains(".loc 2:77:5"));
    }
}
