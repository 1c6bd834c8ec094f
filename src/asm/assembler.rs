//! Two-pass assembler for Continuum93 programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//!         ORG 0x1000          ; Image origin
//! START:  LD ABC, 0x002000    ; Labels end in ':'
//!         AND (ABC+4), 0x0F
//!         LD (0x3000), (ABC), 16, 2   ; Block form: size, repeat
//!         CP A, 10
//!         JP LT, START        ; Conditional jump
//!         RAND F0, 0x043A7FD1
//!         BREAK
//! TEXT:   DB "hi", 0, 0x1234
//! ```
//!
//! The assembler is best-effort: every line is processed even after errors,
//! all problems are collected, and an image is only produced when there are
//! none. Labels may be used wherever a 24-bit literal is accepted and are
//! resolved in the second pass.

use crate::cpu::decode::{encode, AddressExpr, Condition, Instruction, Opcode, Operand, ShapeError, ADDRESS_WIDTH};
use crate::cpu::memory::ADDRESS_MASK;
use crate::cpu::registers::{width_mask, Reg};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a memory image.
///
/// The image starts at the origin given by the first `ORG` (0 without one).
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblyFailed> {
    let mut asm = Assembler::new();
    asm.build(source);
    match asm.compiled_code() {
        Some(code) => Ok(code.to_vec()),
        None => Err(AssemblyFailed {
            errors: asm.diagnostics,
        }),
    }
}

/// Which literal inside an operand a label stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Imm,
    Base,
    Offset,
}

/// A label use waiting for pass 2.
#[derive(Debug, Clone)]
struct LabelRef {
    operand: usize,
    slot: Slot,
    label: String,
}

#[derive(Debug, Clone)]
enum Fixup {
    /// Re-encode an instruction once its labels are known.
    Instruction {
        opcode: Opcode,
        operands: Vec<Operand>,
        refs: Vec<LabelRef>,
    },
    /// A 3-byte label address emitted by `DB`.
    Data { label: String },
}

#[derive(Debug, Clone)]
struct Pending {
    /// Index into the output image.
    offset: usize,
    line: usize,
    fixup: Fixup,
}

/// A parsed operand whose width may still depend on its neighbours.
#[derive(Debug, Clone)]
enum Arg {
    Ready(Operand),
    Int { value: i64, natural: u8 },
}

/// The assembler state.
#[derive(Debug, Default)]
pub struct Assembler {
    origin: Option<u32>,
    /// Address of the next emitted byte.
    current_addr: u32,
    /// Symbol table (label -> address).
    symbols: HashMap<String, u32>,
    pending: Vec<Pending>,
    output: Vec<u8>,
    diagnostics: Vec<AssemblerError>,
    log: String,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble `source`, replacing the result of any previous build.
    pub fn build(&mut self, source: &str) {
        *self = Self::new();

        // Pass 1: collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            if let Err(e) = self.process_line(line, line_num + 1) {
                self.report(e);
            }
        }

        // Pass 2: resolve forward references
        self.resolve_references();

        if self.diagnostics.is_empty() {
            self.log.push_str(&format!(
                "Assembled {} bytes at 0x{:06X}, {} labels\n",
                self.output.len(),
                self.origin(),
                self.symbols.len()
            ));
        } else {
            self.log
                .push_str(&format!("{} error(s), no image produced\n", self.diagnostics.len()));
        }
    }

    /// Number of errors from the last build.
    pub fn errors(&self) -> usize {
        self.diagnostics.len()
    }

    /// Human-readable build log.
    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn diagnostics(&self) -> &[AssemblerError] {
        &self.diagnostics
    }

    /// The assembled image, or `None` if the build had errors.
    pub fn compiled_code(&self) -> Option<&[u8]> {
        if self.diagnostics.is_empty() {
            Some(&self.output)
        } else {
            None
        }
    }

    /// Address of the first image byte.
    pub fn origin(&self) -> u32 {
        self.origin.unwrap_or(0)
    }

    /// Address of a label.
    pub fn symbol(&self, name: &str) -> Option<u32> {
        self.symbols.get(&name.to_uppercase()).copied()
    }

    fn report(&mut self, error: AssemblerError) {
        log::warn!("{}", error);
        self.log.push_str(&error.to_string());
        self.log.push('\n');
        self.diagnostics.push(error);
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments, uppercase everything outside string literals
        let line = normalize(strip_comment(line));
        let mut line = line.trim();

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some(colon_idx) = find_unquoted(line, ':') {
            let label = line[..colon_idx].trim();
            self.define_label(label, line_num)?;
            line = line[colon_idx + 1..].trim();
            if line.is_empty() {
                return Ok(());
            }
        }

        let (mnemonic, rest) = match line.find(char::is_whitespace) {
            Some(idx) => (&line[..idx], line[idx..].trim()),
            None => (line, ""),
        };
        let args = split_operands(rest);
        if args.iter().any(|a| a.is_empty()) {
            return Err(syntax(line_num, "empty operand"));
        }

        match mnemonic {
            "ORG" => self.directive_org(&args, line_num),
            "DB" => self.directive_db(&args, line_num),
            _ => self.process_instruction(mnemonic, &args, line_num),
        }
    }

    fn define_label(&mut self, label: &str, line_num: usize) -> Result<(), AssemblerError> {
        if !is_identifier(label) {
            return Err(syntax(line_num, format!("invalid label name '{}'", label)));
        }
        if label.parse::<Reg>().is_ok() || parse_freg(label).is_some() {
            return Err(syntax(line_num, format!("label '{}' is a register name", label)));
        }
        if self.symbols.contains_key(label) {
            return Err(AssemblerError::DuplicateLabel {
                line: line_num,
                label: label.to_string(),
            });
        }
        self.symbols.insert(label.to_string(), self.current_addr);
        Ok(())
    }

    fn directive_org(&mut self, args: &[&str], line_num: usize) -> Result<(), AssemblerError> {
        let [arg] = args else {
            return Err(syntax(line_num, "ORG requires one address"));
        };
        let (value, _) = parse_int(arg).map_err(|m| syntax(line_num, m))?;
        if !(0..=ADDRESS_MASK as i64).contains(&value) {
            return Err(AssemblerError::ValueOutOfRange {
                line: line_num,
                value,
                width: ADDRESS_WIDTH,
            });
        }
        let target = value as u32;

        if self.output.is_empty() {
            // Nothing emitted yet, so every label so far sits at the origin
            for addr in self.symbols.values_mut() {
                *addr = target;
            }
            self.origin = Some(target);
            self.current_addr = target;
        } else if target < self.current_addr {
            return Err(AssemblerError::OrgBackwards {
                line: line_num,
                target,
                current: self.current_addr,
            });
        } else {
            let padding = vec![0; (target - self.current_addr) as usize];
            self.emit(&padding);
        }
        Ok(())
    }

    fn directive_db(&mut self, args: &[&str], line_num: usize) -> Result<(), AssemblerError> {
        if args.is_empty() {
            return Err(syntax(line_num, "DB requires at least one value"));
        }
        for arg in args {
            if let Some(text) = arg.strip_prefix('"') {
                let text = text
                    .strip_suffix('"')
                    .ok_or_else(|| syntax(line_num, "unterminated string"))?;
                self.emit(text.as_bytes());
            } else if is_identifier(arg) {
                self.pending.push(Pending {
                    offset: self.output.len(),
                    line: line_num,
                    fixup: Fixup::Data {
                        label: arg.to_string(),
                    },
                });
                self.emit(&[0; ADDRESS_WIDTH as usize]);
            } else if is_float_literal(arg) {
                let value = parse_float(arg).map_err(|m| syntax(line_num, m))?;
                self.emit(&value.to_bits().to_be_bytes());
            } else {
                let (value, width) = parse_int(arg).map_err(|m| syntax(line_num, m))?;
                let bytes = (value as u32).to_be_bytes();
                self.emit(&bytes[4 - width as usize..]);
            }
        }
        Ok(())
    }

    fn process_instruction(&mut self, mnemonic: &str, args: &[&str], line_num: usize) -> Result<(), AssemblerError> {
        let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| AssemblerError::UnknownMnemonic {
            line: line_num,
            mnemonic: mnemonic.to_string(),
        })?;

        let mut refs = Vec::new();
        let operands = parse_operands(opcode, args, &mut refs).map_err(|m| syntax(line_num, m))?;
        let instr = Instruction::from_parts(opcode, &operands).map_err(|error| AssemblerError::InvalidOperands {
            line: line_num,
            error,
        })?;

        if !refs.is_empty() {
            self.pending.push(Pending {
                offset: self.output.len(),
                line: line_num,
                fixup: Fixup::Instruction { opcode, operands, refs },
            });
        }
        self.emit(&encode(&instr));
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
        self.current_addr = self.current_addr.wrapping_add(bytes.len() as u32);
    }

    fn resolve_references(&mut self) {
        for pending in std::mem::take(&mut self.pending) {
            if let Err(e) = self.apply_fixup(&pending) {
                self.report(e);
            }
        }
    }

    fn lookup(&self, label: &str, line: usize) -> Result<u32, AssemblerError> {
        self.symbols
            .get(label)
            .copied()
            .ok_or_else(|| AssemblerError::UndefinedLabel {
                line,
                label: label.to_string(),
            })
    }

    fn apply_fixup(&mut self, pending: &Pending) -> Result<(), AssemblerError> {
        let bytes = match &pending.fixup {
            Fixup::Data { label } => {
                let addr = self.lookup(label, pending.line)?;
                addr.to_be_bytes()[1..].to_vec()
            }
            Fixup::Instruction { opcode, operands, refs } => {
                let mut operands = operands.clone();
                for r in refs {
                    let addr = self.lookup(&r.label, pending.line)?;
                    patch(&mut operands[r.operand], r.slot, addr).map_err(|width| {
                        AssemblerError::ValueOutOfRange {
                            line: pending.line,
                            value: addr as i64,
                            width,
                        }
                    })?;
                }
                let instr = Instruction::from_parts(*opcode, &operands).map_err(|error| {
                    AssemblerError::InvalidOperands {
                        line: pending.line,
                        error,
                    }
                })?;
                encode(&instr)
            }
        };

        // Label literals are fixed width, so the length never changes
        self.output[pending.offset..pending.offset + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }
}

/// Write a resolved label into its slot. Fails with the slot width when an
/// immediate is too narrow for the address.
fn patch(op: &mut Operand, slot: Slot, addr: u32) -> Result<(), u8> {
    match (op, slot) {
        (Operand::Imm { width, .. }, Slot::Imm) if !fits(addr as i64, *width) => return Err(*width),
        (Operand::Imm { value, .. }, Slot::Imm) => *value = addr,
        (Operand::Mem(expr), Slot::Base) => match expr {
            AddressExpr::Absolute(base) | AddressExpr::AbsoluteImm(base, _) | AddressExpr::AbsoluteReg(base, _) => {
                *base = addr
            }
            _ => {}
        },
        (Operand::Mem(expr), Slot::Offset) => match expr {
            AddressExpr::AbsoluteImm(_, offset) | AddressExpr::IndirectImm(_, offset) => *offset = addr,
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

/// Parse every operand and settle literal widths.
fn parse_operands(opcode: Opcode, args: &[&str], refs: &mut Vec<LabelRef>) -> Result<Vec<Operand>, String> {
    let mut parsed = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        let is_condition = opcode == Opcode::Jp && args.len() == 2 && index == 0;
        if is_condition {
            let cond = Condition::from_name(arg).ok_or_else(|| format!("unknown condition '{}'", arg))?;
            parsed.push(Arg::Ready(Operand::Cond(cond)));
        } else {
            parsed.push(parse_arg(arg, index, refs)?);
        }
    }

    let dest = match parsed.first() {
        Some(Arg::Ready(op)) => Some(*op),
        _ => None,
    };

    parsed
        .into_iter()
        .enumerate()
        .map(|(index, arg)| match arg {
            Arg::Ready(op) => Ok(op),
            Arg::Int { value, natural } => {
                let width = exact_width(opcode, index, args.len(), dest.as_ref()).unwrap_or(natural);
                if !fits(value, width) {
                    return Err(format!("value {} does not fit in {} byte(s)", value, width));
                }
                Ok(Operand::Imm {
                    value: value as u32 & width_mask(width),
                    width,
                })
            }
        })
        .collect()
}

/// Width an integer literal must take from its position, if fixed.
fn exact_width(opcode: Opcode, index: usize, argc: usize, dest: Option<&Operand>) -> Option<u8> {
    let dest_width = || match dest {
        Some(Operand::Reg(r)) => Some(r.width()),
        Some(Operand::FReg(_)) => Some(4),
        _ => None,
    };
    match opcode {
        Opcode::Jp if index == argc - 1 => Some(ADDRESS_WIDTH),
        Opcode::Rand if index == 1 => dest_width(),
        Opcode::Cp if index == 1 => dest_width(),
        _ if opcode.alu_op().is_some() => match index {
            1 => dest_width(),
            2 => Some(ADDRESS_WIDTH),
            _ => None,
        },
        _ => None,
    }
}

fn parse_arg(text: &str, index: usize, refs: &mut Vec<LabelRef>) -> Result<Arg, String> {
    if let Some(inner) = text.strip_prefix('(') {
        let inner = inner.strip_suffix(')').ok_or("missing ')'")?;
        let expr = parse_address(inner.trim(), index, refs)?;
        return Ok(Arg::Ready(Operand::Mem(expr)));
    }
    if starts_number(text) {
        if is_float_literal(text) {
            return Ok(Arg::Ready(Operand::FloatImm(parse_float(text)?)));
        }
        let (value, natural) = parse_int(text)?;
        return Ok(Arg::Int { value, natural });
    }
    if let Some(freg) = parse_freg(text) {
        return Ok(Arg::Ready(Operand::FReg(freg?)));
    }
    if let Ok(reg) = text.parse::<Reg>() {
        return Ok(Arg::Ready(Operand::Reg(reg)));
    }
    if is_identifier(text) {
        refs.push(LabelRef {
            operand: index,
            slot: Slot::Imm,
            label: text.to_string(),
        });
        return Ok(Arg::Int {
            value: 0,
            natural: ADDRESS_WIDTH,
        });
    }
    Err(format!("cannot parse operand '{}'", text))
}

/// Parse the inside of `( ... )`.
fn parse_address(inner: &str, index: usize, refs: &mut Vec<LabelRef>) -> Result<AddressExpr, String> {
    // Split at the first sign after the base
    let split = inner
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '+' || c == '-')
        .map(|(i, _)| i);
    let (base_text, offset) = match split {
        Some(i) => (inner[..i].trim(), Some((&inner[i..i + 1], inner[i + 1..].trim()))),
        None => (inner, None),
    };

    let base = match base_text.parse::<Reg>() {
        Ok(reg) => Base::Reg(reg),
        Err(_) => Base::Addr(address_literal(base_text, index, Slot::Base, refs)?),
    };

    let Some((sign, offset_text)) = offset else {
        return Ok(match base {
            Base::Reg(r) => AddressExpr::Indirect(r),
            Base::Addr(a) => AddressExpr::Absolute(a),
        });
    };

    if let Ok(reg) = offset_text.parse::<Reg>() {
        if sign == "-" {
            return Err("register offsets cannot be subtracted".into());
        }
        return Ok(match base {
            Base::Reg(r) => AddressExpr::IndirectReg(r, reg),
            Base::Addr(a) => AddressExpr::AbsoluteReg(a, reg),
        });
    }

    if sign == "-" && is_identifier(offset_text) {
        return Err("label offsets cannot be subtracted".into());
    }
    let mut offset = address_literal(offset_text, index, Slot::Offset, refs)?;
    if sign == "-" {
        offset = offset.wrapping_neg() & ADDRESS_MASK;
    }
    Ok(match base {
        Base::Reg(r) => AddressExpr::IndirectImm(r, offset),
        Base::Addr(a) => AddressExpr::AbsoluteImm(a, offset),
    })
}

enum Base {
    Reg(Reg),
    Addr(u32),
}

/// A 24-bit literal or label inside an address expression.
fn address_literal(text: &str, index: usize, slot: Slot, refs: &mut Vec<LabelRef>) -> Result<u32, String> {
    if is_identifier(text) {
        refs.push(LabelRef {
            operand: index,
            slot,
            label: text.to_string(),
        });
        return Ok(0);
    }
    let (value, _) = parse_int(text)?;
    if !(0..=ADDRESS_MASK as i64).contains(&value) {
        return Err(format!("address {} out of range", value));
    }
    Ok(value as u32)
}

/// `Fn` float register names. `Some(Err)` for an out-of-range index.
fn parse_freg(text: &str) -> Option<Result<u8, String>> {
    let digits = text.strip_prefix('F')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(match digits.parse::<u8>() {
        Ok(n) if (n as usize) < crate::cpu::fregs::FLOAT_REGISTER_COUNT => Ok(n),
        _ => Err(format!("float register {} does not exist", text)),
    })
}

fn starts_number(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+')
}

fn is_float_literal(text: &str) -> bool {
    let body = text.trim_start_matches(&['-', '+'][..]);
    starts_number(text) && !body.starts_with("0X") && !body.starts_with("0B") && body.contains(&['.', 'E'][..])
}

fn parse_float(text: &str) -> Result<f32, String> {
    text.parse::<f32>()
        .map_err(|_| format!("invalid float literal '{}'", text))
}

/// Parse an integer literal, returning its value and natural width in bytes.
///
/// Hex literals are as wide as their digits (`0x00FF` is two bytes); decimal
/// and binary literals take the fewest bytes that hold them.
fn parse_int(text: &str) -> Result<(i64, u8), String> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let invalid = || format!("invalid number '{}'", text);

    let (magnitude, digit_width) = if let Some(hex) = body.strip_prefix("0X") {
        if hex.is_empty() || hex.len() > 8 {
            return Err(invalid());
        }
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        (value as i64, ((hex.len() + 1) / 2) as u8)
    } else if let Some(bin) = body.strip_prefix("0B") {
        if bin.is_empty() || bin.len() > 32 {
            return Err(invalid());
        }
        let value = u32::from_str_radix(bin, 2).map_err(|_| invalid())?;
        (value as i64, ((bin.len() + 7) / 8) as u8)
    } else {
        let value = body.parse::<u32>().map_err(|_| invalid())?;
        (value as i64, 1)
    };

    let value = if negative { -magnitude } else { magnitude };
    let width = (1..=4)
        .find(|&w| w >= digit_width && fits(value, w))
        .ok_or_else(|| format!("value {} does not fit in 4 bytes", value))?;
    Ok((value, width))
}

/// Whether `value` can be stored in `width` bytes, signed or unsigned.
fn fits(value: i64, width: u8) -> bool {
    let bits = width as u32 * 8;
    value >= -(1i64 << (bits - 1)) && value < (1i64 << bits)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn find_unquoted(line: &str, needle: char) -> Option<usize> {
    let mut in_string = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            c if c == needle && !in_string => return Some(i),
            _ => {}
        }
    }
    None
}

fn strip_comment(line: &str) -> &str {
    match find_unquoted(line, ';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Uppercase everything outside string literals.
fn normalize(line: &str) -> String {
    let mut in_string = false;
    line.chars()
        .map(|c| {
            if c == '"' {
                in_string = !in_string;
            }
            if in_string {
                c
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

/// Split an operand list at commas outside strings and parentheses.
fn split_operands(rest: &str) -> Vec<&str> {
    if rest.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in rest.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                parts.push(rest[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(rest[start..].trim());
    parts
}

fn syntax(line: usize, message: impl Into<String>) -> AssemblerError {
    AssemblerError::SyntaxError {
        line,
        message: message.into(),
    }
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value} does not fit in {width} byte(s)")]
    ValueOutOfRange { line: usize, value: i64, width: u8 },

    #[error("invalid operands on line {line}: {error}")]
    InvalidOperands { line: usize, error: ShapeError },

    #[error("ORG on line {line} moves backwards from 0x{current:06X} to 0x{target:06X}")]
    OrgBackwards { line: usize, target: u32, current: u32 },
}

impl AssemblerError {
    /// Source line the error refers to.
    pub fn line(&self) -> usize {
        match self {
            AssemblerError::SyntaxError { line, .. }
            | AssemblerError::UnknownMnemonic { line, .. }
            | AssemblerError::UndefinedLabel { line, .. }
            | AssemblerError::DuplicateLabel { line, .. }
            | AssemblerError::ValueOutOfRange { line, .. }
            | AssemblerError::InvalidOperands { line, .. }
            | AssemblerError::OrgBackwards { line, .. } => *line,
        }
    }
}

/// All errors from a failed [`assemble`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("assembly failed with {} error(s)", .errors.len())]
pub struct AssemblyFailed {
    pub errors: Vec<AssemblerError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{decode, AluOp, BlockSpec};

    fn reg(name: &str) -> Reg {
        name.parse().unwrap()
    }

    fn single(source: &str) -> Instruction {
        let code = assemble(source).unwrap();
        let (instr, len) = decode(&code).unwrap();
        assert_eq!(len, code.len());
        instr
    }

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; Simple test program
            LD AB, 0x1234
            AND AB, 0x00FF
            NOP
            BREAK
        "#;

        let code = assemble(source).unwrap();
        assert_eq!(&code[code.len() - 4..], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_immediate_takes_register_width() {
        assert_eq!(
            single("ld abcd, 1"),
            Instruction::Alu {
                op: AluOp::Ld,
                dest: Operand::Reg(reg("ABCD")),
                src: Operand::Imm { value: 1, width: 4 },
                block: None,
            }
        );
        assert_eq!(
            single("SUB A, -1"),
            Instruction::Alu {
                op: AluOp::Sub,
                dest: Operand::Reg(reg("A")),
                src: Operand::Imm { value: 0xFF, width: 1 },
                block: None,
            }
        );
    }

    #[test]
    fn test_immediate_too_wide() {
        let err = assemble("LD A, 0x1234").unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert!(matches!(err.errors[0], AssemblerError::SyntaxError { line: 1, .. }));
    }

    #[test]
    fn test_register_width_mismatch() {
        let err = assemble("ADD A, BC").unwrap_err();
        assert_eq!(
            err.errors,
            vec![AssemblerError::InvalidOperands {
                line: 1,
                error: ShapeError::WidthMismatch { dest: 1, src: 2 },
            }]
        );
    }

    #[test]
    fn test_memory_operand_forms() {
        let cases = [
            ("(0x1000)", AddressExpr::Absolute(0x1000)),
            ("(0x1000+16)", AddressExpr::AbsoluteImm(0x1000, 16)),
            ("(0x1000+X)", AddressExpr::AbsoluteReg(0x1000, reg("X"))),
            ("(0x1000+XY)", AddressExpr::AbsoluteReg(0x1000, reg("XY"))),
            ("(QRS)", AddressExpr::Indirect(reg("QRS"))),
            ("(QRS + 4)", AddressExpr::IndirectImm(reg("QRS"), 4)),
            ("(QRS-1)", AddressExpr::IndirectImm(reg("QRS"), 0xFF_FFFF)),
            ("(QRS+ABC)", AddressExpr::IndirectReg(reg("QRS"), reg("ABC"))),
        ];
        for (text, expr) in cases {
            let instr = single(&format!("LD A, {}", text));
            assert_eq!(
                instr,
                Instruction::Alu {
                    op: AluOp::Ld,
                    dest: Operand::Reg(reg("A")),
                    src: Operand::Mem(expr),
                    block: None,
                },
                "{text}"
            );
        }
    }

    #[test]
    fn test_block_form() {
        assert_eq!(
            single("AND (0x2000), (0x3000), 3"),
            Instruction::Alu {
                op: AluOp::And,
                dest: Operand::Mem(AddressExpr::Absolute(0x2000)),
                src: Operand::Mem(AddressExpr::Absolute(0x3000)),
                block: Some(BlockSpec { size: 3, repeat: None }),
            }
        );
        assert_eq!(
            single("LD (ABC), 0xAA55, 16, C"),
            Instruction::Alu {
                op: AluOp::Ld,
                dest: Operand::Mem(AddressExpr::Indirect(reg("ABC"))),
                src: Operand::Imm { value: 0xAA55, width: 2 },
                block: Some(BlockSpec {
                    size: 16,
                    repeat: Some(Operand::Reg(reg("C"))),
                }),
            }
        );
    }

    #[test]
    fn test_memory_to_memory_needs_block() {
        let err = assemble("LD (0x10), (0x20)").unwrap_err();
        assert!(matches!(
            err.errors[0],
            AssemblerError::InvalidOperands {
                error: ShapeError::MemoryToMemory,
                ..
            }
        ));
    }

    #[test]
    fn test_float_operands() {
        assert_eq!(
            single("MUL F2, -1.5"),
            Instruction::Alu {
                op: AluOp::Mul,
                dest: Operand::FReg(2),
                src: Operand::FloatImm(-1.5),
                block: None,
            }
        );
        assert_eq!(
            single("RAND F0, 0x043A7FD1"),
            Instruction::Rand {
                dest: Operand::FReg(0),
                arg: Some(Operand::Imm { value: 0x043A_7FD1, width: 4 }),
            }
        );
        assert!(assemble("LD F16, 1.0").is_err());
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
                ORG 0x100
        START:  NOP
                JP NZ, END
                JP START
        END:    BREAK
        "#;

        let mut asm = Assembler::new();
        asm.build(source);
        assert_eq!(asm.errors(), 0, "{}", asm.log());
        assert_eq!(asm.origin(), 0x100);
        assert_eq!(asm.symbol("start"), Some(0x100));

        let code = asm.compiled_code().unwrap();
        let (_, nop_len) = decode(code).unwrap();
        let (jp, jp_len) = decode(&code[nop_len..]).unwrap();
        let end = asm.symbol("END").unwrap();
        assert_eq!(
            jp,
            Instruction::Jp {
                cond: Some(Condition::Nz),
                target: Operand::Imm { value: end, width: 3 },
            }
        );
        let (back, _) = decode(&code[nop_len + jp_len..]).unwrap();
        assert_eq!(
            back,
            Instruction::Jp {
                cond: None,
                target: Operand::Imm { value: 0x100, width: 3 },
            }
        );
    }

    #[test]
    fn test_label_in_address() {
        let source = r#"
            LD A, (DATA+1)
            BREAK
        DATA: DB 1, 2, 3
        "#;
        let code = assemble(source).unwrap();
        let (instr, _) = decode(&code).unwrap();
        let data = (code.len() - 3) as u32;
        assert_eq!(
            instr,
            Instruction::Alu {
                op: AluOp::Ld,
                dest: Operand::Reg(reg("A")),
                src: Operand::Mem(AddressExpr::AbsoluteImm(data, 1)),
                block: None,
            }
        );
    }

    #[test]
    fn test_label_too_wide_for_register() {
        let source = "ORG 0x1200\nLD A, TARGET\nBREAK\nTARGET: DB 1";
        let err = assemble(source).unwrap_err();
        assert_eq!(
            err.errors,
            vec![AssemblerError::ValueOutOfRange {
                line: 2,
                value: 0x1208,
                width: 1,
            }]
        );

        // A label that fits the register is still accepted
        let code = assemble("LD A, TARGET\nBREAK\nTARGET: DB 1").unwrap();
        let (instr, _) = decode(&code).unwrap();
        let target = (code.len() - 1) as u32;
        assert_eq!(
            instr,
            Instruction::Alu {
                op: AluOp::Ld,
                dest: Operand::Reg(reg("A")),
                src: Operand::Imm { value: target, width: 1 },
                block: None,
            }
        );
    }

    #[test]
    fn test_label_before_first_org() {
        let mut asm = Assembler::new();
        asm.build("START:\nORG 0x100\nNOP\nJP START");
        assert_eq!(asm.errors(), 0);
        assert_eq!(asm.symbol("START"), Some(0x100));
        assert_eq!(asm.origin(), 0x100);
    }

    #[test]
    fn test_db_directive() {
        let code = assemble(r#"DB 1, 0x0203, "Hi;", -1, LBL
LBL: DB 0b101"#)
        .unwrap();
        assert_eq!(code, vec![1, 2, 3, b'H', b'i', b';', 0xFF, 0, 0, 10, 5]);
    }

    #[test]
    fn test_org_padding_and_backwards() {
        let code = assemble("ORG 0x10\nDB 1\nORG 0x14\nDB 2").unwrap();
        assert_eq!(code, vec![1, 0, 0, 0, 2]);

        let err = assemble("ORG 0x10\nDB 1, 2\nORG 0x10").unwrap_err();
        assert!(matches!(err.errors[0], AssemblerError::OrgBackwards { line: 3, .. }));
    }

    #[test]
    fn test_collects_all_errors() {
        let source = "FOO A\nLD A, 1\nLP: NOP\nLP: NOP\nJP MISSING\nLD AC, 1";
        let mut asm = Assembler::new();
        asm.build(source);

        assert_eq!(asm.errors(), 4);
        assert!(asm.compiled_code().is_none());
        let lines: Vec<usize> = asm.diagnostics().iter().map(|e| e.line()).collect();
        assert_eq!(lines, vec![1, 4, 6, 5]);
        assert!(asm.log().contains("unknown mnemonic on line 1: FOO"));
    }

    #[test]
    fn test_build_resets_state() {
        let mut asm = Assembler::new();
        asm.build("BOGUS");
        assert_eq!(asm.errors(), 1);
        asm.build("BREAK");
        assert_eq!(asm.errors(), 0);
        assert_eq!(asm.compiled_code(), Some(&[0u8, 0][..]));
    }

    #[test]
    fn test_build_is_deterministic() {
        let source = "ORG 0x40\nL1: LD (ABC+L1), 0x7F, 4, 3\nRAND F2, 0x01020304\nJP GT, L1\nBREAK";
        let first = assemble(source).unwrap();
        assert_eq!(assemble(source).unwrap(), first);

        let mut asm = Assembler::new();
        asm.build(source);
        asm.build(source);
        assert_eq!(asm.compiled_code(), Some(first.as_slice()));
    }

    #[test]
    fn test_jp_condition_and_register_target() {
        assert_eq!(
            single("JP Z, XYZ"),
            Instruction::Jp {
                cond: Some(Condition::Z),
                target: Operand::Reg(reg("XYZ")),
            }
        );
        assert!(assemble("JP Q, 0x10").is_err());
        assert!(assemble("JP A").is_err());
    }

    #[test]
    fn test_label_cannot_be_register() {
        assert!(assemble("AB: NOP").is_err());
        assert!(assemble("F3: NOP").is_err());
    }
}
