//! Disassembler for Continuum93 images.
//!
//! Converts bytecode back to assembler syntax. A listing produced by
//! [`disassemble`] assembles back to the same bytes.

use crate::cpu::decode::{decode, encode, AddressExpr, Instruction, Operand};
use std::fmt;

impl fmt::Display for AddressExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressExpr::Absolute(a) => write!(f, "(0x{:06X})", a),
            AddressExpr::AbsoluteImm(a, o) => write!(f, "(0x{:06X}+0x{:06X})", a, o),
            AddressExpr::AbsoluteReg(a, r) => write!(f, "(0x{:06X}+{})", a, r),
            AddressExpr::Indirect(r) => write!(f, "({})", r),
            AddressExpr::IndirectImm(r, o) => write!(f, "({}+0x{:06X})", r, o),
            AddressExpr::IndirectReg(r, o) => write!(f, "({}+{})", r, o),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::FReg(i) => write!(f, "F{}", i),
            // Leading zeros keep the literal width
            Operand::Imm { value, width } => write!(f, "0x{:0w$X}", value, w = *width as usize * 2),
            Operand::FloatImm(v) => write!(f, "{:?}", v),
            Operand::Mem(expr) => write!(f, "{}", expr),
            Operand::Cond(c) => write!(f, "{}", c.name()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode().mnemonic())?;

        let mut operands: Vec<String> = Vec::new();
        match self {
            Instruction::Alu { dest, src, block: Some(block), .. } => {
                operands.push(dest.to_string());
                operands.push(src.to_string());
                operands.push(block.size.to_string());
                if let Some(repeat) = &block.repeat {
                    operands.push(repeat.to_string());
                }
            }
            other => operands.extend(other.operands().iter().map(Operand::to_string)),
        }

        if !operands.is_empty() {
            write!(f, " {}", operands.join(", "))?;
        }
        Ok(())
    }
}

/// Disassemble the instruction at the start of `bytes`.
///
/// Returns the text and the number of bytes consumed. Bytes that do not
/// decode to an instruction come out as a one-byte `DB`.
pub fn disassemble_instruction(bytes: &[u8]) -> (String, usize) {
    match decode(bytes) {
        Ok((instr, len)) if reassembles(&instr, &bytes[..len]) => (instr.to_string(), len),
        _ => match bytes.first() {
            Some(b) => (format!("DB 0x{:02X}", b), 1),
            None => (String::new(), 0),
        },
    }
}

/// True when the text form of `instr` assembles back to `bytes`.
fn reassembles(instr: &Instruction, bytes: &[u8]) -> bool {
    let finite = instr.operands().iter().all(|op| match op {
        Operand::FloatImm(v) => v.is_finite(),
        _ => true,
    });
    finite && encode(instr) == bytes
}

/// Disassemble an image loaded at `origin` into a listing.
pub fn disassemble(image: &[u8], origin: u32) -> String {
    let mut output = String::new();
    output.push_str("; Continuum93 Disassembly\n");
    output.push_str("; ------------------------\n\n");
    output.push_str(&format!("    ORG 0x{:06X}\n", origin));

    let mut offset = 0;
    while offset < image.len() {
        let (text, len) = disassemble_instruction(&image[offset..]);
        let bytes: Vec<String> = image[offset..offset + len]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();
        output.push_str(&format!(
            "    {:<40} ; {:06X}: {}\n",
            text,
            origin as usize + offset,
            bytes.join(" ")
        ));
        offset += len;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::cpu::decode::{AluOp, BlockSpec, Condition};
    use crate::cpu::registers::Reg;

    fn reg(name: &str) -> Reg {
        name.parse().unwrap()
    }

    #[test]
    fn test_disassemble_break() {
        let (text, len) = disassemble_instruction(&[0x00, 0x00]);
        assert_eq!(text, "BREAK");
        assert_eq!(len, 2);
    }

    #[test]
    fn test_format_operands() {
        let instr = Instruction::Alu {
            op: AluOp::Ld,
            dest: Operand::Mem(AddressExpr::IndirectImm(reg("XYZ"), 0x10)),
            src: Operand::Imm { value: 0x12, width: 2 },
            block: None,
        };
        assert_eq!(instr.to_string(), "LD (XYZ+0x000010), 0x0012");

        let jp = Instruction::Jp {
            cond: Some(Condition::Gte),
            target: Operand::Imm { value: 0x100, width: 3 },
        };
        assert_eq!(jp.to_string(), "JP GTE, 0x000100");

        let block = Instruction::Alu {
            op: AluOp::Xor,
            dest: Operand::Mem(AddressExpr::Absolute(0x2000)),
            src: Operand::FReg(3),
            block: Some(BlockSpec {
                size: 8,
                repeat: Some(Operand::Reg(reg("QR"))),
            }),
        };
        assert_eq!(block.to_string(), "XOR (0x002000), F3, 8, QR");
    }

    #[test]
    fn test_undecodable_byte() {
        let (text, len) = disassemble_instruction(&[0xEE, 0x01, 0x02]);
        assert_eq!(text, "DB 0xEE");
        assert_eq!(len, 1);
    }

    #[test]
    fn test_listing_reassembles() {
        let source = r#"
                ORG 0x000400
        START:  LD ABC, 0x002000
                LD (ABC+4), 0x0F
                AND (0x2000), (0x3000), 3
                LD (ABC), 0xAA55, 16, C
                MUL F1, -2.25
                ADD (0x10+X), F1
                CP A, 10
                JP LT, START
                RAND F0, 0x043A7FD1
                RAND DE
                JP XYZ
                NOP
                BREAK
                DB 0xEE, "ok"
        "#;
        let image = assemble(source).unwrap();
        let listing = disassemble(&image, 0x400);

        assert!(listing.contains("JP LT, 0x000400"));
        assert_eq!(assemble(&listing).unwrap(), image);
    }
}
