// Wired86 - 8086 Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::syntax::{DispExpr, MemExpr, OperandExpr as O, RepPrefix};
use crate::ErrorKind;
use wired86_core::cpu::{Reg16, Reg8, SegReg};
use wired86_core::decoder::Width;
use wired86_core::memory::{SegmentKind, Symbol, DATA_SEGMENT};

/// Symbol lookup for operand resolution. Pass 1 sizes instructions with
/// placeholder offsets (`strict` off skips jump range checks); pass 2
/// resolves against the real table.
pub(crate) trait Resolve {
    fn lookup(&self, name: &str) -> Result<Symbol, ErrorKind>;

    fn strict(&self) -> bool {
        true
    }
}

fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    (mode << 6) | (reg << 3) | rm
}

fn bad(msg: impl Into<String>) -> ErrorKind {
    ErrorKind::BadOperand(msg.into())
}

/// Immediate-kind operands: numeric literals, OFFSET label, @DATA.
fn imm_of(op: &O, resolve: &dyn Resolve) -> Option<Result<u16, ErrorKind>> {
    match op {
        O::Imm(v) => Some(Ok(*v)),
        O::OffsetOf(name) => Some(resolve.lookup(name).map(|s| s.offset)),
        O::AtData => Some(Ok(DATA_SEGMENT)),
        _ => None,
    }
}

fn is_imm(op: &O) -> bool {
    matches!(op, O::Imm(_) | O::OffsetOf(_) | O::AtData)
}

fn imm8_checked(value: u16) -> Result<u8, ErrorKind> {
    // Accept plain bytes and sign-extended negatives
    if value <= 0xFF || value >= 0xFF00 {
        Ok(value as u8)
    } else {
        Err(bad(format!("immediate {:#06x} does not fit in a byte", value)))
    }
}

fn mem_width(m: &MemExpr, default: Width) -> Width {
    m.size.unwrap_or(default)
}

/// ModR/M byte plus displacement for a memory operand. The encoding is
/// chosen from operand kinds alone so pass-1 sizes never shift: any
/// syntactic displacement gets the disp16 form regardless of its value.
fn mem_bytes(
    reg_field: u8,
    m: &MemExpr,
    resolve: &dyn Resolve,
    out: &mut Vec<u8>,
) -> Result<(), ErrorKind> {
    let disp = match &m.disp {
        DispExpr::None => None,
        DispExpr::Number(v) => Some(*v),
        DispExpr::Symbol(name) => Some(resolve.lookup(name)?.offset),
    };

    let rm = match (m.base, m.index) {
        (Some(Reg16::BX), Some(Reg16::SI)) => 0,
        (Some(Reg16::BX), Some(Reg16::DI)) => 1,
        (Some(Reg16::BP), Some(Reg16::SI)) => 2,
        (Some(Reg16::BP), Some(Reg16::DI)) => 3,
        (None, Some(Reg16::SI)) => 4,
        (None, Some(Reg16::DI)) => 5,
        (Some(Reg16::BP), None) => 6,
        (Some(Reg16::BX), None) => 7,
        (None, None) => {
            let disp = disp.unwrap_or(0);
            out.push(modrm(0b00, reg_field, 0b110));
            out.extend_from_slice(&disp.to_le_bytes());
            return Ok(());
        }
        _ => return Err(bad("illegal base/index combination")),
    };

    match disp {
        // [BP] has no displacement-free form
        None if rm == 6 => {
            out.push(modrm(0b01, reg_field, rm));
            out.push(0);
        }
        None => out.push(modrm(0b00, reg_field, rm)),
        Some(d) => {
            out.push(modrm(0b10, reg_field, rm));
            out.extend_from_slice(&d.to_le_bytes());
        }
    }
    Ok(())
}

fn code_target(name: &str, resolve: &dyn Resolve) -> Result<u16, ErrorKind> {
    let sym = resolve.lookup(name)?;
    match sym.segment {
        SegmentKind::Code => Ok(sym.offset),
        SegmentKind::Data => Err(bad(format!("`{}` is not a code label", name))),
    }
}

fn rel8(target: u16, next_ip: u16, strict: bool) -> Result<u8, ErrorKind> {
    let disp = target.wrapping_sub(next_ip) as i16;
    if strict && !(-128..=127).contains(&disp) {
        return Err(ErrorKind::JumpOutOfRange(disp as i32));
    }
    Ok(disp as u8)
}

fn rel16(target: u16, next_ip: u16) -> [u8; 2] {
    target.wrapping_sub(next_ip).to_le_bytes()
}

fn jcc_opcode(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "JO" => 0x70,
        "JNO" => 0x71,
        "JB" | "JC" | "JNAE" => 0x72,
        "JAE" | "JNB" | "JNC" => 0x73,
        "JE" | "JZ" => 0x74,
        "JNE" | "JNZ" => 0x75,
        "JBE" | "JNA" => 0x76,
        "JA" | "JNBE" => 0x77,
        "JS" => 0x78,
        "JNS" => 0x79,
        "JP" | "JPE" => 0x7A,
        "JNP" | "JPO" => 0x7B,
        "JL" | "JNGE" => 0x7C,
        "JGE" | "JNL" => 0x7D,
        "JLE" | "JNG" => 0x7E,
        "JG" | "JNLE" => 0x7F,
        "JCXZ" => 0xE3,
        "LOOP" => 0xE2,
        "LOOPE" | "LOOPZ" => 0xE1,
        "LOOPNE" | "LOOPNZ" => 0xE0,
        _ => return None,
    })
}

fn string_opcode(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "MOVSB" => 0xA4,
        "MOVSW" => 0xA5,
        "CMPSB" => 0xA6,
        "CMPSW" => 0xA7,
        "STOSB" => 0xAA,
        "STOSW" => 0xAB,
        "LODSB" => 0xAC,
        "LODSW" => 0xAD,
        "SCASB" => 0xAE,
        "SCASW" => 0xAF,
        _ => return None,
    })
}

fn no_operand_opcode(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "NOP" => 0x90,
        "HLT" => 0xF4,
        "PUSHF" => 0x9C,
        "POPF" => 0x9D,
        "SAHF" => 0x9E,
        "LAHF" => 0x9F,
        "CBW" => 0x98,
        "CWD" => 0x99,
        "CLC" => 0xF8,
        "STC" => 0xF9,
        "CMC" => 0xF5,
        "CLI" => 0xFA,
        "STI" => 0xFB,
        "CLD" => 0xFC,
        "STD" => 0xFD,
        "IRET" => 0xCF,
        _ => return None,
    })
}

fn alu_bytes(
    base: u8,
    group: u8,
    operands: &[O],
    resolve: &dyn Resolve,
) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::new();
    match operands {
        [O::Reg8(Reg8::AL), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(base + 4);
            out.push(imm8_checked(v)?);
        }
        [O::Reg16(Reg16::AX), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(base + 5);
            out.extend_from_slice(&v.to_le_bytes());
        }
        [O::Reg8(d), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(0x80);
            out.push(modrm(0b11, group, d.index()));
            out.push(imm8_checked(v)?);
        }
        [O::Reg16(d), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(0x81);
            out.push(modrm(0b11, group, d.index()));
            out.extend_from_slice(&v.to_le_bytes());
        }
        [O::Mem(m), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            match mem_width(m, Width::Word) {
                Width::Byte => {
                    out.push(0x80);
                    mem_bytes(group, m, resolve, &mut out)?;
                    out.push(imm8_checked(v)?);
                }
                Width::Word => {
                    out.push(0x81);
                    mem_bytes(group, m, resolve, &mut out)?;
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        [O::Reg8(d), O::Reg8(s)] => {
            out.push(base + 2);
            out.push(modrm(0b11, d.index(), s.index()));
        }
        [O::Reg16(d), O::Reg16(s)] => {
            out.push(base + 3);
            out.push(modrm(0b11, d.index(), s.index()));
        }
        [O::Reg8(d), O::Mem(m)] => {
            out.push(base + 2);
            mem_bytes(d.index(), m, resolve, &mut out)?;
        }
        [O::Reg16(d), O::Mem(m)] => {
            out.push(base + 3);
            mem_bytes(d.index(), m, resolve, &mut out)?;
        }
        [O::Mem(m), O::Reg8(s)] => {
            out.push(base);
            mem_bytes(s.index(), m, resolve, &mut out)?;
        }
        [O::Mem(m), O::Reg16(s)] => {
            out.push(base + 1);
            mem_bytes(s.index(), m, resolve, &mut out)?;
        }
        _ => return Err(bad("unsupported operand combination")),
    }
    Ok(out)
}

fn mov_bytes(operands: &[O], resolve: &dyn Resolve) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::new();
    match operands {
        [O::Seg(s), O::Reg16(r)] => {
            out.push(0x8E);
            out.push(modrm(0b11, s.index(), r.index()));
        }
        [O::Seg(s), O::Mem(m)] => {
            out.push(0x8E);
            mem_bytes(s.index(), m, resolve, &mut out)?;
        }
        [O::Reg16(r), O::Seg(s)] => {
            out.push(0x8C);
            out.push(modrm(0b11, s.index(), r.index()));
        }
        [O::Mem(m), O::Seg(s)] => {
            out.push(0x8C);
            mem_bytes(s.index(), m, resolve, &mut out)?;
        }
        [O::Reg8(r), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(0xB0 + r.index());
            out.push(imm8_checked(v)?);
        }
        [O::Reg16(r), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(0xB8 + r.index());
            out.extend_from_slice(&v.to_le_bytes());
        }
        [O::Reg8(d), O::Reg8(s)] => {
            out.push(0x8A);
            out.push(modrm(0b11, d.index(), s.index()));
        }
        [O::Reg16(d), O::Reg16(s)] => {
            out.push(0x8B);
            out.push(modrm(0b11, d.index(), s.index()));
        }
        [O::Reg8(d), O::Mem(m)] => {
            out.push(0x8A);
            mem_bytes(d.index(), m, resolve, &mut out)?;
        }
        [O::Reg16(d), O::Mem(m)] => {
            out.push(0x8B);
            mem_bytes(d.index(), m, resolve, &mut out)?;
        }
        [O::Mem(m), O::Reg8(s)] => {
            out.push(0x88);
            mem_bytes(s.index(), m, resolve, &mut out)?;
        }
        [O::Mem(m), O::Reg16(s)] => {
            out.push(0x89);
            mem_bytes(s.index(), m, resolve, &mut out)?;
        }
        [O::Mem(m), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            match mem_width(m, Width::Word) {
                Width::Byte => {
                    out.push(0xC6);
                    mem_bytes(0, m, resolve, &mut out)?;
                    out.push(imm8_checked(v)?);
                }
                Width::Word => {
                    out.push(0xC7);
                    mem_bytes(0, m, resolve, &mut out)?;
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        _ => return Err(bad("unsupported MOV operands")),
    }
    Ok(out)
}

fn test_bytes(operands: &[O], resolve: &dyn Resolve) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::new();
    match operands {
        [O::Reg8(Reg8::AL), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(0xA8);
            out.push(imm8_checked(v)?);
        }
        [O::Reg16(Reg16::AX), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(0xA9);
            out.extend_from_slice(&v.to_le_bytes());
        }
        [O::Reg8(d), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(0xF6);
            out.push(modrm(0b11, 0, d.index()));
            out.push(imm8_checked(v)?);
        }
        [O::Reg16(d), src] if is_imm(src) => {
            let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
            out.push(0xF7);
            out.push(modrm(0b11, 0, d.index()));
            out.extend_from_slice(&v.to_le_bytes());
        }
        [O::Reg8(a), O::Reg8(b)] => {
            out.push(0x84);
            out.push(modrm(0b11, b.index(), a.index()));
        }
        [O::Reg16(a), O::Reg16(b)] => {
            out.push(0x85);
            out.push(modrm(0b11, b.index(), a.index()));
        }
        [O::Mem(m), O::Reg8(r)] | [O::Reg8(r), O::Mem(m)] => {
            out.push(0x84);
            mem_bytes(r.index(), m, resolve, &mut out)?;
        }
        [O::Mem(m), O::Reg16(r)] | [O::Reg16(r), O::Mem(m)] => {
            out.push(0x85);
            mem_bytes(r.index(), m, resolve, &mut out)?;
        }
        _ => return Err(bad("unsupported TEST operands")),
    }
    Ok(out)
}

fn xchg_bytes(operands: &[O], resolve: &dyn Resolve) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::new();
    match operands {
        [O::Reg16(Reg16::AX), O::Reg16(r)] | [O::Reg16(r), O::Reg16(Reg16::AX)] => {
            out.push(0x90 + r.index());
        }
        [O::Reg8(a), O::Reg8(b)] => {
            out.push(0x86);
            out.push(modrm(0b11, b.index(), a.index()));
        }
        [O::Reg16(a), O::Reg16(b)] => {
            out.push(0x87);
            out.push(modrm(0b11, b.index(), a.index()));
        }
        [O::Mem(m), O::Reg8(r)] | [O::Reg8(r), O::Mem(m)] => {
            out.push(0x86);
            mem_bytes(r.index(), m, resolve, &mut out)?;
        }
        [O::Mem(m), O::Reg16(r)] | [O::Reg16(r), O::Mem(m)] => {
            out.push(0x87);
            mem_bytes(r.index(), m, resolve, &mut out)?;
        }
        _ => return Err(bad("unsupported XCHG operands")),
    }
    Ok(out)
}

fn group3_bytes(
    group: u8,
    operands: &[O],
    resolve: &dyn Resolve,
) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::new();
    match operands {
        [O::Reg8(r)] => {
            out.push(0xF6);
            out.push(modrm(0b11, group, r.index()));
        }
        [O::Reg16(r)] => {
            out.push(0xF7);
            out.push(modrm(0b11, group, r.index()));
        }
        [O::Mem(m)] => {
            out.push(match mem_width(m, Width::Word) {
                Width::Byte => 0xF6,
                Width::Word => 0xF7,
            });
            mem_bytes(group, m, resolve, &mut out)?;
        }
        _ => return Err(bad("expected a single register or memory operand")),
    }
    Ok(out)
}

fn incdec_bytes(
    group: u8,
    short_base: u8,
    operands: &[O],
    resolve: &dyn Resolve,
) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::new();
    match operands {
        [O::Reg16(r)] => out.push(short_base + r.index()),
        [O::Reg8(r)] => {
            out.push(0xFE);
            out.push(modrm(0b11, group, r.index()));
        }
        [O::Mem(m)] => {
            out.push(match mem_width(m, Width::Word) {
                Width::Byte => 0xFE,
                Width::Word => 0xFF,
            });
            mem_bytes(group, m, resolve, &mut out)?;
        }
        _ => return Err(bad("expected a single register or memory operand")),
    }
    Ok(out)
}

fn shift_bytes(
    group: u8,
    operands: &[O],
    resolve: &dyn Resolve,
) -> Result<Vec<u8>, ErrorKind> {
    let mut out = Vec::new();
    let (dst, by_cl) = match operands {
        [dst, O::Imm(1)] => (dst, false),
        [dst, O::Reg8(Reg8::CL)] => (dst, true),
        [_, O::Imm(_)] => return Err(bad("shift count must be 1 or CL")),
        _ => return Err(bad("unsupported shift operands")),
    };
    let cl_bit = if by_cl { 2 } else { 0 };
    match dst {
        O::Reg8(r) => {
            out.push(0xD0 + cl_bit);
            out.push(modrm(0b11, group, r.index()));
        }
        O::Reg16(r) => {
            out.push(0xD1 + cl_bit);
            out.push(modrm(0b11, group, r.index()));
        }
        O::Mem(m) => {
            out.push(match mem_width(m, Width::Word) {
                Width::Byte => 0xD0 + cl_bit,
                Width::Word => 0xD1 + cl_bit,
            });
            mem_bytes(group, m, resolve, &mut out)?;
        }
        _ => return Err(bad("unsupported shift destination")),
    }
    Ok(out)
}

/// Encode one instruction at `at_offset` within the code segment.
/// Encoding length depends only on operand kinds, never their values,
/// so pass-1 sizing with placeholder symbols is exact.
pub(crate) fn instruction_bytes(
    mnemonic: &str,
    prefix: Option<RepPrefix>,
    operands: &[O],
    at_offset: u16,
    resolve: &dyn Resolve,
) -> Result<Vec<u8>, ErrorKind> {
    if let Some(prefix) = prefix {
        let op = string_opcode(mnemonic)
            .ok_or_else(|| bad(format!("`{}` cannot take a REP prefix", mnemonic)))?;
        if !operands.is_empty() {
            return Err(bad("string instructions take no operands"));
        }
        let byte = match prefix {
            RepPrefix::Rep => 0xF3,
            RepPrefix::Repne => 0xF2,
        };
        return Ok(vec![byte, op]);
    }

    if operands.is_empty() {
        if let Some(op) = no_operand_opcode(mnemonic).or_else(|| string_opcode(mnemonic)) {
            return Ok(vec![op]);
        }
        if mnemonic == "RET" {
            return Ok(vec![0xC3]);
        }
        if mnemonic == "RETF" {
            return Ok(vec![0xCB]);
        }
    }

    if let Some(opcode) = jcc_opcode(mnemonic) {
        return match operands {
            [O::Label(name)] | [O::Short(name)] => {
                let target = code_target(name, resolve)?;
                let rel = rel8(target, at_offset.wrapping_add(2), resolve.strict())?;
                Ok(vec![opcode, rel])
            }
            _ => Err(bad("expected a label operand")),
        };
    }

    match mnemonic {
        "MOV" => mov_bytes(operands, resolve),
        "ADD" => alu_bytes(0x00, 0, operands, resolve),
        "OR" => alu_bytes(0x08, 1, operands, resolve),
        "ADC" => alu_bytes(0x10, 2, operands, resolve),
        "SBB" => alu_bytes(0x18, 3, operands, resolve),
        "AND" => alu_bytes(0x20, 4, operands, resolve),
        "SUB" => alu_bytes(0x28, 5, operands, resolve),
        "XOR" => alu_bytes(0x30, 6, operands, resolve),
        "CMP" => alu_bytes(0x38, 7, operands, resolve),
        "TEST" => test_bytes(operands, resolve),
        "XCHG" => xchg_bytes(operands, resolve),
        "NOT" => group3_bytes(2, operands, resolve),
        "NEG" => group3_bytes(3, operands, resolve),
        "MUL" => group3_bytes(4, operands, resolve),
        "IMUL" => group3_bytes(5, operands, resolve),
        "DIV" => group3_bytes(6, operands, resolve),
        "IDIV" => group3_bytes(7, operands, resolve),
        "INC" => incdec_bytes(0, 0x40, operands, resolve),
        "DEC" => incdec_bytes(1, 0x48, operands, resolve),
        "ROL" => shift_bytes(0, operands, resolve),
        "ROR" => shift_bytes(1, operands, resolve),
        "RCL" => shift_bytes(2, operands, resolve),
        "RCR" => shift_bytes(3, operands, resolve),
        "SHL" | "SAL" => shift_bytes(4, operands, resolve),
        "SHR" => shift_bytes(5, operands, resolve),
        "SAR" => shift_bytes(7, operands, resolve),

        "LEA" => match operands {
            [O::Reg16(r), O::Mem(m)] => {
                let mut out = vec![0x8D];
                mem_bytes(r.index(), m, resolve, &mut out)?;
                Ok(out)
            }
            _ => Err(bad("LEA expects a 16-bit register and a memory operand")),
        },

        "PUSH" => match operands {
            [O::Reg16(r)] => Ok(vec![0x50 + r.index()]),
            [O::Seg(s)] => Ok(vec![match s {
                SegReg::ES => 0x06,
                SegReg::CS => 0x0E,
                SegReg::SS => 0x16,
                SegReg::DS => 0x1E,
            }]),
            [O::Mem(m)] => {
                let mut out = vec![0xFF];
                mem_bytes(6, m, resolve, &mut out)?;
                Ok(out)
            }
            [src] if is_imm(src) => {
                let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
                let mut out = vec![0x68];
                out.extend_from_slice(&v.to_le_bytes());
                Ok(out)
            }
            _ => Err(bad("unsupported PUSH operand")),
        },
        "POP" => match operands {
            [O::Reg16(r)] => Ok(vec![0x58 + r.index()]),
            [O::Seg(SegReg::CS)] => Err(bad("POP CS is not encodable")),
            [O::Seg(s)] => Ok(vec![match s {
                SegReg::ES => 0x07,
                SegReg::SS => 0x17,
                SegReg::DS => 0x1F,
                SegReg::CS => 0,
            }]),
            _ => Err(bad("unsupported POP operand")),
        },

        "JMP" => match operands {
            [O::Label(name)] => {
                let target = code_target(name, resolve)?;
                let mut out = vec![0xE9];
                out.extend_from_slice(&rel16(target, at_offset.wrapping_add(3)));
                Ok(out)
            }
            [O::Short(name)] => {
                let target = code_target(name, resolve)?;
                Ok(vec![
                    0xEB,
                    rel8(target, at_offset.wrapping_add(2), resolve.strict())?,
                ])
            }
            [O::Far { segment, offset }] => {
                let mut out = vec![0xEA];
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(&segment.to_le_bytes());
                Ok(out)
            }
            _ => Err(bad("unsupported JMP target")),
        },
        "CALL" => match operands {
            [O::Label(name)] => {
                let target = code_target(name, resolve)?;
                let mut out = vec![0xE8];
                out.extend_from_slice(&rel16(target, at_offset.wrapping_add(3)));
                Ok(out)
            }
            [O::Far { segment, offset }] => {
                let mut out = vec![0x9A];
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(&segment.to_le_bytes());
                Ok(out)
            }
            _ => Err(bad("unsupported CALL target")),
        },
        "RET" => match operands {
            [src] if is_imm(src) => {
                let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
                let mut out = vec![0xC2];
                out.extend_from_slice(&v.to_le_bytes());
                Ok(out)
            }
            _ => Err(bad("unsupported RET operand")),
        },
        "RETF" => match operands {
            [src] if is_imm(src) => {
                let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
                let mut out = vec![0xCA];
                out.extend_from_slice(&v.to_le_bytes());
                Ok(out)
            }
            _ => Err(bad("unsupported RETF operand")),
        },

        "INT" => match operands {
            [src] if is_imm(src) => {
                let v = imm_of(src, resolve).unwrap_or(Ok(0))?;
                Ok(vec![0xCD, imm8_checked(v)?])
            }
            _ => Err(bad("INT expects an interrupt number")),
        },

        other => Err(ErrorKind::UnknownMnemonic(other.to_string())),
    }
}
