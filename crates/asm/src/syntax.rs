use crate::{AssemblyError, ErrorKind};
use wired86_core::cpu::{Reg16, Reg8, SegReg};
use wired86_core::decoder::Width;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispExpr {
    None,
    Number(u16),
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemExpr {
    pub base: Option<Reg16>,
    pub index: Option<Reg16>,
    pub disp: DispExpr,
    /// From a BYTE PTR / WORD PTR override, if any.
    pub size: Option<Width>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandExpr {
    Reg8(Reg8),
    Reg16(Reg16),
    Seg(SegReg),
    Imm(u16),
    /// OFFSET label
    OffsetOf(String),
    /// @DATA (the data segment register value)
    AtData,
    /// Bare label, used as a jump/call target
    Label(String),
    /// SHORT label forces a rel8 jump encoding
    Short(String),
    /// seg:off literal for far JMP/CALL
    Far { segment: u16, offset: u16 },
    Mem(MemExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepPrefix {
    /// REP / REPE / REPZ (0xF3)
    Rep,
    /// REPNE / REPNZ (0xF2)
    Repne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataItem {
    Number(u16),
    /// DW pointer to a label
    Symbol(String),
    /// Quoted string, DB only
    Bytes(Vec<u8>),
    Dup { count: u16, value: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    SegmentData,
    SegmentCode,
    /// Accepted framing with no layout effect (.MODEL, .STACK, ORG, PROC, ENDP)
    Ignored,
    End(Option<String>),
    Data {
        width: Width,
        items: Vec<DataItem>,
    },
    Instr {
        prefix: Option<RepPrefix>,
        mnemonic: String,
        operands: Vec<OperandExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub number: usize,
    pub label: Option<String>,
    pub stmt: Option<Stmt>,
}

fn err(line: usize, kind: ErrorKind) -> AssemblyError {
    AssemblyError { line, kind }
}

/// Strip a trailing `;` comment, honouring single-quoted strings.
fn strip_comment(line: &str) -> &str {
    let mut in_quote = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => return &line[..i],
            _ => {}
        }
    }
    line
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '@' || c == '.'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '@' || c == '.' || c == '$' || c == '?'
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if is_ident_start(c)) && chars.all(is_ident_char)
}

/// `name:` at the start of a line. The colon must follow the identifier
/// directly (modulo spaces), which keeps far pointers like `0010:0005`
/// in operand position unaffected.
fn split_label(text: &str) -> (Option<String>, &str) {
    let trimmed = text.trim_start();
    let ident_len = trimmed.chars().take_while(|c| is_ident_char(*c)).count();
    if ident_len == 0 {
        return (None, text);
    }
    let (ident, rest) = trimmed.split_at(ident_len);
    if !is_ident(ident) {
        return (None, text);
    }
    let after = rest.trim_start();
    if let Some(stripped) = after.strip_prefix(':') {
        (Some(ident.to_string()), stripped)
    } else {
        (None, text)
    }
}

/// Split on top-level commas, honouring quotes and brackets.
fn split_operands(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '[' | '(' if !in_quote => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if !in_quote && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

pub fn parse_number(text: &str) -> Result<u16, ErrorKind> {
    let bad = || ErrorKind::BadNumeric(text.to_string());
    let t = text.trim();

    let (negative, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, t),
    };
    if t.is_empty() {
        return Err(bad());
    }

    // Char literal: 'A'
    if t.len() == 3 && t.starts_with('\'') && t.ends_with('\'') {
        let c = t.as_bytes()[1];
        return Ok(apply_sign(c as u32, negative));
    }

    let value = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| bad())?
    } else if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        u32::from_str_radix(bin, 2).map_err(|_| bad())?
    } else if (t.ends_with('h') || t.ends_with('H')) && t.starts_with(|c: char| c.is_ascii_digit())
    {
        u32::from_str_radix(&t[..t.len() - 1], 16).map_err(|_| bad())?
    } else if (t.ends_with('b') || t.ends_with('B'))
        && t[..t.len() - 1].chars().all(|c| c == '0' || c == '1')
        && t.len() > 1
    {
        u32::from_str_radix(&t[..t.len() - 1], 2).map_err(|_| bad())?
    } else {
        t.parse::<u32>().map_err(|_| bad())?
    };

    if value > 0xFFFF {
        return Err(bad());
    }
    Ok(apply_sign(value, negative))
}

fn apply_sign(value: u32, negative: bool) -> u16 {
    if negative {
        (value as u16).wrapping_neg()
    } else {
        value as u16
    }
}

fn parse_reg16(name: &str) -> Option<Reg16> {
    match name {
        "AX" => Some(Reg16::AX),
        "BX" => Some(Reg16::BX),
        "CX" => Some(Reg16::CX),
        "DX" => Some(Reg16::DX),
        "SP" => Some(Reg16::SP),
        "BP" => Some(Reg16::BP),
        "SI" => Some(Reg16::SI),
        "DI" => Some(Reg16::DI),
        _ => None,
    }
}

fn parse_reg8(name: &str) -> Option<Reg8> {
    match name {
        "AL" => Some(Reg8::AL),
        "CL" => Some(Reg8::CL),
        "DL" => Some(Reg8::DL),
        "BL" => Some(Reg8::BL),
        "AH" => Some(Reg8::AH),
        "CH" => Some(Reg8::CH),
        "DH" => Some(Reg8::DH),
        "BH" => Some(Reg8::BH),
        _ => None,
    }
}

fn parse_seg(name: &str) -> Option<SegReg> {
    match name {
        "ES" => Some(SegReg::ES),
        "CS" => Some(SegReg::CS),
        "SS" => Some(SegReg::SS),
        "DS" => Some(SegReg::DS),
        _ => None,
    }
}

fn parse_mem(text: &str) -> Result<MemExpr, ErrorKind> {
    let inner = &text[1..text.len() - 1];
    let mut mem = MemExpr {
        base: None,
        index: None,
        disp: DispExpr::None,
        size: None,
    };

    // Terms separated by + or -, sign attaching to the following term
    let mut terms: Vec<(bool, String)> = Vec::new();
    let mut current = String::new();
    let mut negative = false;
    for c in inner.chars() {
        match c {
            '+' | '-' => {
                if !current.trim().is_empty() {
                    terms.push((negative, current.trim().to_string()));
                }
                current = String::new();
                negative = c == '-';
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        terms.push((negative, current.trim().to_string()));
    }
    if terms.is_empty() {
        return Err(ErrorKind::BadOperand(text.to_string()));
    }

    for (neg, term) in terms {
        let upper = term.to_ascii_uppercase();
        if let Some(reg) = parse_reg16(&upper) {
            if neg {
                return Err(ErrorKind::BadOperand(text.to_string()));
            }
            match reg {
                Reg16::BX | Reg16::BP => {
                    if mem.base.is_some() {
                        return Err(ErrorKind::BadOperand(text.to_string()));
                    }
                    mem.base = Some(reg);
                }
                Reg16::SI | Reg16::DI => {
                    if mem.index.is_some() {
                        return Err(ErrorKind::BadOperand(text.to_string()));
                    }
                    mem.index = Some(reg);
                }
                _ => return Err(ErrorKind::BadOperand(text.to_string())),
            }
        } else if let Ok(value) = parse_number(&term) {
            let value = if neg { value.wrapping_neg() } else { value };
            mem.disp = match mem.disp {
                DispExpr::None => DispExpr::Number(value),
                DispExpr::Number(prev) => DispExpr::Number(prev.wrapping_add(value)),
                DispExpr::Symbol(_) => return Err(ErrorKind::BadOperand(text.to_string())),
            };
        } else if is_ident(&term) && !neg {
            if mem.disp != DispExpr::None {
                return Err(ErrorKind::BadOperand(text.to_string()));
            }
            mem.disp = DispExpr::Symbol(term);
        } else {
            return Err(ErrorKind::BadOperand(text.to_string()));
        }
    }

    Ok(mem)
}

fn parse_operand(text: &str) -> Result<OperandExpr, ErrorKind> {
    let t = text.trim();
    let upper = t.to_ascii_uppercase();

    // Size override in front of a memory reference
    for (keyword, width) in [("BYTE PTR", Width::Byte), ("WORD PTR", Width::Word)] {
        if let Some(rest) = upper.strip_prefix(keyword) {
            let rest = &t[t.len() - rest.len()..];
            let operand = parse_operand(rest)?;
            return match operand {
                OperandExpr::Mem(mut mem) => {
                    mem.size = Some(width);
                    Ok(OperandExpr::Mem(mem))
                }
                _ => Err(ErrorKind::BadOperand(t.to_string())),
            };
        }
    }

    if t.starts_with('[') && t.ends_with(']') {
        return Ok(OperandExpr::Mem(parse_mem(t)?));
    }

    if let Some(rest) = upper.strip_prefix("OFFSET ") {
        let name = t[t.len() - rest.len()..].trim();
        if !is_ident(name) {
            return Err(ErrorKind::BadOperand(t.to_string()));
        }
        return Ok(OperandExpr::OffsetOf(name.to_string()));
    }

    if let Some(rest) = upper.strip_prefix("SHORT ") {
        let name = t[t.len() - rest.len()..].trim();
        if !is_ident(name) {
            return Err(ErrorKind::BadOperand(t.to_string()));
        }
        return Ok(OperandExpr::Short(name.to_string()));
    }

    if upper == "@DATA" {
        return Ok(OperandExpr::AtData);
    }

    if let Some(reg) = parse_reg8(&upper) {
        return Ok(OperandExpr::Reg8(reg));
    }
    if let Some(reg) = parse_reg16(&upper) {
        return Ok(OperandExpr::Reg16(reg));
    }
    if let Some(seg) = parse_seg(&upper) {
        return Ok(OperandExpr::Seg(seg));
    }

    // seg:off far pointer literal
    if let Some((seg_text, off_text)) = t.split_once(':') {
        if let (Ok(segment), Ok(offset)) = (parse_number(seg_text), parse_number(off_text)) {
            return Ok(OperandExpr::Far { segment, offset });
        }
    }

    if let Ok(value) = parse_number(t) {
        return Ok(OperandExpr::Imm(value));
    }

    if is_ident(t) {
        return Ok(OperandExpr::Label(t.to_string()));
    }

    Err(ErrorKind::BadOperand(t.to_string()))
}

fn parse_data_items(width: Width, text: &str) -> Result<Vec<DataItem>, ErrorKind> {
    let mut items = Vec::new();
    for part in split_operands(text) {
        let upper = part.to_ascii_uppercase();

        if part.starts_with('\'') && part.ends_with('\'') && part.len() >= 2 {
            if width != Width::Byte {
                return Err(ErrorKind::BadOperand(part));
            }
            items.push(DataItem::Bytes(part[1..part.len() - 1].as_bytes().to_vec()));
            continue;
        }

        if part == "?" {
            items.push(DataItem::Number(0));
            continue;
        }

        // N DUP(expr)
        if let Some(pos) = upper.find(" DUP") {
            let count = parse_number(&part[..pos])?;
            let after = part[pos + 4..].trim();
            if !after.starts_with('(') || !after.ends_with(')') {
                return Err(ErrorKind::BadOperand(part.clone()));
            }
            let inner = after[1..after.len() - 1].trim();
            let value = if inner == "?" { 0 } else { parse_number(inner)? };
            items.push(DataItem::Dup { count, value });
            continue;
        }

        if let Ok(value) = parse_number(&part) {
            items.push(DataItem::Number(value));
            continue;
        }

        if is_ident(&part) {
            if width != Width::Word {
                return Err(ErrorKind::BadOperand(part));
            }
            items.push(DataItem::Symbol(part));
            continue;
        }

        return Err(ErrorKind::BadOperand(part));
    }

    if items.is_empty() {
        return Err(ErrorKind::BadOperand(text.to_string()));
    }
    Ok(items)
}

fn rep_prefix(mnemonic: &str) -> Option<RepPrefix> {
    match mnemonic {
        "REP" | "REPE" | "REPZ" => Some(RepPrefix::Rep),
        "REPNE" | "REPNZ" => Some(RepPrefix::Repne),
        _ => None,
    }
}

pub fn parse(source: &str) -> Result<Vec<SourceLine>, AssemblyError> {
    let mut lines = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let number = index + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }

        let (label, rest) = split_label(text);
        let rest = rest.trim();
        if rest.is_empty() {
            if label.is_some() {
                lines.push(SourceLine {
                    number,
                    label,
                    stmt: None,
                });
            }
            continue;
        }

        let mut tokens = rest.splitn(2, char::is_whitespace);
        let first = tokens.next().unwrap_or_default();
        let first_upper = first.to_ascii_uppercase();
        let args = tokens.next().unwrap_or("").trim();

        // `name DB ...`, `name DW ...`, `name PROC` define a label
        // without a colon
        if label.is_none() && is_ident(first) {
            let mut follow = args.splitn(2, char::is_whitespace);
            let second = follow.next().unwrap_or_default().to_ascii_uppercase();
            let follow_args = follow.next().unwrap_or("").trim();
            match second.as_str() {
                "DB" | "DW" => {
                    let width = if second == "DB" { Width::Byte } else { Width::Word };
                    let items = parse_data_items(width, follow_args)
                        .map_err(|kind| err(number, kind))?;
                    lines.push(SourceLine {
                        number,
                        label: Some(first.to_string()),
                        stmt: Some(Stmt::Data { width, items }),
                    });
                    continue;
                }
                "PROC" => {
                    lines.push(SourceLine {
                        number,
                        label: Some(first.to_string()),
                        stmt: Some(Stmt::Ignored),
                    });
                    continue;
                }
                "ENDP" => {
                    lines.push(SourceLine {
                        number,
                        label: None,
                        stmt: Some(Stmt::Ignored),
                    });
                    continue;
                }
                _ => {}
            }
        }

        let stmt = match first_upper.as_str() {
            ".MODEL" | ".STACK" => Stmt::Ignored,
            ".DATA" => Stmt::SegmentData,
            ".CODE" => Stmt::SegmentCode,
            "SECTION" => match args.to_ascii_lowercase().as_str() {
                ".data" => Stmt::SegmentData,
                ".code" | ".text" => Stmt::SegmentCode,
                other => return Err(err(number, ErrorKind::BadDirective(other.to_string()))),
            },
            "ORG" => {
                // Accepted for NASM-style framing; the image layout is fixed
                parse_number(args).map_err(|kind| err(number, kind))?;
                Stmt::Ignored
            }
            "END" => {
                let entry = if args.is_empty() {
                    None
                } else if is_ident(args) {
                    Some(args.to_string())
                } else {
                    return Err(err(number, ErrorKind::BadOperand(args.to_string())));
                };
                Stmt::End(entry)
            }
            "ENDP" | "PROC" => Stmt::Ignored,
            "DB" | "DW" => {
                let width = if first_upper == "DB" { Width::Byte } else { Width::Word };
                let items =
                    parse_data_items(width, args).map_err(|kind| err(number, kind))?;
                Stmt::Data { width, items }
            }
            _ if first_upper.starts_with('.') => {
                return Err(err(number, ErrorKind::BadDirective(first.to_string())))
            }
            _ => {
                let (prefix, mnemonic, args) = match rep_prefix(&first_upper) {
                    Some(prefix) => {
                        let mut follow = args.splitn(2, char::is_whitespace);
                        let mn = follow.next().unwrap_or_default().to_ascii_uppercase();
                        if mn.is_empty() {
                            return Err(err(
                                number,
                                ErrorKind::BadOperand(first.to_string()),
                            ));
                        }
                        (Some(prefix), mn, follow.next().unwrap_or("").trim())
                    }
                    None => (None, first_upper.clone(), args),
                };

                let mut operands = Vec::new();
                for part in split_operands(args) {
                    operands.push(parse_operand(&part).map_err(|kind| err(number, kind))?);
                }
                Stmt::Instr {
                    prefix,
                    mnemonic,
                    operands,
                }
            }
        };

        lines.push(SourceLine {
            number,
            label,
            stmt: Some(stmt),
        });
    }

    Ok(lines)
}
