pub mod syntax;

mod encode;

use encode::Resolve;
use std::collections::HashMap;
use syntax::{DataItem, Stmt};
use wired86_core::decoder::Width;
use wired86_core::memory::{Program, SegmentKind, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct AssemblyError {
    pub line: usize,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("bad operand: {0}")]
    BadOperand(String),
    #[error("duplicate label `{0}`")]
    DuplicateLabel(String),
    #[error("undefined label `{0}`")]
    UndefinedLabel(String),
    #[error("jump target out of range ({0} bytes)")]
    JumpOutOfRange(i32),
    #[error("bad directive: {0}")]
    BadDirective(String),
    #[error("bad numeric literal `{0}`")]
    BadNumeric(String),
}

fn err(line: usize, kind: ErrorKind) -> AssemblyError {
    AssemblyError { line, kind }
}

/// Pass-1 resolver: any symbol resolves to a placeholder so instruction
/// sizes come out right without the finished table.
struct Placeholder;

impl Resolve for Placeholder {
    fn lookup(&self, _name: &str) -> Result<Symbol, ErrorKind> {
        Ok(Symbol {
            name: String::new(),
            segment: SegmentKind::Code,
            offset: 0,
        })
    }

    fn strict(&self) -> bool {
        false
    }
}

struct Table<'a> {
    symbols: &'a HashMap<String, Symbol>,
}

impl Resolve for Table<'_> {
    fn lookup(&self, name: &str) -> Result<Symbol, ErrorKind> {
        self.symbols
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ErrorKind::UndefinedLabel(name.to_string()))
    }
}

fn data_size(width: Width, items: &[DataItem]) -> u16 {
    let unit = match width {
        Width::Byte => 1u16,
        Width::Word => 2,
    };
    items
        .iter()
        .map(|item| match item {
            DataItem::Bytes(bytes) => bytes.len() as u16,
            DataItem::Dup { count, .. } => count.wrapping_mul(unit),
            _ => unit,
        })
        .fold(0u16, u16::wrapping_add)
}

fn emit_data(
    width: Width,
    items: &[DataItem],
    resolve: &dyn Resolve,
    out: &mut Vec<u8>,
) -> Result<(), ErrorKind> {
    for item in items {
        match item {
            DataItem::Bytes(bytes) => out.extend_from_slice(bytes),
            DataItem::Number(v) => match width {
                Width::Byte => out.push(*v as u8),
                Width::Word => out.extend_from_slice(&v.to_le_bytes()),
            },
            DataItem::Symbol(name) => {
                let offset = resolve.lookup(name)?.offset;
                out.extend_from_slice(&offset.to_le_bytes());
            }
            DataItem::Dup { count, value } => {
                for _ in 0..*count {
                    match width {
                        Width::Byte => out.push(*value as u8),
                        Width::Word => out.extend_from_slice(&value.to_le_bytes()),
                    }
                }
            }
        }
    }
    Ok(())
}

/// Two-pass assembly: pass 1 walks the lines recording labels and
/// sizing instructions from operand kinds (forward references resolve
/// to placeholders), pass 2 emits bytes against the finished table.
pub fn assemble(source: &str) -> Result<Program, AssemblyError> {
    let lines = syntax::parse(source)?;

    let mut symbols: HashMap<String, Symbol> = HashMap::new();
    let mut entry: Option<(usize, String)> = None;

    // Pass 1
    let mut segment = SegmentKind::Code;
    let mut code_len: u16 = 0;
    let mut data_len: u16 = 0;
    for line in &lines {
        if let Some(label) = &line.label {
            let key = label.to_ascii_lowercase();
            if symbols.contains_key(&key) {
                return Err(err(line.number, ErrorKind::DuplicateLabel(label.clone())));
            }
            let offset = match segment {
                SegmentKind::Code => code_len,
                SegmentKind::Data => data_len,
            };
            symbols.insert(
                key,
                Symbol {
                    name: label.clone(),
                    segment,
                    offset,
                },
            );
        }

        match &line.stmt {
            None | Some(Stmt::Ignored) => {}
            Some(Stmt::SegmentData) => segment = SegmentKind::Data,
            Some(Stmt::SegmentCode) => segment = SegmentKind::Code,
            Some(Stmt::End(label)) => {
                if let Some(label) = label {
                    entry = Some((line.number, label.clone()));
                }
            }
            Some(Stmt::Data { width, items }) => {
                let size = data_size(*width, items);
                match segment {
                    SegmentKind::Code => code_len = code_len.wrapping_add(size),
                    SegmentKind::Data => data_len = data_len.wrapping_add(size),
                }
            }
            Some(Stmt::Instr {
                prefix,
                mnemonic,
                operands,
            }) => {
                if segment != SegmentKind::Code {
                    return Err(err(
                        line.number,
                        ErrorKind::BadDirective("instruction outside the code segment".into()),
                    ));
                }
                let bytes =
                    encode::instruction_bytes(mnemonic, *prefix, operands, code_len, &Placeholder)
                        .map_err(|kind| err(line.number, kind))?;
                code_len = code_len.wrapping_add(bytes.len() as u16);
            }
        }
    }

    // Pass 2
    let table = Table { symbols: &symbols };
    let mut segment = SegmentKind::Code;
    let mut code: Vec<u8> = Vec::new();
    let mut data: Vec<u8> = Vec::new();
    for line in &lines {
        match &line.stmt {
            None | Some(Stmt::Ignored) | Some(Stmt::End(_)) => {}
            Some(Stmt::SegmentData) => segment = SegmentKind::Data,
            Some(Stmt::SegmentCode) => segment = SegmentKind::Code,
            Some(Stmt::Data { width, items }) => {
                let out = match segment {
                    SegmentKind::Code => &mut code,
                    SegmentKind::Data => &mut data,
                };
                emit_data(*width, items, &table, out).map_err(|kind| err(line.number, kind))?;
            }
            Some(Stmt::Instr {
                prefix,
                mnemonic,
                operands,
            }) => {
                let at = code.len() as u16;
                let bytes = encode::instruction_bytes(mnemonic, *prefix, operands, at, &table)
                    .map_err(|kind| err(line.number, kind))?;
                code.extend_from_slice(&bytes);
            }
        }
    }

    let entry_offset = match entry {
        None => 0,
        Some((line, name)) => {
            let symbol = table.lookup(&name).map_err(|kind| err(line, kind))?;
            if symbol.segment != SegmentKind::Code {
                return Err(err(line, ErrorKind::BadOperand(name)));
            }
            symbol.offset
        }
    };

    tracing::debug!(
        "Assembled {} code bytes, {} data bytes, {} symbols",
        code.len(),
        data.len(),
        symbols.len()
    );

    Ok(Program {
        code,
        data,
        entry_offset,
        symbols,
    })
}
