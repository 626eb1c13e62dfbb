//! A small textual format for the reference IR in [`super::graph`], used by
//! the `termlattice` CLI and by the fixtures under `tests/fixtures/`.
//!
//! Grammar, one statement per line (blank lines and `#`-comments ignored):
//!
//! ```text
//! fn <name> [declaration]
//!     block <id>
//!     edge <from> <to>
//!     loop bounded|unbounded <block-id> [<block-id>...]
//! endfn
//!
//! call <caller-name> <callee-name>
//! indirect <caller-name>
//! ```
//!
//! `fn` blocks must come before any `call`/`indirect` statement that
//! references them. Block ids are local to the enclosing `fn` and are
//! assigned in declaration order; the first `block` line is the entry
//! block.

use std::collections::BTreeMap;

use super::graph::{BlockId, Function, Module};

/// A malformed textual IR input.
#[derive(Debug, thiserror::Error)]
pub enum IrParseError {
    /// A line didn't match any known statement shape.
    #[error("line {line}: malformed statement: {text}")]
    MalformedStatement {
        /// 1-based line number.
        line: usize,
        /// The offending line, verbatim.
        text: String,
    },
    /// A `block`/`edge`/`loop` statement referenced a block id that was
    /// never declared with a `block` statement in the same function.
    #[error("line {line}: undeclared block {block}")]
    UndeclaredBlock {
        /// 1-based line number.
        line: usize,
        /// The undeclared id.
        block: usize,
    },
    /// A `call`/`indirect` statement referenced a function name that was
    /// never declared with an `fn` statement.
    #[error("line {line}: undeclared function {name:?}")]
    UndeclaredFunction {
        /// 1-based line number.
        line: usize,
        /// The undeclared name.
        name: String,
    },
    /// An `fn` block was opened but never closed with `endfn`.
    #[error("unterminated fn block starting at line {line}")]
    UnterminatedFunction {
        /// 1-based line number of the opening `fn` statement.
        line: usize,
    },
    /// A `loop` statement's kind was neither `bounded` nor `unbounded`.
    #[error("line {line}: invalid loop kind {kind:?}, expected 'bounded' or 'unbounded'")]
    InvalidLoopKind {
        /// 1-based line number.
        line: usize,
        /// The offending token.
        kind: String,
    },
}

type Lines<'a> = std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'a>>>;

/// Parses the textual IR format into a [`Module`].
pub fn parse_module(input: &str) -> Result<Module, IrParseError> {
    let mut module = Module::new();
    let mut name_to_id = BTreeMap::new();
    let mut lines: Lines<'_> = input.lines().enumerate().peekable();

    while let Some((idx, raw_line)) = lines.next() {
        let line_no = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["fn", name, rest @ ..] => {
                let is_declaration = rest == ["declaration"];
                let function = parse_function_body(name, is_declaration, line_no, &mut lines)?;
                let id = module.add_function(function);
                name_to_id.insert((*name).to_owned(), id);
            }
            ["call", caller, callee] => {
                let caller_id = lookup(&name_to_id, caller, line_no)?;
                let callee_id = lookup(&name_to_id, callee, line_no)?;
                module.add_call(caller_id, callee_id);
            }
            ["indirect", caller] => {
                let caller_id = lookup(&name_to_id, caller, line_no)?;
                module.add_indirect_call(caller_id);
            }
            _ => {
                return Err(IrParseError::MalformedStatement {
                    line: line_no,
                    text: raw_line.to_owned(),
                })
            }
        }
    }

    Ok(module)
}

fn lookup(
    map: &BTreeMap<String, super::graph::FunctionId>,
    name: &str,
    line: usize,
) -> Result<super::graph::FunctionId, IrParseError> {
    map.get(name)
        .copied()
        .ok_or_else(|| IrParseError::UndeclaredFunction {
            line,
            name: name.to_owned(),
        })
}

fn parse_function_body(
    name: &str,
    is_declaration: bool,
    opened_at: usize,
    lines: &mut Lines<'_>,
) -> Result<Function, IrParseError> {
    let mut builder = Function::builder(name);
    let mut block_ids: BTreeMap<usize, BlockId> = BTreeMap::new();
    let mut closed = false;

    for (idx, raw_line) in lines.by_ref() {
        let line_no = idx + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["endfn"] => {
                closed = true;
                break;
            }
            ["block", id] => {
                let id: usize = id.parse().map_err(|_| IrParseError::MalformedStatement {
                    line: line_no,
                    text: raw_line.to_owned(),
                })?;
                let handle = builder.add_block();
                block_ids.insert(id, handle);
            }
            ["edge", from, to] => {
                let from = parse_block_ref(&block_ids, from, line_no)?;
                let to = parse_block_ref(&block_ids, to, line_no)?;
                builder.add_edge(from, to);
            }
            ["loop", kind, members @ ..] => {
                let has_bound = match *kind {
                    "bounded" => true,
                    "unbounded" => false,
                    other => {
                        return Err(IrParseError::InvalidLoopKind {
                            line: line_no,
                            kind: other.to_owned(),
                        })
                    }
                };
                let members = members
                    .iter()
                    .map(|m| parse_block_ref(&block_ids, m, line_no))
                    .collect::<Result<Vec<_>, _>>()?;
                builder.add_loop(has_bound, members);
            }
            _ => {
                return Err(IrParseError::MalformedStatement {
                    line: line_no,
                    text: raw_line.to_owned(),
                })
            }
        }
    }

    if !closed {
        return Err(IrParseError::UnterminatedFunction { line: opened_at });
    }

    Ok(if is_declaration || block_ids.is_empty() {
        builder.declaration()
    } else {
        builder.build()
    })
}

fn parse_block_ref(
    block_ids: &BTreeMap<usize, BlockId>,
    token: &str,
    line: usize,
) -> Result<BlockId, IrParseError> {
    let id: usize = token
        .parse()
        .map_err(|_| IrParseError::MalformedStatement {
            line,
            text: token.to_owned(),
        })?;
    block_ids
        .get(&id)
        .copied()
        .ok_or(IrParseError::UndeclaredBlock { line, block: id })
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}
