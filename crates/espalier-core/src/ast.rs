//! The structured statement tree produced by the engine.
//!
//! Break and continue statements reference their target construct by
//! `LabelId` — a handle into the [`Labels`] arena that travels with the
//! tree — never by position. Multiple code generators can walk the same
//! tree and resolve targets by identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::define_entity;
use crate::entity::{EntityRef, PrimaryMap};
use crate::ir::{BinaryOp, Constant, UnaryOp, VarId};

define_entity!(LabelId, "L");

/// What kind of construct a label names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    /// A labeled block: `break` lands just after it.
    Block,
    /// A loop: `break` leaves it, `continue` re-tests its guard.
    Loop,
}

/// Arena of labels with a parallel jump-use count per label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Labels {
    kinds: PrimaryMap<LabelId, LabelKind>,
    use_counts: Vec<u32>,
}

impl Labels {
    pub fn new() -> Self {
        Self {
            kinds: PrimaryMap::new(),
            use_counts: Vec::new(),
        }
    }

    pub fn alloc(&mut self, kind: LabelKind) -> LabelId {
        self.use_counts.push(0);
        self.kinds.push(kind)
    }

    pub fn kind(&self, label: LabelId) -> LabelKind {
        self.kinds[label]
    }

    pub fn use_count(&self, label: LabelId) -> u32 {
        self.use_counts[label.index()]
    }

    pub fn note_use(&mut self, label: LabelId) {
        self.use_counts[label.index()] += 1;
    }

    pub fn release_use(&mut self, label: LabelId) {
        self.use_counts[label.index()] -= 1;
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::new()
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Var(VarId),
    Const(Constant),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    GetField {
        object: Option<Box<Expr>>,
        field: String,
    },
    GetElement {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn int(value: i64) -> Expr {
        Expr::Const(Constant::Int(value))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }
}

/// One clause of a switch statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchClause {
    /// Match values, sorted ascending.
    pub values: Vec<i64>,
    pub body: Vec<Stmt>,
}

/// A structured statement. Sequences are plain `Vec<Stmt>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `target = value`, or a bare effect expression when `target` is `None`.
    Assign {
        target: Option<Expr>,
        value: Expr,
    },
    /// A named scope that `break` can target.
    Labeled {
        label: LabelId,
        body: Vec<Stmt>,
    },
    /// `while (condition) body`; `None` means "always true".
    While {
        label: LabelId,
        condition: Option<Expr>,
        body: Vec<Stmt>,
    },
    If {
        condition: Expr,
        consequent: Vec<Stmt>,
        alternative: Vec<Stmt>,
    },
    Switch {
        value: Expr,
        clauses: Vec<SwitchClause>,
        default: Vec<Stmt>,
    },
    /// A protected region with its handler sub-tree.
    Try {
        body: Vec<Stmt>,
        exception_type: Option<String>,
        exception_var: Option<VarId>,
        handler: Vec<Stmt>,
    },
    Break {
        target: LabelId,
    },
    Continue {
        target: LabelId,
    },
    Return {
        value: Option<Expr>,
    },
    Throw {
        value: Expr,
    },
}

/// The engine's output: a statement sequence plus the label arena its
/// break/continue statements resolve against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredBody {
    pub statements: Vec<Stmt>,
    pub labels: Labels,
}

// ---------------------------------------------------------------------
// Pretty-printing (for diagnostics and test failure output)
// ---------------------------------------------------------------------

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(var) => write!(f, "{var}"),
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "-({operand})"),
                UnaryOp::Not => write!(f, "!({operand})"),
            },
            Expr::Binary { op, lhs, rhs } => {
                let symbol = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Rem => "%",
                    BinaryOp::Compare => "<=>",
                    BinaryOp::BitAnd => "&",
                    BinaryOp::BitOr => "|",
                    BinaryOp::BitXor => "^",
                    BinaryOp::Shl => "<<",
                    BinaryOp::Shr => ">>",
                    BinaryOp::Eq => "==",
                    BinaryOp::Ne => "!=",
                    BinaryOp::Lt => "<",
                    BinaryOp::Le => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::Ge => ">=",
                    BinaryOp::And => "&&",
                    BinaryOp::Or => "||",
                };
                write!(f, "({lhs} {symbol} {rhs})")
            }
            Expr::GetField { object, field } => match object {
                Some(object) => write!(f, "{object}.{field}"),
                None => write!(f, "{field}"),
            },
            Expr::GetElement { array, index } => write!(f, "{array}[{index}]"),
            Expr::Call { function, args } => {
                write!(f, "{function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Stmt], indent: usize) -> fmt::Result {
    for stmt in body {
        write_stmt(f, stmt, indent)?;
    }
    Ok(())
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, indent: usize) -> fmt::Result {
    let pad = "    ".repeat(indent);
    match stmt {
        Stmt::Assign { target, value } => match target {
            Some(target) => writeln!(f, "{pad}{target} = {value};"),
            None => writeln!(f, "{pad}{value};"),
        },
        Stmt::Labeled { label, body } => {
            writeln!(f, "{pad}{label}: {{")?;
            write_body(f, body, indent + 1)?;
            writeln!(f, "{pad}}}")
        }
        Stmt::While {
            label,
            condition,
            body,
        } => {
            match condition {
                Some(condition) => writeln!(f, "{pad}{label}: while ({condition}) {{")?,
                None => writeln!(f, "{pad}{label}: while (true) {{")?,
            }
            write_body(f, body, indent + 1)?;
            writeln!(f, "{pad}}}")
        }
        Stmt::If {
            condition,
            consequent,
            alternative,
        } => {
            writeln!(f, "{pad}if ({condition}) {{")?;
            write_body(f, consequent, indent + 1)?;
            if !alternative.is_empty() {
                writeln!(f, "{pad}}} else {{")?;
                write_body(f, alternative, indent + 1)?;
            }
            writeln!(f, "{pad}}}")
        }
        Stmt::Switch {
            value,
            clauses,
            default,
        } => {
            writeln!(f, "{pad}switch ({value}) {{")?;
            for clause in clauses {
                writeln!(f, "{pad}case {:?}:", clause.values)?;
                write_body(f, &clause.body, indent + 1)?;
            }
            writeln!(f, "{pad}default:")?;
            write_body(f, default, indent + 1)?;
            writeln!(f, "{pad}}}")
        }
        Stmt::Try {
            body,
            exception_type,
            exception_var,
            handler,
        } => {
            writeln!(f, "{pad}try {{")?;
            write_body(f, body, indent + 1)?;
            let ty = exception_type.as_deref().unwrap_or("any");
            match exception_var {
                Some(var) => writeln!(f, "{pad}}} catch ({ty} {var}) {{")?,
                None => writeln!(f, "{pad}}} catch ({ty}) {{")?,
            }
            write_body(f, handler, indent + 1)?;
            writeln!(f, "{pad}}}")
        }
        Stmt::Break { target } => writeln!(f, "{pad}break {target};"),
        Stmt::Continue { target } => writeln!(f, "{pad}continue {target};"),
        Stmt::Return { value } => match value {
            Some(value) => writeln!(f, "{pad}return {value};"),
            None => writeln!(f, "{pad}return;"),
        },
        Stmt::Throw { value } => writeln!(f, "{pad}throw {value};"),
    }
}

impl fmt::Display for StructuredBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_body(f, &self.statements, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_use_counts() {
        let mut labels = Labels::new();
        let a = labels.alloc(LabelKind::Block);
        let b = labels.alloc(LabelKind::Loop);
        assert_eq!(labels.use_count(a), 0);
        labels.note_use(a);
        labels.note_use(a);
        assert_eq!(labels.use_count(a), 2);
        labels.release_use(a);
        assert_eq!(labels.use_count(a), 1);
        assert_eq!(labels.kind(b), LabelKind::Loop);
    }

    #[test]
    fn display_renders_nested_statements() {
        let mut labels = Labels::new();
        let label = labels.alloc(LabelKind::Loop);
        let body = StructuredBody {
            statements: vec![Stmt::While {
                label,
                condition: Some(Expr::binary(
                    BinaryOp::Lt,
                    Expr::Var(VarId::new(0)),
                    Expr::int(10),
                )),
                body: vec![Stmt::Break { target: label }],
            }],
            labels,
        };
        let text = body.to_string();
        assert!(text.contains("while ((v0 < 10))"), "got:\n{text}");
        assert!(text.contains("break L0;"), "got:\n{text}");
    }
}
