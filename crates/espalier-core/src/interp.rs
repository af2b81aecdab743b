//! Reference interpreters for both program representations.
//!
//! [`run_function`] executes the raw CFG by following branches;
//! [`run_structured`] executes a statement tree. Both record the same
//! observable events (calls, field and element accesses, throws, returns),
//! so a structured tree is behaviorally equivalent to its source function
//! exactly when the two traces match. Call results are derived from a
//! per-run counter, which makes them deterministic as long as call order
//! is preserved — the property under test.
//!
//! The value model is deliberately small; exception dispatch matches a
//! region's exception type against thrown string values, with `None` as a
//! catch-all.

use std::collections::BTreeMap;

use crate::ast::{Expr, LabelId, Stmt, StructuredBody};
use crate::entity::EntityRef;
use crate::ir::{
    BinaryBranchCond, BinaryOp, BlockId, BranchCond, Constant, Function, Op, UnaryOp,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Call { function: String, args: Vec<Value> },
    FieldRead { field: String },
    FieldWrite { field: String, value: Value },
    ElementRead { index: i64 },
    ElementWrite { index: i64, value: Value },
    Return { value: Option<Value> },
    Throw { value: Value },
}

/// The step budget ran out — the program (or its structuring) diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfFuel;

// ---------------------------------------------------------------------
// Shared machinery
// ---------------------------------------------------------------------

#[derive(Default)]
struct Heap {
    fields: BTreeMap<String, Value>,
    elements: BTreeMap<i64, Value>,
    trace: Vec<Event>,
    calls: i64,
}

impl Heap {
    fn call(&mut self, function: &str, args: Vec<Value>) -> Value {
        self.trace.push(Event::Call {
            function: function.to_string(),
            args,
        });
        self.calls += 1;
        Value::Int(1000 + self.calls)
    }

    fn read_field(&mut self, field: &str) -> Value {
        self.trace.push(Event::FieldRead {
            field: field.to_string(),
        });
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }

    fn write_field(&mut self, field: &str, value: Value) {
        self.trace.push(Event::FieldWrite {
            field: field.to_string(),
            value: value.clone(),
        });
        self.fields.insert(field.to_string(), value);
    }

    fn read_element(&mut self, index: i64) -> Value {
        self.trace.push(Event::ElementRead { index });
        self.elements.get(&index).cloned().unwrap_or(Value::Null)
    }

    fn write_element(&mut self, index: i64, value: Value) {
        self.trace.push(Event::ElementWrite {
            index,
            value: value.clone(),
        });
        self.elements.insert(index, value);
    }
}

fn as_int(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => *b as i64,
        Value::Int(i) => *i,
        Value::Float(f) => *f as i64,
        Value::Str(_) => 0,
    }
}

/// Equality used by comparisons and compare-branches: strings by content,
/// null only equal to null, everything else numerically.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => as_int(a) == as_int(b),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Str(_) => true,
    }
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::Null => Value::Null,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::Str(s.clone()),
    }
}

fn apply_unary(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Neg => match value {
            Value::Float(f) => Value::Float(-f),
            other => Value::Int(-as_int(other)),
        },
        UnaryOp::Not => Value::Bool(!truthy(value)),
    }
}

fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let a = as_int(lhs);
    let b = as_int(rhs);
    match op {
        BinaryOp::Add => Value::Int(a.wrapping_add(b)),
        BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinaryOp::Div => Value::Int(if b == 0 { 0 } else { a.wrapping_div(b) }),
        BinaryOp::Rem => Value::Int(if b == 0 { 0 } else { a.wrapping_rem(b) }),
        BinaryOp::Compare => Value::Int(match a.cmp(&b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }),
        BinaryOp::BitAnd => Value::Int(a & b),
        BinaryOp::BitOr => Value::Int(a | b),
        BinaryOp::BitXor => Value::Int(a ^ b),
        BinaryOp::Shl => Value::Int(a.wrapping_shl(b as u32)),
        BinaryOp::Shr => Value::Int(a.wrapping_shr(b as u32)),
        BinaryOp::Eq => Value::Bool(values_equal(lhs, rhs)),
        BinaryOp::Ne => Value::Bool(!values_equal(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        // Short-circuit forms are evaluated by the expression walker; this
        // fallback only sees already-computed operands.
        BinaryOp::And => Value::Bool(truthy(lhs) && truthy(rhs)),
        BinaryOp::Or => Value::Bool(truthy(lhs) || truthy(rhs)),
    }
}

fn exception_matches(exception_type: &Option<String>, value: &Value) -> bool {
    match exception_type {
        None => true,
        Some(ty) => matches!(value, Value::Str(s) if s == ty),
    }
}

// ---------------------------------------------------------------------
// CFG interpreter
// ---------------------------------------------------------------------

/// Executes the function by walking its blocks and following branches.
pub fn run_function(
    func: &Function,
    inputs: &[Value],
    mut fuel: usize,
) -> Result<Vec<Event>, OutOfFuel> {
    let mut vars = vec![Value::Null; func.var_count];
    for (i, value) in inputs.iter().enumerate() {
        vars[i] = value.clone();
    }
    let mut heap = Heap::default();
    let mut block = func.entry;

    'blocks: loop {
        let insts = &func.blocks[block].insts;
        for inst in insts {
            if fuel == 0 {
                return Err(OutOfFuel);
            }
            fuel -= 1;

            match &inst.op {
                Op::Const(constant) => {
                    if let Some(result) = inst.result {
                        vars[result.index()] = constant_value(constant);
                    }
                }
                Op::Copy(src) => {
                    if let Some(result) = inst.result {
                        vars[result.index()] = vars[src.index()].clone();
                    }
                }
                Op::Unary { op, operand } => {
                    if let Some(result) = inst.result {
                        vars[result.index()] = apply_unary(*op, &vars[operand.index()]);
                    }
                }
                Op::Binary { op, lhs, rhs, .. } => {
                    if let Some(result) = inst.result {
                        vars[result.index()] =
                            apply_binary(*op, &vars[lhs.index()], &vars[rhs.index()]);
                    }
                }
                Op::GetField { field, .. } => {
                    let value = heap.read_field(field);
                    if let Some(result) = inst.result {
                        vars[result.index()] = value;
                    }
                }
                Op::PutField { field, value, .. } => {
                    let value = vars[value.index()].clone();
                    heap.write_field(field, value);
                }
                Op::GetElement { index, .. } => {
                    let index = as_int(&vars[index.index()]);
                    let value = heap.read_element(index);
                    if let Some(result) = inst.result {
                        vars[result.index()] = value;
                    }
                }
                Op::PutElement { index, value, .. } => {
                    let index = as_int(&vars[index.index()]);
                    let value = vars[value.index()].clone();
                    heap.write_element(index, value);
                }
                Op::Call { function, args } => {
                    let args: Vec<Value> =
                        args.iter().map(|arg| vars[arg.index()].clone()).collect();
                    let value = heap.call(function, args);
                    if let Some(result) = inst.result {
                        vars[result.index()] = value;
                    }
                }
                Op::Branch {
                    cond,
                    operand,
                    if_true,
                    if_false,
                } => {
                    let value = &vars[operand.index()];
                    let taken = match cond {
                        BranchCond::Null => *value == Value::Null,
                        BranchCond::NotNull => *value != Value::Null,
                        BranchCond::Equal => as_int(value) == 0,
                        BranchCond::NotEqual => as_int(value) != 0,
                        BranchCond::Less => as_int(value) < 0,
                        BranchCond::LessOrEqual => as_int(value) <= 0,
                        BranchCond::Greater => as_int(value) > 0,
                        BranchCond::GreaterOrEqual => as_int(value) >= 0,
                    };
                    block = if taken { *if_true } else { *if_false };
                    continue 'blocks;
                }
                Op::BinaryBranch {
                    cond,
                    lhs,
                    rhs,
                    if_true,
                    if_false,
                } => {
                    let equal = values_equal(&vars[lhs.index()], &vars[rhs.index()]);
                    let taken = match cond {
                        BinaryBranchCond::Equal => equal,
                        BinaryBranchCond::NotEqual => !equal,
                    };
                    block = if taken { *if_true } else { *if_false };
                    continue 'blocks;
                }
                Op::Jump(target) => {
                    block = *target;
                    continue 'blocks;
                }
                Op::Switch {
                    operand,
                    entries,
                    default,
                } => {
                    let value = as_int(&vars[operand.index()]);
                    block = entries
                        .iter()
                        .find(|entry| entry.value == value)
                        .map(|entry| entry.target)
                        .unwrap_or(*default);
                    continue 'blocks;
                }
                Op::Return(value) => {
                    let value = value.map(|v| vars[v.index()].clone());
                    heap.trace.push(Event::Return { value });
                    return Ok(heap.trace);
                }
                Op::Raise(value) => {
                    let value = vars[value.index()].clone();
                    match find_handler(func, block, &value) {
                        Some(handler) => {
                            if let Some(var) = func.blocks[handler].exception_var {
                                vars[var.index()] = value;
                            }
                            block = handler;
                            continue 'blocks;
                        }
                        None => {
                            heap.trace.push(Event::Throw { value });
                            return Ok(heap.trace);
                        }
                    }
                }
            }
        }
        // A block without a terminator: treat as falling off the end.
        heap.trace.push(Event::Return { value: None });
        return Ok(heap.trace);
    }
}

/// Innermost declared region of `block` matching the thrown value.
fn find_handler(func: &Function, block: BlockId, value: &Value) -> Option<BlockId> {
    func.blocks[block]
        .protected
        .iter()
        .rev()
        .find(|region| exception_matches(&region.exception_type, value))
        .map(|region| region.handler)
}

// ---------------------------------------------------------------------
// Statement-tree interpreter
// ---------------------------------------------------------------------

enum Flow {
    Normal,
    Break(LabelId),
    Continue(LabelId),
    Return(Option<Value>),
    Throw(Value),
}

struct TreeExec {
    vars: Vec<Value>,
    heap: Heap,
    fuel: usize,
}

/// Executes a structured tree produced for a function with `var_count`
/// registers.
pub fn run_structured(
    body: &StructuredBody,
    var_count: usize,
    inputs: &[Value],
    fuel: usize,
) -> Result<Vec<Event>, OutOfFuel> {
    let mut vars = vec![Value::Null; var_count];
    for (i, value) in inputs.iter().enumerate() {
        vars[i] = value.clone();
    }
    let mut exec = TreeExec {
        vars,
        heap: Heap::default(),
        fuel,
    };
    let flow = exec.run_body(&body.statements)?;
    match flow {
        Flow::Return(value) => exec.heap.trace.push(Event::Return { value }),
        Flow::Throw(value) => exec.heap.trace.push(Event::Throw { value }),
        // Falling off the end is an implicit bare return.
        Flow::Normal | Flow::Break(_) | Flow::Continue(_) => {
            exec.heap.trace.push(Event::Return { value: None })
        }
    }
    Ok(exec.heap.trace)
}

impl TreeExec {
    fn step(&mut self) -> Result<(), OutOfFuel> {
        if self.fuel == 0 {
            return Err(OutOfFuel);
        }
        self.fuel -= 1;
        Ok(())
    }

    fn run_body(&mut self, body: &[Stmt]) -> Result<Flow, OutOfFuel> {
        for stmt in body {
            match self.run_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn run_stmt(&mut self, stmt: &Stmt) -> Result<Flow, OutOfFuel> {
        self.step()?;
        match stmt {
            Stmt::Assign { target, value } => {
                match target {
                    None => {
                        self.eval(value)?;
                    }
                    Some(Expr::Var(var)) => {
                        let value = self.eval(value)?;
                        self.vars[var.index()] = value;
                    }
                    Some(Expr::GetField { object, field }) => {
                        if let Some(object) = object {
                            self.eval(object)?;
                        }
                        let value = self.eval(value)?;
                        self.heap.write_field(field, value);
                    }
                    Some(Expr::GetElement { array, index }) => {
                        self.eval(array)?;
                        let index = as_int(&self.eval(index)?);
                        let value = self.eval(value)?;
                        self.heap.write_element(index, value);
                    }
                    Some(other) => {
                        // Not a valid assignment target; evaluate for
                        // effects only.
                        self.eval(other)?;
                        self.eval(value)?;
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Labeled { label, body } => match self.run_body(body)? {
                Flow::Break(target) if target == *label => Ok(Flow::Normal),
                other => Ok(other),
            },

            Stmt::While {
                label,
                condition,
                body,
            } => {
                loop {
                    self.step()?;
                    if let Some(condition) = condition {
                        let value = self.eval(condition)?;
                        if !truthy(&value) {
                            break;
                        }
                    }
                    match self.run_body(body)? {
                        Flow::Normal => {}
                        Flow::Continue(target) if target == *label => {}
                        Flow::Break(target) if target == *label => break,
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::If {
                condition,
                consequent,
                alternative,
            } => {
                let value = self.eval(condition)?;
                if truthy(&value) {
                    self.run_body(consequent)
                } else {
                    self.run_body(alternative)
                }
            }

            Stmt::Switch {
                value,
                clauses,
                default,
            } => {
                let scrutinee = as_int(&self.eval(value)?);
                for clause in clauses {
                    if clause.values.contains(&scrutinee) {
                        return self.run_body(&clause.body);
                    }
                }
                self.run_body(default)
            }

            Stmt::Try {
                body,
                exception_type,
                exception_var,
                handler,
            } => match self.run_body(body)? {
                Flow::Throw(value) if exception_matches(exception_type, &value) => {
                    if let Some(var) = exception_var {
                        self.vars[var.index()] = value;
                    }
                    self.run_body(handler)
                }
                other => Ok(other),
            },

            Stmt::Break { target } => Ok(Flow::Break(*target)),
            Stmt::Continue { target } => Ok(Flow::Continue(*target)),

            Stmt::Return { value } => {
                let value = match value {
                    Some(value) => Some(self.eval(value)?),
                    None => None,
                };
                Ok(Flow::Return(value))
            }

            Stmt::Throw { value } => {
                let value = self.eval(value)?;
                Ok(Flow::Throw(value))
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, OutOfFuel> {
        self.step()?;
        Ok(match expr {
            Expr::Var(var) => self.vars[var.index()].clone(),
            Expr::Const(constant) => constant_value(constant),
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                apply_unary(*op, &operand)
            }
            Expr::Binary { op, lhs, rhs } => match op {
                // Short-circuit: the right operand of a merged condition
                // must only evaluate when the left allows it.
                BinaryOp::And => {
                    let lhs = self.eval(lhs)?;
                    if truthy(&lhs) {
                        let rhs = self.eval(rhs)?;
                        Value::Bool(truthy(&rhs))
                    } else {
                        Value::Bool(false)
                    }
                }
                BinaryOp::Or => {
                    let lhs = self.eval(lhs)?;
                    if truthy(&lhs) {
                        Value::Bool(true)
                    } else {
                        let rhs = self.eval(rhs)?;
                        Value::Bool(truthy(&rhs))
                    }
                }
                _ => {
                    let lhs = self.eval(lhs)?;
                    let rhs = self.eval(rhs)?;
                    apply_binary(*op, &lhs, &rhs)
                }
            },
            Expr::GetField { object, field } => {
                if let Some(object) = object {
                    self.eval(object)?;
                }
                self.heap.read_field(field)
            }
            Expr::GetElement { array, index } => {
                self.eval(array)?;
                let index = as_int(&self.eval(index)?);
                self.heap.read_element(index)
            }
            Expr::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.heap.call(function, values)
            }
        })
    }
}
