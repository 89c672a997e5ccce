
use common::{Row, SqlError, SqlResult};
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use types::{SqlType, Value};

/// Binary operators appearing in default, computed, and check expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Plus,
    Minus,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
        }
    }
}

/// Unary operators (currently just logical NOT).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Not,
}

/// Expression abstract syntax tree.
///
/// Descriptors persist expressions as SQL text; `Display` is the canonical
/// serialization and must stay byte-stable, since shard compute expressions
/// and stored check constraints are compared as strings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Value),
    /// Column reference with optional table/alias qualifier.
    Column {
        table: Option<String>,
        name: String,
    },
    /// Ordinary function call, e.g. `fnv32(x)` or `unique_rowid()`.
    Func {
        name: String,
        args: Vec<Expr>,
    },
    Coalesce(Vec<Expr>),
    Cast {
        expr: Box<Expr>,
        ty: SqlType,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// `expr IN (a, b, c)`.
    InTuple {
        expr: Box<Expr>,
        list: Vec<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn int(v: i64) -> Expr {
        Expr::Literal(Value::Int(v))
    }

    pub fn string(v: impl Into<String>) -> Expr {
        Expr::Literal(Value::Text(v.into()))
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    /// Names of all columns referenced anywhere in the expression, in
    /// first-appearance order, without duplicates.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.visit_columns(&mut |_, name| {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        });
        out
    }

    fn visit_columns(&self, f: &mut impl FnMut(Option<&str>, &str)) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column { table, name } => f(table.as_deref(), name),
            Expr::Func { args, .. } | Expr::Coalesce(args) => {
                for a in args {
                    a.visit_columns(f);
                }
            }
            Expr::Cast { expr, .. } | Expr::Unary { expr, .. } => expr.visit_columns(f),
            Expr::Binary { left, right, .. } => {
                left.visit_columns(f);
                right.visit_columns(f);
            }
            Expr::InTuple { expr, list } => {
                expr.visit_columns(f);
                for e in list {
                    e.visit_columns(f);
                }
            }
        }
    }
}

fn fmt_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    // Parenthesize nested binaries so the textual form round-trips
    // unambiguously through the parser.
    match e {
        Expr::Binary { .. } | Expr::InTuple { .. } => write!(f, "({e})"),
        _ => write!(f, "{e}"),
    }
}

fn fmt_list(f: &mut fmt::Formatter<'_>, list: &[Expr]) -> fmt::Result {
    for (i, e) in list.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{e}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::Int(i)) => write!(f, "{i}"),
            Expr::Literal(Value::Text(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Expr::Literal(Value::Bool(b)) => write!(f, "{b}"),
            Expr::Literal(Value::Null) => f.write_str("NULL"),
            Expr::Column { table: None, name } => f.write_str(name),
            Expr::Column {
                table: Some(t),
                name,
            } => write!(f, "{t}.{name}"),
            Expr::Func { name, args } => {
                write!(f, "{name}(")?;
                fmt_list(f, args)?;
                f.write_str(")")
            }
            Expr::Coalesce(args) => {
                f.write_str("COALESCE(")?;
                fmt_list(f, args)?;
                f.write_str(")")
            }
            Expr::Cast { expr, ty } => {
                fmt_operand(f, expr)?;
                write!(f, "::{ty}")
            }
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => {
                f.write_str("NOT ")?;
                fmt_operand(f, expr)
            }
            Expr::Binary { left, op, right } => {
                fmt_operand(f, left)?;
                write!(f, " {} ", op.symbol())?;
                fmt_operand(f, right)
            }
            Expr::InTuple { expr, list } => {
                fmt_operand(f, expr)?;
                f.write_str(" IN (")?;
                fmt_list(f, list)?;
                f.write_str(")")
            }
        }
    }
}

/// Rewrites column references to their unqualified form, validating that any
/// qualifier names the given table and that every referenced column exists.
///
/// Descriptors store expressions dequalified so they stay valid across table
/// renames.
pub fn dequalify_column_refs(
    expr: &Expr,
    table: &str,
    columns: &[String],
) -> SqlResult<Expr> {
    let mut rewritten = expr.clone();
    dequalify_in_place(&mut rewritten, table, columns)?;
    Ok(rewritten)
}

fn dequalify_in_place(expr: &mut Expr, table: &str, columns: &[String]) -> SqlResult<()> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Column { table: qual, name } => {
            if let Some(q) = qual {
                if !q.eq_ignore_ascii_case(table) {
                    return Err(SqlError::UndefinedColumn(format!("{q}.{name}")));
                }
            }
            if !columns.iter().any(|c| c == name) {
                return Err(SqlError::UndefinedColumn(name.clone()));
            }
            *qual = None;
            Ok(())
        }
        Expr::Func { args, .. } | Expr::Coalesce(args) => {
            for a in args {
                dequalify_in_place(a, table, columns)?;
            }
            Ok(())
        }
        Expr::Cast { expr, .. } | Expr::Unary { expr, .. } => {
            dequalify_in_place(expr, table, columns)
        }
        Expr::Binary { left, right, .. } => {
            dequalify_in_place(left, table, columns)?;
            dequalify_in_place(right, table, columns)
        }
        Expr::InTuple { expr, list } => {
            dequalify_in_place(expr, table, columns)?;
            for e in list {
                dequalify_in_place(e, table, columns)?;
            }
            Ok(())
        }
    }
}

/// 32-bit FNV-1 hash, the function backing hash-shard bucket computation.
pub fn fnv32(s: &str) -> u32 {
    let mut h: u32 = 2166136261;
    for b in s.as_bytes() {
        h = h.wrapping_mul(16777619) ^ u32::from(*b);
    }
    h
}

/// Evaluation context consisting of the row schema (column names in order)
/// and a monotonic generator backing `unique_rowid()`.
pub struct EvalContext<'a> {
    pub schema: &'a [String],
    next_rowid: Cell<i64>,
}

impl<'a> EvalContext<'a> {
    pub fn new(schema: &'a [String]) -> Self {
        Self {
            schema,
            next_rowid: Cell::new(1),
        }
    }

    /// Evaluate an expression over a given row. Rowless expressions (CTAS
    /// defaults) pass an empty row.
    pub fn eval(&self, expr: &Expr, row: &Row) -> SqlResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column { table, name } => {
                let idx = self.find_column(table.as_deref(), name)?;
                Ok(row.values[idx].clone())
            }
            Expr::Func { name, args } => self.eval_func(name, args, row),
            Expr::Coalesce(args) => {
                for a in args {
                    let v = self.eval(a, row)?;
                    if v != Value::Null {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
            Expr::Cast { expr, ty } => {
                let v = self.eval(expr, row)?;
                eval_cast(v, ty)
            }
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => {
                let v = self.eval(expr, row)?;
                let b = v
                    .as_bool()
                    .ok_or_else(|| SqlError::Syntax(format!("NOT expects bool, got {v:?}")))?;
                Ok(Value::Bool(!b))
            }
            Expr::Binary { left, op, right } => {
                let lv = self.eval(left, row)?;
                let rv = self.eval(right, row)?;
                eval_binary(&lv, *op, &rv)
            }
            Expr::InTuple { expr, list } => {
                let v = self.eval(expr, row)?;
                for e in list {
                    if self.eval(e, row)? == v {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
        }
    }

    fn eval_func(&self, name: &str, args: &[Expr], row: &Row) -> SqlResult<Value> {
        match name.to_ascii_lowercase().as_str() {
            "fnv32" => {
                let v = self.eval(args.first().ok_or_else(|| {
                    SqlError::Syntax("fnv32() requires one argument".into())
                })?, row)?;
                let s = match eval_cast(v, &SqlType::String)? {
                    Value::Text(s) => s,
                    Value::Null => String::new(),
                    other => {
                        return Err(SqlError::Syntax(format!(
                            "fnv32() expects a string, got {other:?}"
                        )))
                    }
                };
                Ok(Value::Int(i64::from(fnv32(&s))))
            }
            "mod" => {
                if args.len() != 2 {
                    return Err(SqlError::Syntax("mod() requires two arguments".into()));
                }
                let a = self.eval(&args[0], row)?;
                let b = self.eval(&args[1], row)?;
                match (a.as_int(), b.as_int()) {
                    (Some(_), Some(0)) => Err(SqlError::Syntax("division by zero".into())),
                    (Some(a), Some(b)) => Ok(Value::Int(a.rem_euclid(b))),
                    _ => Err(SqlError::Syntax("mod() expects integers".into())),
                }
            }
            "unique_rowid" => {
                let id = self.next_rowid.get();
                self.next_rowid.set(id + 1);
                Ok(Value::Int(id))
            }
            other => Err(SqlError::FeatureNotSupported(format!(
                "function {other}() cannot be evaluated here"
            ))),
        }
    }

    /// Find column index in schema, supporting qualified and unqualified
    /// references.
    fn find_column(&self, table: Option<&str>, name: &str) -> SqlResult<usize> {
        let target = match table {
            Some(qualifier) => format!("{qualifier}.{name}"),
            None => name.to_string(),
        };
        self.schema
            .iter()
            .position(|c| {
                c.eq_ignore_ascii_case(&target)
                    || (table.is_none()
                        && c.to_lowercase()
                            .ends_with(&format!(".{}", name.to_lowercase())))
            })
            .ok_or_else(|| SqlError::UndefinedColumn(target))
    }
}

fn eval_cast(v: Value, ty: &SqlType) -> SqlResult<Value> {
    use types::TypeFamily;
    if v == Value::Null {
        return Ok(Value::Null);
    }
    match ty.family() {
        TypeFamily::String => Ok(Value::Text(match v {
            Value::Int(i) => i.to_string(),
            Value::Text(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Null => unreachable!(),
        })),
        TypeFamily::Int => match v {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| SqlError::Syntax(format!("could not parse {s:?} as int"))),
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            Value::Null => unreachable!(),
        },
        TypeFamily::Bool => v
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| SqlError::Syntax(format!("could not cast {v:?} to bool"))),
        _ => Err(SqlError::FeatureNotSupported(format!(
            "cast to {ty} cannot be evaluated here"
        ))),
    }
}

fn eval_binary(l: &Value, op: BinaryOp, r: &Value) -> SqlResult<Value> {
    use BinaryOp::*;

    match op {
        And | Or => {
            let lb = l
                .as_bool()
                .ok_or_else(|| SqlError::Syntax(format!("AND/OR expects bools, got {l:?}")))?;
            let rb = r
                .as_bool()
                .ok_or_else(|| SqlError::Syntax(format!("AND/OR expects bools, got {r:?}")))?;
            return Ok(Value::Bool(if op == And { lb && rb } else { lb || rb }));
        }
        Plus | Minus => {
            let (Some(a), Some(b)) = (l.as_int(), r.as_int()) else {
                return Err(SqlError::Syntax(format!(
                    "arithmetic expects ints, got {l:?}, {r:?}"
                )));
            };
            return Ok(Value::Int(if op == Plus {
                a.wrapping_add(b)
            } else {
                a.wrapping_sub(b)
            }));
        }
        _ => {}
    }

    let ord = l.cmp_same_type(r).ok_or_else(|| {
        SqlError::Syntax(format!("incompatible types for {op:?}: {l:?}, {r:?}"))
    })?;

    let result = match op {
        Eq => ord == Ordering::Equal,
        Ne => ord != Ordering::Equal,
        Lt => ord == Ordering::Less,
        Le => ord != Ordering::Greater,
        Gt => ord == Ordering::Greater,
        Ge => ord != Ordering::Less,
        _ => unreachable!(),
    };

    Ok(Value::Bool(result))
}
