mod ast;

pub use ast::*;

use common::{ForeignKeyAction, SqlError, SqlResult, TableName};
use expr::{BinaryOp, Expr, UnaryOp};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;
use types::{SqlType, Value};

/// Parse a single `CREATE TABLE` statement into the internal AST.
///
/// Only the standard dialect subset is accepted here; clauses with no
/// generic-SQL spelling (hash sharding, interleaving, localities) are
/// attached to the AST programmatically by callers.
pub fn parse_create_table(sql: &str) -> SqlResult<CreateTable> {
    let dialect = GenericDialect {};
    let mut stmts = SqlParser::parse_sql(&dialect, sql)
        .map_err(|e| SqlError::Parser(format!("SQL parse error: {e}")))?;
    if stmts.len() != 1 {
        return Err(SqlError::Parser(format!(
            "expected exactly one statement, got {}",
            stmts.len()
        )));
    }
    match stmts.remove(0) {
        stmt @ sqlast::Statement::CreateTable { .. } => map_create_table(stmt),
        other => Err(SqlError::Parser(format!(
            "expected CREATE TABLE, got {other}"
        ))),
    }
}

/// Parse a standalone expression, e.g. a serialized default or computed
/// column expression being re-bound from a stored descriptor.
pub fn parse_expr_text(text: &str) -> SqlResult<Expr> {
    let dialect = GenericDialect {};
    let parsed = SqlParser::new(&dialect)
        .try_with_sql(text)
        .map_err(|e| SqlError::Parser(format!("expression parse error: {e}")))?
        .parse_expr()
        .map_err(|e| SqlError::Parser(format!("expression parse error: {e}")))?;
    map_expr(parsed)
}

fn map_create_table(stmt: sqlast::Statement) -> SqlResult<CreateTable> {
    let sqlast::Statement::CreateTable {
        name,
        columns,
        constraints,
        if_not_exists,
        temporary,
        query,
        like,
        on_commit,
        ..
    } = stmt
    else {
        return Err(SqlError::Parser("expected CREATE TABLE".into()));
    };

    let mut defs = Vec::new();
    if let Some(like_name) = like {
        defs.push(TableDef::Like(LikeTableDef {
            name: normalize_table_name(&like_name)?,
            options: Vec::new(),
        }));
    }
    for col in columns {
        let (column, extras) = map_column_def(col)?;
        defs.push(TableDef::Column(column));
        defs.extend(extras);
    }
    for constraint in constraints {
        defs.push(map_table_constraint(constraint)?);
    }

    let persistence = if temporary {
        Persistence::Temporary
    } else {
        Persistence::Permanent
    };
    let on_commit = match on_commit {
        None => OnCommit::Unset,
        Some(sqlast::OnCommit::PreserveRows) => OnCommit::PreserveRows,
        Some(other) => {
            return Err(SqlError::Parser(format!(
                "unsupported ON COMMIT clause: {other:?}"
            )))
        }
    };

    Ok(CreateTable {
        name: normalize_table_name(&name)?,
        defs,
        if_not_exists,
        persistence,
        on_commit,
        interleave: None,
        partition_by: None,
        locality: None,
        storage_params: Vec::new(),
        as_source: query.map(|q| CtasSource {
            query: q.to_string(),
        }),
    })
}

/// Map one column definition. Inline CHECK constraints are returned as
/// separate table defs since they live in the constraint list internally.
fn map_column_def(col: sqlast::ColumnDef) -> SqlResult<(ColumnDef, Vec<TableDef>)> {
    use sqlast::ColumnOption;

    let name = normalize_ident(&col.name);
    let mut def = ColumnDef::new(name.clone(), map_data_type(&col.data_type)?);
    let mut extras = Vec::new();

    for opt in col.options {
        match opt.option {
            ColumnOption::Null => def.nullability = Nullability::Null,
            ColumnOption::NotNull => def.nullability = Nullability::NotNull,
            ColumnOption::Default(e) => def.default_expr = Some(map_expr(e)?),
            ColumnOption::Unique {
                is_primary: true, ..
            } => def.primary_key = true,
            ColumnOption::Unique { .. } => def.unique = true,
            ColumnOption::Check(e) => {
                extras.push(TableDef::Check(CheckConstraintDef {
                    name: opt.name.as_ref().map(normalize_ident),
                    expr: map_expr(e)?,
                    hidden: false,
                }));
            }
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                on_delete,
                on_update,
                ..
            } => {
                def.references = Some(ForeignKeyDef {
                    name: opt.name.as_ref().map(normalize_ident),
                    from_cols: vec![name.clone()],
                    table: normalize_table_name(&foreign_table)?,
                    to_cols: referred_columns.iter().map(normalize_ident).collect(),
                    on_delete: map_referential_action(on_delete),
                    on_update: map_referential_action(on_update),
                    match_method: common::MatchMethod::Simple,
                });
            }
            ColumnOption::Generated {
                generation_expr, ..
            } => {
                let expr = generation_expr.ok_or_else(|| {
                    SqlError::Parser("generated column requires an expression".into())
                })?;
                def.computed = Some(ComputedDef {
                    expr: map_expr(expr)?,
                    virtual_: false,
                });
            }
            other => {
                return Err(SqlError::Parser(format!(
                    "unsupported column option: {other}"
                )))
            }
        }
    }

    Ok((def, extras))
}

fn map_table_constraint(constraint: sqlast::TableConstraint) -> SqlResult<TableDef> {
    use sqlast::TableConstraint;

    match constraint {
        TableConstraint::Unique {
            name,
            columns,
            is_primary,
            ..
        } => {
            if columns.is_empty() {
                return Err(SqlError::Parser(
                    "constraint must include at least one column".into(),
                ));
            }
            let mut index = IndexDef::on(
                columns
                    .iter()
                    .map(|c| IndexElem::asc(normalize_ident(c)))
                    .collect(),
            );
            index.name = name.as_ref().map(normalize_ident);
            Ok(TableDef::Unique(UniqueConstraintDef {
                index,
                primary_key: is_primary,
                without_index: false,
            }))
        }
        TableConstraint::ForeignKey {
            name,
            columns,
            foreign_table,
            referred_columns,
            on_delete,
            on_update,
            ..
        } => Ok(TableDef::ForeignKey(ForeignKeyDef {
            name: name.as_ref().map(normalize_ident),
            from_cols: columns.iter().map(normalize_ident).collect(),
            table: normalize_table_name(&foreign_table)?,
            to_cols: referred_columns.iter().map(normalize_ident).collect(),
            on_delete: map_referential_action(on_delete),
            on_update: map_referential_action(on_update),
            match_method: common::MatchMethod::Simple,
        })),
        TableConstraint::Check { name, expr } => Ok(TableDef::Check(CheckConstraintDef {
            name: name.as_ref().map(normalize_ident),
            expr: map_expr(*expr)?,
            hidden: false,
        })),
        TableConstraint::Index { name, columns, .. } => {
            let mut index = IndexDef::on(
                columns
                    .iter()
                    .map(|c| IndexElem::asc(normalize_ident(c)))
                    .collect(),
            );
            index.name = name.as_ref().map(normalize_ident);
            Ok(TableDef::Index(index))
        }
        other => Err(SqlError::Parser(format!(
            "unsupported table constraint: {other}"
        ))),
    }
}

fn map_referential_action(action: Option<sqlast::ReferentialAction>) -> ForeignKeyAction {
    use sqlast::ReferentialAction as Sql;

    match action {
        None | Some(Sql::NoAction) => ForeignKeyAction::NoAction,
        Some(Sql::Restrict) => ForeignKeyAction::Restrict,
        Some(Sql::Cascade) => ForeignKeyAction::Cascade,
        Some(Sql::SetNull) => ForeignKeyAction::SetNull,
        Some(Sql::SetDefault) => ForeignKeyAction::SetDefault,
    }
}

/// Map a dialect data type by its canonical rendering. Matching on the
/// rendered name keeps one code path for the many spellings each type has.
fn map_data_type(dt: &sqlast::DataType) -> SqlResult<SqlType> {
    sql_type_from_name(&dt.to_string().to_uppercase())
}

pub fn sql_type_from_name(name: &str) -> SqlResult<SqlType> {
    let name = name.trim();
    if let Some(elem) = name.strip_suffix("[]") {
        return Ok(SqlType::Array(Box::new(sql_type_from_name(elem)?)));
    }
    // Length/precision arguments do not change the storage type here.
    let base = match name.find('(') {
        Some(i) => name[..i].trim_end(),
        None => name,
    };
    let ty = match base {
        "INT2" | "SMALLINT" => SqlType::Int2,
        "INT" | "INT4" | "INTEGER" => SqlType::Int4,
        "INT8" | "BIGINT" => SqlType::Int8,
        "FLOAT" | "FLOAT8" | "DOUBLE PRECISION" | "REAL" => SqlType::Float8,
        "DECIMAL" | "NUMERIC" => SqlType::Decimal,
        "BOOL" | "BOOLEAN" => SqlType::Bool,
        "STRING" | "TEXT" | "VARCHAR" | "CHARACTER VARYING" | "CHAR" | "CHARACTER" => {
            SqlType::String
        }
        "BYTES" | "BYTEA" => SqlType::Bytes,
        "TIMESTAMP" | "TIMESTAMPTZ" => SqlType::Timestamp,
        "DATE" => SqlType::Date,
        "GEOGRAPHY" => SqlType::Geography,
        "BOX2D" => SqlType::Box2d,
        "INT2VECTOR" => SqlType::Int2Vector,
        "OIDVECTOR" => SqlType::OidVector,
        _ => {
            if base == "GEOMETRY" {
                let srid = name
                    .find('(')
                    .map(|i| {
                        let inner = name[i + 1..].trim_end_matches(')');
                        inner
                            .rsplit(',')
                            .next()
                            .unwrap_or("0")
                            .trim()
                            .parse::<i32>()
                            .map_err(|_| {
                                SqlError::Parser(format!("invalid GEOMETRY argument: {name}"))
                            })
                    })
                    .transpose()?
                    .unwrap_or(0);
                return Ok(SqlType::Geometry { srid });
            }
            return Err(SqlError::Parser(format!("unsupported data type: {name}")));
        }
    };
    Ok(ty)
}

fn map_expr(expr: sqlast::Expr) -> SqlResult<Expr> {
    use sqlast::Expr as SqlExpr;

    match expr {
        SqlExpr::Identifier(ident) => Ok(Expr::Column {
            table: None,
            name: normalize_ident(&ident),
        }),
        SqlExpr::CompoundIdentifier(idents) => match idents.as_slice() {
            [table, column] => Ok(Expr::Column {
                table: Some(normalize_ident(table)),
                name: normalize_ident(column),
            }),
            [column] => Ok(Expr::Column {
                table: None,
                name: normalize_ident(column),
            }),
            _ => Err(SqlError::Parser(
                "column references may be qualified by at most one table name".into(),
            )),
        },
        SqlExpr::Value(value) => Ok(Expr::Literal(map_value(value)?)),
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::Binary {
            left: Box::new(map_expr(*left)?),
            op: map_binary_op(op)?,
            right: Box::new(map_expr(*right)?),
        }),
        SqlExpr::UnaryOp { op, expr } => Ok(Expr::Unary {
            op: map_unary_op(op)?,
            expr: Box::new(map_expr(*expr)?),
        }),
        SqlExpr::Cast {
            expr, data_type, ..
        } => Ok(Expr::Cast {
            expr: Box::new(map_expr(*expr)?),
            ty: map_data_type(&data_type)?,
        }),
        SqlExpr::InList { expr, list, .. } => Ok(Expr::InTuple {
            expr: Box::new(map_expr(*expr)?),
            list: list
                .into_iter()
                .map(map_expr)
                .collect::<SqlResult<Vec<_>>>()?,
        }),
        SqlExpr::Function(func) => map_function(func),
        SqlExpr::Nested(expr) => map_expr(*expr),
        other => Err(SqlError::Parser(format!("unsupported expr: {other}"))),
    }
}

fn map_function(func: sqlast::Function) -> SqlResult<Expr> {
    let name = func
        .name
        .0
        .last()
        .map(|i| i.value.to_lowercase())
        .ok_or_else(|| SqlError::Parser("invalid function name".into()))?;
    let args = func
        .args
        .into_iter()
        .map(|arg| match arg {
            sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Expr(e)) => map_expr(e),
            other => Err(SqlError::Parser(format!(
                "unsupported function argument: {other}"
            ))),
        })
        .collect::<SqlResult<Vec<_>>>()?;
    if name == "coalesce" {
        return Ok(Expr::Coalesce(args));
    }
    Ok(Expr::Func { name, args })
}

fn map_value(value: sqlast::Value) -> SqlResult<Value> {
    use sqlast::Value as SqlValue;

    match value {
        SqlValue::Number(num, _) => {
            let parsed = num
                .parse::<i64>()
                .map_err(|_| SqlError::Parser(format!("invalid int literal: {num}")))?;
            Ok(Value::Int(parsed))
        }
        SqlValue::SingleQuotedString(s) => Ok(Value::Text(s)),
        SqlValue::Boolean(b) => Ok(Value::Bool(b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(SqlError::Parser(format!("unsupported literal: {other}"))),
    }
}

fn map_binary_op(op: sqlast::BinaryOperator) -> SqlResult<BinaryOp> {
    use sqlast::BinaryOperator as SqlBinary;

    Ok(match op {
        SqlBinary::Eq => BinaryOp::Eq,
        SqlBinary::NotEq => BinaryOp::Ne,
        SqlBinary::Lt => BinaryOp::Lt,
        SqlBinary::LtEq => BinaryOp::Le,
        SqlBinary::Gt => BinaryOp::Gt,
        SqlBinary::GtEq => BinaryOp::Ge,
        SqlBinary::And => BinaryOp::And,
        SqlBinary::Or => BinaryOp::Or,
        SqlBinary::Plus => BinaryOp::Plus,
        SqlBinary::Minus => BinaryOp::Minus,
        other => return Err(SqlError::Parser(format!("unsupported operator: {other}"))),
    })
}

fn map_unary_op(op: sqlast::UnaryOperator) -> SqlResult<UnaryOp> {
    use sqlast::UnaryOperator as SqlUnary;

    match op {
        SqlUnary::Not => Ok(UnaryOp::Not),
        other => Err(SqlError::Parser(format!(
            "unsupported unary operator: {other}"
        ))),
    }
}

fn normalize_ident(ident: &sqlast::Ident) -> String {
    ident.value.to_lowercase()
}

fn normalize_table_name(name: &sqlast::ObjectName) -> SqlResult<TableName> {
    match name.0.as_slice() {
        [table] => Ok(TableName {
            schema: None,
            table: normalize_ident(table),
        }),
        [schema, table] => Ok(TableName {
            schema: Some(normalize_ident(schema)),
            table: normalize_ident(table),
        }),
        _ => Err(SqlError::Parser(format!(
            "table names may have at most two parts: {name}"
        ))),
    }
}
