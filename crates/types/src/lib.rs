use std::cmp::Ordering;
use std::fmt;

/// Semantic SQL column types understood by the descriptor engine.
///
/// `Int2Vector` and `OidVector` are legacy wire-compat types; they exist so
/// the engine can reject them on physical tables with a typed error.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int2,
    Int4,
    Int8,
    Float8,
    Decimal,
    Bool,
    String,
    Bytes,
    Timestamp,
    Date,
    Geometry { srid: i32 },
    Geography,
    Box2d,
    Array(Box<SqlType>),
    Int2Vector,
    OidVector,
}

/// Type family, the granularity at which version gates and FK column
/// compatibility are decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Int,
    Float,
    Decimal,
    Bool,
    String,
    Bytes,
    Timestamp,
    Date,
    Geometry,
    Geography,
    Box2d,
    Array,
}

impl SqlType {
    pub fn family(&self) -> TypeFamily {
        match self {
            SqlType::Int2 | SqlType::Int4 | SqlType::Int8 => TypeFamily::Int,
            SqlType::Float8 => TypeFamily::Float,
            SqlType::Decimal => TypeFamily::Decimal,
            SqlType::Bool => TypeFamily::Bool,
            SqlType::String => TypeFamily::String,
            SqlType::Bytes => TypeFamily::Bytes,
            SqlType::Timestamp => TypeFamily::Timestamp,
            SqlType::Date => TypeFamily::Date,
            SqlType::Geometry { .. } => TypeFamily::Geometry,
            SqlType::Geography => TypeFamily::Geography,
            SqlType::Box2d => TypeFamily::Box2d,
            SqlType::Array(_) => TypeFamily::Array,
            // Vector types are rejected before family checks matter; treat
            // them as int arrays for error paths.
            SqlType::Int2Vector | SqlType::OidVector => TypeFamily::Array,
        }
    }

    /// Family used for version gating: arrays gate on their element family.
    pub fn gating_family(&self) -> TypeFamily {
        match self {
            SqlType::Array(inner) => inner.gating_family(),
            other => other.family(),
        }
    }

    /// Whether two types may be paired across a foreign key (same family,
    /// element-wise for arrays).
    pub fn equivalent(&self, other: &SqlType) -> bool {
        match (self, other) {
            (SqlType::Array(a), SqlType::Array(b)) => a.equivalent(b),
            _ => self.family() == other.family(),
        }
    }

    /// Exact type identity, required for interleave prefix columns.
    pub fn identical(&self, other: &SqlType) -> bool {
        self == other
    }

    /// True for the unsupported legacy vector types.
    pub fn is_vector(&self) -> bool {
        matches!(self, SqlType::Int2Vector | SqlType::OidVector)
    }

    /// SRID of a geometry type, 0 otherwise.
    pub fn geo_srid_or_zero(&self) -> i32 {
        match self {
            SqlType::Geometry { srid } => *srid,
            _ => 0,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Int2 => f.write_str("INT2"),
            SqlType::Int4 => f.write_str("INT4"),
            SqlType::Int8 => f.write_str("INT8"),
            SqlType::Float8 => f.write_str("FLOAT8"),
            SqlType::Decimal => f.write_str("DECIMAL"),
            SqlType::Bool => f.write_str("BOOL"),
            SqlType::String => f.write_str("STRING"),
            SqlType::Bytes => f.write_str("BYTES"),
            SqlType::Timestamp => f.write_str("TIMESTAMP"),
            SqlType::Date => f.write_str("DATE"),
            SqlType::Geometry { srid: 0 } => f.write_str("GEOMETRY"),
            SqlType::Geometry { srid } => write!(f, "GEOMETRY({srid})"),
            SqlType::Geography => f.write_str("GEOGRAPHY"),
            SqlType::Box2d => f.write_str("BOX2D"),
            SqlType::Array(inner) => write!(f, "{inner}[]"),
            SqlType::Int2Vector => f.write_str("INT2VECTOR"),
            SqlType::OidVector => f.write_str("OIDVECTOR"),
        }
    }
}

/// Runtime value, used when evaluating default expressions and shard bucket
/// counts during descriptor construction.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i64),
    Text(String),
    Bool(bool),
    Null,
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}
