//! MongoDB-style query filters.
//!
//! A query is itself a JSON object (`{"age":{"$gt":30}}`); `compile` parses
//! it with the same zero-copy object parser used for records and converts
//! it into an owned `Filter` tree. `eval::matches` decides whether a parsed
//! record satisfies the tree.

pub mod compile;
pub mod eval;

use regex::bytes::Regex;

/// Longest string slice the regex operator will look at. Longer haystacks
/// never match.
pub const REGEX_HAYSTACK_MAX: usize = 4096;

/// Comparison operators (`$eq` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Logical connectives (`$and`, `$or`, `$not`, `$nor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
    Nor,
}

/// Membership operators (`$in`, `$nin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    In,
    Nin,
}

/// Dynamic type names accepted by `$type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl TypeName {
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"null" => Some(TypeName::Null),
            b"bool" => Some(TypeName::Bool),
            b"number" => Some(TypeName::Number),
            b"string" => Some(TypeName::String),
            b"array" => Some(TypeName::Array),
            b"object" => Some(TypeName::Object),
            _ => None,
        }
    }
}

/// A query right-hand side, owned by the filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(Vec<u8>),
}

/// A dotted field path, split once at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Vec<u8>>,
}

impl FieldPath {
    /// Split a key on `.` into resolution segments.
    pub fn new(key: &[u8]) -> Self {
        FieldPath {
            segments: key.split(|&b| b == b'.').map(<[u8]>::to_vec).collect(),
        }
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }
}

/// Compiled filter tree. Owns its literals and regex handles; dropping the
/// tree releases everything.
#[derive(Debug)]
pub enum Filter {
    /// The empty query `{}`.
    AlwaysTrue,
    Comparison {
        path: FieldPath,
        op: CmpOp,
        literal: Literal,
    },
    Logical {
        op: LogicalOp,
        operands: Vec<Filter>,
    },
    ArrayOp {
        path: FieldPath,
        op: SetOp,
        literals: Vec<Literal>,
    },
    Exists {
        path: FieldPath,
        should_exist: bool,
    },
    Regex {
        path: FieldPath,
        regex: Regex,
        pattern: String,
        options: String,
    },
    Size {
        path: FieldPath,
        n: usize,
    },
    Type {
        path: FieldPath,
        type_name: TypeName,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid operator: {0}")]
    InvalidOperator(String),
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("expected an object for {0}")]
    ExpectedObject(String),
    #[error("expected an array for {0}")]
    ExpectedArray(String),
    #[error("unsupported value type for {0}")]
    UnsupportedValueType(String),
    #[error("unsupported query structure")]
    UnsupportedQueryStructure,
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Compile a query byte string into a filter tree.
pub fn compile(query: &[u8]) -> Result<Filter, QueryError> {
    compile::compile(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_path_split() {
        let p = FieldPath::new(b"u.addr.city");
        assert_eq!(
            p.segments(),
            &[b"u".to_vec(), b"addr".to_vec(), b"city".to_vec()]
        );
    }

    #[test]
    fn field_path_single_segment() {
        let p = FieldPath::new(b"name");
        assert_eq!(p.segments(), &[b"name".to_vec()]);
    }

    #[test]
    fn type_names() {
        assert_eq!(TypeName::from_name(b"string"), Some(TypeName::String));
        assert_eq!(TypeName::from_name(b"number"), Some(TypeName::Number));
        assert_eq!(TypeName::from_name(b"bool"), Some(TypeName::Bool));
        assert_eq!(TypeName::from_name(b"null"), Some(TypeName::Null));
        assert_eq!(TypeName::from_name(b"array"), Some(TypeName::Array));
        assert_eq!(TypeName::from_name(b"object"), Some(TypeName::Object));
        assert_eq!(TypeName::from_name(b"boolean"), None);
        assert_eq!(TypeName::from_name(b""), None);
    }
}
