//! Query compilation: parsed query object → owned filter tree.
//!
//! Regular expressions compile exactly once, here; the evaluator only ever
//! runs pre-built handles.

use regex::bytes::RegexBuilder;

use super::{CmpOp, FieldPath, Filter, Literal, LogicalOp, QueryError, SetOp, TypeName};
use crate::parse::{self, JsonValue, ParsedObject};

/// Compile a query byte string into a filter tree.
pub fn compile(query: &[u8]) -> Result<Filter, QueryError> {
    let obj = parse::parse_object(query)
        .map_err(|e| QueryError::InvalidQuery(format!("query is not a JSON object: {e}")))?;
    filter_from_object(&obj)
}

/// Convert a query object into a filter. Multiple pairs AND together.
fn filter_from_object(obj: &ParsedObject<'_>) -> Result<Filter, QueryError> {
    if obj.is_empty() {
        return Ok(Filter::AlwaysTrue);
    }
    let mut operands = Vec::with_capacity(obj.len());
    for (key, value) in obj.fields() {
        operands.push(pair_to_filter(key, value)?);
    }
    Ok(if operands.len() == 1 {
        operands.pop().unwrap()
    } else {
        Filter::Logical {
            op: LogicalOp::And,
            operands,
        }
    })
}

fn pair_to_filter(key: &[u8], value: &JsonValue<'_>) -> Result<Filter, QueryError> {
    if key.first() == Some(&b'$') {
        let op = match key {
            b"$and" => LogicalOp::And,
            b"$or" => LogicalOp::Or,
            b"$nor" => LogicalOp::Nor,
            b"$not" => {
                let inner = match value {
                    JsonValue::Object(o) => filter_from_object(o)?,
                    _ => return Err(QueryError::ExpectedObject(display_key(key))),
                };
                return Ok(Filter::Logical {
                    op: LogicalOp::Not,
                    operands: vec![inner],
                });
            }
            _ => return Err(QueryError::InvalidOperator(display_key(key))),
        };
        let elems = match value {
            JsonValue::Array(a) => a,
            _ => return Err(QueryError::ExpectedArray(display_key(key))),
        };
        let mut operands = Vec::with_capacity(elems.len());
        for elem in elems {
            match elem {
                JsonValue::Object(o) => operands.push(filter_from_object(o)?),
                _ => return Err(QueryError::ExpectedObject(display_key(key))),
            }
        }
        Ok(Filter::Logical { op, operands })
    } else {
        field_filter(key, value)
    }
}

/// Per-field filter from `(field_key, field_value)`.
fn field_filter(field_key: &[u8], value: &JsonValue<'_>) -> Result<Filter, QueryError> {
    match value {
        // Bare scalar is shorthand for equality
        JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => {
            Ok(Filter::Comparison {
                path: FieldPath::new(field_key),
                op: CmpOp::Eq,
                literal: scalar_literal(value, field_key)?,
            })
        }
        JsonValue::Object(ops) => operator_filters(field_key, ops),
        JsonValue::Array(_) => Err(QueryError::UnsupportedValueType(display_key(field_key))),
    }
}

/// Build the filter(s) for one field's operator object. `$regex`/`$options`
/// are gathered as a single unit; everything else maps to one node each.
fn operator_filters(field_key: &[u8], ops: &ParsedObject<'_>) -> Result<Filter, QueryError> {
    if ops.is_empty() {
        return Err(QueryError::UnsupportedQueryStructure);
    }

    let mut filters = Vec::new();
    let mut regex_pattern: Option<&[u8]> = None;
    let mut regex_options: Option<&[u8]> = None;

    for (op, value) in ops.fields() {
        match *op {
            b"$regex" => match value {
                JsonValue::String(s) => regex_pattern = Some(*s),
                _ => return Err(QueryError::UnsupportedValueType(display_key(op))),
            },
            b"$options" => match value {
                JsonValue::String(s) => regex_options = Some(*s),
                _ => return Err(QueryError::UnsupportedValueType(display_key(op))),
            },
            b"$eq" => filters.push(comparison(field_key, CmpOp::Eq, value, op)?),
            b"$ne" => filters.push(comparison(field_key, CmpOp::Ne, value, op)?),
            b"$gt" => filters.push(comparison(field_key, CmpOp::Gt, value, op)?),
            b"$gte" => filters.push(comparison(field_key, CmpOp::Gte, value, op)?),
            b"$lt" => filters.push(comparison(field_key, CmpOp::Lt, value, op)?),
            b"$lte" => filters.push(comparison(field_key, CmpOp::Lte, value, op)?),
            b"$in" => filters.push(membership(field_key, SetOp::In, value, op)?),
            b"$nin" => filters.push(membership(field_key, SetOp::Nin, value, op)?),
            b"$exists" => match value {
                JsonValue::Bool(b) => filters.push(Filter::Exists {
                    path: FieldPath::new(field_key),
                    should_exist: *b,
                }),
                _ => return Err(QueryError::UnsupportedValueType(display_key(op))),
            },
            b"$size" => {
                let n = value
                    .as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .ok_or_else(|| QueryError::UnsupportedValueType(display_key(op)))?;
                filters.push(Filter::Size {
                    path: FieldPath::new(field_key),
                    n: n as usize,
                });
            }
            b"$type" => match value {
                JsonValue::String(name) => {
                    let type_name = TypeName::from_name(name).ok_or_else(|| {
                        QueryError::InvalidQuery(format!(
                            "unknown type name: {}",
                            String::from_utf8_lossy(name)
                        ))
                    })?;
                    filters.push(Filter::Type {
                        path: FieldPath::new(field_key),
                        type_name,
                    });
                }
                _ => return Err(QueryError::UnsupportedValueType(display_key(op))),
            },
            // `$not` nested under a field negates that field's filter
            b"$not" => match value {
                JsonValue::Object(inner) => filters.push(Filter::Logical {
                    op: LogicalOp::Not,
                    operands: vec![operator_filters(field_key, inner)?],
                }),
                _ => return Err(QueryError::ExpectedObject(display_key(op))),
            },
            _ if op.first() == Some(&b'$') => {
                return Err(QueryError::UnsupportedOperator(display_key(op)));
            }
            _ => return Err(QueryError::UnsupportedQueryStructure),
        }
    }

    match (regex_pattern, regex_options) {
        (Some(pattern), opts) => {
            let options = String::from_utf8_lossy(opts.unwrap_or_default()).into_owned();
            let pattern = String::from_utf8_lossy(pattern).into_owned();
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(options.contains('i'))
                .build()
                .map_err(|e| QueryError::InvalidQuery(format!("bad regex: {e}")))?;
            filters.push(Filter::Regex {
                path: FieldPath::new(field_key),
                regex,
                pattern,
                options,
            });
        }
        (None, Some(_)) => {
            return Err(QueryError::InvalidQuery(
                "$options without $regex".to_string(),
            ));
        }
        (None, None) => {}
    }

    match filters.len() {
        0 => Err(QueryError::UnsupportedQueryStructure),
        1 => Ok(filters.pop().unwrap()),
        _ => Ok(Filter::Logical {
            op: LogicalOp::And,
            operands: filters,
        }),
    }
}

fn comparison(
    field_key: &[u8],
    op: CmpOp,
    value: &JsonValue<'_>,
    op_key: &[u8],
) -> Result<Filter, QueryError> {
    Ok(Filter::Comparison {
        path: FieldPath::new(field_key),
        op,
        literal: scalar_literal(value, op_key)?,
    })
}

fn membership(
    field_key: &[u8],
    op: SetOp,
    value: &JsonValue<'_>,
    op_key: &[u8],
) -> Result<Filter, QueryError> {
    let elems = match value {
        JsonValue::Array(a) => a,
        _ => return Err(QueryError::ExpectedArray(display_key(op_key))),
    };
    let mut literals = Vec::with_capacity(elems.len());
    for elem in elems {
        literals.push(scalar_literal(elem, op_key)?);
    }
    Ok(Filter::ArrayOp {
        path: FieldPath::new(field_key),
        op,
        literals,
    })
}

/// Owned literal from a scalar query value.
fn scalar_literal(value: &JsonValue<'_>, context: &[u8]) -> Result<Literal, QueryError> {
    match value {
        JsonValue::Null => Ok(Literal::Null),
        JsonValue::Bool(b) => Ok(Literal::Bool(*b)),
        JsonValue::Number(s) => parse::number_to_f64(s)
            .map(Literal::Number)
            .ok_or_else(|| QueryError::InvalidQuery(format!(
                "bad number literal: {}",
                String::from_utf8_lossy(s)
            ))),
        JsonValue::String(s) => Ok(Literal::String(s.to_vec())),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            Err(QueryError::UnsupportedValueType(display_key(context)))
        }
    }
}

fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(q: &str) -> Filter {
        compile(q.as_bytes()).expect("compile failed")
    }

    fn compile_err(q: &str) -> QueryError {
        compile(q.as_bytes()).expect_err("compile unexpectedly succeeded")
    }

    #[test]
    fn empty_query_is_always_true() {
        assert!(matches!(compile_ok("{}"), Filter::AlwaysTrue));
    }

    #[test]
    fn bare_scalar_is_eq() {
        match compile_ok(r#"{"name":"alice"}"#) {
            Filter::Comparison { path, op, literal } => {
                assert_eq!(path, FieldPath::new(b"name"));
                assert_eq!(op, CmpOp::Eq);
                assert_eq!(literal, Literal::String(b"alice".to_vec()));
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn bare_number_and_null_and_bool() {
        match compile_ok(r#"{"a":1}"#) {
            Filter::Comparison { literal, .. } => assert_eq!(literal, Literal::Number(1.0)),
            other => panic!("{other:?}"),
        }
        match compile_ok(r#"{"a":null}"#) {
            Filter::Comparison { literal, .. } => assert_eq!(literal, Literal::Null),
            other => panic!("{other:?}"),
        }
        match compile_ok(r#"{"a":true}"#) {
            Filter::Comparison { literal, .. } => assert_eq!(literal, Literal::Bool(true)),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn comparison_operators() {
        for (q, want) in [
            (r#"{"a":{"$eq":1}}"#, CmpOp::Eq),
            (r#"{"a":{"$ne":1}}"#, CmpOp::Ne),
            (r#"{"a":{"$gt":1}}"#, CmpOp::Gt),
            (r#"{"a":{"$gte":1}}"#, CmpOp::Gte),
            (r#"{"a":{"$lt":1}}"#, CmpOp::Lt),
            (r#"{"a":{"$lte":1}}"#, CmpOp::Lte),
        ] {
            match compile_ok(q) {
                Filter::Comparison { op, .. } => assert_eq!(op, want, "query {q}"),
                other => panic!("expected comparison for {q}, got {other:?}"),
            }
        }
    }

    #[test]
    fn multiple_operators_and_together() {
        match compile_ok(r#"{"a":{"$gte":1,"$lte":9}}"#) {
            Filter::Logical { op, operands } => {
                assert_eq!(op, LogicalOp::And);
                assert_eq!(operands.len(), 2);
            }
            other => panic!("expected logical, got {other:?}"),
        }
    }

    #[test]
    fn multiple_fields_and_together() {
        match compile_ok(r#"{"a":1,"b":2}"#) {
            Filter::Logical { op, operands } => {
                assert_eq!(op, LogicalOp::And);
                assert_eq!(operands.len(), 2);
            }
            other => panic!("expected logical, got {other:?}"),
        }
    }

    #[test]
    fn logical_connectives() {
        match compile_ok(r#"{"$or":[{"a":1},{"b":2}]}"#) {
            Filter::Logical { op, operands } => {
                assert_eq!(op, LogicalOp::Or);
                assert_eq!(operands.len(), 2);
            }
            other => panic!("{other:?}"),
        }
        match compile_ok(r#"{"$and":[{"a":1}]}"#) {
            Filter::Logical { op, .. } => assert_eq!(op, LogicalOp::And),
            other => panic!("{other:?}"),
        }
        match compile_ok(r#"{"$nor":[{"a":1}]}"#) {
            Filter::Logical { op, .. } => assert_eq!(op, LogicalOp::Nor),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn top_level_not() {
        match compile_ok(r#"{"$not":{"a":1}}"#) {
            Filter::Logical { op, operands } => {
                assert_eq!(op, LogicalOp::Not);
                assert_eq!(operands.len(), 1);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn field_level_not() {
        match compile_ok(r#"{"a":{"$not":{"$gt":5}}}"#) {
            Filter::Logical { op, operands } => {
                assert_eq!(op, LogicalOp::Not);
                assert!(matches!(
                    operands[0],
                    Filter::Comparison { op: CmpOp::Gt, .. }
                ));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn membership_operators() {
        match compile_ok(r#"{"a":{"$in":[1,"x",null]}}"#) {
            Filter::ArrayOp { op, literals, .. } => {
                assert_eq!(op, SetOp::In);
                assert_eq!(
                    literals,
                    vec![
                        Literal::Number(1.0),
                        Literal::String(b"x".to_vec()),
                        Literal::Null
                    ]
                );
            }
            other => panic!("{other:?}"),
        }
        assert!(matches!(
            compile_ok(r#"{"a":{"$nin":[1]}}"#),
            Filter::ArrayOp { op: SetOp::Nin, .. }
        ));
    }

    #[test]
    fn exists_size_type() {
        assert!(matches!(
            compile_ok(r#"{"a":{"$exists":true}}"#),
            Filter::Exists {
                should_exist: true,
                ..
            }
        ));
        assert!(matches!(
            compile_ok(r#"{"a":{"$exists":false}}"#),
            Filter::Exists {
                should_exist: false,
                ..
            }
        ));
        assert!(matches!(
            compile_ok(r#"{"a":{"$size":2}}"#),
            Filter::Size { n: 2, .. }
        ));
        assert!(matches!(
            compile_ok(r#"{"a":{"$type":"string"}}"#),
            Filter::Type {
                type_name: TypeName::String,
                ..
            }
        ));
    }

    #[test]
    fn regex_with_options() {
        match compile_ok(r#"{"name":{"$regex":"^ali","$options":"i"}}"#) {
            Filter::Regex {
                regex,
                pattern,
                options,
                ..
            } => {
                assert_eq!(pattern, "^ali");
                assert_eq!(options, "i");
                assert!(regex.is_match(b"ALICE"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn regex_without_options() {
        match compile_ok(r#"{"name":{"$regex":"^ali"}}"#) {
            Filter::Regex { regex, options, .. } => {
                assert!(options.is_empty());
                assert!(regex.is_match(b"alice"));
                assert!(!regex.is_match(b"ALICE"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn regex_combined_with_other_operator() {
        // $regex/$options plus another operator AND together
        match compile_ok(r#"{"name":{"$regex":"a","$exists":true}}"#) {
            Filter::Logical { op, operands } => {
                assert_eq!(op, LogicalOp::And);
                assert_eq!(operands.len(), 2);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn dotted_path_split_at_compile() {
        match compile_ok(r#"{"u.age":{"$gt":30}}"#) {
            Filter::Comparison { path, .. } => {
                assert_eq!(path, FieldPath::new(b"u.age"));
                assert_eq!(path.segments().len(), 2);
            }
            other => panic!("{other:?}"),
        }
    }

    // --- Errors ---

    #[test]
    fn malformed_query_json() {
        assert!(matches!(compile_err("not json"), QueryError::InvalidQuery(_)));
        assert!(matches!(compile_err("[1,2]"), QueryError::InvalidQuery(_)));
    }

    #[test]
    fn unknown_dollar_top_level() {
        assert!(matches!(
            compile_err(r#"{"$xor":[{"a":1}]}"#),
            QueryError::InvalidOperator(_)
        ));
    }

    #[test]
    fn unknown_dollar_field_operator() {
        assert!(matches!(
            compile_err(r#"{"a":{"$near":1}}"#),
            QueryError::UnsupportedOperator(_)
        ));
    }

    #[test]
    fn logical_requires_array() {
        assert!(matches!(
            compile_err(r#"{"$or":{"a":1}}"#),
            QueryError::ExpectedArray(_)
        ));
    }

    #[test]
    fn logical_operands_must_be_objects() {
        assert!(matches!(
            compile_err(r#"{"$or":[1,2]}"#),
            QueryError::ExpectedObject(_)
        ));
    }

    #[test]
    fn membership_requires_array() {
        assert!(matches!(
            compile_err(r#"{"a":{"$in":5}}"#),
            QueryError::ExpectedArray(_)
        ));
    }

    #[test]
    fn bare_array_value_rejected() {
        assert!(matches!(
            compile_err(r#"{"a":[1,2]}"#),
            QueryError::UnsupportedValueType(_)
        ));
    }

    #[test]
    fn mixed_plain_key_in_operator_object() {
        assert!(matches!(
            compile_err(r#"{"a":{"b":1}}"#),
            QueryError::UnsupportedQueryStructure
        ));
    }

    #[test]
    fn options_without_regex() {
        assert!(matches!(
            compile_err(r#"{"a":{"$options":"i"}}"#),
            QueryError::InvalidQuery(_)
        ));
    }

    #[test]
    fn bad_size() {
        assert!(matches!(
            compile_err(r#"{"a":{"$size":-1}}"#),
            QueryError::UnsupportedValueType(_)
        ));
        assert!(matches!(
            compile_err(r#"{"a":{"$size":1.5}}"#),
            QueryError::UnsupportedValueType(_)
        ));
        assert!(matches!(
            compile_err(r#"{"a":{"$size":"two"}}"#),
            QueryError::UnsupportedValueType(_)
        ));
    }

    #[test]
    fn bad_type_name() {
        assert!(matches!(
            compile_err(r#"{"a":{"$type":"boolean"}}"#),
            QueryError::InvalidQuery(_)
        ));
    }

    #[test]
    fn bad_regex_pattern() {
        assert!(matches!(
            compile_err(r#"{"a":{"$regex":"["}}"#),
            QueryError::InvalidQuery(_)
        ));
    }

    #[test]
    fn exists_requires_bool() {
        assert!(matches!(
            compile_err(r#"{"a":{"$exists":1}}"#),
            QueryError::UnsupportedValueType(_)
        ));
    }
}
