//! Filter evaluation over parsed records.
//!
//! `matches` is a pure function of `(object, filter)`. Nothing on this path
//! allocates; number literals convert lazily, string comparisons run on the
//! raw undecoded slices, and recursion is bounded by the filter tree depth.

use std::cmp::Ordering;

use super::{CmpOp, FieldPath, Filter, Literal, LogicalOp, REGEX_HAYSTACK_MAX, SetOp, TypeName};
use crate::parse::{JsonValue, ParsedObject, number_to_f64};

/// Does `obj` satisfy `filter`?
pub fn matches(obj: &ParsedObject<'_>, filter: &Filter) -> bool {
    match filter {
        Filter::AlwaysTrue => true,
        Filter::Comparison { path, op, literal } => match resolve_path(obj, path) {
            Some(v) => compare(v, *op, literal),
            None => false,
        },
        Filter::Logical { op, operands } => match op {
            LogicalOp::And => operands.iter().all(|f| matches(obj, f)),
            LogicalOp::Or => operands.iter().any(|f| matches(obj, f)),
            // `$not` carries one operand; `$nor` any number. Both are
            // "no operand matches".
            LogicalOp::Not | LogicalOp::Nor => !operands.iter().any(|f| matches(obj, f)),
        },
        Filter::ArrayOp { path, op, literals } => {
            let contained = match resolve_path(obj, path) {
                Some(v) => set_contains(v, literals),
                // Absent field: $in never matches, $nin always does
                None => false,
            };
            match op {
                SetOp::In => contained,
                SetOp::Nin => !contained,
            }
        }
        Filter::Exists { path, should_exist } => resolve_path(obj, path).is_some() == *should_exist,
        Filter::Regex { path, regex, .. } => match resolve_path(obj, path) {
            Some(JsonValue::String(s)) if s.len() <= REGEX_HAYSTACK_MAX => regex.is_match(s),
            _ => false,
        },
        Filter::Size { path, n } => {
            matches!(resolve_path(obj, path), Some(JsonValue::Array(a)) if a.len() == *n)
        }
        Filter::Type { path, type_name } => {
            let actual = match resolve_path(obj, path) {
                Some(v) => kind_of(v),
                // Missing field reads as null
                None => TypeName::Null,
            };
            actual == *type_name
        }
    }
}

/// Walk a dotted path through nested objects. Arrays are not traversed.
/// Shared with the serializer for `--select` projection.
pub fn resolve_path<'a, 'b>(
    obj: &'b ParsedObject<'a>,
    path: &FieldPath,
) -> Option<&'b JsonValue<'a>> {
    let (first, rest) = path.segments().split_first()?;
    let mut cur = obj.get(first)?;
    for seg in rest {
        match cur {
            JsonValue::Object(inner) => cur = inner.get(seg)?,
            _ => return None,
        }
    }
    Some(cur)
}

fn compare(v: &JsonValue<'_>, op: CmpOp, lit: &Literal) -> bool {
    match op {
        CmpOp::Eq => eq(v, lit),
        // Type mismatch makes $ne false as well, matching equality's
        // variant rule
        CmpOp::Ne => same_type(v, lit) && !eq(v, lit),
        CmpOp::Gt => ord(v, lit) == Some(Ordering::Greater),
        CmpOp::Gte => matches!(ord(v, lit), Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::Lt => ord(v, lit) == Some(Ordering::Less),
        CmpOp::Lte => matches!(ord(v, lit), Some(Ordering::Less | Ordering::Equal)),
    }
}

fn eq(v: &JsonValue<'_>, lit: &Literal) -> bool {
    match (v, lit) {
        (JsonValue::Null, Literal::Null) => true,
        (JsonValue::Bool(a), Literal::Bool(b)) => a == b,
        (JsonValue::Number(s), Literal::Number(n)) => number_to_f64(s) == Some(*n),
        (JsonValue::String(s), Literal::String(t)) => *s == t.as_slice(),
        _ => false,
    }
}

fn same_type(v: &JsonValue<'_>, lit: &Literal) -> bool {
    matches!(
        (v, lit),
        (JsonValue::Null, Literal::Null)
            | (JsonValue::Bool(_), Literal::Bool(_))
            | (JsonValue::Number(_), Literal::Number(_))
            | (JsonValue::String(_), Literal::String(_))
    )
}

/// Ordering is defined for number-vs-number (IEEE-754 on finite values) and
/// string-vs-string (byte-lexicographic) only.
fn ord(v: &JsonValue<'_>, lit: &Literal) -> Option<Ordering> {
    match (v, lit) {
        (JsonValue::Number(s), Literal::Number(n)) => number_to_f64(s)?.partial_cmp(n),
        (JsonValue::String(s), Literal::String(t)) => Some(s.cmp(&t.as_slice())),
        _ => None,
    }
}

/// `$in` membership: a scalar field equals any literal, or any element of an
/// array field equals any literal.
fn set_contains(v: &JsonValue<'_>, literals: &[Literal]) -> bool {
    match v {
        JsonValue::Array(elems) => elems
            .iter()
            .any(|e| literals.iter().any(|l| eq(e, l))),
        scalar => literals.iter().any(|l| eq(scalar, l)),
    }
}

fn kind_of(v: &JsonValue<'_>) -> TypeName {
    match v {
        JsonValue::Null => TypeName::Null,
        JsonValue::Bool(_) => TypeName::Bool,
        JsonValue::Number(_) => TypeName::Number,
        JsonValue::String(_) => TypeName::String,
        JsonValue::Array(_) => TypeName::Array,
        JsonValue::Object(_) => TypeName::Object,
    }
}
