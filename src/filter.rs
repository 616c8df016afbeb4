//! The `field.op=value` query-string filter DSL used by the master's list
//! endpoints.
//!
//! Accepted operations: `eq`, `ne`, `gt`, `ge`, `lt`, `le`, `like`. A bare
//! `field=value` (no `.op`) is treated as `eq`. Unknown fields are ignored
//! by the caller, not rejected here -- parsing is permissive, matching is
//! where fields get validated against an entity.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

impl Op {
    fn parse(s: &str) -> Option<Op> {
        match s {
            "eq" => Some(Op::Eq),
            "ne" => Some(Op::Ne),
            "gt" => Some(Op::Gt),
            "ge" => Some(Op::Ge),
            "lt" => Some(Op::Lt),
            "le" => Some(Op::Le),
            "like" => Some(Op::Like),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: String,
}

/// Parse a raw query string (e.g. `"name.eq=web&count.gt=2"`) into a list
/// of filters. A key with no recognized `.op` suffix defaults to `Eq` on
/// the whole key.
pub fn parse_filters(query: &str) -> Vec<Filter> {
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .map(|(key, value)| {
            let key = key.into_owned();
            let value = value.into_owned();
            match key.rfind('.') {
                Some(idx) => {
                    let (field, op_str) = key.split_at(idx);
                    let op_str = &op_str[1..];
                    match Op::parse(op_str) {
                        Some(op) => Filter { field: field.to_owned(), op, value },
                        None => Filter { field: key, op: Op::Eq, value },
                    }
                }
                None => Filter { field: key, op: Op::Eq, value },
            }
        })
        .collect()
}

/// The dynamically-typed value of one field on one entity, used to drive
/// comparisons without reflection.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::Int(n) => write!(f, "{}", n),
            FieldValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl Filter {
    /// Evaluate this filter's operation against one entity field value,
    /// parsing `self.value` as whatever type `actual` is.
    pub fn matches(&self, actual: &FieldValue) -> bool {
        match actual {
            FieldValue::Str(s) => {
                if self.op == Op::Like {
                    return s.contains(&self.value);
                }
                compare_ord(s.as_str(), self.value.as_str(), self.op)
            }
            FieldValue::Int(n) => match self.value.parse::<i64>() {
                Ok(v) => compare_ord(n, &v, self.op),
                Err(_) => false,
            },
            FieldValue::Bool(b) => match self.value.parse::<bool>() {
                Ok(v) => self.op == Op::Eq && *b == v,
                Err(_) => false,
            },
        }
    }
}

fn compare_ord<T: PartialOrd>(actual: T, want: T, op: Op) -> bool {
    match op {
        Op::Eq => actual == want,
        Op::Ne => actual != want,
        Op::Gt => actual > want,
        Op::Ge => actual >= want,
        Op::Lt => actual < want,
        Op::Le => actual <= want,
        Op::Like => false,
    }
}

/// Implemented per entity (`Definition`, `Node`, `Container`) so the list
/// endpoints can evaluate filters without runtime reflection.
pub trait Filterable {
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl Filterable for crate::model::Container {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::Str(self.name.clone())),
            "definitionName" => Some(FieldValue::Str(self.definition_name.clone())),
            "image" => Some(FieldValue::Str(self.image.clone())),
            "nodeName" => Some(FieldValue::Str(self.node_name.clone())),
            "containerId" => Some(FieldValue::Str(self.container_id.clone())),
            "running" => Some(FieldValue::Bool(self.running)),
            "httpPort" => self.http_port.map(|p| FieldValue::Int(p as i64)),
            "nodeHttpPort" => self.node_http_port.map(|p| FieldValue::Int(p as i64)),
            _ => None,
        }
    }
}

impl Filterable for crate::model::Node {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::Str(self.name.clone())),
            "addr" => Some(FieldValue::Str(self.addr.clone())),
            "enabled" => Some(FieldValue::Bool(self.enabled)),
            _ => None,
        }
    }
}

impl Filterable for crate::model::Definition {
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::Str(self.name.clone())),
            "image" => Some(FieldValue::Str(self.image.clone())),
            "count" => Some(FieldValue::Int(self.count as i64)),
            "httpPort" => self.http_port.map(|p| FieldValue::Int(p as i64)),
            _ => None,
        }
    }
}

/// `true` iff `item` matches every filter whose field is recognized;
/// filters naming an unknown field are ignored rather than rejected.
pub fn matches_all<T: Filterable>(item: &T, filters: &[Filter]) -> bool {
    filters.iter().all(|f| match item.field(&f.field) {
        Some(value) => f.matches(&value),
        None => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Container;

    #[test]
    fn parses_default_eq() {
        let filters = parse_filters("name=web");
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].field, "name");
        assert_eq!(filters[0].op, Op::Eq);
    }

    #[test]
    fn parses_explicit_ops() {
        let filters = parse_filters("age.gt=3&name.eq=fred");
        assert_eq!(filters[0].field, "age");
        assert_eq!(filters[0].op, Op::Gt);
        assert_eq!(filters[1].field, "name");
        assert_eq!(filters[1].op, Op::Eq);
    }

    #[test]
    fn matches_container_by_definition_name() {
        let c = Container { definition_name: "web".into(), ..Default::default() };
        let filters = parse_filters("definitionName.eq=web");
        assert!(matches_all(&c, &filters));
        let filters = parse_filters("definitionName.eq=db");
        assert!(!matches_all(&c, &filters));
    }

    #[test]
    fn unknown_field_is_ignored() {
        let c = Container::default();
        let filters = parse_filters("bogusField.eq=whatever");
        assert!(matches_all(&c, &filters));
    }

    #[test]
    fn like_is_substring_match() {
        let c = Container { name: "web-17".into(), ..Default::default() };
        let filters = parse_filters("name.like=web-");
        assert!(matches_all(&c, &filters));
    }
}
