//! Argument suffix protocol
//!
//! Filter arguments are named `<field><Suffix>`: `nameLike`, `idIn`, `parentCategoryIdIsNull`.
//! The protocol maps a field and an operator to an argument name and back again.
//! Suffixes are matched longest first, so `idNotIn` never decodes as `idNot` + `In`.
//! Keys that match nothing decode to [`Decoded::Ignored`] instead of failing.
//!
//! Four reserved names (`orderBy`, `orderByDesc`, `limit`, `offset`) control ordering and
//! paging. Operators and reserved names can be renamed or disabled through
//! [`QueryOptions`].

use serde_json::Value;

use super::entities::ScalarType;
use super::options::{OperatorSetting, QueryOptions};
use crate::error::SchemaError;

/// Filter operator encoded by an argument suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    In,
    NotIn,
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    LikeNoCase,
    IsNull,
}

impl FilterOp {
    /// All operators in the order their arguments are emitted.
    pub const ALL: [FilterOp; 11] = [
        FilterOp::In,
        FilterOp::NotIn,
        FilterOp::Eq,
        FilterOp::NotEq,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Like,
        FilterOp::LikeNoCase,
        FilterOp::IsNull,
    ];

    pub fn default_suffix(self) -> &'static str {
        match self {
            FilterOp::In => "In",
            FilterOp::NotIn => "NotIn",
            FilterOp::Eq => "Eq",
            FilterOp::NotEq => "NotEq",
            FilterOp::Gt => "Gt",
            FilterOp::Gte => "Gte",
            FilterOp::Lt => "Lt",
            FilterOp::Lte => "Lte",
            FilterOp::Like => "Like",
            FilterOp::LikeNoCase => "LikeNoCase",
            FilterOp::IsNull => "IsNull",
        }
    }

    /// Key naming this operator in `queryOptions`.
    pub fn option_key(self) -> &'static str {
        match self {
            FilterOp::In => "in",
            FilterOp::NotIn => "notIn",
            FilterOp::Eq => "eq",
            FilterOp::NotEq => "notEq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Like => "like",
            FilterOp::LikeNoCase => "likeNoCase",
            FilterOp::IsNull => "isNull",
        }
    }

    /// Whether the operator compares against a list of values.
    pub fn takes_list(self) -> bool {
        matches!(self, FilterOp::In | FilterOp::NotIn)
    }

    /// GraphQL type of the argument for a field of type `ty`.
    pub fn argument_type(self, ty: &ScalarType) -> String {
        match self {
            FilterOp::IsNull => "Boolean".to_string(),
            op if op.takes_list() => format!("[{}]", ty.graphql_name()),
            _ => ty.graphql_name(),
        }
    }
}

/// Reserved ordering and paging arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagingArg {
    OrderBy,
    OrderByDesc,
    Limit,
    Offset,
}

impl PagingArg {
    pub const ALL: [PagingArg; 4] = [
        PagingArg::OrderBy,
        PagingArg::OrderByDesc,
        PagingArg::Limit,
        PagingArg::Offset,
    ];

    /// Default argument name, which is also its `queryOptions` key.
    pub fn default_name(self) -> &'static str {
        match self {
            PagingArg::OrderBy => "orderBy",
            PagingArg::OrderByDesc => "orderByDesc",
            PagingArg::Limit => "limit",
            PagingArg::Offset => "offset",
        }
    }

    pub fn argument_type(self) -> &'static str {
        match self {
            PagingArg::OrderBy | PagingArg::OrderByDesc => "String",
            PagingArg::Limit | PagingArg::Offset => "Int",
        }
    }
}

/// Result of decoding one argument key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<'a> {
    Filter { field: &'a str, op: FilterOp },
    Paging(PagingArg),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ArgumentProtocol {
    /// Enabled operators in emission order.
    operators: Vec<(FilterOp, String)>,
    /// Same operators, longest suffix first.
    by_length: Vec<(FilterOp, String)>,
    paging: Vec<(PagingArg, String)>,
}

impl Default for ArgumentProtocol {
    fn default() -> Self {
        let operators = FilterOp::ALL
            .iter()
            .map(|op| (*op, op.default_suffix().to_string()))
            .collect();
        let paging = PagingArg::ALL
            .iter()
            .map(|arg| (*arg, arg.default_name().to_string()))
            .collect();
        Self::assemble(operators, paging)
    }
}

impl ArgumentProtocol {
    /// Build the protocol from `queryOptions`, rejecting empty or duplicate suffixes.
    pub fn from_options(options: &QueryOptions) -> Result<Self, SchemaError> {
        let mut operators: Vec<(FilterOp, String)> = Vec::new();
        for op in FilterOp::ALL {
            let Some(suffix) = resolve_name(options.setting(op.option_key()), op.default_suffix())
            else {
                continue;
            };
            if suffix.is_empty() || operators.iter().any(|(_, s)| *s == suffix) {
                return Err(SchemaError::InvalidSuffix { suffix });
            }
            operators.push((op, suffix));
        }

        let mut paging: Vec<(PagingArg, String)> = Vec::new();
        for arg in PagingArg::ALL {
            let Some(name) = resolve_name(options.setting(arg.default_name()), arg.default_name())
            else {
                continue;
            };
            if name.is_empty() || paging.iter().any(|(_, n)| *n == name) {
                return Err(SchemaError::InvalidSuffix { suffix: name });
            }
            paging.push((arg, name));
        }

        Ok(Self::assemble(operators, paging))
    }

    fn assemble(operators: Vec<(FilterOp, String)>, paging: Vec<(PagingArg, String)>) -> Self {
        let mut by_length = operators.clone();
        by_length.sort_by_key(|(_, suffix)| std::cmp::Reverse(suffix.len()));
        Self {
            operators,
            by_length,
            paging,
        }
    }

    pub fn suffix(&self, op: FilterOp) -> Option<&str> {
        self.operators
            .iter()
            .find(|(o, _)| *o == op)
            .map(|(_, suffix)| suffix.as_str())
    }

    pub fn paging_name(&self, arg: PagingArg) -> Option<&str> {
        self.paging
            .iter()
            .find(|(a, _)| *a == arg)
            .map(|(_, name)| name.as_str())
    }

    /// Argument name for filtering `field` with `op`, if the operator is enabled.
    pub fn encode(&self, field: &str, op: FilterOp) -> Option<String> {
        self.suffix(op).map(|suffix| format!("{field}{suffix}"))
    }

    pub fn decode<'a>(&self, key: &'a str) -> Decoded<'a> {
        if let Some((arg, _)) = self.paging.iter().find(|(_, name)| name == key) {
            return Decoded::Paging(*arg);
        }
        for (op, suffix) in &self.by_length {
            if let Some(field) = key.strip_suffix(suffix.as_str()) {
                if field.is_empty() {
                    return Decoded::Ignored;
                }
                return Decoded::Filter { field, op: *op };
            }
        }
        Decoded::Ignored
    }

    /// Filter arguments for one scalar field as `(name, GraphQL type)` pairs.
    pub fn filter_arguments<'a>(
        &'a self,
        field: &'a str,
        ty: &'a ScalarType,
    ) -> impl Iterator<Item = (String, String)> + 'a {
        self.operators
            .iter()
            .map(move |(op, suffix)| (format!("{field}{suffix}"), op.argument_type(ty)))
    }

    /// Enabled ordering and paging arguments as `(name, GraphQL type)` pairs.
    pub fn paging_arguments(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.paging
            .iter()
            .map(|(arg, name)| (name.as_str(), arg.argument_type()))
    }
}

fn resolve_name(setting: OperatorSetting, default: &str) -> Option<String> {
    match setting {
        OperatorSetting::Enabled(true) => Some(default.to_string()),
        OperatorSetting::Enabled(false) => None,
        OperatorSetting::Renamed(name) => Some(name),
    }
}

/// Coerce a filter value to the shape its operator expects.
///
/// List operators accept a single scalar as a one-element list. Returns `None` when the
/// argument should not produce a predicate at all.
pub fn normalize_value(op: FilterOp, value: &Value) -> Option<Value> {
    match (op, value) {
        (FilterOp::IsNull, Value::Bool(_)) => Some(value.clone()),
        (FilterOp::IsNull, Value::Null) => Some(Value::Bool(true)),
        (FilterOp::IsNull, _) => None,
        (_, Value::Null) => None,
        (op, Value::Array(_)) if op.takes_list() => Some(value.clone()),
        (op, scalar) if op.takes_list() => Some(Value::Array(vec![scalar.clone()])),
        (_, Value::Array(_)) => None,
        (_, scalar) => Some(scalar.clone()),
    }
}
