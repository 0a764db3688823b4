//! Ordering: `order=<field> asc|desc[,<field> asc|desc]`.

use crate::case::normalize_segment;
use crate::config::{CapabilityConfig, Direction};
use crate::error::RequestErrorKind;
use crate::query::clause::FieldRef;
use crate::query::plan::OrderEntry;

pub const MAX_ORDER_FIELDS: usize = 2;

/// Fields the caller may order by at this level.
pub struct OrderFields<'a> {
    pub resource: &'a [String],
    /// Link-table fields of the relation the compiler is scoped under.
    pub through: &'a [String],
}

/// Declared default order, qualified against the resource's own table.
pub fn default_order(config: &CapabilityConfig) -> Vec<OrderEntry> {
    config
        .default_order
        .iter()
        .map(|(field, dir)| OrderEntry::new(FieldRef::resource(field.clone()), *dir))
        .collect()
}

/// Compile a caller's order value. Stops at the first bad token.
pub fn compile(value: &str, fields: &OrderFields<'_>) -> Result<Vec<OrderEntry>, RequestErrorKind> {
    let tokens: Vec<&str> = value.split(',').map(str::trim).collect();
    if tokens.len() > MAX_ORDER_FIELDS {
        return Err(RequestErrorKind::TooManyOrderFields { max: MAX_ORDER_FIELDS });
    }
    tokens.into_iter().map(|token| compile_token(token, fields)).collect()
}

fn compile_token(token: &str, fields: &OrderFields<'_>) -> Result<OrderEntry, RequestErrorKind> {
    let parts: Vec<&str> = token.split(' ').filter(|p| !p.is_empty()).collect();
    let [field, dir] = parts.as_slice() else {
        return Err(RequestErrorKind::InvalidOrderFormat);
    };
    let direction = Direction::parse(dir).ok_or(RequestErrorKind::InvalidOrderDirection)?;
    let name = normalize_segment(field);
    if fields.resource.contains(&name) {
        Ok(OrderEntry::new(FieldRef::resource(name), direction))
    } else if fields.through.contains(&name) {
        Ok(OrderEntry::new(FieldRef::through(name), direction))
    } else {
        Err(RequestErrorKind::UnknownOrderField(name))
    }
}
