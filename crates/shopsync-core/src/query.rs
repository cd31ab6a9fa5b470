//! # Query Model
//!
//! Typed description of a local read. The data-access facade turns it into
//! SQL; field names are checked against the table schema first so nothing a
//! caller passes ends up spliced into a statement.
//!
//! ```rust
//! use shopsync_core::{Query, FilterOp, SortDirection};
//!
//! let q = Query::table("products")
//!     .filter("quantity", FilterOp::Lt, 5)
//!     .order_by("name", SortDirection::Asc)
//!     .limit(20);
//! assert_eq!(q.filters.len(), 1);
//! ```

use crate::error::{ValidationError, ValidationResult};
use crate::schema::{FieldType, IdKind, TableSchema};
use crate::types::FieldValue;

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// SQL LIKE, text fields only.
    Like,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    pub fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => " = ",
            FilterOp::Ne => " <> ",
            FilterOp::Lt => " < ",
            FilterOp::Le => " <= ",
            FilterOp::Gt => " > ",
            FilterOp::Ge => " >= ",
            FilterOp::Like => " LIKE ",
            FilterOp::IsNull => " IS NULL",
            FilterOp::IsNotNull => " IS NOT NULL",
        }
    }

    /// Null checks take no operand.
    pub fn takes_value(&self) -> bool {
        !matches!(self, FilterOp::IsNull | FilterOp::IsNotNull)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => " ASC",
            SortDirection::Desc => " DESC",
        }
    }
}

/// A read against one synchronizable table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, SortDirection)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Only rows not yet reconciled (`synced_at IS NULL`).
    pub unsynced_only: bool,
}

impl Query {
    pub fn table(name: &str) -> Self {
        Self {
            table: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
            unsynced_only: false,
        }
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    /// Shorthand for an equality filter.
    pub fn eq(self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn unsynced(mut self) -> Self {
        self.unsynced_only = true;
        self
    }

    /// Checks every referenced column against `schema`.
    ///
    /// Filterable: `id` and business fields. Sortable: those plus
    /// `updated_at`.
    pub fn validate(&self, schema: &TableSchema) -> ValidationResult<()> {
        validate_filters(schema, &self.filters)?;

        if let Some((field, _)) = &self.order_by {
            if field != "id" && field != "updated_at" && schema.field(field).is_none() {
                return Err(unknown(schema, field));
            }
        }
        Ok(())
    }
}

/// Checks filters on their own (bulk updates use them without a `Query`).
pub fn validate_filters(schema: &TableSchema, filters: &[Filter]) -> ValidationResult<()> {
    for filter in filters {
        let column_type = if filter.field == "id" {
            match schema.id_kind {
                IdKind::Integer => FieldType::Integer,
                IdKind::Text => FieldType::Text,
            }
        } else {
            schema
                .field(&filter.field)
                .map(|f| f.field_type)
                .ok_or_else(|| unknown(schema, &filter.field))?
        };

        if !filter.op.takes_value() {
            continue;
        }

        let compatible = match (&filter.value, column_type) {
            (FieldValue::Integer(_), FieldType::Integer | FieldType::Real) => true,
            (FieldValue::Real(_), FieldType::Real | FieldType::Integer) => true,
            (FieldValue::Text(_), FieldType::Text) => true,
            (FieldValue::Boolean(_), FieldType::Boolean) => true,
            _ => false,
        };
        let like_on_text = filter.op != FilterOp::Like || column_type == FieldType::Text;

        if !compatible || !like_on_text {
            return Err(ValidationError::TypeMismatch {
                field: filter.field.clone(),
                expected: column_type.to_string(),
                actual: filter.value.type_name().to_string(),
            });
        }
    }
    Ok(())
}

fn unknown(schema: &TableSchema, field: &str) -> ValidationError {
    ValidationError::UnknownField {
        table: schema.name.to_string(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PRODUCTS, USERS};

    #[test]
    fn test_valid_query() {
        let q = Query::table("products")
            .eq("sku", "COLA-330")
            .filter("price", FilterOp::Ge, 1)
            .filter("category_id", FilterOp::IsNull, FieldValue::Null)
            .order_by("updated_at", SortDirection::Desc);
        assert!(q.validate(&PRODUCTS).is_ok());
    }

    #[test]
    fn test_unknown_column_rejected() {
        let q = Query::table("products").eq("sku; DROP TABLE products", "x");
        assert!(matches!(q.validate(&PRODUCTS), Err(ValidationError::UnknownField { .. })));

        let q = Query::table("products").order_by("random()", SortDirection::Asc);
        assert!(q.validate(&PRODUCTS).is_err());
    }

    #[test]
    fn test_filter_type_checked() {
        let q = Query::table("products").eq("quantity", "lots");
        assert!(matches!(q.validate(&PRODUCTS), Err(ValidationError::TypeMismatch { .. })));

        let q = Query::table("users").eq("id", 7);
        assert!(q.validate(&USERS).is_err());

        let q = Query::table("products").filter("quantity", FilterOp::Like, 5);
        assert!(q.validate(&PRODUCTS).is_err());
    }
}
