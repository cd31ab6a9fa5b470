//! # Table Schemas
//!
//! Registry of the tables that take part in synchronization.
//!
//! ## Registry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Synchronizable Tables (pull order)                     │
//! │                                                                         │
//! │   1. stores        id INTEGER   name, address, phone, is_active         │
//! │   2. users         id TEXT      email, display_name, role, store_id ... │
//! │   3. categories    id INTEGER   name, parent_id, sort_order             │
//! │   4. products      id INTEGER   sku, name, price, quantity ...          │
//! │   5. transactions  id TEXT      store_id, product_id, quantity, total...│
//! │                                                                         │
//! │   Every table also carries: updated_at (ms), synced_at (ms, nullable)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Column names used in SQL come only from these definitions, never from
//! caller-supplied strings. Referenced rows are pulled before the rows that
//! reference them.

use std::fmt;

use crate::error::{ValidationError, ValidationResult};
use crate::types::{FieldMap, FieldValue, RecordId, SyncableRecord};

// =============================================================================
// Definitions
// =============================================================================

/// Which [`RecordId`] variant a table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Integer,
    Text,
}

/// Column type of a business field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

const fn field(name: &'static str, field_type: FieldType, required: bool) -> FieldDef {
    FieldDef {
        name,
        field_type,
        required,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub id_kind: IdKind,
    pub fields: &'static [FieldDef],
}

/// Columns every synchronizable table has besides its business fields.
pub const RESERVED_COLUMNS: &[&str] = &["id", "updated_at", "synced_at"];

// =============================================================================
// Registry
// =============================================================================

pub const STORES: TableSchema = TableSchema {
    name: "stores",
    id_kind: IdKind::Integer,
    fields: &[
        field("name", FieldType::Text, true),
        field("address", FieldType::Text, false),
        field("phone", FieldType::Text, false),
        field("is_active", FieldType::Boolean, true),
    ],
};

pub const USERS: TableSchema = TableSchema {
    name: "users",
    id_kind: IdKind::Text,
    fields: &[
        field("email", FieldType::Text, true),
        field("display_name", FieldType::Text, true),
        field("role", FieldType::Text, true),
        field("store_id", FieldType::Integer, false),
        field("is_active", FieldType::Boolean, true),
    ],
};

pub const CATEGORIES: TableSchema = TableSchema {
    name: "categories",
    id_kind: IdKind::Integer,
    fields: &[
        field("name", FieldType::Text, true),
        field("parent_id", FieldType::Integer, false),
        field("sort_order", FieldType::Integer, false),
    ],
};

pub const PRODUCTS: TableSchema = TableSchema {
    name: "products",
    id_kind: IdKind::Integer,
    fields: &[
        field("store_id", FieldType::Integer, false),
        field("category_id", FieldType::Integer, false),
        field("sku", FieldType::Text, true),
        field("name", FieldType::Text, true),
        field("price", FieldType::Real, true),
        field("quantity", FieldType::Integer, true),
        field("is_active", FieldType::Boolean, true),
    ],
};

pub const TRANSACTIONS: TableSchema = TableSchema {
    name: "transactions",
    id_kind: IdKind::Text,
    fields: &[
        field("store_id", FieldType::Integer, true),
        field("user_id", FieldType::Text, false),
        field("product_id", FieldType::Integer, true),
        field("quantity", FieldType::Integer, true),
        field("total", FieldType::Real, true),
        field("payment_method", FieldType::Text, true),
    ],
};

/// Synchronizable tables in pull order.
pub static SYNC_TABLES: &[TableSchema] = &[STORES, USERS, CATEGORIES, PRODUCTS, TRANSACTIONS];

/// Tables that live only in the store database and are never queued.
pub const LOCAL_ONLY_TABLES: &[&str] = &["local_settings"];

/// Engine bookkeeping tables. Raw statements may not touch them either.
pub const BOOKKEEPING_TABLES: &[&str] = &["sync_queue", "sync_checkpoints", "sync_lock", "sync_runs"];

/// Looks up a synchronizable table by name.
pub fn table(name: &str) -> Option<&'static TableSchema> {
    SYNC_TABLES.iter().find(|t| t.name == name)
}

// =============================================================================
// Validation
// =============================================================================

impl TableSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }

    /// Checks that `id` has the kind this table uses.
    pub fn validate_id(&self, id: &RecordId) -> ValidationResult<()> {
        match (self.id_kind, id) {
            (IdKind::Integer, RecordId::Int(_)) => Ok(()),
            (IdKind::Text, RecordId::Text(v)) if !v.trim().is_empty() => Ok(()),
            (IdKind::Text, RecordId::Text(_)) => Err(ValidationError::InvalidFormat {
                field: "id".to_string(),
                reason: "must not be empty".to_string(),
            }),
            (IdKind::Integer, RecordId::Text(_)) => Err(ValidationError::InvalidFormat {
                field: "id".to_string(),
                reason: format!("{} uses integer ids", self.name),
            }),
            (IdKind::Text, RecordId::Int(_)) => Err(ValidationError::InvalidFormat {
                field: "id".to_string(),
                reason: format!("{} uses text ids", self.name),
            }),
        }
    }

    /// Type-checks one value for `field`, widening Integer to Real.
    pub fn coerce_value(&self, field: &FieldDef, value: &FieldValue) -> ValidationResult<FieldValue> {
        let coerced = match (field.field_type, value) {
            (_, FieldValue::Null) => FieldValue::Null,
            (FieldType::Integer, FieldValue::Integer(v)) => FieldValue::Integer(*v),
            (FieldType::Real, FieldValue::Real(v)) => FieldValue::Real(*v),
            (FieldType::Real, FieldValue::Integer(v)) => FieldValue::Real(*v as f64),
            (FieldType::Text, FieldValue::Text(v)) => FieldValue::Text(v.clone()),
            (FieldType::Boolean, FieldValue::Boolean(v)) => FieldValue::Boolean(*v),
            (expected, actual) => {
                return Err(ValidationError::TypeMismatch {
                    field: field.name.to_string(),
                    expected: expected.to_string(),
                    actual: actual.type_name().to_string(),
                })
            }
        };

        if field.required && coerced.is_null() {
            return Err(ValidationError::Required {
                field: field.name.to_string(),
            });
        }
        Ok(coerced)
    }

    /// Validates a partial field map (a write may set only some fields).
    ///
    /// Unknown fields and reserved columns are rejected; values are coerced.
    pub fn validate_partial(&self, fields: &FieldMap) -> ValidationResult<FieldMap> {
        let mut out = FieldMap::new();
        for (name, value) in fields {
            let def = self.field(name).ok_or_else(|| ValidationError::UnknownField {
                table: self.name.to_string(),
                field: name.clone(),
            })?;
            out.insert(name.clone(), self.coerce_value(def, value)?);
        }
        Ok(out)
    }

    /// Validates a field map that must describe a whole row.
    ///
    /// Missing optional fields become `Null`; missing required fields fail.
    pub fn validate_complete(&self, fields: &FieldMap) -> ValidationResult<FieldMap> {
        let mut out = self.validate_partial(fields)?;
        for def in self.fields {
            match out.get(def.name) {
                Some(_) => {}
                None if def.required => {
                    return Err(ValidationError::Required {
                        field: def.name.to_string(),
                    })
                }
                None => {
                    out.insert(def.name.to_string(), FieldValue::Null);
                }
            }
        }
        Ok(out)
    }

    /// Validates a full record, e.g. one pulled from the central database.
    pub fn validate_record(&self, record: &SyncableRecord) -> ValidationResult<SyncableRecord> {
        self.validate_id(&record.id)?;
        Ok(SyncableRecord {
            id: record.id.clone(),
            fields: self.validate_complete(&record.fields)?,
            updated_at: record.updated_at,
            synced_at: record.synced_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;

    fn product_fields() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("sku".into(), "COLA-330".into());
        fields.insert("name".into(), "Cola 330ml".into());
        fields.insert("price".into(), FieldValue::Integer(2));
        fields.insert("quantity".into(), 10.into());
        fields.insert("is_active".into(), true.into());
        fields
    }

    #[test]
    fn test_registry_order_is_pull_order() {
        let names: Vec<_> = SYNC_TABLES.iter().map(|t| t.name).collect();
        assert_eq!(names, ["stores", "users", "categories", "products", "transactions"]);
    }

    #[test]
    fn test_no_field_shadows_reserved_column() {
        for table in SYNC_TABLES {
            for name in table.field_names() {
                assert!(!RESERVED_COLUMNS.contains(&name), "{}.{}", table.name, name);
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(table("products").map(|t| t.id_kind), Some(IdKind::Integer));
        assert_eq!(table("users").map(|t| t.id_kind), Some(IdKind::Text));
        assert!(table("local_settings").is_none());
    }

    #[test]
    fn test_complete_widens_and_fills_optional() {
        let fields = PRODUCTS.validate_complete(&product_fields()).unwrap();
        assert_eq!(fields["price"], FieldValue::Real(2.0));
        assert_eq!(fields["store_id"], FieldValue::Null);
        assert_eq!(fields.len(), PRODUCTS.fields.len());
    }

    #[test]
    fn test_complete_requires_required_fields() {
        let mut fields = product_fields();
        fields.remove("sku");
        assert_eq!(
            PRODUCTS.validate_complete(&fields),
            Err(ValidationError::Required { field: "sku".into() })
        );
    }

    #[test]
    fn test_partial_rejects_unknown_and_mistyped() {
        let mut fields = FieldMap::new();
        fields.insert("colour".into(), "red".into());
        assert!(matches!(
            PRODUCTS.validate_partial(&fields),
            Err(ValidationError::UnknownField { .. })
        ));

        let mut fields = FieldMap::new();
        fields.insert("quantity".into(), "ten".into());
        assert!(matches!(
            PRODUCTS.validate_partial(&fields),
            Err(ValidationError::TypeMismatch { .. })
        ));

        let mut fields = FieldMap::new();
        fields.insert("updated_at".into(), 5.into());
        assert!(PRODUCTS.validate_partial(&fields).is_err());
    }

    #[test]
    fn test_partial_rejects_null_for_required() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::Null);
        assert!(matches!(
            PRODUCTS.validate_partial(&fields),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_id_kind_checked() {
        assert!(PRODUCTS.validate_id(&RecordId::Int(1)).is_ok());
        assert!(PRODUCTS.validate_id(&RecordId::Text("1".into())).is_err());
        assert!(USERS.validate_id(&RecordId::Text("".into())).is_err());
        assert!(USERS.validate_id(&RecordId::new_text()).is_ok());
    }

    #[test]
    fn test_validate_record() {
        let record = SyncableRecord {
            id: RecordId::Int(42),
            fields: product_fields(),
            updated_at: clock::from_millis(1_000).unwrap(),
            synced_at: None,
        };
        let valid = PRODUCTS.validate_record(&record).unwrap();
        assert_eq!(valid.updated_at, record.updated_at);
        assert_eq!(valid.fields["category_id"], FieldValue::Null);
    }
}
