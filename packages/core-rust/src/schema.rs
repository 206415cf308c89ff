//! Discovered field catalog of a collection or table.

use serde::{Deserialize, Serialize};

/// Declared kind of a field, when the store knows it.
///
/// The relational catalog reports one per column; the document store cannot,
/// so its fields are always [`FieldKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Any integer column.
    Integer,
    /// Floating point or numeric column.
    Float,
    /// Boolean column.
    Boolean,
    /// Timestamp or date column.
    Timestamp,
    /// Character data.
    Text,
    /// Anything else, or not known.
    Unknown,
}

impl FieldKind {
    /// Maps a `PostgreSQL` `information_schema.columns.data_type` value.
    #[must_use]
    pub fn from_sql_type(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "bigint" | "integer" | "smallint" => Self::Integer,
            "double precision" | "real" | "numeric" | "decimal" => Self::Float,
            "boolean" => Self::Boolean,
            "timestamp without time zone" | "timestamp with time zone" | "date" => {
                Self::Timestamp
            }
            "text" | "character varying" | "character" | "varchar" | "char" => Self::Text,
            _ => Self::Unknown,
        }
    }
}

/// Single queryable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Name of the field.
    pub name: String,
    /// Declared kind.
    pub kind: FieldKind,
}

/// The set of fields valid for one collection or table at query time.
///
/// Rebuilt for every query; never cached. Order is the discovery order
/// (catalog ordinal position for tables, sorted names for collections).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaView {
    fields: Vec<FieldDef>,
}

impl SchemaView {
    /// Builds a view from field definitions, dropping duplicate names.
    #[must_use]
    pub fn new(fields: impl IntoIterator<Item = FieldDef>) -> Self {
        let mut unique: Vec<FieldDef> = Vec::new();
        for field in fields {
            if !unique.iter().any(|f| f.name == field.name) {
                unique.push(field);
            }
        }
        Self { fields: unique }
    }

    /// Builds a view of untyped field names.
    #[must_use]
    pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::new(names.into_iter().map(|name| FieldDef {
            name: name.into(),
            kind: FieldKind::Unknown,
        }))
    }

    /// Whether `name` is a queryable field.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Declared kind of `name`, if the field exists.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    /// Field names in discovery order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Field definitions in discovery order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the view has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
