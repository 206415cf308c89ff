//! Error taxonomy shared by both query backends.

/// Which backing store an operation ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The schemaless document store (`MongoDB`).
    Document,
    /// The typed relational store (`PostgreSQL`).
    Relational,
}

impl StoreKind {
    /// Short name used in log fields and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "mongodb",
            Self::Relational => "postgres",
        }
    }

    /// Noun for the unit of storage: collection or table.
    #[must_use]
    pub fn target_noun(self) -> &'static str {
        match self {
            Self::Document => "collection",
            Self::Relational => "table",
        }
    }
}

/// Errors surfaced by the query core.
///
/// Unknown fields and operators are never errors; they are dropped while
/// the query is planned.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The request shape is malformed (pagination range, sort direction,
    /// filter payload).
    #[error("{0}")]
    Validation(String),

    /// The collection or table does not exist or exposes no fields.
    #[error("{noun} '{name}' is empty or not found", noun = .store.target_noun())]
    NotFound {
        /// Store the lookup ran against.
        store: StoreKind,
        /// Requested collection or table name.
        name: String,
    },

    /// The backend rejected or failed the operation. The native cause is
    /// kept as `source` for logging; `Display` only carries the summary.
    #[error("failed to {operation} {noun} '{target}'", noun = .store.target_noun())]
    Execution {
        /// Store the operation ran against.
        store: StoreKind,
        /// Collection or table name.
        target: String,
        /// Short verb phrase such as `"count rows in"`.
        operation: &'static str,
        /// Native driver error.
        #[source]
        source: anyhow::Error,
    },
}

impl QueryError {
    /// Builds a validation error from any displayable message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Builds a not-found error for the given store and name.
    pub fn not_found(store: StoreKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            store,
            name: name.into(),
        }
    }

    /// Wraps a native driver error.
    pub fn execution(
        store: StoreKind,
        target: impl Into<String>,
        operation: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self::Execution {
            store,
            target: target.into(),
            operation,
            source,
        }
    }
}
