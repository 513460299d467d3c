//! Resolved entity-to-table mapping consumed by the repository.
//!
//! # Responsibility
//! - Carry the table/column/identifier/property metadata per entity type.
//! - Validate mapping preconditions at construction, not at query time.
//!
//! # Invariants
//! - Table and identifier column names are never empty.
//! - Property names are unique within one mapping.
//!
//! Mapping discovery and configuration live outside this crate; the core
//! only consumes the resolved form built here.

use crate::model::Capabilities;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_VERSION_COLUMN: &str = "Version";
pub const DEFAULT_IS_DELETED_COLUMN: &str = "IsDeleted";
pub const DEFAULT_DELETED_DATE_COLUMN: &str = "DeletedDate";
pub const DEFAULT_DELETED_BY_COLUMN: &str = "DeletedBy";
pub const DEFAULT_CREATED_BY_COLUMN: &str = "EnteredBy";
pub const DEFAULT_CREATED_DATE_COLUMN: &str = "EnteredDate";
pub const DEFAULT_UPDATED_BY_COLUMN: &str = "UpdatedBy";
pub const DEFAULT_UPDATED_DATE_COLUMN: &str = "UpdatedDate";

pub type MappingResult<T> = Result<T, MappingError>;

#[derive(Debug, PartialEq, Eq)]
pub enum MappingError {
    MissingEntityName,
    MissingTableName { entity: String },
    MissingIdColumn { entity: String },
    DuplicateProperty { entity: String, property: String },
    UnknownProperty { entity: String, property: String },
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEntityName => write!(f, "entity mapping requires a non-empty entity name"),
            Self::MissingTableName { entity } => {
                write!(f, "entity `{entity}` mapping requires a non-empty table name")
            }
            Self::MissingIdColumn { entity } => write!(
                f,
                "entity `{entity}` mapping requires a non-empty identifier column"
            ),
            Self::DuplicateProperty { entity, property } => {
                write!(f, "entity `{entity}` declares property `{property}` twice")
            }
            Self::UnknownProperty { entity, property } => {
                write!(f, "entity `{entity}` has no declared property `{property}`")
            }
        }
    }
}

impl Error for MappingError {}

/// Runtime category of a declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar,
    /// Holds the identifier of an associated entity.
    Reference { entity: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMeta {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: PropertyKind,
}

impl PropertyMeta {
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, PropertyKind::Reference { .. })
    }
}

/// Resolved mapping for one entity type.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    entity_name: String,
    table: String,
    identifier_property: String,
    id_column: String,
    version_column: String,
    is_deleted_column: String,
    deleted_date_column: String,
    deleted_by_column: String,
    created_by_column: String,
    created_date_column: String,
    updated_by_column: String,
    updated_date_column: String,
    properties: Vec<PropertyMeta>,
    capabilities: Capabilities,
    /// True when the entity's references are modeled as two-state handles
    /// that materialize through the explicit reference-loading path.
    lazy_references: bool,
}

impl EntityMapping {
    pub fn builder(
        entity_name: impl Into<String>,
        table: impl Into<String>,
        identifier_property: impl Into<String>,
        id_column: impl Into<String>,
    ) -> MappingBuilder {
        MappingBuilder {
            entity_name: entity_name.into(),
            table: table.into(),
            identifier_property: identifier_property.into(),
            id_column: id_column.into(),
            properties: Vec::new(),
            capabilities: Capabilities::none(),
            lazy_references: false,
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn identifier_property(&self) -> &str {
        &self.identifier_property
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn version_column(&self) -> &str {
        &self.version_column
    }

    pub fn is_deleted_column(&self) -> &str {
        &self.is_deleted_column
    }

    pub fn deleted_date_column(&self) -> &str {
        &self.deleted_date_column
    }

    pub fn deleted_by_column(&self) -> &str {
        &self.deleted_by_column
    }

    pub fn created_by_column(&self) -> &str {
        &self.created_by_column
    }

    pub fn created_date_column(&self) -> &str {
        &self.created_date_column
    }

    pub fn updated_by_column(&self) -> &str {
        &self.updated_by_column
    }

    pub fn updated_date_column(&self) -> &str {
        &self.updated_date_column
    }

    pub fn properties(&self) -> &[PropertyMeta] {
        &self.properties
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn uses_lazy_references(&self) -> bool {
        self.lazy_references
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMeta> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub(crate) fn require_property(&self, name: &str) -> MappingResult<&PropertyMeta> {
        self.property(name).ok_or_else(|| MappingError::UnknownProperty {
            entity: self.entity_name.clone(),
            property: name.to_string(),
        })
    }

    /// Rewrites a query written in entity terms into table terms: the
    /// entity name becomes the table, the identifier property becomes the
    /// id column, and mapped property names become their columns. `:name`
    /// parameter placeholders are left untouched.
    pub fn rewrite_query_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            if c == ':' {
                out.push(c);
                while let Some(&(_, next)) = chars.peek() {
                    if !Self::is_ident_char(next) {
                        break;
                    }
                    out.push(next);
                    chars.next();
                }
            } else if c.is_ascii_alphabetic() || c == '_' {
                let mut end = start + c.len_utf8();
                while let Some(&(j, next)) = chars.peek() {
                    if !Self::is_ident_char(next) {
                        break;
                    }
                    end = j + next.len_utf8();
                    chars.next();
                }
                out.push_str(self.rewrite_identifier(&text[start..end]));
            } else {
                out.push(c);
            }
        }
        out
    }

    fn is_ident_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    fn rewrite_identifier<'a>(&'a self, ident: &'a str) -> &'a str {
        if ident == self.entity_name {
            return &self.table;
        }
        if ident == self.identifier_property {
            return &self.id_column;
        }
        match self.property(ident) {
            Some(meta) => meta.column,
            None => ident,
        }
    }
}

pub struct MappingBuilder {
    entity_name: String,
    table: String,
    identifier_property: String,
    id_column: String,
    properties: Vec<PropertyMeta>,
    capabilities: Capabilities,
    lazy_references: bool,
}

impl MappingBuilder {
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn lazy_references(mut self) -> Self {
        self.lazy_references = true;
        self
    }

    pub fn property(mut self, name: &'static str, column: &'static str) -> Self {
        self.properties.push(PropertyMeta {
            name,
            column,
            kind: PropertyKind::Scalar,
        });
        self
    }

    pub fn reference(
        mut self,
        name: &'static str,
        column: &'static str,
        entity: &'static str,
    ) -> Self {
        self.properties.push(PropertyMeta {
            name,
            column,
            kind: PropertyKind::Reference { entity },
        });
        self
    }

    pub fn build(self) -> MappingResult<EntityMapping> {
        if self.entity_name.trim().is_empty() {
            return Err(MappingError::MissingEntityName);
        }
        if self.table.trim().is_empty() {
            return Err(MappingError::MissingTableName {
                entity: self.entity_name,
            });
        }
        if self.id_column.trim().is_empty() || self.identifier_property.trim().is_empty() {
            return Err(MappingError::MissingIdColumn {
                entity: self.entity_name,
            });
        }

        for (index, property) in self.properties.iter().enumerate() {
            if self.properties[..index].iter().any(|p| p.name == property.name) {
                return Err(MappingError::DuplicateProperty {
                    entity: self.entity_name,
                    property: property.name.to_string(),
                });
            }
        }

        Ok(EntityMapping {
            entity_name: self.entity_name,
            table: self.table,
            identifier_property: self.identifier_property,
            id_column: self.id_column,
            version_column: DEFAULT_VERSION_COLUMN.to_string(),
            is_deleted_column: DEFAULT_IS_DELETED_COLUMN.to_string(),
            deleted_date_column: DEFAULT_DELETED_DATE_COLUMN.to_string(),
            deleted_by_column: DEFAULT_DELETED_BY_COLUMN.to_string(),
            created_by_column: DEFAULT_CREATED_BY_COLUMN.to_string(),
            created_date_column: DEFAULT_CREATED_DATE_COLUMN.to_string(),
            updated_by_column: DEFAULT_UPDATED_BY_COLUMN.to_string(),
            updated_date_column: DEFAULT_UPDATED_DATE_COLUMN.to_string(),
            properties: self.properties,
            capabilities: self.capabilities,
            lazy_references: self.lazy_references,
        })
    }
}
