use crate::ast::FieldType;
use crate::error::DataModelError;
use ahash::AHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs;

/// Storage type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int,
    Float,
    String,
    Timestamp,
}

impl DataType {
    /// Whether a field read declared as `field_type` may read a column of this type.
    /// Integers read as floats, timestamps read as their RFC 3339 string.
    pub fn accepts(self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (DataType::Bool, FieldType::Bool)
                | (DataType::Int | DataType::Float, FieldType::Float)
                | (DataType::String | DataType::Timestamp, FieldType::String)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
}

impl Field {
    pub fn new(data_type: DataType, nullable: bool) -> Self {
        Self {
            data_type,
            nullable,
        }
    }
}

/// A many-to-one relation: `child_field_name` on the owning table matches
/// `parent_field_name` on `linked_table_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkToSingle {
    pub linked_table_name: String,
    pub parent_field_name: String,
    pub child_field_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub fields: AHashMap<String, Field>,
    #[serde(default)]
    pub links_to_single: AHashMap<String, LinkToSingle>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: AHashMap::new(),
            links_to_single: AHashMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, data_type: DataType, nullable: bool) -> Self {
        self.fields
            .insert(name.to_string(), Field::new(data_type, nullable));
        self
    }

    pub fn with_link(mut self, name: &str, linked_table: &str, parent_field: &str, child_field: &str) -> Self {
        self.links_to_single.insert(
            name.to_string(),
            LinkToSingle {
                linked_table_name: linked_table.to_string(),
                parent_field_name: parent_field.to_string(),
                child_field_name: child_field.to_string(),
            },
        );
        self
    }

    pub fn field(&self, name: &str) -> Result<&Field, DataModelError> {
        self.fields.get(name).ok_or_else(|| DataModelError::UnknownField {
            table: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn link(&self, name: &str) -> Result<&LinkToSingle, DataModelError> {
        self.links_to_single
            .get(name)
            .ok_or_else(|| DataModelError::UnknownLink {
                table: self.name.clone(),
                link: name.to_string(),
            })
    }
}

/// An organization's schema: its tables, their typed fields and the links between them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    pub tables: AHashMap<String, Table>,
}

impl DataModel {
    pub fn new(tables: impl IntoIterator<Item = Table>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|table| (table.name.clone(), table))
                .collect(),
        }
    }

    /// Load a data model from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let model = serde_json::from_str(&content)?;
        Ok(model)
    }

    pub fn table(&self, name: &str) -> Result<&Table, DataModelError> {
        self.tables
            .get(name)
            .ok_or_else(|| DataModelError::UnknownTable(name.to_string()))
    }

    /// Checks that every link points at an existing table and that both sides of the
    /// link name existing fields. Reports the first violation in table/link name order.
    pub fn validate(&self) -> Result<(), DataModelError> {
        for table in self.tables.values().sorted_by(|a, b| a.name.cmp(&b.name)) {
            for (_, link) in table.links_to_single.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
                let linked = self.table(&link.linked_table_name)?;
                linked.field(&link.parent_field_name)?;
                table.field(&link.child_field_name)?;
            }
        }
        Ok(())
    }

    /// Walks `path` from `trigger_table` through its links and returns the table the
    /// path ends on.
    pub fn follow_links(&self, trigger_table: &str, path: &[String]) -> Result<&Table, DataModelError> {
        if path.is_empty() {
            return Err(DataModelError::EmptyLinkPath);
        }
        let mut table = self.table(trigger_table)?;
        for link_name in path {
            let link = table.link(link_name)?;
            table = self.table(&link.linked_table_name)?;
        }
        Ok(table)
    }

    /// Resolves a database field read to its column definition.
    pub fn resolve_db_field(
        &self,
        trigger_table: &str,
        path: &[String],
        field_name: &str,
    ) -> Result<&Field, DataModelError> {
        self.follow_links(trigger_table, path)?.field(field_name)
    }
}
