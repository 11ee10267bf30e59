//! Schema definitions for relops
//!
//! A schema is the ordered list of attributes that defines a record's layout.

use super::types::AttType;
use indexmap::IndexMap;

/// Attribute definition in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Attribute type
    pub att_type: AttType,
}

impl Attribute {
    /// Create a new attribute
    pub fn new(name: impl Into<String>, att_type: AttType) -> Self {
        Self {
            name: name.into(),
            att_type,
        }
    }
}

/// Record schema - defines the layout of a record
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Ordered list of attributes
    atts: Vec<Attribute>,
    /// Attribute name to position; the first occurrence of a name wins
    name_to_index: IndexMap<String, usize>,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema from (name, type) pairs
    pub fn from_atts<S: Into<String>>(atts: impl IntoIterator<Item = (S, AttType)>) -> Self {
        let mut schema = Self::new();
        for (name, att_type) in atts {
            schema.append_att(Attribute::new(name, att_type));
        }
        schema
    }

    /// Append an attribute at the end of the layout
    pub fn append_att(&mut self, att: Attribute) {
        let position = self.atts.len();
        self.name_to_index
            .entry(att.name.clone())
            .or_insert(position);
        self.atts.push(att);
    }

    /// Concatenate two schemas positionally (left attributes first)
    pub fn concat(left: &Schema, right: &Schema) -> Schema {
        let mut schema = left.clone();
        for att in right.atts() {
            schema.append_att(att.clone());
        }
        schema
    }

    /// Get attribute position by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get attribute by position
    pub fn att(&self, index: usize) -> Option<&Attribute> {
        self.atts.get(index)
    }

    /// Get all attributes
    pub fn atts(&self) -> &[Attribute] {
        &self.atts
    }

    /// Get number of attributes
    pub fn len(&self) -> usize {
        self.atts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atts.is_empty()
    }

    /// Get attribute names in layout order
    pub fn names(&self) -> Vec<&str> {
        self.atts.iter().map(|a| a.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let schema = Schema::from_atts([
            ("id", AttType::Int),
            ("name", AttType::String),
            ("score", AttType::Double),
        ]);

        assert_eq!(schema.len(), 3);
        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("unknown"), None);
        assert_eq!(schema.att(2).unwrap().att_type, AttType::Double);
        assert_eq!(schema.names(), vec!["id", "name", "score"]);
    }

    #[test]
    fn test_schema_concat() {
        let left = Schema::from_atts([("k", AttType::Int), ("a", AttType::String)]);
        let right = Schema::from_atts([("k", AttType::Int), ("b", AttType::String)]);

        let combined = Schema::concat(&left, &right);
        assert_eq!(combined.len(), 4);
        assert_eq!(combined.names(), vec!["k", "a", "k", "b"]);
        // duplicated names resolve to the left side
        assert_eq!(combined.index_of("k"), Some(0));
        assert_eq!(combined.index_of("b"), Some(3));
    }
}
