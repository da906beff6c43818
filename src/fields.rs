//! Field metadata catalog and the search types each field supports.

use crate::ast::Operator;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldCatalogError {
    #[error("field metadata file {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("cannot read field metadata {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid field metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// One searchable property as described by the backend metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FieldInfo {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            name: None,
            description: None,
            r#type: None,
            format: None,
        }
    }

    fn is_format(&self, format: &str) -> bool {
        self.format.as_deref() == Some(format)
    }

    fn is_type(&self, ty: &str) -> bool {
        self.r#type.as_deref() == Some(ty)
    }

    /// Enumerations, dates and booleans are matched whole, never by fragment.
    pub fn supports_fragments(&self) -> bool {
        !(self.is_format("enum") || self.is_format("date") || self.is_type("boolean"))
    }

    pub fn supports_range(&self) -> bool {
        self.is_format("date")
            || self.is_type("date")
            || matches!(
                self.r#type.as_deref(),
                Some("integer" | "long" | "float" | "double" | "number" | "unsigned_long")
            )
    }
}

/// An operator as offered in the search type picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchType {
    pub operator: Operator,
    pub label: &'static str,
    pub description: &'static str,
    pub is_default: bool,
    pub disabled: bool,
}

impl SearchType {
    fn new(operator: Operator) -> Self {
        let (label, description) = match operator {
            Operator::Exists => ("Field exists", "Matches where selected field has a value."),
            Operator::NotExists => (
                "Field doesn't exist",
                "Matches where selected field has no set value.",
            ),
            Operator::Exact => ("Exact Match", "Contains the exact term or phrase."),
            Operator::Contains => (
                "Contains",
                "Field contains value that starts or ends with given term.",
            ),
            Operator::StartsWith => ("Starts With", "Field contains value that starts with given term."),
            Operator::EndsWith => ("Ends With", "Field contains value that ends with given term."),
            Operator::Range => ("Range", "Field value falls between the given bounds."),
        };
        Self {
            operator,
            label,
            description,
            is_default: operator == Operator::Exact,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldCatalog {
    fields: Vec<FieldInfo>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldInfo>) -> Self {
        Self { fields }
    }

    pub fn from_json_str(json: &str) -> Result<Self, FieldCatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, FieldCatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FieldCatalogError::Missing(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| FieldCatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, property: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.property == property)
    }

    /// The catalog's name for `property`, or a readable name derived from the property path.
    pub fn display_name(&self, property: &str) -> String {
        match self.get(property).and_then(|f| f.name.as_deref()) {
            Some(name) => capitalize(name),
            None => format_property_name(property),
        }
    }

    /// Search types offered for `field`; `None` means a search across all fields.
    pub fn search_types_for(&self, field: Option<&str>) -> Vec<SearchType> {
        let info = field.map(|f| self.get(f).cloned().unwrap_or_else(|| FieldInfo::new(f)));
        let mut types = Vec::with_capacity(Operator::ALL.len());
        for operator in Operator::ALL {
            let mut search_type = SearchType::new(operator);
            match operator {
                Operator::Exists | Operator::NotExists => search_type.disabled = info.is_none(),
                Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
                    if info.as_ref().is_some_and(|f| !f.supports_fragments()) {
                        continue;
                    }
                }
                Operator::Range => {
                    if !info.as_ref().is_some_and(FieldInfo::supports_range) {
                        continue;
                    }
                }
                Operator::Exact => {}
            }
            types.push(search_type);
        }
        types
    }
}

/// `funding.fundingAmount` becomes `Funding funding Amount`.
pub fn format_property_name(property: &str) -> String {
    let spaced = property.replace('.', " ");
    let mut name = String::with_capacity(spaced.len() + 4);
    for (i, c) in spaced.char_indices() {
        if c.is_uppercase() && i > 0 && !spaced[..i].ends_with(' ') {
            name.push(' ');
        }
        name.push(c);
    }
    capitalize(&name)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
