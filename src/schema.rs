//! Layer/feature schema, consumed as plain data.
//!
//! The document/schema provider supplies one [`ProjectSchema`] per
//! invocation: layer names, their feature definitions, and link roles.
//! The engine never calls back into the provider during computation; a
//! lookup that misses raises [`Error::SchemaMismatch`](crate::Error).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How link targets are compared when two nodes reference different
/// sub-structures at the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkCompareMode {
    /// Targets agree only if they are structurally equal, recursively.
    #[default]
    TargetIdentity,
    /// Targets agree if they share type, span, and the target layer's
    /// label feature value, regardless of other structure.
    TargetLabel,
}

/// Range of a feature, as declared by the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureRange {
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// 8-bit integer.
    Byte,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Boolean.
    Bool,
    /// String, possibly null.
    Str,
    /// Reference to nodes of another layer.
    Link {
        /// Layer the link targets.
        target_layer: String,
    },
    /// A range type the engine does not support; carries its name.
    Other(String),
}

/// One feature definition within a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Feature name.
    pub name: String,
    /// Declared range.
    pub range: FeatureRange,
}

impl FeatureSchema {
    /// Create a feature definition.
    #[must_use]
    pub fn new(name: impl Into<String>, range: FeatureRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

/// One annotation layer: a type name plus its feature definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSchema {
    /// Layer (type) name.
    pub name: String,
    /// Feature definitions.
    pub features: Vec<FeatureSchema>,
    /// Feature used as the node's label, e.g. for `TargetLabel` link
    /// comparison and category rendering.
    pub label_feature: Option<String>,
}

impl LayerSchema {
    /// Create a layer with no features.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
            label_feature: None,
        }
    }

    /// Add a feature definition.
    #[must_use]
    pub fn with_feature(mut self, feature: FeatureSchema) -> Self {
        self.features.push(feature);
        self
    }

    /// Declare the label feature.
    #[must_use]
    pub fn with_label_feature(mut self, name: impl Into<String>) -> Self {
        self.label_feature = Some(name.into());
        self
    }

    /// Look up a feature definition by name.
    pub fn feature(&self, name: &str) -> Result<&FeatureSchema> {
        self.features
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                Error::schema_mismatch(format!(
                    "feature '{}' not defined on layer '{}'",
                    name, self.name
                ))
            })
    }
}

/// The full schema for one diff + agreement invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSchema {
    layers: BTreeMap<String, LayerSchema>,
}

impl ProjectSchema {
    /// Create an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer definition.
    #[must_use]
    pub fn with_layer(mut self, layer: LayerSchema) -> Self {
        self.layers.insert(layer.name.clone(), layer);
        self
    }

    /// Look up a layer by name.
    pub fn layer(&self, name: &str) -> Result<&LayerSchema> {
        self.layers
            .get(name)
            .ok_or_else(|| Error::schema_mismatch(format!("layer '{name}' not defined")))
    }

    /// Layer names in deterministic order.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }
}
