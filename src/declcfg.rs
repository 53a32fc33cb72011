//! File-based catalog objects (`olm.package`, `olm.channel`, `olm.bundle`) and their
//! YAML / JSON stream encodings.

use crate::constants::{SCHEMA_BUNDLE, SCHEMA_CHANNEL, SCHEMA_PACKAGE};
use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub default_channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub schema: String,
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub entries: Vec<ChannelEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub schema: String,
    pub name: String,
    pub package: String,
    pub image: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_images: Vec<RelatedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    #[serde(default)]
    pub name: String,
    pub image: String,
}

impl Bundle {
    /// Bundle image followed by its related images, first occurrence wins
    pub fn image_references(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        std::iter::once(self.image.as_str())
            .chain(self.related_images.iter().map(|r| r.image.as_str()))
            .filter(|image| !image.is_empty() && seen.insert(*image))
            .map(str::to_string)
            .collect()
    }

    pub fn property(&self, kind: &str) -> Option<&Value> {
        self.properties.iter().find(|p| p.kind == kind).map(|p| &p.value)
    }
}

/// Comparable summary of a catalog: which objects exist, not how they are encoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub packages: BTreeSet<String>,
    pub default_channels: BTreeSet<(String, String)>,
    pub channels: BTreeSet<(String, String)>,
    pub bundles: BTreeSet<(String, String)>,
    pub related_images: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarativeConfig {
    pub packages: Vec<Package>,
    pub channels: Vec<Channel>,
    pub bundles: Vec<Bundle>,
    /// Blobs with a schema this crate does not model, kept verbatim
    pub others: Vec<Value>,
}

fn schema_of(blob: &Value) -> Option<&str> {
    blob.get("schema").and_then(Value::as_str)
}

impl DeclarativeConfig {
    /// Parse either a JSON stream or a multi-document YAML stream
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim_start().starts_with('{') {
            Self::from_json_stream(content)
        } else {
            Self::from_yaml_stream(content)
        }
    }

    pub fn from_yaml_stream(content: &str) -> Result<Self> {
        let mut cfg = Self::default();
        for document in serde_yaml_ng::Deserializer::from_str(content) {
            let blob = Value::deserialize(document)?;
            if blob.is_null() {
                continue;
            }
            cfg.add_blob(blob)?;
        }
        Ok(cfg)
    }

    pub fn from_json_stream(content: &str) -> Result<Self> {
        let mut cfg = Self::default();
        for blob in serde_json::Deserializer::from_str(content).into_iter::<Value>() {
            cfg.add_blob(blob?)?;
        }
        Ok(cfg)
    }

    pub fn add_blob(&mut self, blob: Value) -> Result<()> {
        match schema_of(&blob) {
            Some(SCHEMA_PACKAGE) => self.packages.push(serde_json::from_value(blob)?),
            Some(SCHEMA_CHANNEL) => self.channels.push(serde_json::from_value(blob)?),
            Some(SCHEMA_BUNDLE) => self.bundles.push(serde_json::from_value(blob)?),
            Some(_) => self.others.push(blob),
            None => {
                return Err(CatalogError::validation(format!(
                    "catalog object without a schema: {}",
                    blob
                )))
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: DeclarativeConfig) {
        self.packages.extend(other.packages);
        self.channels.extend(other.channels);
        self.bundles.extend(other.bundles);
        self.others.extend(other.others);
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.channels.is_empty() && self.bundles.is_empty() && self.others.is_empty()
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Default channel of `package`, or of the only package when no name is given
    pub fn default_channel(&self, package: Option<&str>) -> Option<&str> {
        let pkg = match package {
            Some(name) => self.package(name),
            None if self.packages.len() == 1 => self.packages.first(),
            None => None,
        }?;
        Some(pkg.default_channel.as_str()).filter(|c| !c.is_empty())
    }

    pub fn inventory(&self) -> Inventory {
        let mut inv = Inventory::default();
        for p in &self.packages {
            inv.packages.insert(p.name.clone());
            if !p.default_channel.is_empty() {
                inv.default_channels.insert((p.name.clone(), p.default_channel.clone()));
            }
        }
        for c in &self.channels {
            inv.channels.insert((c.package.clone(), c.name.clone()));
        }
        for b in &self.bundles {
            inv.bundles.insert((b.package.clone(), b.name.clone()));
            inv.related_images.extend(b.related_images.iter().map(|r| r.image.clone()));
        }
        inv
    }

    /// YAML stream grouped per package (package, channels, bundles, others), packages
    /// and objects sorted by name. Objects without a package come last.
    pub fn to_yaml(&self) -> Result<String> {
        let mut names: BTreeSet<&str> = self.packages.iter().map(|p| p.name.as_str()).collect();
        names.extend(self.channels.iter().map(|c| c.package.as_str()));
        names.extend(self.bundles.iter().map(|b| b.package.as_str()));
        names.extend(self.others.iter().filter_map(|o| o.get("package").and_then(Value::as_str)));

        let mut out = String::new();
        let mut push = |doc: String| {
            out.push_str("---\n");
            out.push_str(&doc);
        };

        for name in names {
            for p in self.packages.iter().filter(|p| p.name == name) {
                push(serde_yaml_ng::to_string(p)?);
            }

            let mut channels: Vec<&Channel> = self.channels.iter().filter(|c| c.package == name).collect();
            channels.sort_by(|a, b| a.name.cmp(&b.name));
            for c in channels {
                push(serde_yaml_ng::to_string(c)?);
            }

            let mut bundles: Vec<&Bundle> = self.bundles.iter().filter(|b| b.package == name).collect();
            bundles.sort_by(|a, b| a.name.cmp(&b.name));
            for b in bundles {
                push(serde_yaml_ng::to_string(b)?);
            }

            for o in self
                .others
                .iter()
                .filter(|o| o.get("package").and_then(Value::as_str) == Some(name))
            {
                push(serde_yaml_ng::to_string(o)?);
            }
        }

        for o in self.others.iter().filter(|o| o.get("package").and_then(Value::as_str).is_none()) {
            push(serde_yaml_ng::to_string(o)?);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"---
schema: olm.package
name: demo-operator
defaultChannel: preview
---
schema: olm.channel
package: demo-operator
name: preview
entries:
  - name: demo-operator.v1.0.0
  - name: demo-operator.v1.1.0
    replaces: demo-operator.v1.0.0
---
schema: olm.bundle
name: demo-operator.v1.1.0
package: demo-operator
image: quay.io/demo/bundle@sha256:1111111111111111111111111111111111111111111111111111111111111111
properties:
  - type: olm.package
    value:
      packageName: demo-operator
      version: 1.1.0
relatedImages:
  - name: ""
    image: quay.io/demo/bundle@sha256:1111111111111111111111111111111111111111111111111111111111111111
  - name: operator
    image: quay.io/demo/operator:v1.1.0
---
schema: olm.deprecations
package: demo-operator
entries: []
"#;

    #[test]
    fn test_parse_yaml_stream() {
        let cfg = DeclarativeConfig::parse(CATALOG).unwrap();
        assert_eq!(cfg.packages.len(), 1);
        assert_eq!(cfg.channels[0].entries[1].replaces.as_deref(), Some("demo-operator.v1.0.0"));
        assert_eq!(cfg.bundles.len(), 1);
        assert_eq!(cfg.others.len(), 1);
        assert_eq!(cfg.default_channel(None), Some("preview"));
        assert_eq!(cfg.default_channel(Some("other")), None);
    }

    #[test]
    fn test_parse_json_stream() {
        let json = r#"{"schema":"olm.package","name":"p","defaultChannel":"stable"}
{"schema":"olm.channel","package":"p","name":"stable","entries":[{"name":"p.v1"}]}"#;
        let cfg = DeclarativeConfig::parse(json).unwrap();
        assert_eq!(cfg.default_channel(Some("p")), Some("stable"));
        assert_eq!(cfg.channels.len(), 1);
    }

    #[test]
    fn test_missing_schema_is_rejected() {
        let err = DeclarativeConfig::parse("name: orphan\n").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_image_references_dedup_in_order() {
        let cfg = DeclarativeConfig::parse(CATALOG).unwrap();
        let refs = cfg.bundles[0].image_references();
        assert_eq!(refs.len(), 2);
        assert!(refs[0].starts_with("quay.io/demo/bundle@"));
        assert_eq!(refs[1], "quay.io/demo/operator:v1.1.0");
    }

    #[test]
    fn test_to_yaml_orders_objects_and_reparses() {
        let mut cfg = DeclarativeConfig::parse(CATALOG).unwrap();
        // scramble input order
        cfg.others.reverse();
        let moved = cfg.packages.remove(0);
        cfg.packages.push(moved);

        let yaml = cfg.to_yaml().unwrap();
        let schemas: Vec<&str> = yaml
            .lines()
            .filter_map(|l| l.strip_prefix("schema: "))
            .collect();
        assert_eq!(schemas, vec!["olm.package", "olm.channel", "olm.bundle", "olm.deprecations"]);

        let reparsed = DeclarativeConfig::parse(&yaml).unwrap();
        assert_eq!(reparsed.inventory(), cfg.inventory());
    }

    #[test]
    fn test_inventory_ignores_encoding_differences() {
        let yaml = DeclarativeConfig::parse(CATALOG).unwrap();
        let mut json = String::new();
        for doc in serde_yaml_ng::Deserializer::from_str(CATALOG) {
            let v = Value::deserialize(doc).unwrap();
            json.push_str(&serde_json::to_string(&v).unwrap());
            json.push('\n');
        }
        let from_json = DeclarativeConfig::parse(&json).unwrap();
        assert_eq!(yaml.inventory(), from_json.inventory());
        assert!(yaml.inventory().related_images.contains("quay.io/demo/operator:v1.1.0"));
    }
}
