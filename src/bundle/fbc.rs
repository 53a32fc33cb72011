use crate::bundle::{BundleInfo, BundleMetadata};
use crate::constants::{DEFAULT_CHANNEL, SCHEMA_TEMPLATE_BASIC};
use crate::declcfg::ChannelEntry;
use crate::error::{CatalogError, Result};
use crate::oci::parse_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An `olm.template.basic` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbcTemplate {
    pub schema: String,
    pub entries: Vec<TemplateEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum TemplateEntry {
    #[serde(rename = "olm.package")]
    Package(PackageEntry),
    #[serde(rename = "olm.channel")]
    Channel(ChannelBlock),
    #[serde(rename = "olm.bundle")]
    Bundle(BundleEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageEntry {
    pub name: String,
    pub default_channel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBlock {
    pub package: String,
    pub name: String,
    pub entries: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn channel_or_default(channel: &str) -> &str {
    if channel.is_empty() {
        DEFAULT_CHANNEL
    } else {
        channel
    }
}

/// Build date reduced to `YYYY-MM-DDTHHMM`. Anything shorter than a date yields "".
/// A bare date denotes midnight.
fn entry_timestamp(build_date: &str) -> String {
    let is_date = |s: &str| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok();

    if !build_date.is_ascii() {
        return String::new();
    }
    if build_date.len() >= 16 && is_date(&build_date[..10]) {
        let time = build_date[11..16].replace(':', "");
        format!("{}T{}", &build_date[..10], time)
    } else if build_date.len() == 10 && is_date(build_date) {
        format!("{}T0000", build_date)
    } else {
        String::new()
    }
}

/// Short commit SHA taken from a bundle tag; a leading `v<version>-` is not part of it
fn tag_short_sha(tag: &str, version: &str) -> String {
    let prefix = format!("v{}-", version);
    let sha = if !version.is_empty() && tag.starts_with(&prefix) {
        &tag[prefix.len()..]
    } else {
        tag
    };
    sha.chars().take(8).collect()
}

/// `<package>.v<version>-g<shortSHA>-<date>T<time>`, without the trailing timestamp
/// segment when the build date is unusable
pub fn catalog_entry_name(package: &str, meta: &BundleMetadata) -> String {
    let name = format!(
        "{}.v{}-g{}",
        package,
        meta.version,
        tag_short_sha(&meta.tag, &meta.version)
    );
    match entry_timestamp(&meta.build_date) {
        ts if ts.is_empty() => name,
        ts => format!("{}-{}", name, ts),
    }
}

impl FbcTemplate {
    fn assemble(package: &str, channel: &str, entries: Vec<ChannelEntry>, bundles: Vec<BundleEntry>) -> Self {
        let mut all = vec![
            TemplateEntry::Package(PackageEntry {
                name: package.to_string(),
                default_channel: channel.to_string(),
            }),
            TemplateEntry::Channel(ChannelBlock {
                package: package.to_string(),
                name: channel.to_string(),
                entries,
            }),
        ];
        all.extend(bundles.into_iter().map(TemplateEntry::Bundle));
        Self {
            schema: SCHEMA_TEMPLATE_BASIC.to_string(),
            entries: all,
        }
    }

    /// One package, one channel holding a single entry without `replaces`
    pub fn single(bundle_image: &str, info: &BundleInfo, channel: &str) -> Result<Self> {
        if bundle_image.is_empty() {
            return Err(CatalogError::validation("bundle image cannot be empty"));
        }
        let channel = channel_or_default(channel);
        let entry = ChannelEntry {
            name: info.name.clone(),
            replaces: None,
            skips: Vec::new(),
            skip_range: None,
        };
        let bundle = BundleEntry {
            image: bundle_image.to_string(),
            name: Some(info.name.clone()),
        };
        Ok(Self::assemble(&info.package, channel, vec![entry], vec![bundle]))
    }

    /// Linear upgrade chain, oldest first by the instant each bundle was built, so
    /// differing UTC offsets compare correctly. Bundles with equal build dates keep
    /// their relative order; unparseable dates sort before every dated bundle.
    pub fn chain(package: &str, bundles: &[BundleMetadata], channel: &str) -> Result<Self> {
        if bundles.is_empty() {
            return Err(CatalogError::validation("no bundles provided"));
        }
        if package.is_empty() {
            return Err(CatalogError::validation("package name cannot be empty"));
        }
        let channel = channel_or_default(channel);

        let mut ordered: Vec<&BundleMetadata> = bundles.iter().collect();
        ordered.sort_by_key(|m| parse_timestamp(&m.build_date));

        let names: Vec<String> = ordered.iter().map(|m| catalog_entry_name(package, m)).collect();
        let entries = names
            .iter()
            .enumerate()
            .map(|(i, name)| ChannelEntry {
                name: name.clone(),
                replaces: i.checked_sub(1).map(|prev| names[prev].clone()),
                skips: Vec::new(),
                skip_range: None,
            })
            .collect();
        let bundle_entries = ordered
            .iter()
            .zip(&names)
            .map(|(meta, name)| BundleEntry {
                image: meta.pinned_image(),
                name: Some(name.clone()),
            })
            .collect();

        let template = Self::assemble(package, channel, entries, bundle_entries);
        template.validate()?;
        Ok(template)
    }

    pub fn package(&self) -> Option<&PackageEntry> {
        self.entries.iter().find_map(|e| match e {
            TemplateEntry::Package(p) => Some(p),
            _ => None,
        })
    }

    pub fn channel(&self) -> Option<&ChannelBlock> {
        self.entries.iter().find_map(|e| match e {
            TemplateEntry::Channel(c) => Some(c),
            _ => None,
        })
    }

    pub fn bundles(&self) -> impl Iterator<Item = &BundleEntry> {
        self.entries.iter().filter_map(|e| match e {
            TemplateEntry::Bundle(b) => Some(b),
            _ => None,
        })
    }

    pub fn bundle_images(&self) -> Vec<String> {
        self.bundles().map(|b| b.image.clone()).collect()
    }

    /// Structural invariants: one package, one channel in that package, a bundle entry
    /// for every channel entry, and a single linear `replaces` chain.
    pub fn validate(&self) -> Result<()> {
        let packages = self
            .entries
            .iter()
            .filter(|e| matches!(e, TemplateEntry::Package(_)))
            .count();
        let channels = self
            .entries
            .iter()
            .filter(|e| matches!(e, TemplateEntry::Channel(_)))
            .count();
        if packages != 1 || channels != 1 {
            return Err(CatalogError::validation(format!(
                "template must hold exactly one package and one channel, found {} and {}",
                packages, channels
            )));
        }

        let (Some(package), Some(channel)) = (self.package(), self.channel()) else {
            return Err(CatalogError::validation("template is missing its package or channel"));
        };
        if channel.package != package.name {
            return Err(CatalogError::validation(format!(
                "channel {} belongs to package {}, template package is {}",
                channel.name, channel.package, package.name
            )));
        }

        let bundle_names: BTreeSet<&str> = self.bundles().filter_map(|b| b.name.as_deref()).collect();
        let mut replaced = BTreeSet::new();
        for (i, entry) in channel.entries.iter().enumerate() {
            if !bundle_names.contains(entry.name.as_str()) {
                return Err(CatalogError::validation(format!(
                    "channel entry {} has no matching bundle entry",
                    entry.name
                )));
            }
            let expected = i.checked_sub(1).map(|prev| channel.entries[prev].name.as_str());
            if entry.replaces.as_deref() != expected {
                return Err(CatalogError::validation(format!(
                    "channel entry {} breaks the replaces chain",
                    entry.name
                )));
            }
            if let Some(r) = &entry.replaces {
                if !replaced.insert(r.as_str()) {
                    return Err(CatalogError::validation(format!("{} is replaced more than once", r)));
                }
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let template: Self = serde_yaml_ng::from_str(content)?;
        if template.schema != SCHEMA_TEMPLATE_BASIC {
            return Err(CatalogError::validation(format!(
                "unsupported template schema {}",
                template.schema
            )));
        }
        Ok(template)
    }
}
