use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use tar::Archive;

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Flattened view of an image filesystem restricted to the files that were asked for
#[derive(Debug, Default, Clone)]
pub struct ImageFiles {
    files: BTreeMap<String, Vec<u8>>,
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").trim_start_matches('/').to_string()
}

impl ImageFiles {
    /// Apply layers in order. Only regular files under one of `prefixes` are kept;
    /// whiteouts from later layers delete earlier entries.
    pub fn from_layers<'a, I>(layers: I, prefixes: &[&str]) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let prefixes: Vec<String> = prefixes.iter().map(|p| normalize(p)).collect();
        let wanted = |path: &str| prefixes.iter().any(|p| path.starts_with(p.as_str()));

        let mut files = BTreeMap::new();
        for (idx, layer) in layers.into_iter().enumerate() {
            apply_layer(layer, &mut files, &wanted).with_context(|| format!("unpacking layer {}", idx))?;
        }
        Ok(Self { files })
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(&normalize(path)).map(Vec::as_slice)
    }

    /// Files directly or transitively below `dir`, in path order
    pub fn under<'a>(&'a self, dir: &str) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        let mut dir = normalize(dir);
        if !dir.is_empty() && !dir.ends_with('/') {
            dir.push('/');
        }
        self.files
            .iter()
            .filter(move |(path, _)| path.starts_with(dir.as_str()))
            .map(|(path, data)| (path.as_str(), data.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn open_layer(layer: &[u8]) -> Box<dyn Read + '_> {
    // gzip magic; anything else is treated as an uncompressed tar
    if layer.starts_with(&[0x1f, 0x8b]) {
        Box::new(GzDecoder::new(layer))
    } else {
        Box::new(layer)
    }
}

fn apply_layer<F: Fn(&str) -> bool>(
    layer: &[u8],
    files: &mut BTreeMap<String, Vec<u8>>,
    wanted: &F,
) -> Result<()> {
    let mut archive = Archive::new(open_layer(layer));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = normalize(&entry.path()?.to_string_lossy());

        let (parent, file_name) = match path.rsplit_once('/') {
            Some((parent, name)) => (format!("{}/", parent), name.to_string()),
            None => (String::new(), path.clone()),
        };

        if file_name == OPAQUE_WHITEOUT {
            files.retain(|existing, _| !existing.starts_with(parent.as_str()));
            continue;
        }
        if let Some(hidden) = file_name.strip_prefix(WHITEOUT_PREFIX) {
            let target = format!("{}{}", parent, hidden);
            let target_dir = format!("{}/", target);
            files.retain(|existing, _| existing != &target && !existing.starts_with(target_dir.as_str()));
            continue;
        }

        if !entry.header().entry_type().is_file() || !wanted(&path) {
            continue;
        }

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.insert(path, data);
    }
    Ok(())
}
