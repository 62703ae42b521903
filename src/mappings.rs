use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, error};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use thiserror::Error;

/// Patterns applied when no mappings file is given, in application order.
const DEFAULT_LOCATION_MAPPINGS: &[(&str, &str)] = &[
    (r"\b(Street|Ave|Road|Rd|Blvd)\b", "Road"),
    (r"\b(City|Town)\b", "Region"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub pattern: String,
    pub replacement: String,
}

/// Ordered pattern → replacement pairs. Order matters: each entry sees the
/// output of the ones before it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mapping {
    entries: Vec<MappingEntry>,
}

impl Mapping {
    pub fn default_locations() -> Self {
        DEFAULT_LOCATION_MAPPINGS
            .iter()
            .map(|(pattern, replacement)| (*pattern, *replacement))
            .collect()
    }

    /// A repeated pattern keeps its first position and takes the newest replacement.
    pub fn insert(&mut self, pattern: String, replacement: String) {
        match self.entries.iter_mut().find(|entry| entry.pattern == pattern) {
            Some(entry) => entry.replacement = replacement,
            None => self.entries.push(MappingEntry {
                pattern,
                replacement,
            }),
        }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<P: Into<String>, R: Into<String>> FromIterator<(P, R)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (P, R)>>(iter: I) -> Self {
        let mut mapping = Mapping::default();
        for (pattern, replacement) in iter {
            mapping.insert(pattern.into(), replacement.into());
        }
        mapping
    }
}

impl<'de> Deserialize<'de> for Mapping {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = Mapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a flat object of regex patterns to replacement strings")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Mapping, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut mapping = Mapping::default();
                while let Some((pattern, replacement)) = access.next_entry::<String, String>()? {
                    mapping.insert(pattern, replacement);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingFormat {
    Json,
    Yaml,
}

impl MappingFormat {
    fn for_path(path: &Path) -> Self {
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if is_yaml {
            MappingFormat::Yaml
        } else {
            MappingFormat::Json
        }
    }
}

impl fmt::Display for MappingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingFormat::Json => f.write_str("JSON"),
            MappingFormat::Yaml => f.write_str("YAML"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MappingLoadError {
    #[error("Mappings file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Invalid {format} format in mappings file: {}", path.display())]
    InvalidFormat {
        format: MappingFormat,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Error loading mappings: {0}")]
    Other(#[source] std::io::Error),
}

/// Returns the mapping to apply for this run. Without a path, or when the
/// file cannot be used, the built-in location mapping is returned.
pub fn load_mappings(path: Option<&Path>) -> Mapping {
    let Some(path) = path else {
        debug!("using built-in location mappings");
        return Mapping::default_locations();
    };

    match try_load_mappings(path) {
        Ok(mapping) => {
            debug!(
                "loaded {} mapping(s) from {}",
                mapping.len(),
                path.display()
            );
            mapping
        }
        Err(err) => {
            error!("{err}");
            if let MappingLoadError::InvalidFormat { source, .. } = &err {
                debug!("parser reported: {source}");
            }
            Mapping::default_locations()
        }
    }
}

pub fn try_load_mappings(path: &Path) -> Result<Mapping, MappingLoadError> {
    let data = fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => MappingLoadError::NotFound(path.to_path_buf()),
        _ => MappingLoadError::Other(err),
    })?;

    let format = MappingFormat::for_path(path);
    let parsed: Result<Mapping, Box<dyn std::error::Error + Send + Sync>> = match format {
        MappingFormat::Json => serde_json::from_slice::<Mapping>(&data).map_err(Into::into),
        MappingFormat::Yaml => serde_yaml::from_slice::<Mapping>(&data).map_err(Into::into),
    };
    parsed.map_err(|source| MappingLoadError::InvalidFormat {
        format,
        path: path.to_path_buf(),
        source,
    })
}
