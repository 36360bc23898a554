// src/schema/descriptions.rs

use serde_yaml::Value as YamlValue;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::fetch::transport::HttpTransport;
use crate::process::utils::staging_file;

pub const SCHEMA_URL: &str = "https://api.fdic.gov/banks/docs/sod_properties.yaml";
pub const DEFAULT_CACHE_PATH: &str = "data/.sod_schema_cache.json";
pub const REPORTING_PERIOD: &str = "REPORTING_PERIOD";
pub const REPORTING_PERIOD_DESCRIPTION: &str = "Reporting date (June 30 of data year)";

/// Upper-cased field name → description text.
///
/// Built once before any per-year work starts and never mutated afterwards;
/// clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct FieldDescriptions(Arc<BTreeMap<String, String>>);

impl FieldDescriptions {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self(Arc::new(map))
    }

    /// Non-empty description for `field`, matched case-insensitively.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(&field.to_uppercase())
            .map(String::as_str)
            .filter(|d| !d.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pull per-field text out of the published YAML schema.
/// `title` wins over `description`; the derived reporting date gets its own entry.
pub fn parse_schema_document(text: &str) -> Result<BTreeMap<String, String>> {
    let doc: YamlValue = serde_yaml::from_str(text)?;
    let mut out = BTreeMap::new();

    let props = doc
        .get("properties")
        .and_then(|p| p.get("data"))
        .and_then(|d| d.get("properties"))
        .and_then(YamlValue::as_mapping);

    if let Some(props) = props {
        for (name, def) in props {
            let Some(name) = name.as_str() else { continue };
            let text_of = |key: &str| {
                def.get(key)
                    .and_then(YamlValue::as_str)
                    .unwrap_or("")
                    .to_string()
            };
            let title = text_of("title");
            let desc = if title.is_empty() { text_of("description") } else { title };
            out.insert(name.to_uppercase(), desc);
        }
    }

    out.insert(
        REPORTING_PERIOD.to_string(),
        REPORTING_PERIOD_DESCRIPTION.to_string(),
    );
    Ok(out)
}

/// Local JSON cache in front of the remote schema document.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    path: PathBuf,
    url: String,
}

impl SchemaCache {
    pub fn new(path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cache file; unreadable or corrupt caches count as absent.
    pub fn load(&self) -> Option<BTreeMap<String, String>> {
        let text = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt schema cache");
                None
            }
        }
    }

    pub fn store(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut staged = staging_file(&self.path)?;
        serde_json::to_writer_pretty(staged.as_file_mut(), map)?;
        // a refresh replaces the previous cache
        staged.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    async fn fetch(&self, transport: &HttpTransport) -> Result<BTreeMap<String, String>> {
        let text = transport.get_text(&self.url, &[]).await?;
        parse_schema_document(&text)
    }

    /// Cached mapping if present (unless `refresh`), else fetch and persist.
    /// A failed fetch yields an empty mapping rather than an error.
    #[instrument(level = "info", skip(self, transport), fields(cache = %self.path.display()))]
    pub async fn load_or_fetch(&self, transport: &HttpTransport, refresh: bool) -> FieldDescriptions {
        if !refresh {
            if let Some(map) = self.load() {
                info!(count = map.len(), "loaded field descriptions from cache");
                return FieldDescriptions::from_map(map);
            }
        }

        info!(url = %self.url, "fetching field descriptions");
        match self.fetch(transport).await {
            Ok(map) => {
                if let Err(e) = self.store(&map) {
                    warn!(error = %e, "could not write schema cache");
                }
                info!(count = map.len(), "loaded field descriptions");
                FieldDescriptions::from_map(map)
            }
            Err(e) => {
                warn!(error = %e, "could not fetch schema; continuing without descriptions");
                FieldDescriptions::empty()
            }
        }
    }
}
