//! Catalog entries and the node-type mapping, as handed to the matchers.
//!
//! Catalog payloads come from the Nitra website and from ComfyUI-Manager,
//! and name the same thing several ways (`gitRepo`, `git_url`, `url`, ...).
//! The adapters here resolve those aliases once at deserialization so the
//! matchers only ever see a single optional field per concept.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{NitraError, Result};
use crate::matching::normalize;

/// Keys under which catalog endpoints wrap their entry arrays.
const WRAPPER_KEYS: &[&str] = &["customNodes", "nodes", "models", "data", "items"];

/// Fields a custom node match writes next to the flattened package.
const NODE_MATCH_KEYS: &[&str] = &["detectedName", "isInstalled", "matchSource"];

/// Fields a model match writes next to the flattened model.
const MODEL_MATCH_KEYS: &[&str] = &[
    "matchType",
    "score",
    "detectedName",
    "originalPath",
    "isInstalled",
];

/// A custom node package available for install.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNodePackage", rename_all = "camelCase")]
pub struct CatalogNodePackage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Resolved repository URL.
    #[serde(rename = "gitRepo", skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    /// Every other field of the catalog entry, passed through untouched.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl CatalogNodePackage {
    /// Create a package with an id, display name and repository.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        repo_url: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            repo_url: Some(repo_url.into()),
            metadata: Map::new(),
        }
    }

    /// Key used to deduplicate matches: the id, falling back to the repo
    /// URL, then the name.
    pub fn dedup_key(&self) -> String {
        self.id
            .as_deref()
            .or(self.repo_url.as_deref())
            .or(self.name.as_deref())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNodePackage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<Value>,
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    git_repo: Option<Value>,
    #[serde(default, rename = "git_url")]
    git_url: Option<Value>,
    #[serde(default)]
    url: Option<Value>,
    #[serde(default)]
    reference: Option<Value>,
    #[serde(flatten)]
    metadata: Map<String, Value>,
}

impl From<RawNodePackage> for CatalogNodePackage {
    fn from(raw: RawNodePackage) -> Self {
        Self {
            id: text(raw.id),
            name: text(raw.name).or_else(|| text(raw.title)),
            repo_url: first_text([raw.git_repo, raw.git_url, raw.url, raw.reference]),
            metadata: without_keys(raw.metadata, NODE_MATCH_KEYS),
        }
    }
}

/// A model file available for download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCatalogModel", rename_all = "camelCase")]
pub struct CatalogModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// File name as it should land on disk, extension included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Resolved download URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Downloading requires a HuggingFace token.
    pub hf_token_required: bool,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl CatalogModel {
    /// Create a model entry with just a file name.
    pub fn named(model_name: impl Into<String>) -> Self {
        Self {
            model_name: Some(model_name.into()),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCatalogModel {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    model_name: Option<Value>,
    #[serde(default)]
    url: Option<Value>,
    #[serde(default)]
    model_url: Option<Value>,
    #[serde(default)]
    file_url: Option<Value>,
    #[serde(default)]
    download_url: Option<Value>,
    #[serde(default)]
    href: Option<Value>,
    #[serde(default)]
    hf_token_required: Option<Value>,
    #[serde(flatten)]
    metadata: Map<String, Value>,
}

impl From<RawCatalogModel> for CatalogModel {
    fn from(raw: RawCatalogModel) -> Self {
        Self {
            id: text(raw.id),
            model_name: text(raw.model_name),
            url: first_text([raw.url, raw.model_url, raw.file_url, raw.download_url, raw.href]),
            hf_token_required: raw.hf_token_required.as_ref().is_some_and(truthy),
            metadata: without_keys(raw.metadata, MODEL_MATCH_KEYS),
        }
    }
}

/// Parse a custom node catalog payload, skipping entries that are not objects.
pub fn parse_node_catalog(payload: &Value) -> Vec<CatalogNodePackage> {
    parse_entries(payload, "custom node")
}

/// Parse a model catalog payload, skipping entries that are not objects.
pub fn parse_model_catalog(payload: &Value) -> Vec<CatalogModel> {
    parse_entries(payload, "model")
}

/// Parse a custom node catalog from a JSON string.
pub fn node_catalog_from_str(json: &str) -> Result<Vec<CatalogNodePackage>> {
    let payload: Value = serde_json::from_str(json)?;
    Ok(parse_node_catalog(&payload))
}

/// Parse a model catalog from a JSON string.
pub fn model_catalog_from_str(json: &str) -> Result<Vec<CatalogModel>> {
    let payload: Value = serde_json::from_str(json)?;
    Ok(parse_model_catalog(&payload))
}

fn parse_entries<T: serde::de::DeserializeOwned>(payload: &Value, kind: &str) -> Vec<T> {
    let entries = match payload {
        Value::Array(entries) => entries.as_slice(),
        Value::Object(map) => match WRAPPER_KEYS.iter().find_map(|key| map.get(*key)) {
            Some(Value::Array(entries)) => entries.as_slice(),
            _ => {
                warn!("{} catalog object has no entry array", kind);
                return Vec::new();
            }
        },
        _ => {
            warn!("{} catalog is neither an array nor an object", kind);
            return Vec::new();
        }
    };

    let parsed: Vec<T> = entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            if !entry.is_object() {
                warn!("Skipping {} catalog entry {}: not an object", kind, index);
                return None;
            }
            match T::deserialize(entry) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Skipping {} catalog entry {}: {}", kind, index, e);
                    None
                }
            }
        })
        .collect();

    debug!("Parsed {} of {} {} catalog entries", parsed.len(), entries.len(), kind);
    parsed
}

/// Repository URL to the node types that repository registers.
///
/// Deserializes from ComfyUI-Manager's `extension-node-map.json`
/// (`{ url: [[types...], {meta}] }`) or from a plain `{ url: [types...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, RawMappingEntry>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct NodeTypeMapping {
    repos: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMappingEntry {
    Types(Vec<String>),
    WithMeta(Vec<Value>),
    Unrecognized(serde::de::IgnoredAny),
}

impl RawMappingEntry {
    fn into_types(self) -> Vec<String> {
        match self {
            RawMappingEntry::Types(types) => types,
            RawMappingEntry::WithMeta(parts) => match parts.into_iter().next() {
                Some(Value::Array(types)) => types
                    .into_iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            },
            RawMappingEntry::Unrecognized(_) => Vec::new(),
        }
    }
}

impl From<BTreeMap<String, RawMappingEntry>> for NodeTypeMapping {
    fn from(raw: BTreeMap<String, RawMappingEntry>) -> Self {
        Self {
            repos: raw
                .into_iter()
                .map(|(repo, entry)| (repo, entry.into_types()))
                .collect(),
        }
    }
}

impl From<NodeTypeMapping> for BTreeMap<String, Vec<String>> {
    fn from(mapping: NodeTypeMapping) -> Self {
        mapping.repos
    }
}

impl<R, I, T> FromIterator<(R, I)> for NodeTypeMapping
where
    R: Into<String>,
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    fn from_iter<It: IntoIterator<Item = (R, I)>>(iter: It) -> Self {
        let mut mapping = Self::new();
        for (repo, types) in iter {
            mapping.insert(repo, types);
        }
        mapping
    }
}

impl NodeTypeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add node types for a repository, extending any existing entry.
    pub fn insert<T: Into<String>>(
        &mut self,
        repo_url: impl Into<String>,
        node_types: impl IntoIterator<Item = T>,
    ) {
        self.repos
            .entry(repo_url.into())
            .or_default()
            .extend(node_types.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.repos
            .iter()
            .map(|(repo, types)| (repo.as_str(), types.as_slice()))
    }

    /// Normalized node type to every repo URL that registers it.
    pub fn node_type_index(&self) -> HashMap<String, BTreeSet<String>> {
        let mut index: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (repo, types) in &self.repos {
            for node_type in types {
                index
                    .entry(normalize(node_type))
                    .or_default()
                    .insert(repo.clone());
            }
        }
        index
    }

    /// Parse a mapping from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load `extension-node-map.json`; a missing file is an empty mapping.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Node type mapping not found at {}", path.display());
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| NitraError::io_with_path(e, path))?;
        let mapping = Self::from_json_str(&contents)?;
        debug!(
            "Loaded node type mapping for {} repositories from {}",
            mapping.len(),
            path.display()
        );
        Ok(mapping)
    }
}

/// Non-empty string form of a JSON scalar (numeric ids are common).
fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text<const N: usize>(values: [Option<Value>; N]) -> Option<String> {
    values.into_iter().find_map(text)
}

/// Drop pass-through fields that would collide with match result fields.
fn without_keys(mut metadata: Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    for key in keys {
        if metadata.remove(*key).is_some() {
            debug!("Dropping catalog field '{}' shadowed by match results", key);
        }
    }
    metadata
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_package_repo_alias_priority() {
        let pkg: CatalogNodePackage = serde_json::from_value(json!({
            "id": "impact",
            "git_url": "https://github.com/ltdrdata/ComfyUI-Impact-Pack",
            "url": "https://example.com/ignored",
        }))
        .unwrap();
        assert_eq!(
            pkg.repo_url.as_deref(),
            Some("https://github.com/ltdrdata/ComfyUI-Impact-Pack")
        );

        let pkg: CatalogNodePackage = serde_json::from_value(json!({
            "reference": "https://github.com/x/y",
            "gitRepo": "",
        }))
        .unwrap();
        assert_eq!(pkg.repo_url.as_deref(), Some("https://github.com/x/y"));
    }

    #[test]
    fn test_node_package_keeps_metadata() {
        let pkg: CatalogNodePackage = serde_json::from_value(json!({
            "id": 42,
            "title": "Impact Pack",
            "author": "ltdrdata",
            "stars": 1200,
        }))
        .unwrap();
        assert_eq!(pkg.id.as_deref(), Some("42"));
        assert_eq!(pkg.name.as_deref(), Some("Impact Pack"));
        assert_eq!(pkg.metadata.get("author"), Some(&json!("ltdrdata")));

        let out = serde_json::to_value(&pkg).unwrap();
        assert_eq!(out["stars"], json!(1200));
        assert!(out.get("gitRepo").is_none());
    }

    #[test]
    fn test_dedup_key_fallbacks() {
        let mut pkg = CatalogNodePackage::new("p1", "Pack", "https://github.com/a/b");
        assert_eq!(pkg.dedup_key(), "p1");
        pkg.id = None;
        assert_eq!(pkg.dedup_key(), "https://github.com/a/b");
        pkg.repo_url = None;
        assert_eq!(pkg.dedup_key(), "Pack");
    }

    #[test]
    fn test_model_url_and_token_resolution() {
        let model: CatalogModel = serde_json::from_value(json!({
            "modelName": "flux1-dev.safetensors",
            "url": "",
            "downloadUrl": "https://hf.co/flux1-dev.safetensors",
            "href": "https://example.com/other",
            "hfTokenRequired": true,
            "folder": "unet",
        }))
        .unwrap();
        assert_eq!(
            model.url.as_deref(),
            Some("https://hf.co/flux1-dev.safetensors")
        );
        assert!(model.hf_token_required);
        assert_eq!(model.metadata.get("folder"), Some(&json!("unet")));
    }

    #[test]
    fn test_parse_wrapped_catalog_skips_non_objects() {
        let payload = json!({ "models": [ {"modelName": "a.ckpt"}, "junk", 3 ] });
        let models = parse_model_catalog(&payload);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_name.as_deref(), Some("a.ckpt"));

        assert!(parse_node_catalog(&json!("nope")).is_empty());
        assert!(parse_node_catalog(&json!({"unrelated": true})).is_empty());
    }

    #[test]
    fn test_catalog_from_str_rejects_bad_json() {
        assert!(node_catalog_from_str("[{").is_err());
        assert_eq!(model_catalog_from_str("[]").unwrap().len(), 0);
    }

    #[test]
    fn test_mapping_manager_format() {
        let mapping = NodeTypeMapping::from_json_str(
            r#"{
                "https://github.com/x/advanced": [["KSamplerAdvanced", "Foo"], {"title_aux": "Advanced"}],
                "https://github.com/y/plain": ["Bar"],
                "https://github.com/z/odd": 7
            }"#,
        )
        .unwrap();
        assert_eq!(mapping.len(), 3);

        let index = mapping.node_type_index();
        assert!(index["ksampleradvanced"].contains("https://github.com/x/advanced"));
        assert!(index["bar"].contains("https://github.com/y/plain"));
        assert!(!index.contains_key("7"));
    }

    #[test]
    fn test_mapping_index_collects_all_repos() {
        let mapping: NodeTypeMapping = [
            ("https://github.com/a/one", vec!["Shared"]),
            ("https://github.com/b/two", vec!["shared ", "Other"]),
        ]
        .into_iter()
        .collect();
        let index = mapping.node_type_index();
        assert_eq!(index["shared"].len(), 2);
    }

    #[test]
    fn test_mapping_skips_unrecognized_entries() {
        let mapping = NodeTypeMapping::from_json_str(
            r#"{"https://github.com/a/b": ["NodeA"], "https://github.com/c/d": 42}"#,
        )
        .unwrap();
        assert_eq!(mapping.len(), 2);
        let index = mapping.node_type_index();
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("nodea"));
    }

    #[test]
    fn test_text_fields_are_trimmed() {
        let model: CatalogModel = serde_json::from_value(json!({
            "id": " m1 ",
            "modelName": " x_model.ckpt\n",
            "url": "   ",
            "href": "https://example.com/x_model.ckpt",
        }))
        .unwrap();
        assert_eq!(model.id.as_deref(), Some("m1"));
        assert_eq!(model.model_name.as_deref(), Some("x_model.ckpt"));
        assert_eq!(model.url.as_deref(), Some("https://example.com/x_model.ckpt"));
    }

    #[test]
    fn test_match_result_fields_dropped_from_metadata() {
        let model: CatalogModel = serde_json::from_value(json!({
            "modelName": "a.safetensors",
            "score": 5,
            "isInstalled": true,
            "type": "lora",
        }))
        .unwrap();
        assert!(!model.metadata.contains_key("score"));
        assert!(!model.metadata.contains_key("isInstalled"));
        assert_eq!(model.metadata.get("type"), Some(&json!("lora")));

        let pkg: CatalogNodePackage = serde_json::from_value(json!({
            "id": "impact",
            "matchSource": "cnr_id",
            "detectedName": "x",
            "stars": 10,
        }))
        .unwrap();
        assert!(!pkg.metadata.contains_key("matchSource"));
        assert!(!pkg.metadata.contains_key("detectedName"));
        assert_eq!(pkg.metadata.get("stars"), Some(&json!(10)));
    }

    #[test]
    fn test_mapping_load_missing_file_is_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        let mapping = NodeTypeMapping::load(temp.path().join("extension-node-map.json")).unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_mapping_load_from_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("extension-node-map.json");
        std::fs::write(&path, r#"{"https://github.com/a/b": [["NodeA"], {}]}"#).unwrap();
        let mapping = NodeTypeMapping::load(&path).unwrap();
        let (repo, types) = mapping.iter().next().unwrap();
        assert_eq!(repo, "https://github.com/a/b");
        assert_eq!(types, ["NodeA".to_string()]);
    }
}
