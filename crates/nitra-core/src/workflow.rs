//! Dependency extraction from serialized ComfyUI workflows.
//!
//! Handles the editor (UI) format, including subgraph definitions and
//! group-node macros, and the API prompt format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::error::{NitraError, Result};
use crate::matching::has_model_extension;

/// Registry id ComfyUI stamps on its built-in nodes.
const CORE_REGISTRY_ID: &str = "comfy-core";

/// A model file referenced by a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedModel {
    /// Basename of the reference, e.g. `myLora.safetensors`.
    pub filename: String,
    /// The full string found in the workflow, e.g. `loras/myLora.safetensors`.
    pub original_path: String,
}

impl DetectedModel {
    /// A reference that is just a file name.
    pub fn new(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            original_path: filename.clone(),
            filename,
        }
    }

    /// A reference as found in the workflow; the file name is its last
    /// `/` or `\` separated component.
    pub fn from_path(path: &str) -> Self {
        let path = path.trim();
        let filename = path.rsplit(['/', '\\']).next().unwrap_or(path);
        Self {
            filename: filename.to_string(),
            original_path: path.to_string(),
        }
    }
}

impl From<&str> for DetectedModel {
    fn from(path: &str) -> Self {
        Self::from_path(path)
    }
}

impl From<String> for DetectedModel {
    fn from(path: String) -> Self {
        Self::from_path(&path)
    }
}

impl From<&DetectedModel> for DetectedModel {
    fn from(model: &DetectedModel) -> Self {
        model.clone()
    }
}

/// Everything a workflow depends on, as raw detected strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedDependencies {
    pub custom_node_types: BTreeSet<String>,
    pub registry_ids: BTreeSet<String>,
    pub aux_ids: BTreeSet<String>,
    /// In order of first appearance, unique by file name.
    pub detected_models: Vec<DetectedModel>,
}

impl DetectedDependencies {
    /// Record a model reference, keeping the longest path per file name.
    pub fn add_model(&mut self, path: &str) {
        let model = DetectedModel::from_path(path);
        if model.filename.is_empty() {
            return;
        }

        match self
            .detected_models
            .iter_mut()
            .find(|existing| existing.filename == model.filename)
        {
            Some(existing) => {
                if model.original_path.len() > existing.original_path.len() {
                    existing.original_path = model.original_path;
                }
            }
            None => self.detected_models.push(model),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.custom_node_types.is_empty()
            && self.registry_ids.is_empty()
            && self.aux_ids.is_empty()
            && self.detected_models.is_empty()
    }
}

/// Parse a workflow JSON string and extract its dependencies.
pub fn extract_dependencies_from_str(json: &str) -> Result<DetectedDependencies> {
    let workflow: Value = serde_json::from_str(json)?;
    extract_dependencies(&workflow)
}

/// Extract dependencies from a workflow in UI or API format.
pub fn extract_dependencies(workflow: &Value) -> Result<DetectedDependencies> {
    let root = workflow
        .as_object()
        .ok_or_else(|| NitraError::InvalidWorkflow {
            message: "workflow must be a JSON object".to_string(),
        })?;

    let mut extractor = Extractor::default();
    if root.get("nodes").is_some_and(Value::is_array) {
        extractor.collect_container_types(root);
        extractor.visit_graph(root);
        if let Some(group_nodes) = root
            .get("extra")
            .and_then(|extra| extra.get("groupNodes"))
            .and_then(Value::as_object)
        {
            for group in group_nodes.values().filter_map(Value::as_object) {
                extractor.visit_graph(group);
            }
        }
    } else {
        extractor.visit_api_prompt(root);
    }

    let deps = extractor.deps;
    debug!(
        "Extracted {} node types, {} registry ids, {} aux ids, {} models",
        deps.custom_node_types.len(),
        deps.registry_ids.len(),
        deps.aux_ids.len(),
        deps.detected_models.len()
    );
    Ok(deps)
}

#[derive(Default)]
struct Extractor {
    deps: DetectedDependencies,
    /// Node types that stand for a subgraph or group node, not a package.
    container_types: HashSet<String>,
}

impl Extractor {
    fn collect_container_types(&mut self, root: &Map<String, Value>) {
        let mut graphs = vec![root];
        while let Some(graph) = graphs.pop() {
            for subgraph in subgraphs(graph) {
                if let Some(id) = subgraph.get("id").and_then(Value::as_str) {
                    self.container_types.insert(id.to_string());
                }
                graphs.push(subgraph);
            }
        }

        if let Some(group_nodes) = root
            .get("extra")
            .and_then(|extra| extra.get("groupNodes"))
            .and_then(Value::as_object)
        {
            for name in group_nodes.keys() {
                self.container_types.insert(format!("workflow>{}", name));
                self.container_types.insert(format!("workflow/{}", name));
            }
        }
    }

    /// Visit a graph's nodes and, recursively, its subgraph definitions.
    fn visit_graph(&mut self, graph: &Map<String, Value>) {
        if let Some(nodes) = graph.get("nodes").and_then(Value::as_array) {
            for node in nodes.iter().filter_map(Value::as_object) {
                self.visit_ui_node(node);
            }
        }
        for subgraph in subgraphs(graph) {
            self.visit_graph(subgraph);
        }
    }

    fn visit_ui_node(&mut self, node: &Map<String, Value>) {
        if let Some(node_type) = non_empty_str(node.get("type")) {
            if !self.container_types.contains(node_type) {
                self.deps.custom_node_types.insert(node_type.to_string());
            }
        }

        if let Some(properties) = node.get("properties").and_then(Value::as_object) {
            if let Some(cnr_id) = non_empty_str(properties.get("cnr_id")) {
                if cnr_id != CORE_REGISTRY_ID {
                    self.deps.registry_ids.insert(cnr_id.to_string());
                }
            }
            if let Some(aux_id) = non_empty_str(properties.get("aux_id")) {
                self.deps.aux_ids.insert(aux_id.to_string());
            }
        }

        if let Some(widgets) = node.get("widgets_values") {
            self.scan_models(widgets);
        }
    }

    fn visit_api_prompt(&mut self, prompt: &Map<String, Value>) {
        for node in prompt.values().filter_map(Value::as_object) {
            let Some(class_type) = non_empty_str(node.get("class_type")) else {
                continue;
            };
            self.deps.custom_node_types.insert(class_type.to_string());
            if let Some(inputs) = node.get("inputs") {
                self.scan_models(inputs);
            }
        }
    }

    fn scan_models(&mut self, value: &Value) {
        match value {
            Value::String(s) => {
                let s = s.trim();
                if has_model_extension(s) {
                    self.deps.add_model(s);
                }
            }
            Value::Array(items) => items.iter().for_each(|item| self.scan_models(item)),
            Value::Object(map) => map.values().for_each(|item| self.scan_models(item)),
            _ => {}
        }
    }
}

fn subgraphs(graph: &Map<String, Value>) -> impl Iterator<Item = &Map<String, Value>> {
    graph
        .get("definitions")
        .and_then(|defs| defs.get("subgraphs"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detected_model_from_path() {
        let model = DetectedModel::from_path("loras\\style\\detail.safetensors");
        assert_eq!(model.filename, "detail.safetensors");
        assert_eq!(model.original_path, "loras\\style\\detail.safetensors");

        let model = DetectedModel::new("x.ckpt");
        assert_eq!(model.original_path, "x.ckpt");
    }

    #[test]
    fn test_add_model_keeps_longest_path() {
        let mut deps = DetectedDependencies::default();
        deps.add_model("a.safetensors");
        deps.add_model("b.ckpt");
        deps.add_model("sdxl/a.safetensors");
        deps.add_model("a.safetensors");
        assert_eq!(deps.detected_models.len(), 2);
        assert_eq!(deps.detected_models[0].original_path, "sdxl/a.safetensors");
        assert_eq!(deps.detected_models[1].filename, "b.ckpt");
    }

    #[test]
    fn test_extract_ui_workflow() {
        let workflow = json!({
            "nodes": [
                {
                    "type": "CheckpointLoaderSimple",
                    "properties": {"cnr_id": "comfy-core"},
                    "widgets_values": ["sd_xl_base_1.0.safetensors"]
                },
                {
                    "type": "FaceDetailer",
                    "properties": {"cnr_id": "comfyui-impact-pack", "aux_id": "ltdrdata/ComfyUI-Impact-Pack"},
                    "widgets_values": [512, true, "bbox/face_yolov8m.pt", {"nested": ["upscale/4x.pth"]}]
                },
                {"type": "", "widgets_values": "not-a-model.txt"},
                "garbage"
            ]
        });
        let deps = extract_dependencies(&workflow).unwrap();

        assert_eq!(
            deps.custom_node_types,
            ["CheckpointLoaderSimple", "FaceDetailer"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<String>>()
        );
        assert_eq!(deps.registry_ids.len(), 1);
        assert!(deps.registry_ids.contains("comfyui-impact-pack"));
        assert!(deps.aux_ids.contains("ltdrdata/ComfyUI-Impact-Pack"));

        let names: Vec<&str> = deps.detected_models.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(names, vec!["sd_xl_base_1.0.safetensors", "face_yolov8m.pt", "4x.pth"]);
        assert_eq!(deps.detected_models[1].original_path, "bbox/face_yolov8m.pt");
    }

    #[test]
    fn test_extract_subgraphs_and_group_nodes() {
        let workflow = json!({
            "nodes": [
                {"type": "0b7e-subgraph", "widgets_values": []},
                {"type": "workflow>Upscale", "widgets_values": []}
            ],
            "definitions": {
                "subgraphs": [{
                    "id": "0b7e-subgraph",
                    "nodes": [{"type": "InnerNode", "widgets_values": ["inner.gguf"]}],
                    "definitions": {
                        "subgraphs": [{
                            "id": "deep",
                            "nodes": [{"type": "DeepNode", "properties": {"aux_id": "a/deep"}}]
                        }]
                    }
                }]
            },
            "extra": {
                "groupNodes": {
                    "Upscale": {"nodes": [{"type": "UltimateSDUpscale", "widgets_values": ["4x-UltraSharp.pth"]}]}
                }
            }
        });
        let deps = extract_dependencies(&workflow).unwrap();

        assert!(deps.custom_node_types.contains("InnerNode"));
        assert!(deps.custom_node_types.contains("DeepNode"));
        assert!(deps.custom_node_types.contains("UltimateSDUpscale"));
        assert!(!deps.custom_node_types.contains("0b7e-subgraph"));
        assert!(!deps.custom_node_types.contains("workflow>Upscale"));
        assert!(deps.aux_ids.contains("a/deep"));
        assert_eq!(deps.detected_models.len(), 2);
    }

    #[test]
    fn test_extract_api_prompt() {
        let deps = extract_dependencies_from_str(
            r#"{
                "3": {"class_type": "KSampler", "inputs": {"seed": 1, "model": ["4", 0]}},
                "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "v1-5-pruned.ckpt"}}
            }"#,
        )
        .unwrap();
        assert_eq!(deps.custom_node_types.len(), 2);
        assert_eq!(deps.detected_models, vec![DetectedModel::new("v1-5-pruned.ckpt")]);
        assert!(deps.registry_ids.is_empty());
    }

    #[test]
    fn test_extract_rejects_non_object() {
        assert!(matches!(
            extract_dependencies(&json!([1, 2])),
            Err(NitraError::InvalidWorkflow { .. })
        ));
        assert!(extract_dependencies_from_str("{nope").is_err());
        assert!(extract_dependencies(&json!({})).unwrap().is_empty());
    }
}
