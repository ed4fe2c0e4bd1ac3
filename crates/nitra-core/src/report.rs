//! One-shot "what does this workflow still need" report.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::catalog::{CatalogModel, CatalogNodePackage, NodeTypeMapping};
use crate::error::Result;
use crate::installed::InstalledState;
use crate::matching::{match_custom_nodes, match_models, CustomNodeMatches, ModelMatches};
use crate::workflow::{extract_dependencies, DetectedDependencies};

/// Detected dependencies of a workflow with both match results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub dependencies: DetectedDependencies,
    pub custom_nodes: CustomNodeMatches,
    pub models: ModelMatches,
}

impl WorkflowReport {
    /// Matched packages and models that are not installed yet.
    pub fn pending_installs(&self) -> usize {
        let nodes = self.custom_nodes.matches.iter().filter(|m| !m.is_installed).count();
        let models = self.models.matches.iter().filter(|m| !m.is_installed).count();
        nodes + models
    }

    /// Nothing to install and nothing unresolved.
    pub fn is_satisfied(&self) -> bool {
        self.pending_installs() == 0
            && self.custom_nodes.missing.is_empty()
            && self.models.missing.is_empty()
    }
}

/// Extract a workflow's dependencies and match them against both catalogs.
pub fn analyze_workflow(
    workflow: &Value,
    node_catalog: &[CatalogNodePackage],
    model_catalog: &[CatalogModel],
    node_type_mapping: &NodeTypeMapping,
    installed: &InstalledState,
) -> Result<WorkflowReport> {
    let dependencies = extract_dependencies(workflow)?;

    let custom_nodes = match_custom_nodes(
        &dependencies.custom_node_types,
        &dependencies.registry_ids,
        &dependencies.aux_ids,
        node_catalog,
        &installed.node_types,
        node_type_mapping,
        &installed.folders,
    );
    let models = match_models(&dependencies.detected_models, model_catalog, &installed.model_names);

    let report = WorkflowReport {
        dependencies,
        custom_nodes,
        models,
    };
    info!(
        "Workflow analysis: {} packages, {} models matched; {} pending installs; {} node types and {} models unresolved",
        report.custom_nodes.matches.len(),
        report.models.matches.len(),
        report.pending_installs(),
        report.custom_nodes.missing.len(),
        report.models.missing.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analyze_workflow_end_to_end() {
        let workflow = json!({
            "nodes": [
                {"type": "KSamplerAdvanced", "widgets_values": ["loras/myLora.safetensors"]},
                {"type": "Unknowable"}
            ]
        });
        let repo = "https://github.com/x/advanced";
        let nodes = vec![CatalogNodePackage::new("pack1", "Advanced Nodes", repo)];
        let models = vec![CatalogModel::named("myLora.safetensors")];
        let mapping: NodeTypeMapping = [(repo, ["KSamplerAdvanced"])].into_iter().collect();
        let installed = InstalledState::new().with_model_names(["mylora"]);

        let report = analyze_workflow(&workflow, &nodes, &models, &mapping, &installed).unwrap();
        assert_eq!(report.custom_nodes.matches.len(), 1);
        assert_eq!(report.custom_nodes.missing.len(), 1);
        assert!(report.models.matches[0].is_installed);
        assert_eq!(report.pending_installs(), 1);
        assert!(!report.is_satisfied());
    }

    #[test]
    fn test_analyze_empty_workflow_is_satisfied() {
        let report = analyze_workflow(
            &json!({"nodes": []}),
            &[],
            &[],
            &NodeTypeMapping::new(),
            &InstalledState::new(),
        )
        .unwrap();
        assert!(report.is_satisfied());
        assert!(report.dependencies.is_empty());
    }

    #[test]
    fn test_analyze_rejects_bad_workflow() {
        let result = analyze_workflow(
            &json!("nope"),
            &[],
            &[],
            &NodeTypeMapping::new(),
            &InstalledState::new(),
        );
        assert!(result.is_err());
    }
}
