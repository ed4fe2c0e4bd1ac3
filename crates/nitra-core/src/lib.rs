//! Nitra Core - workflow dependency detection and catalog matching.
//!
//! Given a ComfyUI workflow, this crate works out which custom node packages
//! and model files it needs, which of those the Nitra catalogs can provide,
//! and which are already installed locally. It performs no network I/O:
//! callers fetch the catalogs and hand them in.
//!
//! # Example
//!
//! ```rust,ignore
//! use nitra_core::{analyze_workflow, InstalledState, NodeTypeMapping};
//!
//! let workflow: serde_json::Value = serde_json::from_str(&workflow_json)?;
//! let nodes = nitra_core::catalog::node_catalog_from_str(&nodes_json)?;
//! let models = nitra_core::catalog::model_catalog_from_str(&models_json)?;
//! let mapping = NodeTypeMapping::load("custom_nodes/ComfyUI-Manager/extension-node-map.json")?;
//! let installed = InstalledState::scan("/opt/ComfyUI")?.with_node_types(registered_types);
//!
//! let report = analyze_workflow(&workflow, &nodes, &models, &mapping, &installed)?;
//! println!("{} items to install", report.pending_installs());
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod installed;
pub mod matching;
pub mod report;
pub mod workflow;

// Re-export commonly used types
pub use catalog::{CatalogModel, CatalogNodePackage, NodeTypeMapping};
pub use config::{MatcherConfig, ScanConfig};
pub use error::{NitraError, Result};
pub use installed::{InstalledModels, InstalledState};
pub use matching::{
    match_custom_nodes, match_models, match_models_with_threshold, CustomNodeMatch,
    CustomNodeMatches, MatchResult, MatchSource, MatchType, MissingCustomNode, MissingModel,
    ModelMatch, ModelMatches,
};
pub use report::{analyze_workflow, WorkflowReport};
pub use workflow::{extract_dependencies, DetectedDependencies, DetectedModel};
