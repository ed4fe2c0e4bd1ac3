//! Dependency matching - decide which catalog entries a workflow needs.
//!
//! Both matchers are pure functions of their inputs. They build their
//! lookup maps and dedup sets fresh on every call and never fail: missing
//! optional fields simply don't match.
//!
//! # Architecture
//!
//! ```text
//! similarity (normalize, bigram similarity, extension stripping)
//!     │
//!     ├── repo (aux id derivation, repo URL comparison)
//!     │       │
//!     │       └── custom_nodes - registry id → aux id → node type passes
//!     │
//!     └── models - exact → extension-less exact → fuzzy
//! ```

mod custom_nodes;
mod models;
mod repo;
mod similarity;

pub use custom_nodes::{
    is_package_installed, match_custom_nodes, CustomNodeMatch, CustomNodeMatches, MatchSource,
    MissingCustomNode,
};
pub use models::{
    is_model_installed, match_models, match_models_with_threshold, MatchType, MissingModel,
    ModelMatch, ModelMatches,
};
pub use repo::{canonical_repo_url, derive_aux_id, repo_last_segment, repo_urls_match};
pub use similarity::{calculate_similarity, has_model_extension, normalize, strip_extension};

use serde::Serialize;

/// Output of a matcher: what resolved and what did not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult<M, X> {
    pub matches: Vec<M>,
    pub missing: Vec<X>,
}

impl<M, X> Default for MatchResult<M, X> {
    fn default() -> Self {
        Self {
            matches: Vec::new(),
            missing: Vec::new(),
        }
    }
}

impl<M, X> MatchResult<M, X> {
    /// Nothing matched and nothing is missing.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.missing.is_empty()
    }
}
