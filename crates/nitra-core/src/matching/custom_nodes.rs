//! Resolve a workflow's custom node references to catalog packages.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::repo::{derive_aux_id, repo_last_segment, repo_urls_match};
use super::similarity::normalize;
use super::MatchResult;
use crate::catalog::{CatalogNodePackage, NodeTypeMapping};
use crate::config::MatcherConfig;

/// Which detected identifier resolved a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// A `cnr_id` registry id on a workflow node.
    CnrId,
    /// An `aux_id` (repo-derived id) on a workflow node.
    AuxId,
    /// A bare node type.
    NodeType,
}

/// A catalog package required by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomNodeMatch {
    #[serde(flatten)]
    pub package: CatalogNodePackage,
    /// The detected string that led to this package.
    pub detected_name: String,
    pub is_installed: bool,
    pub match_source: MatchSource,
}

/// A node type that no catalog package or mapping accounts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingCustomNode {
    pub name: String,
}

pub type CustomNodeMatches = MatchResult<CustomNodeMatch, MissingCustomNode>;

/// Match detected custom node references against the package catalog.
///
/// Runs three passes in order: registry ids, aux ids, then node types.
/// Each package appears at most once in `matches`, keyed by
/// [`CatalogNodePackage::dedup_key`]; a later pass can promote an existing
/// match to installed but never demote it. Only node types can end up in
/// `missing`, and only when they are neither registered in the editor nor
/// known to the mapping.
///
/// When several repositories register the same node type, one of them is
/// chosen as the candidate. Which one is not part of the contract.
pub fn match_custom_nodes<T, R, A>(
    detected_node_types: T,
    detected_registry_ids: R,
    detected_aux_ids: A,
    catalog: &[CatalogNodePackage],
    installed_node_types: &HashSet<String>,
    node_type_mapping: &NodeTypeMapping,
    installed_folders: &HashSet<String>,
) -> CustomNodeMatches
where
    T: IntoIterator,
    T::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<str>,
    A: IntoIterator,
    A::Item: AsRef<str>,
{
    let mut matcher = Matcher::new(installed_folders);

    // Registry ids
    for registry_id in detected_registry_ids {
        let registry_id = registry_id.as_ref();
        let wanted = normalize(registry_id);
        if wanted.is_empty() {
            continue;
        }
        let found = catalog.iter().find(|pack| {
            normalized_eq(pack.id.as_deref(), &wanted)
                || normalized_eq(pack.name.as_deref(), &wanted)
        });
        if let Some(pack) = found {
            let installed = matcher.folder_installed(pack);
            matcher.add(pack, registry_id, installed, MatchSource::CnrId);
        }
    }

    // Aux ids
    let mut aux_index: HashMap<String, &CatalogNodePackage> = HashMap::new();
    for pack in catalog {
        if let Some(aux_id) = pack.repo_url.as_deref().and_then(derive_aux_id) {
            aux_index.entry(normalize(&aux_id)).or_insert(pack);
        }
    }
    for aux_id in detected_aux_ids {
        let aux_id = aux_id.as_ref();
        if let Some(pack) = aux_index.get(&normalize(aux_id)) {
            let installed = matcher.folder_installed(pack);
            matcher.add(pack, aux_id, installed, MatchSource::AuxId);
        }
    }

    // Node types
    let type_index = node_type_mapping.node_type_index();
    for node_type in detected_node_types {
        let node_type = node_type.as_ref();
        let wanted = normalize(node_type);
        if wanted.is_empty() {
            continue;
        }

        let registered = installed_node_types.contains(node_type);
        let candidates = type_index.get(&wanted);
        let candidate_repo = candidates.and_then(|repos| repos.iter().next());

        let found = catalog.iter().find(|pack| {
            let repo = pack.repo_url.as_deref();
            let by_repo = matches!(
                (candidate_repo, repo),
                (Some(c), Some(r)) if repo_urls_match(c, r)
            );
            by_repo
                || normalized_eq(pack.name.as_deref(), &wanted)
                || repo.and_then(repo_last_segment).is_some_and(|seg| seg == wanted)
        });

        match found {
            Some(pack) => {
                let installed = registered || matcher.folder_installed(pack);
                matcher.add(pack, node_type, installed, MatchSource::NodeType);
            }
            None if !registered && candidates.is_none() => {
                matcher.result.missing.push(MissingCustomNode {
                    name: node_type.to_string(),
                });
            }
            None => {}
        }
    }

    debug!(
        "Custom node matching: {} matched ({} installed), {} missing",
        matcher.result.matches.len(),
        matcher.result.matches.iter().filter(|m| m.is_installed).count(),
        matcher.result.missing.len()
    );
    matcher.result
}

/// Per-call accumulator; nothing survives between calls.
struct Matcher<'a> {
    installed_folders: &'a HashSet<String>,
    seen: HashMap<String, usize>,
    result: CustomNodeMatches,
}

impl<'a> Matcher<'a> {
    fn new(installed_folders: &'a HashSet<String>) -> Self {
        Self {
            installed_folders,
            seen: HashMap::new(),
            result: CustomNodeMatches::default(),
        }
    }

    fn folder_installed(&self, pack: &CatalogNodePackage) -> bool {
        is_package_installed(
            pack.name.as_deref().or(pack.id.as_deref()),
            pack.repo_url.as_deref(),
            self.installed_folders,
        )
    }

    /// Record a match, or promote an already recorded one to installed.
    fn add(
        &mut self,
        pack: &CatalogNodePackage,
        detected: &str,
        installed: bool,
        source: MatchSource,
    ) {
        let key = pack.dedup_key();
        if let Some(&index) = self.seen.get(&key) {
            if installed {
                self.result.matches[index].is_installed = true;
            }
            return;
        }

        self.seen.insert(key, self.result.matches.len());
        self.result.matches.push(CustomNodeMatch {
            package: pack.clone(),
            detected_name: detected.to_string(),
            is_installed: installed,
            match_source: source,
        });
    }
}

/// Approximate check for a package folder under `custom_nodes`.
///
/// True when the lowercased package name (as is, or with a leading or
/// trailing `comfyui` affix removed) or the repo-derived aux id equals an
/// installed folder name, or when one contains the other and both are
/// longer than [`MatcherConfig::FOLDER_SUBSTRING_MIN_LEN`]. Deliberately
/// loose: folder names are whatever the user cloned into.
pub fn is_package_installed(
    name: Option<&str>,
    repo_url: Option<&str>,
    installed_folders: &HashSet<String>,
) -> bool {
    if installed_folders.is_empty() {
        return false;
    }

    if let Some(name) = name {
        let lower = name.trim().to_lowercase();
        if name_variants(&lower)
            .iter()
            .any(|variant| folder_matches(variant, installed_folders))
        {
            return true;
        }
    }

    repo_url
        .and_then(derive_aux_id)
        .is_some_and(|aux_id| folder_matches(&aux_id.to_lowercase(), installed_folders))
}

fn folder_matches(candidate: &str, installed_folders: &HashSet<String>) -> bool {
    if candidate.is_empty() {
        return false;
    }
    if installed_folders.contains(candidate) {
        return true;
    }

    let min = MatcherConfig::FOLDER_SUBSTRING_MIN_LEN;
    if candidate.chars().count() <= min {
        return false;
    }
    installed_folders.iter().any(|folder| {
        folder.chars().count() > min
            && (folder.contains(candidate) || candidate.contains(folder.as_str()))
    })
}

/// The name itself plus the name without a `comfyui` prefix/suffix.
fn name_variants(lower: &str) -> Vec<String> {
    const SEPARATORS: &[char] = &['-', '_', ' '];
    let affix = MatcherConfig::PACKAGE_AFFIX;

    let mut stripped = lower;
    if let Some(rest) = stripped.strip_prefix(affix) {
        stripped = rest.trim_start_matches(SEPARATORS);
    }
    if let Some(rest) = stripped.strip_suffix(affix) {
        stripped = rest.trim_end_matches(SEPARATORS);
    }

    let mut variants = vec![lower.to_string()];
    if stripped != lower && !stripped.is_empty() {
        variants.push(stripped.to_string());
    }
    variants
}

fn normalized_eq(field: Option<&str>, wanted: &str) -> bool {
    field.is_some_and(|value| normalize(value) == wanted)
}
