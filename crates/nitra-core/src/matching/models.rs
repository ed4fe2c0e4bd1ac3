//! Resolve model files referenced by a workflow to catalog downloads.

use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use super::similarity::{calculate_similarity, normalize, strip_extension};
use super::MatchResult;
use crate::catalog::CatalogModel;
use crate::config::MatcherConfig;
use crate::workflow::DetectedModel;

/// How a model match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MatchType {
    /// Same file name, ignoring case (and possibly the extension).
    Exact,
    /// Best fuzzy candidate at or above the threshold.
    Similar,
}

/// A catalog model satisfying a detected file reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMatch {
    #[serde(flatten)]
    pub model: CatalogModel,
    pub match_type: MatchType,
    /// `1.0` for exact matches.
    pub score: f64,
    /// File name as detected in the workflow.
    pub detected_name: String,
    /// Full string found in the workflow, kept for search/replace.
    pub original_path: String,
    pub is_installed: bool,
}

/// A detected file with no catalog model close enough.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingModel {
    pub name: String,
    pub original_path: String,
    pub best_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_match_name: Option<String>,
    pub is_installed: bool,
}

pub type ModelMatches = MatchResult<ModelMatch, MissingModel>;

/// [`match_models_with_threshold`] at [`MatcherConfig::DEFAULT_SIMILARITY_THRESHOLD`].
pub fn match_models<I>(
    detected_files: I,
    catalog: &[CatalogModel],
    installed_model_names: &HashSet<String>,
) -> ModelMatches
where
    I: IntoIterator,
    I::Item: Into<DetectedModel>,
{
    match_models_with_threshold(
        detected_files,
        catalog,
        installed_model_names,
        MatcherConfig::DEFAULT_SIMILARITY_THRESHOLD,
    )
}

/// Match detected model files against the model catalog.
///
/// Each detected file yields exactly one entry, in input order, either in
/// `matches` or in `missing`. Lookup stops at the first hit of:
///
/// 1. a catalog `modelName` equal to the file name, ignoring case;
/// 2. the same comparison with model extensions stripped from both;
/// 3. the best fuzzy candidate over the whole catalog, accepted when its
///    score is `>= threshold`.
///
/// The fuzzy score of a candidate is the highest of the bigram similarity
/// of the full names, the bigram similarity of the extension-less names,
/// and a containment bonus (`shorter / longer * 0.9`) when one
/// extension-less name contains the other. Ties keep the earlier entry.
/// The reported score is capped at [`MatcherConfig::MAX_SIMILAR_SCORE`] so
/// a fuzzy match never reads as exact.
pub fn match_models_with_threshold<I>(
    detected_files: I,
    catalog: &[CatalogModel],
    installed_model_names: &HashSet<String>,
    threshold: f64,
) -> ModelMatches
where
    I: IntoIterator,
    I::Item: Into<DetectedModel>,
{
    let installed = lowercase_names(installed_model_names);
    let mut result = ModelMatches::default();

    for detected in detected_files {
        let detected: DetectedModel = detected.into();
        let filename_lower = normalize(&detected.filename);
        let filename_no_ext = strip_extension(&filename_lower);

        let exact = catalog
            .iter()
            .find(|model| lower_name(model).is_some_and(|name| name == filename_lower))
            .or_else(|| {
                catalog.iter().find(|model| {
                    lower_name(model).is_some_and(|name| strip_extension(&name) == filename_no_ext)
                })
            });

        if let Some(model) = exact {
            let is_installed = installed_either(&filename_no_ext, model, &installed);
            result.matches.push(ModelMatch {
                model: model.clone(),
                match_type: MatchType::Exact,
                score: 1.0,
                detected_name: detected.filename,
                original_path: detected.original_path,
                is_installed,
            });
            continue;
        }

        let mut best: Option<&CatalogModel> = None;
        let mut best_score: f64 = 0.0;
        for model in catalog {
            let Some(name_lower) = lower_name(model) else {
                continue;
            };
            let name_no_ext = strip_extension(&name_lower);

            let mut score = calculate_similarity(&filename_lower, &name_lower)
                .max(calculate_similarity(&filename_no_ext, &name_no_ext));
            if let Some(bonus) = containment_bonus(&filename_no_ext, &name_no_ext) {
                if bonus > score {
                    score = bonus;
                }
            }

            if score > best_score {
                best_score = score;
                best = Some(model);
            }
        }

        let best_score = best_score.min(MatcherConfig::MAX_SIMILAR_SCORE);
        match best {
            Some(model) if best_score >= threshold => {
                let is_installed = installed_either(&filename_no_ext, model, &installed);
                result.matches.push(ModelMatch {
                    model: model.clone(),
                    match_type: MatchType::Similar,
                    score: best_score,
                    detected_name: detected.filename,
                    original_path: detected.original_path,
                    is_installed,
                });
            }
            _ => {
                result.missing.push(MissingModel {
                    is_installed: installed.contains(&filename_no_ext),
                    name: detected.filename,
                    original_path: detected.original_path,
                    best_score,
                    best_match_name: best.and_then(|model| model.model_name.clone()),
                });
            }
        }
    }

    debug!(
        "Model matching: {} matched ({} exact), {} missing",
        result.matches.len(),
        result
            .matches
            .iter()
            .filter(|m| m.match_type == MatchType::Exact)
            .count(),
        result.missing.len()
    );
    result
}

/// Whether a detected file, or the catalog model it matched, is on disk.
///
/// Both names are compared lowercased and without model extension against
/// the (lowercased) installed names.
pub fn is_model_installed(
    detected_filename: &str,
    model_name: Option<&str>,
    installed_model_names: &HashSet<String>,
) -> bool {
    let installed = lowercase_names(installed_model_names);
    let detected = strip_extension(&detected_filename.to_lowercase());
    installed.contains(&detected)
        || model_name.is_some_and(|name| installed.contains(&strip_extension(&name.to_lowercase())))
}

fn installed_either(
    filename_no_ext: &str,
    model: &CatalogModel,
    installed: &HashSet<String>,
) -> bool {
    installed.contains(filename_no_ext)
        || lower_name(model).is_some_and(|name| installed.contains(&strip_extension(&name)))
}

fn lowercase_names(names: &HashSet<String>) -> HashSet<String> {
    names
        .iter()
        .map(|name| strip_extension(&normalize(name)))
        .collect()
}

fn lower_name(model: &CatalogModel) -> Option<String> {
    model.model_name.as_deref().map(normalize)
}

/// `shorter / longer * 0.9` when one name contains the other.
fn containment_bonus(a: &str, b: &str) -> Option<f64> {
    if !(a.contains(b) || b.contains(a)) {
        return None;
    }
    let (a_len, b_len) = (a.chars().count(), b.chars().count());
    let longer = a_len.max(b_len);
    if longer == 0 {
        return None;
    }
    Some(a_len.min(b_len) as f64 / longer as f64 * MatcherConfig::CONTAINMENT_BONUS_FACTOR)
}
