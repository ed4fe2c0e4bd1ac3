//! Centralized configuration for Nitra Core.
//!
//! These are product-tuned constants of the dependency matcher and the
//! local scanners. Changing any of them changes which catalog entries a
//! workflow resolves to.

/// Tuning constants for the custom node and model matchers.
pub struct MatcherConfig;

impl MatcherConfig {
    /// Minimum fuzzy score (inclusive) for a model to count as a match.
    pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;
    /// Multiplier applied to the length ratio when one name contains the other.
    pub const CONTAINMENT_BONUS_FACTOR: f64 = 0.9;
    /// Upper bound on a reported fuzzy score; `1.0` is reserved for exact
    /// matches. Raw bigram scores can exceed it for repeated characters.
    pub const MAX_SIMILAR_SCORE: f64 = 1.0 - f64::EPSILON;
    /// Both strings must be strictly longer than this for a substring
    /// relationship to count in the folder-installed heuristic.
    pub const FOLDER_SUBSTRING_MIN_LEN: usize = 5;
    /// Extensions recognized as model files (lowercase, with leading dot).
    pub const MODEL_EXTENSIONS: &'static [&'static str] =
        &[".safetensors", ".ckpt", ".pt", ".bin", ".pth", ".gguf"];
    /// Hosts whose repo URLs yield `owner/repo` aux ids.
    pub const FORGE_HOST: &'static str = "github.com";
    /// Affix commonly carried by custom node package names and folders.
    pub const PACKAGE_AFFIX: &'static str = "comfyui";
}

/// Directory layout and filters used when scanning a ComfyUI install.
pub struct ScanConfig;

impl ScanConfig {
    pub const CUSTOM_NODES_DIR_NAME: &'static str = "custom_nodes";
    pub const MODELS_DIR_NAME: &'static str = "models";
    /// Shard and config basenames too generic to be useful for matching.
    pub const IGNORED_MODEL_NAMES: &'static [&'static str] = &[
        "diffusion_pytorch_model",
        "pytorch_model",
        "model",
        "model-00001-of-00002",
        "model-00002-of-00002",
    ];
}
