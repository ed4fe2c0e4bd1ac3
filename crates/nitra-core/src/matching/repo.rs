//! Repository URL helpers: aux id derivation and loose URL comparison.

use crate::config::MatcherConfig;

/// Derive the aux id a workflow would carry for a package repo.
///
/// Forge URLs (GitHub) yield `owner/repo`; anything else yields the last
/// path segment. A trailing `.git` and trailing slashes are ignored. Case
/// is preserved; callers normalize before comparing.
///
/// # Examples
///
/// ```
/// use nitra_core::matching::derive_aux_id;
///
/// assert_eq!(derive_aux_id("https://github.com/Foo/Bar.git").as_deref(), Some("Foo/Bar"));
/// assert_eq!(derive_aux_id("https://example.com/x/y/z/").as_deref(), Some("z"));
/// assert_eq!(derive_aux_id(""), None);
/// ```
pub fn derive_aux_id(repo_url: &str) -> Option<String> {
    let trimmed = trim_repo_suffixes(repo_url.trim());
    if trimmed.is_empty() {
        return None;
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    let aux_id = if trimmed.contains(MatcherConfig::FORGE_HOST) && segments.len() >= 2 {
        segments[segments.len() - 2..].join("/")
    } else {
        segments[segments.len() - 1].to_string()
    };

    (!aux_id.is_empty()).then_some(aux_id)
}

/// Lowercased repo URL without scheme, trailing slashes or `.git`.
///
/// `git@github.com:owner/repo.git` and `https://github.com/owner/repo`
/// canonicalize to the same value.
pub fn canonical_repo_url(repo_url: &str) -> String {
    let lower = repo_url.trim().to_lowercase();
    let without_scheme = match lower.split_once("://") {
        Some((_, rest)) => rest.to_string(),
        None => match lower.strip_prefix("git@") {
            Some(rest) => rest.replacen(':', "/", 1),
            None => lower.clone(),
        },
    };
    trim_repo_suffixes(&without_scheme).to_string()
}

/// Whether two repo URLs name the same repository.
///
/// After canonicalization, one must equal the other or end with it on a
/// path boundary, so `x/advanced` matches `github.com/x/advanced` but not
/// `github.com/x/more-advanced`.
pub fn repo_urls_match(a: &str, b: &str) -> bool {
    let a = canonical_repo_url(a);
    let b = canonical_repo_url(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }

    let (longer, shorter) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };
    match longer.strip_suffix(shorter.as_str()) {
        Some(prefix) => prefix.is_empty() || prefix.ends_with('/'),
        None => false,
    }
}

/// Last path segment of the canonical repo URL (`github.com/x/Advanced` -> `advanced`).
pub fn repo_last_segment(repo_url: &str) -> Option<String> {
    let canonical = canonical_repo_url(repo_url);
    canonical
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn trim_repo_suffixes(url: &str) -> &str {
    let url = url.trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    url.trim_end_matches('/')
}
