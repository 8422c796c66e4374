//! Slug derivation for catalog entities.
//!
//! Slugs are URL path segments and cache-key discriminants, so they are
//! always produced by `slug::slugify` (ASCII, lowercase, hyphen separated).
//! Callers supply a uniqueness predicate; the helpers stay pure.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("`{input}` is not a canonical slug")]
    NotCanonical { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a slug from human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Accept a caller-supplied slug only if it is already canonical.
pub fn validate_slug(input: &str) -> Result<&str, SlugError> {
    if input.is_empty() {
        return Err(SlugError::EmptyInput);
    }
    if slugify(input) != input {
        return Err(SlugError::NotCanonical {
            input: input.to_string(),
        });
    }
    Ok(input)
}

/// Derive a slug from `input` that the async predicate reports as unused,
/// suffixing `-2`, `-3`, … on collision.
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(base.clone())
        .await
        .map_err(SlugAsyncError::Predicate)?
    {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(candidate.clone())
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[test]
    fn derive_slug_normalizes_text() {
        assert_eq!(derive_slug("  Solar Panels 400W ").expect("slug"), "solar-panels-400w");
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn validate_slug_rejects_non_canonical() {
        assert_eq!(validate_slug("solar-panels"), Ok("solar-panels"));
        assert!(matches!(
            validate_slug("Solar Panels"),
            Err(SlugError::NotCanonical { .. })
        ));
        assert!(matches!(
            validate_slug("a:b"),
            Err(SlugError::NotCanonical { .. })
        ));
    }

    #[tokio::test]
    async fn unique_slug_appends_counter() {
        let taken = ["inverter".to_string(), "inverter-2".to_string()];
        let slug = generate_unique_slug_async("Inverter", |candidate| {
            let free = !taken.contains(&candidate);
            async move { Ok::<_, Infallible>(free) }
        })
        .await
        .expect("unique slug");
        assert_eq!(slug, "inverter-3");
    }
}
