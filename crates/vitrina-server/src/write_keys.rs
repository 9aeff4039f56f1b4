//! Public write-key authentication
//!
//! Several keys may be valid at the same time so a rotation can overlap old
//! and new secrets. The matched key id travels with each accepted event as
//! provenance.

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct WriteKeyRegistry {
    /// `(key_id, secret)` pairs, legacy key first when configured.
    keys: Vec<(String, String)>,
    require_key: bool,
}

impl WriteKeyRegistry {
    pub fn from_config(entries: &[String], legacy_key: Option<&str>, require_key: bool) -> Self {
        let mut keys = Vec::new();
        if let Some(secret) = legacy_key {
            let secret = secret.trim();
            if !secret.is_empty() {
                keys.push(("legacy".to_string(), secret.to_string()));
            }
        }
        for (idx, raw) in entries.iter().enumerate() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (key_id, secret) = match raw.split_once(':') {
                Some((id, secret)) => (id.trim().to_string(), secret.trim().to_string()),
                None => (format!("key-{}", idx + 1), raw.to_string()),
            };
            if !key_id.is_empty() && !secret.is_empty() {
                keys.push((key_id, secret));
            }
        }
        Self { keys, require_key }
    }

    /// Resolves a presented key to its configured id.
    ///
    /// `Ok(None)` means auth is optional and nothing usable was presented
    /// (or no keys are configured at all). A presented key that matches no
    /// configured secret is always rejected, required or not.
    pub fn resolve(&self, presented: Option<&str>) -> Result<Option<String>, ApiError> {
        if self.keys.is_empty() {
            return if self.require_key {
                Err(ApiError::Unauthorized)
            } else {
                Ok(None)
            };
        }
        let Some(presented) = presented else {
            return if self.require_key {
                Err(ApiError::Unauthorized)
            } else {
                Ok(None)
            };
        };
        // full scan; first match reports its id
        for (key_id, secret) in &self.keys {
            if presented == secret {
                return Ok(Some(key_id.clone()));
            }
        }
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(entries: &[&str], legacy: Option<&str>, require: bool) -> WriteKeyRegistry {
        let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        WriteKeyRegistry::from_config(&entries, legacy, require)
    }

    #[test]
    fn rotation_keeps_both_keys_valid() {
        let registry = registry(&["front:old-secret", "front-v2:new-secret"], None, true);
        assert_eq!(
            registry.resolve(Some("old-secret")).unwrap(),
            Some("front".to_string())
        );
        assert_eq!(
            registry.resolve(Some("new-secret")).unwrap(),
            Some("front-v2".to_string())
        );
    }

    #[test]
    fn bare_secrets_get_position_based_ids() {
        let registry = registry(&["alpha-secret", "beta:beta-secret"], None, false);
        assert_eq!(
            registry.resolve(Some("alpha-secret")).unwrap(),
            Some("key-1".to_string())
        );
        assert_eq!(
            registry.resolve(Some("beta-secret")).unwrap(),
            Some("beta".to_string())
        );
    }

    #[test]
    fn legacy_key_resolves_under_its_own_id() {
        let registry = registry(&[], Some("legacy-secret"), true);
        assert_eq!(
            registry.resolve(Some("legacy-secret")).unwrap(),
            Some("legacy".to_string())
        );
    }

    #[test]
    fn wrong_key_is_rejected_even_when_optional() {
        let registry = registry(&["front:secret"], None, false);
        assert!(matches!(
            registry.resolve(Some("nope")),
            Err(ApiError::Unauthorized)
        ));
        assert_eq!(registry.resolve(None).unwrap(), None);
    }

    #[test]
    fn no_keys_configured() {
        let optional = registry(&[], None, false);
        assert_eq!(optional.resolve(Some("anything")).unwrap(), None);

        let required = registry(&[], None, true);
        assert!(matches!(
            required.resolve(Some("anything")),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(required.resolve(None), Err(ApiError::Unauthorized)));
    }
}
