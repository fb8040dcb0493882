use crate::error::{Result, RollgateError};

/// Produce the ordered set of environments to operate over.
///
/// A non-empty `explicit` list wins and is deduplicated with the first
/// occurrence keeping its position. Otherwise the single `fallback` namespace
/// is used; an empty fallback in that case is a configuration error.
pub fn enumerate(explicit: &[String], fallback: &str) -> Result<Vec<String>> {
    if explicit.is_empty() {
        if fallback.trim().is_empty() {
            return Err(RollgateError::EmptyEnvironments);
        }
        return Ok(vec![fallback.to_string()]);
    }

    let mut out: Vec<String> = Vec::with_capacity(explicit.len());
    for name in explicit {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    Ok(out)
}

/// Restrict an enumerated set to the environments the caller asked for,
/// keeping enumeration order. Unknown names are a configuration error.
pub fn select(enumerated: &[String], wanted: &[String]) -> Result<Vec<String>> {
    if wanted.is_empty() {
        return Ok(enumerated.to_vec());
    }
    for name in wanted {
        if !enumerated.contains(name) {
            return Err(RollgateError::Config(format!(
                "environment '{name}' is not configured (known: {})",
                enumerated.join(", ")
            )));
        }
    }
    Ok(enumerated
        .iter()
        .filter(|e| wanted.contains(e))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_list_falls_back() {
        assert_eq!(enumerate(&[], "default").unwrap(), names(&["default"]));
    }

    #[test]
    fn dedup_preserves_first_occurrence() {
        let got = enumerate(&names(&["staging", "production", "staging"]), "x").unwrap();
        assert_eq!(got, names(&["staging", "production"]));
    }

    #[test]
    fn explicit_list_ignores_fallback() {
        let got = enumerate(&names(&["production"]), "default").unwrap();
        assert_eq!(got, names(&["production"]));
    }

    #[test]
    fn empty_fallback_without_list_is_fatal() {
        assert!(matches!(
            enumerate(&[], "  "),
            Err(RollgateError::EmptyEnvironments)
        ));
    }

    #[test]
    fn select_keeps_enumeration_order() {
        let all = names(&["staging", "production"]);
        let got = select(&all, &names(&["production", "staging"])).unwrap();
        assert_eq!(got, all);
        assert_eq!(select(&all, &[]).unwrap(), all);
    }

    #[test]
    fn select_rejects_unknown() {
        let all = names(&["staging"]);
        let err = select(&all, &names(&["qa"])).unwrap_err();
        assert!(err.to_string().contains("'qa'"));
    }
}
