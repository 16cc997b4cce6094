/// Outcome of a lookup that may have substituted the fallback key, so
/// callers can both use the value and report the substitution uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub used_fallback: bool,
}

/// Tries `lookup` with the primary key, then at most once with the fallback
/// key. At-most-one-fallback: the fallback key is never itself re-resolved.
pub fn resolve_with_fallback<K, V, F>(lookup: F, primary: &K, fallback: &K) -> Option<Resolved<V>>
where
    F: Fn(&K) -> Option<V>,
{
    if let Some(value) = lookup(primary) {
        return Some(Resolved {
            value,
            used_fallback: false,
        });
    }
    lookup(fallback).map(|value| Resolved {
        value,
        used_fallback: true,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn primary_hit_skips_fallback() {
        let map = HashMap::from([("fr", 1), ("en", 2)]);
        let resolved = resolve_with_fallback(|k| map.get(*k).copied(), &"fr", &"en").unwrap();
        assert_eq!(resolved.value, 1);
        assert!(!resolved.used_fallback);
    }

    #[test]
    fn missing_primary_uses_fallback() {
        let map = HashMap::from([("en", 2)]);
        let resolved = resolve_with_fallback(|k| map.get(*k).copied(), &"fr", &"en").unwrap();
        assert_eq!(resolved.value, 2);
        assert!(resolved.used_fallback);
    }

    #[test]
    fn both_missing_is_none() {
        let map: HashMap<&str, i32> = HashMap::new();
        assert!(resolve_with_fallback(|k| map.get(*k).copied(), &"fr", &"en").is_none());
    }
}
