use dashmap::DashMap;

use crate::Route;

/// Server-assigned bucket hashes, keyed by `METHOD:template`.
///
/// Routes the server has not reported a hash for yet share the synthetic
/// hash `Global(METHOD-template)`.
#[derive(Debug, Default)]
pub struct HashTable {
    hashes: DashMap<String, String>,
}

impl HashTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The hash currently associated with `route`
    #[must_use]
    pub fn get_or_default(&self, route: &Route) -> String {
        self.hashes
            .get(&route.hash_key())
            .map_or_else(|| route.synthetic_hash(), |hash| hash.value().clone())
    }

    /// Store the hash reported for `route`.
    /// Returns `true` if it differs from the previous one.
    pub fn update(&self, route: &Route, hash: &str) -> bool {
        if self.get_or_default(route) == hash {
            return false;
        }
        log::debug!("Bucket hash of {} is now {hash}", route.hash_key());
        self.hashes.insert(route.hash_key(), hash.to_string());
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[test]
    fn test_default_hash() {
        let table = HashTable::new();
        let route = Route::extract("/channels/111111111111111111/messages", Method::Post);
        assert_eq!(
            table.get_or_default(&route),
            "Global(POST-/channels/:id/messages)"
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_update_is_shared_by_major_parameters() {
        let table = HashTable::new();
        let a = Route::extract("/channels/111111111111111111/messages", Method::Post);
        let b = Route::extract("/channels/222222222222222222/messages", Method::Post);
        let get = Route::extract("/channels/222222222222222222/messages", Method::Get);

        assert!(table.update(&a, "80c17d2f203122d936070c88c8d10f33"));
        assert!(!table.update(&a, "80c17d2f203122d936070c88c8d10f33"));

        assert_eq!(table.get_or_default(&b), "80c17d2f203122d936070c88c8d10f33");
        assert_eq!(table.get_or_default(&get), "Global(GET-/channels/:id/messages)");
        assert_eq!(table.len(), 1);

        assert!(table.update(&b, "rotated"));
        assert_eq!(table.get_or_default(&a), "rotated");
    }
}
