//! Operation code interning.
//!
//! The engines work on dense integer ids with direct array indexing; codes
//! are only touched at the boundaries.

use rustc_hash::FxHashMap;

/// Interned operation id (u32 for compact storage and fast hashing).
pub type OpId = u32;

/// Bidirectional map between operation codes and dense ids.
#[derive(Debug, Clone, Default)]
pub struct CodeInterner {
    to_id: FxHashMap<String, OpId>,
    from_id: Vec<String>,
}

impl CodeInterner {
    /// Intern codes in ascending order, so comparing ids compares codes.
    ///
    /// Duplicates are collapsed.
    pub fn sorted<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sorted: Vec<String> = codes.into_iter().map(|c| c.as_ref().to_string()).collect();
        sorted.sort();
        sorted.dedup();

        let mut to_id = FxHashMap::with_capacity_and_hasher(sorted.len(), Default::default());
        for (idx, code) in sorted.iter().enumerate() {
            to_id.insert(code.clone(), idx as OpId);
        }
        Self {
            to_id,
            from_id: sorted,
        }
    }

    #[inline]
    pub fn get(&self, code: &str) -> Option<OpId> {
        self.to_id.get(code).copied()
    }

    /// Code for an id. Panics on an id this interner never issued.
    #[inline]
    pub fn code(&self, id: OpId) -> &str {
        &self.from_id[id as usize]
    }

    pub fn len(&self) -> usize {
        self.from_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from_id.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = OpId> {
        0..self.from_id.len() as OpId
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_code_order() {
        let interner = CodeInterner::sorted(["pour", "excavate", "frame", "excavate"]);

        assert_eq!(interner.len(), 3);
        assert_eq!(interner.get("excavate"), Some(0));
        assert_eq!(interner.get("frame"), Some(1));
        assert_eq!(interner.get("pour"), Some(2));
        assert_eq!(interner.code(1), "frame");
        assert_eq!(interner.get("roof"), None);
    }

    #[test]
    fn test_empty() {
        let interner = CodeInterner::sorted(Vec::<String>::new());
        assert!(interner.is_empty());
        assert_eq!(interner.ids().count(), 0);
    }
}
