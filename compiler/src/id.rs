// id.rs — Node identity and synthetic name allocation
//
// Nodes live in a per-unit arena and are addressed by index. Identity is
// arena identity: two structurally identical nodes are distinct unless the
// builder hands out the same `NodeId` twice.

use std::collections::HashSet;
use std::fmt;

/// Index of a node inside a `UnitGraph` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Allocator for synthetic temporaries (`t1`, `t2`, ...).
///
/// Seeded with every name already declared in the unit so a generated
/// temporary never shadows a parameter, variable, or state register.
/// Allocation is deterministic: the same seed yields the same sequence.
#[derive(Debug, Default)]
pub struct NameAllocator {
    next: u32,
    taken: HashSet<String>,
}

impl NameAllocator {
    pub fn new<I, S>(taken: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            next: 0,
            taken: taken.into_iter().map(Into::into).collect(),
        }
    }

    pub fn alloc(&mut self) -> String {
        loop {
            self.next += 1;
            let name = format!("t{}", self.next);
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }

    /// A stem whose `stem + suffix` names are all free, reserving them.
    /// `preferred` is used when its derived names are free, otherwise a
    /// fresh `tN` stem is allocated.
    pub fn alloc_stem(&mut self, preferred: Option<&str>, suffixes: &[&str]) -> String {
        if let Some(stem) = preferred {
            if self.reserve_derived(stem, suffixes) {
                return stem.to_string();
            }
        }
        loop {
            let stem = self.alloc();
            if self.reserve_derived(&stem, suffixes) {
                return stem;
            }
        }
    }

    fn reserve_derived(&mut self, stem: &str, suffixes: &[&str]) -> bool {
        let derived: Vec<String> = suffixes.iter().map(|s| format!("{stem}{s}")).collect();
        if derived.iter().any(|name| self.taken.contains(name)) {
            return false;
        }
        self.taken.extend(derived);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_in_sequence() {
        let mut names = NameAllocator::default();
        assert_eq!(names.alloc(), "t1");
        assert_eq!(names.alloc(), "t2");
    }

    #[test]
    fn skips_declared_names() {
        let mut names = NameAllocator::new(["t1", "t3"]);
        assert_eq!(names.alloc(), "t2");
        assert_eq!(names.alloc(), "t4");
    }

    #[test]
    fn stem_keeps_preferred_name_when_derived_names_are_free() {
        let mut names = NameAllocator::new(["hz"]);
        assert_eq!(names.alloc_stem(Some("hz"), &["_arate", "_step"]), "hz");
        // The derived names are now taken.
        assert_eq!(names.alloc_stem(Some("hz"), &["_arate", "_step"]), "t1");
    }

    #[test]
    fn stem_falls_back_when_a_derived_name_is_declared() {
        let mut names = NameAllocator::new(["hz", "hz_step", "t1_arate"]);
        assert_eq!(names.alloc_stem(Some("hz"), &["_arate", "_step"]), "t2");
        assert_eq!(names.alloc(), "t3");
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(7).to_string(), "n7");
        assert_eq!(NodeId(7).index(), 7);
    }
}
