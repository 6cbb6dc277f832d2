use crate::{
    BlocklistError, NameSet,
    name::{TERMINAL_MARKER, WILDCARD, labels, validate_name},
};

/// Node in the trie, keyed by a single label.
#[derive(Debug, Clone, Default)]
struct Node {
    label: Box<str>,
    /// A pattern ends at this node.
    blocked: bool,
    /// Sorted by label.
    children: Vec<Node>,
}

impl Node {
    fn new(label: &str) -> Self {
        Self {
            label: label.into(),
            blocked: false,
            children: Vec::new(),
        }
    }

    fn child(&self, label: &str) -> Option<&Node> {
        self.children
            .binary_search_by(|n| n.label.as_ref().cmp(label))
            .ok()
            .map(|i| &self.children[i])
    }

    fn child_mut(&mut self, label: &str) -> &mut Node {
        match self.children.binary_search_by(|n| n.label.as_ref().cmp(label)) {
            Ok(i) => &mut self.children[i],
            Err(i) => {
                self.children.insert(i, Node::new(label));
                &mut self.children[i]
            }
        }
    }
}

/// Trie of reversed domain labels where `*` matches any single label.
///
/// Inserting `example.com.`, `sub1.example.com.`, `*.example.com.`,
/// `sub2.*.example.com.` and `sub3.sub1.example.com.` yields:
///
/// ```text
/// com -> example (blocked) -+-> sub1 (blocked) -> sub3 (blocked)
///                           |
///                           `-> * (blocked) -> sub2 (blocked)
/// ```
///
/// `*.example.com` matches `www.example.com` but neither `example.com` nor
/// `a.b.example.com`.
#[derive(Debug, Clone, Default)]
pub struct GlobTrie {
    root: Node,
    len: usize,
}

impl GlobTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pattern. Inserting the same pattern twice is a no-op.
    pub fn insert(&mut self, pattern: &str) -> Result<(), BlocklistError> {
        let pattern = pattern.to_ascii_lowercase();

        validate_name(&pattern)?;

        if pattern.contains(TERMINAL_MARKER) {
            return Err(BlocklistError::invalid(&pattern, "cannot contain `!`"));
        }

        let labels: Vec<&str> = labels(&pattern).collect();
        if labels.len() < 2 {
            return Err(BlocklistError::invalid(&pattern, "must have at least two levels"));
        }
        if labels.iter().any(|l| l.contains('*') && *l != WILDCARD) {
            return Err(BlocklistError::invalid(&pattern, "`*` must be a whole label"));
        }

        let mut node = &mut self.root;
        for label in labels.into_iter().rev() {
            node = node.child_mut(label);
        }

        if !node.blocked {
            node.blocked = true;
            self.len += 1;
        }

        Ok(())
    }

    /// Whether a concrete name matches any stored pattern.
    ///
    /// Names that are not legal, contain `*` or `!`, or have fewer than two
    /// labels never match.
    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();

        if validate_name(&name).is_err() || name.contains([TERMINAL_MARKER, '*']) {
            return false;
        }

        let labels: Vec<&str> = labels(&name).collect();
        if labels.len() < 2 {
            return false;
        }

        let mut curr = &self.root;
        let mut prev: Option<&Node> = None;
        let mut remaining = labels.len();

        while remaining > 0 {
            let label = labels[remaining - 1];

            if let Some(next) = curr.child(label) {
                prev = Some(curr);
                curr = next;
                remaining -= 1;
                continue;
            }

            if let Some(glob) = curr.child(WILDCARD) {
                prev = None;
                curr = glob;
                remaining -= 1;
                continue;
            }

            // a wildcard one level up swallows the level that just failed; the
            // same label is examined again below it
            match prev.and_then(|p| p.child(WILDCARD)) {
                Some(glob) => {
                    prev = None;
                    curr = glob;
                }
                None => return false,
            }
        }

        curr.blocked
    }

    /// Number of distinct patterns stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl NameSet for GlobTrie {
    fn insert(&mut self, name: &str) -> Result<(), BlocklistError> {
        GlobTrie::insert(self, name)
    }

    fn contains(&self, name: &str) -> bool {
        GlobTrie::contains(self, name)
    }
}
