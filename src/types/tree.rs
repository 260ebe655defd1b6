use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a hosted repository by owner and name, e.g. `rust-lang/cargo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRepo {
    pub owner: String,
    pub repo: String,
}

impl OwnerRepo {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses an `owner/repo` slug.
    pub fn parse(slug: &str) -> Option<Self> {
        let (owner, repo) = slug.split_once('/')?;
        let parsed = Self::new(owner, repo);
        parsed.is_well_formed().then_some(parsed)
    }

    /// Syntactic validity only; existence is up to the remote host.
    pub fn is_well_formed(&self) -> bool {
        fn ok(part: &str) -> bool {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        }
        ok(&self.owner) && ok(&self.repo)
    }
}

impl fmt::Display for OwnerRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Whether an entry is a file leaf or an expandable directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// One row of a raw directory listing, as reported by the hosting API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub sha: Option<String>,
}

impl TreeEntry {
    pub fn file(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryKind::File,
            size: Some(size),
            sha: None,
        }
    }

    pub fn dir(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryKind::Directory,
            size: None,
            sha: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Canonical tree node. Directories carry `children: Some(..)` (possibly
/// empty); files carry `children: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
    pub repo: OwnerRepo,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }
}

/// Visits every file node in depth-first order, directories descended in
/// their stored (already sorted) order.
pub fn for_each_file<'a>(nodes: &'a [TreeNode], visit: &mut impl FnMut(&'a TreeNode)) {
    for node in nodes {
        if node.is_file() {
            visit(node);
        } else if let Some(children) = &node.children {
            for_each_file(children, visit);
        }
    }
}

/// Sibling ordering: directories before files, lexicographic by name within
/// each kind. This is the one canonical order; two builds of the same
/// repository state produce identical trees.
pub fn sibling_order(a: &TreeNode, b: &TreeNode) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    }
}

pub fn sort_siblings(nodes: &mut [TreeNode]) {
    nodes.sort_by(sibling_order);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, kind: EntryKind) -> TreeNode {
        TreeNode {
            name: name.to_string(),
            path: name.to_string(),
            kind,
            size: None,
            last_modified: None,
            language: None,
            children: kind.is_dir().then(Vec::new),
            repo: OwnerRepo::new("octo", "demo"),
        }
    }

    #[test]
    fn test_owner_repo_parse() {
        let repo = OwnerRepo::parse("rust-lang/cargo").unwrap();
        assert_eq!(repo.owner, "rust-lang");
        assert_eq!(repo.repo, "cargo");
        assert_eq!(repo.to_string(), "rust-lang/cargo");

        assert!(OwnerRepo::parse("no-slash").is_none());
        assert!(OwnerRepo::parse("/repo").is_none());
        assert!(OwnerRepo::parse("owner/").is_none());
        assert!(OwnerRepo::parse("owner/re po").is_none());
    }

    #[test]
    fn test_well_formed_identifiers() {
        assert!(OwnerRepo::new("a-b_c.d", "x1").is_well_formed());
        assert!(!OwnerRepo::new("", "x").is_well_formed());
        assert!(!OwnerRepo::new("a/b", "x").is_well_formed());
    }

    #[test]
    fn test_sort_dirs_before_files() {
        let mut nodes = vec![
            node("zebra.rs", EntryKind::File),
            node("alpha.rs", EntryKind::File),
            node("src", EntryKind::Directory),
            node("docs", EntryKind::Directory),
        ];
        sort_siblings(&mut nodes);
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "src", "alpha.rs", "zebra.rs"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut once = vec![
            node("b", EntryKind::File),
            node("a", EntryKind::Directory),
            node("c", EntryKind::File),
        ];
        sort_siblings(&mut once);
        let mut twice = once.clone();
        sort_siblings(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_for_each_file_skips_directories() {
        let mut dir = node("src", EntryKind::Directory);
        dir.children = Some(vec![node("lib.rs", EntryKind::File)]);
        let nodes = vec![dir, node("README.md", EntryKind::File)];

        let mut seen = Vec::new();
        for_each_file(&nodes, &mut |n| seen.push(n.path.clone()));
        assert_eq!(seen, vec!["lib.rs", "README.md"]);
    }

    mod ordering_props {
        use super::*;
        use proptest::prelude::*;

        fn arb_siblings() -> impl Strategy<Value = Vec<TreeNode>> {
            proptest::collection::vec(
                ("[a-z]{1,8}", any::<bool>()).prop_map(|(name, is_dir)| {
                    let kind = if is_dir {
                        EntryKind::Directory
                    } else {
                        EntryKind::File
                    };
                    node(&name, kind)
                }),
                0..16,
            )
        }

        proptest! {
            #[test]
            fn test_sort_ignores_input_order(mut nodes in arb_siblings()) {
                let mut sorted = nodes.clone();
                sort_siblings(&mut sorted);
                nodes.reverse();
                sort_siblings(&mut nodes);
                prop_assert_eq!(&nodes, &sorted);
            }

            #[test]
            fn test_directories_strictly_precede_files(mut nodes in arb_siblings()) {
                sort_siblings(&mut nodes);
                if let Some(first_file) = nodes.iter().position(TreeNode::is_file) {
                    prop_assert!(nodes[first_file..].iter().all(TreeNode::is_file));
                }
                for pair in nodes.windows(2) {
                    if pair[0].kind == pair[1].kind {
                        prop_assert!(pair[0].name <= pair[1].name);
                    }
                }
            }
        }
    }

    #[test]
    fn test_entry_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EntryKind::Directory).unwrap(),
            "\"directory\""
        );
        assert_eq!(serde_json::to_string(&EntryKind::File).unwrap(), "\"file\"");
    }
}
