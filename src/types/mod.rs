pub mod error;
pub mod search;
pub mod tree;

pub use error::{FetchError, LensError, Result};
pub use search::SearchWindow;
pub use tree::{
    for_each_file, sibling_order, sort_siblings, EntryKind, OwnerRepo, TreeEntry, TreeNode,
};
