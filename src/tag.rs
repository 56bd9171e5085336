//! The opaque column identifier the whole crate is parametric over.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// A globally unique, opaque identifier for a column.
///
/// Two relations share a column exactly when they carry equal tags; there
/// is no renaming. The crate only requires equality, hashing, a total
/// order (used to canonicalize operation layers and column lists), and a
/// derivable name for emitted SQL. Hosts supply their own tag type and
/// thread it through `Relation<T>` and the expression types.
pub trait ColumnTag:
    Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static
{
    /// A stable, SQL-safe name for the column, unique across tags.
    fn qualified_name(&self) -> String;
}

/// A plain string tag, sufficient for many hosts and for the test suite.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StringTag(pub String);

impl StringTag {
    pub fn new(name: impl Into<String>) -> Self {
        StringTag(name.into())
    }
}

impl ColumnTag for StringTag {
    fn qualified_name(&self) -> String {
        self.0.clone()
    }
}

impl fmt::Display for StringTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StringTag {
    fn from(name: &str) -> Self {
        StringTag(name.to_string())
    }
}
