use serde_derive::{Deserialize, Serialize};

//------------ Value types for tests -----------------------------------------

#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub enum NoValue {
    Empty,
}

impl std::fmt::Debug for NoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("")
    }
}

impl std::fmt::Display for NoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NoValue")
    }
}

//------------ Tag -----------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct Tag(pub u32);

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({})", self.0)
    }
}
