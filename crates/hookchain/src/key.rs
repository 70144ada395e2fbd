use std::fmt;
use std::sync::Arc;

/// Symbolic identifier a hook chain is registered and dispatched under.
///
/// Keys compare and hash by name, so two keys built from the same string
/// address the same chain. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookKey {
    name: Arc<str>,
}

impl HookKey {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for HookKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for HookKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}
