//! Registry dependency references.
//!
//! An entry in `registryDependencies` either names an item of the same
//! registry or points somewhere else. Only local names are checked at build
//! time and walked by the resolver; everything else is carried through as an
//! opaque string for an external registry host to resolve.
//!
//! Grammar:
//!
//! ```text
//! url        = ("http://" | "https://") <any>
//! namespaced = "@" namespace "/" name      ; both parts non-empty
//! local      = <any other non-empty string>
//! ```

use std::fmt;

/// A parsed `registryDependencies` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemRef<'a> {
    /// An item of the same registry.
    Local(&'a str),
    /// An absolute URL to an item on another registry host.
    Url(&'a str),
    /// `@namespace/name`, resolved by whichever host owns the namespace.
    Namespaced { namespace: &'a str, name: &'a str },
}

impl<'a> ItemRef<'a> {
    /// Classifies a reference. Returns `None` for an empty or blank entry.
    pub fn parse(raw: &'a str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Some(Self::Url(raw));
        }
        if let Some(rest) = raw.strip_prefix('@')
            && let Some((namespace, name)) = rest.split_once('/')
            && !namespace.is_empty()
            && !name.is_empty()
        {
            return Some(Self::Namespaced { namespace, name });
        }
        Some(Self::Local(raw))
    }

    /// The local item name, if this reference stays inside the registry.
    pub fn local(&self) -> Option<&'a str> {
        match *self {
            Self::Local(name) => Some(name),
            _ => None,
        }
    }

    /// True for references another registry host resolves.
    pub fn is_external(&self) -> bool {
        !matches!(self, Self::Local(_))
    }
}

impl fmt::Display for ItemRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(name) | Self::Url(name) => f.write_str(name),
            Self::Namespaced { namespace, name } => write!(f, "@{namespace}/{name}"),
        }
    }
}

/// Local item names among `refs`, in declaration order.
pub fn local_names(refs: &[String]) -> impl Iterator<Item = &str> {
    refs.iter()
        .filter_map(|r| ItemRef::parse(r).and_then(|r| r.local()))
}
