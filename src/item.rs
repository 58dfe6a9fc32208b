//! Registry items, their files, and the built bundle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::reference::{self, ItemRef};

/// What kind of source an item (or a single file) provides.
///
/// The kind decides where a file lands in a consuming project when it carries
/// no explicit target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    #[serde(rename = "registry:ui")]
    Ui,
    #[serde(rename = "registry:component")]
    Component,
    #[serde(rename = "registry:block")]
    Block,
    #[serde(rename = "registry:hook")]
    Hook,
    #[serde(rename = "registry:lib")]
    Lib,
    #[serde(rename = "registry:page")]
    Page,
    #[serde(rename = "registry:file")]
    File,
    #[serde(rename = "registry:style")]
    Style,
    #[serde(rename = "registry:theme")]
    Theme,
    #[serde(rename = "registry:example")]
    Example,
}

impl ItemKind {
    /// Every kind, in declaration order.
    pub const ALL: [ItemKind; 10] = [
        ItemKind::Ui,
        ItemKind::Component,
        ItemKind::Block,
        ItemKind::Hook,
        ItemKind::Lib,
        ItemKind::Page,
        ItemKind::File,
        ItemKind::Style,
        ItemKind::Theme,
        ItemKind::Example,
    ];

    /// The `registry:*` name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Ui => "registry:ui",
            ItemKind::Component => "registry:component",
            ItemKind::Block => "registry:block",
            ItemKind::Hook => "registry:hook",
            ItemKind::Lib => "registry:lib",
            ItemKind::Page => "registry:page",
            ItemKind::File => "registry:file",
            ItemKind::Style => "registry:style",
            ItemKind::Theme => "registry:theme",
            ItemKind::Example => "registry:example",
        }
    }

    /// Parses a `registry:*` name.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Project-relative directory used when a file has no explicit target.
    pub fn default_directory(self) -> &'static str {
        match self {
            ItemKind::Ui => "components/ui",
            ItemKind::Component | ItemKind::Block | ItemKind::Example => "components",
            ItemKind::Hook => "hooks",
            ItemKind::Lib => "lib",
            ItemKind::Page => "app",
            ItemKind::File | ItemKind::Style | ItemKind::Theme => "",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source file shipped by an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFile {
    /// Path relative to the registry root (source) or bundle (built).
    pub path: String,
    /// File body. Absent in the source definition, always present in a bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Explicit project-relative destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ItemKind>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Item metadata: a few recognized keys with defaults, everything else kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    /// The item's modules must run on the client.
    #[serde(default, skip_serializing_if = "is_false")]
    pub client: bool,
    /// Excluded from listings, still installable by name.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    /// Integrations the item can use when present but does not require.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_integrations: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemMeta {
    /// True when nothing would be serialized.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One distributable unit: its files and what it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// npm packages required at runtime.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub registry_dependencies: Vec<String>,
    #[serde(default)]
    pub files: Vec<ItemFile>,
    #[serde(default, skip_serializing_if = "ItemMeta::is_empty")]
    pub meta: ItemMeta,
}

impl RegistryItem {
    /// Names of items in the same registry this item depends on.
    pub fn local_dependencies(&self) -> impl Iterator<Item = &str> {
        reference::local_names(&self.registry_dependencies)
    }

    /// References resolved by some other registry host.
    pub fn external_dependencies(&self) -> impl Iterator<Item = ItemRef<'_>> {
        self.registry_dependencies
            .iter()
            .filter_map(|r| ItemRef::parse(r))
            .filter(ItemRef::is_external)
    }

    /// Kind of a file, falling back to the item's own kind.
    pub fn file_kind(&self, file: &ItemFile) -> ItemKind {
        file.kind.unwrap_or(self.kind)
    }
}

/// The author-maintained registry definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub items: Vec<RegistryItem>,
}

/// A built registry: every item with inlined file content, plus an integrity digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub items: Vec<RegistryItem>,
    #[serde(default)]
    pub integrity: String,
    /// Additional top-level payloads (themes, styles) carried alongside items.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bundle {
    /// Looks up an item by name.
    pub fn item(&self, name: &str) -> Option<&RegistryItem> {
        self.items.iter().find(|i| i.name == name)
    }

    /// Total number of files across all items.
    pub fn file_count(&self) -> usize {
        self.items.iter().map(|i| i.files.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_defaults_and_passthrough() {
        let meta: ItemMeta = serde_json::from_value(json!({
            "hidden": true,
            "docs": "https://example.com"
        }))
        .unwrap();
        assert!(meta.hidden);
        assert!(!meta.client);
        assert!(meta.optional_integrations.is_empty());
        assert_eq!(meta.extra["docs"], json!("https://example.com"));

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back, json!({ "hidden": true, "docs": "https://example.com" }));
    }

    #[test]
    fn empty_meta_is_omitted() {
        let item: RegistryItem = serde_json::from_value(json!({
            "name": "button",
            "type": "registry:ui"
        }))
        .unwrap();
        assert!(item.meta.is_empty());
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("meta").is_none());
        assert_eq!(value["registryDependencies"], json!([]));
    }

    #[test]
    fn file_kind_falls_back_to_item_kind() {
        let item: RegistryItem = serde_json::from_value(json!({
            "name": "use-toast",
            "type": "registry:hook",
            "files": [
                { "path": "hooks/use-toast.ts" },
                { "path": "lib/toast.ts", "type": "registry:lib" }
            ]
        }))
        .unwrap();
        assert_eq!(item.file_kind(&item.files[0]), ItemKind::Hook);
        assert_eq!(item.file_kind(&item.files[1]), ItemKind::Lib);
    }

    #[test]
    fn bundle_keeps_extra_top_level_keys() {
        let bundle: Bundle = serde_json::from_value(json!({
            "items": [],
            "integrity": "sha256:00",
            "themes": { "dark": {} }
        }))
        .unwrap();
        assert_eq!(bundle.integrity, "sha256:00");
        assert!(bundle.extra.contains_key("themes"));
        assert!(!bundle.extra.contains_key("integrity"));
    }

    #[test]
    fn local_and_external_dependencies_are_split() {
        let item: RegistryItem = serde_json::from_value(json!({
            "name": "dialog",
            "type": "registry:ui",
            "registryDependencies": ["button", "https://x.dev/r/card.json", "@acme/icon"]
        }))
        .unwrap();
        assert_eq!(item.local_dependencies().collect::<Vec<_>>(), vec!["button"]);
        assert_eq!(item.external_dependencies().count(), 2);
    }

    #[test]
    fn kind_lookup_by_string() {
        assert_eq!(ItemKind::from_str_opt("registry:hook"), Some(ItemKind::Hook));
        assert_eq!(ItemKind::from_str_opt("registry:nope"), None);
    }
}
