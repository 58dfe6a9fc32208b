//! Dependency resolution over local registry references.
//!
//! The walk is an explicit-stack depth-first search, so arbitrarily deep
//! dependency chains never touch the call stack. Output is post-order: every
//! item appears after everything it depends on.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{RegistryError, Result};
use crate::imports;
use crate::item::RegistryItem;

/// One item on the active path and the position of its next unvisited dependency.
struct Frame<'a> {
    name: &'a str,
    deps: Vec<&'a str>,
    next: usize,
}

/// Returns `requested` and everything they depend on, dependencies first.
///
/// Each name appears once. Cross-registry references are not followed.
pub fn resolve<'a, F>(requested: &[&'a str], lookup: F) -> Result<Vec<String>>
where
    F: Fn(&str) -> Option<&'a RegistryItem>,
{
    let mut order = Vec::new();
    let mut resolved: HashSet<&'a str> = HashSet::new();
    let mut active: HashSet<&'a str> = HashSet::new();
    let mut stack: Vec<Frame<'a>> = Vec::new();

    for &root in requested {
        if resolved.contains(root) {
            continue;
        }
        push(&mut stack, &mut active, root, None, &lookup)?;

        while let Some(frame) = stack.last_mut() {
            let Some(&dep) = frame.deps.get(frame.next) else {
                let done = stack.pop().map(|f| f.name).unwrap_or(root);
                active.remove(done);
                resolved.insert(done);
                order.push(done.to_string());
                continue;
            };
            frame.next += 1;
            let parent = frame.name;

            if resolved.contains(dep) {
                continue;
            }
            if active.contains(dep) {
                return Err(cycle_error(&stack, dep));
            }
            push(&mut stack, &mut active, dep, Some(parent), &lookup)?;
        }
    }

    Ok(order)
}

fn push<'a, F>(
    stack: &mut Vec<Frame<'a>>,
    active: &mut HashSet<&'a str>,
    name: &'a str,
    requested_by: Option<&str>,
    lookup: &F,
) -> Result<()>
where
    F: Fn(&str) -> Option<&'a RegistryItem>,
{
    let item = lookup(name).ok_or_else(|| RegistryError::MissingReference {
        name: name.to_string(),
        requested_by: requested_by.map(str::to_string),
    })?;
    active.insert(name);
    stack.push(Frame {
        name,
        deps: item.local_dependencies().collect(),
        next: 0,
    });
    Ok(())
}

fn cycle_error(stack: &[Frame<'_>], repeated: &str) -> RegistryError {
    let start = stack.iter().position(|f| f.name == repeated).unwrap_or(0);
    let mut cycle: Vec<String> = stack[start..].iter().map(|f| f.name.to_string()).collect();
    cycle.push(repeated.to_string());
    RegistryError::Cycle { cycle }
}

/// Union of the npm dependencies of `names`, one entry per package.
///
/// When one item pins a version range and another names the bare package,
/// the pinned declaration is kept.
pub fn collect_dependencies<'a, F>(names: &[String], lookup: F) -> Result<BTreeSet<String>>
where
    F: Fn(&str) -> Option<&'a RegistryItem>,
{
    let mut deps: BTreeMap<&str, &str> = BTreeMap::new();
    for name in names {
        let item = lookup(name.as_str()).ok_or_else(|| RegistryError::MissingReference {
            name: name.clone(),
            requested_by: None,
        })?;
        for declaration in &item.dependencies {
            let package = imports::package_name(declaration);
            let entry = deps.entry(package).or_insert(declaration);
            if *entry == package {
                *entry = declaration;
            }
        }
    }
    Ok(deps.into_values().map(str::to_string).collect())
}

/// Cross-registry references of `names`, deduplicated in first-seen order.
///
/// These are passed through untouched; another registry host resolves them.
pub fn external_references<'a, F>(names: &[String], lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<&'a RegistryItem>,
{
    let mut seen = HashSet::new();
    names
        .iter()
        .filter_map(|name| lookup(name.as_str()))
        .flat_map(|item| item.external_dependencies().map(|r| r.to_string()))
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemKind;
    use std::collections::HashMap;

    fn item(name: &str, deps: &[&str]) -> RegistryItem {
        RegistryItem {
            name: name.to_string(),
            kind: ItemKind::Ui,
            title: None,
            description: None,
            dependencies: vec![format!("pkg-{name}")],
            registry_dependencies: deps.iter().map(|d| d.to_string()).collect(),
            files: vec![],
            meta: Default::default(),
        }
    }

    fn registry(items: Vec<RegistryItem>) -> HashMap<String, RegistryItem> {
        items.into_iter().map(|i| (i.name.clone(), i)).collect()
    }

    #[test]
    fn diamond_is_dependency_first_without_duplicates() {
        let reg = registry(vec![
            item("a", &["b", "c"]),
            item("b", &["d"]),
            item("c", &["d"]),
            item("d", &[]),
        ]);
        let order = resolve(&["a"], |n| reg.get(n)).unwrap();
        assert_eq!(order, vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn shared_dependencies_across_requests_appear_once() {
        let reg = registry(vec![item("a", &["c"]), item("b", &["c"]), item("c", &[])]);
        let order = resolve(&["a", "b", "c"], |n| reg.get(n)).unwrap();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn cycle_reports_full_path() {
        let reg = registry(vec![
            item("root", &["a"]),
            item("a", &["b"]),
            item("b", &["c"]),
            item("c", &["a"]),
        ]);
        let err = resolve(&["root"], |n| reg.get(n)).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"circular dependency: a -> b -> c -> a");
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let reg = registry(vec![item("a", &["a"])]);
        let err = resolve(&["a"], |n| reg.get(n)).unwrap_err();
        assert!(matches!(err, RegistryError::Cycle { ref cycle } if cycle == &["a", "a"]));
    }

    #[test]
    fn missing_reference_names_requester() {
        let reg = registry(vec![item("a", &["ghost"])]);
        let err = resolve(&["a"], |n| reg.get(n)).unwrap_err();
        assert_eq!(err.to_string(), "missing dependency 'ghost' (required by 'a')");

        let err = resolve(&["nope"], |n| reg.get(n)).unwrap_err();
        assert_eq!(err.to_string(), "missing dependency 'nope'");
    }

    #[test]
    fn cross_registry_references_are_not_walked() {
        let reg = registry(vec![item("a", &["https://x.dev/r/b.json", "@acme/c", "d"]), item("d", &[])]);
        let order = resolve(&["a"], |n| reg.get(n)).unwrap();
        assert_eq!(order, vec!["d", "a"]);
        assert_eq!(
            external_references(&order, |n| reg.get(n)),
            vec!["https://x.dev/r/b.json", "@acme/c"]
        );
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let depth = 10_000;
        let names: Vec<String> = (0..depth).map(|i| format!("n{i}")).collect();
        let items: Vec<RegistryItem> = (0..depth)
            .map(|i| {
                let deps: Vec<&str> = if i + 1 < depth { vec![names[i + 1].as_str()] } else { vec![] };
                item(&names[i], &deps)
            })
            .collect();
        let reg = registry(items);

        let order = resolve(&["n0"], |n| reg.get(n)).unwrap();
        assert_eq!(order.len(), depth);
        assert_eq!(order.first().map(String::as_str), Some("n9999"));
        assert_eq!(order.last().map(String::as_str), Some("n0"));
    }

    #[test]
    fn pinned_declaration_wins_over_bare_package() {
        let mut pinned = item("a", &[]);
        pinned.dependencies = vec!["zod@^3.22".to_string(), "@scope/ui".to_string()];
        let mut bare = item("b", &[]);
        bare.dependencies = vec!["zod".to_string(), "@scope/ui@2".to_string()];
        let reg = registry(vec![pinned, bare]);

        let names = vec!["b".to_string(), "a".to_string()];
        let deps = collect_dependencies(&names, |n| reg.get(n)).unwrap();
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec!["@scope/ui@2", "zod@^3.22"]);
    }

    #[test]
    fn dependencies_are_flattened_and_sorted() {
        let reg = registry(vec![item("b", &[]), item("a", &["b"])]);
        let order = resolve(&["a"], |n| reg.get(n)).unwrap();
        let deps = collect_dependencies(&order, |n| reg.get(n)).unwrap();
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec!["pkg-a", "pkg-b"]);
    }
}
