use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::UsageError;
use crate::extension::Extension;
use crate::job::{Job, RetryLimits};
use crate::registry::registry;

struct GroupInner {
    name: String,
    parent: Option<Group>,
    children: Mutex<HashSet<Group>>,
}

/// Node in the hierarchical `/`-separated topic tree, interned process-wide
/// by canonical name.
///
/// A non-wildcard group `a/b/c` hangs under the wildcard parent `a/b/...`,
/// which in turn hangs under the plain prefix `a/b`, so the ancestor chain
/// alternates plain and wildcard levels down to the root segment. Creating a
/// group materializes that whole chain; groups are never deleted.
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

impl Group {
    /// Failure budget for extension background workers.
    pub const EXTENSION_RETRY_LIMITS: RetryLimits = RetryLimits {
        max_consecutive_failures: Some(32),
        max_total_failures: Some(1024),
    };

    /// Intern the group with the given name, creating it and its ancestor
    /// chain on first use. Names canonicalize by dropping empty segments; a
    /// name with no segments left is a usage error.
    pub fn new(name: &str) -> anyhow::Result<Group> {
        let canonical = canonical_name(name);
        if canonical.is_empty() {
            return Err(UsageError::EmptyGroupName.into());
        }
        let mut groups = registry().groups.lock();
        Ok(intern(&mut groups, canonical))
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Parent in the topic tree, if any.
    pub fn parent(&self) -> Option<Group> {
        self.inner.parent.clone()
    }

    /// Direct children in the topic tree.
    pub fn children(&self) -> Vec<Group> {
        self.inner.children.lock().iter().cloned().collect()
    }

    /// Whether this group is a wildcard standing for its prefix's subtree.
    pub fn is_wildcard(&self) -> bool {
        self.inner.name.rsplit('/').next() == Some("...")
    }

    /// Bind `extension` to this group and start its background worker as a
    /// supervised `Loop(Retry(..))` service named `extension:<group>`. At
    /// most one extension may bind to any group.
    pub fn add_extension(&self, extension: Arc<dyn Extension>) -> anyhow::Result<()> {
        {
            let mut extensions = registry().extensions.lock();
            if extensions.contains_key(self) {
                return Err(
                    UsageError::ExtensionAlreadyRegistered(self.inner.name.clone()).into(),
                );
            }
            extensions.insert(self.clone(), extension.clone());
        }

        let worker = extension;
        let job = Job::forever(Job::Retry {
            run: Arc::new(move || worker.background_worker()),
            crash_manager: None,
            limits: Self::EXTENSION_RETRY_LIMITS,
        });
        registry()
            .bus_supervisor()
            .start_service(&format!("extension:{}", self.inner.name), &job)
    }

    pub(crate) fn extension(&self) -> Option<Arc<dyn Extension>> {
        registry().extensions.lock().get(self).cloned()
    }

    /// Nearest ancestor (including self) with a bound extension.
    pub(crate) fn nearest_extension(&self) -> Option<Arc<dyn Extension>> {
        let mut current = Some(self.clone());
        while let Some(group) = current {
            if let Some(extension) = group.extension() {
                return Some(extension);
            }
            current = group.parent();
        }
        None
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl Eq for Group {}

impl Hash for Group {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Group").field(&self.inner.name).finish()
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

fn canonical_name(name: &str) -> String {
    name.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn intern(groups: &mut HashMap<String, Group>, canonical: String) -> Group {
    if let Some(existing) = groups.get(&canonical) {
        return existing.clone();
    }

    let segments: Vec<&str> = canonical.split('/').collect();
    let is_wildcard = segments.last().copied() == Some("...");
    let parent_name = if segments.len() > 1 {
        let prefix = segments[..segments.len() - 1].join("/");
        if is_wildcard {
            Some(prefix)
        } else {
            Some(format!("{prefix}/..."))
        }
    } else {
        None
    };
    let parent = match parent_name {
        Some(name) => Some(intern(groups, name)),
        None => None,
    };

    let group = Group {
        inner: Arc::new(GroupInner {
            name: canonical.clone(),
            parent: parent.clone(),
            children: Mutex::new(HashSet::new()),
        }),
    };
    groups.insert(canonical, group.clone());
    if let Some(parent) = parent {
        parent.inner.children.lock().insert(group.clone());
    }
    group
}

#[cfg(test)]
mod tests {
    use super::{Group, canonical_name};
    use crate::error::UsageError;

    #[test]
    fn canonicalization_is_idempotent() {
        assert_eq!(canonical_name("//grp_a///b/"), "grp_a/b");
        assert_eq!(canonical_name(&canonical_name("//grp_a///b/")), "grp_a/b");
        let group = Group::new("/grp_canon//x/").unwrap();
        assert_eq!(group.name(), "grp_canon/x");
        assert_eq!(group, Group::new("grp_canon/x").unwrap());
    }

    #[test]
    fn empty_name_is_a_usage_error() {
        let err = Group::new("///").unwrap_err();
        assert_eq!(
            err.downcast_ref::<UsageError>(),
            Some(&UsageError::EmptyGroupName)
        );
    }

    #[test]
    fn ancestor_chain_alternates_plain_and_wildcard() {
        let leaf = Group::new("grp_chain/a/b/c").unwrap();
        let wildcard = leaf.parent().unwrap();
        assert_eq!(wildcard.name(), "grp_chain/a/b/...");
        assert!(wildcard.is_wildcard());

        let plain = wildcard.parent().unwrap();
        assert_eq!(plain.name(), "grp_chain/a/b");
        assert!(!plain.is_wildcard());

        assert!(plain.children().contains(&wildcard));
        assert!(wildcard.children().contains(&leaf));

        let root = Group::new("grp_chain").unwrap();
        assert!(root.parent().is_none());
    }

    #[test]
    fn interning_is_by_canonical_name() {
        let first = Group::new("grp_intern/one").unwrap();
        let second = Group::new("/grp_intern/one//").unwrap();
        assert_eq!(first, second);
        // Both handles observe the same children set.
        let child = Group::new("grp_intern/one/two").unwrap();
        let wildcard = child.parent().unwrap();
        assert!(first.children().contains(&wildcard));
        assert!(second.children().contains(&wildcard));
    }
}
