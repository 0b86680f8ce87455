use crate::model::{Permission, FULL_ACCESS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Permissions a credential is known to hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    held: BTreeSet<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding only [`FULL_ACCESS`].
    pub fn full_access() -> Self {
        std::iter::once(FULL_ACCESS).collect()
    }

    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.held.insert(permission.into())
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.held.contains(permission)
    }

    pub fn has_full_access(&self) -> bool {
        self.held.contains(FULL_ACCESS)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            held: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for PermissionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.held.extend(iter.into_iter().map(Into::into));
    }
}

/// Static per-vendor vocabulary: which permissions each resource type can
/// carry, and which broader permission implies a narrower one.
#[derive(Debug, Clone, Default)]
pub struct PermissionTable {
    by_type: BTreeMap<String, Vec<String>>,
    implied_by: BTreeMap<String, String>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, resource_type: &str, permissions: &[&str]) -> Self {
        self.by_type.insert(
            resource_type.to_string(),
            permissions.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    /// Declare that holding `parent` implies holding `permission`.
    pub fn with_implication(mut self, permission: &str, parent: &str) -> Self {
        self.implied_by
            .insert(permission.to_string(), parent.to_string());
        self
    }

    /// Permissions a resource of this type can ever carry.
    pub fn applicable(&self, resource_type: &str) -> &[String] {
        self.by_type
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Chain of implying permissions above `permission`, nearest first.
    fn implying_chain(&self, permission: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = permission;
        while let Some(parent) = self.implied_by.get(current) {
            if parent == permission || chain.contains(&parent.as_str()) {
                break;
            }
            chain.push(parent.as_str());
            current = parent.as_str();
        }
        chain
    }

    /// The permission with its implication hierarchy attached.
    pub fn permission(&self, value: &str) -> Permission {
        self.implying_chain(value)
            .into_iter()
            .rev()
            .fold(None, |parent: Option<Permission>, ancestor| {
                Some(match parent {
                    Some(p) => Permission::inherited_from(ancestor, p),
                    None => Permission::new(ancestor),
                })
            })
            .map(|parent| Permission::inherited_from(value, parent))
            .unwrap_or_else(|| Permission::new(value))
    }

    /// Whether `held` grants `permission`, directly, through an implying
    /// permission, or through [`FULL_ACCESS`].
    pub fn grants(&self, held: &PermissionSet, permission: &str) -> bool {
        held.contains(permission)
            || held.has_full_access()
            || self
                .implying_chain(permission)
                .into_iter()
                .any(|p| held.contains(p))
    }

    /// The applicable permissions `held` grants on a resource of this type.
    /// Only inherited grants carry their implying parent.
    pub fn resolve(&self, resource_type: &str, held: &PermissionSet) -> Vec<Permission> {
        self.applicable(resource_type)
            .iter()
            .filter(|p| self.grants(held, p))
            .map(|p| {
                if held.contains(p) {
                    Permission::new(p.as_str())
                } else {
                    self.permission(p)
                }
            })
            .collect()
    }
}
