//! Parsing of resource-backed event names.

use std::fmt;

/// First segment of every resource-backed event name.
pub const RESOURCE_PREFIX: &str = "resource";

/// What a live feed is held for: a whole collection or one item in it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKey {
    Collection { id: String },
    Item { id: String, sub_id: String },
}

impl ResourceKey {
    pub fn collection(id: impl Into<String>) -> Self {
        ResourceKey::Collection { id: id.into() }
    }

    pub fn item(id: impl Into<String>, sub_id: impl Into<String>) -> Self {
        ResourceKey::Item {
            id: id.into(),
            sub_id: sub_id.into(),
        }
    }

    /// The resource id, shared by collection and item keys.
    pub fn id(&self) -> &str {
        match self {
            ResourceKey::Collection { id } | ResourceKey::Item { id, .. } => id,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Collection { id } => write!(f, "{id}"),
            ResourceKey::Item { id, sub_id } => write!(f, "{id}:{sub_id}"),
        }
    }
}

/// A parsed `resource:{id}:{action}[:{sub_id}]` event name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceName {
    pub id: String,
    pub action: String,
    pub sub_id: Option<String>,
}

impl ResourceName {
    /// Parse an event name. Returns `None` for anything that does not match
    /// the grammar exactly; such names are plain custom events.
    pub fn parse(name: &str) -> Option<Self> {
        let mut segments = name.split(':');
        if segments.next()? != RESOURCE_PREFIX {
            return None;
        }

        let id = segments.next()?;
        let action = segments.next()?;
        let sub_id = segments.next();
        if segments.next().is_some() {
            return None;
        }

        if id.is_empty() || action.is_empty() || sub_id.is_some_and(str::is_empty) {
            return None;
        }

        Some(Self {
            id: id.to_string(),
            action: action.to_string(),
            sub_id: sub_id.map(str::to_string),
        })
    }

    /// The refcount key this name contributes to. Every action on the same
    /// id (or id and sub id) shares one key.
    pub fn key(&self) -> ResourceKey {
        match &self.sub_id {
            None => ResourceKey::collection(&self.id),
            Some(sub_id) => ResourceKey::item(&self.id, sub_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection_name() {
        let name = ResourceName::parse("resource:posts:create").unwrap();
        assert_eq!(name.id, "posts");
        assert_eq!(name.action, "create");
        assert_eq!(name.sub_id, None);
        assert_eq!(name.key(), ResourceKey::collection("posts"));
    }

    #[test]
    fn test_parse_item_name() {
        let name = ResourceName::parse("resource:posts:update:42").unwrap();
        assert_eq!(name.sub_id.as_deref(), Some("42"));
        assert_eq!(name.key(), ResourceKey::item("posts", "42"));
        assert_eq!(name.key().to_string(), "posts:42");
    }

    #[test]
    fn test_actions_share_key() {
        let create = ResourceName::parse("resource:posts:create").unwrap();
        let delete = ResourceName::parse("resource:posts:delete").unwrap();
        assert_eq!(create.key(), delete.key());
    }

    #[test]
    fn test_rejects_non_matching_names() {
        for name in [
            "posts:create",
            "resource",
            "resource:posts",
            "resource::create",
            "resource:posts:",
            "resource:posts:update:",
            "resource:posts:update:42:extra",
            "resources:posts:create",
            "state:change:resource",
        ] {
            assert!(ResourceName::parse(name).is_none(), "{name} should not parse");
        }
    }
}
