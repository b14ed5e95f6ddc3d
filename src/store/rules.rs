//! Per-collection access rules
//!
//! Each operation on a collection is either public or requires a verified
//! admin credential. Collections without an entry fall back to admin-only.
//!
//! Two tables are in use: [`AccessRules::portfolio`] for callers of the
//! store, and [`AccessRules::site`] for the server's own handle. Visitors
//! never write comments or likes directly; the content services do it for
//! them through the site handle, so a visitor cannot pick field values
//! such as `is_approved` or a counter total.

use std::collections::HashMap;

use super::collections;

/// Who may perform an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Admin,
}

/// Kinds of document operations checked by the rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

/// Access per operation for one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionRules {
    pub read: Access,
    pub create: Access,
    pub update: Access,
    pub delete: Access,
}

impl CollectionRules {
    pub const ADMIN_ONLY: Self = Self {
        read: Access::Admin,
        create: Access::Admin,
        update: Access::Admin,
        delete: Access::Admin,
    };

    pub const PUBLIC: Self = Self {
        read: Access::Public,
        create: Access::Public,
        update: Access::Public,
        delete: Access::Public,
    };

    pub const READ_ONLY: Self = Self {
        read: Access::Public,
        ..Self::ADMIN_ONLY
    };

    pub fn access(&self, operation: Operation) -> Access {
        match operation {
            Operation::Read => self.read,
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// Rule table for all collections
#[derive(Debug, Clone)]
pub struct AccessRules {
    collections: HashMap<String, CollectionRules>,
    fallback: CollectionRules,
}

impl AccessRules {
    /// Empty table where every collection uses `fallback`
    pub fn new(fallback: CollectionRules) -> Self {
        Self {
            collections: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, collection: &str, rules: CollectionRules) -> Self {
        self.collections.insert(collection.to_string(), rules);
        self
    }

    /// Rules for callers of the store
    pub fn portfolio() -> Self {
        Self::new(CollectionRules::ADMIN_ONLY)
            .with(collections::BLOG_POSTS, CollectionRules::READ_ONLY)
            .with(collections::COMMENTS, CollectionRules::READ_ONLY)
            .with(
                collections::CONTACT_MESSAGES,
                CollectionRules {
                    create: Access::Public,
                    ..CollectionRules::ADMIN_ONLY
                },
            )
            .with(collections::LIKE_COUNTS, CollectionRules::READ_ONLY)
    }

    /// Rules for the server's own handle. `Public` marks what the site may
    /// do without an admin credential.
    pub fn site() -> Self {
        Self::new(CollectionRules::ADMIN_ONLY)
            .with(collections::BLOG_POSTS, CollectionRules::READ_ONLY)
            .with(
                collections::COMMENTS,
                CollectionRules {
                    read: Access::Public,
                    create: Access::Public,
                    ..CollectionRules::ADMIN_ONLY
                },
            )
            .with(
                collections::CONTACT_MESSAGES,
                CollectionRules {
                    create: Access::Public,
                    ..CollectionRules::ADMIN_ONLY
                },
            )
            .with(
                collections::LIKES,
                CollectionRules {
                    update: Access::Admin,
                    ..CollectionRules::PUBLIC
                },
            )
            .with(
                collections::LIKE_COUNTS,
                CollectionRules {
                    delete: Access::Admin,
                    ..CollectionRules::PUBLIC
                },
            )
    }

    pub fn access(&self, collection: &str, operation: Operation) -> Access {
        self.collections
            .get(collection)
            .unwrap_or(&self.fallback)
            .access(operation)
    }
}

impl Default for AccessRules {
    fn default() -> Self {
        Self::portfolio()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_rules() {
        let rules = AccessRules::portfolio();

        assert_eq!(rules.access("blog-posts", Operation::Read), Access::Public);
        assert_eq!(rules.access("blog-posts", Operation::Create), Access::Admin);
        assert_eq!(rules.access("comments", Operation::Read), Access::Public);
        assert_eq!(rules.access("comments", Operation::Create), Access::Admin);
        assert_eq!(rules.access("comments", Operation::Update), Access::Admin);
        assert_eq!(rules.access("contact-messages", Operation::Create), Access::Public);
        assert_eq!(rules.access("contact-messages", Operation::Read), Access::Admin);
        assert_eq!(rules.access("likes", Operation::Read), Access::Admin);
        assert_eq!(rules.access("likes", Operation::Delete), Access::Admin);
        assert_eq!(rules.access("likeCounts", Operation::Read), Access::Public);
        assert_eq!(rules.access("likeCounts", Operation::Update), Access::Admin);
    }

    #[test]
    fn test_site_rules_cover_visitor_writes_only() {
        let rules = AccessRules::site();

        assert_eq!(rules.access("comments", Operation::Create), Access::Public);
        assert_eq!(rules.access("comments", Operation::Update), Access::Admin);
        assert_eq!(rules.access("comments", Operation::Delete), Access::Admin);
        assert_eq!(rules.access("blog-posts", Operation::Create), Access::Admin);
        assert_eq!(rules.access("contact-messages", Operation::Read), Access::Admin);
        assert_eq!(rules.access("likes", Operation::Delete), Access::Public);
        assert_eq!(rules.access("likeCounts", Operation::Update), Access::Public);
        assert_eq!(rules.access("likeCounts", Operation::Delete), Access::Admin);
    }

    #[test]
    fn test_unknown_collection_is_admin_only() {
        let rules = AccessRules::portfolio();
        for op in [Operation::Read, Operation::Create, Operation::Update, Operation::Delete] {
            assert_eq!(rules.access("drafts", op), Access::Admin);
        }
    }
}
