//! SQLite-backed document store with access rules
//!
//! Admin operations verify the bearer credential against the identity
//! authority on every call. A missing, unknown or expired credential is
//! `PermissionDenied`.
//!
//! The server's own writes on a visitor's behalf go through
//! [`SiteCollections`], which is checked against a separate rule table
//! and never carries a credential.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    Access, AccessRules, Collections, CountedCollections, DocumentError, DocumentStore,
    Operation, Query,
};
use crate::db::repositories::{CounterChange, DocumentRepository, Precondition};
use crate::identity::{IdentityError, TokenVerifier};
use crate::models::{Document, Fields};

/// Conditional writes retried after losing a race with a create or delete
const WRITE_ATTEMPTS: usize = 3;

/// Who a call is made for
#[derive(Debug, Clone, Copy)]
enum Caller<'a> {
    Bearer(Option<&'a str>),
    Site,
}

/// Rule-checked document store
pub struct HostedDocumentStore {
    repo: Arc<dyn DocumentRepository>,
    rules: AccessRules,
    site_rules: AccessRules,
    verifier: Arc<dyn TokenVerifier>,
}

impl HostedDocumentStore {
    pub fn new(
        repo: Arc<dyn DocumentRepository>,
        rules: AccessRules,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            repo,
            rules,
            site_rules: AccessRules::site(),
            verifier,
        }
    }

    /// Replace the table the site handle is checked against
    pub fn with_site_rules(mut self, rules: AccessRules) -> Self {
        self.site_rules = rules;
        self
    }

    /// Server-held handle for writes made on a visitor's behalf
    pub fn site(self: &Arc<Self>) -> SiteCollections {
        SiteCollections {
            store: self.clone(),
        }
    }

    fn rules_for(&self, caller: Caller<'_>) -> &AccessRules {
        match caller {
            Caller::Bearer(_) => &self.rules,
            Caller::Site => &self.site_rules,
        }
    }

    async fn authorize(
        &self,
        caller: Caller<'_>,
        collection: &str,
        operation: Operation,
    ) -> Result<(), DocumentError> {
        validate_name("collection", collection)?;

        if self.rules_for(caller).access(collection, operation) == Access::Public {
            return Ok(());
        }

        let token = match caller {
            Caller::Bearer(Some(token)) => token,
            Caller::Bearer(None) => {
                tracing::debug!("Denied {:?} on {} without credential", operation, collection);
                return Err(DocumentError::PermissionDenied(
                    "Sign-in required".to_string(),
                ));
            }
            Caller::Site => {
                tracing::warn!("Site handle denied {:?} on {}", operation, collection);
                return Err(DocumentError::PermissionDenied(format!(
                    "{:?} on {} is not a site operation",
                    operation, collection
                )));
            }
        };

        match self.verifier.verify(token).await {
            Ok(identity) => {
                tracing::debug!("{} granted {:?} on {}", identity, operation, collection);
                Ok(())
            }
            Err(IdentityError::Unavailable(msg)) => Err(DocumentError::Unavailable(msg)),
            Err(IdentityError::Internal(msg)) => Err(DocumentError::Internal(msg)),
            Err(e) => {
                tracing::debug!("Denied {:?} on {}: {}", operation, collection, e);
                Err(DocumentError::PermissionDenied(e.to_string()))
            }
        }
    }

    /// Authorize a create-or-replace write. Writes to an existing document
    /// are updates, otherwise creates; the returned precondition pins the
    /// state that was authorized so the repository can refuse the write if
    /// it changed in between. `known` carries the state seen by a failed
    /// attempt.
    async fn authorize_write(
        &self,
        caller: Caller<'_>,
        collection: &str,
        id: &str,
        known: Option<bool>,
    ) -> Result<Precondition, DocumentError> {
        let rules = self.rules_for(caller);
        if rules.access(collection, Operation::Create) == rules.access(collection, Operation::Update) {
            self.authorize(caller, collection, Operation::Create).await?;
            return Ok(Precondition::Any);
        }

        let exists = match known {
            Some(exists) => exists,
            None => self.repo.get(collection, id).await?.is_some(),
        };
        if exists {
            self.authorize(caller, collection, Operation::Update).await?;
            Ok(Precondition::Exists)
        } else {
            self.authorize(caller, collection, Operation::Create).await?;
            Ok(Precondition::Missing)
        }
    }

    async fn list_as(
        &self,
        caller: Caller<'_>,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, DocumentError> {
        self.authorize(caller, collection, Operation::Read).await?;
        let docs = self.repo.list(collection).await?;
        Ok(query.apply(docs))
    }

    async fn get_as(
        &self,
        caller: Caller<'_>,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocumentError> {
        self.authorize(caller, collection, Operation::Read).await?;
        validate_name("document", id)?;
        Ok(self.repo.get(collection, id).await?)
    }

    async fn create_as(
        &self,
        caller: Caller<'_>,
        collection: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        self.authorize(caller, collection, Operation::Create).await?;
        let id = Uuid::new_v4().simple().to_string();
        Ok(self.repo.insert(collection, &id, &fields).await?)
    }

    async fn put_as(
        &self,
        caller: Caller<'_>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        validate_name("collection", collection)?;
        validate_name("document", id)?;

        let mut known = None;
        for _ in 0..WRITE_ATTEMPTS {
            let precondition = self.authorize_write(caller, collection, id, known).await?;
            match self.repo.replace(collection, id, &fields, precondition).await? {
                Some(doc) => return Ok(doc),
                None => known = Some(precondition == Precondition::Missing),
            }
        }
        Err(contended(collection, id))
    }

    async fn update_as(
        &self,
        caller: Caller<'_>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        self.authorize(caller, collection, Operation::Update).await?;
        validate_name("document", id)?;
        self.repo
            .merge(collection, id, &fields)
            .await?
            .ok_or_else(|| DocumentError::NotFound(format!("{}/{}", collection, id)))
    }

    async fn delete_as(
        &self,
        caller: Caller<'_>,
        collection: &str,
        id: &str,
    ) -> Result<(), DocumentError> {
        self.authorize(caller, collection, Operation::Delete).await?;
        validate_name("document", id)?;
        self.repo.delete(collection, id).await?;
        Ok(())
    }

    async fn increment_as(
        &self,
        caller: Caller<'_>,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: Fields,
    ) -> Result<i64, DocumentError> {
        validate_name("collection", collection)?;
        validate_name("document", id)?;
        if field.is_empty() {
            return Err(DocumentError::InvalidArgument("Empty field name".to_string()));
        }

        let mut known = None;
        for _ in 0..WRITE_ATTEMPTS {
            let precondition = self.authorize_write(caller, collection, id, known).await?;
            let result = self
                .repo
                .increment(collection, id, field, delta, &defaults, precondition)
                .await?;
            match result {
                Some(value) => return Ok(value),
                None => known = Some(precondition == Precondition::Missing),
            }
        }
        Err(contended(collection, id))
    }

    /// A counter change creates the counter or updates it
    async fn authorize_counter(
        &self,
        caller: Caller<'_>,
        counter: &CounterChange,
    ) -> Result<(), DocumentError> {
        validate_name("document", &counter.id)?;
        if counter.field.is_empty() {
            return Err(DocumentError::InvalidArgument("Empty field name".to_string()));
        }
        self.authorize(caller, &counter.collection, Operation::Create).await?;
        self.authorize(caller, &counter.collection, Operation::Update).await
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), DocumentError> {
    let valid = !name.is_empty()
        && name.len() <= 100
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DocumentError::InvalidArgument(format!(
            "Invalid {} name: {:?}",
            kind, name
        )))
    }
}

fn contended(collection: &str, id: &str) -> DocumentError {
    tracing::warn!("Gave up writing {}/{} after concurrent changes", collection, id);
    DocumentError::Unavailable(format!("Concurrent writes to {}/{}", collection, id))
}

#[async_trait]
impl DocumentStore for HostedDocumentStore {
    async fn list(
        &self,
        auth: Option<&str>,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, DocumentError> {
        self.list_as(Caller::Bearer(auth), collection, query).await
    }

    async fn get(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocumentError> {
        self.get_as(Caller::Bearer(auth), collection, id).await
    }

    async fn create(
        &self,
        auth: Option<&str>,
        collection: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        self.create_as(Caller::Bearer(auth), collection, fields).await
    }

    async fn put(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        self.put_as(Caller::Bearer(auth), collection, id, fields).await
    }

    async fn update(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, DocumentError> {
        self.update_as(Caller::Bearer(auth), collection, id, fields).await
    }

    async fn delete(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
    ) -> Result<(), DocumentError> {
        self.delete_as(Caller::Bearer(auth), collection, id).await
    }

    async fn increment(
        &self,
        auth: Option<&str>,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: Fields,
    ) -> Result<i64, DocumentError> {
        self.increment_as(Caller::Bearer(auth), collection, id, field, delta, defaults)
            .await
    }
}

/// Server-held handle for writes made on a visitor's behalf, such as new
/// comments and likes. Checked against the site rule table; it can never do
/// what that table reserves for admins.
#[derive(Clone)]
pub struct SiteCollections {
    store: Arc<HostedDocumentStore>,
}

#[async_trait]
impl Collections for SiteCollections {
    async fn list(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DocumentError> {
        self.store.list_as(Caller::Site, collection, query).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, DocumentError> {
        self.store.get_as(Caller::Site, collection, id).await
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<Document, DocumentError> {
        self.store.create_as(Caller::Site, collection, fields).await
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, DocumentError> {
        self.store.put_as(Caller::Site, collection, id, fields).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, DocumentError> {
        self.store.update_as(Caller::Site, collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DocumentError> {
        self.store.delete_as(Caller::Site, collection, id).await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        defaults: Fields,
    ) -> Result<i64, DocumentError> {
        self.store
            .increment_as(Caller::Site, collection, id, field, delta, defaults)
            .await
    }
}

#[async_trait]
impl CountedCollections for SiteCollections {
    async fn create_counted(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        counter: CounterChange,
    ) -> Result<Option<i64>, DocumentError> {
        self.store.authorize(Caller::Site, collection, Operation::Create).await?;
        validate_name("document", id)?;
        self.store.authorize_counter(Caller::Site, &counter).await?;
        Ok(self
            .store
            .repo
            .insert_counted(collection, id, &fields, &counter)
            .await?)
    }

    async fn delete_counted(
        &self,
        collection: &str,
        id: &str,
        counter: CounterChange,
    ) -> Result<Option<i64>, DocumentError> {
        self.store.authorize(Caller::Site, collection, Operation::Delete).await?;
        validate_name("document", id)?;
        self.store.authorize_counter(Caller::Site, &counter).await?;
        Ok(self.store.repo.delete_counted(collection, id, &counter).await?)
    }
}
