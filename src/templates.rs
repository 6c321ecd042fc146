//! Template management and latest-version resolution.
//!
//! Versions are append-only: creating a template stores version 1, and every
//! content update appends `max + 1`. Templates owned by another caller are
//! reported as [`PipelineError::TemplateNotFound`], never as forbidden.

use crate::error::Result;
use crate::store::TemplateStore;
use crate::types::{ResolvedTemplate, Template, TemplateVersion, UserId};
use crate::PipelineError;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Request to create a template.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub content: String,
}

/// Partial update. `content` appends a new version; the others edit in place.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
}

/// Owner-scoped template operations.
#[derive(Clone)]
pub struct TemplateService {
    store: Arc<dyn TemplateStore>,
}

impl std::fmt::Debug for TemplateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateService").finish_non_exhaustive()
    }
}

impl TemplateService {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, caller: UserId, request: NewTemplate) -> Result<Template> {
        validate_name(&request.name)?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let template = Template {
            id,
            owner: caller,
            name: request.name,
            description: request.description,
            versions: vec![TemplateVersion {
                id: Uuid::new_v4(),
                template_id: id,
                version_number: 1,
                content: request.content,
                created_at: now,
            }],
            created_at: now,
            updated_at: None,
        };

        self.store.insert_template(template.clone()).await?;
        tracing::info!("Template created: {} ({})", template.name, template.id);
        Ok(template)
    }

    /// Fetch a template visible to `caller`.
    pub async fn get(&self, id: Uuid, caller: UserId) -> Result<Template> {
        self.store
            .find_template(id)
            .await?
            .filter(|t| t.owner == caller)
            .ok_or(PipelineError::TemplateNotFound)
    }

    /// Page through the caller's templates. Returns `(page, total)`.
    pub async fn list(&self, caller: UserId, skip: usize, limit: usize) -> Result<(Vec<Template>, usize)> {
        let all = self.store.list_templates(caller).await?;
        let total = all.len();
        let page = all.into_iter().skip(skip).take(limit).collect();
        Ok((page, total))
    }

    /// Apply a partial update.
    ///
    /// Content is appended through [`TemplateStore::append_version`], which
    /// numbers the version inside the store's own write, so concurrent
    /// updates each get a distinct version and none is lost.
    pub async fn update(&self, id: Uuid, caller: UserId, update: TemplateUpdate) -> Result<Template> {
        let current = self.get(id, caller).await?;
        let now = Utc::now();

        if update.name.is_some() || update.description.is_some() {
            let name = match update.name {
                Some(name) => {
                    validate_name(&name)?;
                    name
                }
                None => current.name,
            };
            let description = update.description.or(current.description);
            if !self
                .store
                .update_template_details(id, name, description, now)
                .await?
            {
                return Err(PipelineError::TemplateNotFound);
            }
        }

        if let Some(content) = update.content {
            let version = self
                .store
                .append_version(id, content, now)
                .await?
                .ok_or(PipelineError::TemplateNotFound)?;
            tracing::debug!("Template {} now at version {}", id, version.version_number);
        }

        self.get(id, caller).await
    }

    /// All versions, highest version number first.
    pub async fn versions(&self, id: Uuid, caller: UserId) -> Result<Vec<TemplateVersion>> {
        let template = self.get(id, caller).await?;
        let mut versions = template.versions;
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    /// Returns `false` if the template was absent or not owned by `caller`.
    pub async fn delete(&self, id: Uuid, caller: UserId) -> Result<bool> {
        match self.get(id, caller).await {
            Ok(_) => {}
            Err(PipelineError::TemplateNotFound) => return Ok(false),
            Err(e) => return Err(e),
        }
        let deleted = self.store.delete_template(id).await?;
        if deleted {
            tracing::info!("Template deleted: {}", id);
        }
        Ok(deleted)
    }

    /// Resolve the content of the latest version of a template.
    pub async fn resolve_latest(&self, id: Uuid, caller: UserId) -> Result<ResolvedTemplate> {
        let template = self.get(id, caller).await?;
        let latest = template
            .latest_version()
            .ok_or(PipelineError::TemplateHasNoVersions(template.id))?;
        Ok(ResolvedTemplate {
            template_id: template.id,
            version_id: latest.id,
            version_number: latest.version_number,
            content: latest.content.clone(),
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PipelineError::Validation(
            "Template name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> (TemplateService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TemplateService::new(store.clone()), store)
    }

    fn new_template(content: &str) -> NewTemplate {
        NewTemplate {
            name: "Greeting".into(),
            description: Some("Says hello".into()),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn test_create_starts_at_version_one() {
        let (svc, _) = service();
        let owner = Uuid::new_v4();
        let template = svc.create(owner, new_template("Hello {{name}}")).await.unwrap();
        assert_eq!(template.versions.len(), 1);
        assert_eq!(template.latest_version().unwrap().version_number, 1);

        let resolved = svc.resolve_latest(template.id, owner).await.unwrap();
        assert_eq!(resolved.version_number, 1);
        assert_eq!(resolved.content, "Hello {{name}}");
    }

    #[tokio::test]
    async fn test_content_updates_append_versions() {
        let (svc, _) = service();
        let owner = Uuid::new_v4();
        let template = svc.create(owner, new_template("v1")).await.unwrap();

        for content in ["v2", "v3"] {
            svc.update(
                template.id,
                owner,
                TemplateUpdate {
                    content: Some(content.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let resolved = svc.resolve_latest(template.id, owner).await.unwrap();
        assert_eq!(resolved.version_number, 3);
        assert_eq!(resolved.content, "v3");

        let numbers: Vec<u32> = svc
            .versions(template.id, owner)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_metadata_update_does_not_add_version() {
        let (svc, _) = service();
        let owner = Uuid::new_v4();
        let template = svc.create(owner, new_template("v1")).await.unwrap();
        let updated = svc
            .update(
                template.id,
                owner,
                TemplateUpdate {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.versions.len(), 1);
        assert!(updated.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_other_owner_sees_not_found() {
        let (svc, _) = service();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let template = svc.create(owner, new_template("x")).await.unwrap();

        let err = svc.resolve_latest(template.id, stranger).await.unwrap_err();
        assert!(matches!(err, PipelineError::TemplateNotFound));
        assert!(!svc.delete(template.id, stranger).await.unwrap());
        assert!(svc.get(template.id, owner).await.is_ok());
    }

    #[tokio::test]
    async fn test_template_without_versions_is_reported() {
        let (svc, store) = service();
        let owner = Uuid::new_v4();
        let template = Template {
            id: Uuid::new_v4(),
            owner,
            name: "broken".into(),
            description: None,
            versions: vec![],
            created_at: Utc::now(),
            updated_at: None,
        };
        store.insert_template(template.clone()).await.unwrap();

        let err = svc.resolve_latest(template.id, owner).await.unwrap_err();
        assert!(matches!(err, PipelineError::TemplateHasNoVersions(id) if id == template.id));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (svc, _) = service();
        let mut request = new_template("x");
        request.name = "  ".into();
        let err = svc.create(Uuid::new_v4(), request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let (svc, _) = service();
        let owner = Uuid::new_v4();
        for _ in 0..3 {
            svc.create(owner, new_template("x")).await.unwrap();
        }
        svc.create(Uuid::new_v4(), new_template("other")).await.unwrap();

        let (page, total) = svc.list(owner, 1, 5).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
    }

    /// Yields before every read, as a networked store would between a
    /// request and its reply.
    struct YieldingStore {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl TemplateStore for YieldingStore {
        async fn insert_template(&self, template: Template) -> Result<()> {
            self.inner.insert_template(template).await
        }

        async fn update_template_details(
            &self,
            id: Uuid,
            name: String,
            description: Option<String>,
            updated_at: chrono::DateTime<Utc>,
        ) -> Result<bool> {
            self.inner
                .update_template_details(id, name, description, updated_at)
                .await
        }

        async fn append_version(
            &self,
            template_id: Uuid,
            content: String,
            created_at: chrono::DateTime<Utc>,
        ) -> Result<Option<TemplateVersion>> {
            self.inner.append_version(template_id, content, created_at).await
        }

        async fn find_template(&self, id: Uuid) -> Result<Option<Template>> {
            tokio::task::yield_now().await;
            self.inner.find_template(id).await
        }

        async fn list_templates(&self, owner: UserId) -> Result<Vec<Template>> {
            self.inner.list_templates(owner).await
        }

        async fn delete_template(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_template(id).await
        }
    }

    fn content(text: &str) -> TemplateUpdate {
        TemplateUpdate {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_concurrent_content_updates_keep_every_version() {
        let svc = TemplateService::new(Arc::new(YieldingStore {
            inner: MemoryStore::new(),
        }));
        let owner = Uuid::new_v4();
        let template = svc.create(owner, new_template("v1")).await.unwrap();

        let (a, b) = tokio::join!(
            svc.update(template.id, owner, content("A")),
            svc.update(template.id, owner, content("B")),
        );
        a.unwrap();
        b.unwrap();

        let mut versions: Vec<(u32, String)> = svc
            .versions(template.id, owner)
            .await
            .unwrap()
            .into_iter()
            .map(|v| (v.version_number, v.content))
            .collect();
        assert_eq!(versions.len(), 3);
        assert_eq!(versions.pop(), Some((1, "v1".to_string())));
        let numbers: Vec<u32> = versions.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![3, 2]);
        let mut contents: Vec<&str> = versions.iter().map(|(_, c)| c.as_str()).collect();
        contents.sort();
        assert_eq!(contents, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_rename_during_content_update_keeps_version() {
        let svc = TemplateService::new(Arc::new(YieldingStore {
            inner: MemoryStore::new(),
        }));
        let owner = Uuid::new_v4();
        let template = svc.create(owner, new_template("v1")).await.unwrap();

        let rename = TemplateUpdate {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let (a, b) = tokio::join!(
            svc.update(template.id, owner, rename),
            svc.update(template.id, owner, content("v2")),
        );
        a.unwrap();
        b.unwrap();

        let stored = svc.get(template.id, owner).await.unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.description.as_deref(), Some("Says hello"));
        assert_eq!(stored.latest_version().unwrap().content, "v2");
    }
}
