use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError(pub String);

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for RepositoryError {}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        EngineError::Repository(e.0)
    }
}

/// Vendor application storage. Owned by an external service; the engine only
/// reads applications and drives status transitions through it.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn find_by_booth(&self, booth_id: Ulid) -> Result<Vec<VendorApplication>, RepositoryError>;

    async fn get(&self, id: Ulid) -> Result<Option<VendorApplication>, RepositoryError>;

    async fn insert(&self, application: VendorApplication) -> Result<(), RepositoryError>;

    async fn update_status(&self, id: Ulid, status: ApplicationStatus) -> Result<(), RepositoryError>;
}

/// Process-local repository used by the standalone server and tests.
pub struct InMemoryApplications {
    applications: DashMap<Ulid, VendorApplication>,
    /// booth id → application ids, insertion order
    by_booth: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryApplications {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryApplications {
    pub fn new() -> Self {
        Self {
            applications: DashMap::new(),
            by_booth: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryApplications {
    async fn find_by_booth(&self, booth_id: Ulid) -> Result<Vec<VendorApplication>, RepositoryError> {
        let ids = self
            .by_booth
            .get(&booth_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.applications.get(id).map(|e| e.value().clone()))
            .collect())
    }

    async fn get(&self, id: Ulid) -> Result<Option<VendorApplication>, RepositoryError> {
        Ok(self.applications.get(&id).map(|e| e.value().clone()))
    }

    async fn insert(&self, application: VendorApplication) -> Result<(), RepositoryError> {
        if self.applications.contains_key(&application.id) {
            return Err(RepositoryError(format!("application {} already exists", application.id)));
        }
        if let Some(booth_id) = application.booth_id {
            self.by_booth.entry(booth_id).or_default().push(application.id);
        }
        self.applications.insert(application.id, application);
        Ok(())
    }

    async fn update_status(&self, id: Ulid, status: ApplicationStatus) -> Result<(), RepositoryError> {
        match self.applications.get_mut(&id) {
            Some(mut app) => {
                app.status = status;
                Ok(())
            }
            None => Err(RepositoryError(format!("application {id} not found"))),
        }
    }
}
