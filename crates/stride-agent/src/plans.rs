//! Per-user storage of generated plans and reports

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Keyed persistence for textual artifacts, one slot per (user, plan type)
#[async_trait]
pub trait PlanStorage: Send + Sync {
    async fn load_plan(&self, user_id: &str, plan_type: &str) -> Result<Option<String>>;
    async fn save_plan(&self, user_id: &str, plan_type: &str, content: &str) -> Result<()>;
}

/// Stores each plan as `<base>/<user>/<plan_type>.md`
pub struct FilePlanStorage {
    base_dir: PathBuf,
}

/// Keep ASCII alphanumerics, `_` and `-`
fn sanitize(component: &str) -> String {
    component
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl FilePlanStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path a plan is stored at
    pub fn plan_path(&self, user_id: &str, plan_type: &str) -> Result<PathBuf> {
        let user = sanitize(user_id);
        let plan = sanitize(plan_type);
        if user.is_empty() || plan.is_empty() {
            return Err(Error::Other(format!(
                "invalid plan key: user '{user_id}', plan type '{plan_type}'"
            )));
        }
        Ok(self.base_dir.join(user).join(format!("{plan}.md")))
    }
}

#[async_trait]
impl PlanStorage for FilePlanStorage {
    async fn load_plan(&self, user_id: &str, plan_type: &str) -> Result<Option<String>> {
        let path = self.plan_path(user_id, plan_type)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                tracing::info!("Loading {} for user {} from {}", plan_type, user_id, path.display());
                Ok(Some(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_plan(&self, user_id: &str, plan_type: &str, content: &str) -> Result<()> {
        let path = self.plan_path(user_id, plan_type)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::info!("Saved {} for user {} to {}", plan_type, user_id, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilePlanStorage::new(dir.path());

        assert!(storage.load_plan("u1", "season_plan").await.unwrap().is_none());
        storage.save_plan("u1", "season_plan", "# Plan").await.unwrap();
        assert_eq!(
            storage.load_plan("u1", "season_plan").await.unwrap().as_deref(),
            Some("# Plan")
        );
        assert!(dir.path().join("u1").join("season_plan.md").exists());
    }

    #[test]
    fn test_plan_type_sanitized() {
        let storage = FilePlanStorage::new("/base");
        let path = storage.plan_path("u1", "../../etc/passwd").unwrap();
        assert_eq!(path, PathBuf::from("/base/u1/etcpasswd.md"));
        assert!(storage.plan_path("u1", "../..").is_err());
    }
}
