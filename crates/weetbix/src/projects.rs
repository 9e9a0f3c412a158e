//! 项目配置

use chrono::{DateTime, Utc};
use fleet_common::{Datastore, Entity, IndexEntry, Query};
use fleet_proto::weetbix::{MonorailProject, Project, ProjectConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{WeetbixError, WeetbixResult};
use crate::names::{project_config_name, project_name, validate_project};

pub const PROJECT_CONFIG_KIND: &str = "ProjectConfig";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectConfigEntity {
    pub project: String,
    pub display_name: String,
    pub monorail_project: String,
    pub monorail_display_prefix: String,
    pub update_time: Option<DateTime<Utc>>,
}

impl ProjectConfigEntity {
    pub fn to_project(&self) -> Project {
        let display_name = if self.display_name.is_empty() {
            self.project.clone()
        } else {
            self.display_name.clone()
        };
        Project {
            name: project_name(&self.project),
            display_name,
            project: self.project.clone(),
        }
    }

    pub fn to_config(&self) -> ProjectConfig {
        let monorail = (!self.monorail_project.is_empty()).then(|| MonorailProject {
            project: self.monorail_project.clone(),
            display_prefix: self.monorail_display_prefix.clone(),
        });
        ProjectConfig {
            name: project_config_name(&self.project),
            monorail,
        }
    }
}

impl Entity for ProjectConfigEntity {
    const KIND: &'static str = PROJECT_CONFIG_KIND;

    fn id(&self) -> String {
        self.project.clone()
    }

    fn index(&self) -> Vec<IndexEntry> {
        Vec::new()
    }
}

#[derive(Clone, Debug)]
pub struct ProjectsRepository {
    store: Datastore,
}

impl ProjectsRepository {
    pub fn new(store: Datastore) -> Self {
        Self { store }
    }

    /// 写入项目配置，更新时间取当前时间
    pub async fn put(&self, mut config: ProjectConfigEntity) -> WeetbixResult<ProjectConfigEntity> {
        validate_project(&config.project)?;
        config.update_time = Some(Utc::now());
        self.store.put(&config).await?;
        info!(project = %config.project, "project config updated");
        Ok(config)
    }

    pub async fn get(&self, project: &str) -> WeetbixResult<ProjectConfigEntity> {
        self.store
            .try_get(project)
            .await?
            .ok_or_else(|| WeetbixError::NotFound(format!("project config for {project}")))
    }

    /// 全部已配置的项目，按名称排序
    pub async fn list(&self) -> WeetbixResult<Vec<ProjectConfigEntity>> {
        Ok(self.store.get_all(&Query::of::<ProjectConfigEntity>()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_list() {
        let repo = ProjectsRepository::new(Datastore::memory());
        repo.put(ProjectConfigEntity {
            project: "chromium".to_string(),
            display_name: "Chromium".to_string(),
            monorail_project: "chromium".to_string(),
            monorail_display_prefix: "crbug.com".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        repo.put(ProjectConfigEntity {
            project: "chrome".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        let projects: Vec<_> = repo.list().await.unwrap().iter().map(|p| p.to_project()).collect();
        assert_eq!(projects[0].name, "projects/chrome");
        assert_eq!(projects[0].display_name, "chrome");
        assert_eq!(projects[1].display_name, "Chromium");

        let config = repo.get("chromium").await.unwrap().to_config();
        assert_eq!(config.name, "projects/chromium/config");
        assert_eq!(config.monorail.unwrap().display_prefix, "crbug.com");
        assert!(repo.get("chrome").await.unwrap().to_config().monorail.is_none());
        assert!(matches!(repo.get("v8").await, Err(WeetbixError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_project_rejected() {
        let repo = ProjectsRepository::new(Datastore::memory());
        let err = repo
            .put(ProjectConfigEntity {
                project: "Not Valid".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WeetbixError::InvalidArgument(_)));
    }
}
