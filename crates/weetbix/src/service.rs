//! Weetbix 业务逻辑
//!
//! Rules、Clusters、Projects、TestHistory 四个服务共用一个 [`WeetbixService`]。
//! 项目级权限在 `{project}:@project` 上检查，测试历史在子 realm 上检查。

use std::sync::Arc;

use chrono::Utc;
use fleet_common::config::WeetbixConfig;
use fleet_common::pagination::default_page_size;
use fleet_common::realm::project_realm;
use fleet_common::{Authorizer, Caller, Datastore};
use fleet_proto::time::to_timestamp;
use fleet_proto::weetbix::{
    BatchGetClustersRequest, BatchGetClustersResponse, ClusterRequest, ClusterResponse,
    ClusteringVersion, CreateRuleRequest, GetProjectConfigRequest, GetRuleRequest,
    ListProjectsRequest, ListProjectsResponse, ListRulesRequest, ListRulesResponse,
    LookupBugRequest, LookupBugResponse, ProjectConfig, QueryTestHistoryRequest,
    QueryTestHistoryResponse, QueryTestHistoryStatsRequest, QueryTestHistoryStatsResponse,
    QueryVariantsRequest, QueryVariantsResponse, Rule, TestVerdictPredicate, UpdateRuleRequest,
};
use tracing::debug;

use crate::clustering::{ALGORITHMS_VERSION, AlgorithmRegistry, RulesAlgorithm, rules as rules_alg};
use crate::clusters::{ClusterSummaries, cluster_results};
use crate::error::{WeetbixError, WeetbixResult};
use crate::ingest::Ingester;
use crate::names::{
    is_rule_id, parse_cluster_name, parse_project_config_name, parse_project_name,
    parse_rule_name, rule_name, validate_project,
};
use crate::perms;
use crate::projects::ProjectsRepository;
use crate::rules::{NewRule, RulesRepository, validate_bug};
use crate::testhistory::{self, SubRealms};

#[derive(Clone, Debug)]
pub struct WeetbixService {
    authorizer: Authorizer,
    rules: RulesRepository,
    projects: ProjectsRepository,
    registry: Arc<AlgorithmRegistry>,
    summaries: ClusterSummaries,
    ingester: Ingester,
    store: Datastore,
    config: WeetbixConfig,
}

fn page_size(requested: i32) -> WeetbixResult<usize> {
    default_page_size(requested).map_err(|s| WeetbixError::invalid(s.message()))
}

fn user_of(caller: &Caller) -> String {
    caller.email().unwrap_or(caller.identity()).to_string()
}

fn new_rule_from(rule: &Rule) -> NewRule {
    NewRule {
        rule_definition: rule.rule_definition.clone(),
        bug: rule.bug.clone(),
        is_active: rule.is_active,
        is_managing_bug: rule.is_managing_bug,
        source_cluster: rule.source_cluster.clone(),
    }
}

impl WeetbixService {
    pub fn new(store: Datastore, config: WeetbixConfig) -> Self {
        let registry = Arc::new(AlgorithmRegistry::new());
        Self {
            authorizer: Authorizer::new(store.clone()),
            rules: RulesRepository::new(store.clone()),
            projects: ProjectsRepository::new(store.clone()),
            summaries: ClusterSummaries::new(store.clone(), registry.clone()),
            ingester: Ingester::new(store.clone(), registry.clone()),
            registry,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Datastore {
        &self.store
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn rules(&self) -> &RulesRepository {
        &self.rules
    }

    pub fn projects(&self) -> &ProjectsRepository {
        &self.projects
    }

    pub fn ingester(&self) -> &Ingester {
        &self.ingester
    }

    async fn check(&self, caller: &Caller, permission: &str, project: &str) -> WeetbixResult<()> {
        self.authorizer
            .check_permission(caller, permission, &project_realm(project))
            .await?;
        Ok(())
    }

    async fn can_read_definition(&self, caller: &Caller, project: &str) -> WeetbixResult<bool> {
        Ok(self
            .authorizer
            .has_permission(caller, perms::GET_RULE_DEFINITION, &project_realm(project))
            .await?)
    }

    // ---- Rules ----

    pub async fn get_rule(&self, caller: &Caller, req: GetRuleRequest) -> WeetbixResult<Rule> {
        let (project, rule_id) = parse_rule_name(&req.name)?;
        self.check(caller, perms::GET_RULE, &project).await?;
        let include_definition = self.can_read_definition(caller, &project).await?;
        Ok(self.rules.get(&project, &rule_id).await?.to_rule(include_definition))
    }

    pub async fn list_rules(&self, caller: &Caller, req: ListRulesRequest) -> WeetbixResult<ListRulesResponse> {
        let project = parse_project_name(&req.parent)?;
        self.check(caller, perms::LIST_RULES, &project).await?;
        let include_definition = self.can_read_definition(caller, &project).await?;
        let rules = self
            .rules
            .list(&project)
            .await?
            .iter()
            .map(|r| r.to_rule(include_definition))
            .collect();
        Ok(ListRulesResponse { rules })
    }

    pub async fn create_rule(&self, caller: &Caller, req: CreateRuleRequest) -> WeetbixResult<Rule> {
        let project = parse_project_name(&req.parent)?;
        self.check(caller, perms::CREATE_RULE, &project).await?;
        self.check(caller, perms::GET_RULE_DEFINITION, &project).await?;
        let rule = req.rule.ok_or_else(|| WeetbixError::invalid("rule: unspecified"))?;
        let created = self
            .rules
            .create(&project, new_rule_from(&rule), &user_of(caller))
            .await?;
        Ok(created.to_rule(true))
    }

    pub async fn update_rule(&self, caller: &Caller, req: UpdateRuleRequest) -> WeetbixResult<Rule> {
        let rule = req.rule.ok_or_else(|| WeetbixError::invalid("rule: unspecified"))?;
        let (project, rule_id) = parse_rule_name(&rule.name)?;
        self.check(caller, perms::UPDATE_RULE, &project).await?;
        self.check(caller, perms::GET_RULE_DEFINITION, &project).await?;
        let paths = req.update_mask.map(|m| m.paths).unwrap_or_default();
        let updated = self
            .rules
            .update(
                &project,
                &rule_id,
                new_rule_from(&rule),
                &paths,
                &req.etag,
                &user_of(caller),
            )
            .await?;
        Ok(updated.to_rule(true))
    }

    /// 查找引用某个 bug 的规则，只返回调用方有权列出的项目中的规则
    pub async fn lookup_bug(&self, caller: &Caller, req: LookupBugRequest) -> WeetbixResult<LookupBugResponse> {
        let bug = fleet_proto::weetbix::AssociatedBug {
            system: req.system.clone(),
            id: req.id.clone(),
            ..Default::default()
        };
        validate_bug(Some(&bug))?;
        let visible = self
            .authorizer
            .realms_with_permission(caller, perms::LIST_RULES)
            .await?;
        let rules = self
            .rules
            .lookup_bug(&req.system, &req.id)
            .await?
            .into_iter()
            .filter(|r| visible.allows(&project_realm(&r.project)))
            .map(|r| rule_name(&r.project, &r.rule_id))
            .collect();
        Ok(LookupBugResponse { rules })
    }

    // ---- Clusters ----

    pub async fn cluster(&self, caller: &Caller, req: ClusterRequest) -> WeetbixResult<ClusterResponse> {
        validate_project(&req.project)?;
        self.check(caller, perms::GET_CLUSTER, &req.project).await?;
        if req.test_results.len() > self.config.max_cluster_request_size {
            return Err(WeetbixError::invalid(format!(
                "test_results: too many test results: at most {} may be clustered in one go",
                self.config.max_cluster_request_size
            )));
        }

        let rules = RulesAlgorithm::new(&self.rules.read_active(&req.project).await?);
        let cluster_results = cluster_results(&self.registry, &rules, &req.test_results);

        let config_version = match self.projects.get(&req.project).await {
            Ok(config) => config.update_time.map(to_timestamp),
            Err(WeetbixError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let rules_version = self.rules.last_updated(&req.project).await?.map(to_timestamp);
        debug!(project = %req.project, results = cluster_results.len(), "clustered test results");
        Ok(ClusterResponse {
            cluster_results,
            clustering_version: Some(ClusteringVersion {
                algorithms_version: ALGORITHMS_VERSION,
                rules_version,
                config_version,
            }),
        })
    }

    pub async fn batch_get_clusters(
        &self,
        caller: &Caller,
        req: BatchGetClustersRequest,
    ) -> WeetbixResult<BatchGetClustersResponse> {
        let project = parse_project_name(&req.parent)?;
        if req.names.len() > self.config.max_batch_get_size {
            return Err(WeetbixError::invalid(format!(
                "names: too many names: at most {} clusters may be retrieved in one go",
                self.config.max_batch_get_size
            )));
        }
        let mut ids = Vec::with_capacity(req.names.len());
        for (i, name) in req.names.iter().enumerate() {
            let (cluster_project, id) = parse_cluster_name(name)
                .map_err(|e| WeetbixError::invalid(format!("names[{i}]: {e}")))?;
            if cluster_project != project {
                return Err(WeetbixError::invalid(format!(
                    "names[{i}]: project must match parent project ({project:?})"
                )));
            }
            ids.push(id);
        }
        self.check(caller, perms::GET_CLUSTER, &project).await?;
        let include_definition = self.can_read_definition(caller, &project).await?;

        let now = Utc::now();
        let mut clusters = Vec::with_capacity(ids.len());
        for id in &ids {
            let rule = if id.algorithm == rules_alg::ALGORITHM_NAME && is_rule_id(&id.id) {
                match self.rules.get(&project, &id.id).await {
                    Ok(rule) => Some(rule),
                    Err(WeetbixError::NotFound(_)) => None,
                    Err(e) => return Err(e),
                }
            } else {
                None
            };
            clusters.push(
                self.summaries
                    .summarize(&project, id, rule.as_ref(), include_definition, now)
                    .await?,
            );
        }
        Ok(BatchGetClustersResponse { clusters })
    }

    // ---- Projects ----

    pub async fn list_projects(
        &self,
        caller: &Caller,
        _req: ListProjectsRequest,
    ) -> WeetbixResult<ListProjectsResponse> {
        let readable = self
            .authorizer
            .realms_with_permission(caller, perms::GET_CONFIG)
            .await?;
        let projects = self
            .projects
            .list()
            .await?
            .iter()
            .filter(|p| readable.allows(&project_realm(&p.project)))
            .map(|p| p.to_project())
            .collect();
        Ok(ListProjectsResponse { projects })
    }

    pub async fn get_project_config(
        &self,
        caller: &Caller,
        req: GetProjectConfigRequest,
    ) -> WeetbixResult<ProjectConfig> {
        let project = parse_project_config_name(&req.name)?;
        self.check(caller, perms::GET_CONFIG, &project).await?;
        Ok(self.projects.get(&project).await?.to_config())
    }

    // ---- TestHistory ----

    /// 调用方可读取测试结果的子 realm
    ///
    /// 指定了子 realm 时只检查该 realm；否则项目根授权可读全部，其余按授权
    /// 列表过滤，一个都没有时拒绝。
    async fn readable_sub_realms(
        &self,
        caller: &Caller,
        project: &str,
        sub_realm: &str,
    ) -> WeetbixResult<SubRealms> {
        if !sub_realm.is_empty() {
            let realm = format!("{project}:{sub_realm}");
            self.authorizer
                .check_permission(caller, perms::LIST_TEST_RESULTS, &realm)
                .await?;
            return Ok(SubRealms::Only(vec![sub_realm.to_string()]));
        }

        let set = self
            .authorizer
            .realms_with_permission(caller, perms::LIST_TEST_RESULTS)
            .await?;
        if set.allows(&fleet_common::realm::root_realm(project)) {
            return Ok(SubRealms::All);
        }
        let prefix = format!("{project}:");
        let realms: Vec<String> = set
            .realms()
            .iter()
            .filter_map(|r| r.strip_prefix(&prefix).map(str::to_string))
            .collect();
        if realms.is_empty() {
            return Err(fleet_common::RealmError::PermissionDenied {
                identity: caller.identity().to_string(),
                permission: perms::LIST_TEST_RESULTS.to_string(),
                realm: format!("{project}:*"),
            }
            .into());
        }
        Ok(SubRealms::Only(realms))
    }

    fn validate_history_request(project: &str, test_id: &str) -> WeetbixResult<()> {
        validate_project(project)?;
        if test_id.is_empty() {
            return Err(WeetbixError::invalid("test_id: unspecified"));
        }
        Ok(())
    }

    pub async fn query_test_history(
        &self,
        caller: &Caller,
        req: QueryTestHistoryRequest,
    ) -> WeetbixResult<QueryTestHistoryResponse> {
        Self::validate_history_request(&req.project, &req.test_id)?;
        let size = page_size(req.page_size)?;
        let predicate = req.predicate.unwrap_or_default();
        let sub_realms = self
            .readable_sub_realms(caller, &req.project, &predicate.sub_realm)
            .await?;
        let query = testhistory::verdict_query(&req.project, &req.test_id, Some(&predicate), &sub_realms)?;
        let (verdicts, next_page_token) =
            testhistory::query_verdicts(&self.store, query, size, &req.page_token).await?;
        Ok(QueryTestHistoryResponse {
            verdicts,
            next_page_token,
        })
    }

    pub async fn query_test_history_stats(
        &self,
        caller: &Caller,
        req: QueryTestHistoryStatsRequest,
    ) -> WeetbixResult<QueryTestHistoryStatsResponse> {
        Self::validate_history_request(&req.project, &req.test_id)?;
        let size = page_size(req.page_size)?;
        let predicate = req.predicate.unwrap_or_default();
        let sub_realms = self
            .readable_sub_realms(caller, &req.project, &predicate.sub_realm)
            .await?;
        let query = testhistory::verdict_query(&req.project, &req.test_id, Some(&predicate), &sub_realms)?;
        let (groups, next_page_token) =
            testhistory::query_stats(&self.store, query, size, &req.page_token).await?;
        Ok(QueryTestHistoryStatsResponse {
            groups,
            next_page_token,
        })
    }

    pub async fn query_variants(
        &self,
        caller: &Caller,
        req: QueryVariantsRequest,
    ) -> WeetbixResult<QueryVariantsResponse> {
        Self::validate_history_request(&req.project, &req.test_id)?;
        let size = page_size(req.page_size)?;
        let sub_realms = self
            .readable_sub_realms(caller, &req.project, &req.sub_realm)
            .await?;
        let predicate = TestVerdictPredicate::default();
        let query = testhistory::verdict_query(&req.project, &req.test_id, Some(&predicate), &sub_realms)?;
        let (variants, next_page_token) =
            testhistory::query_variants(&self.store, query, size, &req.page_token).await?;
        Ok(QueryVariantsResponse {
            variants,
            next_page_token,
        })
    }
}
