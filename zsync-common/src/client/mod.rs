//! Remote tracker client.
//!
//! Thin, idempotent operations over the issue tracker's REST API and the
//! test-management add-on layered on it. Every operation is a small number
//! of request/response pairs; nothing is cached here (caching lives in
//! [`ContextStore`](crate::ContextStore)).

mod transport;

pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport, TransportError, UreqTransport,
    encode_multipart,
};

use crate::errors::ErrorCode;
use crate::types::ExecutionStatus;
use crate::util::{jql_escape, mask_secret, truncate_comment};
use base64::Engine as _;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Issue type used for test issues.
pub const ISSUE_TYPE_NAME: &str = "Test";

/// Link type used for related issues.
pub const RELATES_LINK: &str = "Relates";

/// Version id used when no version is configured.
pub const NO_VERSION: &str = "-1";

/// Tracker response to an edit of a closed issue.
pub const CLOSED_ISSUE_MESSAGE: &str = "You do not have permission to edit issues in this project.";

/// Tracker location and basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(base_url: &str, user: &str, password: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn basic_auth(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.user, self.password));
        format!("Basic {token}")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &mask_secret(&self.password))
            .finish()
    }
}

/// Attachment target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Execution,
    StepResult,
}

impl EntityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Execution => "EXECUTION",
            Self::StepResult => "TESTSTEPRESULT",
        }
    }
}

/// Fields for [`TrackerClient::find_or_create_issue`].
#[derive(Debug, Clone, Copy)]
pub struct IssueSpec<'a> {
    pub project_key: &'a str,
    /// Explicit key; skips the custom-field search.
    pub issue_key: Option<&'a str>,
    pub summary: &'a str,
    pub description: &'a str,
    /// Numeric id of the identity custom field.
    pub custom_field: &'a str,
    pub custom_field_value: &'a str,
    pub components: &'a [String],
}

/// Fields for [`TrackerClient::reconcile_execution`].
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSpec<'a> {
    pub project_id: &'a str,
    pub version_id: &'a str,
    pub cycle_id: &'a str,
    pub issue_id: &'a str,
    pub status: ExecutionStatus,
    pub comment: &'a str,
    /// Keep the existing execution (and its step results) instead of
    /// recreating it.
    pub skip_steps: bool,
}

/// An outward "Relates" link of an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueLink {
    pub id: String,
    pub issue_key: String,
}

/// Outcome of [`TrackerClient::update_links`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkUpdate {
    pub created: Vec<String>,
    /// Targets that do not exist (404 on creation).
    pub missing: Vec<String>,
}

/// Render a JSON id (number or string) as a string.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Client for the tracker REST API. Cheap to clone.
#[derive(Clone)]
pub struct TrackerClient {
    credentials: Arc<Credentials>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for TrackerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerClient")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl TrackerClient {
    pub fn new(credentials: Credentials, transport: Arc<dyn Transport>) -> Self {
        Self {
            credentials: Arc::new(credentials),
            transport,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<RequestBody>,
        extra_headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let mut headers = vec![
            ("Authorization".to_string(), self.credentials.basic_auth()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        headers.extend(
            extra_headers
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string())),
        );
        let request = HttpRequest {
            method,
            url: format!("{}{}", self.credentials.base_url, path),
            headers,
            body,
        };

        let response = self.transport.execute(&request)?;
        debug!(%method, path, status = response.status, "tracker request");

        match response.status {
            200..=299 => Ok(response),
            403 | 405 => Err(TransportError::LicenseExpired {
                method,
                path: path.to_string(),
                status: response.status,
            }),
            status => Err(TransportError::Http {
                method,
                path: path.to_string(),
                status,
                body: response.body,
            }),
        }
    }

    fn call(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let response = self.request(method, path, body.map(RequestBody::Json), &[])?;
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|err| TransportError::Decode {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.call(HttpMethod::Get, path, None)
    }

    fn required_id(value: &Value, field: &str, path: &str) -> Result<String, TransportError> {
        id_string(&value[field]).ok_or_else(|| TransportError::Decode {
            path: path.to_string(),
            message: format!("missing '{field}' in response"),
        })
    }

    // ---------------------------------------------------------------------
    // Projects and versions
    // ---------------------------------------------------------------------

    /// Resolve a project name to its key.
    pub fn project_key_by_name(&self, name: &str) -> Result<Option<String>, TransportError> {
        let projects = self.get("/rest/api/2/project")?;
        Ok(projects.as_array().and_then(|projects| {
            projects
                .iter()
                .find(|project| project["name"].as_str() == Some(name))
                .and_then(|project| project["key"].as_str().map(str::to_string))
        }))
    }

    pub fn project_id(&self, project_key: &str) -> Result<String, TransportError> {
        let path = format!("/rest/api/2/project/{project_key}");
        let project = self.get(&path)?;
        Self::required_id(&project, "id", &path)
    }

    pub fn version_id(
        &self,
        project_key: &str,
        version: &str,
    ) -> Result<Option<String>, TransportError> {
        let versions = self.get(&format!("/rest/api/2/project/{project_key}/versions"))?;
        Ok(versions.as_array().and_then(|versions| {
            versions
                .iter()
                .find(|v| v["name"].as_str() == Some(version))
                .and_then(|v| id_string(&v["id"]))
        }))
    }

    // ---------------------------------------------------------------------
    // Issues
    // ---------------------------------------------------------------------

    /// Search a test issue by its identity custom field.
    pub fn find_issue(
        &self,
        project_key: &str,
        custom_field: &str,
        value: &str,
    ) -> Result<Option<String>, TransportError> {
        let jql = format!(
            "issuetype={ISSUE_TYPE_NAME} AND cf[{custom_field}]~'{}' AND project={project_key}",
            jql_escape(value)
        );
        let path = format!(
            "/rest/api/2/search/?fields=id&jql={}",
            urlencoding::encode(&jql)
        );
        info!(project_key, value, "searching test issue");
        let found = self.get(&path)?;
        if found["total"].as_u64().unwrap_or(0) == 0 {
            return Ok(None);
        }
        Ok(found["issues"][0]["key"].as_str().map(str::to_string))
    }

    /// Create the issue or update an existing one; returns its key.
    ///
    /// Summary and description are sent only on creation.
    pub fn find_or_create_issue(&self, spec: &IssueSpec<'_>) -> Result<String, TransportError> {
        let identity = spec.custom_field_value.replace('\\', "/");
        let existing = match spec.issue_key.filter(|key| !key.is_empty()) {
            Some(key) => Some(key.to_string()),
            None => self.find_issue(spec.project_key, spec.custom_field, &identity)?,
        };

        let components: Vec<Value> = spec
            .components
            .iter()
            .map(|name| json!({ "name": name }))
            .collect();
        let mut fields = json!({
            "project": { "key": spec.project_key },
            "components": components,
            "issuetype": { "name": ISSUE_TYPE_NAME },
        });
        fields[format!("customfield_{}", spec.custom_field)] = Value::String(identity);

        match existing {
            Some(key) => {
                info!(issue = %key, "updating test issue");
                let path = format!("/rest/api/2/issue/{key}");
                match self.call(HttpMethod::Put, &path, Some(json!({ "fields": fields }))) {
                    Ok(_) => Ok(key),
                    Err(TransportError::Http {
                        status: 400, body, ..
                    }) if body.contains(CLOSED_ISSUE_MESSAGE) => {
                        warn!(
                            code = %ErrorCode::SyncIssueClosed.code_string(),
                            issue = %key,
                            "issue is probably closed and cannot be updated"
                        );
                        Ok(key)
                    }
                    Err(err) => Err(err),
                }
            }
            None => {
                fields["summary"] = Value::String(spec.summary.to_string());
                fields["description"] = Value::String(spec.description.to_string());
                let path = "/rest/api/2/issue/";
                let created = self.call(HttpMethod::Post, path, Some(json!({ "fields": fields })))?;
                let key = created["key"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| TransportError::Decode {
                        path: path.to_string(),
                        message: "missing 'key' in response".into(),
                    })?;
                info!(issue = %key, "test issue created");
                Ok(key)
            }
        }
    }

    pub fn issue_id(&self, issue_key: &str) -> Result<String, TransportError> {
        let path = format!("/rest/api/2/issue/{issue_key}");
        let issue = self.get(&path)?;
        Self::required_id(&issue, "id", &path)
    }

    // ---------------------------------------------------------------------
    // Links
    // ---------------------------------------------------------------------

    /// Outward "Relates" links of an issue.
    pub fn issue_links(&self, issue_key: &str) -> Result<Vec<IssueLink>, TransportError> {
        let issue = self.get(&format!("/rest/api/2/issue/{issue_key}?fields=issuelinks"))?;
        let links = issue["fields"]["issuelinks"]
            .as_array()
            .map(|links| {
                links
                    .iter()
                    .filter(|link| link["type"]["name"].as_str() == Some(RELATES_LINK))
                    .filter_map(|link| {
                        Some(IssueLink {
                            id: id_string(&link["id"])?,
                            issue_key: link["outwardIssue"]["key"].as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(links)
    }

    pub fn delete_link(&self, link_id: &str) -> Result<(), TransportError> {
        self.call(
            HttpMethod::Delete,
            &format!("/rest/api/2/issueLink/{link_id}"),
            None,
        )?;
        debug!(link_id, "issue link deleted");
        Ok(())
    }

    /// Create the missing "Relates" links from `issue_key` to `related`.
    pub fn update_links(
        &self,
        issue_key: &str,
        related: &[String],
    ) -> Result<LinkUpdate, TransportError> {
        let mut update = LinkUpdate::default();
        if related.is_empty() {
            debug!(issue = issue_key, "no links requested");
            return Ok(update);
        }

        let existing = self.issue_links(issue_key)?;
        for target in related {
            let already_linked = existing.iter().any(|link| &link.issue_key == target)
                || update.created.contains(target);
            if already_linked {
                continue;
            }
            let body = json!({
                "type": { "name": RELATES_LINK },
                "inwardIssue": { "key": issue_key },
                "outwardIssue": { "key": target },
            });
            match self.call(HttpMethod::Post, "/rest/api/2/issueLink/", Some(body)) {
                Ok(_) => update.created.push(target.clone()),
                Err(TransportError::Http { status: 404, .. }) => {
                    info!(issue = issue_key, target = %target, "linked issue not found, skipping");
                    update.missing.push(target.clone());
                }
                Err(err) => return Err(err),
            }
        }
        info!(issue = issue_key, created = update.created.len(), "links updated");
        Ok(update)
    }

    // ---------------------------------------------------------------------
    // Cycles
    // ---------------------------------------------------------------------

    pub fn find_cycle(
        &self,
        project_id: &str,
        version_id: &str,
        name: &str,
    ) -> Result<Option<String>, TransportError> {
        let cycles = self.get(&format!(
            "/rest/zapi/latest/cycle?projectId={project_id}&versionId={version_id}"
        ))?;
        Ok(cycles.as_object().and_then(|cycles| {
            cycles
                .iter()
                .filter(|(id, _)| id.as_str() != "recordsCount")
                .find(|(_, cycle)| cycle["name"].as_str() == Some(name))
                .map(|(id, _)| id.clone())
        }))
    }

    pub fn find_or_create_cycle(
        &self,
        project_id: &str,
        version_id: &str,
        name: &str,
    ) -> Result<String, TransportError> {
        if let Some(id) = self.find_cycle(project_id, version_id, name)? {
            debug!(cycle_id = %id, name, "found test cycle");
            return Ok(id);
        }
        let path = "/rest/zapi/latest/cycle";
        let created = self.call(
            HttpMethod::Post,
            path,
            Some(json!({ "name": name, "projectId": project_id, "versionId": version_id })),
        )?;
        let id = Self::required_id(&created, "id", path)?;
        info!(cycle_id = %id, name, "test cycle created");
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Executions
    // ---------------------------------------------------------------------

    /// Execution of `issue_id` in the given cycle/version, with its current
    /// remote status code.
    pub fn find_execution(
        &self,
        cycle_id: &str,
        version_id: &str,
        issue_id: &str,
    ) -> Result<Option<(String, i64)>, TransportError> {
        let found = self.get(&format!("/rest/zapi/latest/execution?issueId={issue_id}"))?;
        let Some(executions) = found["executions"].as_array() else {
            return Ok(None);
        };
        Ok(executions
            .iter()
            .find(|e| {
                id_string(&e["cycleId"]).as_deref() == Some(cycle_id)
                    && id_string(&e["versionId"]).as_deref() == Some(version_id)
            })
            .and_then(|e| {
                let id = id_string(&e["id"])?;
                let status = id_string(&e["executionStatus"])
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(ExecutionStatus::Unexecuted.remote_code());
                Some((id, status))
            }))
    }

    pub fn delete_execution(&self, execution_id: &str) -> Result<(), TransportError> {
        self.call(
            HttpMethod::Delete,
            &format!("/rest/zapi/latest/execution/{execution_id}"),
            None,
        )?;
        info!(execution_id, "test execution deleted");
        Ok(())
    }

    fn execute(&self, execution_id: &str, status: i64, comment: &str) -> Result<(), TransportError> {
        self.call(
            HttpMethod::Put,
            &format!("/rest/zapi/latest/execution/{execution_id}/execute"),
            Some(json!({ "status": status, "comment": comment })),
        )?;
        Ok(())
    }

    /// Bring the execution of an issue in a cycle to `spec.status`.
    ///
    /// Unless steps are skipped, an existing execution is deleted and a
    /// fresh one created, since step results can only be appended. An
    /// execution that is kept and already has the target status is moved
    /// through "in progress" first so the tracker records a new run time.
    pub fn reconcile_execution(&self, spec: &ExecutionSpec<'_>) -> Result<String, TransportError> {
        let status = spec.status.remote_code();
        let comment = truncate_comment(spec.comment);

        let mut existing = self.find_execution(spec.cycle_id, spec.version_id, spec.issue_id)?;
        if !spec.skip_steps {
            if let Some((id, _)) = existing.take() {
                self.delete_execution(&id)?;
            }
        }

        let execution_id = match existing {
            None => {
                let path = "/rest/zapi/latest/execution";
                let created = self.call(
                    HttpMethod::Post,
                    path,
                    Some(json!({
                        "issueId": spec.issue_id,
                        "versionId": spec.version_id,
                        "cycleId": spec.cycle_id,
                        "projectId": spec.project_id,
                        "status": status,
                        "comment": comment,
                    })),
                )?;
                let id = created
                    .as_object()
                    .and_then(|map| map.keys().next().cloned())
                    .ok_or_else(|| TransportError::Decode {
                        path: path.to_string(),
                        message: format!("no execution id in response: {created}"),
                    })?;
                debug!(execution_id = %id, "test execution added");
                id
            }
            Some((id, current)) => {
                if current == status {
                    self.execute(&id, ExecutionStatus::IN_PROGRESS_CODE, "")?;
                    info!(execution_id = %id, "test execution set to in progress");
                }
                id
            }
        };

        self.execute(&execution_id, status, &comment)?;
        info!(execution_id = %execution_id, status = %spec.status, "test execution updated");
        Ok(execution_id)
    }

    // ---------------------------------------------------------------------
    // Steps
    // ---------------------------------------------------------------------

    pub fn find_step(&self, issue_id: &str, step: &str) -> Result<Option<String>, TransportError> {
        let steps = self.get(&format!("/rest/zapi/latest/teststep/{issue_id}"))?;
        let found = steps.as_array().and_then(|steps| {
            steps
                .iter()
                .find(|item| item["step"].as_str() == Some(step))
                .and_then(|item| id_string(&item["id"]))
        });
        if found.is_none() {
            debug!(issue_id, step, "test step not found");
        }
        Ok(found)
    }

    /// Create or update the step named `step`; returns its id.
    pub fn reconcile_step(
        &self,
        issue_id: &str,
        step: &str,
        params: &str,
        expected: &str,
    ) -> Result<String, TransportError> {
        let body = json!({ "step": step, "data": params, "result": expected });
        let (method, path) = match self.find_step(issue_id, step)? {
            Some(step_id) => (
                HttpMethod::Put,
                format!("/rest/zapi/latest/teststep/{issue_id}/{step_id}"),
            ),
            None => (
                HttpMethod::Post,
                format!("/rest/zapi/latest/teststep/{issue_id}"),
            ),
        };
        let saved = self.call(method, &path, Some(body))?;
        Self::required_id(&saved, "id", &path)
    }

    pub fn find_step_result(
        &self,
        step_id: &str,
        execution_id: &str,
    ) -> Result<Option<String>, TransportError> {
        let results = self.get(&format!(
            "/rest/zapi/latest/stepResult/?executionId={execution_id}"
        ))?;
        Ok(results.as_array().and_then(|results| {
            results
                .iter()
                .find(|item| id_string(&item["stepId"]).as_deref() == Some(step_id))
                .and_then(|item| id_string(&item["id"]))
        }))
    }

    /// Record a step outcome; `None` when the step has no result row in
    /// this execution.
    pub fn execute_step(
        &self,
        step_id: &str,
        execution_id: &str,
        status: ExecutionStatus,
        comment: &str,
    ) -> Result<Option<String>, TransportError> {
        let Some(step_result_id) = self.find_step_result(step_id, execution_id)? else {
            return Ok(None);
        };
        self.call(
            HttpMethod::Put,
            &format!("/rest/zapi/latest/stepResult/{step_result_id}"),
            Some(json!({
                "status": status.remote_code(),
                "comment": truncate_comment(comment),
            })),
        )?;
        debug!(step_id, step_result_id = %step_result_id, "test step executed");
        Ok(Some(step_result_id))
    }

    // ---------------------------------------------------------------------
    // Attachments
    // ---------------------------------------------------------------------

    pub fn attach(
        &self,
        entity_id: &str,
        entity_type: EntityType,
        file: &Path,
    ) -> Result<(), TransportError> {
        let bytes = std::fs::read(file).map_err(|source| TransportError::Attachment {
            path: file.to_path_buf(),
            source,
        })?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let path = format!(
            "/rest/zapi/latest/attachment?entityId={}&entityType={}",
            urlencoding::encode(entity_id),
            entity_type.as_str()
        );
        self.request(
            HttpMethod::Post,
            &path,
            Some(RequestBody::Multipart {
                field: "file".to_string(),
                file_name,
                bytes,
            }),
            &[("X-Atlassian-Token", "nocheck")],
        )?;
        info!(entity_id, entity_type = entity_type.as_str(), file = %file.display(), "attachment uploaded");
        Ok(())
    }
}
