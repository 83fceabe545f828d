//! In-memory tracker for tests.
//!
//! [`MockTracker`] implements [`Transport`] and simulates the issue-tracker
//! and test-management endpoints zsync talks to. It records every request,
//! keeps the remote state in memory, and can inject failures. It does not
//! open network sockets.

use crate::client::{
    CLOSED_ISSUE_MESSAGE, Credentials, HttpMethod, HttpRequest, HttpResponse, RELATES_LINK,
    RequestBody, TrackerClient, Transport, TransportError, id_string,
};
use crate::util::jql_escape;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Base URL every mock client points at.
pub const MOCK_BASE_URL: &str = "mock://tracker";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockProject {
    pub id: String,
    pub key: String,
    pub name: String,
    /// `(id, name)` pairs.
    pub versions: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockIssue {
    pub id: String,
    pub key: String,
    pub project_key: String,
    pub fields: Map<String, Value>,
    pub closed: bool,
}

impl MockIssue {
    pub fn summary(&self) -> Option<&str> {
        self.fields.get("summary").and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.fields.get("description").and_then(Value::as_str)
    }

    /// Value of the first `customfield_*` field.
    pub fn identity(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name.starts_with("customfield_"))
            .and_then(|(_, value)| value.as_str())
    }

    pub fn components(&self) -> Vec<String> {
        self.fields
            .get("components")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| c["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLink {
    pub id: String,
    pub inward: String,
    pub outward: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCycle {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub version_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockExecution {
    pub id: String,
    pub issue_id: String,
    pub cycle_id: String,
    pub version_id: String,
    pub project_id: String,
    pub status: i64,
    pub comment: String,
    /// Every status the execution was moved to, in order.
    pub history: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockStep {
    pub id: String,
    pub issue_id: String,
    pub step: String,
    pub data: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockStepResult {
    pub id: String,
    pub execution_id: String,
    pub step_id: String,
    pub status: i64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockAttachment {
    pub entity_id: String,
    pub entity_type: String,
    pub file_name: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    method: HttpMethod,
    fragment: String,
    status: u16,
    body: String,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct TrackerState {
    next_id: u64,
    requests: Vec<HttpRequest>,
    projects: Vec<MockProject>,
    issues: Vec<MockIssue>,
    links: Vec<MockLink>,
    cycles: Vec<MockCycle>,
    executions: BTreeMap<String, MockExecution>,
    steps: Vec<MockStep>,
    step_results: Vec<MockStepResult>,
    attachments: Vec<MockAttachment>,
    failures: Vec<InjectedFailure>,
}

impl TrackerState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        (10_000 + self.next_id).to_string()
    }

    fn issue(&self, key: &str) -> Option<&MockIssue> {
        self.issues.iter().find(|issue| issue.key == key)
    }

    fn issue_by_id(&self, id: &str) -> Option<&MockIssue> {
        self.issues.iter().find(|issue| issue.id == id)
    }

    fn take_failure(&mut self, method: HttpMethod, path: &str) -> Option<HttpResponse> {
        let index = self
            .failures
            .iter()
            .position(|f| f.method == method && path.contains(&f.fragment))?;
        let failure = &mut self.failures[index];
        let response = HttpResponse::new(failure.status, failure.body.clone());
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.failures.remove(index);
            }
        }
        Some(response)
    }
}

/// Simulated tracker with inspectable state.
#[derive(Debug, Default)]
pub struct MockTracker {
    state: Mutex<TrackerState>,
}

fn not_found(what: &str) -> HttpResponse {
    HttpResponse::json(404, &json!({ "errorMessages": [format!("{what} does not exist")] }))
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::json(400, &json!({ "errorMessages": [message] }))
}

fn no_content() -> HttpResponse {
    HttpResponse::new(204, "")
}

fn str_field(body: &Value, field: &str) -> String {
    id_string(&body[field]).unwrap_or_default()
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let value = urlencoding::decode(v)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| v.to_string());
            (k.to_string(), value)
        })
        .collect()
}

impl MockTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Client whose requests are served by this tracker.
    pub fn client(self: &Arc<Self>) -> TrackerClient {
        let transport: Arc<dyn Transport> = self.clone();
        TrackerClient::new(Credentials::new(MOCK_BASE_URL, "bot", "secret"), transport)
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- seeding ----------------------------------------------------------

    /// Add a project; returns its id.
    pub fn add_project(&self, key: &str, name: &str) -> String {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.projects.push(MockProject {
            id: id.clone(),
            key: key.to_string(),
            name: name.to_string(),
            versions: Vec::new(),
        });
        id
    }

    /// Add a version to a project; returns its id (or `None` for an unknown project).
    pub fn add_version(&self, project_key: &str, name: &str) -> Option<String> {
        let mut state = self.lock();
        let id = state.allocate_id();
        let project = state.projects.iter_mut().find(|p| p.key == project_key)?;
        project.versions.push((id.clone(), name.to_string()));
        Some(id)
    }

    /// Add an issue directly (not through the API); returns its key.
    pub fn add_issue(&self, project_key: &str, fields: Value) -> String {
        let mut state = self.lock();
        Self::insert_issue(&mut state, project_key, fields)
    }

    fn insert_issue(state: &mut TrackerState, project_key: &str, fields: Value) -> String {
        let id = state.allocate_id();
        let number = state
            .issues
            .iter()
            .filter(|issue| issue.project_key == project_key)
            .count()
            + 1;
        let key = format!("{project_key}-{number}");
        let mut fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.remove("project");
        state.issues.push(MockIssue {
            id,
            key: key.clone(),
            project_key: project_key.to_string(),
            fields,
            closed: false,
        });
        key
    }

    /// Mark an issue closed; edits then fail with the permission message.
    pub fn close_issue(&self, key: &str) {
        let mut state = self.lock();
        if let Some(issue) = state.issues.iter_mut().find(|issue| issue.key == key) {
            issue.closed = true;
        }
    }

    /// Answer every matching request with `status`.
    pub fn fail_on(&self, method: HttpMethod, path_fragment: &str, status: u16) {
        self.inject(method, path_fragment, status, None);
    }

    /// Answer the next `times` matching requests with `status`.
    pub fn fail_times(&self, method: HttpMethod, path_fragment: &str, status: u16, times: usize) {
        self.inject(method, path_fragment, status, Some(times));
    }

    fn inject(&self, method: HttpMethod, fragment: &str, status: u16, remaining: Option<usize>) {
        if remaining == Some(0) {
            return;
        }
        self.lock().failures.push(InjectedFailure {
            method,
            fragment: fragment.to_string(),
            status,
            body: json!({ "errorMessages": [format!("injected failure {status}")] }).to_string(),
            remaining,
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    // -- inspection -------------------------------------------------------

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests with `method` whose path contains `fragment`.
    pub fn count(&self, method: HttpMethod, fragment: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.url.contains(fragment))
            .count()
    }

    /// Number of requests that changed remote state.
    pub fn mutation_count(&self) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method != HttpMethod::Get)
            .count()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    pub fn issues(&self) -> Vec<MockIssue> {
        self.lock().issues.clone()
    }

    pub fn issue(&self, key: &str) -> Option<MockIssue> {
        self.lock().issue(key).cloned()
    }

    pub fn issue_by_identity(&self, identity: &str) -> Option<MockIssue> {
        self.lock()
            .issues
            .iter()
            .find(|issue| issue.identity() == Some(identity))
            .cloned()
    }

    pub fn links(&self) -> Vec<MockLink> {
        self.lock().links.clone()
    }

    pub fn cycles(&self) -> Vec<MockCycle> {
        self.lock().cycles.clone()
    }

    pub fn executions(&self) -> Vec<MockExecution> {
        self.lock().executions.values().cloned().collect()
    }

    pub fn executions_for_issue(&self, issue_key: &str) -> Vec<MockExecution> {
        let state = self.lock();
        let Some(issue_id) = state.issue(issue_key).map(|issue| issue.id.clone()) else {
            return Vec::new();
        };
        state
            .executions
            .values()
            .filter(|e| e.issue_id == issue_id)
            .cloned()
            .collect()
    }

    pub fn steps_for_issue(&self, issue_key: &str) -> Vec<MockStep> {
        let state = self.lock();
        let Some(issue_id) = state.issue(issue_key).map(|issue| issue.id.clone()) else {
            return Vec::new();
        };
        state
            .steps
            .iter()
            .filter(|s| s.issue_id == issue_id)
            .cloned()
            .collect()
    }

    pub fn step_results(&self) -> Vec<MockStepResult> {
        self.lock().step_results.clone()
    }

    pub fn attachments(&self) -> Vec<MockAttachment> {
        self.lock().attachments.clone()
    }

    // -- routing ----------------------------------------------------------

    fn route(&self, state: &mut TrackerState, request: &HttpRequest) -> HttpResponse {
        let relative = request
            .url
            .strip_prefix(MOCK_BASE_URL)
            .unwrap_or(&request.url);
        if let Some(response) = state.take_failure(request.method, relative) {
            return response;
        }
        let (path, query) = relative.split_once('?').unwrap_or((relative, ""));
        let query = parse_query(query);
        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let body = request.json().cloned().unwrap_or(Value::Null);

        use HttpMethod::{Delete, Get, Post, Put};
        match (request.method, segments.as_slice()) {
            (Get, ["rest", "api", "2", "project"]) => Self::list_projects(state),
            (Get, ["rest", "api", "2", "project", key]) => Self::get_project(state, key),
            (Get, ["rest", "api", "2", "project", key, "versions"]) => {
                Self::list_versions(state, key)
            }
            (Get, ["rest", "api", "2", "search"]) => Self::search(state, &query),
            (Post, ["rest", "api", "2", "issue"]) => Self::create_issue(state, &body),
            (Put, ["rest", "api", "2", "issue", key]) => Self::update_issue(state, key, &body),
            (Get, ["rest", "api", "2", "issue", key]) => Self::get_issue(state, key),
            (Post, ["rest", "api", "2", "issueLink"]) => Self::create_link(state, &body),
            (Delete, ["rest", "api", "2", "issueLink", id]) => Self::delete_link(state, id),
            (Get, ["rest", "zapi", "latest", "cycle"]) => Self::list_cycles(state, &query),
            (Post, ["rest", "zapi", "latest", "cycle"]) => Self::create_cycle(state, &body),
            (Get, ["rest", "zapi", "latest", "execution"]) => {
                Self::list_executions(state, &query)
            }
            (Post, ["rest", "zapi", "latest", "execution"]) => {
                Self::create_execution(state, &body)
            }
            (Put, ["rest", "zapi", "latest", "execution", id, "execute"]) => {
                Self::update_execution(state, id, &body)
            }
            (Delete, ["rest", "zapi", "latest", "execution", id]) => {
                Self::delete_execution(state, id)
            }
            (Get, ["rest", "zapi", "latest", "teststep", issue_id]) => {
                Self::list_steps(state, issue_id)
            }
            (Post, ["rest", "zapi", "latest", "teststep", issue_id]) => {
                Self::save_step(state, issue_id, None, &body)
            }
            (Put, ["rest", "zapi", "latest", "teststep", issue_id, step_id]) => {
                Self::save_step(state, issue_id, Some(*step_id), &body)
            }
            (Get, ["rest", "zapi", "latest", "stepResult"]) => {
                Self::list_step_results(state, &query)
            }
            (Put, ["rest", "zapi", "latest", "stepResult", id]) => {
                Self::update_step_result(state, id, &body)
            }
            (Post, ["rest", "zapi", "latest", "attachment"]) => {
                Self::attach(state, &query, request.body.as_ref())
            }
            _ => not_found(relative),
        }
    }

    fn list_projects(state: &TrackerState) -> HttpResponse {
        let projects: Vec<Value> = state
            .projects
            .iter()
            .map(|p| json!({ "id": p.id, "key": p.key, "name": p.name }))
            .collect();
        HttpResponse::json(200, &Value::Array(projects))
    }

    fn get_project(state: &TrackerState, key: &str) -> HttpResponse {
        match state.projects.iter().find(|p| p.key == key) {
            Some(p) => HttpResponse::json(200, &json!({ "id": p.id, "key": p.key, "name": p.name })),
            None => not_found(&format!("project {key}")),
        }
    }

    fn list_versions(state: &TrackerState, key: &str) -> HttpResponse {
        match state.projects.iter().find(|p| p.key == key) {
            Some(p) => {
                let versions: Vec<Value> = p
                    .versions
                    .iter()
                    .map(|(id, name)| json!({ "id": id, "name": name }))
                    .collect();
                HttpResponse::json(200, &Value::Array(versions))
            }
            None => not_found(&format!("project {key}")),
        }
    }

    /// Supports the single JQL shape the client emits:
    /// `issuetype=Test AND cf[N]~'<escaped>' AND project=<KEY>`.
    fn search(state: &TrackerState, query: &BTreeMap<String, String>) -> HttpResponse {
        let jql = query.get("jql").map(String::as_str).unwrap_or_default();
        let value = jql
            .split_once("~'")
            .and_then(|(_, rest)| rest.rsplit_once("' AND project="));
        let Some((escaped, project_key)) = value else {
            return bad_request("unsupported JQL");
        };
        let issues: Vec<Value> = state
            .issues
            .iter()
            .filter(|issue| issue.project_key == project_key)
            .filter(|issue| issue.identity().map(jql_escape).as_deref() == Some(escaped))
            .map(|issue| json!({ "id": issue.id, "key": issue.key }))
            .collect();
        HttpResponse::json(200, &json!({ "total": issues.len(), "issues": issues }))
    }

    fn create_issue(state: &mut TrackerState, body: &Value) -> HttpResponse {
        let fields = &body["fields"];
        let Some(project_key) = fields["project"]["key"].as_str() else {
            return bad_request("project is required");
        };
        if !state.projects.iter().any(|p| p.key == project_key) {
            return bad_request("project does not exist");
        }
        let key = Self::insert_issue(state, project_key, fields.clone());
        let id = state.issue(&key).map(|i| i.id.clone()).unwrap_or_default();
        HttpResponse::json(201, &json!({ "id": id, "key": key }))
    }

    fn update_issue(state: &mut TrackerState, key: &str, body: &Value) -> HttpResponse {
        let Some(issue) = state.issues.iter_mut().find(|issue| issue.key == key) else {
            return not_found(&format!("issue {key}"));
        };
        if issue.closed {
            return bad_request(CLOSED_ISSUE_MESSAGE);
        }
        if let Some(fields) = body["fields"].as_object() {
            for (name, value) in fields {
                if name != "project" {
                    issue.fields.insert(name.clone(), value.clone());
                }
            }
        }
        no_content()
    }

    fn get_issue(state: &TrackerState, key: &str) -> HttpResponse {
        let Some(issue) = state.issue(key) else {
            return not_found(&format!("issue {key}"));
        };
        let links: Vec<Value> = state
            .links
            .iter()
            .filter(|link| link.inward == key)
            .map(|link| {
                json!({
                    "id": link.id,
                    "type": { "name": RELATES_LINK },
                    "outwardIssue": { "key": link.outward },
                })
            })
            .collect();
        let mut fields = issue.fields.clone();
        fields.insert("issuelinks".to_string(), Value::Array(links));
        HttpResponse::json(
            200,
            &json!({ "id": issue.id, "key": issue.key, "fields": fields }),
        )
    }

    fn create_link(state: &mut TrackerState, body: &Value) -> HttpResponse {
        let inward = body["inwardIssue"]["key"].as_str().unwrap_or_default();
        let outward = body["outwardIssue"]["key"].as_str().unwrap_or_default();
        if state.issue(inward).is_none() {
            return not_found(&format!("issue {inward}"));
        }
        if state.issue(outward).is_none() {
            return not_found(&format!("issue {outward}"));
        }
        let id = state.allocate_id();
        state.links.push(MockLink {
            id,
            inward: inward.to_string(),
            outward: outward.to_string(),
        });
        HttpResponse::new(201, "")
    }

    fn delete_link(state: &mut TrackerState, id: &str) -> HttpResponse {
        let before = state.links.len();
        state.links.retain(|link| link.id != id);
        if state.links.len() == before {
            not_found(&format!("link {id}"))
        } else {
            no_content()
        }
    }

    fn list_cycles(state: &TrackerState, query: &BTreeMap<String, String>) -> HttpResponse {
        let project_id = query.get("projectId").map(String::as_str).unwrap_or_default();
        let version_id = query.get("versionId").map(String::as_str).unwrap_or_default();
        let mut cycles = Map::new();
        for cycle in state
            .cycles
            .iter()
            .filter(|c| c.project_id == project_id && c.version_id == version_id)
        {
            cycles.insert(
                cycle.id.clone(),
                json!({ "name": cycle.name, "projectId": cycle.project_id, "versionId": cycle.version_id }),
            );
        }
        let count = cycles.len();
        cycles.insert("recordsCount".to_string(), json!(count));
        HttpResponse::json(200, &Value::Object(cycles))
    }

    fn create_cycle(state: &mut TrackerState, body: &Value) -> HttpResponse {
        let id = state.allocate_id();
        state.cycles.push(MockCycle {
            id: id.clone(),
            name: str_field(body, "name"),
            project_id: str_field(body, "projectId"),
            version_id: str_field(body, "versionId"),
        });
        HttpResponse::json(200, &json!({ "id": id, "responseMessage": "Cycle created" }))
    }

    fn execution_json(execution: &MockExecution) -> Value {
        json!({
            "id": execution.id.parse::<u64>().map(Value::from).unwrap_or_else(|_| json!(execution.id)),
            "issueId": execution.issue_id,
            "cycleId": execution.cycle_id,
            "versionId": execution.version_id,
            "projectId": execution.project_id,
            "executionStatus": execution.status.to_string(),
            "comment": execution.comment,
        })
    }

    fn list_executions(state: &TrackerState, query: &BTreeMap<String, String>) -> HttpResponse {
        let issue_id = query.get("issueId").map(String::as_str).unwrap_or_default();
        let executions: Vec<Value> = state
            .executions
            .values()
            .filter(|e| e.issue_id == issue_id)
            .map(Self::execution_json)
            .collect();
        HttpResponse::json(200, &json!({ "executions": executions }))
    }

    fn create_execution(state: &mut TrackerState, body: &Value) -> HttpResponse {
        let issue_id = str_field(body, "issueId");
        if state.issue_by_id(&issue_id).is_none() {
            return bad_request("issue does not exist");
        }
        let id = state.allocate_id();
        let status = body["status"].as_i64().unwrap_or(-1);
        let execution = MockExecution {
            id: id.clone(),
            issue_id,
            cycle_id: str_field(body, "cycleId"),
            version_id: str_field(body, "versionId"),
            project_id: str_field(body, "projectId"),
            status,
            comment: body["comment"].as_str().unwrap_or_default().to_string(),
            history: vec![status],
        };
        let rendered = Self::execution_json(&execution);
        state.executions.insert(id.clone(), execution);
        let mut response = Map::new();
        response.insert(id, rendered);
        HttpResponse::json(200, &Value::Object(response))
    }

    fn update_execution(state: &mut TrackerState, id: &str, body: &Value) -> HttpResponse {
        let Some(execution) = state.executions.get_mut(id) else {
            return not_found(&format!("execution {id}"));
        };
        if let Some(status) = body["status"].as_i64() {
            execution.status = status;
            execution.history.push(status);
        }
        if let Some(comment) = body["comment"].as_str() {
            execution.comment = comment.to_string();
        }
        let rendered = Self::execution_json(execution);
        HttpResponse::json(200, &rendered)
    }

    fn delete_execution(state: &mut TrackerState, id: &str) -> HttpResponse {
        if state.executions.remove(id).is_none() {
            return not_found(&format!("execution {id}"));
        }
        state.step_results.retain(|r| r.execution_id != id);
        HttpResponse::json(200, &json!({ "success": format!("Execution {id} deleted") }))
    }

    fn step_json(step: &MockStep) -> Value {
        json!({ "id": step.id, "step": step.step, "data": step.data, "result": step.result })
    }

    fn list_steps(state: &TrackerState, issue_id: &str) -> HttpResponse {
        let steps: Vec<Value> = state
            .steps
            .iter()
            .filter(|s| s.issue_id == issue_id)
            .map(Self::step_json)
            .collect();
        HttpResponse::json(200, &Value::Array(steps))
    }

    fn save_step(
        state: &mut TrackerState,
        issue_id: &str,
        step_id: Option<&str>,
        body: &Value,
    ) -> HttpResponse {
        if state.issue_by_id(issue_id).is_none() {
            return not_found(&format!("issue {issue_id}"));
        }
        let step = body["step"].as_str().unwrap_or_default().to_string();
        let data = body["data"].as_str().unwrap_or_default().to_string();
        let result = body["result"].as_str().unwrap_or_default().to_string();
        match step_id {
            Some(step_id) => {
                let Some(existing) = state
                    .steps
                    .iter_mut()
                    .find(|s| s.id == step_id && s.issue_id == issue_id)
                else {
                    return not_found(&format!("step {step_id}"));
                };
                existing.step = step;
                existing.data = data;
                existing.result = result;
                HttpResponse::json(200, &Self::step_json(existing))
            }
            None => {
                let id = state.allocate_id();
                let created = MockStep {
                    id,
                    issue_id: issue_id.to_string(),
                    step,
                    data,
                    result,
                };
                let rendered = Self::step_json(&created);
                state.steps.push(created);
                HttpResponse::json(200, &rendered)
            }
        }
    }

    /// Step results appear lazily: one per step of the execution's issue.
    fn list_step_results(
        state: &mut TrackerState,
        query: &BTreeMap<String, String>,
    ) -> HttpResponse {
        let execution_id = query.get("executionId").cloned().unwrap_or_default();
        let Some(issue_id) = state
            .executions
            .get(&execution_id)
            .map(|e| e.issue_id.clone())
        else {
            return HttpResponse::json(200, &json!([]));
        };
        let missing: Vec<String> = state
            .steps
            .iter()
            .filter(|s| s.issue_id == issue_id)
            .filter(|s| {
                !state
                    .step_results
                    .iter()
                    .any(|r| r.execution_id == execution_id && r.step_id == s.id)
            })
            .map(|s| s.id.clone())
            .collect();
        for step_id in missing {
            let id = state.allocate_id();
            state.step_results.push(MockStepResult {
                id,
                execution_id: execution_id.clone(),
                step_id,
                status: -1,
                comment: String::new(),
            });
        }
        let results: Vec<Value> = state
            .step_results
            .iter()
            .filter(|r| r.execution_id == execution_id)
            .map(|r| {
                json!({
                    "id": r.id,
                    "stepId": r.step_id,
                    "executionId": r.execution_id,
                    "status": r.status.to_string(),
                })
            })
            .collect();
        HttpResponse::json(200, &Value::Array(results))
    }

    fn update_step_result(state: &mut TrackerState, id: &str, body: &Value) -> HttpResponse {
        let Some(result) = state.step_results.iter_mut().find(|r| r.id == id) else {
            return not_found(&format!("step result {id}"));
        };
        if let Some(status) = body["status"].as_i64() {
            result.status = status;
        }
        if let Some(comment) = body["comment"].as_str() {
            result.comment = comment.to_string();
        }
        HttpResponse::json(200, &json!({ "id": result.id, "status": result.status.to_string() }))
    }

    fn attach(
        state: &mut TrackerState,
        query: &BTreeMap<String, String>,
        body: Option<&RequestBody>,
    ) -> HttpResponse {
        let Some(RequestBody::Multipart {
            file_name, bytes, ..
        }) = body
        else {
            return bad_request("multipart body required");
        };
        state.attachments.push(MockAttachment {
            entity_id: query.get("entityId").cloned().unwrap_or_default(),
            entity_type: query.get("entityType").cloned().unwrap_or_default(),
            file_name: file_name.clone(),
            size: bytes.len(),
        });
        HttpResponse::json(200, &json!({}))
    }
}

impl Transport for MockTracker {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        Ok(self.route(&mut state, request))
    }
}
