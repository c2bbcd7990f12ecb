//! Galaxy REST Client
//!
//! Blocking implementation of [`GalaxyApi`] on top of `reqwest`. Every call
//! is a single request; failures surface as [`ApiError`] and are never
//! retried here.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use log::debug;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::{header, Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::*;
use super::{ApiError, ApiResult, GalaxyApi};

/// Timeout for ordinary API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for uploads and downloads, which move whole datasets.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(6 * 3600);

/// Header Galaxy reads the API key from.
const API_KEY_HEADER: &str = "x-api-key";

/// Client for one Galaxy instance.
#[derive(Debug, Clone)]
pub struct GalaxyClient {
    base_url: Url,
    http: Client,
}

impl GalaxyClient {
    /// Builds a client for `url` authenticating with `api_key`.
    pub fn new(url: &str, api_key: &str) -> ApiResult<Self> {
        let base_url = Url::parse(url)
            .map_err(|e| ApiError::Decode(format!("invalid Galaxy URL '{}': {}", url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Decode(format!("Galaxy URL '{}' cannot be a base", url)));
        }

        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(api_key)
            .map_err(|_| ApiError::Decode("API key contains invalid characters".to_string()))?;
        headers.insert(API_KEY_HEADER, key);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("wfexecutor/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { base_url, http })
    }

    /// Resolves `/api/<segments...>` against the instance URL.
    ///
    /// Segments are percent-encoded, so tool ids containing `/` stay one
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        debug!("{} {}", method, url);
        self.http.request(method, url)
    }

    fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = check(builder.send()?)?;
        let text = response.text()?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(format!("{}: {}", e, text)))
    }

    fn collection_elements(&self, collection_id: &str) -> ApiResult<Vec<Artifact>> {
        let collection: WireCollection = self.send_json(
            self.request(Method::GET, &["dataset_collections", collection_id])
                .query(&[("instance_type", "history")]),
        )?;
        Ok(collection.elements.into_iter().map(WireElement::into_artifact).collect())
    }
}

/// Turns a non-2xx response into [`ApiError::Status`].
fn check(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Extracts the file name from a `Content-Disposition` header.
fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let name = part.strip_prefix("filename=")?;
        let name = name.trim_matches('"');
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        (!name.is_empty()).then(|| name.to_string())
    })
}

#[derive(Deserialize)]
struct WireHistory {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct WireUploadOutput {
    id: String,
}

#[derive(Deserialize)]
struct WireUpload {
    outputs: Vec<WireUploadOutput>,
}

#[derive(Deserialize)]
struct WireWorkflowInput {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Deserialize)]
struct WireWorkflow {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    inputs: IndexMap<String, WireWorkflowInput>,
    #[serde(default)]
    steps: IndexMap<String, RemoteStep>,
}

#[derive(Deserialize)]
struct WireInvocation {
    id: String,
    history_id: String,
    workflow_id: String,
}

#[derive(Deserialize)]
struct WireHistoryStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    state_details: std::collections::BTreeMap<String, u64>,
    #[serde(default)]
    state_ids: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct WireDataset {
    id: String,
    state: String,
    #[serde(default)]
    resubmitted: bool,
    #[serde(default)]
    creating_job: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    file_ext: Option<String>,
}

#[derive(Deserialize)]
struct WireContentItem {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    history_content_type: Option<String>,
}

#[derive(Deserialize)]
struct WireElementObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    elements: Option<Vec<WireElement>>,
}

#[derive(Deserialize)]
struct WireElement {
    #[serde(default)]
    element_identifier: Option<String>,
    object: WireElementObject,
}

impl WireElement {
    fn into_artifact(self) -> Artifact {
        let object = self.object;
        let name = object.name.or(self.element_identifier);
        match object.elements {
            Some(children) => Artifact {
                id: object.id,
                name,
                state: object.state.unwrap_or_else(|| "ok".to_string()),
                kind: ArtifactKind::Collection {
                    elements: children.into_iter().map(WireElement::into_artifact).collect(),
                },
            },
            None => Artifact {
                id: object.id,
                name,
                state: object.state.unwrap_or_default(),
                kind: ArtifactKind::Dataset,
            },
        }
    }
}

#[derive(Deserialize)]
struct WireCollection {
    #[serde(default)]
    elements: Vec<WireElement>,
}

impl GalaxyApi for GalaxyClient {
    fn create_session(&self, name: &str) -> ApiResult<Session> {
        let history: WireHistory = self.send_json(
            self.request(Method::POST, &["histories"])
                .json(&json!({ "name": name })),
        )?;
        Ok(Session {
            id: history.id,
            name: history.name,
        })
    }

    fn upload(
        &self,
        session_id: &str,
        path: &Path,
        label: &str,
        file_type: &str,
    ) -> ApiResult<ArtifactRef> {
        let inputs = json!({
            "files_0|NAME": label,
            "files_0|type": "upload_dataset",
            "files_0|to_posix_lines": "Yes",
            "file_type": file_type,
            "dbkey": "?",
        });
        let form = multipart::Form::new()
            .text("tool_id", "upload1")
            .text("history_id", session_id.to_string())
            .text("inputs", inputs.to_string())
            .file("files_0|file_data", path)?;

        let upload: WireUpload = self.send_json(
            self.request(Method::POST, &["tools"])
                .timeout(TRANSFER_TIMEOUT)
                .multipart(form),
        )?;
        let output = upload
            .outputs
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Decode(format!("upload of {} produced no dataset", label)))?;
        Ok(ArtifactRef { id: output.id })
    }

    fn import_workflow(&self, definition: &Value) -> ApiResult<WorkflowHandle> {
        let handle: WorkflowHandle = self.send_json(
            self.request(Method::POST, &["workflows", "upload"])
                .json(&json!({ "workflow": definition })),
        )?;
        Ok(handle)
    }

    fn show_workflow(&self, workflow_id: &str) -> ApiResult<RemoteWorkflow> {
        let wire: WireWorkflow = self.send_json(self.request(Method::GET, &["workflows", workflow_id]))?;
        Ok(RemoteWorkflow {
            id: wire.id,
            name: wire.name,
            inputs: wire
                .inputs
                .into_iter()
                .map(|(step, input)| (step, input.label.unwrap_or_default()))
                .collect(),
            steps: wire.steps,
        })
    }

    fn invoke(&self, request: &InvocationRequest) -> ApiResult<Invocation> {
        let payload = json!({
            "inputs": request.inputs_payload(),
            "parameters": request.parameters,
            "history": request.session_name,
        });
        let wire: WireInvocation = self.send_json(
            self.request(Method::POST, &["workflows", &request.workflow_id, "invocations"])
                .json(&payload),
        )?;
        Ok(Invocation {
            id: wire.id,
            session_id: wire.history_id,
            workflow_id: wire.workflow_id,
        })
    }

    fn get_session_status(&self, session_id: &str) -> ApiResult<SessionStatusSnapshot> {
        let wire: WireHistoryStatus = self.send_json(
            self.request(Method::GET, &["histories", session_id])
                .query(&[("keys", "state,state_details,state_ids")]),
        )?;
        Ok(SessionStatusSnapshot {
            state: wire.state,
            state_counts: wire.state_details,
            state_ids: wire.state_ids,
        })
    }

    fn get_dataset(&self, dataset_id: &str) -> ApiResult<DatasetInfo> {
        let wire: WireDataset = self.send_json(self.request(Method::GET, &["datasets", dataset_id]))?;
        Ok(DatasetInfo {
            id: wire.id,
            state: wire.state,
            resubmitted: wire.resubmitted,
            creating_job: wire.creating_job,
            name: wire.name,
        })
    }

    fn get_job(&self, job_id: &str) -> ApiResult<JobInfo> {
        self.send_json(self.request(Method::GET, &["jobs", job_id]))
    }

    fn get_tool(&self, tool_id: &str) -> ApiResult<ToolInfo> {
        self.send_json(self.request(Method::GET, &["tools", tool_id]))
    }

    fn list_session_contents(&self, session_id: &str) -> ApiResult<Vec<Artifact>> {
        let items: Vec<WireContentItem> = self.send_json(
            self.request(Method::GET, &["histories", session_id, "contents"])
                .query(&[("visible", "true"), ("details", "all")]),
        )?;

        let mut artifacts = Vec::with_capacity(items.len());
        for item in items {
            if item.history_content_type.as_deref() == Some("dataset_collection") {
                let elements = self.collection_elements(&item.id)?;
                artifacts.push(Artifact {
                    id: item.id,
                    name: item.name,
                    state: item.state.unwrap_or_else(|| "ok".to_string()),
                    kind: ArtifactKind::Collection { elements },
                });
            } else {
                artifacts.push(Artifact {
                    id: item.id,
                    name: item.name,
                    state: item.state.unwrap_or_default(),
                    kind: ArtifactKind::Dataset,
                });
            }
        }
        Ok(artifacts)
    }

    fn download(
        &self,
        artifact_id: &str,
        dest: &Path,
        use_default_name: bool,
    ) -> ApiResult<PathBuf> {
        let meta: WireDataset = self.send_json(self.request(Method::GET, &["datasets", artifact_id]))?;
        let ext = meta.file_ext.clone().unwrap_or_else(|| "data".to_string());

        let mut response = check(
            self.request(Method::GET, &["datasets", artifact_id, "display"])
                .query(&[("to_ext", ext.as_str())])
                .timeout(TRANSFER_TIMEOUT)
                .send()?,
        )?;

        let target = if use_default_name {
            let name = response
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(disposition_filename)
                .unwrap_or_else(|| format!("{}.{}", meta.id, ext));
            dest.join(name)
        } else {
            dest.to_path_buf()
        };

        let mut file = File::create(&target)?;
        response.copy_to(&mut file)?;
        Ok(target)
    }

    fn delete_session(&self, session_id: &str, purge: bool) -> ApiResult<()> {
        check(
            self.request(Method::DELETE, &["histories", session_id])
                .json(&json!({ "purge": purge }))
                .send()?,
        )?;
        Ok(())
    }

    fn delete_workflow(&self, workflow_id: &str) -> ApiResult<()> {
        check(self.request(Method::DELETE, &["workflows", workflow_id]).send()?)?;
        Ok(())
    }
}
