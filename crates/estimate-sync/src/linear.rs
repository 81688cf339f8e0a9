//! GraphQL client for Linear: issue estimates and issue annotation.
//!
//! Queries are static documents; issue ids, comment bodies and label ids
//! travel only as GraphQL variables serialized by serde.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::LinearConfig;
use crate::error::{Result, SyncError};
use crate::models::{IssueSnapshot, LabelId};

/// Looks up an issue's estimate and current labels.
#[async_trait]
pub trait EstimateSource: Send + Sync {
    /// `Ok(None)` when the tracker reported GraphQL errors for the lookup
    /// or the issue does not exist; such issues are skipped.
    async fn issue_snapshot(&self, issue_key: &str) -> Result<Option<IssueSnapshot>>;
}

/// Posts a comment and replaces an issue's label set.
#[async_trait]
pub trait IssueAnnotator: Send + Sync {
    /// Succeeds only if both the comment and the label update succeeded.
    async fn annotate(&self, issue_key: &str, comment: &str, label_ids: &[LabelId]) -> Result<()>;
}

/// GraphQL request body
#[derive(Debug, Serialize)]
struct GraphQLRequest<V: Serialize> {
    query: &'static str,
    variables: V,
}

/// GraphQL response wrapper
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

impl<T> GraphQLResponse<T> {
    fn error_message(&self) -> Option<String> {
        self.errors
            .as_ref()
            .filter(|errors| !errors.is_empty())
            .map(|errors| {
                errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
    }
}

/// GraphQL error
#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

const ISSUE_ESTIMATE_QUERY: &str = r"
    query IssueEstimate($id: String!) {
        issue(id: $id) {
            estimate
            labels {
                nodes {
                    id
                }
            }
        }
    }
";

const ANNOTATE_ISSUE_MUTATION: &str = r"
    mutation AnnotateIssue($issueId: String!, $body: String!, $labelIds: [String!]!) {
        commentCreate(input: { issueId: $issueId, body: $body }) {
            success
        }
        issueUpdate(id: $issueId, input: { labelIds: $labelIds }) {
            success
        }
    }
";

#[derive(Debug, Serialize)]
struct IssueVariables<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateVariables<'a> {
    issue_id: &'a str,
    body: &'a str,
    label_ids: &'a [LabelId],
}

#[derive(Debug, Deserialize)]
struct IssueData {
    issue: Option<IssueNode>,
}

#[derive(Debug, Deserialize)]
struct IssueNode {
    estimate: Option<f64>,
    labels: LabelConnection,
}

#[derive(Debug, Deserialize)]
struct LabelConnection {
    nodes: Vec<LabelNode>,
}

#[derive(Debug, Deserialize)]
struct LabelNode {
    id: LabelId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateData {
    comment_create: Option<MutationResult>,
    issue_update: Option<MutationResult>,
}

#[derive(Debug, Deserialize)]
struct MutationResult {
    success: bool,
}

/// Linear GraphQL client
#[derive(Debug, Clone)]
pub struct LinearClient {
    client: reqwest::Client,
    api_url: String,
}

impl LinearClient {
    /// Create a new Linear client.
    ///
    /// Personal API keys (`lin_api_*`) are sent as-is; anything else is
    /// treated as an OAuth token and gets a `Bearer` prefix.
    ///
    /// # Errors
    /// Returns error if headers cannot be constructed
    pub fn new(config: &LinearConfig) -> Result<Self> {
        let auth_value = if config.api_key.starts_with("lin_api_") {
            config.api_key.clone()
        } else {
            format!("Bearer {}", config.api_key)
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|_| SyncError::Config("Linear API key is not a valid header value".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }

    /// Send a GraphQL document and decode the envelope without interpreting
    /// the `errors` array.
    async fn post<V: Serialize + Send + Sync, R: DeserializeOwned + Send>(
        &self,
        query: &'static str,
        variables: V,
    ) -> Result<GraphQLResponse<R>> {
        let request = GraphQLRequest { query, variables };

        let response = self.client.post(&self.api_url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api {
                service: "Linear",
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl EstimateSource for LinearClient {
    #[instrument(skip(self))]
    async fn issue_snapshot(&self, issue_key: &str) -> Result<Option<IssueSnapshot>> {
        let response: GraphQLResponse<IssueData> = self
            .post(ISSUE_ESTIMATE_QUERY, IssueVariables { id: issue_key })
            .await?;

        if let Some(message) = response.error_message() {
            warn!(issue_key, error = %message, "Linear reported errors fetching issue estimate");
            return Ok(None);
        }

        let Some(issue) = response.data.and_then(|d| d.issue) else {
            warn!(issue_key, "Linear returned no issue");
            return Ok(None);
        };

        let snapshot = IssueSnapshot {
            estimate: issue.estimate,
            label_ids: issue.labels.nodes.into_iter().map(|l| l.id).collect(),
        };
        debug!(issue_key, estimate = ?snapshot.estimate, labels = snapshot.label_ids.len(), "Fetched issue estimate");
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl IssueAnnotator for LinearClient {
    #[instrument(skip(self, comment, label_ids), fields(labels = label_ids.len()))]
    async fn annotate(&self, issue_key: &str, comment: &str, label_ids: &[LabelId]) -> Result<()> {
        let variables = AnnotateVariables {
            issue_id: issue_key,
            body: comment,
            label_ids,
        };
        let response: GraphQLResponse<AnnotateData> =
            self.post(ANNOTATE_ISSUE_MUTATION, variables).await?;

        if let Some(message) = response.error_message() {
            return Err(SyncError::GraphQl(message));
        }

        let data = response.data;
        let comment_created = data
            .as_ref()
            .and_then(|d| d.comment_create.as_ref())
            .is_some_and(|r| r.success);
        let labels_updated = data
            .as_ref()
            .and_then(|d| d.issue_update.as_ref())
            .is_some_and(|r| r.success);

        if !(comment_created && labels_updated) {
            return Err(SyncError::PartialAnnotation {
                comment_created,
                labels_updated,
            });
        }

        debug!(issue_key, "Annotated issue");
        Ok(())
    }
}
