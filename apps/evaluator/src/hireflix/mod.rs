//! Hireflix GraphQL client: candidate invites and the transcript sync queries.
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub mod page;
pub mod types;

use types::{InterviewDetail, InterviewSummary, Position};

pub const HIREFLIX_ENDPOINT: &str = "https://api.hireflix.com/me";

const INVITE_MUTATION: &str = r#"
mutation InviteCandidateToInterview($input: InviteCandidateToInterviewInput!) {
  inviteCandidateToInterview(input: $input) {
    __typename
    ... on InterviewType {
      url { public }
    }
    ... on InterviewAlreadyExistsInPositionError {
      message
    }
  }
}
"#;

const POSITIONS_QUERY: &str = r#"
query GetAllPositions {
  positions {
    id
    name
    archived
  }
}
"#;

const POSITION_INTERVIEWS_QUERY: &str = r#"
query GetInterviews($positionId: String!) {
  position(id: $positionId) {
    id
    name
    interviews(orderBy: { field: updatedAt, direction: desc }) {
      id
      status
      createdAt
      updatedAt
      candidate {
        email
        firstName
        lastName
      }
    }
  }
}
"#;

const INTERVIEW_QUERY: &str = r#"
query GetInterview($id: String!) {
  interview(id: $id) {
    id
    questions {
      id
      title
      description
      answer {
        id
        url
        transcription {
          languageCode
          text
          words { text start end }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Error)]
pub enum HireflixError {
    #[error("Hireflix request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Hireflix returned HTTP {0}")]
    Status(u16),

    #[error("Hireflix API error: {0}")]
    Api(String),

    #[error("Candidate already invited: {0}")]
    AlreadyInvited(String),

    #[error("Unexpected Hireflix response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InviteData {
    invite_candidate_to_interview: Option<InviteResult>,
}

#[derive(Debug, Deserialize)]
struct InviteResult {
    #[serde(rename = "__typename")]
    typename: Option<String>,
    url: Option<InterviewUrl>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InterviewUrl {
    public: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    positions: Option<Vec<Position>>,
}

#[derive(Debug, Deserialize)]
struct PositionData {
    position: Option<PositionInterviews>,
}

#[derive(Debug, Deserialize)]
struct PositionInterviews {
    name: Option<String>,
    interviews: Option<Vec<InterviewSummary>>,
}

#[derive(Debug, Deserialize)]
struct InterviewData {
    interview: Option<InterviewDetail>,
}

#[derive(Clone)]
pub struct HireflixClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl HireflixClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, HIREFLIX_ENDPOINT)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    /// POSTs one GraphQL operation and returns its `data`. A non-empty
    /// `errors` array is an `Api` error even when partial data came back.
    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, HireflixError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Hireflix returned {status}");
            return Err(HireflixError::Status(status.as_u16()));
        }

        let parsed: GraphQlResponse<T> = response.json().await?;
        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            return Err(HireflixError::Api(Value::Array(errors).to_string()));
        }
        parsed
            .data
            .ok_or_else(|| HireflixError::UnexpectedResponse("response has no data".into()))
    }

    /// Invites the candidate to `position_id` and returns the interview's
    /// public URL.
    pub async fn invite_candidate(
        &self,
        position_id: &str,
        candidate: &Candidate,
    ) -> Result<String, HireflixError> {
        debug!(email = %candidate.email, position = %position_id, "Inviting candidate");

        let data: InviteData = self
            .graphql(
                INVITE_MUTATION,
                json!({
                    "input": {
                        "candidate": {
                            "email": candidate.email,
                            "firstName": candidate.first_name,
                            "lastName": candidate.last_name,
                        },
                        "positionId": position_id,
                    }
                }),
            )
            .await?;

        let result = data
            .invite_candidate_to_interview
            .ok_or_else(|| HireflixError::UnexpectedResponse("missing invite result".into()))?;

        if result.typename.as_deref() == Some("InterviewAlreadyExistsInPositionError") {
            return Err(HireflixError::AlreadyInvited(
                result.message.unwrap_or_default(),
            ));
        }

        result
            .url
            .and_then(|u| u.public)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| HireflixError::UnexpectedResponse("no public interview URL".into()))
    }

    /// Every position the API key can see.
    pub async fn positions(&self) -> Result<Vec<Position>, HireflixError> {
        let data: PositionsData = self.graphql(POSITIONS_QUERY, json!({})).await?;
        Ok(data.positions.unwrap_or_default())
    }

    /// Interviews of one position, most recently updated first. `None` when
    /// the position does not exist or the key cannot see it.
    pub async fn position_interviews(
        &self,
        position_id: &str,
    ) -> Result<Option<Vec<InterviewSummary>>, HireflixError> {
        let data: PositionData = self
            .graphql(
                POSITION_INTERVIEWS_QUERY,
                json!({ "positionId": position_id }),
            )
            .await?;
        Ok(data.position.map(|p| {
            debug!(
                "Position {position_id}: \"{}\"",
                p.name.as_deref().unwrap_or("Unknown")
            );
            p.interviews.unwrap_or_default()
        }))
    }

    /// Questions, answers and transcripts of one interview.
    pub async fn interview(
        &self,
        interview_id: &str,
    ) -> Result<Option<InterviewDetail>, HireflixError> {
        let data: InterviewData = self
            .graphql(INTERVIEW_QUERY, json!({ "id": interview_id }))
            .await?;
        Ok(data.interview)
    }
}
