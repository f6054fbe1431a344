use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::hireflix::page::{error_page, redirect_page};
use crate::hireflix::{Candidate, HireflixError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteQuery {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl InviteQuery {
    fn candidate(self) -> Option<Candidate> {
        let present = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Some(Candidate {
            email: present(self.email)?,
            first_name: present(self.first_name)?,
            last_name: present(self.last_name)?,
        })
    }
}

/// GET /interview-redirect?email=&firstName=&lastName=
/// Invites the candidate into the configured Hireflix position and serves a
/// page that forwards the browser to the interview.
pub async fn interview_redirect(
    State(state): State<AppState>,
    Query(query): Query<InviteQuery>,
) -> Response {
    let Some(candidate) = query.candidate() else {
        return (StatusCode::BAD_REQUEST, "Missing candidate information.").into_response();
    };

    let Some(invites) = state.invites.as_ref() else {
        error!("Hireflix invite requested but HIREFLIX_API_KEY/HIREFLIX_POSITION_ID are not set");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Html(error_page("Server configuration error.")),
        )
            .into_response();
    };

    match invites
        .client
        .invite_candidate(&invites.position_id, &candidate)
        .await
    {
        Ok(url) => {
            info!(email = %candidate.email, "Candidate invited");
            Html(redirect_page(&url)).into_response()
        }
        Err(HireflixError::AlreadyInvited(message)) => {
            warn!(email = %candidate.email, "Candidate already invited: {message}");
            (
                StatusCode::CONFLICT,
                Html(error_page(
                    "You are already invited. Please check your email.",
                )),
            )
                .into_response()
        }
        Err(HireflixError::Transport(e)) => {
            error!("Hireflix request failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Html(error_page("Error contacting Hireflix.")),
            )
                .into_response()
        }
        Err(e) => {
            error!("Unexpected Hireflix response: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Html(error_page("Failed to create interview.")),
            )
                .into_response()
        }
    }
}
