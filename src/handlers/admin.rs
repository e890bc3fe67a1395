use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::Result, repositories::election as election_repo, state::AppState};

#[derive(Serialize)]
pub struct AdminElection {
    pub id: Uuid,
    pub name: String,
    pub state: &'static str,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Read-only election listing for operators, with derived states.
#[axum::debug_handler]
pub async fn list_elections(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let elections: Vec<AdminElection> = election_repo::list(&state.db)
        .await?
        .into_iter()
        .map(|e| AdminElection {
            id: e.id,
            name: e.name.clone(),
            state: e.state_at(now).as_str(),
            is_active: e.is_active,
            start_date: e.start_date,
            end_date: e.end_date,
        })
        .collect();

    Ok(Json(elections))
}
