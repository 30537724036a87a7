use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;
use crate::content::{Project, ProjectRecord};
use crate::error::ApiError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::ProjectsQuery;
use crate::state::AppState;

pub async fn list_projects_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProjectsQuery>,
) -> Json<Vec<ProjectRecord>> {
    REQUEST_TOTAL.with_label_values(&["/api/projects"]).inc();

    let projects = if query.featured {
        state.content.featured_projects().await
    } else {
        state.content.all_projects().await
    };
    Json(projects)
}

// invalid and unknown slugs look the same from outside
pub async fn project_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Project>, ApiError> {
    REQUEST_TOTAL.with_label_values(&["/api/projects/{slug}"]).inc();

    state
        .content
        .project_by_slug(&slug)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}
