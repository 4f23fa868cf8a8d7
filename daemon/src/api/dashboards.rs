//! Dashboard import

use super::AppState;
use super::dtos::ImportDashboardCommand;
use super::error::ApiError;
use super::identity::SignedInUser;
use crate::dashboards::{DashboardError, ImportRequest, PluginDashboardInfo};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use gauge_plugins::PluginError;
use gauge_storage::StorageError;

/// `POST /api/dashboards/import`
pub async fn import(
    State(state): State<AppState>,
    user: SignedInUser,
    Json(cmd): Json<ImportDashboardCommand>,
) -> Result<Json<PluginDashboardInfo>, ApiError> {
    if cmd.plugin_id.is_empty() && cmd.dashboard.is_none() {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Dashboard must be set",
        ));
    }

    let reached = state
        .quota
        .dashboard_quota_reached(user.org_id)
        .map_err(|e| ApiError::internal("failed to get quota", e))?;
    if reached {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Quota reached"));
    }

    let info = state
        .dashboards
        .import_dashboard(ImportRequest {
            org_id: user.org_id,
            plugin_id: cmd.plugin_id,
            path: cmd.path,
            folder_id: cmd.folder_id,
            dashboard: cmd.dashboard,
            overwrite: cmd.overwrite,
            inputs: cmd.inputs,
        })
        .await
        .map_err(dashboard_error_to_api)?;

    Ok(Json(info))
}

pub fn dashboard_error_to_api(err: DashboardError) -> ApiError {
    match &err {
        DashboardError::Storage(StorageError::SameUidExists) => ApiError::with_cause(
            StatusCode::BAD_REQUEST,
            "A dashboard with the same uid already exists",
            &err,
        ),
        DashboardError::Storage(StorageError::SameNameInFolderExists) => ApiError::with_cause(
            StatusCode::PRECONDITION_FAILED,
            "A dashboard with the same name in the folder already exists",
            &err,
        )
        .status_tag("name-exists"),
        DashboardError::InputMissing(_) => {
            ApiError::with_cause(StatusCode::BAD_REQUEST, err.to_string(), &err)
        }
        DashboardError::Plugin(PluginError::NotFound { .. }) | DashboardError::FileNotFound(_) => {
            ApiError::with_cause(StatusCode::NOT_FOUND, err.to_string(), &err)
        }
        DashboardError::Storage(StorageError::DashboardNotFound) => {
            ApiError::with_cause(StatusCode::NOT_FOUND, "Dashboard not found", &err)
        }
        _ => ApiError::internal("Failed to save dashboard", &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_error_mapping() {
        let api = dashboard_error_to_api(DashboardError::Storage(StorageError::SameUidExists));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "A dashboard with the same uid already exists");

        let api = dashboard_error_to_api(DashboardError::Storage(StorageError::SameNameInFolderExists));
        assert_eq!(api.status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(api.status_tag, Some("name-exists"));

        let api = dashboard_error_to_api(DashboardError::InputMissing("DS_PROM".to_string()));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "Dashboard input missing: DS_PROM");

        let api = dashboard_error_to_api(DashboardError::Plugin(PluginError::not_found("x")));
        assert_eq!(api.status, StatusCode::NOT_FOUND);

        let api = dashboard_error_to_api(DashboardError::Io(std::io::Error::other("boom")));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "Failed to save dashboard");
    }
}
