//! Organization quotas

use gauge_storage::{DashboardStore, StorageError};
use std::sync::Arc;

pub struct QuotaService {
    dashboards: Arc<dyn DashboardStore>,
    /// Negative means unlimited
    dashboard_limit: i64,
}

impl QuotaService {
    pub fn new(dashboards: Arc<dyn DashboardStore>, dashboard_limit: i64) -> Self {
        Self {
            dashboards,
            dashboard_limit,
        }
    }

    /// True once `org_id` holds at least the configured number of dashboards
    pub fn dashboard_quota_reached(&self, org_id: i64) -> Result<bool, StorageError> {
        if self.dashboard_limit < 0 {
            return Ok(false);
        }
        let count = self.dashboards.count(org_id)? as i64;
        Ok(count >= self.dashboard_limit)
    }
}
