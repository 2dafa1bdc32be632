use std::sync::Arc;

use crate::error::Result;
use crate::models::broadcast::AudienceFilter;
use crate::models::recipient::{Recipient, RecipientSummary};
use crate::store::UserDirectory;

/// Resolves a declarative filter against the user directory. Pure reads,
/// safe to call repeatedly while an operator edits a filter.
#[derive(Clone)]
pub struct AudienceService {
    users: Arc<dyn UserDirectory>,
}

impl AudienceService {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    pub async fn count(&self, filter: &AudienceFilter) -> Result<i64> {
        self.users.count(filter).await
    }

    pub async fn preview(
        &self,
        filter: &AudienceFilter,
        limit: i64,
    ) -> Result<Vec<RecipientSummary>> {
        let recipients = self.users.page(filter, 0, limit).await?;
        Ok(recipients.iter().map(RecipientSummary::from).collect())
    }

    pub async fn page(
        &self,
        filter: &AudienceFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Recipient>> {
        self.users.page(filter, offset, limit).await
    }
}
