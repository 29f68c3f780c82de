use std::{collections::HashSet, sync::Arc};

use shared::protocol::ActionOutcome;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    backends::{RegistryBackend, RegistryEntity},
    error::FetchError,
    pagination::CollectionPager,
};

/// Result of a bulk delete over the selected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkDelete {
    pub deleted: usize,
    pub failed: usize,
}

/// One controller drives every admin table: a paged listing plus row
/// selection and create/edit/delete round trips. The entity type decides
/// which collection and payloads are in play.
pub struct RegistryController<E: RegistryEntity> {
    pager: Arc<CollectionPager<E>>,
    backend: Arc<dyn RegistryBackend<E>>,
    selected: Mutex<HashSet<i64>>,
}

impl<E: RegistryEntity> RegistryController<E> {
    pub fn new(
        pager: Arc<CollectionPager<E>>,
        backend: Arc<dyn RegistryBackend<E>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pager,
            backend,
            selected: Mutex::new(HashSet::new()),
        })
    }

    pub fn pager(&self) -> &Arc<CollectionPager<E>> {
        &self.pager
    }

    /// Flips one row's checkbox; returns whether it is now selected.
    pub async fn toggle_row(&self, id: i64) -> bool {
        let mut selected = self.selected.lock().await;
        if selected.remove(&id) {
            false
        } else {
            selected.insert(id);
            true
        }
    }

    pub async fn is_selected(&self, id: i64) -> bool {
        self.selected.lock().await.contains(&id)
    }

    pub async fn selected_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.selected.lock().await.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Selects every row on the currently loaded page.
    pub async fn select_visible(&self) {
        let items = self.pager.items().await;
        let mut selected = self.selected.lock().await;
        for item in items {
            selected.insert(item.entity_id());
        }
    }

    pub async fn clear_selection(&self) {
        self.selected.lock().await.clear();
    }

    /// Deletes each selected row, tallying outcomes instead of stopping at
    /// the first refusal, then reloads from page 1.
    pub async fn delete_selected(&self) -> Result<BulkDelete, FetchError> {
        let ids = self.selected_ids().await;
        let mut tally = BulkDelete::default();
        for id in ids {
            match self.backend.delete(id).await {
                Ok(outcome) if outcome.success => tally.deleted += 1,
                Ok(_) => tally.failed += 1,
                Err(error) => {
                    debug!(%id, %error, "row delete failed");
                    tally.failed += 1;
                }
            }
        }
        self.clear_selection().await;
        self.pager.go_to(1).await?;
        Ok(tally)
    }

    /// Creates a row and, when accepted, reloads from page 1 so the new
    /// row shows up where the server sorted it.
    pub async fn create(&self, draft: &E::Draft) -> Result<ActionOutcome, FetchError> {
        let outcome = self.backend.create(draft).await?;
        if outcome.success {
            self.pager.go_to(1).await?;
        }
        Ok(outcome)
    }

    /// Edits a row in place; an accepted edit refreshes the current page.
    pub async fn update(&self, id: i64, draft: &E::Draft) -> Result<ActionOutcome, FetchError> {
        let outcome = self.backend.update(id, draft).await?;
        if outcome.success {
            self.pager.refresh().await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
