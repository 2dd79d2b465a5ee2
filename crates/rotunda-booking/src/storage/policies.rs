use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::pricing::PricingPolicy;
use crate::domain::types::RoomId;
use crate::error::Result;

/// Per-room pricing policy records
#[async_trait]
pub trait PricingPolicyStore: Send + Sync {
    async fn save(&self, policy: &PricingPolicy) -> Result<()>;
    async fn find_by_room(&self, room_id: &RoomId) -> Result<Option<PricingPolicy>>;
}

pub struct InMemoryPricingPolicyStore {
    policies: RwLock<HashMap<RoomId, PricingPolicy>>,
}

impl InMemoryPricingPolicyStore {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPricingPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PricingPolicyStore for InMemoryPricingPolicyStore {
    async fn save(&self, policy: &PricingPolicy) -> Result<()> {
        self.policies
            .write()
            .await
            .insert(policy.room_id, policy.clone());
        Ok(())
    }

    async fn find_by_room(&self, room_id: &RoomId) -> Result<Option<PricingPolicy>> {
        Ok(self.policies.read().await.get(room_id).cloned())
    }
}
