use async_trait::async_trait;

use crate::{
    application::repos::{CartRepo, RepoError},
    domain::entities::CartRecord,
};

use super::InMemoryRepositories;

#[async_trait]
impl CartRepo for InMemoryRepositories {
    async fn load_cart(&self, session_id: &str) -> Result<Option<CartRecord>, RepoError> {
        Ok(self.data.read().await.carts.get(session_id).cloned())
    }

    async fn save_cart(&self, cart: CartRecord) -> Result<(), RepoError> {
        let mut data = self.data.write().await;
        if cart.items.is_empty() {
            data.carts.remove(&cart.session_id);
        } else {
            data.carts.insert(cart.session_id.clone(), cart);
        }
        Ok(())
    }
}
