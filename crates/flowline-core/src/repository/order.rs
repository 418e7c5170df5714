//! Order repository trait definition.
//!
//! Plain CRUD for the demo order entity. State transitions happen inside
//! the step-completion transaction via the action registry, not here.

use flowline_types::error::RepositoryError;
use flowline_types::order::Order;
use uuid::Uuid;

pub trait OrderRepository: Send + Sync {
    /// Insert a new order record.
    fn create_order(
        &self,
        order: &Order,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an order by its UUID.
    fn get_order(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Order>, RepositoryError>> + Send;
}
