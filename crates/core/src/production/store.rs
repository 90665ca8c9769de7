use crate::error::DispatchResult;

use super::{OrderFields, OrderState, ProductionOrder, TicketDraft};

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Empty means any state.
    pub states: Vec<OrderState>,
    pub limit: i64,
    pub offset: i64,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: OrderState) -> Self {
        self.states = vec![state];
        self
    }

    pub fn with_states(mut self, states: impl IntoIterator<Item = OrderState>) -> Self {
        self.states = states.into_iter().collect();
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

pub trait OrderStore: Send + Sync {
    /// Insert a pending order numbered from the document series, in one
    /// transaction with the number draw.
    fn create_order(&self, fields: &OrderFields, created_by: &str) -> DispatchResult<ProductionOrder>;

    fn get_order(&self, id: &str) -> DispatchResult<Option<ProductionOrder>>;

    fn get_order_by_number(&self, number: u64) -> DispatchResult<Option<ProductionOrder>>;

    /// Ordered by number.
    fn list_orders(&self, filter: &OrderFilter) -> DispatchResult<Vec<ProductionOrder>>;

    /// Pending orders, earliest due date first, then by number.
    fn list_pending_orders(&self) -> DispatchResult<Vec<ProductionOrder>>;

    /// pending -> in_production. Returns the order and whether it changed;
    /// an order already in production is returned unchanged.
    fn mark_order_in_production(&self, id: &str) -> DispatchResult<(ProductionOrder, bool)>;

    /// in_production -> finished, idempotent like the production mark.
    fn mark_order_finished(&self, id: &str) -> DispatchResult<(ProductionOrder, bool)>;

    fn save_order_draft(&self, id: &str, draft: &TicketDraft) -> DispatchResult<ProductionOrder>;
}
