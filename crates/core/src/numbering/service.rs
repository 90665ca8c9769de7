use std::sync::Arc;

use crate::error::DispatchResult;
use crate::metrics::NUMBERS_ISSUED;
use crate::plant::Shared;

use super::DOCUMENT_SERIES;

/// Draws document numbers outside of an order or ticket write.
///
/// Order creation and standalone ticket launch draw their number inside
/// their own transaction and do not go through this service.
#[derive(Clone)]
pub struct NumberingService {
    shared: Arc<Shared>,
}

impl NumberingService {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Issue the next document number.
    pub fn next(&self) -> DispatchResult<u64> {
        let number = self.shared.store.next_number(DOCUMENT_SERIES)?;
        NUMBERS_ISSUED.inc();
        tracing::debug!(number, "Document number issued");
        Ok(number)
    }

    /// Highest number issued so far.
    pub fn current(&self) -> DispatchResult<Option<u64>> {
        self.shared.store.current_number(DOCUMENT_SERIES)
    }
}
