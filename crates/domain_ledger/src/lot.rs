//! Lots group the splits that settle one document
//!
//! A lot lives on a receivable or payable account. The posting split of a
//! document and every later payment split for it carry the same lot id, so
//! the lot's running value is what is still owed.

use serde::{Deserialize, Serialize};

use core_kernel::{AccountId, DocumentId, LotId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    /// Receivable/payable account that owns the lot
    pub account_id: AccountId,
    /// Document this lot settles, if any
    pub document_id: Option<DocumentId>,
    pub title: String,
}

impl Lot {
    pub fn new(id: LotId, account_id: AccountId, title: impl Into<String>) -> Self {
        Self {
            id,
            account_id,
            document_id: None,
            title: title.into(),
        }
    }

    pub fn for_document(mut self, document_id: DocumentId) -> Self {
        self.document_id = Some(document_id);
        self
    }
}
