//! Scoped write transaction with guaranteed rollback.

use crate::error::CoreResult;
use crate::realm::Realm;

/// Rolls the handle's transaction back unless [`WriteScope::commit`] ran.
///
/// Covers early returns and panics in a transaction body alike.
pub(crate) struct WriteScope<'a> {
    realm: &'a Realm,
    finished: bool,
}

impl<'a> WriteScope<'a> {
    /// Begins a transaction on `realm`.
    pub(crate) fn begin(realm: &'a Realm) -> CoreResult<Self> {
        realm.begin_transaction()?;
        Ok(Self {
            realm,
            finished: false,
        })
    }

    /// Commits the transaction.
    pub(crate) fn commit(mut self) -> CoreResult<()> {
        self.finished = true;
        self.realm.commit_transaction()
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if !self.finished && self.realm.is_in_transaction() {
            if let Err(err) = self.realm.cancel_transaction() {
                tracing::warn!(error = %err, "rollback of abandoned transaction failed");
            }
        }
    }
}
