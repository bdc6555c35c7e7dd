use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, Statement, TransactionTrait, Value,
};

use crate::config::AdvisoryLockStrategy;
use crate::error::ClosureTreeError;

/// A transaction that, on PostgreSQL, also holds the tree type's advisory lock.
///
/// Opened on a connection this is a new transaction; opened on a transaction it
/// is a savepoint. The lock is transaction scoped and released by the server
/// when the outermost transaction ends.
pub struct LockedTransaction {
    txn: DatabaseTransaction,
}

impl LockedTransaction {
    pub async fn acquire<C>(strategy: &AdvisoryLockStrategy, conn: &C) -> Result<Self, ClosureTreeError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = conn.begin().await?;

        if let Some(key) = strategy.key() {
            if txn.get_database_backend() == DbBackend::Postgres {
                if let Err(err) = acquire_lock(&txn, key.as_str()).await {
                    let _ = txn.rollback().await;
                    return Err(err);
                }
            }
        }

        Ok(Self { txn })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), ClosureTreeError> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), ClosureTreeError> {
        self.txn.rollback().await?;
        Ok(())
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), ClosureTreeError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}
