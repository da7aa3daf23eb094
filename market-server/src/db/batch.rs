use sqlx::{PgPool, Postgres, QueryBuilder};

use super::config::StoreTuning;

/// Postgres rejects statements with more bind parameters than this.
pub(crate) const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Rows per statement: `batch_size`, lowered so that a statement never
/// carries more than [`MAX_BIND_PARAMS`] parameters.
pub(crate) fn rows_per_statement(tuning: &StoreTuning, binds_per_row: usize) -> usize {
    let limit = MAX_BIND_PARAMS / binds_per_row.max(1);
    tuning.batch_size.clamp(1, limit.max(1))
}

/// Executes `rows` as multi-row statements of at most
/// [`rows_per_statement`] rows each.
///
/// With `skip_default_transaction` each statement commits on its own,
/// otherwise all statements share one transaction.
pub(crate) async fn execute_batched<'a, T, F>(
    pool: &PgPool,
    tuning: &StoreTuning,
    binds_per_row: usize,
    rows: &'a [T],
    build: F,
) -> Result<u64, sqlx::Error>
where
    T: Sync,
    F: Fn(&'a [T]) -> QueryBuilder<'a, Postgres>,
{
    let chunk_size = rows_per_statement(tuning, binds_per_row);
    if chunk_size < tuning.batch_size {
        tracing::debug!(
            batch_size = tuning.batch_size,
            chunk_size,
            "batch size lowered to fit the bind parameter limit"
        );
    }
    let mut rows_affected = 0;
    if tuning.skip_default_transaction {
        for chunk in rows.chunks(chunk_size) {
            let mut query = build(chunk);
            rows_affected += query.build().execute(pool).await?.rows_affected();
        }
    } else {
        let mut tx = pool.begin().await?;
        for chunk in rows.chunks(chunk_size) {
            let mut query = build(chunk);
            rows_affected += query.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
    }
    Ok(rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning(batch_size: usize) -> StoreTuning {
        StoreTuning {
            batch_size,
            ..Default::default()
        }
    }

    #[test]
    fn configured_batch_size_is_used_when_it_fits() {
        assert_eq!(rows_per_statement(&tuning(3_000), 5), 3_000);
        assert_eq!(rows_per_statement(&tuning(0), 5), 1);
    }

    #[test]
    fn batch_size_is_capped_by_the_bind_limit() {
        assert_eq!(rows_per_statement(&tuning(20_000), 5), 13_107);
        assert!(rows_per_statement(&tuning(usize::MAX), 5) * 5 <= MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(&tuning(100_000), 1), MAX_BIND_PARAMS);
    }
}
