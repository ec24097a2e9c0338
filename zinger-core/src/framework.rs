use sqlx::PgPool;

/// Executes entity requests against Postgres.
///
/// Entity modules implement `kanau::processor::Processor<Request>` for this
/// type, one request struct per SQL statement.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
