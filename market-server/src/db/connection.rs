use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use tracing::instrument;

use super::{config::*, error::ConnectionError};

const APPLICATION_NAME: &str = "market-services";

/// Builds typed connection options for `endpoint`.
///
/// Optional fields that are absent (or empty) are left unset so the driver
/// falls back to its own defaults instead of sending an empty credential.
pub fn connect_options(endpoint: &DatabaseEndpoint) -> Result<PgConnectOptions, ConnectionError> {
    if endpoint.host.is_empty() {
        return Err(ConnectionError::InvalidEndpoint("host"));
    }
    if endpoint.name.is_empty() {
        return Err(ConnectionError::InvalidEndpoint("name"));
    }

    let mut options = PgConnectOptions::new()
        .host(&endpoint.host)
        .database(&endpoint.name)
        .ssl_mode(PgSslMode::Disable)
        .application_name(APPLICATION_NAME);
    if let Some(port) = endpoint.port {
        options = options.port(port);
    }
    if let Some(user) = endpoint.user.as_deref().filter(|user| !user.is_empty()) {
        options = options.username(user);
    }
    if let Some(password) = endpoint
        .password
        .as_deref()
        .filter(|password| !password.is_empty())
    {
        options = options.password(password);
    }
    Ok(options)
}

fn pool_options(tuning: &StoreTuning) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(tuning.max_connections)
        .acquire_timeout(tuning.connect_timeout)
}

/// Opens a pool and establishes its first connection, failing if the
/// endpoint cannot be reached. There is no retry.
#[instrument(name = "db.connect", skip_all, fields(host = %endpoint.host, database = %endpoint.name), err)]
pub async fn connect(
    endpoint: &DatabaseEndpoint,
    tuning: &StoreTuning,
) -> Result<PgPool, ConnectionError> {
    let options = connect_options(endpoint)?;
    pool_options(tuning)
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::Unreachable {
            host: endpoint.host.clone(),
            database: endpoint.name.clone(),
            source,
        })
}

/// Creates a pool that only dials once a connection is first acquired.
pub fn connect_lazy(
    endpoint: &DatabaseEndpoint,
    tuning: &StoreTuning,
) -> Result<PgPool, ConnectionError> {
    let options = connect_options(endpoint)?;
    Ok(pool_options(tuning).connect_lazy_with(options))
}
