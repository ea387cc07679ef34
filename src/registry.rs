//! Endpoint registry.
//!
//! Maps endpoint ids to their definitions and answers exact (verb, path)
//! lookups for the dispatcher. [`Registry`] is the contract the dispatcher
//! depends on; [`SqliteRegistry`] keeps the endpoints in SQLite.

use crate::endpoint::{Attributes, Endpoint, EndpointInput, Response};
use crate::error::{MockError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

/// Storage contract for registered endpoints.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Store a new endpoint and return it with its assigned id.
    ///
    /// Does not check for an existing endpoint with the same verb and path.
    async fn create(&self, input: &EndpointInput) -> Result<Endpoint>;

    /// Store a new endpoint unless one with the same verb and path exists,
    /// in which case [`MockError::Conflict`] is returned.
    async fn create_unique(&self, input: &EndpointInput) -> Result<Endpoint>;

    /// All endpoints, ordered by id.
    async fn fetch_all(&self) -> Result<Vec<Endpoint>>;

    /// A single endpoint by id.
    async fn fetch(&self, id: i64) -> Result<Option<Endpoint>>;

    /// The response registered for exactly this verb and path.
    async fn find_by_verb_and_path(&self, verb: &str, path: &str) -> Result<Option<Response>>;

    /// Replace the endpoint with the given id. `None` when no such endpoint exists.
    async fn update(&self, id: i64, input: &EndpointInput) -> Result<Option<Endpoint>>;

    /// Remove the endpoint with the given id. `false` when no such endpoint exists.
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// Create each seed endpoint that is not registered yet.
///
/// Returns how many endpoints were created.
pub async fn seed(registry: &dyn Registry, endpoints: &[Attributes]) -> Result<usize> {
    let mut created = 0;
    for attributes in endpoints {
        let input = EndpointInput::from(attributes.clone());
        match registry.create_unique(&input).await {
            Ok(endpoint) => {
                debug!(
                    id = endpoint.id,
                    verb = %endpoint.attributes.verb,
                    path = %endpoint.attributes.path,
                    "Seeded endpoint"
                );
                created += 1;
            }
            Err(MockError::Conflict { verb, path }) => {
                debug!(verb = %verb, path = %path, "Seed endpoint already registered, skipping");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

/// Endpoint registry backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteRegistry {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct EndpointRow {
    id: i64,
    #[sqlx(rename = "type")]
    kind: String,
    verb: String,
    path: String,
    code: i64,
    headers: String,
    body: String,
}

#[derive(sqlx::FromRow)]
struct ResponseRow {
    code: i64,
    headers: String,
    body: String,
}

impl TryFrom<ResponseRow> for Response {
    type Error = MockError;

    fn try_from(row: ResponseRow) -> Result<Self> {
        let code = u16::try_from(row.code).map_err(|e| sqlx::Error::Decode(e.into()))?;
        Ok(Response {
            code,
            headers: decode_headers(&row.headers)?,
            body: row.body,
        })
    }
}

impl TryFrom<EndpointRow> for Endpoint {
    type Error = MockError;

    fn try_from(row: EndpointRow) -> Result<Self> {
        let response = Response::try_from(ResponseRow {
            code: row.code,
            headers: row.headers,
            body: row.body,
        })?;
        Ok(Endpoint {
            kind: row.kind,
            id: row.id,
            attributes: Attributes {
                verb: row.verb,
                path: row.path,
                response,
            },
        })
    }
}

fn encode_headers(headers: &BTreeMap<String, String>) -> Result<String> {
    Ok(serde_json::to_string(headers)?)
}

/// A stored `null` reads back as an empty map.
fn decode_headers(headers: &str) -> Result<BTreeMap<String, String>> {
    let headers: Option<BTreeMap<String, String>> = serde_json::from_str(headers)?;
    Ok(headers.unwrap_or_default())
}

const ENDPOINT_COLUMNS: &str = "id, type, verb, path, code, headers, body";

impl SqliteRegistry {
    /// Open (creating if missing) the database at `database_url` and migrate it.
    ///
    /// In-memory databases get a single connection that is never recycled, so
    /// their contents live as long as the registry.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options.connect_with(options).await?;
        info!(database_url = %database_url, in_memory, "Opened endpoint database");
        Self::new(pool).await
    }

    /// Wrap an existing pool, applying pending migrations.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn create(&self, input: &EndpointInput) -> Result<Endpoint> {
        let attributes = &input.attributes;
        let headers = encode_headers(&attributes.response.headers)?;

        let row = sqlx::query_as::<_, EndpointRow>(&format!(
            "INSERT INTO endpoints (type, verb, path, code, headers, body) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {ENDPOINT_COLUMNS}"
        ))
        .bind(&input.kind)
        .bind(&attributes.verb)
        .bind(&attributes.path)
        .bind(i64::from(attributes.response.code))
        .bind(&headers)
        .bind(&attributes.response.body)
        .fetch_one(&self.pool)
        .await?;

        Endpoint::try_from(row)
    }

    async fn create_unique(&self, input: &EndpointInput) -> Result<Endpoint> {
        let attributes = &input.attributes;
        let headers = encode_headers(&attributes.response.headers)?;

        let row = sqlx::query_as::<_, EndpointRow>(&format!(
            "INSERT INTO endpoints (type, verb, path, code, headers, body) \
             SELECT ?, ?, ?, ?, ?, ? \
             WHERE NOT EXISTS (SELECT 1 FROM endpoints WHERE verb = ? AND path = ?) \
             RETURNING {ENDPOINT_COLUMNS}"
        ))
        .bind(&input.kind)
        .bind(&attributes.verb)
        .bind(&attributes.path)
        .bind(i64::from(attributes.response.code))
        .bind(&headers)
        .bind(&attributes.response.body)
        .bind(&attributes.verb)
        .bind(&attributes.path)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Endpoint::try_from(row),
            None => Err(MockError::Conflict {
                verb: attributes.verb.clone(),
                path: attributes.path.clone(),
            }),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Endpoint>> {
        let rows = sqlx::query_as::<_, EndpointRow>(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Endpoint::try_from).collect()
    }

    async fn fetch(&self, id: i64) -> Result<Option<Endpoint>> {
        let row = sqlx::query_as::<_, EndpointRow>(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Endpoint::try_from).transpose()
    }

    async fn find_by_verb_and_path(&self, verb: &str, path: &str) -> Result<Option<Response>> {
        // Updates may leave duplicates behind; the oldest registration wins.
        let row = sqlx::query_as::<_, ResponseRow>(
            "SELECT code, headers, body FROM endpoints \
             WHERE verb = ? AND path = ? ORDER BY id LIMIT 1",
        )
        .bind(verb)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Response::try_from).transpose()
    }

    async fn update(&self, id: i64, input: &EndpointInput) -> Result<Option<Endpoint>> {
        let attributes = &input.attributes;
        let headers = encode_headers(&attributes.response.headers)?;

        let row = sqlx::query_as::<_, EndpointRow>(&format!(
            "UPDATE endpoints SET type = ?, verb = ?, path = ?, code = ?, headers = ?, body = ? \
             WHERE id = ? RETURNING {ENDPOINT_COLUMNS}"
        ))
        .bind(&input.kind)
        .bind(&attributes.verb)
        .bind(&attributes.path)
        .bind(i64::from(attributes.response.code))
        .bind(&headers)
        .bind(&attributes.response.body)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Endpoint::try_from).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
