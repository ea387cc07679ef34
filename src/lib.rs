//! Echo Mock Server
//!
//! A mock HTTP server whose endpoints are registered at runtime. Clients
//! create, update and delete mock endpoints through a JSON:API management
//! API; every other request is matched against the registered endpoints and
//! answered with the stored response.
//!
//! # Features
//!
//! - **Management API**: `GET`/`POST /endpoints`, `PATCH`/`DELETE /endpoints/{id}`
//! - **Exact Matching**: Requests match on verb and path, nothing else
//! - **Verbatim Replay**: Stored status, headers and body are served as-is
//! - **SQLite Storage**: In-memory by default, file-backed on request
//! - **Seeding**: Endpoints listed in the config file are registered at startup
//!
//! # Example
//!
//! ```text
//! POST /endpoints
//! {
//!   "data": {
//!     "type": "endpoints",
//!     "attributes": {
//!       "verb": "GET",
//!       "path": "/hello",
//!       "response": {
//!         "code": 200,
//!         "headers": { "Content-Type": "application/json" },
//!         "body": "\"{ \"message\": \"Hello, world\" }\""
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! After which `GET /hello` answers `200` with `{ "message": "Hello, world" }`.

pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod registry;

pub use config::MockServerConfig;
pub use dispatcher::Dispatcher;
pub use error::MockError;
pub use registry::{Registry, SqliteRegistry};
