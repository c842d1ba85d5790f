//! HTTP route handlers grouped by resource domain.
//!
//! Each submodule corresponds to a logical area of the API
//! (uploaded files, destination connections, import jobs) and exposes typed
//! Rocket handlers annotated with `#[openapi]` so `rocket_okapi` can derive
//! an OpenAPI document automatically.

pub mod destinations;
pub mod files;
pub mod health;
pub mod imports;
