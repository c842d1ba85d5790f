use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::okapi::openapi3::{MediaType, RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;

use crate::import::destination::DestinationError;
use crate::import::groups::ExtractError;
use crate::import::reader::ReadError;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    DatabaseError(sqlx::Error),
    DestinationError(DestinationError),
    NotFound(String),
    BadRequest(String),
    InternalError(String),
}

#[derive(Serialize, JsonSchema)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = match self {
            ApiError::DatabaseError(e) => {
                log::error!("database error: {}", e);
                (Status::InternalServerError, "DatabaseError", e.to_string())
            }
            ApiError::DestinationError(e) => {
                log::error!("destination error: {}", e);
                (
                    Status::InternalServerError,
                    "DestinationError",
                    e.to_string(),
                )
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "BadRequest", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (Status::InternalServerError, "InternalError", msg)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let json = serde_json::to_string(&error_response)
            .unwrap_or_else(|_| r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string());

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

/// OpenAPI documentation for the error envelope, required for handlers
/// returning `Result<_, ApiError>` under `openapi_get_routes!`.
impl OpenApiResponderInner for ApiError {
    fn responses(
        generator: &mut OpenApiGenerator,
    ) -> Result<Responses, rocket_okapi::OpenApiError> {
        let schema = generator.json_schema::<ErrorResponse>();
        let mut responses = Responses::default();

        for (code, description) in [
            ("400", "Bad request: malformed input, unsupported file type or driver"),
            ("404", "Not found: unknown file, group, connection, table, or job"),
            ("500", "Internal error: database or destination failure"),
        ] {
            let mut content = rocket_okapi::okapi::Map::new();
            content.insert(
                "application/json".to_string(),
                MediaType {
                    schema: Some(schema.clone()),
                    ..Default::default()
                },
            );
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    content,
                    ..Default::default()
                }),
            );
        }

        Ok(responses)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::DatabaseError(err),
        }
    }
}

impl From<DestinationError> for ApiError {
    fn from(err: DestinationError) -> Self {
        match err {
            DestinationError::UnsupportedDriver(driver) => {
                ApiError::BadRequest(format!("unsupported database driver '{}'", driver))
            }
            other => ApiError::DestinationError(other),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Missing(path) => ApiError::NotFound(format!("file not found: {}", path)),
            StorageError::Traversal(path) => {
                ApiError::BadRequest(format!("invalid file path '{}'", path))
            }
        }
    }
}

impl From<ReadError> for ApiError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::UnsupportedFormat(format) => {
                ApiError::BadRequest(format!("unsupported file format '{}'", format))
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Read(read) => ApiError::from(read),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}
