use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{self, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use entity::employees;
use platform_db::{self, DbPool, NewEmployee};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde::Serialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "employee server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(list_handler))
        .route("/add", post(add_handler))
        .route("/update/{id}", put(update_handler))
        .route("/delete/{id}", delete(delete_handler))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Outbound employee shape shared by the list endpoint.
#[derive(Serialize)]
struct EmployeeView {
    #[serde(rename = "Id")]
    id: i32,
    #[serde(rename = "FirstName")]
    firstname: String,
    #[serde(rename = "LastName")]
    lastname: String,
    #[serde(rename = "Gender")]
    gender: String,
    #[serde(rename = "Salary")]
    salary: Option<f64>,
}

impl From<employees::Model> for EmployeeView {
    fn from(model: employees::Model) -> Self {
        Self {
            id: model.id,
            firstname: model.firstname,
            lastname: model.lastname,
            gender: model.gender,
            salary: model.salary,
        }
    }
}

#[derive(Serialize)]
struct EmployeeList {
    #[serde(rename = "Employees")]
    employees: Vec<EmployeeView>,
}

/// The create response keeps the legacy spaced keys for wire compatibility.
#[derive(Serialize)]
struct CreatedEmployee {
    #[serde(rename = "Id")]
    id: i32,
    #[serde(rename = "First Name")]
    firstname: String,
    #[serde(rename = "Last Name")]
    lastname: String,
    #[serde(rename = "Gender")]
    gender: String,
    #[serde(rename = "Salary")]
    salary: Option<f64>,
}

impl From<employees::Model> for CreatedEmployee {
    fn from(model: employees::Model) -> Self {
        Self {
            id: model.id,
            firstname: model.firstname,
            lastname: model.lastname,
            gender: model.gender,
            salary: model.salary,
        }
    }
}

/// Validates a decoded JSON body into the four mutable employee fields.
/// Missing or empty required keys answer a structured 400 instead of
/// surfacing as an unclassified fault.
fn parse_employee(body: &Value) -> HttpResult<NewEmployee> {
    let firstname = required_str(body, "FirstName")?;
    let lastname = required_str(body, "LastName")?;
    let gender = required_str(body, "Gender")?;
    let salary = match body.get("Salary") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_f64().ok_or_else(|| {
            HttpError::new(StatusCode::BAD_REQUEST, "Salary must be a number")
        })?),
    };
    Ok(NewEmployee {
        firstname,
        lastname,
        gender,
        salary,
    })
}

fn required_str(body: &Value, key: &str) -> HttpResult<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HttpError::new(StatusCode::BAD_REQUEST, &format!("{key} is required")))
}

async fn list_handler(State(state): State<AppState>) -> HttpResult<Json<EmployeeList>> {
    let employees = platform_db::list_employees(&state.pool)
        .await
        .map_err(|err| HttpError::internal(err.into()))?
        .into_iter()
        .map(EmployeeView::from)
        .collect();
    Ok(Json(EmployeeList { employees }))
}

async fn add_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HttpResult<(StatusCode, Json<CreatedEmployee>)> {
    let Json(body) =
        payload.map_err(|_| HttpError::new(StatusCode::BAD_REQUEST, "Request must be JSON"))?;
    let record = parse_employee(&body)?;
    let created = platform_db::insert_employee(&state.pool, record)
        .await
        .map_err(|err| HttpError::internal(err.into()))?;
    Ok((StatusCode::CREATED, Json(CreatedEmployee::from(created))))
}

async fn update_handler(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Result<Json<Value>, JsonRejection>,
) -> HttpResult<Json<&'static str>> {
    // Legacy contract: a malformed body on update answers 404, not 400.
    let Json(body) =
        payload.map_err(|_| HttpError::new(StatusCode::NOT_FOUND, "Request must be JSON"))?;
    let record = parse_employee(&body)?;
    let updated = platform_db::update_employee(&state.pool, id, record)
        .await
        .map_err(|err| HttpError::internal(err.into()))?;
    if updated.is_none() {
        return Err(HttpError::new(StatusCode::NOT_FOUND, "not found"));
    }
    Ok(Json("Updated"))
}

async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> HttpResult<Json<String>> {
    let removed = platform_db::delete_employee(&state.pool, id)
        .await
        .map_err(|err| HttpError::internal(err.into()))?;
    if !removed {
        // Legacy contract: a missing row on delete answers 400, not 404.
        return Err(HttpError::new(StatusCode::BAD_REQUEST, "not found"));
    }
    Ok(Json(format!("{id} is deleted")))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state
        .pool
        .execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    fn new(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}
