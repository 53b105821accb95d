use super::{optional_text, required_text};
use crate::error::{validated, ApiError, ApiJson};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use flockline::user::{authenticate, RegisterUser, RoleProfile, User, INVALID_CREDENTIALS};
use flockline::{CommandError, Email, Password, RequiredText, Role, UserId};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
    phone: String,
    role: String,
    employee_id: Option<String>,
    department: Option<String>,
    company: Option<String>,
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: String,
    password: String,
    role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    id: UserId,
    name: String,
    email: String,
    role: Role,
    token: String,
}

impl AuthResponse {
    fn new(user: &User, token: String) -> Self {
        Self {
            id: user.id,
            name: user.name.to_string(),
            email: user.email.to_string(),
            role: user.role(),
            token,
        }
    }
}

fn profile_field(field: &str, value: Option<String>, role: Role) -> Result<RequiredText, ApiError> {
    optional_text(field, value)?
        .ok_or_else(|| ApiError::validation(field, format!("is required for the {role} role")))
}

impl RegisterRequest {
    fn into_command(self) -> Result<RegisterUser, ApiError> {
        let role: Role = self.role.parse()?;
        let profile = match role {
            Role::Admin => RoleProfile::Admin {
                employee_id: profile_field("employeeId", self.employee_id, role)?,
                department: profile_field("department", self.department, role)?,
            },
            Role::Agent => RoleProfile::Agent {
                company: profile_field("company", self.company, role)?,
                address: profile_field("address", self.address, role)?,
            },
        };

        Ok(RegisterUser {
            name: required_text("name", self.name)?,
            email: validated("email", Email::try_new(self.email))?,
            password: validated("password", Password::try_new(self.password))?,
            phone: required_text("phone", self.phone)?,
            profile,
        })
    }
}

async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let command = request.into_command()?;
    let user = state.executor().execute(&command).await?;
    let token = state.tokens().issue(user.id, user.role())?;
    info!(user_id = %user.id, role = %user.role(), "[api.register] user registered");
    Ok((StatusCode::CREATED, Json(AuthResponse::new(&user, token))))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let rejected = || ApiError::from(CommandError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    let email = Email::try_new(request.email).map_err(|_| rejected())?;
    let password = Password::try_new(request.password).map_err(|_| rejected())?;
    let role: Role = request.role.parse().map_err(|_| rejected())?;

    let user = authenticate(state.store(), &email, &password, role).await?;
    let token = state.tokens().issue(user.id, user.role())?;
    Ok(Json(AuthResponse::new(&user, token)))
}
