use axum::{debug_handler, extract::State, Json};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;
use vetshield_core::keys::AuthAction;
use vetshield_core::utils::redact::mask_email;

use crate::api::client_context::ClientContext;
use crate::api::error::{AppError, ErrorResponse};
use crate::api::security_guard;
use crate::app_state::SharedAppState;
use crate::services::accounts::{normalize_email, AccountError};
use crate::services::reset_notifier::ResetNotice;

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_PASSWORD_CHARS: usize = 128;
const MAX_EMAIL_CHARS: usize = 254;

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(SecretString::new(value.into_boxed_str()))
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CredentialsRequest {
    pub email: String,
    #[serde(deserialize_with = "deserialize_secret")]
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[serde(deserialize_with = "deserialize_secret")]
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub status: String,
    pub client_id: Uuid,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub status: String,
    pub message: String,
}

impl MessageResponse {
    fn success(message: &str) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            message: message.to_string(),
        })
    }
}

const REGISTER_MESSAGE: &str = "Registration received. You can now sign in.";
const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for this address, password reset instructions have been sent.";
const RESET_PASSWORD_MESSAGE: &str = "Your password has been updated.";

fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    let valid = email.chars().count() <= MAX_EMAIL_CHARS
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::InvalidInput("email address is invalid".into()));
    }
    Ok(())
}

fn validate_password(password: &SecretString) -> Result<(), AppError> {
    let length = password.expose_secret().chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&length) {
        return Err(AppError::InvalidInput(format!(
            "password must be between {MIN_PASSWORD_CHARS} and {MAX_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = CredentialsRequest,
    responses(
    (status = 200, description = "Credentials accepted", body = LoginResponse),
    (status = 401, description = "Invalid credentials", body = ErrorResponse),
    (status = 403, description = "Request denied", body = ErrorResponse),
    (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
#[debug_handler]
pub async fn login_handler(
    State(state): State<SharedAppState>,
    client: ClientContext,
    Json(form): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let ctx = client.security_context(AuthAction::Login, Some(&form.email));
    security_guard::enforce(&state, &ctx)?;

    match state.accounts.verify(&form.email, &form.password).await? {
        Some(account) => {
            state
                .monitor
                .track_successful_auth(&ctx, &account.id.to_string());
            Ok(Json(LoginResponse {
                status: "success".to_string(),
                client_id: account.id,
            }))
        }
        None => {
            state
                .monitor
                .track_failed_attempt(&ctx, Some("invalid_credentials"));
            Err(AppError::InvalidCredentials)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = CredentialsRequest,
    responses(
    (status = 200, description = "Registration received", body = MessageResponse),
    (status = 400, description = "Invalid input or common password", body = ErrorResponse),
    (status = 403, description = "Request denied", body = ErrorResponse),
    (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
#[debug_handler]
pub async fn register_handler(
    State(state): State<SharedAppState>,
    client: ClientContext,
    Json(form): Json<CredentialsRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let ctx = client.security_context(AuthAction::Register, Some(&form.email));
    security_guard::enforce(&state, &ctx)?;

    validate_email(&form.email)?;
    validate_password(&form.password)?;
    if state
        .monitor
        .check_password_breached(form.password.expose_secret())
    {
        return Err(AppError::PasswordTooCommon);
    }

    match state.accounts.create(&form.email, &form.password).await {
        Ok(account) => {
            info!(client_id = %account.id, "Registered new client account");
        }
        // Same answer as a fresh registration, so addresses cannot be probed
        Err(AccountError::AlreadyExists) => {
            state
                .monitor
                .track_failed_attempt(&ctx, Some("duplicate_account"));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(MessageResponse::success(REGISTER_MESSAGE))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
    (status = 200, description = "Request received", body = MessageResponse),
    (status = 403, description = "Request denied", body = ErrorResponse),
    (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
#[debug_handler]
pub async fn forgot_password_handler(
    State(state): State<SharedAppState>,
    client: ClientContext,
    Json(form): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let ctx = client.security_context(AuthAction::ForgotPassword, Some(&form.email));
    security_guard::enforce(&state, &ctx)?;

    if state.accounts.exists(&form.email).await {
        let email = normalize_email(&form.email);
        let notice = ResetNotice {
            token: SecretString::new(state.reset_tokens.issue(&email).into()),
            valid_for: state.reset_tokens.ttl(),
            email,
        };
        debug!("Issued password reset token for {}", mask_email(&notice.email));
        // The answer stays the same whether or not delivery worked
        if let Err(e) = state.reset_notifier.deliver(&notice) {
            error!(error = %e, "Failed to deliver password reset token");
        }
    }

    Ok(MessageResponse::success(FORGOT_PASSWORD_MESSAGE))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
    (status = 200, description = "Password updated", body = MessageResponse),
    (status = 400, description = "Invalid token or password", body = ErrorResponse),
    (status = 403, description = "Request denied", body = ErrorResponse),
    (status = 429, description = "Too many attempts", body = ErrorResponse)
    )
)]
#[debug_handler]
pub async fn reset_password_handler(
    State(state): State<SharedAppState>,
    client: ClientContext,
    Json(form): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let ctx = client.security_context(AuthAction::ResetPassword, None);
    security_guard::enforce(&state, &ctx)?;

    validate_password(&form.password)?;
    if state
        .monitor
        .check_password_breached(form.password.expose_secret())
    {
        return Err(AppError::PasswordTooCommon);
    }

    let Some(email) = state.reset_tokens.consume(form.token.trim()) else {
        state
            .monitor
            .track_failed_attempt(&ctx, Some("invalid_reset_token"));
        return Err(AppError::InvalidResetToken);
    };

    match state.accounts.set_password(&email, &form.password).await {
        Ok(account) => {
            state
                .monitor
                .track_successful_auth(&ctx, &account.id.to_string());
            Ok(MessageResponse::success(RESET_PASSWORD_MESSAGE))
        }
        Err(AccountError::NotFound) => {
            state
                .monitor
                .track_failed_attempt(&ctx, Some("invalid_reset_token"));
            Err(AppError::InvalidResetToken)
        }
        Err(e) => Err(e.into()),
    }
}
