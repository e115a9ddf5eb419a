//! # Account Routes
//!
//! Routes (all public):
//! - POST /v1/users — register, grant `movies:read`, mail an activation token
//! - PUT  /v1/users/activate — consume an activation token
//! - POST /v1/users/authenticate — exchange credentials for a bearer token
//! - POST /v1/users/password-reset-token — mail a password reset token
//! - PUT  /v1/users/update-password — consume a reset token
//! - POST /v1/users/refresh-activation-token — supersede and re-mail activation
//!
//! Token plaintexts leave the service exactly once: in the authentication
//! response or in the outbound mail. Issuing a token of a scope revokes the
//! account's earlier tokens of that scope.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use moviescreen_core::permission::MOVIES_READ;
use moviescreen_core::user::normalize_email;
use moviescreen_core::{
    NewUser, PasswordHash, StoreError, TokenHash, TokenScope, User, UserField, Validator,
};
use serde::{Deserialize, Serialize};

use super::Message;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::mailer::Notification;
use crate::mutation::commit;
use crate::state::AppState;

/// Record the first broken rule of each `(field, value)` pair.
fn check_fields(fields: &[(UserField, Option<&str>)]) -> Result<(), Validator> {
    let mut v = Validator::new("user");
    for (field, value) in fields {
        field.check(&mut v, *value);
    }
    v.finish()
}

// Request bodies carrying a password or token derive no `Debug`.

/// POST /v1/users body.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Registration {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

impl Validate for Registration {
    fn validate(&self) -> Result<(), Validator> {
        check_fields(&[
            (UserField::Username, self.username.as_deref()),
            (UserField::Email, self.email.as_deref()),
            (UserField::Password, self.password.as_deref()),
        ])
    }
}

/// PUT /v1/users/activate body.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ActivationRequest {
    token: Option<String>,
}

impl Validate for ActivationRequest {
    fn validate(&self) -> Result<(), Validator> {
        check_fields(&[(UserField::Token, self.token.as_deref())])
    }
}

/// POST /v1/users/authenticate body.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Credentials {
    email: Option<String>,
    password: Option<String>,
}

impl Validate for Credentials {
    fn validate(&self) -> Result<(), Validator> {
        check_fields(&[
            (UserField::Email, self.email.as_deref()),
            (UserField::Password, self.password.as_deref()),
        ])
    }
}

/// Body of the routes that only name an account by email.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmailRequest {
    email: Option<String>,
}

impl Validate for EmailRequest {
    fn validate(&self) -> Result<(), Validator> {
        check_fields(&[(UserField::Email, self.email.as_deref())])
    }
}

/// PUT /v1/users/update-password body.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PasswordUpdate {
    password: Option<String>,
    token: Option<String>,
}

impl Validate for PasswordUpdate {
    fn validate(&self) -> Result<(), Validator> {
        check_fields(&[
            (UserField::Password, self.password.as_deref()),
            (UserField::Token, self.token.as_deref()),
        ])
    }
}

/// A freshly issued authentication token.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(register_user))
        .route("/v1/users/activate", put(activate_user))
        .route("/v1/users/authenticate", post(authenticate_user))
        .route("/v1/users/password-reset-token", post(create_password_reset_token))
        .route("/v1/users/update-password", put(update_password))
        .route(
            "/v1/users/refresh-activation-token",
            post(refresh_activation_token),
        )
}

/// Take a field that validation already required.
fn take(field: Option<String>) -> String {
    field.unwrap_or_default()
}

/// A single-field `user` validation failure.
fn user_error(field: UserField, message: &str) -> AppError {
    let mut v = Validator::new("user");
    v.add_error(field.as_str(), message);
    AppError::Validation(v)
}

async fn hash_password(plaintext: String) -> Result<PasswordHash, AppError> {
    tokio::task::spawn_blocking(move || PasswordHash::create(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn verify_password(hash: PasswordHash, plaintext: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || hash.matches(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("password check task failed: {e}")))?
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Look up an account by email, reporting an unknown address on `email`.
async fn user_for_email(state: &AppState, email: Option<String>) -> Result<User, AppError> {
    match state.repos.users.get_by_email(&normalize_email(&take(email))).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(user_error(
            UserField::Email,
            "no matching email address found",
        )),
        Err(e) => Err(e.into()),
    }
}

/// Resolve a mailed token, reporting an unusable one on `token`.
async fn user_for_token(
    state: &AppState,
    scope: TokenScope,
    plaintext: Option<String>,
    rejection: &str,
) -> Result<User, AppError> {
    let hash = TokenHash::of(&take(plaintext));
    match state.repos.users.get_for_token(scope, &hash).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(user_error(UserField::Token, rejection)),
        Err(e) => Err(e.into()),
    }
}

/// POST /v1/users
async fn register_user(
    State(state): State<AppState>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let input: Registration = extract_validated_json(body)?;

    let new_user = NewUser {
        username: take(input.username),
        email: normalize_email(&take(input.email)),
        password: hash_password(take(input.password)).await?,
    };

    let user = match state.repos.users.register(new_user).await {
        Ok(user) => user,
        Err(StoreError::DuplicateUsername) => {
            return Err(user_error(
                UserField::Username,
                "this username is already taken",
            ))
        }
        Err(StoreError::DuplicateEmail) => {
            return Err(user_error(
                UserField::Email,
                "a user with this email address already exists",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    state
        .repos
        .permissions
        .add_for_owner(user.id, &[MOVIES_READ])
        .await?;

    let token = state
        .repos
        .tokens
        .new_token(user.id, TokenScope::Activation, TokenScope::Activation.lifetime())
        .await?;
    state.mail.dispatch(
        Notification::Welcome {
            username: &user.username,
            activation_token: token.plaintext(),
        }
        .render(&user.email),
    );

    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /v1/users/activate
async fn activate_user(
    State(state): State<AppState>,
    body: Result<Json<ActivationRequest>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let input: ActivationRequest = extract_validated_json(body)?;

    let mut user = user_for_token(
        &state,
        TokenScope::Activation,
        input.token,
        "invalid or expired activation token",
    )
    .await?;

    user.activated = true;
    commit(&*state.repos.users, &mut user).await?;
    state
        .repos
        .tokens
        .delete_all_for_owner_and_scope(user.id, TokenScope::Activation)
        .await?;

    tracing::info!(user_id = %user.id, "user activated");
    Ok(Json(user))
}

/// POST /v1/users/authenticate
async fn authenticate_user(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<IssuedToken>), AppError> {
    let input: Credentials = extract_validated_json(body)?;

    let user = match state
        .repos
        .users
        .get_by_email(&normalize_email(&take(input.email)))
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !verify_password(user.password.clone(), take(input.password)).await? {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(AppError::InvalidCredentials);
    }
    if !user.activated {
        return Err(AppError::NotActivated);
    }

    let token = state
        .repos
        .tokens
        .new_token(
            user.id,
            TokenScope::Authentication,
            TokenScope::Authentication.lifetime(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IssuedToken {
            token: token.plaintext().to_string(),
            expires: token.expires_at,
        }),
    ))
}

/// POST /v1/users/password-reset-token
async fn create_password_reset_token(
    State(state): State<AppState>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let input: EmailRequest = extract_validated_json(body)?;

    let user = user_for_email(&state, input.email).await?;
    if !user.activated {
        return Err(user_error(UserField::Email, "user account must be activated"));
    }

    let token = state
        .repos
        .tokens
        .new_token(
            user.id,
            TokenScope::PasswordReset,
            TokenScope::PasswordReset.lifetime(),
        )
        .await?;
    state.mail.dispatch(
        Notification::PasswordReset {
            username: &user.username,
            reset_token: token.plaintext(),
        }
        .render(&user.email),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(Message::new(
            "an email will be sent to you containing password reset instructions",
        )),
    ))
}

/// PUT /v1/users/update-password
async fn update_password(
    State(state): State<AppState>,
    body: Result<Json<PasswordUpdate>, JsonRejection>,
) -> Result<Json<Message>, AppError> {
    let input: PasswordUpdate = extract_validated_json(body)?;

    let mut user = user_for_token(
        &state,
        TokenScope::PasswordReset,
        input.token,
        "invalid or expired reset token",
    )
    .await?;

    user.password = hash_password(take(input.password)).await?;
    commit(&*state.repos.users, &mut user).await?;
    state
        .repos
        .tokens
        .delete_all_for_owner_and_scope(user.id, TokenScope::PasswordReset)
        .await?;

    tracing::info!(user_id = %user.id, "password reset");
    Ok(Json(Message::new("your password was successfully reset")))
}

/// POST /v1/users/refresh-activation-token
async fn refresh_activation_token(
    State(state): State<AppState>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let input: EmailRequest = extract_validated_json(body)?;

    let user = user_for_email(&state, input.email).await?;
    if user.activated {
        return Err(user_error(UserField::Email, "user has already been activated"));
    }

    let token = state
        .repos
        .tokens
        .new_token(user.id, TokenScope::Activation, TokenScope::Activation.lifetime())
        .await?;
    state.mail.dispatch(
        Notification::ActivationReminder {
            username: &user.username,
            activation_token: token.plaintext(),
        }
        .render(&user.email),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(Message::new(
            "an email will be sent to you containing activation instructions",
        )),
    ))
}
