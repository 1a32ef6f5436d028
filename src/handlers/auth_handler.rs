//! Auth Service
//!
//! User lifecycle and token operations on the same idempotency and retry core
//! as the account service.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::user::{normalize_email, validate_password};
use crate::domain::{AccessToken, LoginResult, OperationContext, UserProfile};
use crate::error::{AppError, AppResult};
use crate::security::{hash_refresh_token, PasswordHasher, TokenIssuer};
use crate::store::users;
use crate::txn::{IsolationLevel, TransactionExecutor};

use super::{
    idempotency_request, require_requester, CreateUserCommand, DeleteUserResult, LoginCommand,
    RenewAccessTokenCommand,
};

/// Scope prefix of auth service idempotency keys
pub const AUTH_SERVICE_SCOPE: &str = "auth";

#[derive(Clone)]
pub struct AuthService {
    executor: TransactionExecutor,
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(
        executor: TransactionExecutor,
        hasher: Arc<dyn PasswordHasher>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            executor,
            hasher,
            tokens,
        }
    }

    /// Register a user. Keys are scoped to the service since there is no principal yet.
    pub async fn create_user(
        &self,
        command: CreateUserCommand,
        context: &OperationContext,
    ) -> AppResult<UserProfile> {
        let email = normalize_email(&command.email)?;
        validate_password(&command.password)?;
        let request = idempotency_request(context, AUTH_SERVICE_SCOPE, None)?;
        let password_hash = self.hash_password(command.password).await?;

        let profile = self
            .executor
            .run_idempotent(
                "create_user",
                IsolationLevel::ReadCommitted,
                request,
                move |conn| {
                    let email = email.clone();
                    let password_hash = password_hash.clone();
                    Box::pin(async move {
                        let user = users::insert_user(conn, &email, &password_hash)
                            .await
                            .map_err(|e| match e {
                                AppError::AlreadyExists(_) => {
                                    AppError::AlreadyExists(format!("user with email {}", email))
                                }
                                other => other,
                            })?;
                        Ok(user.profile())
                    })
                },
            )
            .await?;

        tracing::info!(user_id = %profile.user_id, "User created");
        Ok(profile)
    }

    /// Check credentials, then issue an access token and a refresh token.
    ///
    /// The key is scoped to the authenticated user; a replay returns the same pair.
    pub async fn login(
        &self,
        command: LoginCommand,
        context: &OperationContext,
    ) -> AppResult<LoginResult> {
        let email = normalize_email(&command.email).map_err(|_| AppError::NotAuthenticated)?;

        let user = {
            let mut conn = self.executor.pool().acquire().await?;
            users::find_by_email(&mut *conn, &email).await?
        };
        let user = match user {
            Some(user) => user,
            None => {
                tracing::warn!("Login for unknown email rejected");
                return Err(AppError::NotAuthenticated);
            }
        };

        if !self
            .verify_password(command.password, user.password_hash.clone())
            .await?
        {
            tracing::warn!(user_id = %user.user_id, "Login with wrong password rejected");
            return Err(AppError::NotAuthenticated);
        }

        let request = idempotency_request(context, AUTH_SERVICE_SCOPE, Some(user.user_id))?;
        let tokens = self.tokens.clone();
        let user_id = user.user_id;

        let result = self
            .executor
            .run_idempotent("login", IsolationLevel::ReadCommitted, request, move |conn| {
                let tokens = tokens.clone();
                Box::pin(async move {
                    let access_token = tokens.issue_access_token(user_id)?;
                    let (refresh_token, refresh_hash) = tokens.new_refresh_token();
                    let refresh_ttl = tokens.refresh_ttl();
                    let expires_at = Utc::now()
                        + chrono::Duration::from_std(refresh_ttl).map_err(|e| {
                            AppError::Internal(format!("refresh token ttl out of range: {}", e))
                        })?;

                    users::insert_refresh_token(conn, user_id, &refresh_hash, expires_at).await?;

                    Ok(LoginResult {
                        user_id,
                        access_token,
                        refresh_token,
                        refresh_token_expires_in_secs: refresh_ttl.as_secs(),
                    })
                })
            })
            .await?;

        tracing::info!(user_id = %user_id, "User logged in");
        Ok(result)
    }

    /// Issue a new access token for a refresh token owned by the requester.
    pub async fn renew_access_token(
        &self,
        command: RenewAccessTokenCommand,
        context: &OperationContext,
    ) -> AppResult<AccessToken> {
        let requester = require_requester(context)?;
        let request = idempotency_request(context, AUTH_SERVICE_SCOPE, Some(requester))?;
        let token_hash = hash_refresh_token(&command.refresh_token);
        let tokens = self.tokens.clone();

        self.executor
            .run_idempotent(
                "renew_access_token",
                IsolationLevel::ReadCommitted,
                request,
                move |conn| {
                    let tokens = tokens.clone();
                    let token_hash = token_hash.clone();
                    Box::pin(async move {
                        let record = users::find_refresh_token(conn, &token_hash)
                            .await?
                            .ok_or(AppError::NotAuthorized)?;

                        if record.user_id != requester {
                            tracing::warn!(
                                requester = %requester,
                                "Refresh token of another user presented"
                            );
                            return Err(AppError::NotAuthorized);
                        }
                        if record.is_expired_at(Utc::now()) {
                            return Err(AppError::NotAuthenticated);
                        }

                        tokens.issue_access_token(requester)
                    })
                },
            )
            .await
    }

    /// Delete the requester's own user; refresh tokens cascade.
    pub async fn delete_user(
        &self,
        user_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<DeleteUserResult> {
        let requester = require_requester(context)?;
        if requester != user_id {
            tracing::warn!(requester = %requester, user_id = %user_id, "User deletion for another user rejected");
            return Err(AppError::NotAuthorized);
        }
        let request = idempotency_request(context, AUTH_SERVICE_SCOPE, Some(requester))?;

        let result = self
            .executor
            .run_idempotent(
                "delete_user",
                IsolationLevel::ReadCommitted,
                request,
                move |conn| {
                    Box::pin(async move {
                        if !users::delete_user(conn, user_id).await? {
                            return Err(AppError::NotFound(format!("user {}", user_id)));
                        }
                        Ok(DeleteUserResult { user_id })
                    })
                },
            )
            .await?;

        tracing::info!(user_id = %user_id, "User deleted");
        Ok(result)
    }

    pub async fn get_user_profile(&self, context: &OperationContext) -> AppResult<UserProfile> {
        let requester = require_requester(context)?;
        let mut conn = self.executor.pool().acquire().await?;

        let user = users::find_by_id(&mut *conn, requester)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", requester)))?;

        Ok(user.profile())
    }

    // Argon2 is CPU-bound; keep it off the async workers
    async fn hash_password(&self, password: String) -> AppResult<String> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, password: String, stored_hash: String) -> AppResult<bool> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|e| AppError::Internal(format!("password verification task failed: {}", e)))?
    }
}
