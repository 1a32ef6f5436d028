//! API Routes
//!
//! HTTP endpoint definitions. Handlers only translate between HTTP and the
//! account and auth services.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    AccessToken, Account, LedgerTransaction, LoginResult, OperationContext, TransactionType,
    UserProfile,
};
use crate::error::AppError;
use crate::handlers::{
    AccountService, AuthService, CreateAccountCommand, CreateTransactionCommand,
    CreateUserCommand, DeleteAccountResult, DeleteUserResult, LoginCommand,
    RenewAccessTokenCommand, TransactionReceipt, REQUEST_USER_HEADER,
};

/// Shared state of the HTTP layer
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub auth: AuthService,
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    /// Defaults to the requester
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub initial_balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub amount: i64,
    /// Derived from the sign of `amount` when absent
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub transfer_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountsResponse {
    pub accounts: Vec<Account>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<LedgerTransaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateAccountResponse {
    pub account_number: i64,
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
pub struct SufficientBalanceQuery {
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SufficientBalanceResponse {
    pub account_number: i64,
    pub amount: i64,
    pub sufficient: bool,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Accounts
        .route("/accounts", post(create_account))
        .route("/users/:user_id/accounts", get(get_accounts_by_user_id))
        .route("/accounts/:account_id", get(get_account))
        .route(
            "/accounts/number/:account_number",
            get(get_account_by_account_number).delete(delete_account_by_account_number),
        )
        .route(
            "/accounts/number/:account_number/validate",
            get(validate_account_number),
        )
        .route(
            "/accounts/number/:account_number/sufficient-balance",
            get(has_sufficient_balance),
        )
        // Ledger transactions
        .route(
            "/accounts/:account_id/transactions",
            post(create_transaction).get(get_transactions_by_account_id),
        )
        .route("/transactions/:transaction_id", get(get_transaction_by_id))
        // Auth
        .route("/auth/users", post(create_user))
        .route("/auth/users/:user_id", axum::routing::delete(delete_user))
        .route("/auth/login", post(login))
        .route("/auth/renew", post(renew_access_token))
        .route("/auth/me", get(get_user_profile))
}

// =========================================================================
// Account endpoints
// =========================================================================

async fn create_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let owner_id = match request.owner_id.or(context.request_user_id) {
        Some(owner_id) => owner_id,
        None => return Err(AppError::MissingHeader(REQUEST_USER_HEADER.to_string())),
    };
    let command = CreateAccountCommand::new(owner_id).with_initial_balance(request.initial_balance);

    let account = state.accounts.create_account(command, &context).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_accounts_by_user_id(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<AccountsResponse>, AppError> {
    let accounts = state
        .accounts
        .get_accounts_by_user_id(user_id, &context)
        .await?;
    Ok(Json(AccountsResponse { accounts }))
}

async fn get_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.accounts.get_account(account_id, &context).await?))
}

async fn get_account_by_account_number(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_number): Path<i64>,
) -> Result<Json<Account>, AppError> {
    let account = state
        .accounts
        .get_account_by_account_number(account_number, &context)
        .await?;
    Ok(Json(account))
}

async fn delete_account_by_account_number(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_number): Path<i64>,
) -> Result<Json<DeleteAccountResult>, AppError> {
    let result = state
        .accounts
        .delete_account_by_account_number(account_number, &context)
        .await?;
    Ok(Json(result))
}

async fn validate_account_number(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_number): Path<i64>,
) -> Result<Json<ValidateAccountResponse>, AppError> {
    let valid = state
        .accounts
        .validate_account_number(account_number, &context)
        .await?;
    Ok(Json(ValidateAccountResponse {
        account_number,
        valid,
    }))
}

async fn has_sufficient_balance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_number): Path<i64>,
    Query(query): Query<SufficientBalanceQuery>,
) -> Result<Json<SufficientBalanceResponse>, AppError> {
    let sufficient = state
        .accounts
        .has_sufficient_balance(account_number, query.amount, &context)
        .await?;
    Ok(Json(SufficientBalanceResponse {
        account_number,
        amount: query.amount,
        sufficient,
    }))
}

// =========================================================================
// Ledger transaction endpoints
// =========================================================================

async fn create_transaction(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionReceipt>), AppError> {
    let command = match request.transaction_type {
        Some(transaction_type) => {
            CreateTransactionCommand::new(account_id, request.amount, transaction_type)
        }
        None => CreateTransactionCommand::adjustment(account_id, request.amount),
    };
    let command = match request.transfer_id {
        Some(transfer_id) => command.with_transfer_id(transfer_id),
        None => command,
    };

    let receipt = state.accounts.create_transaction(command, &context).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn get_transactions_by_account_id(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let transactions = state
        .accounts
        .get_transactions_by_account_id(account_id, &context)
        .await?;
    Ok(Json(TransactionsResponse { transactions }))
}

async fn get_transaction_by_id(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<LedgerTransaction>, AppError> {
    let transaction = state
        .accounts
        .get_transaction_by_id(transaction_id, &context)
        .await?;
    Ok(Json(transaction))
}

// =========================================================================
// Auth endpoints
// =========================================================================

async fn create_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<CreateUserCommand>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let profile = state.auth.create_user(command, &context).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn login(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<LoginCommand>,
) -> Result<Json<LoginResult>, AppError> {
    Ok(Json(state.auth.login(command, &context).await?))
}

async fn renew_access_token(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<RenewAccessTokenCommand>,
) -> Result<Json<AccessToken>, AppError> {
    Ok(Json(state.auth.renew_access_token(command, &context).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<DeleteUserResult>, AppError> {
    Ok(Json(state.auth.delete_user(user_id, &context).await?))
}

async fn get_user_profile(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(state.auth.get_user_profile(&context).await?))
}
