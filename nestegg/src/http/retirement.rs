//! `/apps/401k` handlers.

use axum::extract::State;
use axum::response::Html;
use axum::Json;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ledger::LedgerError;
use crate::rate_limit::Endpoint;

use super::auth::SessionUser;
use super::error::ApiError;
use super::responses::{
    dashboard_page, format_money, BalanceResponse, FundsResponse, TransactionResponse,
};
use super::state::AppState;

/// Contributions above this are flagged in the security log.
const LARGE_CONTRIBUTION: f64 = 5_000.0;

pub async fn dashboard(user: SessionUser) -> Html<String> {
    debug!(user = %user.username, "401k dashboard requested");
    Html(dashboard_page(&user.username))
}

pub async fn balance(State(state): State<AppState>, user: SessionUser) -> Json<BalanceResponse> {
    let account = state.accounts.snapshot(&user.username).await;
    Json(BalanceResponse::from(account))
}

pub async fn funds(State(state): State<AppState>, user: SessionUser) -> Json<FundsResponse> {
    let account = state.accounts.snapshot(&user.username).await;
    Json(FundsResponse {
        funds: account.funds,
    })
}

pub async fn contribute(
    State(state): State<AppState>,
    user: SessionUser,
    body: Bytes,
) -> Result<Json<TransactionResponse>, ApiError> {
    enforce_limit(&state, &user, Endpoint::Contribute)?;
    let amount = parse_amount(&body);

    let (contribution, account) = state
        .accounts
        .contribute(&user.username, amount)
        .await
        .map_err(|err| reject(&user, err))?;

    if amount > LARGE_CONTRIBUTION {
        info!(
            target: "security",
            user = %user.username,
            amount,
            "large transaction alert"
        );
    }
    info!(
        user = %user.username,
        amount,
        employer_match = contribution.employer_match,
        "contribution applied"
    );

    let message = format!(
        "Contributed ${}. Employer matched ${}!",
        format_money(contribution.amount),
        format_money(contribution.employer_match)
    );
    Ok(Json(TransactionResponse::new(message, account)))
}

pub async fn withdraw(
    State(state): State<AppState>,
    user: SessionUser,
    body: Bytes,
) -> Result<Json<TransactionResponse>, ApiError> {
    enforce_limit(&state, &user, Endpoint::Withdraw)?;
    let amount = parse_amount(&body);

    let account = state
        .accounts
        .withdraw(&user.username, amount)
        .await
        .map_err(|err| reject(&user, err))?;

    info!(user = %user.username, amount, "withdrawal applied");
    let message = format!("Withdrew ${} from 401(k).", format_money(amount));
    Ok(Json(TransactionResponse::new(message, account)))
}

pub async fn reset(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<TransactionResponse>, ApiError> {
    enforce_limit(&state, &user, Endpoint::Reset)?;
    info!(target: "security", user = %user.username, "account reset request");

    let account = state
        .accounts
        .reset(&user.username)
        .await
        .map_err(|err| reject(&user, err))?;

    Ok(Json(TransactionResponse::new(
        String::from("Account reset successfully!"),
        account,
    )))
}

pub(super) fn enforce_limit(
    state: &AppState,
    user: &SessionUser,
    endpoint: Endpoint,
) -> Result<(), ApiError> {
    state.limiter.check(&user.username, endpoint).map_err(|limited| {
        warn!(
            target: "security",
            user = %user.username,
            endpoint = %limited.endpoint,
            max_requests = limited.max_requests,
            window = ?limited.window,
            "rate limit exceeded"
        );
        ApiError::from(limited)
    })
}

/// Reads `amount` from a JSON object body. Anything that is not a JSON
/// number counts as zero, which the ledger rejects as invalid.
fn parse_amount(body: &[u8]) -> f64 {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|payload| payload.get("amount").and_then(Value::as_f64))
        .unwrap_or(0.0)
}

/// Logs a ledger rejection as suspicious activity and converts it.
fn reject(user: &SessionUser, err: LedgerError) -> ApiError {
    let user = user.username.as_str();
    match err {
        LedgerError::InvalidContribution { amount } => {
            warn!(target: "security", user, amount, "invalid contribution attempt");
        }
        LedgerError::InvalidWithdrawal { amount } => {
            warn!(target: "security", user, amount, "invalid withdrawal attempt");
        }
        LedgerError::InsufficientFunds {
            requested,
            available,
        } => {
            warn!(target: "security", user, requested, available, "attempted over-contribution");
        }
        LedgerError::InsufficientBalance {
            requested,
            available,
        } => {
            warn!(target: "security", user, requested, available, "attempted over-withdrawal");
        }
        LedgerError::ResetAlreadyUsed => {
            warn!(target: "security", user, "repeated reset attempt rejected");
        }
        LedgerError::Busy => {
            warn!(target: "security", user, "account lock contention");
        }
    }
    ApiError::from(err)
}
