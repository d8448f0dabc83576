use serde::{Deserialize, Serialize};

use crate::ledger::Account;
use crate::notes::Note;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub funds: f64,
    #[serde(rename = "401k_balance")]
    pub retirement_balance: f64,
}

impl From<Account> for BalanceResponse {
    fn from(account: Account) -> Self {
        Self {
            funds: account.funds,
            retirement_balance: account.retirement_balance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FundsResponse {
    pub funds: f64,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub message: String,
    pub funds: f64,
    #[serde(rename = "401k_balance")]
    pub retirement_balance: f64,
}

impl TransactionResponse {
    pub fn new(message: String, account: Account) -> Self {
        Self {
            message,
            funds: account.funds,
            retirement_balance: account.retirement_balance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotesResponse {
    pub notes: Vec<Note>,
}

#[derive(Debug, Serialize)]
pub struct NoteCreatedResponse {
    pub message: &'static str,
    pub note: Note,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub notes: Vec<Note>,
}

#[derive(Debug, Serialize)]
pub struct DebugUser {
    pub username: String,
    pub admin: bool,
    pub funds: f64,
    #[serde(rename = "401k_balance")]
    pub retirement_balance: f64,
}

#[derive(Debug, Serialize)]
pub struct DebugResponse {
    pub users: Vec<DebugUser>,
    pub notes: Vec<Note>,
}

/// Dollar figure with two decimals, e.g. `1500.00`.
pub fn format_money(amount: f64) -> String {
    format!("{amount:.2}")
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn dashboard_page(username: &str) -> String {
    let username = escape_html(username);
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>401(k) Simulator</title></head>\n\
         <body>\n<h1>401(k) Simulator</h1>\n<p>Welcome, {username}!</p>\n\
         <p>Contributions earn a 50% employer match.</p>\n</body>\n</html>\n"
    )
}
