//! 401(k) account ledger.
//!
//! Every user owns one [`Account`] with spendable `funds` and a locked
//! retirement balance. Contributions move money from funds into the
//! retirement balance and earn a 50% employer match; withdrawals move it
//! back without a match.
//!
//! Accounts live in memory and are created on first lookup. Each account sits
//! behind its own mutex: a mutation holds the guard for its whole
//! check-and-update sequence, and a second mutation arriving meanwhile is
//! turned away with [`LedgerError::Busy`] instead of queueing.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

pub const EMPLOYER_MATCH_RATE: f64 = 0.5;

/// Figures a reset always restores, whatever the configured starting figures.
pub const RESET_FUNDS: f64 = 10_000.0;
pub const RESET_BALANCE: f64 = 0.0;

/// Starting figures for newly created accounts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountDefaults {
    pub funds: f64,
    pub retirement_balance: f64,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            funds: RESET_FUNDS,
            retirement_balance: RESET_BALANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Account {
    pub funds: f64,
    #[serde(rename = "401k_balance")]
    pub retirement_balance: f64,
    #[serde(skip)]
    pub reset_used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub amount: f64,
    pub employer_match: f64,
}

impl Contribution {
    pub fn total(&self) -> f64 {
        self.amount + self.employer_match
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum LedgerError {
    #[error("Invalid contribution amount!")]
    InvalidContribution { amount: f64 },
    #[error("Insufficient funds!")]
    InsufficientFunds { requested: f64, available: f64 },
    #[error("Invalid withdrawal amount!")]
    InvalidWithdrawal { amount: f64 },
    #[error("Insufficient 401(k) balance!")]
    InsufficientBalance { requested: f64, available: f64 },
    #[error("Account reset already used!")]
    ResetAlreadyUsed,
    #[error("Transaction in progress, try again!")]
    Busy,
}

fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount > 0.0
}

impl Account {
    pub fn new(defaults: AccountDefaults) -> Self {
        Self {
            funds: defaults.funds,
            retirement_balance: defaults.retirement_balance,
            reset_used: false,
        }
    }

    pub fn contribute(&mut self, amount: f64) -> Result<Contribution, LedgerError> {
        if !is_valid_amount(amount) {
            return Err(LedgerError::InvalidContribution { amount });
        }
        if amount > self.funds {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available: self.funds,
            });
        }

        let contribution = Contribution {
            amount,
            employer_match: amount * EMPLOYER_MATCH_RATE,
        };
        self.funds -= amount;
        self.retirement_balance += contribution.total();
        Ok(contribution)
    }

    pub fn withdraw(&mut self, amount: f64) -> Result<f64, LedgerError> {
        if !is_valid_amount(amount) {
            return Err(LedgerError::InvalidWithdrawal { amount });
        }
        if amount > self.retirement_balance {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: self.retirement_balance,
            });
        }

        self.retirement_balance -= amount;
        self.funds += amount;
        Ok(amount)
    }

    /// Restores [`RESET_FUNDS`] and [`RESET_BALANCE`]. With `one_time` set,
    /// only the first reset of the account's lifetime is honoured.
    pub fn reset(&mut self, one_time: bool) -> Result<(), LedgerError> {
        if one_time && self.reset_used {
            return Err(LedgerError::ResetAlreadyUsed);
        }
        self.funds = RESET_FUNDS;
        self.retirement_balance = RESET_BALANCE;
        self.reset_used = true;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSettings {
    pub defaults: AccountDefaults,
    pub one_time_reset: bool,
    /// Artificial delay applied while an account is locked for mutation.
    pub simulated_latency: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            defaults: AccountDefaults::default(),
            one_time_reset: false,
            simulated_latency: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccountStore {
    accounts: Arc<DashMap<String, Arc<Mutex<Account>>>>,
    settings: LedgerSettings,
}

impl AccountStore {
    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            settings,
        }
    }

    fn handle(&self, username: &str) -> Arc<Mutex<Account>> {
        if let Some(existing) = self.accounts.get(username) {
            return Arc::clone(existing.value());
        }
        let defaults = self.settings.defaults;
        let entry = self
            .accounts
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Account::new(defaults))));
        Arc::clone(entry.value())
    }

    /// Current figures for `username`, creating the account if needed.
    pub async fn snapshot(&self, username: &str) -> Account {
        let handle = self.handle(username);
        let account = handle.lock().await;
        *account
    }

    pub async fn contribute(
        &self,
        username: &str,
        amount: f64,
    ) -> Result<(Contribution, Account), LedgerError> {
        if !is_valid_amount(amount) {
            return Err(LedgerError::InvalidContribution { amount });
        }
        self.mutate(username, |account| account.contribute(amount))
            .await
    }

    pub async fn withdraw(&self, username: &str, amount: f64) -> Result<Account, LedgerError> {
        if !is_valid_amount(amount) {
            return Err(LedgerError::InvalidWithdrawal { amount });
        }
        self.mutate(username, |account| account.withdraw(amount))
            .await
            .map(|(_, account)| account)
    }

    pub async fn reset(&self, username: &str) -> Result<Account, LedgerError> {
        let one_time = self.settings.one_time_reset;
        self.mutate(username, |account| account.reset(one_time))
            .await
            .map(|(_, account)| account)
    }

    async fn mutate<T>(
        &self,
        username: &str,
        op: impl FnOnce(&mut Account) -> Result<T, LedgerError>,
    ) -> Result<(T, Account), LedgerError> {
        let handle = self.handle(username);
        let mut account = handle.try_lock().map_err(|_| LedgerError::Busy)?;

        if !self.settings.simulated_latency.is_zero() {
            tokio::time::sleep(self.settings.simulated_latency).await;
        }

        let outcome = op(&mut *account)?;
        Ok((outcome, *account))
    }
}
