//! Master password prompts and login.

use anyhow::{anyhow, bail, Context, Result};
use keeper_core::account::load_account;
use keeper_core::{DualTableStore, KeeperError};
use std::path::Path;
use zeroize::Zeroizing;

/// Master password for login, or the new password for `init`
pub const PASSWORD_ENV: &str = "KEEPER_PASSWORD";
pub const PASSWORD_CONFIRM_ENV: &str = "KEEPER_PASSWORD_CONFIRM";
/// New password for `passwd`
pub const NEW_PASSWORD_ENV: &str = "KEEPER_NEW_PASSWORD";

fn from_env(var: &str) -> Option<Zeroizing<String>> {
    std::env::var(var)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn prompt(text: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(text)
        .map(Zeroizing::new)
        .map_err(|e| anyhow!("password prompt: {e}"))
}

pub fn read_password(text: &str) -> Result<Zeroizing<String>> {
    match from_env(PASSWORD_ENV) {
        Some(pw) => Ok(pw),
        None => prompt(text),
    }
}

/// A new password and its confirmation. When the password comes from
/// `var`, the confirmation comes from `KEEPER_PASSWORD_CONFIRM` if set.
pub fn read_new_password(var: &str) -> Result<(Zeroizing<String>, Zeroizing<String>)> {
    if let Some(pw) = from_env(var) {
        let confirm = from_env(PASSWORD_CONFIRM_ENV).unwrap_or_else(|| pw.clone());
        return Ok((pw, confirm));
    }
    let first = prompt("New master password: ")?;
    let second = prompt("Confirm master password: ")?;
    Ok((first, second))
}

/// Checks the master password. The attempt is logged either way.
pub fn login(dir: &Path, store: &DualTableStore, user: Option<&str>) -> Result<()> {
    let account = load_account(dir)?
        .ok_or(KeeperError::NoAccount)
        .context("run `keeper init --username <name>` first")?;
    let user = user.unwrap_or(account.username.as_str());
    let password = read_password("Master password: ")?;
    if !account.log_in(store, user, &password)? {
        bail!("login failed for {user}");
    }
    Ok(())
}
