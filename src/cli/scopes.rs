use anyhow::{Result, bail};
use console::style;

use crate::core::graph::{
    SCOPE_CALENDARS, SCOPE_CHANNEL_MESSAGE, SCOPE_MAIL_SEND, SCOPE_USER_READ, check_scopes,
};
use crate::core::terminal::{GuideSection, print_success};

/// Scopes every workflow action needs between them.
const DEFAULT_REQUIRED: &[&str] = &[
    SCOPE_USER_READ,
    SCOPE_MAIL_SEND,
    SCOPE_CALENDARS,
    SCOPE_CHANNEL_MESSAGE,
];

pub(super) fn run_scopes(token: &str, required: &[String]) -> Result<()> {
    let required: Vec<&str> = if required.is_empty() {
        DEFAULT_REQUIRED.to_vec()
    } else {
        required.iter().map(String::as_str).collect()
    };
    let check = check_scopes(token, &required);

    let granted = if check.actual.is_empty() {
        style("none").dim().to_string()
    } else {
        check.actual.join(" ")
    };
    GuideSection::new("Token scopes")
        .status("Granted", &granted)
        .status("Required", &required.join(" "))
        .print();

    if !check.has_all {
        bail!("Missing required permissions: {}", check.missing.join(", "));
    }
    print_success("Token carries every required scope.");
    Ok(())
}
