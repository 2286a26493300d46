//! Terminal prompts for migration variables.

use dialoguer::{Confirm, Input, Password};
use prestaops::{CredentialKey, MigrateError, Prompt, Result};
use std::path::Path;

/// Prompts on the controlling terminal. Passwords are read without echo.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&self, key: CredentialKey) -> Result<String> {
        let prompt = format!("Enter {}", key);

        let answer = if key.is_secret() {
            Password::new()
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
        } else {
            Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        };

        answer.map_err(|e| MigrateError::Prompt(e.to_string()))
    }
}

/// Ask before printing stored passwords.
pub fn confirm_show_variables(path: &Path) -> Result<bool> {
    println!("This prints every variable in {}, passwords included.", path.display());

    Confirm::new()
        .with_prompt("Show migration variables?")
        .default(false)
        .interact()
        .map_err(|e| MigrateError::Prompt(e.to_string()))
}
