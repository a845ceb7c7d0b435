//! Terminal confirmation prompts.
//!
//! Every prompt defaults to "no"; a closed or non-interactive terminal
//! counts as a refusal.

use colored::Colorize;
use dialoguer::Confirm;
use schemafix_core::executor::ConfirmationGate;

pub struct TerminalGate;

impl ConfirmationGate for TerminalGate {
    fn confirm_batch(&self, collections: &[String]) -> bool {
        print_destructive_warning(collections.len());
        confirm(&format!(
            "Proceed with fixing {} collections?",
            collections.len()
        ))
    }

    fn confirm_collection(&self, name: &str) -> bool {
        confirm(&format!("Delete and recreate '{name}'?"))
    }
}

/// Printed before any live run, whether or not a prompt follows.
pub fn print_destructive_warning(count: usize) {
    println!();
    println!(
        "{}",
        format!("This will delete and recreate {count} collections.")
            .yellow()
            .bold()
    );
    println!("{}", destructive_warning().yellow());
    println!();
}

fn destructive_warning() -> &'static str {
    "Their vectors are cleared and must be re-embedded in the host application afterwards.\n\
     There is no rollback. Each collection is missing from the store between its delete and\n\
     its recreation; if recreation fails it stays missing until recreated by hand from the\n\
     definition saved in the journal."
}

/// Ask a yes/no question, defaulting to no.
pub fn confirm(prompt: &str) -> bool {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}
