//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::store::StateRevision;
use crate::variables::ConfigVariables;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print the configured variables (Label, Source, Field).  Values are
/// never shown.
pub fn print_variables_table(variables: &ConfigVariables) {
    if variables.is_empty() {
        info("No variables configured.");
        tip("Add a [[variable]] entry to .bwstate.toml.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Label", "Source", "Field", "Exported as"]);

    for v in variables {
        table.add_row(vec![
            v.label.clone(),
            v.describe_source(),
            v.field().to_string(),
            format!("TF_VAR_{}", v.label),
        ]);
    }

    println!("{table}");
}

/// Print the stored state revisions, most recent first.
pub fn print_revisions_table(revisions: &[StateRevision]) {
    if revisions.is_empty() {
        info("No state stored on this item yet.");
        tip("Run `bwstate wrap -- apply` to write the first revision.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Written (UTC)", "Attachment", "Size"]);

    for (i, r) in revisions.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            r.time.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            r.file_name.clone(),
            r.size.clone(),
        ]);
    }

    println!("{table}");
}
