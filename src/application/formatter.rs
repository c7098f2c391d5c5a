//! Terminal output for jobs and export results.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{FileOperation, FileOperationState};

use super::export_service::{ArtifactOutcome, ExportOutcome};

/// Formats a table listing of export jobs.
#[must_use]
pub fn format_jobs_table(jobs: &[FileOperation]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Created", "Format", "State", "Name"]);

    for job in jobs {
        let state = match &job.state {
            FileOperationState::Error => format!("error: {}", truncate(&job.error_message(), 30)),
            other => other.to_string(),
        };

        table.add_row(vec![
            job.id.clone(),
            job.created_at.format("%Y-%m-%d %H:%M").to_string(),
            job.format.to_string(),
            state,
            truncate(&job.name, 35),
        ]);
    }

    table.to_string()
}

/// Formats the summary printed after an export run.
#[must_use]
pub fn format_outcome(outcome: &ExportOutcome) -> String {
    let artifact = match &outcome.artifact {
        ArtifactOutcome::Saved { path, bytes } => format!(
            "  Saved: {} ({} bytes)",
            path.display().to_string().cyan(),
            bytes.to_string().cyan()
        ),
        ArtifactOutcome::Extracted { path, report } => format!(
            "  Extracted to: {}\n  Files: {}\n  Directories: {}\n  Skipped: {}",
            path.display().to_string().cyan(),
            report.files.to_string().green(),
            report.directories.to_string().blue(),
            report.skipped.to_string().yellow()
        ),
    };

    let mut out = format!(
        "{}\n  Job: {} ({})\n{artifact}",
        "Export complete".bold(),
        outcome.job.id,
        outcome.job.format
    );

    if outcome.cleanup.deleted > 0 || outcome.cleanup.failed > 0 {
        out.push_str(&format!(
            "\n  Jobs deleted: {}",
            outcome.cleanup.deleted.to_string().cyan()
        ));
        if outcome.cleanup.failed > 0 {
            out.push_str(&format!(
                " ({} failed)",
                outcome.cleanup.failed.to_string().red()
            ));
        }
    }

    out
}

/// Truncates a string to max characters with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
