use docsync_lib::sync::{DiagnosticsReport, Reachability, SyncOutcome, SyncStatus};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// One line per domain, followed by a summary line
pub fn render_outcome(outcome: &SyncOutcome, use_color: bool) -> String {
    if outcome.skipped {
        return paint("Skipped: a sync is already in progress", Color::YELLOW, use_color);
    }

    let mut lines = Vec::new();
    for (domain, result) in &outcome.domains {
        if result.success {
            lines.push(format!("  {} {}", paint("ok", Color::GREEN, use_color), domain));
        } else {
            let phase = result
                .phase
                .map(|p| format!(" ({:?})", p).to_lowercase())
                .unwrap_or_default();
            lines.push(format!(
                "  {} {}{}: {}",
                paint("failed", Color::RED, use_color),
                domain,
                phase,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    let failed = outcome.failed_domains().len();
    let summary = if outcome.success {
        paint(
            &format!("Synced {} domains in {}ms", outcome.domains.len(), outcome.duration_ms),
            Color::BOLD,
            use_color,
        )
    } else {
        paint(
            &format!("{} of {} domains failed", failed, outcome.domains.len()),
            Color::BOLD,
            use_color,
        )
    };
    lines.push(summary);
    lines.join("\n")
}

pub fn render_diagnostics(report: &DiagnosticsReport, status: &SyncStatus, use_color: bool) -> String {
    let mut lines = Vec::new();

    let identity = match (&report.user, report.authenticated) {
        (Some(user), _) => format!("Signed in as {}", user.login),
        (None, true) => "Signed in (identity unavailable)".to_string(),
        (None, false) => "Not signed in".to_string(),
    };
    lines.push(paint(&identity, Color::BOLD, use_color));

    let last_sync = report
        .last_sync
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    lines.push(format!("Last sync: {}", last_sync));
    if let Some(error) = &status.error {
        lines.push(format!("Last error: {}", paint(error, Color::RED, use_color)));
    }

    lines.push(String::new());
    for (domain, reachability) in &report.reachability {
        let id = report
            .resource_ids
            .get(domain)
            .map(String::as_str)
            .unwrap_or("-");
        let state = match reachability {
            Reachability::Reachable => paint("reachable", Color::GREEN, use_color),
            Reachability::Unreachable { error } => {
                format!("{} {}", paint("unreachable", Color::RED, use_color), error)
            }
            Reachability::Unprovisioned => paint("not provisioned", Color::DIM, use_color),
        };
        lines.push(format!("  {:<12} {:<38} {}", domain.key(), id, state));
    }

    if !report.recommendations.is_empty() {
        lines.push(String::new());
        lines.push("Recommended:".to_string());
        for recommendation in &report.recommendations {
            lines.push(format!("  - {}", paint(&recommendation.to_string(), Color::YELLOW, use_color)));
        }
    }

    lines.join("\n")
}
