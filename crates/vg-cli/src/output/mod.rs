//! Terminal output for the CLI
//!
//! Tables for detections, text blocks for scan status and step outcomes,
//! one-line renderings of pushed events, and coloured status messages.

use serde_json::Value;
use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use vg_protocol::{Detection, EventMessage, ScanStatus, StepOutcome, SystemReport};

/// Format detections as an ASCII table
pub fn format_detections(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return "No detections".to_string();
    }

    #[derive(Tabled)]
    struct DetectionRow {
        #[tabled(rename = "TYPE")]
        kind: String,
        #[tabled(rename = "SEVERITY")]
        severity: String,
        #[tabled(rename = "MESSAGE")]
        message: String,
        #[tabled(rename = "DETAILS")]
        details: String,
    }

    let rows: Vec<DetectionRow> = detections
        .iter()
        .map(|d| DetectionRow {
            kind: d.kind.clone(),
            severity: d.severity.to_string(),
            message: d.message.clone(),
            details: format_details(d),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(100))
        .to_string()
}

/// Format the orchestrator's scan status
pub fn format_status(status: &ScanStatus) -> String {
    let mut output = String::new();

    output.push_str(&format!("Scan State: {}\n", status.state));
    output.push_str(&format!(
        "Scan ID: {}\n",
        status.scan_id.as_deref().unwrap_or("-")
    ));
    output.push_str(&format!(
        "Current Step: {}\n",
        status
            .current_step
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    output.push_str(&format!(
        "Can Start New Scan: {}\n",
        if status.can_start_new_scan { "yes" } else { "no" }
    ));

    let summary = status.detections.summary();
    output.push_str(&format!(
        "Detections: {} notification, {} security\n",
        summary.notification_issues, summary.security_threats
    ));

    if !status.detections.is_empty() {
        let all: Vec<Detection> = status
            .detections
            .notifications
            .iter()
            .chain(status.detections.security.iter())
            .cloned()
            .collect();
        output.push('\n');
        output.push_str(&format_detections(&all));
        output.push('\n');
    }

    output
}

/// Format the result of a start or retry
pub fn format_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Blocked {
            step,
            message,
            detections,
            system_report,
            ..
        } => {
            let mut output = format!("Blocked at step {}: {}\n\n", step, message);
            output.push_str(&format_detections(detections));
            output.push('\n');
            if let Some(report) = system_report {
                output.push('\n');
                output.push_str(&format_system(report));
            }
            output.push_str(&format!("\nFix the issues above, then run: vigil retry {}\n", step));
            output
        }
        StepOutcome::Completed { report } => {
            let mut output = format!("Scan {} completed with no issues\n", report.scan_id);
            output.push_str(&format!(
                "Duration: {}\n",
                format_millis(report.completed_at.saturating_sub(report.started_at))
            ));
            if let Some(system) = &report.system_report {
                output.push('\n');
                output.push_str(&format_system(system));
            }
            output
        }
    }
}

/// Format a system snapshot
pub fn format_system(report: &SystemReport) -> String {
    format!(
        "Host: {}\nProcesses: {}\nCPU: {:.1}%\nMemory: {:.1}%\nLoad (1m): {:.2}\n",
        report.hostname,
        report.process_count,
        report.cpu_percent,
        report.memory_percent,
        report.load_avg_1m
    )
}

/// One line per pushed event
pub fn format_event(event: &EventMessage) -> String {
    if event.payload.is_null() {
        format!("[{}] {}", event.ts, event.name)
    } else {
        format!("[{}] {} {}", event.ts, event.name, event.payload)
    }
}

/// Format the daemon's `/health` body
pub fn format_health(health: &Value) -> String {
    let field = |name: &str| match &health[name] {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    };

    let mut output = String::new();
    output.push_str(&format!("Agent Status: {}\n", field("status")));
    output.push_str(&format!("Version: {}\n", field("version")));
    output.push_str(&format!(
        "Uptime: {}\n",
        format_duration(health["uptimeSecs"].as_u64().unwrap_or(0))
    ));
    output.push_str(&format!("Scan State: {}\n", field("scanState")));
    output.push_str(&format!("Bus Subscribers: {}\n", field("subscribers")));

    let pending = &health["pendingChecks"];
    output.push_str(&format!(
        "Pending Checks: notifications={} exam-mode={} window-armed={}\n",
        pending["notifComplete"].as_bool().unwrap_or(false),
        pending["suspiciousComplete"].as_bool().unwrap_or(false),
        pending["expiryArmed"].as_bool().unwrap_or(false),
    ));
    output
}

fn format_details(detection: &Detection) -> String {
    if detection.details.is_empty() {
        return "-".to_string();
    }
    detection
        .details
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{}={}", k, s),
            other => format!("{}={}", k, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_millis(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
