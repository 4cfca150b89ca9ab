//! Commands served by the agent's HTTP surface

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::output::{format_detections, format_health, print_error, print_success, print_warning};

/// Independent check exposed at `/checks/*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CheckKind {
    Notifications,
    ExamMode,
}

impl CheckKind {
    fn path(&self) -> &'static str {
        match self {
            CheckKind::Notifications => "/checks/notifications",
            CheckKind::ExamMode => "/checks/exam-mode",
        }
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

/// Show agent liveness
pub async fn health_command(http_port: u16, json: bool) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/health", http_port);
    let response = http_client()?
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach agent at {}", url))?;

    let body: Value = response
        .error_for_status()
        .context("Agent reported an error")?
        .json()
        .await
        .context("Invalid health response")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print!("{}", format_health(&body));
    }
    Ok(())
}

/// Run one independent check and report whether it completed the pair
pub async fn check_command(http_port: u16, kind: CheckKind) -> Result<()> {
    let url = format!("http://127.0.0.1:{}{}", http_port, kind.path());
    let response = http_client()?
        .post(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach agent at {}", url))?;

    let status = response.status();
    let body: Value = response.json().await.context("Invalid check response")?;

    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("unknown error").to_string();
        print_error(&format!("Check failed ({}): {}", status, message));
        anyhow::bail!(message);
    }

    if body["passed"].as_bool().unwrap_or(false) {
        print_success(&format!("{} check passed", body["check"].as_str().unwrap_or("-")));
        if body["confirmed"].as_bool().unwrap_or(false) {
            print_success("Both checks passed within the window");
        }
    } else {
        print_warning(&format!("{} check failed", body["check"].as_str().unwrap_or("-")));
        let detections: Vec<vg_protocol::Detection> =
            serde_json::from_value(body["detections"].clone()).unwrap_or_default();
        println!("{}", format_detections(&detections));
    }
    Ok(())
}
