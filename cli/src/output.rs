//! Console formatting

use concierge_application::HandleMessageOutput;
use concierge_infrastructure::ServerStatus;

/// Fixed-width table of [`ServerStatus`] rows.
pub fn format_status(rows: &[ServerStatus]) -> String {
    if rows.is_empty() {
        return "No tool servers configured.\n".to_string();
    }
    let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max(6);

    let mut out = format!(
        "{:<name_width$}  {:<12}  {:>5}  {:>8}  ENDPOINT\n",
        "SERVER", "STATE", "TOOLS", "ATTEMPTS"
    );
    for row in rows {
        let state = if row.enabled {
            row.state.as_str()
        } else {
            "disabled"
        };
        out.push_str(&format!(
            "{:<name_width$}  {:<12}  {:>5}  {:>8}  {}\n",
            row.name, state, row.capabilities, row.handshake_attempts, row.endpoint
        ));
    }
    out
}

/// One-line footer describing how an answer was produced.
pub fn format_summary(output: &HandleMessageOutput) -> String {
    match &output.summary {
        Some(summary) => {
            let used = if summary.capabilities_used.is_empty() {
                "none".to_string()
            } else {
                summary.capabilities_used.join(", ")
            };
            format!(
                "[{} | steps: {} | tool calls: {} ({} failed) | tools: {}]",
                output.tier, summary.reasoning_steps, summary.tool_calls, summary.failed_calls, used
            )
        }
        None => format!("[{}]", output.tier),
    }
}
