//! Formatted output helpers for CLI commands.

use std::fmt::Write as _;

use berth_common::types::PortSpec;
use berth_provision::journal::ProvisionRecord;
use berth_recipe::ProvisionPlan;

/// Length of IDs shown in tables.
const SHORT_ID_LEN: usize = 8;

/// First characters of an ID, enough for `berth logs`.
#[must_use]
pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// Comma-separated port list, or `-`.
#[must_use]
pub fn format_ports(ports: &[PortSpec]) -> String {
    if ports.is_empty() {
        return "-".into();
    }
    ports
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders the numbered provisioning steps of a plan.
#[must_use]
pub fn render_plan(plan: &ProvisionPlan) -> String {
    let mut out = String::new();
    let mut step = 0;
    let mut line = |out: &mut String, what: &str, detail: &str| {
        step += 1;
        let _ = writeln!(out, "  {step}. {what:<22} {detail}");
    };

    line(&mut out, "establish root", &plan.workdir.display().to_string());
    for copy in &plan.copies {
        line(
            &mut out,
            "populate root",
            &format!("{} -> {}", copy.sources.join(" "), copy.dest),
        );
    }
    let module_path = plan.env_value(&plan.module_path_var).unwrap_or_default();
    line(
        &mut out,
        "configure environment",
        &format!("{}={module_path}", plan.module_path_var),
    );
    for manifest in &plan.manifests {
        line(&mut out, "validate manifest", &manifest.display().to_string());
    }
    for cmd in &plan.install {
        line(&mut out, "install dependencies", &cmd.to_string());
    }
    line(&mut out, "declare ports", &format_ports(&plan.ports));
    line(&mut out, "launch", &plan.entrypoint.to_string());
    out
}

/// Renders journal records as a table, newest last, with a count of
/// attempts that have not reached a terminal state.
#[must_use]
pub fn status_table(records: &[ProvisionRecord]) -> String {
    let mut out = format!(
        "{:<10} {:<24} {:<20} {:<8} {:<6} {:<12} {}\n",
        "ID", "STATE", "STARTED", "PID", "EXIT", "PORTS", "ROOT"
    );
    for r in records {
        let _ = writeln!(
            out,
            "{:<10} {:<24} {:<20} {:<8} {:<6} {:<12} {}",
            short_id(r.id.as_str()),
            r.state.to_string(),
            r.started_at()
                .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            r.pid.map_or_else(|| "-".to_string(), |p| p.to_string()),
            r.exit_code.map_or_else(|| "-".to_string(), |c| c.to_string()),
            format_ports(&r.ports),
            r.root
                .as_ref()
                .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
        );
    }
    let active = records.iter().filter(|r| !r.state.is_terminal()).count();
    let _ = writeln!(out, "{} attempts, {active} active", records.len());
    out
}

#[cfg(test)]
mod tests {
    use berth_common::constants::DEFAULT_RECIPE;
    use berth_common::types::{ProvisionId, ProvisionState};
    use berth_recipe::parse_recipe;

    use super::*;

    #[test]
    fn short_id_truncates_long_ids() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn ports_are_listed() {
        assert_eq!(format_ports(&[]), "-");
        assert_eq!(
            format_ports(&[PortSpec::tcp(5000), "53/udp".parse().expect("port")]),
            "5000/tcp,53/udp"
        );
    }

    #[test]
    fn default_plan_renders_in_order() {
        let plan = ProvisionPlan::from_recipe(&parse_recipe(DEFAULT_RECIPE).expect("parse"))
            .expect("plan");
        let text = render_plan(&plan);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].contains("establish root") && lines[0].ends_with("/app"));
        assert!(lines[2].ends_with("PYTHONPATH=/app"));
        assert!(lines[3].ends_with("requirements.txt"));
        assert!(lines[4].contains("pip install --no-cache-dir -r requirements.txt"));
        assert!(lines[5].ends_with("5000/tcp"));
        assert!(lines[6].starts_with("  7. launch"));
    }

    #[test]
    fn status_table_shows_state_names() {
        let mut rec = ProvisionRecord::new(ProvisionId::new("0123456789"), "Berthfile");
        rec.advance(ProvisionState::Failed, None).expect("advance");
        let running = ProvisionRecord::new(ProvisionId::new("abcdef0123"), "Berthfile");
        let table = status_table(&[rec, running]);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[1].starts_with("01234567   FAILED"));
        assert!(lines[2].starts_with("abcdef01   UNPROVISIONED"));
        assert_eq!(lines[3], "2 attempts, 1 active");
    }
}
