//! Prometheus text exposition format.
//!
//! Renders the latest cycle report into the Prometheus text exposition
//! format for scraping by a Prometheus server or compatible agent.

use crate::events::{CycleReport, Outcome};

/// Render a cycle report into Prometheus text format.
///
/// Produces per-target GAUGE metrics with `target` labels plus cycle-level
/// gauges. `None` (no cycle has completed yet) still emits the type
/// declarations.
pub fn render_prometheus(report: Option<&CycleReport>) -> String {
    let mut out = String::new();
    let evaluations = report.map(|r| r.evaluations.as_slice()).unwrap_or(&[]);

    out.push_str("# HELP orbital_target_current_replicas Replicas observed at evaluation.\n");
    out.push_str("# TYPE orbital_target_current_replicas gauge\n");
    for e in evaluations {
        if let Some(current) = e.current_replicas {
            out.push_str(&format!(
                "orbital_target_current_replicas{{target=\"{}\"}} {}\n",
                escape(&e.target),
                current
            ));
        }
    }

    out.push_str("# HELP orbital_target_desired_replicas Replicas computed by the decision engine.\n");
    out.push_str("# TYPE orbital_target_desired_replicas gauge\n");
    for e in evaluations {
        if let Some(desired) = e.desired_replicas {
            out.push_str(&format!(
                "orbital_target_desired_replicas{{target=\"{}\"}} {}\n",
                escape(&e.target),
                desired
            ));
        }
    }

    out.push_str("# HELP orbital_target_approved_replicas Replicas admitted by the stabilization filter.\n");
    out.push_str("# TYPE orbital_target_approved_replicas gauge\n");
    for e in evaluations {
        if let Some(approved) = e.approved_replicas {
            out.push_str(&format!(
                "orbital_target_approved_replicas{{target=\"{}\"}} {}\n",
                escape(&e.target),
                approved
            ));
        }
    }

    out.push_str("# HELP orbital_target_failed Whether the last evaluation failed (0 or 1).\n");
    out.push_str("# TYPE orbital_target_failed gauge\n");
    for e in evaluations {
        out.push_str(&format!(
            "orbital_target_failed{{target=\"{}\"}} {}\n",
            escape(&e.target),
            u8::from(e.outcome == Outcome::Failed)
        ));
    }

    out.push_str("# HELP orbital_target_metric_failures Metrics that could not be sampled.\n");
    out.push_str("# TYPE orbital_target_metric_failures gauge\n");
    for e in evaluations {
        out.push_str(&format!(
            "orbital_target_metric_failures{{target=\"{}\"}} {}\n",
            escape(&e.target),
            e.metric_failures.len()
        ));
    }

    out.push_str("# HELP orbital_cycle_targets Targets in the last cycle by result.\n");
    out.push_str("# TYPE orbital_cycle_targets gauge\n");
    if let Some(r) = report {
        let s = &r.summary;
        for (result, count) in [
            ("evaluated", s.evaluated),
            ("scaled", s.scaled),
            ("held", s.held),
            ("skipped", s.skipped),
            ("failed", s.failed),
        ] {
            out.push_str(&format!(
                "orbital_cycle_targets{{result=\"{result}\"}} {count}\n"
            ));
        }
    }

    out.push_str("# HELP orbital_cycle_duration_ms Duration of the last cycle in milliseconds.\n");
    out.push_str("# TYPE orbital_cycle_duration_ms gauge\n");
    out.push_str("# HELP orbital_cycle_number Sequence number of the last cycle.\n");
    out.push_str("# TYPE orbital_cycle_number gauge\n");
    if let Some(r) = report {
        out.push_str(&format!("orbital_cycle_duration_ms {}\n", r.summary.duration_ms));
        out.push_str(&format!("orbital_cycle_number {}\n", r.summary.cycle));
    }

    out
}

/// Escape a label value per the exposition format.
fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
