//! Console output for finished runs

use std::fmt::Write;

use timewarp_core::SimulationReport;

/// Human-readable summary: one block per LP followed by the run totals.
pub fn render(report: &SimulationReport) -> String {
    let mut out = String::new();
    for lp in &report.lps {
        let _ = writeln!(out, "|----------------------------------------------|");
        let _ = writeln!(out, "LOGICAL PROCESS {}", lp.lp);
        let _ = writeln!(out, "Number of processed events = {}", lp.processed);
        let _ = writeln!(out, "Number of rollbacks = {}", lp.rollbacks);
    }
    let _ = writeln!(out, "|----------------------------------------------|");
    let _ = writeln!(
        out,
        "SIMULATION IS COMPLETED: TIME REACHED VALUE {}",
        report.end_time
    );
    let _ = writeln!(
        out,
        "Wall Clock Time spent (ms): {:.3}",
        report.wall_clock.as_secs_f64() * 1_000.0
    );
    let _ = writeln!(out, "Number of GVT evaluations: {}", report.gvt_evaluations);
    let _ = writeln!(out, "Total number of processed events: {}", report.total_processed());
    let _ = write!(out, "Total number of rollbacks: {}", report.total_rollbacks());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use timewarp_core::{LpId, LpReport, VirtualTime};

    fn lp(index: u32, processed: u64, rollbacks: u64) -> LpReport {
        LpReport {
            lp: LpId::new(index),
            processed,
            rollbacks,
            anti_messages: 0,
            annihilations: 0,
            final_clock: VirtualTime::new(99),
            gvt: VirtualTime::new(100),
        }
    }

    #[test]
    fn test_render_lists_every_lp_and_totals() {
        let report = SimulationReport {
            end_time: VirtualTime::new(100),
            gvt: VirtualTime::new(100),
            gvt_evaluations: 3,
            wall_clock: Duration::from_millis(12),
            lps: vec![lp(0, 40, 2), lp(1, 35, 1)],
        };
        let text = render(&report);
        assert!(text.contains("LOGICAL PROCESS 0"));
        assert!(text.contains("LOGICAL PROCESS 1"));
        assert!(text.contains("Number of processed events = 35"));
        assert!(text.contains("TIME REACHED VALUE 100"));
        assert!(text.contains("Wall Clock Time spent (ms): 12.000"));
        assert!(text.contains("Number of GVT evaluations: 3"));
        assert!(text.contains("Total number of processed events: 75"));
        assert!(text.ends_with("Total number of rollbacks: 3"));
    }
}
