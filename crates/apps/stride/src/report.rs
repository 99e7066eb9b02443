//! Text reports for the `stats` command

use anyhow::Result;
use std::fmt::Write;

use fitsync::{ActivityStore, ActivityTotals, Milestone, MilestoneStore};

const SEPARATOR: &str = "---------------------------";

/// Render activity counts followed by the milestone list
pub fn render_stats(totals: &ActivityTotals, milestones: &[Milestone]) -> String {
    let mut out = String::new();
    render_activities(&mut out, totals);
    render_milestones(&mut out, milestones);
    out
}

fn render_activities(out: &mut String, totals: &ActivityTotals) {
    let _ = writeln!(out, "\n== Activities ==");
    for count in &totals.by_type {
        let _ = writeln!(out, "{:<20} {:>6}", count.activity_type, count.count);
    }
    let _ = writeln!(out, "{}", SEPARATOR);
    let _ = writeln!(out, "{:<20} {:>6}", "ALL ACTIVITIES", totals.total);
}

fn render_milestones(out: &mut String, milestones: &[Milestone]) {
    let _ = writeln!(out, "\n== Milestones ==");
    if milestones.is_empty() {
        let _ = writeln!(out, "No milestones recorded yet");
        return;
    }
    for milestone in milestones {
        let _ = writeln!(
            out,
            "{:<20} {:<20} {}",
            milestone.started_on.format("%b %-d, %Y").to_string(),
            milestone.activity_type,
            milestone.name
        );
    }
}

/// Print the stats report for a store
pub fn print_stats<S: ActivityStore + MilestoneStore>(store: &S) -> Result<()> {
    let totals = fitsync::activity_type_counts(store)?;
    let milestones = fitsync::list_milestones(store)?;
    print!("{}", render_stats(&totals, &milestones));
    Ok(())
}
