//! Console output for runs and listings.

use std::time::Duration;

use crate::orchestrator::RunSummary;
use crate::store::SessionSummary;
use crate::xml;

/// Prints a summary of the invocation to the console.
pub fn print_summary(summary: &RunSummary, duration: Duration) {
    println!();
    println!("Invocation Results:");
    if let Some(session) = summary.session {
        println!("  Session:      {}", session);
    }
    println!("  Modules:      {}", summary.modules_run);
    println!("  Passed:       {}", console::style(summary.passed).green());
    println!("  Failed:       {}", console::style(summary.failed).red());

    if summary.not_executed > 0 {
        println!(
            "  Not Executed: {}",
            console::style(summary.not_executed).red().bold()
        );
    }

    println!("  Duration:     {:?}", duration);

    if summary.success() {
        println!();
        println!("{}", console::style("All tests passed!").green().bold());
    } else if summary.ended_early {
        println!();
        println!(
            "{}",
            console::style("The run ended before every module ran.")
                .red()
                .bold()
        );
        if let Some(session) = summary.session {
            println!(
                "{}",
                console::style(format!("Continue with: run --retry {}", session)).dim()
            );
        }
    } else {
        println!();
        println!("{}", console::style("Some tests failed.").red().bold());
    }
}

/// Formats the session table printed by `list results`.
pub fn format_sessions(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return "No results found\n".to_string();
    }
    let mut out = format!(
        "{:<8}{:<8}{:<8}{:<14}{:<25}{:<12}{}\n",
        "Session", "Pass", "Fail", "Not Executed", "Start time", "Plan", "Device serial(s)"
    );
    for session in sessions {
        out.push_str(&format!(
            "{:<8}{:<8}{:<8}{:<14}{:<25}{:<12}{}\n",
            session.id,
            session.passed,
            session.failed,
            session.not_executed,
            xml::format_time(session.start),
            session.plan,
            session.devices.join(", ")
        ));
    }
    out
}
