//! Display formatting for CLI output

use bosun_core::{AppStatus, ChartEntry, PlanSummary, State};
use bosun_kube::DeployResult;
use console::style;

/// Colored label for a health state
pub fn state_label(state: State) -> String {
    let text = state.to_string();
    match state {
        State::Ready => style(text).green().to_string(),
        State::Updating => style(text).cyan().to_string(),
        State::Degraded => style(text).yellow().to_string(),
        State::Unavailable => style(text).red().to_string(),
        State::Missing => style(text).dim().to_string(),
    }
}

pub fn print_plan(title: &str, summary: &PlanSummary) {
    println!("{}", style(title).bold().underlined());
    if summary.total_resources == 0 {
        println!("  {}", style("nothing to do").dim());
        return;
    }
    print!("{}", summary.display());
}

pub fn print_deploy_result(result: &DeployResult) {
    let verdict = if result.succeeded {
        style("succeeded").green().bold()
    } else {
        style("failed").red().bold()
    };
    println!(
        "{} {} (sequence {}) {} in {}ms",
        style("App").bold(),
        style(&result.app_id).cyan(),
        result.sequence,
        verdict,
        result.duration().num_milliseconds()
    );

    for key in &result.deleted {
        println!("  {} {}", style("-").red(), key);
    }
    for key in &result.applied {
        println!("  {} {}", style("+").green(), key);
    }

    if let Some(error) = &result.error {
        println!("\n{} in phase {}", style("Error").red().bold(), style(result.phase).yellow());
        if let Some(resource) = &result.failed_resource {
            println!("  Resource: {}", resource);
        }
        println!("  {}", error);
    }

    if !result.output.stdout.trim().is_empty() {
        println!("\n{}", style("OUTPUT").bold().underlined());
        println!("{}", result.output.stdout.trim_end());
    }
    if !result.output.stderr.trim().is_empty() {
        eprintln!("{}", result.output.stderr.trim_end());
    }
}

pub fn print_status(status: &AppStatus) {
    println!(
        "{} {} seq={} {} {}",
        style(status.updated_at.format("%H:%M:%S")).dim(),
        style(&status.app_id).cyan(),
        status.sequence,
        style("overall").dim(),
        state_label(status.state())
    );
    for resource in &status.resource_states {
        println!(
            "  {}/{}/{} {}",
            resource.namespace,
            resource.kind,
            resource.name,
            state_label(resource.state)
        );
    }
}

pub fn print_charts(title: &str, charts: &[ChartEntry]) {
    println!("{}", style(title).bold().underlined());
    if charts.is_empty() {
        println!("  {}", style("no charts").dim());
        return;
    }
    for chart in charts {
        println!(
            "  {:>4}  {} {} {} {}",
            chart.weight,
            style(&chart.release_name).cyan(),
            style(format!("{}-{}", chart.chart_name, chart.chart_version)).dim(),
            style("->").dim(),
            style(&chart.namespace).yellow()
        );
    }
}
