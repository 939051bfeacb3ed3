use colored::*;
use forecast_review_core::analyzer::report::{format_money, ExplanationSource};
use forecast_review_core::{
    Flag, ForecastReview, NarrativeHealth, Severity, ThresholdAlert, Thresholds, ValidationReport,
};

/// Print a full review to the terminal.
pub fn print_review(source: &str, review: &ForecastReview, thresholds: &Thresholds) {
    println!();
    println!(
        "{}",
        format!(
            " Forecast Review v{} - {}",
            env!("CARGO_PKG_VERSION"),
            source
        )
        .bold()
    );
    println!();

    println!(" {}", "Project".bold().underline());
    println!(
        " {} {} ({})",
        "|-".dimmed(),
        review.project_name,
        review.project_id.cyan()
    );
    println!(
        " {} Fiscal year {}, month {}",
        "|-".dimmed(),
        review.fiscal_year,
        review.current_month
    );
    println!(" {} Request: {}", "|-".dimmed(), review.request_id.dimmed());
    println!();

    let a = &review.analysis;
    println!(" {}", "Budget".bold().underline());
    println!(
        " {} Budget:                  {}",
        "|-".dimmed(),
        format_money(a.budget)
    );
    println!(
        " {} Actuals to date:         {} ({} months)",
        "|-".dimmed(),
        format_money(a.total_actuals_to_date),
        a.months_with_actuals
    );
    println!(
        " {} Consumption:             {}",
        "|-".dimmed(),
        format_consumption(a.budget, a.budget_consumption_percent, thresholds.budget_alert_pct)
    );
    println!(
        " {} Committed POs:           {}",
        "|-".dimmed(),
        format_money(a.total_committed_po)
    );
    println!(
        " {} Net order value:         {}",
        "|-".dimmed(),
        format_money(a.net_order_value)
    );
    println!(
        " {} Forecast (w/ rollover):  {} over {} open months",
        "|-".dimmed(),
        format_money(a.total_forecast_with_rollover),
        a.months_remaining
    );
    println!();

    println!(" {}", "=".repeat(60).dimmed());
    println!();

    if review.issue_count() == 0 {
        println!(
            " {} No variances, alerts or unusual orders detected.",
            "OK".green().bold()
        );
        println!();
    } else {
        println!(" {} ({})", "Findings".bold().underline(), review.issue_count());
        for alert in &review.threshold_alerts {
            print_alert(alert);
        }
        let mut flags: Vec<&Flag> = review.flags.iter().collect();
        flags.sort_by(|x, y| y.severity.priority().cmp(&x.severity.priority()));
        for flag in flags {
            print_flag(flag);
        }
        println!();
    }

    println!(" {}", "Scenarios".bold().underline());
    for scenario in &review.scenarios {
        let delta = scenario.variance_from_budget;
        let delta_text = if delta > 0.0 {
            format!("+{}", format_money(delta)).red().to_string()
        } else {
            format_money(delta).green().to_string()
        };
        println!(
            " {} {:<22} total {} ({} vs budget)",
            "|-".dimmed(),
            scenario.name.bold(),
            format_money(scenario.total_year_forecast),
            delta_text
        );
        println!("    {}", scenario.rationale.dimmed());
        if !scenario.suggested_reason_codes.is_empty() {
            let reasons: Vec<String> = scenario
                .suggested_reason_codes
                .iter()
                .map(|r| format!("{} {}%", r.code, r.suggested_percent))
                .collect();
            println!("    {} {}", "reasons:".dimmed(), reasons.join(", ").dimmed());
        }
    }
    println!();

    if !review.questions.is_empty() {
        println!(" {}", "Questions".bold().underline());
        for question in &review.questions {
            println!(" {} {}", format!("[{}]", question.id).cyan(), question.text);
            for option in &question.options {
                println!("      {} {}", "-".dimmed(), option.label);
            }
        }
        println!();
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();
    println!(" {}", "Explanation".bold().underline());
    println!(" {}", review.explanation);
    match &review.explanation_source {
        ExplanationSource::Generated { model } => {
            println!(" {}", format!("(generated by {})", model).dimmed());
        }
        ExplanationSource::Fallback { reason } => {
            println!(" {}", format!("(template: {})", reason).dimmed());
        }
    }
    println!();
    println!(" {}", review.analysis.summary.bold());
    println!();
}

fn format_consumption(budget: f64, pct: f64, alert_pct: f64) -> String {
    if budget <= 0.0 {
        return "n/a (no budget)".yellow().to_string();
    }
    let text = format!("{:.1}%", pct);
    if pct >= alert_pct {
        text.red().bold().to_string()
    } else if pct >= alert_pct - 15.0 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

fn print_alert(alert: &ThresholdAlert) {
    println!(
        " {} {} {}",
        " ALERT ".on_red().white().bold(),
        alert.kind.label().bold(),
        format!("- {}", alert.message).dimmed()
    );
}

fn print_flag(flag: &Flag) {
    let tag = format!(" {} ", flag.severity.symbol());
    let severity_tag = match flag.severity {
        Severity::Critical => tag.on_red().white().bold().to_string(),
        Severity::High => tag.on_yellow().black().bold().to_string(),
        Severity::Over => tag.on_red().white().bold().to_string(),
        Severity::Medium => tag.yellow().bold().to_string(),
        Severity::Under => tag.on_blue().white().bold().to_string(),
        Severity::Warning => tag.dimmed().to_string(),
    };
    println!(" {} {}", severity_tag, flag.kind.label().bold());
    println!("   {} {}", "|".dimmed(), flag.message);
}

pub fn print_rejection(source: &str, report: &ValidationReport) {
    println!();
    println!(
        " {} {} - {} error(s)",
        " REJECTED ".on_red().white().bold(),
        source,
        report.errors.len()
    );
    for err in &report.errors {
        println!("   {} {}: {}", "|-".dimmed(), err.field.yellow(), err.message);
    }
    println!();
}

pub fn print_batch_summary(total: usize, rejected: usize) {
    let completed = total - rejected;
    println!(" {}", "Summary".bold().underline());
    println!(
        " {} {} reviewed, {} rejected",
        "|-".dimmed(),
        completed.to_string().green().bold(),
        if rejected > 0 {
            rejected.to_string().red().bold().to_string()
        } else {
            "0".to_string()
        }
    );
    println!();
}

pub fn print_health(health: &NarrativeHealth) {
    println!();
    println!(" {}", "Narrative Service".bold().underline());
    println!(" {} Endpoint: {}", "|-".dimmed(), health.endpoint.cyan());
    println!(" {} Model:    {}", "|-".dimmed(), health.model);
    if let Some(ms) = health.latency_ms {
        println!(" {} Latency:  {} ms", "|-".dimmed(), ms);
    }
    if !health.available_models.is_empty() {
        println!(
            " {} Installed: {}",
            "|-".dimmed(),
            health.available_models.join(", ")
        );
    }
    if health.reachable {
        println!(" {} {}", "|-".dimmed(), "OK".green().bold());
    } else {
        println!(
            " {} {} {}",
            "|-".dimmed(),
            "UNAVAILABLE".red().bold(),
            health.error.as_deref().unwrap_or("").dimmed()
        );
        println!(
            "    {}",
            "Reviews will still complete using the template explanation.".dimmed()
        );
    }
    println!();
}
