//! Vertical card display for estimates, pre-fill values and client lists.

use chargewise_core::features::bmi;
use chargewise_core::{Profile, Resolution, Subject};
use chargewise_service::{FieldErrors, Outcome, PredictionRequest, SaveStatus};

// ── Public API ──

/// Print an estimate with its inputs and whether it was recorded.
pub fn print_outcome(request: &PredictionRequest, outcome: &Outcome) {
    println!(
        "=== {} {} ===",
        request.first_name.trim(),
        request.last_name.trim()
    );
    println!("{}", request.email.trim());
    println!();

    println!("Inputs");
    row("age", request.age);
    row("gender", &request.gender);
    row("smoker", &request.smoker);
    row("weight (kg)", request.weight);
    row("height (m)", request.height);
    row("bmi", bmi(request.weight, request.height));
    row("children", request.children);
    row("region", &request.region);
    println!();

    let result = &outcome.result;
    println!("Estimated annual charge");
    row("estimate", money(result.point_estimate));
    match (result.lower_bound, result.upper_bound) {
        (Some(lower), Some(upper)) => {
            row("range", format!("{} to {}", money(lower), money(upper)));
        }
        _ => row("range", "(unavailable)"),
    }
    println!();

    println!("Record");
    match &outcome.saved {
        SaveStatus::NotRequested => row("saved", "no"),
        SaveStatus::Saved(receipt) => {
            row("saved", "yes");
            row(
                "client",
                format!(
                    "{}{}",
                    receipt.client_id,
                    if receipt.client_created { " (new)" } else { "" }
                ),
            );
            row("prediction", receipt.prediction_id);
        }
        SaveStatus::Failed { reason } => {
            row("saved", "no, the estimate above is still valid");
            row("reason", reason);
        }
    }
}

/// Print the resolved subject and the values that would seed the form.
pub fn print_prefill(resolution: &Resolution) {
    match &resolution.subject {
        Some(Subject::Own(p)) => println!("=== {} (own profile) ===", label(p)),
        Some(Subject::Selected(p)) => println!("=== {} (selected client) ===", label(p)),
        None => println!("=== No subject ==="),
    }
    if let Some(bmi) = resolution.subject.as_ref().and_then(|s| s.profile().bmi()) {
        println!("BMI {bmi}");
    }
    println!();

    let fields = resolution.prefill.fields();
    if fields.is_empty() {
        println!("  (nothing to pre-fill)");
    } else {
        for (name, value) in fields {
            row(name, value);
        }
    }

    if resolution.privileged {
        println!();
        println!("{} client(s) selectable with --subject", resolution.selectable.len());
    }
}

pub fn print_clients(clients: &[Profile]) {
    if clients.is_empty() {
        println!("No clients");
        return;
    }
    println!("{:<6} {:<30} {}", "id", "name", "email");
    for p in clients {
        let name = p.full_name();
        println!(
            "{:<6} {:<30} {}",
            p.id,
            if name.is_empty() { "-" } else { name.as_str() },
            p.email
        );
    }
}

pub fn print_field_errors(errors: &FieldErrors) {
    eprintln!("Invalid fields");
    for (field, message) in errors.iter() {
        eprintln!("  {:<26} {}", field, message);
    }
}

// ── Helpers ──

fn row(name: &str, value: impl std::fmt::Display) {
    println!("  {:<26} {}", name, value);
}

fn label(profile: &Profile) -> String {
    let name = profile.full_name();
    if name.is_empty() {
        format!("#{} {}", profile.id, profile.email)
    } else {
        format!("#{} {}", profile.id, name)
    }
}

/// `$12,345.67`.
fn money(amount: f64) -> String {
    let text = format!("{:.2}", amount.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}
