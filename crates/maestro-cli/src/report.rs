//! Plain-text run report.
//!
//! One line per targeted instance, in walk order, followed by a summary.
//! The exit code is derived from the report, not from this rendering.

use maestro_engine::{Command, EngineError, InstanceOutcome, Outcome, RunReport};

/// Prints the report table for a finished run.
pub fn print(command: Command, report: &RunReport) {
    if report.outcomes.is_empty() {
        println!("nothing to do");
        return;
    }

    println!(
        "{:>3}  {:<24} {:<16} {:<12} {:<24} {}",
        "#", "INSTANCE", "SERVICE", "SHIP", "CONTAINER", "RESULT"
    );
    for (index, outcome) in report.outcomes.iter().enumerate() {
        let (container, result) = columns(outcome);
        println!(
            "{:>3}. {:<24} {:<16} {:<12} {:<24} {}",
            index + 1,
            outcome.instance,
            outcome.service,
            outcome.ship,
            container,
            result
        );
    }

    let failed = report.outcomes.iter().filter(|o| o.result.is_err()).count();
    let total = report.outcomes.len();
    let mut summary = format!("{command}: {} of {total} succeeded", total - failed);
    if report.interrupted {
        summary.push_str(" (interrupted)");
    }
    println!("{summary}");
}

fn columns(outcome: &InstanceOutcome) -> (String, String) {
    let state = outcome.state.map_or_else(|| "-".to_string(), |s| s.to_string());
    match &outcome.result {
        Ok(Outcome::Status { state, container_id, image_id }) => {
            let container = match (container_id, image_id) {
                (Some(container), Some(image)) => format!("{container} ({image})"),
                _ => "-".to_string(),
            };
            (container, state.to_string())
        }
        Ok(outcome) => (state, outcome.to_string()),
        Err(e) => (state, format!("failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_engine::InstanceState;

    fn outcome(result: Result<Outcome, EngineError>) -> InstanceOutcome {
        InstanceOutcome {
            instance: "web-1".to_string(),
            service: "web".to_string(),
            ship: "vm1".to_string(),
            result,
            state: Some(InstanceState::Running),
        }
    }

    #[test]
    fn status_outcomes_show_container_and_image_ids() {
        let (container, result) = columns(&outcome(Ok(Outcome::Status {
            state: InstanceState::Running,
            container_id: Some("0123456789ab".to_string()),
            image_id: Some("fedcba987654".to_string()),
        })));
        assert_eq!(container, "0123456789ab (fedcba987654)");
        assert_eq!(result, "running");
    }

    #[test]
    fn failures_carry_the_reason() {
        let err = EngineError::Aborted("a previous level failed".to_string());
        let (_, result) = columns(&outcome(Err(err)));
        assert!(result.starts_with("failed: aborted"));
    }
}
