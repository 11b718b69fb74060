use serde_json::json;

use crate::cli::OutputFormat;
use crate::clinic::Clinic;
use crate::gate::Route;

pub fn handle(path: &str, clinic: &Clinic, output_format: &OutputFormat) -> anyhow::Result<()> {
    let route: Route = path.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let input = clinic.session.gate_input();
    let decision = clinic.gate.decide_route(route, input);

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                "route": route.path(),
                "protected": route.is_protected(),
                "decision": decision,
                "redirect": decision.redirect().map(|r| r.path()),
                "input": input,
                "subscription_gating": clinic.gate.subscription_gating(),
            }))?);
        }
        OutputFormat::Text => match decision.redirect() {
            Some(target) => println!("{} -> {:?}, redirect to {}", route, decision, target),
            None => println!("{} -> {:?}", route, decision),
        },
    }
    Ok(())
}
