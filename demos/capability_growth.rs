//! Capability growth example.
//!
//! Samples a base capability, grows it linearly to a terminal multiplier
//! over a 12-month horizon, and prints the percentile fan per month. Shows
//! cooperative cancellation with a progress observer as well.

use risk_engine::prelude::*;

fn main() -> Result<(), EngineError> {
    env_logger::init();

    println!("╔══════════════════════════════════════════════╗");
    println!("║  risk-engine: Capability Growth Projection   ║");
    println!("╚══════════════════════════════════════════════╝\n");

    let scenario = ScenarioBuilder::new(Archetype::CapabilityGrowth)
        .name("regional capability")
        .variable(
            "base_capability",
            DistributionSpec::gamma(9.0, 10.0)?.with_units("index"),
        )
        .parameter("horizon", 12.0)
        .parameter("terminal_multiplier", 1.8)
        .build()?;

    // --- Full run ---
    println!("━━━ Percentile fan ━━━\n");
    let run = SimulationEngine::default().run(&scenario, 20_000, 0.9, Some(7))?;
    let result = analyze(&run)?;

    println!("{:>22} {:>10} {:>10} {:>10}", "output", "p5", "p50", "p95");
    for band in &result.percentile_bands {
        let value = |level: f64| {
            band.percentiles
                .iter()
                .find(|p| (p.level - level).abs() < 1e-12)
                .map_or(f64::NAN, |p| p.value)
        };
        println!(
            "{:>22} {:>10.2} {:>10.2} {:>10.2}",
            band.output,
            value(0.05),
            value(0.5),
            value(0.95)
        );
    }
    println!();
    println!("{}", result);

    // --- Cancelled run ---
    println!("━━━ Cancelled after ~30% ━━━\n");
    let token = CancellationToken::new();
    let trigger = token.clone();
    let context = SimulationContext::new(Some(7))
        .with_token(token)
        .on_progress(move |progress| {
            if progress.fraction() >= 0.3 {
                trigger.cancel();
            }
        });
    let partial = SimulationEngine::default().run_with_context(&scenario, 200_000, 0.9, context)?;
    println!("{}", partial);
    let result = analyze(&partial)?;
    println!(
        "analysed {} of {} iterations (partial: {})",
        result.provenance.completed_iterations,
        result.provenance.requested_iterations,
        result.provenance.partial
    );

    Ok(())
}
