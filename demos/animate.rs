//! Drives a parameter through an eased animation and shows how derived parameters and
//! function statistics follow it frame by frame.
//!
//! The workspace holds:
//! - `k`, the animated parameter
//! - `a = 2k + 1`, a derived parameter
//! - `f(x) = sin(kx)`, whose zero crossings grow with `k`

use colored::Colorize;
use paramflow::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let frames = 10;
    let (from, to) = (0.5, 5.0);

    let mut ws = Workspace::default();
    ws.submit("k = 0.5")?;
    ws.submit("a = 2k + 1")?;
    ws.submit("f(x) = sin(kx)")?;

    let easing = EasingFormula::ease_in_out(ws.engine())?;
    println!(
        "{} k from {} to {} with {}",
        "Animating".bright_blue().bold(),
        from,
        to,
        easing.source()
    );

    for (frame, progress) in easing.curve(frames)?.into_iter().enumerate() {
        let k = from + (to - from) * progress;
        ws.set_value("k", k)?;

        let a = ws.parameter("a").and_then(|p| p.value).unwrap_or(f64::NAN);
        let stats = ws.function("f").and_then(|f| f.stats);
        let crossings = stats.map(|s| s.zero_crossings.to_string()).unwrap_or_default();
        println!(
            "frame {:>2}  k = {:<8.4} a = {:<8.4} f crosses zero {} times",
            frame,
            k,
            a,
            crossings.green()
        );
    }

    println!("{}", "Final snapshot".bright_green().bold());
    println!("{}", ws.to_json()?);
    Ok(())
}
