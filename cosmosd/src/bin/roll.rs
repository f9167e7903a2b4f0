//! cosmos-roll - command-line dice roller
//!
//! Rolls Cosmos Engine checks and dice formulas without a running daemon.

use std::collections::HashMap;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use cosmosd::combat::{parse_formula, Conversion, DiceEngine, RollMode, Scale};

/// Cosmos Engine dice roller
#[derive(Parser, Debug)]
#[command(name = "cosmos-roll", version, about = "Roll Cosmos Engine dice")]
struct Args {
    /// Random seed for reproducible rolls
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Roll a check against a target number
    Check {
        /// Target number to meet or beat
        #[arg(short, long, default_value_t = 12)]
        tn: i32,

        /// Flat modifier added to the dice
        #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
        modifier: i32,

        /// normal, advantage or disadvantage
        #[arg(long, default_value = "normal")]
        mode: RollMode,

        /// Number of checks to roll
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },

    /// Roll a dice formula such as "2d10+@agility"
    Formula {
        expression: String,

        /// Attribute values as name=value (repeatable)
        #[arg(short, long = "attr")]
        attrs: Vec<String>,
    },

    /// Convert damage between scales
    Convert {
        amount: f64,
        from: Scale,
        to: Scale,
    },
}

fn parse_attrs(attrs: &[String]) -> Result<HashMap<String, i32>> {
    let mut parsed = HashMap::new();
    for attr in attrs {
        let Some((name, value)) = attr.split_once('=') else {
            bail!("attribute must look like name=value: {}", attr);
        };
        let value: i32 = value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("bad value for {}: {}", name, e))?;
        parsed.insert(name.trim().to_string(), value);
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut engine = match args.seed {
        Some(seed) => DiceEngine::seeded(seed),
        None => DiceEngine::new(),
    };

    match args.command {
        Command::Check {
            tn,
            modifier,
            mode,
            count,
        } => {
            for _ in 0..count.max(1) {
                let result = engine.roll(modifier, tn, mode);
                if args.json {
                    println!("{}", serde_json::to_string(&result)?);
                } else {
                    println!("{}", result);
                }
            }
        }
        Command::Formula { expression, attrs } => {
            let attributes = parse_attrs(&attrs)?;
            let formula = parse_formula(&expression)?;
            let result = formula.evaluate(&mut engine, &attributes)?;
            if args.json {
                println!("{}", serde_json::to_string(&result)?);
            } else {
                let parts: Vec<String> = result
                    .parts
                    .iter()
                    .map(|p| {
                        if p.rolls.is_empty() {
                            format!("{}={}", p.term, p.value)
                        } else {
                            format!("{}{:?}={}", p.term, p.rolls, p.value)
                        }
                    })
                    .collect();
                println!("{} -> {} = {}", result.formula, parts.join(" "), result.total);
            }
        }
        Command::Convert { amount, from, to } => {
            let conversion = Conversion::new(amount, from, to);
            if args.json {
                println!("{}", serde_json::to_string(&conversion)?);
            } else {
                println!(
                    "{} {} -> {} {} (x{}, {})",
                    conversion.original,
                    from,
                    conversion.scaled,
                    to,
                    conversion.ratio,
                    conversion.effect
                );
            }
        }
    }

    Ok(())
}
