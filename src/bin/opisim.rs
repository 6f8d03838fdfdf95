// opisim CLI: synthetic overdose data generation and prior-predictive checks.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::fs;
use std::path::PathBuf;

use opisim::distributions::{Dist, Param, Transform};
use opisim::epidemic::{generate_data, write_csv, EpidemicParams, MONTHS};
use opisim::model::Model;
use opisim::prior::{PriorConfig, PriorSampler};
use opisim::value::Value;

#[derive(Parser)]
#[command(name = "opisim")]
#[command(version = "0.1.0")]
#[command(about = "Synthetic opioid-overdose data and prior-predictive sampling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic 12-month overdose surveillance dataset
    Generate {
        /// Output CSV file
        #[arg(short, long, default_value = "overdose_data.csv")]
        output: PathBuf,

        /// JSON file with scenario parameters (replaces the defaults)
        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Draw prior-predictive samples from the bundled overdose model
    Prior {
        /// Number of joint draws
        #[arg(long, default_value_t = 500)]
        draws: usize,

        /// i.i.d. values per distribution call within one draw
        #[arg(long)]
        size: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Disable the progress indicator
        #[arg(long)]
        quiet: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Generate {
            output,
            params,
            seed,
        } => run_generate(output, params, seed),
        Commands::Prior {
            draws,
            size,
            seed,
            quiet,
        } => run_prior(draws, size, seed, quiet),
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha20Rng {
    match seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_entropy(),
    }
}

fn run_generate(output: PathBuf, params_file: Option<PathBuf>, seed: Option<u64>) -> Result<()> {
    let params = match params_file {
        Some(path) => {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read parameter file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("invalid parameter file: {}", path.display()))?
        }
        None => EpidemicParams::default(),
    };

    let mut rng = seeded_rng(seed);
    let data = generate_data(&params, &mut rng)?;
    write_csv(&output, &data)?;

    println!("✓ Generated: {}", output.display());
    println!("  Months: {}", MONTHS);
    println!("  Total overdoses: {}", data.overdoses.iter().sum::<u64>());
    println!("  Total deaths: {}", data.deaths.iter().sum::<u64>());
    println!(
        "  Kits distributed by December: {}",
        data.kits_distributed[MONTHS - 1]
    );
    println!("  Kits used: {}", data.kits_used.iter().sum::<u64>());
    Ok(())
}

fn run_prior(draws: usize, size: Option<usize>, seed: Option<u64>, quiet: bool) -> Result<()> {
    let model = overdose_prior_model()?;
    let cfg = PriorConfig {
        draws,
        vars: None,
        size,
        seed,
        progress: !quiet,
    };

    println!("Sampling {} draws from the overdose model prior...", draws);
    let mut sampler = PriorSampler::new(&model, cfg)?;
    let samples = sampler.sample()?;

    println!("Prior summaries ({} draws):", samples.completed());
    let mut names: Vec<&str> = samples.values().keys().map(String::as_str).collect();
    names.sort_unstable();
    for name in names {
        let flat: Vec<f64> = samples
            .get(name)
            .unwrap_or(&[])
            .iter()
            .flat_map(Value::to_vec)
            .collect();
        let (mean, sd) = mean_sd(&flat);
        println!("  {:<24} mean = {:>10.4}  sd = {:>10.4}", name, mean, sd);
    }
    Ok(())
}

/// Priors of the overdose surveillance model: drift and noise of the
/// prevalence walk, per-category overdose rates, and the implied expected
/// January overdose count for a 10k population.
fn overdose_prior_model() -> Result<Model> {
    let mut model = Model::new();
    model.stochastic(
        "drift",
        Dist::Normal {
            mu: Param::Const(0.0),
            sigma: Param::Const(0.25),
        },
    )?;
    model.transformed(
        "scale",
        Dist::Gamma {
            shape: Param::Const(2.0),
            scale: Param::Const(0.1),
        },
        Transform::Log,
    )?;
    model.transformed(
        "initial_prevalence",
        Dist::Beta {
            alpha: Param::Const(2.0),
            beta: Param::Const(8.0),
        },
        Transform::Logit,
    )?;
    model.stochastic(
        "fentanyl_overdose_rate",
        Dist::Beta {
            alpha: Param::Const(1.0),
            beta: Param::Const(99.0),
        },
    )?;
    // First logit-space step of the walk, conditioned on drift and scale.
    model.stochastic(
        "january_shift",
        Dist::Normal {
            mu: Param::Var("drift".to_string()),
            sigma: Param::Var("scale".to_string()),
        },
    )?;
    model.deterministic(
        "expected_january_overdoses",
        &["fentanyl_overdose_rate", "initial_prevalence"],
        |values| {
            let rates = values[0].to_vec();
            let prevalences = values[1].to_vec();
            let expected: Vec<f64> = rates
                .iter()
                .zip(&prevalences)
                .map(|(rate, prevalence)| rate * prevalence * 10_000.0)
                .collect();
            match values[0] {
                Value::Scalar(_) => Value::Scalar(expected[0]),
                Value::Vector(_) => Value::Vector(expected),
            }
        },
    )?;
    Ok(model)
}

fn mean_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
