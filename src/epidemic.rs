//! Synthetic opioid-overdose surveillance data.
//!
//! Simulates a 12-month trajectory of overdose, death, and naloxone-kit
//! counts for one population: fentanyl supply prevalence follows a
//! logit-space random walk, counts come from binomial draws. Parameters are
//! not validated here; invalid values surface as the distribution layer's
//! own constructor errors.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Binomial, Distribution, Gamma, Normal};
use serde::{Deserialize, Serialize};

use crate::distributions::{expit, logit};

/// Fixed simulation horizon.
pub const MONTHS: usize = 12;

/// Gamma parameters for monthly naloxone-kit distribution counts.
const KIT_GAMMA_SHAPE: f64 = 0.5;
const KIT_GAMMA_SCALE: f64 = 300.0;

/// Scenario parameters for one simulated population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpidemicParams {
    /// Mean of the normally distributed population size.
    pub population_mean: f64,
    /// Standard deviation of the population size.
    pub population_sd: f64,
    /// Fentanyl supply prevalence at the start of the year.
    pub initial_prevalence: f64,
    /// Mean of the monthly logit-space prevalence increments.
    pub drift: f64,
    /// Standard deviation of the monthly increments.
    pub scale: f64,
    /// Per-person monthly overdose probability given a fentanyl-involved supply.
    pub fentanyl_overdose_rate: f64,
    /// Per-person monthly overdose probability for the non-fentanyl supply.
    pub non_fentanyl_overdose_rate: f64,
    /// Probability that an available kit is used at an overdose event.
    pub naloxone_use_rate: f64,
    /// Probability an overdose is fatal with no naloxone intervention.
    pub death_prob_untreated: f64,
}

impl Default for EpidemicParams {
    fn default() -> Self {
        Self {
            population_mean: 10_000.0,
            population_sd: 1_000.0,
            initial_prevalence: 0.2,
            drift: 0.1,
            scale: 0.2,
            fentanyl_overdose_rate: 0.01,
            non_fentanyl_overdose_rate: 0.002,
            naloxone_use_rate: 0.75,
            death_prob_untreated: 0.1,
        }
    }
}

/// One simulated year of monthly surveillance series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpidemicData {
    pub overdoses: Vec<u64>,
    pub fentanyl_overdoses: Vec<u64>,
    pub fentanyl_prevalence: Vec<f64>,
    pub deaths: Vec<u64>,
    pub fentanyl_deaths: Vec<u64>,
    /// Cumulative kits distributed, non-decreasing across months.
    pub kits_distributed: Vec<u64>,
    pub kits_used: Vec<u64>,
}

/// Prevalence trajectories from a logit-space random walk.
///
/// Draws independent normal(drift, scale) increments per cell, accumulates
/// them along the month axis starting from `logit(initial_prevalence)`, and
/// maps back through the logistic function. Output lies in (0,1) by
/// construction.
pub fn random_walk_prevalence(
    drift: f64,
    scale: f64,
    initial_prevalence: f64,
    samples: usize,
    months: usize,
    rng: &mut ChaCha20Rng,
) -> Result<Vec<Vec<f64>>> {
    let increment = Normal::new(drift, scale)?;
    let start = logit(initial_prevalence);
    let mut trajectories = Vec::with_capacity(samples);
    for _ in 0..samples {
        let mut log_odds = start;
        let mut trajectory = Vec::with_capacity(months);
        for _ in 0..months {
            log_odds += increment.sample(rng);
            trajectory.push(expit(log_odds));
        }
        trajectories.push(trajectory);
    }
    Ok(trajectories)
}

/// Simulate one year of overdose surveillance data.
pub fn generate_data(params: &EpidemicParams, rng: &mut ChaCha20Rng) -> Result<EpidemicData> {
    let prevalence = random_walk_prevalence(
        params.drift,
        params.scale,
        params.initial_prevalence,
        1,
        MONTHS,
        rng,
    )?
    .pop()
    .context("random walk produced no trajectory")?;

    let population = Normal::new(params.population_mean, params.population_sd)?.sample(rng);
    let trials = population.round() as u64;

    // Cumulative kits: independent monthly gamma draws, rounded then summed.
    let kit_draw = Gamma::new(KIT_GAMMA_SHAPE, KIT_GAMMA_SCALE)?;
    let mut kits_distributed = Vec::with_capacity(MONTHS);
    let mut kit_total = 0u64;
    for _ in 0..MONTHS {
        kit_total += kit_draw.sample(rng).round() as u64;
        kits_distributed.push(kit_total);
    }

    let use_prob: Vec<f64> = kits_distributed
        .iter()
        .map(|&kits| params.naloxone_use_rate * kits as f64 / population)
        .collect();
    let death_prob: Vec<f64> = use_prob
        .iter()
        .map(|&u| (1.0 - u) * params.death_prob_untreated)
        .collect();

    let mut overdoses = Vec::with_capacity(MONTHS);
    let mut fentanyl_overdoses = Vec::with_capacity(MONTHS);
    let mut deaths = Vec::with_capacity(MONTHS);
    let mut fentanyl_deaths = Vec::with_capacity(MONTHS);
    let mut kits_used = Vec::with_capacity(MONTHS);

    for month in 0..MONTHS {
        let fentanyl = Binomial::new(trials, params.fentanyl_overdose_rate * prevalence[month])?
            .sample(rng);
        let non_fentanyl = Binomial::new(
            trials,
            params.non_fentanyl_overdose_rate * (1.0 - prevalence[month]),
        )?
        .sample(rng);
        let total = fentanyl + non_fentanyl;

        let fentanyl_fatal = Binomial::new(fentanyl, death_prob[month])?.sample(rng);
        let non_fentanyl_fatal = Binomial::new(non_fentanyl, death_prob[month])?.sample(rng);
        let used = Binomial::new(total, use_prob[month])?.sample(rng);

        fentanyl_overdoses.push(fentanyl);
        overdoses.push(total);
        fentanyl_deaths.push(fentanyl_fatal);
        deaths.push(fentanyl_fatal + non_fentanyl_fatal);
        kits_used.push(used);
    }

    Ok(EpidemicData {
        overdoses,
        fentanyl_overdoses,
        fentanyl_prevalence: prevalence,
        deaths,
        fentanyl_deaths,
        kits_distributed,
        kits_used,
    })
}

/// Write the monthly series to a CSV file, overwriting any existing file.
pub fn write_csv(path: &Path, data: &EpidemicData) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;

    writeln!(
        file,
        "month,overdoses,fentanyl deaths,deaths,kits distributed,kits used"
    )?;
    for month in 0..MONTHS {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            month + 1,
            data.overdoses[month],
            data.fentanyl_deaths[month],
            data.deaths[month],
            data.kits_distributed[month],
            data.kits_used[month],
        )?;
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
