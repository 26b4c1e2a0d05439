//! Fitness evaluation: a chromosome is scored by training a throwaway
//! network shaped by its genes and measuring validation accuracy.
//!
//! This is the expensive, stochastic part of the search. One call allocates,
//! trains, and discards a full model; the search performs
//! `population_size * num_generations` of them.

use crate::config::{GaConfig, TrainingConfig};
use crate::data::DataSet;
use crate::evolution::operators::GeneRange;
use crate::evolution::{Chromosome, FitnessEvaluator, SENTINEL_FITNESS};
use crate::network::Network;
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Scores candidate architectures against a fixed train/validation split.
///
/// Holds the splits explicitly rather than capturing ambient state, so it can
/// be exercised against synthetic data in isolation.
pub struct NetworkEvaluator<'a> {
    train: &'a DataSet,
    validation: &'a DataSet,
    n_classes: usize,
    gene_range: GeneRange,
    epochs: usize,
    batch_size: usize,
    learning_rate: f64,
    time_budget: Option<Duration>,
}

impl<'a> NetworkEvaluator<'a> {
    pub fn new(
        ga: &GaConfig,
        training: &TrainingConfig,
        train: &'a DataSet,
        validation: &'a DataSet,
        n_classes: usize,
    ) -> Self {
        Self {
            train,
            validation,
            n_classes,
            gene_range: GeneRange::new(ga.min_neurons, ga.max_neurons),
            epochs: ga.fitness_epochs,
            batch_size: training.batch_size,
            learning_rate: training.learning_rate,
            time_budget: ga.eval_time_budget_secs.map(Duration::from_secs),
        }
    }
}

impl FitnessEvaluator for NetworkEvaluator<'_> {
    /// Builds and trains a network with hidden widths taken from the
    /// chromosome, for the small fitness epoch budget, and returns validation
    /// accuracy.
    ///
    /// Failures are local: an out-of-range gene, a diverged training run, or
    /// an exceeded time budget all score [`SENTINEL_FITNESS`] so the search
    /// carries on.
    fn evaluate(&self, chromosome: &Chromosome) -> f64 {
        if let Some(&gene) = chromosome.iter().find(|&&g| !self.gene_range.contains(g)) {
            warn!(
                "chromosome {:?} has gene {} outside [{}, {}]; scoring sentinel",
                chromosome, gene, self.gene_range.min, self.gene_range.max
            );
            return SENTINEL_FITNESS;
        }

        // Weight init and batch order stay on the thread rng: fitness is
        // stochastic by contract, only the loop around it is seeded.
        let mut rng = rand::rng();
        let mut network =
            match Network::new(self.train.x.ncols(), chromosome, self.n_classes, &mut rng) {
                Ok(network) => network,
                Err(e) => {
                    warn!("failed to build network for {:?}: {}", chromosome, e);
                    return SENTINEL_FITNESS;
                }
            };

        let deadline = self.time_budget.map(|budget| Instant::now() + budget);
        match network.train(
            self.train,
            self.epochs,
            self.batch_size,
            self.learning_rate,
            None,
            deadline,
            &mut rng,
        ) {
            Ok(report) => {
                let accuracy = network.evaluate(self.validation);
                debug!(
                    "architecture {:?}: val accuracy {:.4} after {} epochs (loss {:.4})",
                    chromosome, accuracy, report.epochs_run, report.final_loss
                );
                accuracy
            }
            Err(e) => {
                debug!(
                    "training failed for {:?}: {}; scoring sentinel",
                    chromosome, e
                );
                SENTINEL_FITNESS
            }
        }
    }
}
