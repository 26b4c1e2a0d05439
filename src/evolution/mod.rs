pub mod fitness;
pub mod operators;

use self::operators::GeneRange;
use crate::config::GaConfig;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

/// Fitness assigned to evaluations that fail, diverge, time out, or return
/// garbage. Low but valid, so a bad individual loses the roulette without
/// aborting the generation.
pub const SENTINEL_FITNESS: f64 = 0.0;

/// Hidden-layer widths of a candidate network, in layer order.
///
/// Chromosomes are value types: crossover and mutation produce fresh copies,
/// never shared references into the population.
pub type Chromosome = Vec<u32>;

/// Scores one candidate architecture. Implementations are expected to be
/// stochastic (random weight init, mini-batch order), but must always return
/// a value in [0, 1]; anything else is sanitized to [`SENTINEL_FITNESS`].
///
/// `Sync` because a generation's evaluations run in parallel.
pub trait FitnessEvaluator: Sync {
    fn evaluate(&self, chromosome: &Chromosome) -> f64;
}

/// Best and mean fitness of one generation, immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
}

/// The single best chromosome observed across all generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCandidate {
    pub chromosome: Chromosome,
    pub fitness: f64,
}

/// Outcome of one search run: the best-ever candidate plus the fitness time
/// series consumed by reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// `None` only in the degenerate case where no generation ever ran.
    pub best: Option<BestCandidate>,
    pub history: Vec<GenerationRecord>,
}

/// Drives the architecture search: owns the population across generations and
/// orchestrates evaluate -> select -> crossover -> mutate -> replace.
///
/// Generations are strictly sequential; fitness evaluation within a
/// generation is parallelized across the population, with results written
/// back at a single aggregation point.
pub struct EvolutionEngine<'a, E: FitnessEvaluator> {
    config: &'a GaConfig,
    evaluator: &'a E,
    gene_range: GeneRange,
    population: Vec<Chromosome>,
    rng: StdRng,
}

impl<'a, E: FitnessEvaluator> EvolutionEngine<'a, E> {
    pub fn new(config: &'a GaConfig, evaluator: &'a E) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            evaluator,
            gene_range: GeneRange::new(config.min_neurons, config.max_neurons),
            population: Vec::with_capacity(config.population_size),
            rng,
        }
    }

    /// Runs the full search: `num_generations` rounds of evaluation and
    /// breeding over a population of `population_size` chromosomes.
    pub fn evolve(&mut self) -> SearchResult {
        info!(
            "Initializing population of {} chromosomes ({} hidden layers, {}..={} neurons)...",
            self.config.population_size,
            self.config.chromosome_length,
            self.gene_range.min,
            self.gene_range.max
        );
        self.initialize_population();
        if self.population.len() < 2 {
            warn!("population too small to breed; returning empty result");
            return SearchResult {
                best: None,
                history: Vec::new(),
            };
        }

        let mut best: Option<BestCandidate> = None;
        let mut best_fitness = f64::NEG_INFINITY;
        let mut history = Vec::with_capacity(self.config.num_generations);

        for generation in 0..self.config.num_generations {
            info!(
                "--- Generation {}/{} ---",
                generation + 1,
                self.config.num_generations
            );

            let scores = self.evaluate_population();

            let (argmax, generation_best) = scores
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, &f)| (i, f))
                .unwrap_or((0, SENTINEL_FITNESS));
            let mean = scores.iter().sum::<f64>() / scores.len().max(1) as f64;

            history.push(GenerationRecord {
                generation,
                best_fitness: generation_best,
                mean_fitness: mean,
            });

            // Strictly greater: ties keep the earlier candidate.
            if generation_best > best_fitness {
                best_fitness = generation_best;
                best = Some(BestCandidate {
                    chromosome: self.population[argmax].clone(),
                    fitness: generation_best,
                });
            }

            info!(
                "Gen {}: best fitness = {:.4}, mean fitness = {:.4}, best-ever = {:.4}",
                generation + 1,
                generation_best,
                mean,
                best_fitness
            );

            self.population = self.breed_next_generation(&scores);
        }

        if let Some(candidate) = &best {
            info!(
                "Search complete. Best architecture {:?} with fitness {:.4}",
                candidate.chromosome, candidate.fitness
            );
        } else {
            warn!("Search finished without evaluating any generation");
        }

        SearchResult { best, history }
    }

    /// Fills the population with uniformly random chromosomes.
    pub fn initialize_population(&mut self) {
        self.population = (0..self.config.population_size)
            .map(|_| {
                operators::random_chromosome(
                    self.gene_range,
                    self.config.chromosome_length,
                    &mut self.rng,
                )
            })
            .collect();
    }

    /// Scores every chromosome in the current population, in parallel.
    ///
    /// Evaluations are independent of each other and of the engine rng, so
    /// rayon can fan them out; the scores vector is the single aggregation
    /// point. Every generation is scored from scratch, even for recurring
    /// chromosomes: the evaluator is stochastic and scores do not transfer.
    pub fn evaluate_population(&self) -> Vec<f64> {
        self.population
            .par_iter()
            .map(|chromosome| sanitize_fitness(self.evaluator.evaluate(chromosome)))
            .collect()
    }

    /// Breeds a full replacement population: repeatedly select two distinct
    /// parents by roulette wheel, cross them at the fixed point, and mutate
    /// each child independently.
    ///
    /// The next population always has exactly `population_size` members. For
    /// odd sizes the final pair contributes only its first child (the
    /// original formulation silently produced one individual too few).
    fn breed_next_generation(&mut self, scores: &[f64]) -> Vec<Chromosome> {
        let target = self.config.population_size;
        let mut next = Vec::with_capacity(target);

        while next.len() < target {
            let (i, j) = operators::select_pair(scores, &mut self.rng);
            let (mut child1, mut child2) = operators::crossover(
                &self.population[i],
                &self.population[j],
                self.crossover_point(),
            );
            operators::mutate(
                &mut child1,
                self.config.mutation_rate,
                self.gene_range,
                &mut self.rng,
            );
            operators::mutate(
                &mut child2,
                self.config.mutation_rate,
                self.gene_range,
                &mut self.rng,
            );

            next.push(child1);
            if next.len() < target {
                next.push(child2);
            }
        }

        next
    }

    fn crossover_point(&self) -> usize {
        // Length-1 chromosomes admit no cut; crossover degenerates to
        // cloning, which the operator expresses with point 1 == length.
        if self.config.chromosome_length == 1 {
            1
        } else {
            self.config.crossover_point
        }
    }

    #[cfg(test)]
    fn population(&self) -> &[Chromosome] {
        &self.population
    }
}

/// Clamps evaluator output into [0, 1]; anything non-finite or negative is a
/// failed evaluation and scores the sentinel.
fn sanitize_fitness(fitness: f64) -> f64 {
    if !fitness.is_finite() || fitness < 0.0 {
        warn!("fitness evaluation returned {fitness}; scoring sentinel {SENTINEL_FITNESS}");
        SENTINEL_FITNESS
    } else if fitness > 1.0 {
        warn!("fitness evaluation returned {fitness} > 1; clamping");
        1.0
    } else {
        fitness
    }
}
