use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub data: DataConfig,
    pub ga: GaConfig,
    pub training: TrainingConfig,
    pub export: Option<ExportConfig>,
    /// Enables the interactive grade-prediction prompt after training.
    #[serde(default)]
    pub interactive: bool,
}

/// Where the egg measurements live and how to partition them.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DataConfig {
    pub file_path: String,
    /// Fraction of the dataset held out for validation (fitness scoring).
    pub validation_split: f64,
    /// Fraction of the dataset held out for the final test report.
    pub test_split: f64,
    /// Seed for the stratified split, so the partition is reproducible.
    pub seed: u64,
}

/// Parameters of the genetic architecture search.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GaConfig {
    pub population_size: usize,
    pub num_generations: usize,
    /// Number of hidden layers each chromosome encodes.
    pub chromosome_length: usize,
    /// Inclusive bounds for every gene (neurons per hidden layer).
    pub min_neurons: u32,
    pub max_neurons: u32,
    /// Per-gene probability of replacement with a fresh random width.
    pub mutation_rate: f64,
    /// Single fixed crossover point, in [1, chromosome_length - 1].
    pub crossover_point: usize,
    /// Epoch budget for each fitness evaluation. Deliberately much smaller
    /// than `training.epochs`; fidelity is traded for search speed.
    pub fitness_epochs: usize,
    /// Wall-clock budget per fitness evaluation, in seconds. An evaluation
    /// that exceeds it scores the sentinel low fitness instead of hanging
    /// the whole search.
    pub eval_time_budget_secs: Option<u64>,
    /// Seed for the evolution loop's rng (initialization, selection,
    /// mutation). Training itself stays stochastic regardless.
    pub seed: Option<u64>,
}

/// Parameters for the full (non-search) training runs.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Early-stopping patience in epochs; `None` disables early stopping.
    pub early_stopping_patience: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExportConfig {
    pub output_path: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ga.population_size < 2 {
            return Err(
                "population_size must be at least 2 (selection needs two distinct parents)"
                    .to_string(),
            );
        }
        if self.ga.chromosome_length == 0 {
            return Err("chromosome_length must be at least 1".to_string());
        }
        if self.ga.chromosome_length > 1
            && !(1..self.ga.chromosome_length).contains(&self.ga.crossover_point)
        {
            return Err(format!(
                "crossover_point must lie in [1, {}]",
                self.ga.chromosome_length - 1
            ));
        }
        if !(0.0..=1.0).contains(&self.ga.mutation_rate) {
            return Err("mutation_rate must lie in [0, 1]".to_string());
        }
        if self.ga.min_neurons == 0 || self.ga.min_neurons > self.ga.max_neurons {
            return Err("neuron range requires 1 <= min_neurons <= max_neurons".to_string());
        }
        if self.ga.fitness_epochs == 0 {
            return Err("fitness_epochs must be at least 1".to_string());
        }
        if self.data.validation_split <= 0.0
            || self.data.test_split <= 0.0
            || self.data.validation_split + self.data.test_split >= 1.0
        {
            return Err(
                "validation_split and test_split must be positive and leave room for training data"
                    .to_string(),
            );
        }
        if self.training.epochs == 0 || self.training.batch_size == 0 {
            return Err("training epochs and batch_size must be positive".to_string());
        }
        if self.training.learning_rate <= 0.0 {
            return Err("learning_rate must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            data: DataConfig {
                file_path: "eggs.csv".to_string(),
                validation_split: 0.15,
                test_split: 0.15,
                seed: 42,
            },
            ga: GaConfig {
                population_size: 10,
                num_generations: 10,
                chromosome_length: 2,
                min_neurons: 10,
                max_neurons: 100,
                mutation_rate: 0.1,
                crossover_point: 1,
                fitness_epochs: 10,
                eval_time_budget_secs: None,
                seed: None,
            },
            training: TrainingConfig {
                epochs: 150,
                batch_size: 24,
                learning_rate: 0.01,
                early_stopping_patience: Some(15),
            },
            export: None,
            interactive: false,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_tiny_population() {
        let mut config = valid_config();
        config.ga.population_size = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_band_crossover_point() {
        let mut config = valid_config();
        config.ga.crossover_point = 2; // length-2 chromosome only admits k = 1
        assert!(config.validate().is_err());

        config.ga.crossover_point = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_neuron_range() {
        let mut config = valid_config();
        config.ga.min_neurons = 200;
        config.ga.max_neurons = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_splits_that_starve_training() {
        let mut config = valid_config();
        config.data.validation_split = 0.5;
        config.data.test_split = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parses_toml() {
        let raw = r#"
            interactive = false

            [data]
            file_path = "eggs.csv"
            validation_split = 0.15
            test_split = 0.15
            seed = 42

            [ga]
            population_size = 10
            num_generations = 10
            chromosome_length = 2
            min_neurons = 10
            max_neurons = 100
            mutation_rate = 0.1
            crossover_point = 1
            fitness_epochs = 10

            [training]
            epochs = 150
            batch_size = 24
            learning_rate = 0.01
            early_stopping_patience = 15
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.ga.population_size, 10);
        assert!(config.export.is_none());
    }
}
