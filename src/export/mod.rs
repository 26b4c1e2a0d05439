//! Persists the outcome of an architecture search with enough metadata to
//! retrain the chosen model later: configuration snapshot, class labels, the
//! best chromosome, and the per-generation fitness time series.

use crate::config::{DataConfig, GaConfig, TrainingConfig};
use crate::evolution::{BestCandidate, GenerationRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete, self-describing record of one search run.
#[derive(Serialize, Deserialize)]
pub struct SearchExport {
    /// Schema version for forward/backward compatibility
    pub schema_version: String,
    /// Unix timestamp when the export was generated
    pub generated_at: u64,
    /// Snapshot of the configuration that produced this result
    pub config: ExportConfigSnapshot,
    /// Grade labels in class-index order
    pub class_labels: Vec<String>,
    /// Best architecture found, with its validation fitness
    pub best: BestCandidate,
    /// Per-generation (best, mean) fitness, for plotting by external tools
    pub history: Vec<GenerationRecord>,
}

/// Subset of configuration relevant for reproducing the run.
#[derive(Serialize, Deserialize, Clone)]
pub struct ExportConfigSnapshot {
    pub ga: GaConfig,
    pub training: TrainingConfig,
    pub data: DataConfig,
}

impl SearchExport {
    pub fn new(
        best: BestCandidate,
        history: Vec<GenerationRecord>,
        config: ExportConfigSnapshot,
        class_labels: Vec<String>,
    ) -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            generated_at: chrono::Utc::now().timestamp() as u64,
            config,
            class_labels,
            best,
            history,
        }
    }
}

/// Writes a search export to a pretty-printed JSON file.
pub fn write_export_to_json(
    export: &SearchExport,
    output_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(export)?;
    std::fs::write(output_path, json)?;
    Ok(())
}

/// Reads a search export back from a JSON file.
pub fn read_export_from_json(
    input_path: &Path,
) -> Result<SearchExport, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(input_path)?;
    let export: SearchExport = serde_json::from_str(&content)?;
    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_snapshot() -> ExportConfigSnapshot {
        ExportConfigSnapshot {
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
                seed: Some(42),
            },
            training: TrainingConfig {
                epochs: 150,
                batch_size: 24,
                learning_rate: 0.01,
                early_stopping_patience: Some(15),
            },
            data: DataConfig {
                file_path: "eggs.csv".to_string(),
                validation_split: 0.15,
                test_split: 0.15,
                seed: 42,
            },
        }
    }

    fn create_test_export() -> SearchExport {
        SearchExport::new(
            BestCandidate {
                chromosome: vec![90, 30],
                fitness: 0.94,
            },
            vec![
                GenerationRecord {
                    generation: 0,
                    best_fitness: 0.82,
                    mean_fitness: 0.61,
                },
                GenerationRecord {
                    generation: 1,
                    best_fitness: 0.94,
                    mean_fitness: 0.73,
                },
            ],
            create_test_snapshot(),
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        )
    }

    #[test]
    fn test_export_creation() {
        let export = create_test_export();
        assert_eq!(export.schema_version, "1.0.0");
        assert_eq!(export.best.chromosome, vec![90, 30]);
        assert_eq!(export.history.len(), 2);
        assert_eq!(export.class_labels.len(), 3);
    }

    #[test]
    fn test_export_round_trips_through_json() {
        let export = create_test_export();

        let temp_file = NamedTempFile::new().unwrap();
        write_export_to_json(&export, temp_file.path()).unwrap();

        let loaded = read_export_from_json(temp_file.path()).unwrap();
        assert_eq!(loaded.schema_version, export.schema_version);
        assert_eq!(loaded.best, export.best);
        assert_eq!(loaded.history, export.history);
        assert_eq!(loaded.class_labels, export.class_labels);
        assert_eq!(loaded.config.ga.population_size, 10);
    }
}
