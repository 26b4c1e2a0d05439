use ovograde::config::{Config, DataConfig, TrainingConfig};
use ovograde::data::{
    load_csv, stratified_split, to_matrix, DataSplits, LabelEncoder, StandardScaler,
};
use ovograde::evolution::fitness::NetworkEvaluator;
use ovograde::evolution::EvolutionEngine;
use ovograde::export::{write_export_to_json, ExportConfigSnapshot, SearchExport};
use ovograde::network::{EarlyStopping, Network};
use std::io::Write;
use std::path::Path;
use std::process;

/// Loads the egg measurements, fits the scaler and label encoder on the full
/// dataset, and produces the stratified train/validation/test splits.
///
/// # Returns
/// * `Ok((splits, scaler, encoder))` on success.
/// * `Err(String)` if loading, encoding, or splitting fails.
fn prepare_data(
    data_config: &DataConfig,
) -> Result<(DataSplits, StandardScaler, LabelEncoder), String> {
    log::info!("Loading data from '{}'...", data_config.file_path);
    let records = load_csv(Path::new(&data_config.file_path))
        .map_err(|e| format!("Failed to load data: {}", e))?;

    let encoder = LabelEncoder::fit(&records);
    if encoder.n_classes() < 2 {
        return Err(format!(
            "Need at least 2 grade classes, found {:?}",
            encoder.classes()
        ));
    }
    log::info!("Grade classes (index order): {:?}", encoder.classes());

    let (x_raw, y) = to_matrix(&records, &encoder).map_err(|e| e.to_string())?;
    let scaler = StandardScaler::fit(&x_raw);
    let x_scaled = scaler.transform(&x_raw);

    let splits = stratified_split(
        &x_scaled,
        &y,
        encoder.n_classes(),
        data_config.validation_split,
        data_config.test_split,
        data_config.seed,
    )
    .map_err(|e| format!("Failed to split data: {}", e))?;

    log::info!(
        "Data partitioned: {} train, {} validation, {} test samples.",
        splits.train.len(),
        splits.validation.len(),
        splits.test.len()
    );
    Ok((splits, scaler, encoder))
}

/// Trains a network of the given hidden widths with the full epoch budget and
/// reports its test accuracy.
fn train_full_model(
    name: &str,
    hidden_widths: &[u32],
    splits: &DataSplits,
    training: &TrainingConfig,
    n_classes: usize,
) -> Result<(Network, f64), String> {
    log::info!("Training {} with hidden layers {:?}...", name, hidden_widths);
    let mut rng = rand::rng();
    let mut network = Network::new(splits.train.x.ncols(), hidden_widths, n_classes, &mut rng)
        .map_err(|e| format!("Failed to build {}: {}", name, e))?;

    let early_stopping = training
        .early_stopping_patience
        .map(|patience| EarlyStopping {
            validation: &splits.validation,
            patience,
        });

    let report = network
        .train(
            &splits.train,
            training.epochs,
            training.batch_size,
            training.learning_rate,
            early_stopping,
            None,
            &mut rng,
        )
        .map_err(|e| format!("Training {} failed: {}", name, e))?;

    let test_accuracy = network.evaluate(&splits.test);
    log::info!(
        "{}: test accuracy {:.4} after {} epochs (final loss {:.4}{})",
        name,
        test_accuracy,
        report.epochs_run,
        report.final_loss,
        if report.stopped_early {
            ", stopped early"
        } else {
            ""
        }
    );
    Ok((network, test_accuracy))
}

/// Prints a handful of inverse-transformed samples so the operator can eyeball
/// the data the models were scored on.
fn print_sample_data(
    splits: &DataSplits,
    scaler: &StandardScaler,
    encoder: &LabelEncoder,
    sample_size: usize,
) {
    println!("\nSample validation data:");
    for (i, row) in splits
        .validation
        .x
        .rows()
        .into_iter()
        .take(sample_size)
        .enumerate()
    {
        let original = scaler.inverse_transform_sample(row.as_slice().unwrap_or(&[]));
        let grade = encoder
            .inverse_transform(splits.validation.y[i])
            .unwrap_or("?");
        println!(
            "Sample {}: Height(mm)={:.2}, Width(mm)={:.2}, Weight(g)={:.2}, Grade={}",
            i + 1,
            original[0],
            original[1],
            original[2],
            grade
        );
    }
}

fn read_measurement(prompt: &str) -> Option<f64> {
    print!("{}", prompt);
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok()?;
    line.trim().parse().ok()
}

/// Interactive prediction prompt: the operator types measurements and both
/// models grade the egg.
fn predict_grades_interactively(
    baseline: &Network,
    evolved: &Network,
    scaler: &StandardScaler,
    encoder: &LabelEncoder,
) {
    loop {
        println!("\nEnter egg measurements to grade (blank or invalid input exits):");
        let Some(height) = read_measurement("Height (mm): ") else {
            break;
        };
        let Some(width) = read_measurement("Width (mm): ") else {
            break;
        };
        let Some(weight) = read_measurement("Weight (g): ") else {
            break;
        };

        let features = scaler.transform_sample(&[height, width, weight]);
        match (baseline.predict(&features), evolved.predict(&features)) {
            (Ok(nn_class), Ok(ga_class)) => {
                println!(
                    "Predicted grade (baseline NN): {}",
                    encoder.inverse_transform(nn_class).unwrap_or("?")
                );
                println!(
                    "Predicted grade (evolved GA-NN): {}",
                    encoder.inverse_transform(ga_class).unwrap_or("?")
                );
            }
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Prediction failed: {}", e);
                break;
            }
        }
    }
}

fn main() {
    env_logger::init();
    log::info!("Booting ovograde...");

    // 1. Load and validate configuration
    let config = match Config::load(Path::new("config.toml")) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration loaded and validated.");

    // 2. Prepare data: load, encode, scale, split
    let (splits, scaler, encoder) = match prepare_data(&config.data) {
        Ok(prepared) => prepared,
        Err(e) => {
            log::error!("Data preparation failed: {}", e);
            process::exit(1);
        }
    };

    // 3. Baseline network with the hand-picked architecture
    let baseline_widths = [90u32, 30];
    let (baseline, baseline_accuracy) = match train_full_model(
        "baseline NN",
        &baseline_widths,
        &splits,
        &config.training,
        encoder.n_classes(),
    ) {
        Ok(result) => result,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    // 4. Genetic architecture search
    log::info!("--- Starting Architecture Search ---");
    let evaluator = NetworkEvaluator::new(
        &config.ga,
        &config.training,
        &splits.train,
        &splits.validation,
        encoder.n_classes(),
    );
    let mut engine = EvolutionEngine::new(&config.ga, &evaluator);
    let result = engine.evolve();

    let Some(best) = result.best.clone() else {
        log::error!("Search produced no candidate (num_generations = 0?)");
        process::exit(1);
    };
    log::info!(
        "Best architecture: {:?} (search fitness {:.4})",
        best.chromosome,
        best.fitness
    );

    // 5. Retrain the winning architecture with the full budget
    let (evolved, evolved_accuracy) = match train_full_model(
        "evolved GA-NN",
        &best.chromosome,
        &splits,
        &config.training,
        encoder.n_classes(),
    ) {
        Ok(result) => result,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };
    log::info!(
        "Test accuracy: baseline {:.4} vs evolved {:.4}",
        baseline_accuracy,
        evolved_accuracy
    );

    // 6. Export the search result for external plotting/retraining
    if let Some(export_config) = &config.export {
        let export = SearchExport::new(
            best,
            result.history,
            ExportConfigSnapshot {
                ga: config.ga.clone(),
                training: config.training.clone(),
                data: config.data.clone(),
            },
            encoder.classes().to_vec(),
        );
        match write_export_to_json(&export, Path::new(&export_config.output_path)) {
            Ok(()) => log::info!("Search result written to '{}'", export_config.output_path),
            Err(e) => log::error!("Failed to write export: {}", e),
        }
    }

    // 7. Show a few samples and optionally take operator input
    print_sample_data(&splits, &scaler, &encoder, 5);
    if config.interactive {
        predict_grades_interactively(&baseline, &evolved, &scaler, &encoder);
    }
}
