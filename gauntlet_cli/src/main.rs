use gauntlet_core::config::{HarnessConfig, HarnessMode};
use gauntlet_core::generator::{bytes, int, list, map2, uint8};
use gauntlet_core::harness::{self, SingleShotLink};
use gauntlet_core::property::{check, check_eq};
use gauntlet_core::registry;
use gauntlet_core::runner::{self, TestOutcome};

use clap::{Parser, Subcommand};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered tests with their indices.
    List,
    /// Run one test against a single input buffer (a seed file or stdin),
    /// or attach to a fuzzer in persistent mode.
    Run {
        /// Test selector: name or index. Falls back to the config file,
        /// then to the first registered test.
        #[clap(short, long)]
        test: Option<String>,
        /// Seed file to replay; stdin when absent.
        #[clap(short, long)]
        input: Option<PathBuf>,
        #[clap(long)]
        persistent: bool,
    },
    /// Drive one test with the built-in local fuzz loop. A stand-in for a
    /// real coverage-guided fuzzer: useful for smoke runs, not campaigns.
    Fuzz {
        #[clap(short, long)]
        test: Option<String>,
        #[clap(short = 'n', long)]
        iterations: Option<u64>,
        #[clap(long)]
        rng_seed: Option<u64>,
        /// Directory for crashing input artifacts.
        #[clap(long)]
        crash_dir: Option<PathBuf>,
        /// Also write the failure report as JSON to this path.
        #[clap(long)]
        report_json: Option<PathBuf>,
    },
}

fn register_demo_tests() {
    registry::add_test("no-bad-prefix", bytes(), |data: Vec<u8>| {
        check(!data.starts_with(b"BAD"));
    });

    registry::add_test("sort-idempotent", list(uint8()), |mut values: Vec<u8>| {
        values.sort();
        let once = values.clone();
        values.sort();
        check_eq(&once, &values);
    });

    registry::add_test(
        "sum-is-commutative",
        map2(int(), int(), |a, b| (a, b)),
        |(a, b): (i64, i64)| {
            check_eq(&a.wrapping_add(b), &b.wrapping_add(a));
        },
    );
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let config = match cli.config_file {
        Some(config_path) => {
            println!("Loading configuration from specified path: {config_path:?}");
            HarnessConfig::load_from_file(&config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("gauntlet.toml");
            if default_config_path.exists() {
                println!(
                    "No config file specified via CLI, loading default: {default_config_path:?}",
                );
                HarnessConfig::load_from_file(&default_config_path)?
            } else {
                HarnessConfig::default()
            }
        }
    };

    register_demo_tests();

    match cli.command {
        Command::List => {
            for (index, name) in registry::test_names().iter().enumerate() {
                println!("{index}: {name}");
            }
            Ok(())
        }
        Command::Run {
            test,
            input,
            persistent,
        } => run_command(&config, test, input, persistent),
        Command::Fuzz {
            test,
            iterations,
            rng_seed,
            crash_dir,
            report_json,
        } => fuzz_command(&config, test, iterations, rng_seed, crash_dir, report_json),
    }
}

fn select_test(
    config: &HarnessConfig,
    flag: Option<String>,
) -> Result<std::sync::Arc<gauntlet_core::RegisteredTest>, anyhow::Error> {
    let selector = flag
        .or_else(|| config.test.clone())
        .unwrap_or_else(|| "0".to_string());
    Ok(registry::find_test(&selector)?)
}

fn run_command(
    config: &HarnessConfig,
    test: Option<String>,
    input: Option<PathBuf>,
    persistent: bool,
) -> Result<(), anyhow::Error> {
    let test = select_test(config, test)?;
    let run_settings = config.run.clone().unwrap_or_default();
    let persistent = persistent || run_settings.mode == HarnessMode::Persistent;

    if persistent {
        #[cfg(unix)]
        if let Some(mut link) = harness::persistent_link_from_env() {
            harness::harness_main(&test, &mut link);
        }
        anyhow::bail!(
            "persistent mode requested but {} is not set by a fuzzer collaborator",
            harness::PERSISTENT_ENV_VAR
        );
    }

    let input = input.or(run_settings.input_file);
    match input {
        Some(path) => {
            let file = fs::File::open(&path)
                .map_err(|e| anyhow::anyhow!("Failed to open seed file {:?}: {}", path, e))?;
            let mut link = SingleShotLink::new(file);
            harness::harness_main(&test, &mut link)
        }
        None => {
            let mut link = SingleShotLink::new(std::io::stdin());
            harness::harness_main(&test, &mut link)
        }
    }
}

/// Grow, shrink, or nudge one byte of a base buffer. Length changes keep
/// sequence-shaped generators reachable; the byte nudge mirrors the
/// smallest useful mutation.
fn mutate_buffer(base: &[u8], rng: &mut ChaCha8Rng) -> Vec<u8> {
    let mut data = base.to_vec();
    match rng.random_range(0u8..8) {
        0 => data.push(rng.random::<u8>()),
        1 if data.len() > 1 => {
            data.pop();
        }
        _ => {
            if data.is_empty() {
                data.push(0);
            }
            let random_add_value = rng.random_range(1u8..=15u8);
            let byte_index_to_mutate = rng.random_range(0..data.len());
            data[byte_index_to_mutate] =
                data[byte_index_to_mutate].wrapping_add(random_add_value);
        }
    }
    data
}

fn fuzz_command(
    config: &HarnessConfig,
    test: Option<String>,
    iterations: Option<u64>,
    rng_seed: Option<u64>,
    crash_dir: Option<PathBuf>,
    report_json: Option<PathBuf>,
) -> Result<(), anyhow::Error> {
    let fuzz_settings = config.fuzz.clone().unwrap_or_default();
    let max_iterations = iterations.unwrap_or(fuzz_settings.max_iterations);
    let seed_value = rng_seed.unwrap_or(fuzz_settings.rng_seed);
    let crash_dir = crash_dir.or(fuzz_settings.crash_dir);

    let test = select_test(config, test)?;
    runner::install_quiet_panic_hook();

    let mut seed = [0u8; 32];
    seed[..8].copy_from_slice(&seed_value.to_le_bytes());
    let mut rng = ChaCha8Rng::from_seed(seed);

    let mut corpus: Vec<Vec<u8>> = vec![vec![0u8; 16]];
    let mut known_hashes: HashSet<[u8; 16]> = corpus
        .iter()
        .map(|buffer| md5::compute(buffer.as_slice()).0)
        .collect();

    println!(
        "Fuzzing '{}' for {} iterations (rng seed {})...",
        test.name(),
        max_iterations,
        seed_value
    );
    let start_time = Instant::now();
    let mut executions = 0u64;
    let mut passed = 0u64;
    let mut invalid = 0u64;

    for i in 0..max_iterations {
        let base_index = rng.random_range(0..corpus.len());
        let mutated_input = mutate_buffer(&corpus[base_index], &mut rng);
        executions += 1;

        match test.execute(&mutated_input) {
            TestOutcome::Pass => {
                passed += 1;
                if known_hashes.insert(md5::compute(mutated_input.as_slice()).0) {
                    corpus.push(mutated_input);
                }
            }
            TestOutcome::Invalid => invalid += 1,
            TestOutcome::Fail(report) | TestOutcome::Crash(report) => {
                println!("\n!!! COUNTEREXAMPLE FOUND (execution {executions}) !!!");
                harness::report_failure(&report);
                if let Some(dir) = &crash_dir {
                    fs::create_dir_all(dir)?;
                    let artifact = dir.join(format!("input_{}", report.input_hash));
                    fs::write(&artifact, &mutated_input)?;
                    println!("Crashing input written to {artifact:?}");
                }
                if let Some(path) = &report_json {
                    fs::write(path, serde_json::to_string_pretty(&report)?)?;
                    println!("Failure report written to {path:?}");
                }
                std::process::exit(1);
            }
        }

        if i > 0 && i % (max_iterations / 100).max(1) == 0 {
            let elapsed = start_time.elapsed().as_secs_f32();
            let exec_per_sec = if elapsed > 0.0 {
                executions as f32 / elapsed
            } else {
                0.0
            };
            print!(
                "\rIter: {}/{}, Corpus: {}, Invalid: {}, Execs/sec: {:.2}   ",
                i,
                max_iterations,
                corpus.len(),
                invalid,
                exec_per_sec
            );
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }

    let elapsed_total = start_time.elapsed();
    println!("\nFuzz loop finished in {elapsed_total:.2?}.");
    println!(
        "Total Executions: {}, Corpus Size: {}, Passed: {}, Invalid: {}",
        executions,
        corpus.len(),
        passed,
        invalid
    );
    Ok(())
}
