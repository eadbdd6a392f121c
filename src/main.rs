use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;

use cryptopt_core::assemble::TextAssembler;
use cryptopt_core::bridge::{Bridge, ExternalWitnessBridge, ManualBridge, ResumeBridge};
use cryptopt_core::config::{self, RawArgs, RunConfig};
use cryptopt_core::measure::DeterministicMeasurer;
use cryptopt_core::prover::SubprocessProver;
use cryptopt_core::{logging, orchestrator};

fn current_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as u64
}

fn select_bridge(config: &RunConfig) -> cryptopt_core::error::Result<Box<dyn Bridge>> {
    if let Some(state_path) = &config.read_state {
        return Ok(Box::new(ResumeBridge::from_state_file(state_path.clone())));
    }
    if config.start_from_best_json {
        return Ok(Box::new(ResumeBridge::from_best_in_dir(&config.result_dir)?));
    }
    match config.bridge {
        config::Bridge::Manual => Ok(Box::new(ManualBridge::new(config.json_file.clone(), config.c_file.clone()))),
        config::Bridge::Fiat => Ok(Box::new(ExternalWitnessBridge::fiat())),
        config::Bridge::BitcoinCore => Ok(Box::new(ExternalWitnessBridge::bitcoin_core())),
        config::Bridge::Jasmin => Ok(Box::new(ExternalWitnessBridge::jasmin())),
    }
}

fn main() {
    let args = RawArgs::parse();
    let config = match RunConfig::from_args(args, current_millis()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(error.exit_code());
        }
    };

    if let Err(error) = logging::install(config.log_file.as_deref(), config.verbose) {
        eprintln!("failed to install logger: {error}");
        std::process::exit(error.exit_code());
    }

    let exit_code = match run(&config) {
        Ok(()) => cryptopt_core::error::EXIT_OK,
        Err(error) => {
            log::error!("{error}");
            error.exit_code()
        }
    };
    std::process::exit(exit_code);
}

fn run(config: &RunConfig) -> cryptopt_core::error::Result<()> {
    let bridge = select_bridge(config)?;
    let assembler = TextAssembler;
    let mut measurer = DeterministicMeasurer::new(config.seed);
    let tmp_dir = std::env::temp_dir();

    let prover = if config.proof { Some(SubprocessProver::new("cryptopt-prove")) } else { None };

    let report = orchestrator::run(
        config,
        bridge.as_ref(),
        &assembler,
        &mut measurer,
        prover.as_ref(),
        &tmp_dir,
    )?;

    log::info!(
        "wrote {} (ratio {:.6}); mutation log at {}",
        report.asm_path.display(),
        report.final_ratio,
        report.csv_path.display()
    );
    Ok(())
}
