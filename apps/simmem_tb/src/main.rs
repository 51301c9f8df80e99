// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runs one testbench variant against its behavioral device model for a
//! range of seeds and reports the mismatches found.

use anyhow::Context;
use env_logger::Target;
use std::path::PathBuf;
use structopt::StructOpt;

use simmem_dv::models::FaultProperties;
use simmem_dv::{CycleDriver, DvConfig, RunReport, TracingDriver, VcdWriter};

mod variant;

use variant::Variant;

#[derive(StructOpt)]
#[structopt(
    name = "simmem-tb",
    about = "Differential verification of the simmem reordering buffer"
)]
struct Arguments {
    /// supported variants: delay_bank, response_bank, top
    #[structopt(short = "V", long, default_value = "top")]
    variant: Variant,
    /// seed of the first round; round i uses seed + i
    #[structopt(short, long, default_value = "0")]
    seed: u64,
    /// stimulus cycles per round
    #[structopt(short, long, default_value = "1000")]
    cycles: usize,
    #[structopt(short, long, default_value = "100")]
    rounds: u64,
    /// YAML configuration; defaults depend on the variant
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// probability that the device model injects a fault
    #[structopt(long, default_value = "0.0")]
    fault_rate: f64,
    /// records every round into this VCD file
    #[structopt(long, parse(from_os_str))]
    vcd: Option<PathBuf>,
    /// print the reports as JSON instead of one line per round
    #[structopt(long)]
    json: bool,
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn run(args: &Arguments) -> anyhow::Result<Vec<RunReport>> {
    let config = match &args.config {
        Some(path) => DvConfig::from_file(path)?,
        None => args.variant.default_config(),
    };
    log::info!("Running {:?} with {:?}", args.variant, config);

    let faults = FaultProperties::seeded(args.fault_rate, args.seed)?;
    let mut driver = args.variant.model(&config, faults)?;
    if let Some(path) = &args.vcd {
        let vcd = VcdWriter::create(path)
            .with_context(|| format!("Failed to create VCD file {}", path.display()))?;
        let traced: Box<dyn CycleDriver> = Box::new(TracingDriver::new(driver, vcd));
        driver = traced;
    }
    let mut bench = args.variant.bench(config, driver)?;

    let mut reports = vec![];
    for seed in args.seed..args.seed + args.rounds {
        let report = bench
            .run(seed, args.cycles)
            .with_context(|| format!("{} aborted on seed {}", bench.name(), seed))?;
        if !args.json {
            println!("{}", summary(&report));
        }
        reports.push(report);
    }
    Ok(reports)
}

fn summary(report: &RunReport) -> String {
    let mut line = report.to_string();
    if !report.leftovers.is_empty() {
        let leftovers: Vec<String> = report.leftovers.iter().map(|l| l.to_string()).collect();
        line.push_str(&format!("; not drained: {}", leftovers.join(", ")));
    }
    line
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::from_args();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let _logger = env_logger::builder()
        .filter(Some("simmem_dv"), level)
        .filter(Some("simmem_tb"), level)
        .target(Target::Stderr)
        .try_init();

    let reports = run(&args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    let failed = reports.iter().filter(|r| !r.is_clean()).count();
    if failed > 0 {
        log::error!("{} of {} rounds had mismatches", failed, reports.len());
        std::process::exit(1);
    }
    Ok(())
}
