//! psaval CLI — trusted-domain service validation battery
//!
//! Commands:
//!   psaval run     — run the battery against the simulated domain
//!   psaval decode  — explain a composite code
//!   psaval stages  — list scenario, stage and cause ids
//!   psaval config  — print the default battery parameters

use log::error;
use psaval_core::error::{Cause, Stage};
use psaval_core::gateway::DomainStatus;
use psaval_core::orchestrator::{CompositeCode, Orchestrator, RunReport, ScenarioId};
use psaval_core::tee::{Fault, SimulatedDomain};
use psaval_core::ValidationConfig;
use std::env;
use std::process;

fn print_usage() {
    println!(
        r#"
psaval — trusted-domain service validation

Usage: psaval <command> [options]

Commands:
  run    [--config FILE] [--fault SPEC]... [--json]   Run the validation battery
  decode <code>                                      Explain a composite code (hex or decimal)
  stages                                             List scenario, stage and cause ids
  config                                             Print the default parameters as JSON
  help                                               Show this message

Fault specs:
  STAGE[=STATUS]     fail the call made at STAGE (default GENERIC_ERROR)
  short-export=LEN   export at most LEN key bytes
  long-export=LEN    report LEN exported key bytes
  corrupt-read       flip a bit in storage reads
  repeat-random      return identical random bytes

Examples:
  psaval run
  psaval run --fault its.set=STORAGE_FAILURE --json
  psaval run --config battery.json --fault short-export=16
  psaval decode 0x03200392
"#
    );
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    let code = match args[1].as_str() {
        "run" => cmd_run(&args[2..]),
        "decode" => cmd_decode(&args[2..]),
        "stages" => cmd_stages(),
        "config" => cmd_config(),
        "help" | "--help" | "-h" => {
            print_usage();
            0
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            2
        }
    };
    process::exit(code);
}

struct RunOptions {
    config: Option<String>,
    faults: Vec<Fault>,
    json: bool,
}

fn parse_run_options(args: &[String]) -> Result<RunOptions, String> {
    let mut options = RunOptions {
        config: None,
        faults: Vec::new(),
        json: false,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a file")?;
                options.config = Some(path.clone());
            }
            "--fault" => {
                let spec = iter.next().ok_or("--fault needs a spec")?;
                options.faults.push(spec.parse()?);
            }
            "--json" => options.json = true,
            other => return Err(format!("unexpected argument '{}'", other)),
        }
    }
    Ok(options)
}

fn cmd_run(args: &[String]) -> i32 {
    let options = match parse_run_options(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("  {}", e);
            eprintln!("Usage: psaval run [--config FILE] [--fault SPEC]... [--json]");
            return 2;
        }
    };

    let config = match &options.config {
        Some(path) => match ValidationConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}: {}", path, e);
                return 2;
            }
        },
        None => ValidationConfig::default(),
    };

    let mut domain = SimulatedDomain::new();
    for fault in &options.faults {
        domain.inject(*fault);
    }

    let mut orchestrator = Orchestrator::new(domain, config);
    let report = orchestrator.run();
    let status = orchestrator.gateway().domain().status();

    if options.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return 2;
            }
        }
    } else {
        print_report(&report);
        println!("  Domain:          {}", &status.domain_id[..8]);
        println!("  Live contexts:   {}", status.live_operations);
        println!("  Live keys:       {}", status.live_keys);
        println!("  Stored records:  {}", status.stored_records);
    }

    if report.passed() {
        0
    } else {
        1
    }
}

fn print_report(report: &RunReport) {
    println!("\n  Validation run {}", report.run_id);
    println!("  {}", "=".repeat(60));
    for outcome in &report.outcomes {
        match &outcome.failure {
            None => println!("  {:<14} PASS", outcome.scenario),
            Some(failure) => println!("  {:<14} FAIL  {}", outcome.scenario, failure.message),
        }
    }
    println!("  {}", "=".repeat(60));
    println!("  Composite:       {}", report.composite);
    println!(
        "  Duration:        {} ms",
        (report.finished_at - report.started_at).num_milliseconds()
    );
}

fn parse_code(text: &str) -> Option<u32> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn cmd_decode(args: &[String]) -> i32 {
    let code = match args.first().and_then(|s| parse_code(s)) {
        Some(code) => CompositeCode(code),
        None => {
            eprintln!("Usage: psaval decode <code>");
            return 2;
        }
    };

    println!("\n  {}", code);
    if let Some(decoded) = code.decode() {
        let show = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
        println!("  Scenario:        {}", show(decoded.scenario.map(|s| s.to_string())));
        println!("  Stage:           {}", show(decoded.stage.map(|s| s.to_string())));
        println!("  Cause:           {}", show(decoded.cause.map(|c| c.to_string())));
        println!("  Cleanup failed:  {}", decoded.cleanup_failed);
        let status = if decoded.status_out_of_range {
            Some("out of range".to_string())
        } else {
            decoded.status.map(|s| s.to_string())
        };
        println!("  Status:          {}", show(status));
    }
    0
}

fn cmd_stages() -> i32 {
    println!("\n  Scenarios (bits 31..24)");
    for scenario in ScenarioId::ALL {
        println!("    {:#04x}  {}", scenario.code(), scenario);
    }
    println!("\n  Stages (bits 23..16)");
    for stage in Stage::ALL {
        let kind = if stage.is_local() { "local" } else { "trusted call" };
        println!("    {:#04x}  {:<22} {}", stage.code(), stage, kind);
    }
    println!("\n  Causes (bits 15..8, {:#04x} = cleanup also failed)", Cause::CLEANUP_FLAG);
    for cause in Cause::ALL {
        println!("    {:#04x}  {}", cause.code(), cause);
    }
    println!("\n  Bits 7..0 hold the magnitude of the PSA status, 0 for local failures");
    println!(
        "  and {:#04x} for a status outside -1..=-254",
        DomainStatus::MAGNITUDE_OUT_OF_RANGE
    );
    0
}

fn cmd_config() -> i32 {
    match ValidationConfig::default().to_json() {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            error!("{}", e);
            2
        }
    }
}
