//! Peer Throughput Tester - Main CLI Application

use clap::Parser;
use colored::Colorize;
use peer_throughput_tester::{
    cli::Cli,
    config::{display_config_summary, load_config, EnvManager},
    error::{AppError, Result},
    executor::{ExecutionResults, SequentialExecutor, TestExecutor},
    harness::{TestCase, TestRegistry},
    log_debug,
    logging::LoggerFactory,
    output::{OutputCoordinator, OutputFormatterFactory},
    transport::LoopbackSessionFactory,
    PKG_DESCRIPTION, PKG_NAME, VERSION,
};
use std::process;
use std::sync::Arc;

/// Exit code when every test ran but at least one reported errors
const EXIT_TESTS_FAILED: i32 = 4;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(1);
    }));

    let cli = Cli::parse();
    let use_colors = cli.use_colors();

    match run_application(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}", e.format_for_console(use_colors));
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic, returning the process exit code
async fn run_application(cli: Cli) -> Result<i32> {
    if cli.generate_env {
        print!("{}", EnvManager::create_example_env_content());
        return Ok(0);
    }

    let registry = TestRegistry::with_defaults();

    if cli.list {
        print!("{}", format_test_list(registry.cases(), cli.use_colors()));
        return Ok(0);
    }

    if cli.debug {
        eprintln!("{} v{} - {}", PKG_NAME, VERSION, PKG_DESCRIPTION);
        eprintln!("{}", cli.get_config_summary());
    }

    let config = load_config(cli.clone())?;
    let factory = LoggerFactory::new(config.clone());
    let logger = factory.create_logger("MAIN").await;
    let error_logger = factory.create_error_logger();
    log_debug!(logger, "Effective configuration:\n{}", display_config_summary(&config));

    for warning in EnvManager::validate_current_env() {
        logger.warn(&warning).log().await;
    }

    let cases: Vec<TestCase> = match registry.select(&cli.tests, cli.all) {
        Ok(selected) => selected.into_iter().cloned().collect(),
        Err(e) => {
            error_logger.log_error(&e, Some("test selection"), None).await;
            return Err(e);
        }
    };

    logger
        .info(&format!("Running {} test(s)", cases.len()))
        .field("session_id", factory.session_id())
        .field("tests", cases.iter().map(|c| c.name).collect::<Vec<_>>().join(","))
        .log()
        .await;

    let executor = SequentialExecutor::new(
        config.clone(),
        Arc::new(LoopbackSessionFactory::new(config.link.clone())),
        logger.clone(),
    )
    .with_reporters(OutputFormatterFactory::create_reporters(&config));

    let results = match executor.execute_tests(&cases).await {
        Ok(results) => results,
        Err(e) => {
            error_logger.log_error(&e, Some("test execution"), None).await;
            return Err(e);
        }
    };

    let coordinator = OutputCoordinator::from_config(&config);
    if !config.json {
        println!();
    }
    println!("{}", coordinator.display_results(&results)?);
    if !config.json {
        println!();
        println!("{}", coordinator.display_verdict(&results)?);
    }

    Ok(exit_code_for(&results))
}

fn exit_code_for(results: &ExecutionResults) -> i32 {
    if results.has_fatal() {
        AppError::setup("").exit_code()
    } else if results.has_failures() {
        EXIT_TESTS_FAILED
    } else {
        0
    }
}

fn format_test_list(cases: &[TestCase], use_colors: bool) -> String {
    let width = cases.iter().map(|c| c.name.len()).max().unwrap_or(0);
    let mut output = String::new();
    for case in cases {
        let name = format!("{:<width$}", case.name, width = width);
        let name = if use_colors { name.bold().to_string() } else { name };
        let marker = if case.explicit { " (explicit)" } else { "" };
        output.push_str(&format!("{}/{}  {}{}\n", case.suite, name, case.description, marker));
    }
    output
}
