use std::io::Write;
use std::process::ExitCode;

use chardev::{BufferManager, DeviceConfig, DeviceRuntime};
use chardev_cli::args::{Args, Mode};
use chardev_cli::{Scenario, ScenarioRunner, COLOR_BLUE, COLOR_GREEN, COLOR_RESET};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

async fn interactive<W: Write>(runner: &mut ScenarioRunner<W>) -> std::io::Result<usize> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut failed = 0;

    loop {
        runner.report().menu()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim().parse::<u32>() {
            Ok(0) => break,
            Ok(7) => failed += runner.run_all().await?,
            Ok(choice) => match Scenario::from_choice(choice) {
                Some(scenario) => {
                    if !runner.run(scenario).await? {
                        failed += 1;
                    }
                }
                None => runner.report().error("Invalid choice! Please select 0-7.")?,
            },
            Err(_) => runner
                .report()
                .error("Invalid input! Please enter a number.")?,
        }
    }

    runner
        .report()
        .line(&format!("\n{COLOR_GREEN}Exiting test program. Goodbye!{COLOR_RESET}\n"))?;
    Ok(failed)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing; device `log` records are forwarded as well
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let device = match BufferManager::new(DeviceConfig::with_capacity(args.capacity)) {
        Ok(device) => device,
        Err(e) => {
            error!("failed to create device: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = DeviceRuntime::new(device);
    let client = runtime.client();
    let runtime_handle = tokio::spawn(runtime.run());

    println!("\n{COLOR_BLUE}Character Device Test Program{COLOR_RESET}");
    let mut runner = ScenarioRunner::new(client, std::io::stdout());
    let result = match args.mode {
        Mode::Auto => runner.run_all().await,
        Mode::Interactive => interactive(&mut runner).await,
    };

    // Dropping the last client lets the runtime finish
    drop(runner);
    if let Err(e) = runtime_handle.await {
        error!("device runtime failed: {e}");
        return ExitCode::FAILURE;
    }

    match result {
        Ok(0) => {
            info!("all scenarios passed");
            ExitCode::SUCCESS
        }
        Ok(failed) => {
            error!(failed, "some scenarios failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("report output failed: {e}");
            ExitCode::FAILURE
        }
    }
}
