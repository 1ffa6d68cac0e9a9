//! Composition root of one test run

use crate::cli::Cli;
use crate::config::{load_enabled_tests, ConfigFile, SuiteSettings};
use crate::logging;
use crate::run_dir;
use anyhow::Context;
use futures::FutureExt;
use sdccc_core::requirements::catalog;
use sdccc_core::verdict::{print_verdict, summarize_encoding_errors};
use sdccc_core::{
    EnabledTests, InMemoryMessageStorage, MessageStorage, RunObserver, SimulatedDevice,
    SuiteError, TestClient, TestSuite, EXIT_ERROR,
};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of the suite before the verdict is printed
struct Finished {
    failures: u64,
    had_error: bool,
}

fn load(cli: &Cli) -> anyhow::Result<(SuiteSettings, EnabledTests)> {
    let mut settings = ConfigFile::load(&cli.config)
        .with_context(|| format!("Could not load configuration {}", cli.config.display()))?
        .sdccc;
    settings.apply_overrides(cli);
    settings.validate()?;

    let enabled = load_enabled_tests(&cli.test_config).with_context(|| {
        format!(
            "Could not load test configuration {}",
            cli.test_config.display()
        )
    })?;
    Ok((settings, enabled))
}

async fn execute(
    settings: &SuiteSettings,
    enabled: EnabledTests,
    observer: &RunObserver,
    run_dir: &Path,
) -> Finished {
    let storage = Arc::new(InMemoryMessageStorage::new(
        settings.storage_config(),
        observer.clone(),
    ));
    let device = Arc::new(SimulatedDevice::new(
        settings.device_config(),
        storage.clone(),
    ));
    if settings.consumer.device_epr.is_none() {
        info!("No DeviceEpr configured, using {}", device.target_epr());
    }

    let catalog = match catalog() {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(error = %err, "Could not build the test catalog");
            return Finished {
                failures: 0,
                had_error: true,
            };
        }
    };

    let suite = TestSuite::new(
        settings.suite_config(run_dir),
        device.clone(),
        device.clone(),
        storage.clone(),
        observer.clone(),
        catalog,
        enabled,
    );

    let finished = match AssertUnwindSafe(suite.run()).catch_unwind().await {
        Ok(Ok(summary)) => Finished {
            failures: summary.failures(),
            had_error: false,
        },
        // Already recorded as an invalidation reason.
        Ok(Err(SuiteError::Connection { .. })) => Finished {
            failures: 0,
            had_error: false,
        },
        Ok(Err(err)) => {
            error!("{}", err);
            Finished {
                failures: 0,
                had_error: true,
            }
        }
        Err(_) => {
            error!("Unchecked exception during test run");
            if let Err(err) =
                cleanup(device.as_ref(), storage.as_ref(), settings.max_wait_seconds).await
            {
                error!(error = %err, "Unchecked exception during cleanup");
            }
            Finished {
                failures: 0,
                had_error: true,
            }
        }
    };

    summarize_encoding_errors(
        observer,
        storage.as_ref(),
        settings.summarize_message_encoding_errors,
    );
    if observer.total_tests_run() == 0 && !finished.had_error && !observer.is_invalid() {
        warn!("No tests were executed, check the test configuration");
    }
    finished
}

/// Release the device and the storage after an aborted run
async fn cleanup(
    device: &SimulatedDevice,
    storage: &dyn MessageStorage,
    max_wait_seconds: u64,
) -> anyhow::Result<()> {
    if device.is_client_running() {
        device
            .stop_service(Duration::from_secs(max_wait_seconds))
            .await
            .context("Could not stop the test client")?;
    }
    storage.close().await;
    Ok(())
}

/// Run the suite and return the process exit code
pub async fn run(cli: Cli) -> i32 {
    let run_dir = match run_dir::create(cli.test_run_directory.as_deref()) {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("Could not create the test run directory: {}", err);
            return EXIT_ERROR;
        }
    };

    let observer = RunObserver::new();
    if let Err(err) = logging::init(&run_dir, &cli.file_log_level, cli.json_log, observer.clone()) {
        eprintln!("Could not initialise logging: {}", err);
        return EXIT_ERROR;
    }
    info!("SDCcc version {}", env!("CARGO_PKG_VERSION"));
    info!("Test run directory: {}", run_dir.display());

    let finished = match load(&cli) {
        Ok((settings, enabled)) => {
            settings.log_summary();
            execute(&settings, enabled, &observer, &run_dir).await
        }
        Err(err) => {
            error!("{:#}", err);
            Finished {
                failures: 0,
                had_error: true,
            }
        }
    };

    print_verdict(&observer, finished.failures, finished.had_error, &run_dir)
}
