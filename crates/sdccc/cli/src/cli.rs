//! Command line arguments

use clap::Parser;
use std::path::PathBuf;

/// SDCcc command line
#[derive(Debug, Clone, Parser)]
#[command(name = "sdccc")]
#[command(about = "SDCcc - conformance test tool for SDC medical device communication", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Suite configuration file
    #[arg(short, long, env = "SDCCC_CONFIG")]
    pub config: PathBuf,

    /// Enabled-test configuration file
    #[arg(short = 't', long = "testconfig", env = "SDCCC_TESTCONFIG")]
    pub test_config: PathBuf,

    /// EPR of the target device
    #[arg(long)]
    pub device_epr: Option<String>,

    /// Facility of the target device location
    #[arg(long)]
    pub device_facility: Option<String>,

    /// Building of the target device location
    #[arg(long)]
    pub device_building: Option<String>,

    /// Point of care of the target device location
    #[arg(long)]
    pub device_point_of_care: Option<String>,

    /// Floor of the target device location
    #[arg(long)]
    pub device_floor: Option<String>,

    /// Room of the target device location
    #[arg(long)]
    pub device_room: Option<String>,

    /// Bed of the target device location
    #[arg(long)]
    pub device_bed: Option<String>,

    /// Address of the network interface to use
    #[arg(long = "ipaddress")]
    pub ip_address: Option<String>,

    /// Base directory for the test run folder
    #[arg(short = 'd', long)]
    pub test_run_directory: Option<PathBuf>,

    /// Level of the log file in the test run folder
    #[arg(long, default_value = "info")]
    pub file_log_level: String,

    /// Log to the console as JSON
    #[arg(long)]
    pub json_log: bool,
}
