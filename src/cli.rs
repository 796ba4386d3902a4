//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `zonewatch.toml` file and environment variables.

use crate::config::Mode;
use clap::{Parser, Subcommand};
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Watches hosted zone changes and forwards them as alerts.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive (e.g. "debug").
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Label of the monitored account used in alert subjects.
    #[arg(long, value_name = "LABEL", global = true)]
    pub origin_label: Option<String>,

    /// Topic ARN for change alerts and general notifications.
    #[arg(long, value_name = "ARN", global = true)]
    pub general_topic: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Relay a single change event read from a file, or stdin with "-".
    Relay {
        #[arg(long, value_name = "FILE")]
        event: PathBuf,
    },
    /// Poll the monitored account's audit trail on the configured interval.
    Poll {
        /// Run a single tick and exit.
        #[arg(long)]
        once: bool,
    },
    /// Serve invocations from the AWS Lambda runtime.
    Lambda {
        #[arg(long, value_enum)]
        mode: Mode,
    },
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(label) = &self.origin_label {
            dict.insert("origin_label".into(), Value::from(label.clone()));
        }

        if let Some(topic) = &self.general_topic {
            let mut notification = Dict::new();
            notification.insert("general_topic".into(), Value::from(topic.clone()));
            dict.insert("notification".into(), Value::from(notification));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
