#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `s3pub`: publish a local directory to an S3 bucket, then optionally
//! invalidate the changed paths on a CloudFront distribution.
//!
//! Credentials and connection settings are taken from the command line, then
//! the TOML config file (`~/.s3pub.toml` unless `--config` is given), then
//! `S3PUB_*` environment variables, first non-empty value wins.
//!
//! Uses `indicatif-log-bridge` (via [`s3pub_cli_utils::init_logger`]) to
//! route `log` output through `indicatif::MultiProgress` so that log lines
//! and progress bars never fight for the terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use s3pub_cli_utils::IndicatifProgress;
use s3pub_config::{ConfigFile, EnvSource, OptionSource};
use s3pub_invalidate::WaitOptions;
use s3pub_models::progress::ProgressCallback;
use s3pub_store::{ClientOptions, CloudFrontCdn, DEFAULT_REGION};

/// Sync a directory to S3 and invalidate CloudFront.
#[derive(Parser, Debug)]
#[command(name = "s3pub")]
#[command(about = "Sync a local directory to an S3 bucket and invalidate CloudFront")]
struct Cli {
    /// Local directory to publish.
    src: PathBuf,

    /// Destination as `bucket` or `bucket/prefix`.
    dest: String,

    /// CloudFront distribution to invalidate after the sync.
    #[arg(short = 'd', long)]
    distrib_id: Option<String>,

    /// Keep remote objects that have no local counterpart.
    #[arg(long)]
    no_delete: bool,

    /// AWS access key ID.
    #[arg(long)]
    aws_access_key: Option<String>,

    /// AWS secret access key.
    #[arg(long)]
    aws_secret_key: Option<String>,

    /// Region used for request signing (default `us-east-1`).
    #[arg(long)]
    region: Option<String>,

    /// Endpoint of an S3-compatible store.
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Config file to read (default `~/.s3pub.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Submit the invalidation without waiting for it to complete.
    #[arg(long)]
    no_wait: bool,

    /// Stop waiting for the invalidation after this many seconds.
    #[arg(long, value_name = "SECONDS", conflicts_with = "no_wait")]
    wait_timeout: Option<u64>,
}

impl OptionSource for Cli {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            s3pub_config::AWS_ACCESS_KEY => self.aws_access_key.clone(),
            s3pub_config::AWS_SECRET_KEY => self.aws_secret_key.clone(),
            s3pub_config::REGION => self.region.clone(),
            s3pub_config::ENDPOINT_URL => self.endpoint_url.clone(),
            _ => None,
        }
    }
}

impl Cli {
    fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            deadline: self.wait_timeout.map(Duration::from_secs),
            ..WaitOptions::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = s3pub_cli_utils::init_logger();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(s3pub_config::default_config_path);
    let file = ConfigFile::load(&config_path)?;
    let env = EnvSource::new();

    let mut sources: Vec<&dyn OptionSource> = vec![&cli];
    if let Some(file) = &file {
        sources.push(file);
    }
    sources.push(&env);

    let settings = s3pub_config::resolve(&sources)?;
    let options = ClientOptions {
        region: settings
            .region
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        endpoint_url: settings.endpoint_url,
    };

    let bar = IndicatifProgress::bytes_bar(&multi);
    let keys = s3pub_sync::sync(
        &cli.src,
        &cli.dest,
        !cli.no_delete,
        &settings.credentials,
        &options,
        bar.clone(),
    )
    .await?;
    bar.clear();

    let Some(distribution_id) = cli.distrib_id.as_deref() else {
        return Ok(());
    };
    if keys.is_empty() {
        log::info!("No changes; skipping invalidation");
        return Ok(());
    }

    let cdn = CloudFrontCdn::connect(&settings.credentials);
    let progress: Option<Arc<dyn ProgressCallback>> = if cli.no_wait {
        None
    } else {
        Some(IndicatifProgress::spinner(&multi, "Invalidating"))
    };

    let request = s3pub_invalidate::invalidate_with_client(
        &cdn,
        distribution_id,
        &keys,
        progress,
        cli.wait_options(),
    )
    .await?;

    if cli.no_wait {
        println!("Invalidation request {}", request.request_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_positionals_and_flags() {
        let cli = Cli::try_parse_from([
            "s3pub",
            "public",
            "my-bucket/site",
            "-d",
            "E123",
            "--no-delete",
            "--aws-access-key",
            "AK",
        ])
        .unwrap();

        assert_eq!(cli.src, PathBuf::from("public"));
        assert_eq!(cli.dest, "my-bucket/site");
        assert_eq!(cli.distrib_id.as_deref(), Some("E123"));
        assert!(cli.no_delete);
        assert!(!cli.no_wait);
        assert_eq!(cli.wait_options().deadline, None);
    }

    #[test]
    fn flags_act_as_an_option_source() {
        let cli = Cli::try_parse_from([
            "s3pub",
            "public",
            "bucket",
            "--aws-secret-key",
            "SK",
            "--endpoint-url",
            "http://localhost:9000",
        ])
        .unwrap();

        assert_eq!(cli.lookup(s3pub_config::AWS_SECRET_KEY).as_deref(), Some("SK"));
        assert_eq!(
            cli.lookup(s3pub_config::ENDPOINT_URL).as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(cli.lookup(s3pub_config::AWS_ACCESS_KEY), None);
    }

    #[test]
    fn flags_override_config_file() {
        let cli = Cli::try_parse_from([
            "s3pub",
            "public",
            "bucket",
            "--aws-access-key",
            "from-flag",
        ])
        .unwrap();
        let file = ConfigFile {
            aws_access_key: Some("from-file".to_string()),
            aws_secret_key: Some("secret".to_string()),
            ..ConfigFile::default()
        };

        let settings = s3pub_config::resolve(&[&cli, &file]).unwrap();

        assert_eq!(settings.credentials.access_key, "from-flag");
        assert_eq!(settings.credentials.secret_key, "secret");
    }

    #[test]
    fn wait_timeout_sets_deadline() {
        let cli =
            Cli::try_parse_from(["s3pub", "public", "bucket", "--wait-timeout", "30"]).unwrap();
        assert_eq!(cli.wait_options().deadline, Some(Duration::from_secs(30)));
    }

    #[test]
    fn wait_timeout_conflicts_with_no_wait() {
        assert!(
            Cli::try_parse_from([
                "s3pub",
                "public",
                "bucket",
                "--no-wait",
                "--wait-timeout",
                "5"
            ])
            .is_err()
        );
    }
}
