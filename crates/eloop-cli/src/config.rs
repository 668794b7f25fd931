use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::model::ModelParams;
use eloop::core::domain::DomainSpec;
use eloop::core::io::checkpoint::Encoding;
use eloop::core::series::{SeriesSpec, SeriesTag};
use eloop::engine::config::{SweepConfig, SweepConfigBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

const DEFAULT_WORKERS: usize = 1;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSweepSection {
    label: Option<String>,
    workers: Option<usize>,
    coordinator_rank: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum DomainKind {
    Linear,
    Stepped,
    Explicit,
}

impl FromStr for DomainKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "linear" => Ok(DomainKind::Linear),
            "stepped" => Ok(DomainKind::Stepped),
            "explicit" => Ok(DomainKind::Explicit),
            other => Err(format!("unknown domain type '{other}'")),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialDomainSection {
    #[serde(rename = "type")]
    kind: Option<DomainKind>,
    start: Option<f64>,
    end: Option<f64>,
    count: Option<usize>,
    step: Option<f64>,
    points: Option<Vec<f64>>,
}

impl PartialDomainSection {
    fn resolve(self) -> Result<DomainSpec> {
        let require = |value: Option<f64>, key: &str| {
            value.ok_or_else(|| CliError::Config(format!("`domain.{key}` is required.")))
        };
        let kind = self
            .kind
            .ok_or_else(|| CliError::Config("`domain.type` is required.".to_string()))?;

        Ok(match kind {
            DomainKind::Linear => DomainSpec::Linear {
                start: require(self.start, "start")?,
                end: require(self.end, "end")?,
                count: self.count.ok_or_else(|| {
                    CliError::Config("`domain.count` is required for a linear domain.".to_string())
                })?,
            },
            DomainKind::Stepped => DomainSpec::Stepped {
                start: require(self.start, "start")?,
                end: require(self.end, "end")?,
                step: require(self.step, "step")?,
            },
            DomainKind::Explicit => DomainSpec::Explicit(self.points.ok_or_else(|| {
                CliError::Config("`domain.points` is required for an explicit domain.".to_string())
            })?),
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSeriesEntry {
    tag: String,
    enabled: Option<bool>,
    parameter: Option<u32>,
}

impl From<PartialSeriesEntry> for SeriesSpec {
    fn from(p: PartialSeriesEntry) -> Self {
        SeriesSpec::new(p.tag.as_str(), p.parameter.unwrap_or(1)).with_enabled(p.enabled.unwrap_or(true))
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialCheckpointSection {
    path: Option<PathBuf>,
    encoding: Option<Encoding>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialModelSection {
    level: Option<f64>,
    broadening: Option<f64>,
    temperature: Option<f64>,
    biases: Option<Vec<f64>>,
}

/// Everything a `run` needs: the core sweep configuration and the model parameters.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sweep: SweepConfig,
    pub model: ModelParams,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialRunConfig {
    sweep: Option<PartialSweepSection>,
    domain: Option<PartialDomainSection>,
    #[serde(default)]
    series: Vec<PartialSeriesEntry>,
    checkpoint: Option<PartialCheckpointSection>,
    model: Option<PartialModelSection>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<RunConfig> {
        self.apply_set_values(&args.set_values)?;

        let sweep = self.sweep.take().unwrap_or_default();
        let checkpoint = self.checkpoint.take().unwrap_or_default();
        let model = self.model.take().unwrap_or_default();
        let domain = self
            .domain
            .take()
            .ok_or_else(|| CliError::Config("`[domain]` section is required.".to_string()))?
            .resolve()?;

        let mut series: Vec<SeriesSpec> = self.series.into_iter().map(Into::into).collect();
        if series.is_empty() {
            info!("No [[series]] configured; computing TRANSMISSION only.");
            series.push(SeriesSpec::transmission(1));
        }
        Self::apply_toggles(&mut series, &args.enable, true)?;
        Self::apply_toggles(&mut series, &args.disable, false)?;

        let mut builder = SweepConfigBuilder::new()
            .domain(domain)
            .workers(args.workers.or(sweep.workers).unwrap_or(DEFAULT_WORKERS))
            .coordinator_rank(args.coordinator.or(sweep.coordinator_rank).unwrap_or(0))
            .series_list(series);
        if let Some(label) = args.label.clone().or(sweep.label) {
            builder = builder.label(label);
        }

        match args.output.clone().or(checkpoint.path) {
            Some(path) => {
                let encoding = args.encoding.or(checkpoint.encoding).unwrap_or_default();
                builder = builder.checkpoint(path, encoding);
            }
            None => warn!("No checkpoint path configured; merged series will not be persisted."),
        }

        let defaults = ModelParams::default();
        let model = ModelParams {
            level: model.level.unwrap_or(defaults.level),
            broadening: model.broadening.unwrap_or(defaults.broadening),
            temperature: model.temperature.unwrap_or(defaults.temperature),
            biases: model.biases.unwrap_or(defaults.biases),
        };

        let sweep = builder.build().map_err(|e| CliError::Config(e.to_string()))?;
        Ok(RunConfig { sweep, model })
    }

    fn apply_toggles(series: &mut [SeriesSpec], tags: &[String], enabled: bool) -> Result<()> {
        for tag in tags {
            let tag = SeriesTag::new(tag.as_str());
            let spec = series.iter_mut().find(|s| s.tag == tag).ok_or_else(|| {
                CliError::Argument(format!("Series '{tag}' is not configured in [[series]]."))
            })?;
            spec.enabled = enabled;
        }
        Ok(())
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "sweep.label" => {
                    self.sweep.get_or_insert_with(Default::default).label = Some(value_str.to_string());
                }
                "sweep.workers" => {
                    self.sweep.get_or_insert_with(Default::default).workers = Some(parse_value(key, value_str)?);
                }
                "sweep.coordinator-rank" => {
                    self.sweep
                        .get_or_insert_with(Default::default)
                        .coordinator_rank = Some(parse_value(key, value_str)?);
                }
                "domain.type" => {
                    self.domain.get_or_insert_with(Default::default).kind = Some(parse_value(key, value_str)?);
                }
                "domain.start" => {
                    self.domain.get_or_insert_with(Default::default).start = Some(parse_value(key, value_str)?);
                }
                "domain.end" => {
                    self.domain.get_or_insert_with(Default::default).end = Some(parse_value(key, value_str)?);
                }
                "domain.count" => {
                    self.domain.get_or_insert_with(Default::default).count = Some(parse_value(key, value_str)?);
                }
                "domain.step" => {
                    self.domain.get_or_insert_with(Default::default).step = Some(parse_value(key, value_str)?);
                }
                "checkpoint.path" => {
                    self.checkpoint.get_or_insert_with(Default::default).path = Some(PathBuf::from(value_str));
                }
                "checkpoint.encoding" => {
                    self.checkpoint.get_or_insert_with(Default::default).encoding = Some(parse_value(key, value_str)?);
                }
                "model.level" => {
                    self.model.get_or_insert_with(Default::default).level = Some(parse_value(key, value_str)?);
                }
                "model.broadening" => {
                    self.model.get_or_insert_with(Default::default).broadening = Some(parse_value(key, value_str)?);
                }
                "model.temperature" => {
                    self.model.get_or_insert_with(Default::default).temperature = Some(parse_value(key, value_str)?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value_str: &str) -> Result<T> {
    value_str
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value_str)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use once_cell::sync::Lazy;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    const BASE_CONFIG: &str = r#"
        [sweep]
        label = "IV"
        workers = 2

        [domain]
        type = "linear"
        start = -1.0
        end = 1.0
        count = 21

        [[series]]
        tag = "TRANSMISSION"
        parameter = 1

        [[series]]
        tag = "CURRENT0"
        enabled = false

        [checkpoint]
        path = "iv.dat"
        encoding = "binary"

        [model]
        broadening = 0.1
        biases = [0.2, 0.4]
    "#;

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn run_args(config_path: &Path, extra: &[&str]) -> RunArgs {
        let mut args = vec!["eloop", "run", "-c", config_path.to_str().unwrap()];
        args.extend_from_slice(extra);
        match Cli::parse_from(args).command {
            Commands::Run(run_args) => run_args,
            _ => panic!("Expected 'run' subcommand"),
        }
    }

    fn load(name: &str, content: &str, extra: &[&str]) -> Result<RunConfig> {
        let path = write_config_file(name, content);
        let args = run_args(&path, extra);
        PartialRunConfig::from_file(&path)?.merge_with_cli(&args)
    }

    #[test]
    fn file_values_are_used_when_no_overrides_are_given() {
        let config = load("base.toml", BASE_CONFIG, &[]).unwrap();

        assert_eq!(config.sweep.label, "IV");
        assert_eq!(config.sweep.workers, 2);
        assert_eq!(
            config.sweep.domain,
            DomainSpec::Linear {
                start: -1.0,
                end: 1.0,
                count: 21
            }
        );
        let enabled: Vec<&SeriesTag> = config.sweep.enabled_series().map(|s| &s.tag).collect();
        assert_eq!(enabled, vec![&SeriesTag::transmission()]);

        let checkpoint = config.sweep.checkpoint.unwrap();
        assert_eq!(checkpoint.path, PathBuf::from("iv.dat"));
        assert_eq!(checkpoint.encoding, Encoding::Binary);

        assert_eq!(config.model.broadening, 0.1);
        assert_eq!(config.model.biases, vec![0.2, 0.4]);
        assert_eq!(config.model.level, 0.0);
    }

    #[test]
    fn cli_arguments_override_file_values() {
        let config = load(
            "override.toml",
            BASE_CONFIG,
            &[
                "-w", "5", "-o", "other.dat", "-e", "text", "--enable", "CURRENT0", "--label",
                "RUN2",
            ],
        )
        .unwrap();

        assert_eq!(config.sweep.workers, 5);
        assert_eq!(config.sweep.label, "RUN2");
        assert_eq!(config.sweep.enabled_series().count(), 2);
        let checkpoint = config.sweep.checkpoint.unwrap();
        assert_eq!(checkpoint.path, PathBuf::from("other.dat"));
        assert_eq!(checkpoint.encoding, Encoding::Text);
    }

    #[test]
    fn set_values_override_file_values() {
        let config = load(
            "set.toml",
            BASE_CONFIG,
            &[
                "-S",
                "domain.type=stepped",
                "-S",
                "domain.step=0.5",
                "-S",
                "model.temperature=0",
            ],
        )
        .unwrap();

        assert_eq!(
            config.sweep.domain,
            DomainSpec::Stepped {
                start: -1.0,
                end: 1.0,
                step: 0.5
            }
        );
        assert_eq!(config.model.temperature, 0.0);
    }

    #[test]
    fn minimal_file_falls_back_to_defaults() {
        let config = load(
            "minimal.toml",
            r#"
            [domain]
            type = "explicit"
            points = [0.0, 0.5, 1.0]
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(config.sweep.label, "SWEEP");
        assert_eq!(config.sweep.workers, 1);
        assert_eq!(config.sweep.coordinator_rank, 0);
        assert!(config.sweep.checkpoint.is_none());
        assert_eq!(config.sweep.series, vec![SeriesSpec::transmission(1)]);
        assert_eq!(config.model, ModelParams::default());
    }

    #[test]
    fn missing_domain_is_a_config_error() {
        let result = load("nodomain.toml", "[sweep]\nworkers = 2\n", &[]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("domain")));
    }

    #[test]
    fn toggling_an_unconfigured_series_is_rejected() {
        let result = load("toggle.toml", BASE_CONFIG, &["--disable", "CURRENT7"]);
        assert!(matches!(result, Err(CliError::Argument(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = write_config_file("unknown.toml", "[sweep]\nthreads = 4\n");
        let result = PartialRunConfig::from_file(&path);
        assert!(matches!(result, Err(CliError::FileParsing { .. })));

        let result = load("badset.toml", BASE_CONFIG, &["-S", "sweep.threads=4"]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn invalid_sweep_is_reported_through_the_builder() {
        let result = load("badrank.toml", BASE_CONFIG, &["--coordinator", "2"]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("Coordinator")));
    }
}
