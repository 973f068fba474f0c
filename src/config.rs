use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Deserialize;

use crate::{
    algorithm::{scoring::ScoreParams, tiled::TileBackend, AlignmentOptions, DEFAULT_MAX_CELLS, DEFAULT_TILE_SIZE},
    registry::Registry,
    scheduler::SchedulerSettings,
    token::tokenizer::TokenizerKind,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One row per pair, significant pairs marked with '*'.
    Table,
    /// One JSON record per line.
    Json,
}

macro_rules! config_structs {
    {
        $(
            $( #[config_opt($attr:meta)] )*
            pub $name:ident: $typ:ty,
        )*
        $(
            #[config_alias($atarget:ident = $avalue:expr)]
            $( #[config_opt($aattr:meta)] )*
            pub $aname:ident: bool,
        )*
    } => {
        #[derive(Clone, Debug, PartialEq)]
        pub struct Config {
            $( pub $name: $typ, )*
        }

        #[derive(Args, Debug, Default, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct ConfigOpt {
            $( $( #[$aattr] )* #[serde(skip)] pub $aname: bool, )*
            $( $( #[$attr] )* pub $name: Option<$typ>, )*
        }

        impl Config {
            pub fn update(self, mut opt: ConfigOpt) -> Config {
                $(
                    if opt.$aname {
                        opt.$atarget = Some($avalue);
                    }
                )*
                Config {
                    $( $name: opt.$name.unwrap_or(self.$name), )*
                }
            }
        }
    }
}

config_structs! {
    #[config_opt(arg(short, long, value_name = "NAME"))]
    pub algorithm: String,

    #[config_opt(arg(short, long))]
    pub tokenizer: TokenizerKind,

    #[config_opt(arg(short, long, value_name = "NAME", value_delimiter = ','))]
    pub preprocessors: Vec<String>,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub match_score: u32,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub skip_penalty: u32,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub threshold: u32,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub drop_off: u32,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub max_cells: u64,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub tile_size: usize,

    #[config_opt(arg(long, require_equals = true, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL", group = "wavefront_group"))]
    pub wavefront: bool,

    #[config_opt(arg(long, value_name = "MS"))]
    pub time_slice_ms: u64,

    #[config_opt(arg(long, value_name = "PATH"))]
    pub store: PathBuf,

    #[config_opt(arg(short, long))]
    pub output: OutputFormat,

    #[config_opt(arg(short, long, value_name = "REGEX"))]
    pub filter: String,

    #[config_opt(arg(long, value_name = "PATH"))]
    pub common_code: PathBuf,

    #[config_alias(wavefront = false)]
    #[config_opt(arg(long, group = "wavefront_group"))]
    pub no_wavefront: bool,
}

pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("simsweep")
        .join("store.json")
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("simsweep").join("config.toml"))
}

impl Default for Config {
    fn default() -> Config {
        let params = ScoreParams::default();
        Config {
            algorithm: "auto".to_owned(),
            tokenizer: TokenizerKind::Whitespace,
            preprocessors: vec![],
            match_score: params.match_score,
            skip_penalty: params.skip_penalty,
            threshold: params.threshold,
            drop_off: params.drop_off,
            max_cells: DEFAULT_MAX_CELLS,
            tile_size: DEFAULT_TILE_SIZE,
            wavefront: true,
            time_slice_ms: 250,
            store: default_store_path(),
            output: OutputFormat::Table,
            filter: String::new(),
            common_code: PathBuf::new(),
        }
    }
}

/// Reads `path`, or the default config file if `path` is None. Only an explicitly named file
/// has to exist.
pub fn read_config_file(path: Option<&Path>) -> Result<ConfigOpt> {
    let (path, required) = match path {
        Some(path) => (path.to_owned(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(ConfigOpt::default()),
        },
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => parse_config(&text).with_context(|| format!("invalid config file {}", path.display())),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigOpt::default()),
        Err(e) => Err(e).with_context(|| format!("cannot read config file {}", path.display())),
    }
}

pub fn parse_config(text: &str) -> Result<ConfigOpt> {
    Ok(toml::from_str(text)?)
}

impl Config {
    pub fn params(&self) -> ScoreParams {
        ScoreParams {
            match_score: self.match_score,
            skip_penalty: self.skip_penalty,
            threshold: self.threshold,
            drop_off: self.drop_off,
        }
    }

    pub fn common_code(&self) -> Option<&Path> {
        Some(self.common_code.as_path()).filter(|path| !path.as_os_str().is_empty())
    }

    pub fn scheduler_settings(&self, registry: &Registry) -> Result<SchedulerSettings> {
        let params = self.params();
        params.validate()?;
        Ok(SchedulerSettings {
            algorithm: registry.algorithm(&self.algorithm)?,
            options: AlignmentOptions {
                params,
                max_cells: self.max_cells,
                tile_size: self.tile_size,
                backend: if self.wavefront {
                    TileBackend::Wavefront
                } else {
                    TileBackend::Sequential
                },
            },
            tokenizer: self.tokenizer,
            time_slice: Duration::from_millis(self.time_slice_ms),
        })
    }
}
