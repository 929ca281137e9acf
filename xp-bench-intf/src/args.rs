// Copyright (c) Facebook, Inc. and its affiliates.
use log::error;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::process::exit;
use std::sync::Mutex;
use xp_util::*;

lazy_static::lazy_static! {
    static ref TOP_ARGS_STR: String = {
        let dfl_args = Args::default();
        format!(
            "-c, --config-dir=[DIR]      'Path to the configuration files (dfl: {dfl_config_dir})'
             -o, --out-dir=[DIR]         'Path to the output directory (dfl: {dfl_out_dir})'
             -A, --artifact-dir=[DIR]    'Where generated configs and delay matrices go (dfl: {dfl_artifact_dir})'
                 --admin=[CMD]           'Admin tool command line (dfl: {dfl_admin})'
                 --seed=[SEED]           'Seed for the benchmark random engine (dfl: {dfl_seed})'
                 --aws-region=[REGION]   'Cloud region of the servers for network impairment scripts'
                 --settle=[DUR]          'Pause after applying an impairment script (dfl: {dfl_settle})'
             -a, --args=[FILE]           'Loads base command line arguments from FILE'
             -v...                       'Sets the level of verbosity'",
            dfl_config_dir = dfl_args.config_dir,
            dfl_out_dir = dfl_args.out_dir,
            dfl_artifact_dir = dfl_args.artifact_dir,
            dfl_admin = dfl_args.admin,
            dfl_seed = dfl_args.seed,
            dfl_settle = format_duration(dfl_args.settle),
        )
    };
    static ref AFTER_HELP: Mutex<&'static str> = Mutex::new("");
}

fn static_format_experiment_list(header: &str, list: &[(String, String)]) -> &'static str {
    let mut buf = String::new();
    let name_width = list.iter().map(|pair| pair.0.len()).max().unwrap_or(0);
    write!(buf, "{}", header).unwrap();
    for pair in list.iter() {
        writeln!(
            buf,
            "    {:width$}    {}",
            &pair.0,
            &pair.1,
            width = name_width
        )
        .unwrap();
    }
    Box::leak(Box::new(buf))
}

pub fn set_experiment_list(list: Vec<(String, String)>) {
    *AFTER_HELP.lock().unwrap() = static_format_experiment_list("EXPERIMENTS:\n", &list);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Mode {
    Run,
    Expand,
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Args {
    pub config_dir: String,
    pub out_dir: String,
    pub artifact_dir: String,
    pub admin: String,
    pub seed: u64,
    pub aws_region: Option<String>,
    pub settle: f64,

    #[serde(skip)]
    pub mode: Mode,
    #[serde(skip)]
    pub experiment: String,
    #[serde(skip)]
    pub name: Option<String>,
    #[serde(skip)]
    pub tag_keys: Vec<String>,
    #[serde(skip)]
    pub dry_run: bool,
    #[serde(skip)]
    pub skip_starting_server: bool,
    #[serde(skip)]
    pub no_client_data: bool,
    #[serde(skip)]
    pub no_server_data: bool,
    #[serde(skip)]
    pub verbosity: u32,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Run
    }
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config_dir: "config".into(),
            out_dir: ".".into(),
            artifact_dir: std::env::temp_dir().to_string_lossy().to_string(),
            admin: Self::DFL_ADMIN.into(),
            seed: 0,
            aws_region: None,
            settle: Self::DFL_SETTLE,
            mode: Mode::Run,
            experiment: "".into(),
            name: None,
            tag_keys: vec![],
            dry_run: false,
            skip_starting_server: false,
            no_client_data: false,
            no_server_data: false,
            verbosity: 0,
        }
    }
}

impl Args {
    pub const DFL_ADMIN: &'static str = "admin";
    pub const DFL_SETTLE: f64 = 5.0;

    /// Name of the output subdirectory, `--name` if given.
    pub fn run_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.experiment)
    }

    fn parse_tag_keys(subm: &clap::ArgMatches) -> Vec<String> {
        match subm.values_of("tag-keys") {
            Some(keys) => keys
                .filter(|k| k.len() > 0)
                .map(|k| k.to_string())
                .collect(),
            None => vec![],
        }
    }

    fn process_subcommand(&mut self, mode: Mode, subm: &clap::ArgMatches) {
        self.mode = mode;
        self.experiment = subm.value_of("EXPERIMENT").unwrap_or("").to_string();
        self.tag_keys = Self::parse_tag_keys(subm);

        if mode == Mode::Run {
            self.name = subm.value_of("name").map(|v| v.to_string());
            self.dry_run = subm.is_present("dry-run");
            self.skip_starting_server = subm.is_present("skip-starting-server");
            self.no_client_data = subm.is_present("no-client-data");
            self.no_server_data = subm.is_present("no-server-data");
        }
    }
}

impl JsonLoad for Args {}
impl JsonSave for Args {}

impl JsonArgs for Args {
    fn match_cmdline() -> clap::ArgMatches<'static> {
        let experiment_arg = clap::Arg::with_name("EXPERIMENT")
            .required(true)
            .index(1)
            .help("Name of the experiment");
        let tag_keys_arg = clap::Arg::with_name("tag-keys")
            .long("tag-keys")
            .short("t")
            .takes_value(true)
            .multiple(true)
            .number_of_values(1)
            .use_delimiter(true)
            .help("Keys to include in the tag (dfl: parameters with more than one value)");

        clap::App::new("xp-bench")
            .version((*super::FULL_VERSION).as_str())
            .author(env!("CARGO_PKG_AUTHORS"))
            .about("Benchmark experiment matrix driver")
            .setting(clap::AppSettings::UnifiedHelpMessage)
            .setting(clap::AppSettings::DeriveDisplayOrder)
            .setting(clap::AppSettings::SubcommandRequiredElseHelp)
            .args_from_usage(&TOP_ARGS_STR)
            .subcommand(
                clap::SubCommand::with_name("run")
                    .about("Runs all combinations of an experiment")
                    .arg(experiment_arg.clone())
                    .arg(tag_keys_arg.clone())
                    .args_from_usage(
                        "-n, --name=[NAME]        'Override name of the experiment output directory'
                         -d, --dry-run            'Check the settings and generate configs, print admin commands instead of running them'
                             --skip-starting-server 'Reuse already running servers'
                             --no-client-data     'Skip collecting client data'
                             --no-server-data     'Skip collecting server data'",
                    ),
            )
            .subcommand(
                clap::SubCommand::with_name("expand")
                    .about("Lists the combinations and tags an experiment would run")
                    .arg(experiment_arg.clone())
                    .arg(tag_keys_arg.clone()),
            )
            .subcommand(clap::SubCommand::with_name("list").about("Lists known experiments"))
            .after_help(*AFTER_HELP.lock().unwrap())
            .get_matches()
    }

    fn verbosity(matches: &clap::ArgMatches) -> u32 {
        matches.occurrences_of("v") as u32
    }

    fn process_cmdline(&mut self, matches: &clap::ArgMatches) -> bool {
        let dfl = Args::default();
        let mut updated = false;

        if let Some(v) = matches.value_of("config-dir") {
            self.config_dir = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.config_dir.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("out-dir") {
            self.out_dir = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.out_dir.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("artifact-dir") {
            self.artifact_dir = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.artifact_dir.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("admin") {
            self.admin = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.admin.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("seed") {
            self.seed = if v.len() > 0 {
                match v.parse::<u64>() {
                    Ok(v) => v,
                    Err(e) => {
                        error!("Invalid --seed {:?} ({})", v, &e);
                        exit(1);
                    }
                }
            } else {
                dfl.seed
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("aws-region") {
            self.aws_region = if v.len() > 0 {
                Some(v.to_string())
            } else {
                None
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("settle") {
            self.settle = if v.len() > 0 {
                match parse_duration(v) {
                    Ok(v) => v,
                    Err(e) => {
                        error!("Invalid --settle {:?} ({})", v, &e);
                        exit(1);
                    }
                }
            } else {
                dfl.settle
            };
            updated = true;
        }

        self.verbosity = Self::verbosity(matches);

        match matches.subcommand() {
            ("run", Some(subm)) => self.process_subcommand(Mode::Run, subm),
            ("expand", Some(subm)) => self.process_subcommand(Mode::Expand, subm),
            ("list", Some(subm)) => self.process_subcommand(Mode::List, subm),
            _ => {}
        }

        updated
    }
}

#[cfg(test)]
mod tests {
    use super::Args;
    use xp_util::{JsonLoad, JsonSave};

    #[test]
    fn test_args_file_round_trip_keeps_base_args_only() {
        let _ = ::env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.json");

        let mut args = Args::default();
        args.config_dir = "cfg".into();
        args.seed = 7;
        args.experiment = "ycsb".into();
        args.dry_run = true;
        args.save(&path).unwrap();

        let loaded = Args::load(&path).unwrap();
        assert_eq!(loaded.config_dir, "cfg");
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.settle, Args::DFL_SETTLE);
        assert_eq!(loaded.experiment, "");
        assert!(!loaded.dry_run);
    }

    #[test]
    fn test_run_name() {
        let mut args = Args::default();
        args.experiment = "ycsb-asym".into();
        assert_eq!(args.run_name(), "ycsb-asym");
        args.name = Some("asym-rerun".into());
        assert_eq!(args.run_name(), "asym-rerun");
    }
}
