// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use xp_util::*;

use super::admin::{AdminCmd, BenchmarkCmd, CommandSink, Target};
use super::config_gen::generate_config;
use super::experiment::{ExperimentDesc, ExperimentHooks};
use super::filter::{apply_filters, Verdict};
use super::params::{make_tag, Combination, ParameterSpace};
use super::progress::RunProgress;
use xp_bench_intf::{format_param, Args, ExperimentSettings, ServerSpec, Settings, XpError};

/// Per-run knobs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct RunOpts {
    pub config_dir: PathBuf,
    /// Collected data goes here, already nested under the run name.
    pub out_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub seed: u64,
    pub tag_keys: Vec<String>,
    pub dry_run: bool,
    pub skip_starting_server: bool,
    pub no_client_data: bool,
    pub no_server_data: bool,
    pub aws_region: Option<String>,
    pub settle: Duration,
}

impl RunOpts {
    pub fn from_args(args: &Args) -> Result<Self> {
        let settle = match Duration::try_from_secs_f64(args.settle) {
            Ok(v) => v,
            Err(_) => {
                return Err(XpError::config(format!(
                    "settle interval {} is not a valid duration",
                    args.settle
                ))
                .into())
            }
        };
        Ok(Self {
            config_dir: PathBuf::from(&args.config_dir),
            out_dir: Path::new(&args.out_dir).join(args.run_name()),
            artifact_dir: PathBuf::from(&args.artifact_dir),
            seed: args.seed,
            tag_keys: args.tag_keys.clone(),
            dry_run: args.dry_run,
            skip_starting_server: args.skip_starting_server,
            no_client_data: args.no_client_data,
            no_server_data: args.no_server_data,
            aws_region: args.aws_region.clone(),
            settle,
        })
    }
}

/// What hooks get to see of the run in progress.
pub struct RunCtx<'a> {
    pub settings: &'a Settings,
    pub exp: &'a ExperimentSettings,
    pub opts: &'a RunOpts,
    pub sink: &'a dyn CommandSink,
}

/// A combination which survived the filters, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRun {
    /// As expanded, before any filter `change`. Per-combination hooks get
    /// this one.
    pub declared: Combination,
    pub comb: Combination,
    pub changed: bool,
    /// One per trial.
    pub tags: Vec<String>,
    /// Benchmark flags with the tag left blank.
    pub bench: BenchmarkCmd,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanEntry {
    Run(PlannedRun),
    Skip(Combination),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerPlan {
    pub server: ServerSpec,
    pub config_name: String,
    pub entries: Vec<PlanEntry>,
}

impl ServerPlan {
    pub fn runs(&self) -> impl Iterator<Item = &PlannedRun> {
        self.entries.iter().filter_map(|entry| match entry {
            PlanEntry::Run(run) => Some(run),
            PlanEntry::Skip(_) => None,
        })
    }

    pub fn nr_benchmarks(&self) -> usize {
        self.runs().map(|run| run.tags.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub server_configs: usize,
    pub benchmarks: usize,
    pub skipped: usize,
    pub tags: Vec<String>,
}

/// Base name of the config template without extension, the leading part
/// of every tag.
pub fn config_name(server: &ServerSpec) -> String {
    Path::new(&server.config)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| server.config.clone())
}

fn bench_template(
    desc: &ExperimentDesc,
    settings: &Settings,
    exp: &ExperimentSettings,
    seed: u64,
    comb: &Combination,
) -> Result<BenchmarkCmd> {
    Ok(BenchmarkCmd {
        workload: exp.workload.clone(),
        clients: format_param(comb.require("clients")?),
        txns: format_param(comb.require("txns")?),
        duration: format_param(comb.require("duration")?),
        startup_spacing: format_param(comb.require("startup_spacing")?),
        sample: settings.sample,
        seed,
        params: comb.format_params(&desc.workload_params)?,
        tag: String::new(),
    })
}

/// Expand, filter and tag the whole experiment without side effects. Any
/// settings or filter problem surfaces here, before the first remote
/// command.
pub fn plan(
    desc: &ExperimentDesc,
    settings: &Settings,
    exp: &ExperimentSettings,
    opts: &RunOpts,
) -> Result<Vec<ServerPlan>> {
    let space = ParameterSpace::from_settings(&desc.param_names(), exp)
        .with_context(|| format!("Expanding parameters of {:?}", &desc.name))?;
    let tag_keys = space.tag_keys(&opts.tag_keys)?;
    check_filter_keys(&space, exp)?;
    let multi_trials = settings.trials > 1;

    let mut seen = HashSet::new();
    let mut plans = vec![];
    for server in exp.servers.iter() {
        let config_name = config_name(server);
        let mut entries = vec![];

        for declared in space.iter() {
            let (comb, changed) = match apply_filters(&exp.filters, declared.clone())? {
                Verdict::Removed => {
                    entries.push(PlanEntry::Skip(declared));
                    continue;
                }
                Verdict::Pass(comb) => (comb, false),
                Verdict::Changed(comb) => (comb, true),
            };

            let mut tags = vec![];
            for trial in 0..settings.trials {
                let tag = make_tag(
                    &config_name,
                    &tag_keys,
                    &comb,
                    if multi_trials { Some(trial) } else { None },
                )?;
                if !seen.insert(tag.clone()) {
                    return Err(XpError::config(format!(
                        "tag {:?} is used by more than one run, pick distinguishing --tag-keys",
                        &tag
                    ))
                    .into());
                }
                tags.push(tag);
            }

            let bench = bench_template(desc, settings, exp, opts.seed, &comb)?;
            entries.push(PlanEntry::Run(PlannedRun {
                declared,
                comb,
                changed,
                tags,
                bench,
            }));
        }

        plans.push(ServerPlan {
            server: server.clone(),
            config_name,
            entries,
        });
    }
    Ok(plans)
}

/// Every key a filter condition looks at must be an expanded parameter.
fn check_filter_keys(space: &ParameterSpace, exp: &ExperimentSettings) -> Result<()> {
    for (idx, rule) in exp.filters.iter().enumerate() {
        for key in rule.matches.iter().flat_map(|cond| cond.keys()) {
            if space.values(key).is_none() {
                return Err(XpError::filter(format!(
                    "filter #{} references {:?} which is not a parameter of this experiment",
                    idx, key
                ))
                .into());
            }
        }
    }
    Ok(())
}

fn check_exiting() -> Result<()> {
    if prog_exiting() {
        bail!("interrupted, stopping before the next step");
    }
    Ok(())
}

/// Client and server side collectors run concurrently; both must finish
/// before the next combination.
fn collect_data(
    sink: &dyn CommandSink,
    target: &Target,
    tag: &str,
    opts: &RunOpts,
) -> Result<()> {
    let mut cmds = vec![];
    if !opts.no_client_data {
        cmds.push(AdminCmd::CollectClient {
            target: target.clone(),
            tag: tag.to_string(),
            out_dir: opts.out_dir.clone(),
        });
    }
    if !opts.no_server_data {
        cmds.push(AdminCmd::CollectServer {
            target: target.clone(),
            tag: tag.to_string(),
            out_dir: opts.out_dir.clone(),
        });
    }

    let results: Vec<Result<()>> = std::thread::scope(|s| {
        let jhs: Vec<_> = cmds
            .iter()
            .map(|cmd| s.spawn(move || sink.execute(cmd)))
            .collect();
        jhs.into_iter()
            .map(|jh| {
                jh.join()
                    .unwrap_or_else(|_| Err(anyhow!("data collector panicked")))
            })
            .collect()
    });

    for res in results {
        res?;
    }
    Ok(())
}

fn run_server(
    rctx: &RunCtx,
    hooks: &mut dyn ExperimentHooks,
    plan: &ServerPlan,
    progress: &mut RunProgress,
    summary: &mut RunSummary,
) -> Result<()> {
    let (settings, opts, sink) = (rctx.settings, rctx.opts, rctx.sink);

    hooks.pre_config_gen(rctx, &plan.server)?;
    let template = opts.config_dir.join(&plan.server.config);
    let config_path = generate_config(settings, &template, &opts.artifact_dir)
        .with_context(|| format!("Generating config from template {:?}", &template))?;
    info!("============ GENERATED CONFIG {:?} ============", &config_path);
    hooks.post_config_gen(rctx, &config_path)?;

    let target = Target {
        config: config_path,
        user: settings.username.clone(),
        image: plan.server.image.clone(),
    };

    info!("STOP ANY RUNNING EXPERIMENT");
    sink.execute(&AdminCmd::Cleanup(target.clone()))?;

    if !opts.skip_starting_server {
        check_exiting()?;
        info!("START SERVERS");
        sink.execute(&AdminCmd::Start(target.clone()))?;

        info!("WAIT FOR ALL SERVERS TO BE ONLINE");
        sink.execute(&AdminCmd::WaitReady(target.clone()))?;
    }

    for entry in plan.entries.iter() {
        let run = match entry {
            PlanEntry::Skip(comb) => {
                warn!("SKIP {}", comb);
                summary.skipped += 1;
                continue;
            }
            PlanEntry::Run(run) => run,
        };
        check_exiting()?;
        if run.changed {
            debug!("run: filters changed the combination to {}", &run.comb);
        }

        hooks.pre_run_per_combination(rctx, &run.declared)?;

        for tag in run.tags.iter() {
            check_exiting()?;
            progress.set_status(&plan.config_name, tag);

            info!("RUN BENCHMARK");
            let mut bench = run.bench.clone();
            bench.tag = tag.clone();
            sink.execute(&AdminCmd::Benchmark(target.clone(), bench))?;

            info!("COLLECT DATA");
            collect_data(sink, &target, tag, opts)?;

            progress.inc();
            summary.benchmarks += 1;
            summary.tags.push(tag.clone());
        }
    }

    summary.server_configs += 1;
    Ok(())
}

/// Drive every server configuration of the experiment through cleanup,
/// (re)start, the filtered parameter matrix and data collection.
pub fn run_experiment(
    desc: &ExperimentDesc,
    hooks: &mut dyn ExperimentHooks,
    settings: &Settings,
    opts: &RunOpts,
    sink: &dyn CommandSink,
) -> Result<RunSummary> {
    let exp = settings.experiment(&desc.name)?;
    let plans = plan(desc, settings, &exp, opts)?;

    let rctx = RunCtx {
        settings,
        exp: &exp,
        opts,
        sink,
    };

    hooks.pre_run(&rctx)?;

    let started_at = unix_now();

    let total: usize = plans.iter().map(|p| p.nr_benchmarks()).sum();
    let mut progress = RunProgress::new(&desc.name, total);
    let mut summary = RunSummary::default();

    for plan in plans.iter() {
        check_exiting()?;
        run_server(&rctx, hooks, plan, &mut progress, &mut summary)
            .with_context(|| format!("Running {:?} on {:?}", &desc.name, &plan.server.config))?;
    }

    progress.finish();
    info!(
        "run: {} started at {} completed, {} benchmarks over {} server configs, {} combinations skipped",
        &desc.name,
        format_unix_time(started_at),
        summary.benchmarks,
        summary.server_configs,
        summary.skipped
    );
    Ok(summary)
}
