// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::Result;
use log::{error, info};
use std::fmt::Write as FmtWrite;
use std::process::exit;
use xp_util::*;

use xp_bench_intf::{set_experiment_list, Args, Mode, Settings};

mod admin;
mod config_gen;
mod delay;
mod experiment;
mod filter;
mod netem;
mod params;
mod progress;
mod run;

use admin::{AdminSink, CommandSink, DryRunSink};
use run::{PlanEntry, RunOpts};

fn format_experiment_list() -> String {
    let mut buf = String::new();
    for (name, about) in experiment::experiment_list() {
        // Registered names always resolve.
        let desc = match experiment::find_experiment(&name) {
            Ok(exp) => exp.desc(),
            Err(_) => continue,
        };
        writeln!(buf, "{}: {}", name, about).unwrap();
        writeln!(buf, "    other params: {}", desc.other_params.join(", ")).unwrap();
        writeln!(buf, "    workload params: {}", desc.workload_params.join(", ")).unwrap();
    }
    buf
}

fn expand(args: &Args) -> Result<()> {
    let desc = experiment::find_experiment(&args.experiment)?.desc();
    let settings = Settings::load_dir(&args.config_dir)?;
    let exp = settings.experiment(&desc.name)?;
    let opts = RunOpts::from_args(args)?;

    let plans = run::plan(&desc, &settings, &exp, &opts)?;
    for plan in plans.iter() {
        println!(
            "[{}] {} ({} benchmarks)",
            &plan.server.config,
            &plan.server.image,
            plan.nr_benchmarks()
        );
        for entry in plan.entries.iter() {
            match entry {
                PlanEntry::Run(run) => {
                    println!(
                        "  {} {}{}",
                        run.tags.join(" "),
                        &run.comb,
                        if run.changed { " (changed)" } else { "" }
                    );
                }
                PlanEntry::Skip(comb) => println!("  SKIP {}", comb),
            }
        }
    }
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let experiment = experiment::find_experiment(&args.experiment)?;
    let desc = experiment.desc();
    let settings = Settings::load_dir(&args.config_dir)?;
    let opts = RunOpts::from_args(args)?;

    let sink: Box<dyn CommandSink> = match args.dry_run {
        true => Box::new(DryRunSink),
        false => Box::new(AdminSink::new(&args.admin)?),
    };
    let mut hooks = experiment.hooks();

    info!(
        "xp-bench: Running {:?} from {:?} into {:?}{}",
        &desc.name,
        &opts.config_dir,
        &opts.out_dir,
        if opts.dry_run { " (dry-run)" } else { "" }
    );
    let summary = run::run_experiment(&desc, hooks.as_mut(), &settings, &opts, sink.as_ref())?;
    println!(
        "{}: {} benchmarks over {} server configs, {} combinations skipped",
        &desc.name, summary.benchmarks, summary.server_configs, summary.skipped
    );
    Ok(())
}

fn main() {
    setup_prog_state();
    experiment::init_experiments();
    set_experiment_list(experiment::experiment_list());

    let (args_file, updated) = Args::init_args_and_logging_nosave().unwrap_or_else(|e| {
        error!("Failed to process args file ({:#})", &e);
        exit(1);
    });

    if updated {
        if let Err(e) = Args::save_args(&args_file) {
            error!("Failed to update args file ({:#})", &e);
            exit(1);
        }
    }

    let args = &args_file.data;
    let res = match args.mode {
        Mode::List => {
            print!("{}", format_experiment_list());
            Ok(())
        }
        Mode::Expand => expand(args),
        Mode::Run => run(args),
    };

    if let Err(e) = res {
        error!("{:#}", &e);
        exit(1);
    }
}
