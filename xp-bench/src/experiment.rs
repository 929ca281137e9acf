// Copyright (c) Facebook, Inc. and its affiliates.

// The individual experiment variants under experiment/ inherit all uses
// from this file. Make common stuff available.
use anyhow::Result;
use log::{debug, info};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::params::Combination;
use super::run::RunCtx;
use xp_bench_intf::{ServerSpec, XpError};

/// Benchmark tool and environment parameters every experiment sweeps,
/// passed as dedicated flags rather than through `--params`.
pub const OTHER_PARAMS: [&'static str; 4] = ["clients", "txns", "duration", "startup_spacing"];

lazy_static::lazy_static! {
    static ref EXPERIMENTS: Mutex<Vec<Arc<Box<dyn Experiment>>>> = Mutex::new(vec![]);
}

pub fn find_experiment(name: &str) -> Result<Arc<Box<dyn Experiment>>> {
    for exp in EXPERIMENTS.lock().unwrap().iter() {
        if exp.desc().name == name {
            return Ok(exp.clone());
        }
    }
    Err(XpError::config(format!("unknown experiment {:?}", name)).into())
}

/// `(name, about)` of every registered experiment.
pub fn experiment_list() -> Vec<(String, String)> {
    EXPERIMENTS
        .lock()
        .unwrap()
        .iter()
        .map(|exp| {
            let desc = exp.desc();
            (desc.name, desc.about)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDesc {
    pub name: String,
    pub about: String,
    pub other_params: Vec<String>,
    pub workload_params: Vec<String>,
}

impl ExperimentDesc {
    pub fn new(name: &str, about: &str) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            other_params: OTHER_PARAMS.iter().map(|p| p.to_string()).collect(),
            workload_params: vec![],
        }
    }

    pub fn other_param(mut self, param: &str) -> Self {
        self.other_params.push(param.into());
        self
    }

    pub fn workload_params(mut self, params: &[&str]) -> Self {
        self.workload_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Expansion order: other params first, then the workload params.
    pub fn param_names(&self) -> Vec<String> {
        self.other_params
            .iter()
            .chain(self.workload_params.iter())
            .cloned()
            .collect()
    }
}

pub trait Experiment: Send + Sync {
    fn desc(&self) -> ExperimentDesc;

    /// Fresh hook state for one run.
    fn hooks(&self) -> Box<dyn ExperimentHooks> {
        Box::new(NoHooks {})
    }
}

/// Variant specific steps woven into the lifecycle. All default to no-op.
/// An error from any of them aborts the whole run.
pub trait ExperimentHooks {
    /// Once per run before anything else.
    fn pre_run(&mut self, _rctx: &RunCtx) -> Result<()> {
        Ok(())
    }

    fn pre_config_gen(&mut self, _rctx: &RunCtx, _server: &ServerSpec) -> Result<()> {
        Ok(())
    }

    fn post_config_gen(&mut self, _rctx: &RunCtx, _config_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Before the trials of every surviving combination. `comb` is the
    /// combination as expanded from the declared lists, before any filter
    /// `change`.
    fn pre_run_per_combination(&mut self, _rctx: &RunCtx, _comb: &Combination) -> Result<()> {
        Ok(())
    }
}

pub struct NoHooks {}

impl ExperimentHooks for NoHooks {}

fn register_experiment(exp: Box<dyn Experiment>) -> () {
    debug!("experiment: registering {:?}", &exp.desc().name);
    EXPERIMENTS.lock().unwrap().push(Arc::new(exp));
}

mod cockroach;
pub mod network;
mod tpcc;
mod ycsb;

pub fn init_experiments() -> () {
    register_experiment(Box::new(ycsb::YcsbExperiment::new(
        "ycsb",
        "YCSB-like workload over the parameter matrix",
    )));
    register_experiment(Box::new(ycsb::YcsbExperiment::new(
        "ycsb-latency",
        "YCSB-like workload, latency oriented settings",
    )));
    register_experiment(Box::new(network::NetworkExperiment::asymmetry()));
    register_experiment(Box::new(network::NetworkExperiment::jitter()));
    register_experiment(Box::new(tpcc::TpccExperiment {}));
    register_experiment(Box::new(cockroach::CockroachExperiment::new(
        "cockroach",
        "Cockroach-style workload",
    )));
    register_experiment(Box::new(cockroach::CockroachExperiment::new(
        "cockroach-latency",
        "Cockroach-style workload, latency oriented settings",
    )));
    info!("experiment: {} variants registered", EXPERIMENTS.lock().unwrap().len());
}
