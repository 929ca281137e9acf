// Copyright (c) Facebook, Inc. and its affiliates.
//! YCSB variants running every combination under a synthetic network
//! impairment. The per-value impairment scripts are generated after the
//! config and pushed to the servers before each combination.
use super::*;
use anyhow::bail;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde_json::Value;
use xp_util::*;

use super::ycsb::YCSB_PARAMS;
use crate::admin::AdminCmd;
use crate::delay::{jitter_amplitude, DelayMatrix};
use crate::netem::{script_runner, ScriptRunner};
use xp_bench_intf::format_param;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impairment {
    /// One direction of each region pair gets `asym_ratio`% of the pair's
    /// combined latency.
    Asymmetry,
    /// Base latencies with `jitter` msecs peak-to-peak.
    Jitter,
}

impl Impairment {
    pub fn param(&self) -> &'static str {
        match self {
            Self::Asymmetry => "asym_ratio",
            Self::Jitter => "jitter",
        }
    }

    pub fn script_name(&self, value: &Value) -> String {
        match self {
            Self::Asymmetry => format!("netem_asym_{}", format_param(value)),
            Self::Jitter => format!("netem_jitter_{}", format_param(value)),
        }
    }
}

pub struct NetworkExperiment {
    kind: Impairment,
}

impl NetworkExperiment {
    pub fn asymmetry() -> Self {
        Self {
            kind: Impairment::Asymmetry,
        }
    }

    pub fn jitter() -> Self {
        Self {
            kind: Impairment::Jitter,
        }
    }
}

impl Experiment for NetworkExperiment {
    fn desc(&self) -> ExperimentDesc {
        let (name, about) = match self.kind {
            Impairment::Asymmetry => ("ycsb-asym", "YCSB under asymmetric inter-region latency"),
            Impairment::Jitter => ("ycsb-jitter", "YCSB under inter-region latency jitter"),
        };
        ExperimentDesc::new(name, about)
            .other_param(self.kind.param())
            .workload_params(&YCSB_PARAMS)
    }

    fn hooks(&self) -> Box<dyn ExperimentHooks> {
        Box::new(NetworkHooks::new(self.kind))
    }
}

pub struct NetworkHooks {
    kind: Impairment,
    runner: Option<Box<dyn ScriptRunner>>,
    rng: Box<dyn RngCore + Send>,
}

impl NetworkHooks {
    pub fn new(kind: Impairment) -> Self {
        Self {
            kind,
            runner: None,
            rng: Box::new(StdRng::from_entropy()),
        }
    }

    pub fn with_runner(
        kind: Impairment,
        runner: Box<dyn ScriptRunner>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            kind,
            runner: Some(runner),
            rng,
        }
    }

    fn param_f64(&self, value: &Value) -> Result<f64> {
        match value.as_f64() {
            Some(v) if v >= 0.0 => Ok(v),
            _ => Err(XpError::config(format!(
                "{:?} values must be non-negative numbers, got {}",
                self.kind.param(),
                value
            ))
            .into()),
        }
    }

    fn prompt_region() -> Result<String> {
        let term = console::Term::stdout();
        term.write_str("Enter AWS region: ")?;
        let region = term.read_line()?.trim().to_string();
        if region.is_empty() {
            return Err(XpError::config("no AWS region given").into());
        }
        Ok(region)
    }
}

impl ExperimentHooks for NetworkHooks {
    fn pre_run(&mut self, rctx: &RunCtx) -> Result<()> {
        if rctx.opts.dry_run || self.runner.is_some() {
            return Ok(());
        }
        let region = match rctx.opts.aws_region.as_ref() {
            Some(v) => v.clone(),
            None => Self::prompt_region()?,
        };
        info!("netem: Impairment scripts go through {:?}", &region);
        self.runner = Some(script_runner(&region)?);
        Ok(())
    }

    fn post_config_gen(&mut self, rctx: &RunCtx, config_path: &Path) -> Result<()> {
        let values = rctx
            .exp
            .param_values(self.kind.param())?
            .iter()
            .map(|v| -> Result<(f64, String)> { Ok((self.param_f64(v)?, self.kind.script_name(v))) })
            .collect::<Result<Vec<_>>>()?;
        let artifact_dir = &rctx.opts.artifact_dir;
        let gen_netem = |delay_path: &Path, out: String, jitter: Option<f64>| AdminCmd::GenNetem {
            config: config_path.to_path_buf(),
            user: rctx.settings.username.clone(),
            delay_path: delay_path.to_path_buf(),
            out,
            jitter,
        };

        match self.kind {
            Impairment::Asymmetry => {
                for (ratio, name) in values.iter() {
                    let matrix = DelayMatrix::base().with_asymmetry(*ratio, &mut *self.rng)?;
                    let delay_path = artifact_dir.join(format!("{}.csv", &name));
                    matrix.save_csv(&delay_path)?;
                    rctx.sink
                        .execute(&gen_netem(&delay_path, format!("{}.sh", &name), None))?;
                }
            }
            Impairment::Jitter => {
                let delay_path = artifact_dir.join("netem_jitter.csv");
                DelayMatrix::base().save_csv(&delay_path)?;
                for (jitter, name) in values.iter() {
                    rctx.sink.execute(&gen_netem(
                        &delay_path,
                        format!("{}.sh", name),
                        Some(jitter_amplitude(*jitter)),
                    ))?;
                }
            }
        }
        Ok(())
    }

    fn pre_run_per_combination(&mut self, rctx: &RunCtx, comb: &Combination) -> Result<()> {
        if rctx.opts.dry_run {
            return Ok(());
        }
        let name = self.kind.script_name(comb.require(self.kind.param())?);
        let runner = match self.runner.as_ref() {
            Some(v) => v,
            None => bail!("impairment script runner is not set up"),
        };

        runner.run_script(&name)?;
        debug!("netem: {} applied, settling for {:?}", &name, rctx.opts.settle);
        if wait_prog_state(rctx.opts.settle) == ProgState::Exiting {
            bail!("interrupted while settling after {}.sh", &name);
        }
        Ok(())
    }
}
