// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use xp_util::*;

use super::{FilterRule, XpError};

pub const SETTINGS_FILENAME: &'static str = "settings.json";

/// Process-wide experiment settings, loaded once from
/// `CONFIG_DIR/settings.json`:
///
/// ```json
/// {
///     "username": string,      // Username to ssh to the machines
///     "sample": int,           // Sample rate, in percentage, of the measurements
///     "trials": int,           // Repetitions of every combination
///     "regions": [string],     // Regions involved in the experiment
///     "distance_ranking": { string: [string] }, // Other regions, closest to farthest
///     "servers_public": { string: [string] },   // Public server addresses per region
///     "servers_private": { string: [string] },  // Private server addresses per region
///     "clients": { string: [string] },          // Client addresses per region
///
///     <experiment name>: {
///         "servers": [ { "config": string, "image": string } ],
///         "workload": string,
///         <parameter>: [<parameter value>],
///         "filters": [ ... ]
///     }
/// }
/// ```
///
/// Every experiment is run for the Cartesian product of its parameter
/// lists, pruned and rewritten by its filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub username: String,
    #[serde(default = "Settings::dfl_sample")]
    pub sample: u32,
    #[serde(default = "Settings::dfl_trials")]
    pub trials: u32,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub distance_ranking: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub servers_public: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub servers_private: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub clients: BTreeMap<String, Vec<String>>,

    #[serde(flatten)]
    pub experiments: BTreeMap<String, Value>,
}

impl JsonLoad for Settings {}

impl Settings {
    pub const DFL_SAMPLE: u32 = 10;

    fn dfl_sample() -> u32 {
        Self::DFL_SAMPLE
    }

    fn dfl_trials() -> u32 {
        1
    }

    pub fn load_dir<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let path = config_dir.as_ref().join(SETTINGS_FILENAME);
        if let Err(e) = std::fs::metadata(&path) {
            return Err(XpError::io(&path, e).into());
        }
        let settings = Self::load(&path)
            .map_err(|e| XpError::config(format!("invalid settings {:?} ({:#})", &path, &e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(XpError::config("\"trials\" must be at least 1").into());
        }
        for (what, map) in [
            ("distance_ranking", &self.distance_ranking),
            ("servers_public", &self.servers_public),
            ("servers_private", &self.servers_private),
            ("clients", &self.clients),
        ] {
            for region in map.keys() {
                self.region_id(region)
                    .with_context(|| format!("Validating \"{}\"", what))?;
            }
        }
        Ok(())
    }

    /// Index of `region` in the declared region order.
    pub fn region_id(&self, region: &str) -> Result<usize> {
        match self.regions.iter().position(|r| r == region) {
            Some(id) => Ok(id),
            None => Err(XpError::config(format!(
                "region {:?} is not declared in \"regions\" {:?}",
                region, &self.regions
            ))
            .into()),
        }
    }

    pub fn region_list<'a>(
        &self,
        what: &str,
        map: &'a BTreeMap<String, Vec<String>>,
        region: &str,
    ) -> Result<&'a Vec<String>> {
        match map.get(region) {
            Some(v) => Ok(v),
            None => Err(XpError::config(format!(
                "\"{}\" has no entry for region {:?}",
                what, region
            ))
            .into()),
        }
    }

    pub fn experiment(&self, name: &str) -> Result<ExperimentSettings> {
        match self.experiments.get(name) {
            Some(v) => ExperimentSettings::parse(v)
                .with_context(|| format!("Parsing settings for experiment {:?}", name)),
            None => Err(XpError::config(format!("no settings for experiment {:?}", name)).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Config template path relative to the config dir.
    pub config: String,
    /// Container image of the system under test.
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentSettings {
    pub servers: Vec<ServerSpec>,
    pub workload: String,
    pub filters: Vec<FilterRule>,
    /// Everything else, parameter lists included.
    pub params: BTreeMap<String, Value>,
}

impl ExperimentSettings {
    pub fn parse(value: &Value) -> Result<Self> {
        let mut obj = match value.as_object() {
            Some(v) => v.clone(),
            None => {
                return Err(XpError::config("experiment settings must be an object").into())
            }
        };

        let servers = match obj.remove("servers") {
            Some(v) => serde_json::from_value::<Vec<ServerSpec>>(v)
                .map_err(|e| XpError::config(format!("invalid \"servers\" ({})", &e)))?,
            None => return Err(XpError::config("missing \"servers\"").into()),
        };
        let workload = match obj.remove("workload") {
            Some(Value::String(v)) => v,
            Some(v) => {
                return Err(XpError::config(format!("\"workload\" must be a string, got {}", v)).into())
            }
            None => return Err(XpError::config("missing \"workload\"").into()),
        };
        let filters = match obj.remove("filters") {
            Some(v) => FilterRule::parse_list(&v)?,
            None => vec![],
        };

        Ok(Self {
            servers,
            workload,
            filters,
            params: obj.into_iter().collect(),
        })
    }

    /// Candidate values of a declared parameter.
    pub fn param_values(&self, name: &str) -> Result<&Vec<Value>> {
        match self.params.get(name) {
            Some(Value::Array(list)) => Ok(list),
            Some(v) => Err(XpError::config(format!(
                "parameter {:?} must be a list of values, got {}",
                name, v
            ))
            .into()),
            None => Err(XpError::config(format!(
                "Missing required key in workload setting: {}",
                name
            ))
            .into()),
        }
    }
}

/// Render a parameter value the way it appears in tags, file names and
/// admin tool flags: strings unquoted, everything else as json.
pub fn format_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        v => v.to_string(),
    }
}

/// Parameter equality which treats `10000` and `10000.0` as the same.
pub fn param_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(xf), Some(yf)) if x.is_f64() || y.is_f64() => xf == yf,
            _ => x == y,
        },
        _ => a == b,
    }
}
