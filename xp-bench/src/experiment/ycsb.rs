// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

pub const YCSB_PARAMS: [&'static str; 9] = [
    "writes",
    "records",
    "hot_records",
    "mp_parts",
    "mh_homes",
    "mh_zipf",
    "hot",
    "mp",
    "mh",
];

pub struct YcsbExperiment {
    name: &'static str,
    about: &'static str,
}

impl YcsbExperiment {
    pub fn new(name: &'static str, about: &'static str) -> Self {
        Self { name, about }
    }
}

impl Experiment for YcsbExperiment {
    fn desc(&self) -> ExperimentDesc {
        ExperimentDesc::new(self.name, self.about).workload_params(&YCSB_PARAMS)
    }
}
