// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

pub struct CockroachExperiment {
    name: &'static str,
    about: &'static str,
}

impl CockroachExperiment {
    pub fn new(name: &'static str, about: &'static str) -> Self {
        Self { name, about }
    }
}

impl Experiment for CockroachExperiment {
    fn desc(&self) -> ExperimentDesc {
        ExperimentDesc::new(self.name, self.about).workload_params(&["records", "hot", "mh"])
    }
}
