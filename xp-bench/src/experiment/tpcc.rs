// Copyright (c) Facebook, Inc. and its affiliates.
use super::*;

pub struct TpccExperiment {}

impl Experiment for TpccExperiment {
    fn desc(&self) -> ExperimentDesc {
        ExperimentDesc::new("tpcc", "TPC-C workload").workload_params(&["mh_zipf", "sh_only"])
    }
}
