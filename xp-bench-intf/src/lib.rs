// Copyright (c) Facebook, Inc. and its affiliates.
use xp_util::*;

pub mod args;
pub mod error;
pub mod filter;
pub mod settings;

pub use args::{set_experiment_list, Args, Mode};
pub use error::{xp_error, XpError};
pub use filter::{Condition, FilterAction, FilterRule, NEGATION_MARKER};
pub use settings::{
    format_param, param_eq, ExperimentSettings, ServerSpec, Settings, SETTINGS_FILENAME,
};

lazy_static::lazy_static! {
    pub static ref VERSION: &'static str = env!("CARGO_PKG_VERSION");
    pub static ref FULL_VERSION: String = full_version(*VERSION);
}
