// Copyright (c) Facebook, Inc. and its affiliates.
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;

pub struct RunProgress {
    bar: ProgressBar,
    attended: bool,
    total: usize,
    done: usize,
}

impl RunProgress {
    pub fn new(name: &str, total: usize) -> Self {
        let attended = console::user_attended_stderr();
        let target = match attended {
            true => ProgressDrawTarget::stderr(),
            false => ProgressDrawTarget::hidden(),
        };
        let bar = ProgressBar::with_draw_target(Some(total as u64), target);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {prefix} {pos}/{len} {msg}",
        ) {
            bar.set_style(style);
        }
        bar.set_prefix(name.to_string());
        bar.tick();
        Self {
            bar,
            attended,
            total,
            done: 0,
        }
    }

    pub fn set_status(&mut self, config_name: &str, tag: &str) {
        let status = format!("[{}] {}", config_name, tag);
        if self.attended {
            self.bar.set_message(status);
        } else {
            info!("progress: {}/{} {}", self.done + 1, self.total, status);
        }
    }

    pub fn inc(&mut self) {
        self.done += 1;
        self.bar.inc(1);
    }

    pub fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
