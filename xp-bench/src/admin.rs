// Copyright (c) Facebook, Inc. and its affiliates.
//! Typed invocations of the external admin tool and the sinks executing
//! them.
use anyhow::Result;
use log::debug;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use xp_util::*;

use xp_bench_intf::XpError;

/// Workload generator threads per benchmark client.
pub const GENERATORS: u32 = 2;

/// Deployment an admin command operates on.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub config: PathBuf,
    pub user: String,
    pub image: String,
}

impl Target {
    fn config_arg(&self) -> String {
        self.config.to_string_lossy().to_string()
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            self.config_arg(),
            "--user".into(),
            self.user.clone(),
            "--image".into(),
            self.image.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkCmd {
    pub workload: String,
    pub clients: String,
    pub txns: String,
    pub duration: String,
    pub startup_spacing: String,
    pub sample: u32,
    pub seed: u64,
    /// `k=v,k=v` over the workload parameters.
    pub params: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminCmd {
    Cleanup(Target),
    Start(Target),
    WaitReady(Target),
    Benchmark(Target, BenchmarkCmd),
    CollectClient {
        target: Target,
        tag: String,
        out_dir: PathBuf,
    },
    CollectServer {
        target: Target,
        tag: String,
        out_dir: PathBuf,
    },
    GenNetem {
        config: PathBuf,
        user: String,
        delay_path: PathBuf,
        out: String,
        jitter: Option<f64>,
    },
}

impl AdminCmd {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cleanup(_) => "cleanup",
            Self::Start(_) => "start",
            Self::WaitReady(_) => "wait-ready",
            Self::Benchmark(..) => "benchmark",
            Self::CollectClient { .. } => "collect-client",
            Self::CollectServer { .. } => "collect-server",
            Self::GenNetem { .. } => "gen-netem",
        }
    }

    /// Arguments of the admin tool, subcommand first.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![];
        match self {
            Self::Cleanup(target) => {
                args.push("benchmark".into());
                args.extend(target.common_args());
                for arg in &["--cleanup", "--clients", "0", "--txns", "0"] {
                    args.push(arg.to_string());
                }
            }
            Self::Start(target) => {
                args.push("start".into());
                args.extend(target.common_args());
            }
            Self::WaitReady(target) => {
                args.push("collect_server".into());
                args.extend(target.common_args());
                args.push("--flush-only".into());
                args.push("--no-pull".into());
            }
            Self::Benchmark(target, bench) => {
                args.push("benchmark".into());
                args.extend(target.common_args());
                for (flag, val) in [
                    ("--workload", bench.workload.clone()),
                    ("--clients", bench.clients.clone()),
                    ("--generators", GENERATORS.to_string()),
                    ("--txns", bench.txns.clone()),
                    ("--duration", bench.duration.clone()),
                    ("--startup-spacing", bench.startup_spacing.clone()),
                    ("--sample", bench.sample.to_string()),
                    ("--seed", bench.seed.to_string()),
                    ("--params", bench.params.clone()),
                    ("--tag", bench.tag.clone()),
                ] {
                    args.push(flag.into());
                    args.push(val);
                }
                // The image was pulled by the start step.
                args.push("--no-pull".into());
            }
            Self::CollectClient {
                target,
                tag,
                out_dir,
            } => {
                args.push("collect_client".into());
                args.push(target.config_arg());
                args.push(tag.clone());
                args.push("--user".into());
                args.push(target.user.clone());
                args.push("--out-dir".into());
                args.push(out_dir.to_string_lossy().to_string());
            }
            Self::CollectServer {
                target,
                tag,
                out_dir,
            } => {
                args.push("collect_server".into());
                args.push(target.config_arg());
                args.push("--tag".into());
                args.push(tag.clone());
                args.push("--user".into());
                args.push(target.user.clone());
                args.push("--image".into());
                args.push(target.image.clone());
                args.push("--out-dir".into());
                args.push(out_dir.to_string_lossy().to_string());
                args.push("--no-pull".into());
            }
            Self::GenNetem {
                config,
                user,
                delay_path,
                out,
                jitter,
            } => {
                args.push("gen_netem".into());
                args.push(config.to_string_lossy().to_string());
                args.push(delay_path.to_string_lossy().to_string());
                args.push("--user".into());
                args.push(user.clone());
                args.push("--out".into());
                args.push(out.clone());
                if let Some(jitter) = jitter {
                    args.push("--jitter".into());
                    args.push(jitter.to_string());
                }
            }
        }
        args
    }
}

impl fmt::Display for AdminCmd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_args().join(" "))
    }
}

/// Where lifecycle commands go. Each call blocks until the command
/// finishes and fails if it did.
pub trait CommandSink: Send + Sync {
    fn execute(&self, cmd: &AdminCmd) -> Result<()>;
}

/// Runs the admin tool as a child process.
pub struct AdminSink {
    bin: PathBuf,
    base_args: Vec<String>,
}

impl AdminSink {
    /// `cmdline` is split on whitespace, e.g. `python3 tools/admin.py`.
    pub fn new(cmdline: &str) -> Result<Self> {
        let mut toks = cmdline.split_whitespace();
        let prog = match toks.next() {
            Some(v) => v,
            None => return Err(XpError::config("empty admin tool command").into()),
        };
        let bin = match find_bin(prog, exe_dir().ok()) {
            Some(v) => v,
            None => {
                return Err(
                    XpError::config(format!("can't find admin tool {:?}", prog)).into(),
                )
            }
        };
        Ok(Self {
            bin,
            base_args: toks.map(|s| s.to_string()).collect(),
        })
    }

    fn command(&self, cmd: &AdminCmd) -> Command {
        let mut command = Command::new(&self.bin);
        command.args(&self.base_args).args(cmd.to_args());
        command
    }
}

impl CommandSink for AdminSink {
    fn execute(&self, cmd: &AdminCmd) -> Result<()> {
        let mut command = self.command(cmd);
        debug!("admin: {}", format_command(&command));
        run_command(&mut command, &format!("{} failed", cmd.name()))
            .map_err(|e| XpError::remote(format!("{:#}", &e)).into())
    }
}

/// Prints commands instead of running them.
pub struct DryRunSink;

impl CommandSink for DryRunSink {
    fn execute(&self, cmd: &AdminCmd) -> Result<()> {
        println!("\t{}", cmd);
        Ok(())
    }
}

#[cfg(test)]
pub mod test_sink {
    use super::{AdminCmd, CommandSink};
    use anyhow::Result;
    use std::sync::Mutex;
    use xp_bench_intf::XpError;

    /// Records every command, failing the ones named in `fail_on`.
    #[derive(Default)]
    pub struct RecordingSink {
        pub cmds: Mutex<Vec<AdminCmd>>,
        pub fail_on: Option<&'static str>,
    }

    impl RecordingSink {
        pub fn failing_on(name: &'static str) -> Self {
            Self {
                cmds: Mutex::new(vec![]),
                fail_on: Some(name),
            }
        }

        pub fn names(&self) -> Vec<&'static str> {
            self.cmds.lock().unwrap().iter().map(|c| c.name()).collect()
        }

        pub fn cmds(&self) -> Vec<AdminCmd> {
            self.cmds.lock().unwrap().clone()
        }
    }

    impl CommandSink for RecordingSink {
        fn execute(&self, cmd: &AdminCmd) -> Result<()> {
            self.cmds.lock().unwrap().push(cmd.clone());
            if self.fail_on == Some(cmd.name()) {
                return Err(XpError::remote(format!("{} failed", cmd.name())).into());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_sink::RecordingSink;
    use super::{AdminCmd, AdminSink, BenchmarkCmd, CommandSink, Target};
    use std::path::PathBuf;
    use xp_bench_intf::xp_error;

    fn target() -> Target {
        Target {
            config: PathBuf::from("/tmp/cfgA.conf"),
            user: "bench".into(),
            image: "slog:latest".into(),
        }
    }

    #[test]
    fn test_lifecycle_args() {
        let _ = ::env_logger::try_init();
        assert_eq!(
            AdminCmd::Cleanup(target()).to_string(),
            "benchmark /tmp/cfgA.conf --user bench --image slog:latest --cleanup --clients 0 --txns 0"
        );
        assert_eq!(
            AdminCmd::Start(target()).to_string(),
            "start /tmp/cfgA.conf --user bench --image slog:latest"
        );
        assert_eq!(
            AdminCmd::WaitReady(target()).to_string(),
            "collect_server /tmp/cfgA.conf --user bench --image slog:latest --flush-only --no-pull"
        );
    }

    #[test]
    fn test_benchmark_and_collect_args() {
        let bench = BenchmarkCmd {
            workload: "basic".into(),
            clients: "100".into(),
            txns: "0".into(),
            duration: "30".into(),
            startup_spacing: "0".into(),
            sample: 10,
            seed: 3,
            params: "hot=100,mh=50".into(),
            tag: "cfgA-hot100".into(),
        };
        assert_eq!(
            AdminCmd::Benchmark(target(), bench).to_args(),
            vec![
                "benchmark", "/tmp/cfgA.conf", "--user", "bench", "--image", "slog:latest",
                "--workload", "basic", "--clients", "100", "--generators", "2", "--txns", "0",
                "--duration", "30", "--startup-spacing", "0", "--sample", "10", "--seed", "3",
                "--params", "hot=100,mh=50", "--tag", "cfgA-hot100", "--no-pull",
            ]
        );

        let cmd = AdminCmd::CollectClient {
            target: target(),
            tag: "cfgA-hot100".into(),
            out_dir: PathBuf::from("out/ycsb"),
        };
        assert_eq!(
            cmd.to_string(),
            "collect_client /tmp/cfgA.conf cfgA-hot100 --user bench --out-dir out/ycsb"
        );
        let cmd = AdminCmd::CollectServer {
            target: target(),
            tag: "cfgA-hot100".into(),
            out_dir: PathBuf::from("out/ycsb"),
        };
        assert_eq!(
            cmd.to_string(),
            "collect_server /tmp/cfgA.conf --tag cfgA-hot100 --user bench --image slog:latest --out-dir out/ycsb --no-pull"
        );
    }

    #[test]
    fn test_gen_netem_args() {
        let cmd = AdminCmd::GenNetem {
            config: PathBuf::from("/tmp/cfgA.conf"),
            user: "bench".into(),
            delay_path: PathBuf::from("/tmp/netem_jitter.csv"),
            out: "netem_jitter_10.sh".into(),
            jitter: Some(5.0),
        };
        assert_eq!(
            cmd.to_string(),
            "gen_netem /tmp/cfgA.conf /tmp/netem_jitter.csv --user bench --out netem_jitter_10.sh --jitter 5"
        );
    }

    #[test]
    fn test_admin_sink() {
        let _ = ::env_logger::try_init();
        // `true`/`false` ignore their arguments.
        let sink = AdminSink::new("true").unwrap();
        assert!(sink.execute(&AdminCmd::Start(target())).is_ok());

        let sink = AdminSink::new("false --verbose").unwrap();
        let e = sink.execute(&AdminCmd::Start(target())).unwrap_err();
        assert!(xp_error(&e).unwrap().is_remote_command());

        let e = AdminSink::new("").err().unwrap();
        assert!(xp_error(&e).unwrap().is_configuration());
        assert!(AdminSink::new("no-such-admin-tool-xyzzy").is_err());
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::failing_on("start");
        assert!(sink.execute(&AdminCmd::Cleanup(target())).is_ok());
        assert!(sink.execute(&AdminCmd::Start(target())).is_err());
        assert_eq!(sink.names(), vec!["cleanup", "start"]);
    }
}
