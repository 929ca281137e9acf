// Copyright (c) Facebook, Inc. and its affiliates.
//! Firing generated network impairment scripts on the server machines.
use anyhow::Result;

#[cfg(not(feature = "ssm"))]
use xp_bench_intf::XpError;

/// Where the impairment scripts land on every server machine.
pub const SCRIPT_DIR: &'static str = "/home/ubuntu";

pub fn script_command(name: &str) -> String {
    format!("sudo {}/{}.sh", SCRIPT_DIR, name)
}

/// Runs a named script on every machine with the server role and returns
/// once all of them report completion.
pub trait ScriptRunner: Send + Sync {
    fn run_script(&self, name: &str) -> Result<()>;
}

#[cfg(feature = "ssm")]
mod ssm {
    use super::{script_command, ScriptRunner};
    use anyhow::{anyhow, Result};
    use aws_sdk_ssm::config::Region;
    use aws_sdk_ssm::types::Target;
    use log::{debug, info};
    use std::time::Duration;

    use xp_bench_intf::XpError;

    const DOCUMENT: &'static str = "AWS-RunShellScript";
    const PLUGIN: &'static str = "aws:RunShellScript";
    const POLL_INTV: Duration = Duration::from_secs(1);

    pub struct SsmScriptRunner {
        rt: tokio::runtime::Runtime,
        ssm: aws_sdk_ssm::Client,
    }

    impl SsmScriptRunner {
        pub fn new(region: &str) -> Result<Self> {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let aws_config = rt.block_on(
                aws_config::from_env()
                    .region(Region::new(region.to_string()))
                    .load(),
            );
            Ok(Self {
                rt,
                ssm: aws_sdk_ssm::Client::new(&aws_config),
            })
        }

        async fn wait_invocation(&self, command_id: &str, instance_id: &str) -> Result<()> {
            loop {
                let inv = self
                    .ssm
                    .get_command_invocation()
                    .command_id(command_id)
                    .instance_id(instance_id)
                    .plugin_name(PLUGIN)
                    .send()
                    .await
                    .map_err(|e| anyhow!(e))?;
                let status = inv.status().map(|s| s.as_str()).unwrap_or("Pending");
                match status {
                    "Success" => return Ok(()),
                    "Pending" | "InProgress" | "Delayed" => {
                        debug!("ssm: {} on {} is {}", command_id, instance_id, status);
                        tokio::time::sleep(POLL_INTV).await;
                    }
                    _ => {
                        return Err(XpError::remote(format!(
                            "command {} on {} finished with {}",
                            command_id, instance_id, status
                        ))
                        .into())
                    }
                }
            }
        }

        async fn run(&self, name: &str) -> Result<()> {
            let res = self
                .ssm
                .send_command()
                .targets(Target::builder().key("tag:role").values("server").build())
                .document_name(DOCUMENT)
                .parameters("commands", vec![script_command(name)])
                .send()
                .await
                .map_err(|e| anyhow!(e))?;
            let command_id = match res.command().and_then(|c| c.command_id()) {
                Some(v) => v.to_string(),
                None => return Err(XpError::remote("send_command returned no command id").into()),
            };

            // Invocations show up asynchronously.
            tokio::time::sleep(POLL_INTV).await;

            let invs = self
                .ssm
                .list_command_invocations()
                .command_id(&command_id)
                .send()
                .await
                .map_err(|e| anyhow!(e))?;
            let instances: Vec<String> = invs
                .command_invocations()
                .unwrap_or_default()
                .iter()
                .filter_map(|inv| inv.instance_id().map(|v| v.to_string()))
                .collect();

            for instance in instances.iter() {
                self.wait_invocation(&command_id, instance).await?;
                info!("netem: Executed {}.sh on {}", name, instance);
            }
            Ok(())
        }
    }

    impl ScriptRunner for SsmScriptRunner {
        fn run_script(&self, name: &str) -> Result<()> {
            self.rt.block_on(self.run(name)).map_err(|e| match e.downcast::<XpError>() {
                Ok(xpe) => xpe.into(),
                Err(e) => XpError::remote(format!("running {}.sh ({:#})", name, &e)).into(),
            })
        }
    }
}

#[cfg(feature = "ssm")]
pub use ssm::SsmScriptRunner;

/// Script runner for the servers in the cloud `region`.
#[cfg(feature = "ssm")]
pub fn script_runner(region: &str) -> Result<Box<dyn ScriptRunner>> {
    Ok(Box::new(SsmScriptRunner::new(region)?))
}

#[cfg(not(feature = "ssm"))]
pub fn script_runner(region: &str) -> Result<Box<dyn ScriptRunner>> {
    Err(XpError::config(format!(
        "can't run impairment scripts in {:?}, xp-bench was built without the \"ssm\" feature",
        region
    ))
    .into())
}
