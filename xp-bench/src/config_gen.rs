// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{Context, Result};
use log::debug;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use xp_util::*;

use xp_bench_intf::{Settings, XpError};

/// Materialize a server configuration: load `template`, append one
/// replica per declared region and write the result to `artifact_dir`
/// under the template's file name.
///
/// The template is otherwise an opaque bag of fields. Only `replicas` and
/// `num_partitions` are touched; `num_partitions` follows the number of
/// server addresses in the last region.
pub fn generate_config(settings: &Settings, template: &Path, artifact_dir: &Path) -> Result<PathBuf> {
    let mut file = match JsonRawFile::load(template) {
        Ok(v) => v,
        Err(e) => match e.downcast::<std::io::Error>() {
            Ok(ioe) => return Err(XpError::io(template, ioe).into()),
            Err(e) => {
                return Err(e).with_context(|| format!("Loading config template {:?}", template))
            }
        },
    };

    let replicas = replicas(settings)?;
    let num_partitions = replicas.last().and_then(|r| r["addresses"].as_array().map(|a| a.len()));

    let config = match file.value.as_object_mut() {
        Some(v) => v,
        None => {
            return Err(XpError::config(format!(
                "config template {:?} is not an object",
                template
            ))
            .into())
        }
    };
    match config.entry("replicas").or_insert_with(|| json!([])) {
        Value::Array(list) => list.extend(replicas),
        v => {
            return Err(XpError::config(format!(
                "\"replicas\" in {:?} must be a list, got {}",
                template, v
            ))
            .into())
        }
    }
    if let Some(nr) = num_partitions {
        config.insert("num_partitions".into(), json!(nr));
    }

    let file_name = match template.file_name() {
        Some(v) => v,
        None => {
            return Err(XpError::config(format!("invalid config template path {:?}", template)).into())
        }
    };
    std::fs::create_dir_all(artifact_dir).map_err(|e| XpError::io(artifact_dir, e))?;
    file.path = artifact_dir.join(file_name);
    file.save()
        .map_err(|e| match e.downcast::<std::io::Error>() {
            Ok(ioe) => XpError::io(&file.path, ioe).into(),
            Err(e) => e,
        })?;

    debug!("config: generated {:?} from {:?}", &file.path, template);
    Ok(file.path)
}

fn replicas(settings: &Settings) -> Result<Vec<Value>> {
    let mut replicas = vec![];
    for region in settings.regions.iter() {
        let addresses = settings.region_list("servers_private", &settings.servers_private, region)?;
        let public = settings.region_list("servers_public", &settings.servers_public, region)?;
        let clients = settings.region_list("clients", &settings.clients, region)?;
        let ranking = settings
            .region_list("distance_ranking", &settings.distance_ranking, region)?
            .iter()
            .map(|other| settings.region_id(other).map(|id| id.to_string()))
            .collect::<Result<Vec<String>>>()
            .with_context(|| format!("Building distance ranking of {:?}", region))?;

        replicas.push(json!({
            "addresses": addresses,
            "public_addresses": public,
            "client_addresses": clients,
            "distance_ranking": ranking.join(","),
        }));
    }
    Ok(replicas)
}

#[cfg(test)]
mod tests {
    use super::generate_config;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::fs;
    use xp_bench_intf::{xp_error, Settings};
    use xp_util::JsonRawFile;

    /// Region to comma separated list.
    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.split(',').map(|s| s.to_string()).collect()))
            .collect()
    }

    fn settings() -> Settings {
        Settings {
            username: "bench".into(),
            regions: vec!["us-east".into(), "us-west".into()],
            distance_ranking: map(&[("us-east", "us-west"), ("us-west", "us-east")]),
            servers_public: map(&[("us-east", "1.1.1.1"), ("us-west", "2.2.2.2")]),
            servers_private: map(&[
                ("us-east", "10.0.0.1,10.0.0.2"),
                ("us-west", "10.0.1.1,10.0.1.2"),
            ]),
            clients: map(&[("us-east", "10.0.0.9"), ("us-west", "10.0.1.9")]),
            ..Default::default()
        }
    }

    #[test]
    fn test_generate_config() {
        let _ = ::env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("cfgA.conf");
        fs::write(
            &template,
            "// cfgA\n{\"protocol\": \"tcp\", \"broker_ports\": [2021], \"replicas\": []}\n",
        )
        .unwrap();
        let artifacts = dir.path().join("artifacts");

        let path = generate_config(&settings(), &template, &artifacts).unwrap();
        assert_eq!(path, artifacts.join("cfgA.conf"));

        let config = JsonRawFile::load(&path).unwrap();
        assert_eq!(config.preamble, "// cfgA\n");
        assert_eq!(config.value["protocol"], json!("tcp"));
        assert_eq!(config.value["num_partitions"], json!(2));
        assert_eq!(
            config.value["replicas"],
            json!([
                {
                    "addresses": ["10.0.0.1", "10.0.0.2"],
                    "public_addresses": ["1.1.1.1"],
                    "client_addresses": ["10.0.0.9"],
                    "distance_ranking": "1",
                },
                {
                    "addresses": ["10.0.1.1", "10.0.1.2"],
                    "public_addresses": ["2.2.2.2"],
                    "client_addresses": ["10.0.1.9"],
                    "distance_ranking": "0",
                },
            ])
        );

        // the template is left alone
        let orig = JsonRawFile::load(&template).unwrap();
        assert_eq!(orig.value["replicas"], json!([]));
    }

    #[test]
    fn test_generate_config_errors() {
        let _ = ::env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let artifacts = dir.path().join("artifacts");

        let e = generate_config(&settings(), &dir.path().join("missing.conf"), &artifacts)
            .unwrap_err();
        assert!(xp_error(&e).unwrap().is_io());

        let template = dir.path().join("cfgA.conf");
        fs::write(&template, "{}").unwrap();

        let mut bad = settings();
        bad.distance_ranking = map(&[("us-east", "eu-central"), ("us-west", "us-east")]);
        let e = generate_config(&bad, &template, &artifacts).unwrap_err();
        assert!(xp_error(&e).unwrap().is_configuration());

        let mut bad = settings();
        bad.clients.remove("us-west");
        let e = generate_config(&bad, &template, &artifacts).unwrap_err();
        assert!(xp_error(&e).unwrap().is_configuration());

        fs::write(&template, "{\"replicas\": 3}").unwrap();
        let e = generate_config(&settings(), &template, &artifacts).unwrap_err();
        assert!(xp_error(&e).unwrap().is_configuration());
    }
}
