// Copyright (c) Facebook, Inc. and its affiliates.
//! Cartesian expansion of experiment parameters and tag computation.
use anyhow::Result;
use serde_json::Value;
use std::fmt;

use xp_bench_intf::{format_param, ExperimentSettings, XpError};

/// One concrete assignment of values to the declared parameters. Entries
/// keep declaration order; keys added by a filter `change` go last.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Combination {
    entries: Vec<(String, Value)>,
}

impl Combination {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Like `get()` but a missing key is a configuration error.
    pub fn require(&self, key: &str) -> Result<&Value> {
        self.get(key).ok_or_else(|| {
            XpError::config(format!("parameter {:?} missing from combination {}", key, self))
                .into()
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// New combination with `overrides` applied on top.
    pub fn with_overrides(&self, overrides: &[(String, Value)]) -> Self {
        let mut entries = self.entries.clone();
        for (key, val) in overrides.iter() {
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = val.clone(),
                None => entries.push((key.clone(), val.clone())),
            }
        }
        Self { entries }
    }

    /// `k=v,k=v` over `keys`, the format of the benchmark `--params` flag.
    pub fn format_params(&self, keys: &[String]) -> Result<String> {
        let mut pairs = vec![];
        for key in keys.iter() {
            pairs.push(format!("{}={}", key, format_param(self.require(key)?)));
        }
        Ok(pairs.join(","))
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (k, v)) in self.entries.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Ordered parameter names with their candidate values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSpace {
    params: Vec<(String, Vec<Value>)>,
}

impl ParameterSpace {
    pub fn new(params: Vec<(String, Vec<Value>)>) -> Self {
        Self { params }
    }

    /// Space over `names` taking the values from the experiment settings.
    /// Any name absent from the settings is a configuration error.
    pub fn from_settings(names: &[String], exp: &ExperimentSettings) -> Result<Self> {
        let mut params = vec![];
        for name in names.iter() {
            params.push((name.clone(), exp.param_values(name)?.clone()));
        }
        Ok(Self { params })
    }

    pub fn values(&self, name: &str) -> Option<&[Value]> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Number of combinations, the product of all list lengths.
    pub fn len(&self) -> usize {
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily walk the product; the last declared parameter varies fastest.
    /// Call again to restart.
    pub fn iter(&self) -> Combinations<'_> {
        Combinations {
            space: self,
            cursor: vec![0; self.params.len()],
            done: self.is_empty(),
        }
    }

    /// Parameters with more than one candidate value, in declaration order.
    pub fn varying_keys(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(_, v)| v.len() > 1)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Keys that go into tags: `overrides` if non-empty, otherwise the
    /// varying keys. Overrides must name declared parameters.
    pub fn tag_keys(&self, overrides: &[String]) -> Result<Vec<String>> {
        if overrides.is_empty() {
            return Ok(self.varying_keys());
        }
        for key in overrides.iter() {
            if self.values(key).is_none() {
                return Err(XpError::config(format!(
                    "tag key {:?} is not a parameter of this experiment",
                    key
                ))
                .into());
            }
        }
        Ok(overrides.to_vec())
    }
}

pub struct Combinations<'a> {
    space: &'a ParameterSpace,
    cursor: Vec<usize>,
    done: bool,
}

impl<'a> Iterator for Combinations<'a> {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        if self.done {
            return None;
        }

        let comb = Combination::new(
            self.space
                .params
                .iter()
                .zip(self.cursor.iter())
                .map(|((k, vals), idx)| (k.clone(), vals[*idx].clone()))
                .collect(),
        );

        // Odometer increment from the last parameter.
        self.done = true;
        for (pos, (_, vals)) in self.space.params.iter().enumerate().rev() {
            self.cursor[pos] += 1;
            if self.cursor[pos] < vals.len() {
                self.done = false;
                break;
            }
            self.cursor[pos] = 0;
        }

        Some(comb)
    }
}

/// `CONFIG[-KEYVALKEYVAL...][-TRIAL]`. The trial suffix is added only when
/// the experiment runs more than one trial.
///
/// Keys and values are concatenated without a delimiter, so parameter
/// names and values must be chosen such that tags stay unambiguous.
pub fn make_tag(
    config_name: &str,
    tag_keys: &[String],
    comb: &Combination,
    trial: Option<u32>,
) -> Result<String> {
    let mut tag = config_name.to_string();
    let mut suffix = String::new();
    for key in tag_keys.iter() {
        suffix += key;
        suffix += &format_param(comb.require(key)?);
    }
    if suffix.len() > 0 {
        tag += "-";
        tag += &suffix;
    }
    if let Some(trial) = trial {
        tag += &format!("-{}", trial);
    }
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::{make_tag, Combination, ParameterSpace};
    use serde_json::{json, Value};
    use xp_bench_intf::{xp_error, ExperimentSettings};

    fn space(params: &[(&str, Vec<Value>)]) -> ParameterSpace {
        ParameterSpace::new(
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_product_order_and_count() {
        let space = space(&[
            ("clients", vec![json!(100), json!(200)]),
            ("txns", vec![json!(0)]),
            ("hot", vec![json!(1), json!(2), json!(3)]),
        ]);
        assert_eq!(space.len(), 6);

        let combs: Vec<Combination> = space.iter().collect();
        assert_eq!(combs.len(), 6);
        let pairs: Vec<(Value, Value)> = combs
            .iter()
            .map(|c| (c.get("clients").unwrap().clone(), c.get("hot").unwrap().clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (json!(100), json!(1)),
                (json!(100), json!(2)),
                (json!(100), json!(3)),
                (json!(200), json!(1)),
                (json!(200), json!(2)),
                (json!(200), json!(3)),
            ]
        );
        for comb in combs.iter() {
            assert_eq!(comb.keys().collect::<Vec<_>>(), vec!["clients", "txns", "hot"]);
        }

        // restartable
        assert_eq!(space.iter().count(), 6);
        assert_eq!(space.iter().next(), combs.first().cloned());
    }

    #[test]
    fn test_empty_lists() {
        let empty = space(&[("clients", vec![json!(1)]), ("hot", vec![])]);
        assert_eq!(empty.len(), 0);
        assert_eq!(empty.iter().count(), 0);

        // No parameters at all is a single empty combination.
        let none = space(&[]);
        assert_eq!(none.len(), 1);
        assert_eq!(none.iter().collect::<Vec<_>>(), vec![Combination::default()]);
    }

    #[test]
    fn test_product_sizes() {
        for lens in &[vec![1], vec![2, 3], vec![3, 1, 4], vec![2, 2, 2, 2], vec![5, 1, 1, 2]] {
            let params: Vec<(String, Vec<Value>)> = lens
                .iter()
                .enumerate()
                .map(|(i, n)| (format!("p{}", i), (0..*n).map(|v| json!(v)).collect()))
                .collect();
            let space = ParameterSpace::new(params);
            let combs: Vec<Combination> = space.iter().collect();
            assert_eq!(combs.len(), lens.iter().product::<usize>());
            for (i, a) in combs.iter().enumerate() {
                assert_eq!(a.len(), lens.len());
                for b in combs[i + 1..].iter() {
                    assert_ne!(a, b);
                }
            }
        }
    }

    #[test]
    fn test_from_settings_missing_key() {
        let exp = ExperimentSettings::parse(&json!({
            "servers": [],
            "workload": "basic",
            "clients": [1],
        }))
        .unwrap();
        let names = vec!["clients".to_string(), "hot".to_string()];
        let e = ParameterSpace::from_settings(&names, &exp).unwrap_err();
        assert!(xp_error(&e).unwrap().is_configuration());
    }

    #[test]
    fn test_tags() {
        let space = space(&[
            ("clients", vec![json!(100)]),
            ("hot", vec![json!(100), json!(200)]),
        ]);
        let tag_keys = space.tag_keys(&[]).unwrap();
        assert_eq!(tag_keys, vec!["hot"]);

        let tags: Vec<String> = space
            .iter()
            .map(|c| make_tag("cfgA", &tag_keys, &c, None).unwrap())
            .collect();
        assert_eq!(tags, vec!["cfgA-hot100", "cfgA-hot200"]);

        let comb = space.iter().next().unwrap();
        assert_eq!(
            make_tag("cfgA", &tag_keys, &comb, Some(2)).unwrap(),
            "cfgA-hot100-2"
        );
        assert_eq!(make_tag("cfgA", &[], &comb, None).unwrap(), "cfgA");

        let keys = vec!["clients".to_string(), "hot".to_string()];
        assert_eq!(space.tag_keys(&keys).unwrap(), keys);
        assert_eq!(
            make_tag("cfgA", &keys, &comb, None).unwrap(),
            "cfgA-clients100hot100"
        );
        // deterministic, and sensitive to every tag key
        assert_eq!(
            make_tag("cfgA", &keys, &comb, None).unwrap(),
            make_tag("cfgA", &keys, &comb.clone(), None).unwrap()
        );
        let changed = comb.with_overrides(&[("clients".into(), json!(101))]);
        assert_ne!(
            make_tag("cfgA", &keys, &comb, None).unwrap(),
            make_tag("cfgA", &keys, &changed, None).unwrap()
        );

        let e = space.tag_keys(&["mh".to_string()]).unwrap_err();
        assert!(xp_error(&e).unwrap().is_configuration());
    }

    #[test]
    fn test_combination_overrides_and_params() {
        let comb = Combination::new(vec![
            ("clients".into(), json!(200)),
            ("duration".into(), json!(10)),
        ]);
        let changed = comb.with_overrides(&[
            ("duration".into(), json!(20)),
            ("mode".into(), json!("fast")),
        ]);
        assert_eq!(comb.get("duration"), Some(&json!(10)));
        assert_eq!(changed.get("duration"), Some(&json!(20)));
        assert_eq!(
            changed.keys().collect::<Vec<_>>(),
            vec!["clients", "duration", "mode"]
        );
        assert_eq!(
            changed
                .format_params(&["mode".into(), "clients".into()])
                .unwrap(),
            "mode=fast,clients=200"
        );
        assert_eq!(changed.to_string(), "{clients: 200, duration: 20, mode: \"fast\"}");
        assert!(changed.format_params(&["hot".into()]).is_err());
    }
}
