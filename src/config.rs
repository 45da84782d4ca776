use std::{net::SocketAddr, str::FromStr};

use anyhow::{anyhow, Context};

use crate::hub::{HistoryRetention, HubPolicy, JoinNotice};

pub const ADDR: &str = "CALLHUB_ADDR";
pub const JOIN_NOTICE: &str = "CALLHUB_JOIN_NOTICE";
pub const HISTORY: &str = "CALLHUB_HISTORY";

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub policy: HubPolicy,
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
        where
            T: FromStr,
            T::Err: Into<anyhow::Error>,
        {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(Into::<anyhow::Error>::into)
                    .with_context(|| format!("invalid {key}={raw:?}")),
                None => Ok(default),
            }
        }

        let defaults = HubPolicy::default();
        let addr = parse(&lookup, ADDR, SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        Ok(Config {
            addr,
            policy: HubPolicy {
                join_notice: parse(&lookup, JOIN_NOTICE, defaults.join_notice)?,
                history_retention: parse(&lookup, HISTORY, defaults.history_retention)?,
            },
        })
    }
}

impl FromStr for JoinNotice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "everyone" => Ok(JoinNotice::Everyone),
            "existing-only" => Ok(JoinNotice::ExistingOnly),
            _ => Err(anyhow!("expected everyone or existing-only")),
        }
    }
}

impl FromStr for HistoryRetention {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discard-when-empty" => Ok(HistoryRetention::DiscardWhenEmpty),
            "keep" => Ok(HistoryRetention::Keep),
            _ => Err(anyhow!("expected discard-when-empty or keep")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.policy.join_notice, JoinNotice::Everyone);
        assert_eq!(config.policy.history_retention, HistoryRetention::DiscardWhenEmpty);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            (ADDR, "127.0.0.1:9000"),
            (JOIN_NOTICE, " existing-only "),
            (HISTORY, "keep"),
        ]).unwrap();
        assert_eq!(config.addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.policy.join_notice, JoinNotice::ExistingOnly);
        assert_eq!(config.policy.history_retention, HistoryRetention::Keep);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = config(&[(JOIN_NOTICE, "nobody")]).unwrap_err();
        assert!(err.to_string().contains(JOIN_NOTICE));

        assert!(config(&[(HISTORY, "forever")]).is_err());
        assert!(config(&[(ADDR, "not an address")]).is_err());
    }
}
