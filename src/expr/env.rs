//! `${NAME}` placeholder expansion.
//!
//! Values are read from the environment at expansion time, so rotating a
//! secret takes effect without a reload.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

/// Where placeholder values come from.
pub trait EnvSource: Send + Sync + fmt::Debug {
    fn get(&self, name: &str) -> Option<String>;
}

/// The process environment, read on every lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed set of variables.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// What an unset variable expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingVarPolicy {
    /// Replace with the empty string.
    #[default]
    Empty,
    /// Leave the `${NAME}` token in place.
    Keep,
}

/// Expands `${NAME}` tokens against an [`EnvSource`].
#[derive(Debug, Clone)]
pub struct EnvExpander {
    source: Arc<dyn EnvSource>,
    policy: MissingVarPolicy,
}

impl Default for EnvExpander {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }
}

impl EnvExpander {
    pub fn new(source: Arc<dyn EnvSource>) -> Self {
        Self {
            source,
            policy: MissingVarPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MissingVarPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The policy applied to unset variables.
    pub fn policy(&self) -> MissingVarPolicy {
        self.policy
    }

    /// Replace every well-formed `${NAME}` token.
    pub fn expand(&self, input: &str) -> String {
        if !input.contains("${") {
            return input.to_string();
        }
        PLACEHOLDER
            .replace_all(input, |caps: &Captures<'_>| match self.source.get(&caps[1]) {
                Some(value) => value,
                None => match self.policy {
                    MissingVarPolicy::Empty => String::new(),
                    MissingVarPolicy::Keep => caps[0].to_string(),
                },
            })
            .into_owned()
    }

    /// Names referenced by `input`, in order of appearance.
    pub fn referenced(input: &str) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(input)
            .map(|c| c[1].to_string())
            .collect()
    }
}
