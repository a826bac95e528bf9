//! Random secret resource
//!
//! Generates an alphanumeric value once and keeps it across runs. The value
//! is a [`Secret`], so it is encrypted in state and needs a password.

use anyhow::{Context as _, anyhow};
use declarative::{Context, HandlerResult, Lifecycle, Provider, Secret};
use serde::{Deserialize, Serialize};

const DEFAULT_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomSecretProps {
    /// Number of characters
    #[serde(default = "default_length")]
    pub length: usize,
}

fn default_length() -> usize {
    DEFAULT_LENGTH
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomSecretOutput {
    pub value: Secret,
}

pub struct RandomSecret;

impl Provider for RandomSecret {
    const KIND: &'static str = "random::Secret";
    type Props = RandomSecretProps;
    type Output = RandomSecretOutput;

    fn handle(
        &self,
        ctx: &mut Context<'_, RandomSecretOutput>,
        _id: &str,
        props: &RandomSecretProps,
    ) -> HandlerResult<RandomSecretOutput> {
        if ctx.phase() == Lifecycle::Delete {
            return ctx.destroy();
        }
        if props.length == 0 {
            return Err(anyhow!("length must be at least 1").into());
        }

        // Keep the value unless its length changed
        if let Some(prior) = ctx.output()
            && prior.value.expose().len() == props.length
        {
            return Ok(prior.clone());
        }

        let generated = Secret::generate(props.length).context("Failed to generate secret")?;
        let value = ctx
            .registry()
            .secret(generated.expose(), Some(ctx.fqn()));
        Ok(RandomSecretOutput { value })
    }
}
