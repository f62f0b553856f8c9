//! Built-in flows exercised by `radar demo`.

use async_trait::async_trait;
use radarcore::{FlowError, Value};
use radarruntime::{Arg, Flow, FlowContext, Task};
use std::sync::Arc;

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

/// Returns the letter at the given position of the alphabet.
pub struct GetLetter;

#[async_trait]
impl Task for GetLetter {
    fn name(&self) -> &str {
        "get_letter"
    }

    async fn run(&self, args: Vec<Value>) -> Result<Value, FlowError> {
        let position = args
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| FlowError::msg("get_letter expects a position"))?;
        ALPHABET
            .chars()
            .nth(position.rem_euclid(26) as usize)
            .map(Value::from)
            .ok_or_else(|| FlowError::msg(format!("no letter at {}", position)))
    }
}

/// Counts the entries of an array argument.
pub struct CountLetters;

#[async_trait]
impl Task for CountLetters {
    fn name(&self) -> &str {
        "count_letters"
    }

    async fn run(&self, args: Vec<Value>) -> Result<Value, FlowError> {
        let letters = args
            .first()
            .and_then(Value::as_array)
            .ok_or_else(|| FlowError::msg("count_letters expects a list"))?;
        Ok(Value::from(letters.len()))
    }
}

/// Fetches `count` letters, one independent task each.
pub struct LetterFlow {
    pub count: usize,
}

#[async_trait]
impl Flow for LetterFlow {
    fn name(&self) -> &str {
        "letters"
    }

    async fn run(&self, ctx: FlowContext, _args: Vec<Value>) -> Result<Value, FlowError> {
        let get_letter: Arc<dyn Task> = Arc::new(GetLetter);
        let mut letters = Vec::with_capacity(self.count);
        for i in 0..self.count {
            let iteration = ctx.scope();
            let letter = iteration.run_task(get_letter.clone(), vec![Arg::from(i)]).await?;
            letters.push(letter.resolve(&iteration).await?);
        }
        Ok(Value::Array(letters))
    }
}

/// Counts the letters produced by a `letters` subflow.
pub struct NestedFlow {
    pub count: usize,
}

#[async_trait]
impl Flow for NestedFlow {
    fn name(&self) -> &str {
        "nested"
    }

    async fn run(&self, ctx: FlowContext, _args: Vec<Value>) -> Result<Value, FlowError> {
        let letters = ctx
            .run_flow(Arc::new(LetterFlow { count: self.count }), vec![])
            .await?;
        let total = ctx
            .run_task(Arc::new(CountLetters), vec![Arg::from(letters)])
            .await?;
        total.resolve(&ctx).await
    }
}

/// One task fails and is ignored, a second fails and is resolved.
pub struct FailureFlow;

#[async_trait]
impl Flow for FailureFlow {
    fn name(&self) -> &str {
        "failure"
    }

    async fn run(&self, ctx: FlowContext, _args: Vec<Value>) -> Result<Value, FlowError> {
        let fail = |label: &'static str| {
            move |_: Vec<Value>| async move {
                Err::<Value, _>(FlowError::msg(format!("{} exploded", label)))
            }
        };
        let _ignored = ctx.submit_task("ignored", vec![], fail("ignored")).await?;
        let checked = ctx.submit_task("checked", vec![], fail("checked")).await?;
        checked.resolve(&ctx).await
    }
}

pub fn by_name(name: &str, count: usize) -> Option<Arc<dyn Flow>> {
    match name {
        "letters" => Some(Arc::new(LetterFlow { count })),
        "nested" => Some(Arc::new(NestedFlow { count })),
        "failure" => Some(Arc::new(FailureFlow)),
        _ => None,
    }
}

pub const NAMES: &[&str] = &["letters", "nested", "failure"];
