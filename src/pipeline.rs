//! Step sequencer.
//!
//! A [`Pipeline`] is a fixed, ordered list of [`Step`]s run against a
//! per-invocation [`State`] bag. Each step reads fields written by the
//! caller or by earlier steps, does its work (usually one collaborator
//! call), and returns a [`StateUpdate`] that is merged into the running
//! state before the next step starts.
//!
//! ```text
//! initial ──▶ step 0 ──merge──▶ step 1 ──merge──▶ … ──▶ final state
//! ```
//!
//! There is no branching, skipping, or retrying: a step error aborts the
//! invocation and propagates to the caller with the pipeline and step
//! names attached.
//!
//! The context type `C` carries whatever the steps need (generator,
//! embedder, configuration). It is borrowed for the duration of one
//! invocation and never mutated by the sequencer.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::models::{Chunk, FileMap, RetrievedChunk, SourceDocument};

/// A value stored under one field of a [`State`].
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Files(FileMap),
    Documents(Vec<SourceDocument>),
    Chunks(Vec<Chunk>),
    Retrieved(Vec<RetrievedChunk>),
    Count(usize),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Files(_) => "files",
            Value::Documents(_) => "documents",
            Value::Chunks(_) => "chunks",
            Value::Retrieved(_) => "retrieved",
            Value::Count(_) => "count",
        }
    }
}

/// The mapping of fields threaded through a pipeline's steps.
///
/// Fields are only ever added or overwritten, never removed.
#[derive(Debug, Clone, Default)]
pub struct State {
    fields: BTreeMap<String, Value>,
}

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, key: &str) -> Result<&$ty> {
            match self.get(key)? {
                Value::$variant(v) => Ok(v),
                other => Err(anyhow!(
                    "state field '{}' holds {}, expected {}",
                    key,
                    other.kind(),
                    stringify!($name)
                )),
            }
        }
    };
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a text field.
    pub fn with_text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, Value::Text(value.into()));
        self
    }

    /// Builder-style insert of a file map field.
    pub fn with_files(mut self, key: &str, files: FileMap) -> Self {
        self.insert(key, Value::Files(files));
        self
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Look up a field, failing if an earlier step never wrote it.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.fields
            .get(key)
            .ok_or_else(|| anyhow!("state field '{}' is missing", key))
    }

    pub fn text(&self, key: &str) -> Result<&str> {
        match self.get(key)? {
            Value::Text(s) => Ok(s),
            other => Err(anyhow!(
                "state field '{}' holds {}, expected text",
                key,
                other.kind()
            )),
        }
    }

    typed_getter!(files, Files, FileMap);
    typed_getter!(documents, Documents, Vec<SourceDocument>);
    typed_getter!(chunks, Chunks, Vec<Chunk>);
    typed_getter!(retrieved, Retrieved, Vec<RetrievedChunk>);

    pub fn count(&self, key: &str) -> Result<usize> {
        match self.get(key)? {
            Value::Count(n) => Ok(*n),
            other => Err(anyhow!(
                "state field '{}' holds {}, expected count",
                key,
                other.kind()
            )),
        }
    }

    /// Merge an update in; later writes override earlier ones.
    pub fn merge(&mut self, update: StateUpdate) {
        self.fields.extend(update.fields);
    }

    /// Remove and return a text field from a finished state.
    pub fn take_text(&mut self, key: &str) -> Result<String> {
        match self.fields.remove(key) {
            Some(Value::Text(s)) => Ok(s),
            Some(other) => Err(anyhow!(
                "state field '{}' holds {}, expected text",
                key,
                other.kind()
            )),
            None => Err(anyhow!("state field '{}' is missing", key)),
        }
    }

    /// Remove and return a file map field from a finished state.
    pub fn take_files(&mut self, key: &str) -> Result<FileMap> {
        match self.fields.remove(key) {
            Some(Value::Files(f)) => Ok(f),
            Some(other) => Err(anyhow!(
                "state field '{}' holds {}, expected files",
                key,
                other.kind()
            )),
            None => Err(anyhow!("state field '{}' is missing", key)),
        }
    }
}

/// The fields a single step writes back.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    fields: BTreeMap<String, Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn text(self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, Value::Text(value.into()))
    }

    pub fn files(self, key: &str, files: FileMap) -> Self {
        self.set(key, Value::Files(files))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// One unit of work within a pipeline.
#[async_trait]
pub trait Step<C: ?Sized + Sync>: Send + Sync {
    /// Stable step name, used in logs and error context.
    fn name(&self) -> &'static str;

    /// Read from `state`, call collaborators through `ctx`, and return the
    /// fields to write.
    async fn run(&self, state: &State, ctx: &C) -> Result<StateUpdate>;
}

/// A named, fixed, straight-line sequence of steps.
pub struct Pipeline<C: ?Sized + Sync> {
    name: &'static str,
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C: ?Sized + Sync> Pipeline<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Append a step to the end of the sequence.
    pub fn then(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order against `initial` and return the final state.
    pub async fn invoke(&self, initial: State, ctx: &C) -> Result<State> {
        let mut state = initial;
        let started = Instant::now();

        for step in &self.steps {
            let step_started = Instant::now();
            let update = step
                .run(&state, ctx)
                .await
                .with_context(|| format!("pipeline '{}' failed at step '{}'", self.name, step.name()))?;

            let written: Vec<&str> = update.keys().collect();
            tracing::debug!(
                pipeline = self.name,
                step = step.name(),
                elapsed_ms = step_started.elapsed().as_millis() as u64,
                fields = ?written,
                "step complete"
            );

            state.merge(update);
        }

        tracing::info!(
            pipeline = self.name,
            steps = self.steps.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline complete"
        );

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Writes a fixed set of fields and records its execution order.
    struct Writer {
        name: &'static str,
        writes: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl Step<Mutex<Vec<&'static str>>> for Writer {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _state: &State, log: &Mutex<Vec<&'static str>>) -> Result<StateUpdate> {
            log.lock().unwrap().push(self.name);
            let mut update = StateUpdate::new();
            for (k, v) in &self.writes {
                update = update.text(k, *v);
            }
            Ok(update)
        }
    }

    /// Reads `from`, uppercases it, writes `to`.
    struct Upper {
        from: &'static str,
        to: &'static str,
    }

    #[async_trait]
    impl Step<()> for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        async fn run(&self, state: &State, _ctx: &()) -> Result<StateUpdate> {
            let value = state.text(self.from)?.to_uppercase();
            Ok(StateUpdate::new().text(self.to, value))
        }
    }

    struct Fail;

    #[async_trait]
    impl Step<()> for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        async fn run(&self, _state: &State, _ctx: &()) -> Result<StateUpdate> {
            anyhow::bail!("collaborator unavailable")
        }
    }

    #[tokio::test]
    async fn test_union_of_fields_with_later_writes_winning() {
        let pipeline = Pipeline::new("writers")
            .then(Writer {
                name: "first",
                writes: vec![("a", "1"), ("shared", "first")],
            })
            .then(Writer {
                name: "second",
                writes: vec![("b", "2"), ("shared", "second")],
            });

        let log = Mutex::new(Vec::new());
        let state = pipeline
            .invoke(State::new().with_text("seed", "s"), &log)
            .await
            .unwrap();

        assert_eq!(state.text("seed").unwrap(), "s");
        assert_eq!(state.text("a").unwrap(), "1");
        assert_eq!(state.text("b").unwrap(), "2");
        assert_eq!(state.text("shared").unwrap(), "second");
        assert_eq!(state.len(), 4);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_steps_see_earlier_writes() {
        let pipeline = Pipeline::new("chain")
            .then(Upper { from: "input", to: "mid" })
            .then(Upper { from: "mid", to: "out" });

        let state = pipeline
            .invoke(State::new().with_text("input", "abc"), &())
            .await
            .unwrap();
        assert_eq!(state.text("out").unwrap(), "ABC");
        assert_eq!(pipeline.step_names(), vec!["upper", "upper"]);
    }

    #[tokio::test]
    async fn test_failing_step_aborts_with_context() {
        let pipeline = Pipeline::new("broken")
            .then(Fail)
            .then(Upper { from: "input", to: "out" });

        let err = pipeline
            .invoke(State::new().with_text("input", "x"), &())
            .await
            .unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("pipeline 'broken' failed at step 'fail'"));
        assert!(msg.contains("collaborator unavailable"));
    }

    #[tokio::test]
    async fn test_missing_field_is_an_error() {
        let pipeline = Pipeline::new("missing").then(Upper { from: "nope", to: "out" });
        let err = pipeline.invoke(State::new(), &()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("state field 'nope' is missing"));
    }

    #[test]
    fn test_typed_getter_rejects_wrong_kind() {
        let state = State::new().with_text("files", "not a map");
        let err = state.files("files").unwrap_err();
        assert!(err.to_string().contains("holds text"));
    }

    #[test]
    fn test_take_text_removes_field() {
        let mut state = State::new().with_text("answer", "42");
        assert_eq!(state.take_text("answer").unwrap(), "42");
        assert!(!state.contains("answer"));
    }
}
