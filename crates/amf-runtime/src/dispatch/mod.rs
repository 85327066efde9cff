//! Batch executor.
//!
//! [`Dispatcher::execute`] opens a [`SessionContext`], runs every call
//! descriptor in order, finalizes the session and builds the response. A
//! call that fails for any reason yields an error string in its own result
//! slot; only session store failures fail the whole request.
//!
//! The batch runs on its own task, so a caller that stops waiting (a client
//! disconnect) does not stop the session from being finalized.

pub mod types;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use amf_core::logging::TRACE_TARGET;
use amf_core::{SessionId, TraceLevel};
use bytes::Bytes;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{Instrument, debug, error, info, instrument, warn};

pub use types::{AdapterRequest, AdapterResponse, CallDescriptor, CallError, CallResult};

use crate::errors::{DispatchError, SessionError};
use crate::modules::Call;
use crate::session::{RawResponse, SessionContext, SessionEnv};

/// What the transport should send back.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// The standard JSON response.
    Json(AdapterResponse),
    /// A module replaced the response with its own payload.
    Custom(RawResponse),
}

/// Executes call batches against the booted modules.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    env: SessionEnv,
    trace: TraceLevel,
}

impl Dispatcher {
    /// Create a dispatcher over `env`.
    pub fn new(env: SessionEnv, trace: TraceLevel) -> Self {
        Self { env, trace }
    }

    /// The session environment.
    pub fn env(&self) -> &SessionEnv {
        &self.env
    }

    /// Call tracing verbosity.
    pub fn trace(&self) -> TraceLevel {
        self.trace
    }

    /// Run one batch. `upload` is the raw body of an upload request.
    ///
    /// Dropping the returned future does not cancel the batch: the remaining
    /// calls still run and the session is still finalized.
    #[instrument(skip_all, fields(calls = request.functions.len()))]
    pub async fn execute(
        &self,
        request: AdapterRequest,
        upload: Option<Bytes>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let this = self.clone();
        tokio::spawn(async move { this.run_batch(request, upload).await }.in_current_span())
            .await
            .map_err(|e| {
                error!(error = %e, "batch task failed");
                DispatchError::Task(e.to_string())
            })?
    }

    async fn run_batch(
        &self,
        request: AdapterRequest,
        upload: Option<Bytes>,
    ) -> Result<DispatchOutcome, DispatchError> {
        counter!("amf_requests_total").increment(1);
        let session = SessionContext::init(
            &self.env,
            session_id(request.global_hash),
            session_id(request.session_hash),
            upload,
        )
        .await?;

        if self.trace.traces_calls() {
            info!(
                target: TRACE_TARGET,
                global = %session.global_id(),
                tab = %session.tab_id(),
                calls = %serde_json::to_string(&request.functions).unwrap_or_default(),
                "received calls"
            );
        }

        let registry = Arc::clone(self.env.registry());
        for name in registry.eager_modules() {
            if let Err(e) = session.module(name).await {
                warn!(module = %name, error = %e, "eager module unavailable");
            }
        }

        let mut results = Vec::with_capacity(request.functions.len());
        for call in request.functions {
            results.push(self.run_call(&session, call).await);
        }

        session.finalize().await?;

        if self.trace.traces_results() {
            info!(
                target: TRACE_TARGET,
                global = %session.global_id(),
                tab = %session.tab_id(),
                results = %serde_json::to_string(&results).unwrap_or_default(),
                "produced results"
            );
        }

        if let Some(raw) = session.take_custom_response() {
            debug!(content_type = %raw.content_type, "default response suppressed");
            return Ok(DispatchOutcome::Custom(raw));
        }
        Ok(DispatchOutcome::Json(AdapterResponse {
            global_hash: session.global_id().to_string(),
            session_hash: session.tab_id().to_string(),
            results,
        }))
    }

    async fn run_call(&self, session: &SessionContext, call: CallDescriptor) -> CallResult {
        let function = call.function.clone();
        let start = Instant::now();
        let outcome = self.invoke(session, call).await;
        histogram!("amf_call_duration_seconds").record(start.elapsed().as_secs_f64());

        match outcome {
            Ok(value) => {
                counter!("amf_calls_total", "status" => "ok").increment(1);
                CallResult::ok(value)
            }
            Err(err) => {
                counter!("amf_calls_total", "status" => "error").increment(1);
                counter!("amf_call_errors_total", "error_type" => err.code()).increment(1);
                debug!(function = %function, error = %err, "call failed");
                CallResult::failed(&err)
            }
        }
    }

    async fn invoke(&self, session: &SessionContext, call: CallDescriptor) -> Result<Value, CallError> {
        if call.function.is_empty() {
            return Err(CallError::NoFunction);
        }
        let mut segments = call.function.split('.');
        let (Some(class), Some(method), None) = (segments.next(), segments.next(), segments.next())
        else {
            return Err(CallError::ClassNotSpecified);
        };

        let instance = session.module(class).await.map_err(|e| {
            match e {
                SessionError::UnknownModule(_) => debug!(module = %class, "unknown class"),
                e => warn!(module = %class, error = %e, "class could not be bound"),
            }
            CallError::ClassNotFound
        })?;
        let remote = self
            .env
            .registry()
            .get(class)
            .and_then(|descriptor| descriptor.method(method))
            .cloned()
            .ok_or(CallError::FunctionNotFound)?;

        let Some(Value::Array(params)) = call.params else {
            return Err(CallError::ParameterFormat);
        };
        if params.len() != remote.arity() {
            return Err(CallError::ParameterCount);
        }

        let pending = remote.invoke(
            instance,
            Call {
                session: session.clone(),
                params,
            },
        );
        match AssertUnwindSafe(pending).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(function = %call.function, error = %e, "module method failed");
                Err(CallError::Execution)
            }
            Err(panic) => {
                error!(function = %call.function, panic = %panic_message(&*panic), "module method panicked");
                Err(CallError::Execution)
            }
        }
    }
}

fn session_id(hash: Option<String>) -> Option<SessionId> {
    hash.filter(|h| !h.is_empty()).map(SessionId::from_string)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::modules::{ModuleDescriptor, ModuleRegistry};
    use crate::test_support::{DownStore, EventLog, ModA, ModB, booted_env, env_for_registry, env_with_store};

    use amf_store::StoreError;
    use assert_matches::assert_matches;
    use serde_json::json;

    async fn dispatcher() -> (Dispatcher, Arc<EventLog>) {
        let (env, log) = booted_env().await;
        (Dispatcher::new(env, TraceLevel::Full), log)
    }

    fn batch(calls: Vec<CallDescriptor>) -> AdapterRequest {
        AdapterRequest {
            functions: calls,
            ..AdapterRequest::default()
        }
    }

    async fn run(dispatcher: &Dispatcher, request: AdapterRequest) -> AdapterResponse {
        match dispatcher.execute(request, None).await.unwrap() {
            DispatchOutcome::Json(response) => response,
            DispatchOutcome::Custom(raw) => panic!("unexpected custom response: {raw:?}"),
        }
    }

    fn errors(response: &AdapterResponse) -> Vec<Option<&str>> {
        response.results.iter().map(|r| r.error.as_deref()).collect()
    }

    #[tokio::test]
    async fn arity_mismatch_does_not_affect_siblings() {
        let (d, _log) = dispatcher().await;
        let response = run(
            &d,
            batch(vec![
                CallDescriptor::new("Foo.add", vec![json!(1)]),
                CallDescriptor::new("Foo.add", vec![json!(1), json!(2)]),
            ]),
        )
        .await;
        assert_eq!(
            response.results,
            vec![
                CallResult::failed(&CallError::ParameterCount),
                CallResult::ok(json!(3)),
            ]
        );
    }

    #[tokio::test]
    async fn validation_ladder() {
        let (d, _log) = dispatcher().await;
        let response = run(
            &d,
            batch(vec![
                CallDescriptor::new("", vec![]),
                CallDescriptor::new("Foo", vec![]),
                CallDescriptor::new("Foo.add.extra", vec![]),
                CallDescriptor::new("Bogus.x", vec![]),
                CallDescriptor::new(".x", vec![]),
                CallDescriptor::new("Foo.nope", vec![]),
                CallDescriptor::new("Foo.internal", vec![]),
                CallDescriptor {
                    function: "Foo.add".into(),
                    params: None,
                },
                CallDescriptor {
                    function: "Foo.add".into(),
                    params: Some(json!({"a": 1})),
                },
                CallDescriptor::new("Foo.add", vec![json!(1), json!(2), json!(3)]),
            ]),
        )
        .await;
        assert_eq!(
            errors(&response),
            vec![
                Some("no function specified"),
                Some("class not specified"),
                Some("class not specified"),
                Some("class does not exist"),
                Some("class does not exist"),
                Some("function does not exist"),
                Some("function does not exist"),
                Some("parameter format error"),
                Some("parameter format error"),
                Some("parameter count mismatch"),
            ]
        );
        assert!(response.results.iter().all(|r| r.value.is_null()));
    }

    #[tokio::test]
    async fn failures_and_panics_are_isolated() {
        let (d, _log) = dispatcher().await;
        let response = run(
            &d,
            batch(vec![
                CallDescriptor::new("Foo.fail", vec![]),
                CallDescriptor::new("Foo.boom", vec![]),
                CallDescriptor::new("Foo.add", vec![json!("x"), json!(2)]),
                CallDescriptor::new("Foo.echo", vec![json!({"ok": true})]),
            ]),
        )
        .await;
        assert_eq!(
            errors(&response),
            vec![
                Some("module execution error"),
                Some("module execution error"),
                Some("module execution error"),
                None,
            ]
        );
        assert_eq!(response.results[3].value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn calls_run_in_order_and_see_earlier_effects() {
        let (d, _log) = dispatcher().await;
        let response = run(
            &d,
            batch(vec![
                CallDescriptor::new("Foo.recall", vec![json!("k")]),
                CallDescriptor::new("Foo.remember", vec![json!("k"), json!(7)]),
                CallDescriptor::new("Foo.recall", vec![json!("k")]),
            ]),
        )
        .await;
        assert_eq!(response.results.len(), 3);
        assert_eq!(response.results[0].value, Value::Null);
        assert_eq!(response.results[2].value, json!(7));
    }

    #[tokio::test]
    async fn session_survives_a_failed_batch() {
        let (d, _log) = dispatcher().await;
        let first = run(
            &d,
            batch(vec![
                CallDescriptor::new("Foo.remember", vec![json!("k"), json!("v")]),
                CallDescriptor::new("Bogus.x", vec![]),
            ]),
        )
        .await;
        assert_eq!(first.results[1].error.as_deref(), Some("class does not exist"));

        let second = run(
            &d,
            AdapterRequest {
                global_hash: Some(first.global_hash.clone()),
                session_hash: Some(first.session_hash.clone()),
                functions: vec![CallDescriptor::new("Foo.recall", vec![json!("k")])],
            },
        )
        .await;
        assert_eq!(second.global_hash, first.global_hash);
        assert_eq!(second.session_hash, first.session_hash);
        assert_eq!(second.results[0].value, json!("v"));
    }

    #[tokio::test]
    async fn malformed_descriptors_fail_only_their_slot() {
        let (d, _log) = dispatcher().await;
        let request: AdapterRequest = serde_json::from_value(json!({
            "functions": [
                {"function": null, "params": []},
                {"function": 5},
                null,
                {"function": "Foo.add", "params": [1, 2]}
            ]
        }))
        .unwrap();
        let response = run(&d, request).await;
        assert_eq!(
            errors(&response),
            vec![
                Some("no function specified"),
                Some("no function specified"),
                Some("no function specified"),
                None,
            ]
        );
        assert_eq!(response.results[3].value, json!(3));
    }

    #[tokio::test]
    async fn abandoned_batch_still_finalizes() {
        let (d, log) = dispatcher().await;
        let pending = d.execute(
            batch(vec![
                CallDescriptor::new("Foo.remember", vec![json!("k"), json!(1)]),
                CallDescriptor::new("Foo.slow", vec![json!(200)]),
            ]),
            None,
        );
        assert!(tokio::time::timeout(Duration::from_millis(50), pending).await.is_err());
        assert!(log.contains("start:Foo"));

        for _ in 0..200 {
            if log.contains("end:Foo") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(log.contains("end:Foo"));
    }

    #[tokio::test]
    async fn empty_hashes_issue_new_ids() {
        let (d, _log) = dispatcher().await;
        let response = run(
            &d,
            AdapterRequest {
                global_hash: Some(String::new()),
                session_hash: Some(String::new()),
                functions: vec![],
            },
        )
        .await;
        assert!(!response.global_hash.is_empty());
        assert!(!response.session_hash.is_empty());
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn per_session_state_is_isolated_between_tabs() {
        let (d, _log) = dispatcher().await;
        let bump = || batch(vec![CallDescriptor::new("Scoped.bump", vec![])]);
        let first = run(&d, bump()).await;
        let second = run(&d, bump()).await;
        assert_eq!(first.results[0].value, json!(1));
        assert_eq!(second.results[0].value, json!(1));
    }

    #[tokio::test]
    async fn custom_response_replaces_json() {
        let (d, _log) = dispatcher().await;
        let outcome = d
            .execute(
                batch(vec![CallDescriptor::new("Foo.raw", vec![json!("plain body")])]),
                None,
            )
            .await
            .unwrap();
        assert_matches!(
            outcome,
            DispatchOutcome::Custom(RawResponse { status: 200, ref content_type, ref body })
                if content_type == "text/plain" && body.as_ref() == b"plain body"
        );
    }

    #[tokio::test]
    async fn upload_is_visible_to_methods() {
        let (d, _log) = dispatcher().await;
        let outcome = d
            .execute(
                batch(vec![CallDescriptor::new("Foo.uploadLen", vec![])]),
                Some(Bytes::from_static(b"12345")),
            )
            .await
            .unwrap();
        assert_matches!(outcome, DispatchOutcome::Json(r) if r.results[0].value == json!(5));
    }

    #[tokio::test]
    async fn eager_modules_start_and_end_every_request() {
        let mut descriptors = BTreeMap::new();
        let _ = descriptors.insert(
            "A".to_owned(),
            ModuleDescriptor::of::<ModA>().with_eager_session(true),
        );
        let _ = descriptors.insert("B".to_owned(), ModuleDescriptor::of::<ModB>());
        let registry = ModuleRegistry::new(descriptors).unwrap();
        let (env, log) = env_for_registry(registry).await;
        let d = Dispatcher::new(env, TraceLevel::Off);

        let _ = run(&d, batch(vec![])).await;
        assert_eq!(log.matching("start:"), vec!["start:A"]);
        assert_eq!(log.matching("end:"), vec!["end:A"]);
    }

    #[tokio::test]
    async fn store_failure_fails_the_request() {
        let (env, _log) = env_with_store(Arc::new(DownStore)).await;
        let d = Dispatcher::new(env, TraceLevel::Off);
        let err = d
            .execute(batch(vec![CallDescriptor::new("Foo.add", vec![json!(1), json!(2)])]), None)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            DispatchError::Session(SessionError::Store(StoreError::Unavailable(_)))
        );
    }

    #[test]
    fn panic_payloads_render() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*boxed), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(&*boxed), "non-string panic payload");
    }
}
