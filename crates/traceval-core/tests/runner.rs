//! End-to-end runs: config → registry → dispatch → aggregation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use serde_json::json;

use traceval_core::{
    Aggregation, AggregationEngine, AggregationKind, BoundEvaluator, CallbackResult, EvalLevel,
    EvalResult, Evaluator, EvaluatorConfig, EvaluatorRegistry, NormalizeOptions, RawSpan, RunConfig,
    Runner, Task, TraceInput, TraceModel,
};

/// Sleeps longer for earlier traces so completion order inverts input order.
struct SlowByIndex;

impl Evaluator for SlowByIndex {
    fn name(&self) -> &str {
        "slow_by_index"
    }

    fn evaluate_trace(&self, trace: &TraceModel, _task: Option<&Task>) -> CallbackResult {
        let index: u64 = trace.trace_id().trim_start_matches("trace-").parse()?;
        std::thread::sleep(Duration::from_millis(5 * (8 - index.min(8))));
        Ok(EvalResult::scored(index as f64 / 10.0)?)
    }
}

/// Fails the first trace at once; later traces finish slowly and are counted.
#[derive(Default)]
struct FailFirst {
    finished: AtomicUsize,
}

impl Evaluator for FailFirst {
    fn name(&self) -> &str {
        "fail_first"
    }

    fn evaluate_trace(&self, trace: &TraceModel, _task: Option<&Task>) -> CallbackResult {
        if trace.trace_id() == "trace-0" {
            bail!("rejected {}", trace.trace_id());
        }
        std::thread::sleep(Duration::from_millis(20));
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(EvalResult::scored(1.0)?)
    }
}

fn batch() -> Vec<TraceInput> {
    (0..8)
        .map(|i| {
            let mut spans = vec![
                RawSpan::new("root", None, "chain"),
                RawSpan::new("agent", Some("root"), "agent").with_name("worker"),
            ];
            for t in 0..i {
                spans.push(
                    RawSpan::new(format!("tool-{t}"), Some("agent"), "tool").with_name("search"),
                );
            }
            spans.push(
                RawSpan::new("llm", Some("agent"), "llm")
                    .with_output(json!("done"))
                    .with_attribute("llm.token_count.total", json!(1000 * i)),
            );
            TraceInput::new(format!("trace-{i}"), spans)
                .with_io("find things", "done")
                .with_task(
                    Task::new(format!("task-{i}"), "find things")
                        .with_expected_tools(vec!["search", "search"])
                        .with_expected_output("done"),
                )
        })
        .collect()
}

fn config() -> RunConfig {
    RunConfig::default()
        .with_evaluator(EvaluatorConfig::new("tool_sequence", EvalLevel::Agent))
        .with_evaluator(
            EvaluatorConfig::new("token_budget", EvalLevel::Span)
                .with_name("tight_budget")
                .with_param("max_tokens", json!(2000))
                .with_aggregations(vec![
                    Aggregation::new(AggregationKind::Min),
                    Aggregation::pass_rate(1.0),
                ]),
        )
        .with_evaluator(EvaluatorConfig::new("output_match", EvalLevel::Trace))
}

#[test]
fn test_builtin_run_over_batch() {
    let runner = Runner::with_registry(config(), &EvaluatorRegistry::with_builtins()).unwrap();
    let report = runner.run(&batch()).unwrap();

    assert_eq!(report.trace_count, 8);
    let names: Vec<&str> = report
        .evaluators
        .iter()
        .map(|e| e.evaluator.as_str())
        .collect();
    assert_eq!(names, vec!["tool_sequence", "tight_budget", "output_match"]);

    let tools = report.evaluator("tool_sequence").unwrap();
    assert_eq!(tools.count, 8);
    // Agent views are keyed by the agent span id; scores follow input order.
    assert!(tools.items.iter().all(|(id, _)| id == "agent"));
    let scores: Vec<f64> = tools.items.iter().map(|(_, s)| *s).collect();
    assert_eq!(scores[..4], [0.0, 0.5, 1.0, 2.0 / 3.0]);
    assert!(tools.get("mean").is_some());
    assert!(tools.get("p50").is_some());

    let budget = report.evaluator("tight_budget").unwrap();
    assert_eq!(budget.count, 8);
    // Traces 0..=2 stay within 2000 tokens.
    assert_eq!(budget.get("pass_rate_threshold_1.0"), Some(3.0 / 8.0));
    assert_eq!(budget.get("min"), Some(2000.0 / 7000.0));

    let output = report.evaluator("output_match").unwrap();
    assert_eq!(output.get("mean"), Some(1.0));
    assert!(output.get("pass_rate_threshold_0.7").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_parallel_preserves_input_order() {
    let bound = BoundEvaluator::new(Arc::new(SlowByIndex), EvalLevel::Trace).unwrap();
    let runner = Runner::from_evaluators(vec![bound], NormalizeOptions::default());

    let sequential = runner.run(&batch()).unwrap();
    let parallel = runner.run_parallel(batch()).await.unwrap();

    let ids: Vec<&str> = parallel.evaluators[0]
        .items
        .iter()
        .map(|(id, _)| id.as_str())
        .collect();
    let expected: Vec<String> = (0..8).map(|i| format!("trace-{i}")).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(sequential.evaluators, parallel.evaluators);
    assert_ne!(sequential.run_id, parallel.run_id);
}

#[tokio::test]
async fn test_run_parallel_surfaces_first_failure() {
    let bound = BoundEvaluator::new(Arc::new(SlowByIndex), EvalLevel::Trace).unwrap();
    let runner = Runner::from_evaluators(vec![bound], NormalizeOptions::default());
    let mut traces = batch();
    traces.push(TraceInput::new("not-a-number", Vec::new()));

    let err = runner.run_parallel(traces).await.unwrap_err();
    assert!(err.to_string().contains("not-a-number"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_parallel_waits_for_every_task_before_failing() {
    let evaluator = Arc::new(FailFirst::default());
    let bound = BoundEvaluator::new(evaluator.clone(), EvalLevel::Trace).unwrap();
    let runner = Runner::from_evaluators(vec![bound], NormalizeOptions::default());

    let err = runner.run_parallel(batch()).await.unwrap_err();
    assert!(err.to_string().contains("rejected trace-0"));
    assert_eq!(evaluator.finished.load(Ordering::SeqCst), 7);
}

#[test]
fn test_custom_engine_aggregation_through_runner() {
    let mut engine = AggregationEngine::new();
    engine
        .register("spread", |values, _| {
            let max = values.iter().cloned().fold(f64::MIN, f64::max);
            let min = values.iter().cloned().fold(f64::MAX, f64::min);
            Ok(max - min)
        })
        .unwrap();

    let bound = BoundEvaluator::new(Arc::new(SlowByIndex), EvalLevel::Trace)
        .unwrap()
        .with_aggregations(vec![Aggregation::custom("spread"), Aggregation::mean()]);
    let runner =
        Runner::from_evaluators(vec![bound], NormalizeOptions::default()).with_engine(engine);

    let traces: Vec<TraceInput> = batch().into_iter().take(3).collect();
    let report = runner.run(&traces).unwrap();
    let result = &report.evaluators[0];
    assert!((result.get("spread").unwrap() - 0.2).abs() < 1e-12);
    assert!((result.get("mean").unwrap() - 0.1).abs() < 1e-12);
}

#[test]
fn test_empty_batch_produces_empty_aggregations() {
    let runner = Runner::with_registry(config(), &EvaluatorRegistry::with_builtins()).unwrap();
    let report = runner.run(&[]).unwrap();
    assert_eq!(report.trace_count, 0);
    assert_eq!(report.evaluators.len(), 3);
    assert!(report.evaluators.iter().all(|e| e.aggregations.is_empty()));
}
