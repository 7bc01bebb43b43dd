use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use orbitflow_application::{BulkOperations, CreateWorkflowRequest, Executor, Store, WorkflowService};
use orbitflow_core::{PaginationCursor, TenantId, WorkflowId};
use orbitflow_domain::{Edge, ExecutionFilter, ExecutionStatus, Node, NodeKind, Position, StepStatus};
use orbitflow_infrastructure::InMemoryStore;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn trigger_node(id: &str) -> Node {
    Node {
        id: id.to_owned(),
        kind: NodeKind::TriggerWebhook,
        name: id.to_owned(),
        position: Position { x: 0.0, y: 0.0 },
        config: Value::Null,
        credential_id: None,
    }
}

fn edge(id: &str, source: &str, target: &str) -> Edge {
    Edge {
        id: id.to_owned(),
        source: source.to_owned(),
        target: target.to_owned(),
        label: None,
    }
}

struct Harness {
    store: Arc<dyn Store>,
    service: WorkflowService,
    tenant_id: TenantId,
}

impl Harness {
    fn new() -> Self {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let executor = Arc::new(Executor::new(Arc::clone(&store)));
        let service = WorkflowService::new(Arc::clone(&store), executor);
        Self {
            store,
            service,
            tenant_id: TenantId::new(),
        }
    }

    async fn active_workflow(&self, nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowId {
        let created = self
            .service
            .create(
                self.tenant_id,
                CreateWorkflowRequest {
                    name: "end-to-end".to_owned(),
                    description: None,
                    nodes,
                    edges,
                    created_by: "tester".to_owned(),
                },
            )
            .await;
        assert!(created.is_ok());
        let workflow = created.unwrap_or_else(|_| unreachable!());

        let loaded = self.store.get_workflow(self.tenant_id, workflow.id()).await;
        assert!(loaded.is_ok());
        let mut workflow = loaded.unwrap_or_else(|_| unreachable!());
        assert!(workflow.activate(Utc::now()).is_ok());
        assert!(self.store.update_workflow(&workflow).await.is_ok());
        workflow.id()
    }
}

#[tokio::test]
async fn cursor_pagination_is_exhaustive_with_no_duplicates() {
    let harness = Harness::new();
    let workflow_id = harness.active_workflow(vec![trigger_node("trigger")], vec![]).await;

    for _ in 0..10 {
        let outcome = harness
            .service
            .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
            .await;
        assert!(outcome.is_ok());
    }

    let filter = ExecutionFilter::default();
    let mut cursor = None;
    let mut seen = HashSet::new();
    let mut page_sizes = Vec::new();
    let mut has_more_flags = Vec::new();

    loop {
        let page = harness
            .store
            .list_executions_filtered(harness.tenant_id, &filter, cursor.clone(), 3)
            .await;
        assert!(page.is_ok());
        let page = page.unwrap_or_else(|_| unreachable!());

        page_sizes.push(page.items.len());
        has_more_flags.push(page.has_more);
        for execution in &page.items {
            assert!(seen.insert(execution.id()));
        }

        if !page.has_more {
            break;
        }
        let decoded = page
            .next_cursor
            .as_deref()
            .map(PaginationCursor::decode)
            .transpose();
        assert!(decoded.is_ok());
        cursor = decoded.unwrap_or_else(|_| unreachable!());
    }

    assert_eq!(page_sizes, vec![3, 3, 3, 1]);
    assert_eq!(has_more_flags, vec![true, true, true, false]);
    assert_eq!(seen.len(), 10);
}

#[tokio::test]
async fn bulk_delete_reports_partial_failure_and_removes_only_valid_ids() {
    let harness = Harness::new();
    let mut valid_ids = Vec::new();
    for _ in 0..3 {
        valid_ids.push(harness.active_workflow(vec![trigger_node("trigger")], vec![]).await);
    }

    let bogus_ids = [WorkflowId::new(), WorkflowId::new()];
    let mut ids = valid_ids.clone();
    ids.extend(bogus_ids);

    let bulk = BulkOperations::new(Arc::clone(&harness.store));
    let result = bulk.delete(harness.tenant_id, "tester", &ids).await;

    assert_eq!(result.success_count, 3);
    assert_eq!(result.failures.len(), 2);
    for failure in &result.failures {
        assert!(bogus_ids.contains(&failure.workflow_id));
    }

    for workflow_id in valid_ids {
        let lookup = harness.store.get_workflow(harness.tenant_id, workflow_id).await;
        assert!(matches!(lookup, Err(orbitflow_core::AppError::NotFound(_))));
    }
}

/// Minimal HTTP/1.1 server returning 500 for the first `failures_before_success`
/// connections, then 200. Used to drive `action:http` through real retry
/// backoff without a mock HTTP crate in the dependency stack.
async fn spawn_flaky_server(failures_before_success: usize) -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await;
    assert!(listener.is_ok());
    let listener = listener.unwrap_or_else(|_| unreachable!());
    let local_addr = listener.local_addr();
    assert!(local_addr.is_ok());
    let addr = local_addr.unwrap_or_else(|_| unreachable!());

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_task = Arc::clone(&calls);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let call_index = calls_for_task.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buffer = [0_u8; 1024];
                let _ = socket.read(&mut buffer).await;

                let body = b"{}";
                let status_line = if call_index < failures_before_success {
                    "HTTP/1.1 500 Internal Server Error"
                } else {
                    "HTTP/1.1 200 OK"
                };
                let response = format!(
                    "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    "{}"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), calls)
}

#[tokio::test]
async fn retry_with_exponential_backoff_invokes_endpoint_exactly_max_attempts_times() {
    let (base_url, calls) = spawn_flaky_server(2).await;

    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                Node {
                    id: "control_retry".to_owned(),
                    kind: NodeKind::ControlRetry,
                    name: "control_retry".to_owned(),
                    position: Position { x: 0.0, y: 0.0 },
                    config: json!({
                        "inner_node_id": "http",
                        "strategy": "fixed",
                        "max_attempts": 3,
                        "initial_delay_ms": 1,
                    }),
                    credential_id: None,
                },
                Node {
                    id: "http".to_owned(),
                    kind: NodeKind::ActionHttp,
                    name: "http".to_owned(),
                    position: Position { x: 0.0, y: 0.0 },
                    config: json!({ "method": "GET", "url": base_url }),
                    credential_id: None,
                },
            ],
            vec![edge("e1", "trigger", "control_retry"), edge("e2", "control_retry", "http")],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let steps = harness
        .store
        .list_step_executions(harness.tenant_id, execution.id())
        .await;
    assert!(steps.is_ok());
    let steps = steps.unwrap_or_else(|_| unreachable!());

    let wrapper_step = steps.iter().find(|step| step.node_id() == "control_retry");
    assert!(wrapper_step.is_some());
    let wrapper_step = wrapper_step.unwrap_or_else(|| unreachable!());
    assert_eq!(wrapper_step.retry_count(), 2);
    assert_eq!(wrapper_step.status(), StepStatus::Completed);
}

fn loop_node(id: &str, config: Value) -> Node {
    Node {
        id: id.to_owned(),
        kind: NodeKind::ControlLoop,
        name: id.to_owned(),
        position: Position { x: 0.0, y: 0.0 },
        config,
        credential_id: None,
    }
}

fn formula_node(id: &str, expression: &str) -> Node {
    Node {
        id: id.to_owned(),
        kind: NodeKind::ActionFormula,
        name: id.to_owned(),
        position: Position { x: 0.0, y: 0.0 },
        config: json!({ "expression": expression }),
        credential_id: None,
    }
}

#[tokio::test]
async fn loop_max_iterations_caps_the_number_of_items_processed() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                loop_node(
                    "loop",
                    json!({
                        "source": "${trigger.items}",
                        "item_variable": "item",
                        "index_variable": "index",
                        "max_iterations": 3,
                    }),
                ),
                formula_node("leaf", "index"),
            ],
            vec![edge("e1", "trigger", "loop"), edge("e2", "loop", "leaf")],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({ "items": [10, 20, 30, 40, 50] }))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Completed);
    let output = execution.output_data().cloned().unwrap_or(Value::Null);
    assert_eq!(output.get("leaf"), Some(&json!(2)));
}

#[tokio::test]
async fn loop_on_error_continue_runs_remaining_iterations_after_a_failure() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                loop_node(
                    "loop",
                    json!({
                        "source": "${trigger.items}",
                        "item_variable": "item",
                        "on_error": "continue",
                    }),
                ),
                formula_node("leaf", "1 / item"),
            ],
            vec![edge("e1", "trigger", "loop"), edge("e2", "loop", "leaf")],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({ "items": [2, 0, 4] }))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Completed);
    let output = execution.output_data().cloned().unwrap_or(Value::Null);
    assert_eq!(output.get("leaf"), Some(&json!(0.25)));

    let steps = harness.store.list_step_executions(harness.tenant_id, execution.id()).await;
    assert!(steps.is_ok());
    let steps = steps.unwrap_or_else(|_| unreachable!());
    let failed_leaf_steps = steps
        .iter()
        .filter(|step| step.node_id() == "leaf" && step.status() == StepStatus::Failed)
        .count();
    assert_eq!(failed_leaf_steps, 1);
}

fn parallel_node(id: &str, config: Value) -> Node {
    Node {
        id: id.to_owned(),
        kind: NodeKind::ControlParallel,
        name: id.to_owned(),
        position: Position { x: 0.0, y: 0.0 },
        config,
        credential_id: None,
    }
}

fn join_node(id: &str, config: Value) -> Node {
    Node {
        id: id.to_owned(),
        kind: NodeKind::ControlJoin,
        name: id.to_owned(),
        position: Position { x: 0.0, y: 0.0 },
        config,
        credential_id: None,
    }
}

fn delay_node(id: &str, duration: &str) -> Node {
    Node {
        id: id.to_owned(),
        kind: NodeKind::ControlDelay,
        name: id.to_owned(),
        position: Position { x: 0.0, y: 0.0 },
        config: json!({ "duration": duration }),
        credential_id: None,
    }
}

#[tokio::test]
async fn parallel_max_concurrency_serializes_branches_beyond_the_cap() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                parallel_node("parallel", json!({ "join_node_id": "join", "max_concurrency": 2 })),
                delay_node("branch_a", "150ms"),
                delay_node("branch_b", "150ms"),
                delay_node("branch_c", "150ms"),
                delay_node("branch_d", "150ms"),
                join_node("join", json!({ "wait_mode": "wait_all" })),
            ],
            vec![
                edge("e1", "trigger", "parallel"),
                edge("e2", "parallel", "branch_a"),
                edge("e3", "parallel", "branch_b"),
                edge("e4", "parallel", "branch_c"),
                edge("e5", "parallel", "branch_d"),
                edge("e6", "branch_a", "join"),
                edge("e7", "branch_b", "join"),
                edge("e8", "branch_c", "join"),
                edge("e9", "branch_d", "join"),
            ],
        )
        .await;

    let started = std::time::Instant::now();
    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
        .await;
    let elapsed = started.elapsed();
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Completed);
    assert!(
        elapsed >= std::time::Duration::from_millis(280),
        "expected at least two serialized rounds of 150ms under max_concurrency 2, took {elapsed:?}"
    );
}

#[tokio::test]
async fn parallel_failure_mode_stop_all_fails_the_join_on_one_failing_branch() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                parallel_node("parallel", json!({ "join_node_id": "join", "failure_mode": "stop_all" })),
                formula_node("branch_ok", "1 + 1"),
                formula_node("branch_bad", "1 / 0"),
                join_node("join", json!({ "wait_mode": "wait_all" })),
            ],
            vec![
                edge("e1", "trigger", "parallel"),
                edge("e2", "parallel", "branch_ok"),
                edge("e3", "parallel", "branch_bad"),
                edge("e4", "branch_ok", "join"),
                edge("e5", "branch_bad", "join"),
            ],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Failed);
}

#[tokio::test]
async fn parallel_failure_mode_continue_tolerates_a_failing_branch() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                parallel_node("parallel", json!({ "join_node_id": "join", "failure_mode": "continue" })),
                formula_node("branch_ok", "1 + 1"),
                formula_node("branch_bad", "1 / 0"),
                join_node("join", json!({ "wait_mode": "wait_all" })),
            ],
            vec![
                edge("e1", "trigger", "parallel"),
                edge("e2", "parallel", "branch_ok"),
                edge("e3", "parallel", "branch_bad"),
                edge("e4", "branch_ok", "join"),
                edge("e5", "branch_bad", "join"),
            ],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Completed);
    let output = execution.output_data().cloned().unwrap_or(Value::Null);
    assert_eq!(output.get("branch_ok"), Some(&json!(2.0)));
    assert_eq!(output.get("join"), Some(&json!(1)));
}

#[tokio::test]
async fn parallel_wait_n_proceeds_once_required_count_succeeds() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                parallel_node("parallel", json!({ "join_node_id": "join", "failure_mode": "continue" })),
                formula_node("branch_a", "1 + 1"),
                formula_node("branch_b", "2 + 2"),
                formula_node("branch_c", "1 / 0"),
                join_node("join", json!({ "wait_mode": "wait_n", "required_count": 2 })),
            ],
            vec![
                edge("e1", "trigger", "parallel"),
                edge("e2", "parallel", "branch_a"),
                edge("e3", "parallel", "branch_b"),
                edge("e4", "parallel", "branch_c"),
                edge("e5", "branch_a", "join"),
                edge("e6", "branch_b", "join"),
                edge("e7", "branch_c", "join"),
            ],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Completed);
    let output = execution.output_data().cloned().unwrap_or(Value::Null);
    assert_eq!(output.get("join"), Some(&json!(2)));
}

#[tokio::test]
async fn parallel_timeout_with_on_timeout_continue_accepts_partial_results() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                parallel_node("parallel", json!({ "join_node_id": "join" })),
                formula_node("branch_fast", "1 + 1"),
                delay_node("branch_slow", "500ms"),
                join_node(
                    "join",
                    json!({ "wait_mode": "wait_all", "timeout_ms": 100, "on_timeout": "continue" }),
                ),
            ],
            vec![
                edge("e1", "trigger", "parallel"),
                edge("e2", "parallel", "branch_fast"),
                edge("e3", "parallel", "branch_slow"),
                edge("e4", "branch_fast", "join"),
                edge("e5", "branch_slow", "join"),
            ],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Completed);
    let output = execution.output_data().cloned().unwrap_or(Value::Null);
    assert_eq!(output.get("join"), Some(&json!(1)));
}

#[tokio::test]
async fn parallel_timeout_with_on_timeout_fail_fails_the_join() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                parallel_node("parallel", json!({ "join_node_id": "join" })),
                delay_node("branch_slow", "500ms"),
                join_node("join", json!({ "wait_mode": "wait_all", "timeout_ms": 100 })),
            ],
            vec![
                edge("e1", "trigger", "parallel"),
                edge("e2", "parallel", "branch_slow"),
                edge("e3", "branch_slow", "join"),
            ],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Failed);
}

#[tokio::test]
async fn formula_output_variable_is_readable_by_a_downstream_node() {
    let harness = Harness::new();
    let workflow_id = harness
        .active_workflow(
            vec![
                trigger_node("trigger"),
                Node {
                    id: "compute".to_owned(),
                    kind: NodeKind::ActionFormula,
                    name: "compute".to_owned(),
                    position: Position { x: 0.0, y: 0.0 },
                    config: json!({ "expression": "21 * 2", "output_variable": "answer" }),
                    credential_id: None,
                },
                formula_node("leaf", "answer + 1"),
            ],
            vec![edge("e1", "trigger", "compute"), edge("e2", "compute", "leaf")],
        )
        .await;

    let execution = harness
        .service
        .execute_sync(harness.tenant_id, workflow_id, "manual".to_owned(), json!({}))
        .await;
    assert!(execution.is_ok());
    let execution = execution.unwrap_or_else(|_| unreachable!());

    assert_eq!(execution.status(), ExecutionStatus::Completed);
    let output = execution.output_data().cloned().unwrap_or(Value::Null);
    assert_eq!(output.get("compute"), Some(&json!(42.0)));
    assert_eq!(output.get("leaf"), Some(&json!(43.0)));
}
