use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use orbitflow_core::{AppResult, ExecutionId, TenantId, WorkflowId};
use orbitflow_domain::{
    Execution, ExecutionInput, ExecutionStatus, Node, NodeKind, StepExecution, WorkflowDefinition,
};
use orbitflow_expression::{Environment, Evaluator};
use orbitflow_planner::topological_order;
use orbitflow_runtime::{
    Cancellation, CircuitBreaker, CircuitBreakerConfig, CircuitBroken, EngineError, NodeContext,
    NodeExecutor, NodeRegistry, RetryConfig, RetryStrategy, Retrying,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::store::Store;

fn node_type_name(kind: NodeKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Expands every string leaf of a JSON value through the `${path}`
/// templater, mirroring `action:transform`'s mapping expansion.
fn render_value_recursive(value: &Value, env: &Environment) -> Result<Value, String> {
    match value {
        Value::String(text) => {
            orbitflow_expression::render_template(text, env).map_err(|error| error.to_string())
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_value_recursive(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, field)| render_value_recursive(field, env).map(|rendered| (key.clone(), rendered)))
            .collect::<Result<Map<String, Value>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Outcome of walking one block of the graph.
enum BlockOutcome {
    /// The block ran to completion.
    Completed,
    /// A `control_if` `stop_on_true`/`stop_on_false` fired: the execution
    /// finishes as completed without running the remaining graph.
    StoppedEarly,
    /// A node raised an unrecoverable error.
    Failed(String),
}

/// Per-execution mutable bookkeeping threaded through one graph walk.
#[derive(Default)]
struct WalkState {
    /// Node ids whose branch was not taken; recorded as a skipped step once.
    skipped: HashSet<String>,
    /// Node ids already run by a wrapper (retry/circuit_breaker) or a
    /// deferred parallel/fork branch; the main walk must not run them again.
    absorbed: HashSet<String>,
    /// Edge ids pruned by a `control_if` branch decision.
    pruned_edges: HashSet<String>,
    /// Accumulated `steps.<node_id>` outputs, mirrored into the environment.
    steps: Map<String, Value>,
}

impl WalkState {
    fn record_output(&mut self, env: &mut Environment, node_id: &str, value: Value) {
        self.steps.insert(node_id.to_owned(), value);
        env.set("steps", Value::Object(self.steps.clone()));
    }
}

/// `control_parallel`/`control_fork`'s `failure_mode`: whether one failing
/// branch aborts the remaining branches and fails the join, or is tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    StopAll,
    Continue,
}

impl FailureMode {
    fn from_config(config: &Value) -> Self {
        match config.get("failure_mode").and_then(Value::as_str) {
            Some("continue") => Self::Continue,
            _ => Self::StopAll,
        }
    }
}

/// Branches dispatched for one `control_join` node, awaited together when
/// the walk reaches that join.
struct ParallelWaiter {
    set: tokio::task::JoinSet<AppResult<Map<String, Value>>>,
    failure_mode: FailureMode,
}

/// Runs a validated workflow graph to completion, writing a [`StepExecution`]
/// row per node and driving the owning [`Execution`] through its state
/// machine (§4.6).
///
/// Self-contained node kinds are dispatched through the shared
/// [`NodeRegistry`]; multi-step control-flow kinds (`control_if`,
/// `control_loop`, `control_parallel`/`fork`/`join`, `control_sub_workflow`,
/// `control_try`/`catch`/`finally`, `control_retry`, `control_circuit_breaker`)
/// are orchestrated here directly.
#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn Store>,
    registry: NodeRegistry,
    evaluator: Arc<Evaluator>,
    http_client: reqwest::Client,
    circuit_breakers: Arc<Mutex<HashMap<String, Arc<CircuitBreaker>>>>,
}

impl Executor {
    /// Creates an executor backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            registry: NodeRegistry::new(),
            evaluator: Arc::new(Evaluator::default()),
            http_client: reqwest::Client::new(),
            circuit_breakers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn node_ctx(&self, tenant_id: TenantId, execution_id: ExecutionId, node_id: &str, cancellation: &Cancellation) -> NodeContext {
        NodeContext {
            tenant_id,
            execution_id,
            node_id: node_id.to_owned(),
            evaluator: Arc::clone(&self.evaluator),
            http_client: self.http_client.clone(),
            cancellation: cancellation.clone(),
        }
    }

    /// Loads, runs, and persists the terminal status of one execution.
    pub async fn run(&self, tenant_id: TenantId, execution_id: ExecutionId, cancellation: Cancellation) -> AppResult<()> {
        let mut execution = self.store.get_execution(tenant_id, execution_id).await?;
        let workflow = self.store.get_workflow(tenant_id, execution.workflow_id()).await?;
        let definition = if execution.workflow_version() == workflow.version() {
            workflow.definition().clone()
        } else {
            self.store
                .get_workflow_version(tenant_id, execution.workflow_id(), execution.workflow_version())
                .await?
                .definition()
                .clone()
        };

        execution.start(Utc::now())?;
        self.store.update_execution(&execution).await?;

        let mut env = Environment::new();
        env.set("trigger", execution.trigger_data().clone());
        let mut state = WalkState::default();

        let Some(order) = topological_order(definition.nodes(), definition.edges()) else {
            execution.finish(
                ExecutionStatus::Failed,
                None,
                Some("workflow graph contains a cycle".to_owned()),
                Utc::now(),
            )?;
            self.store.update_execution(&execution).await?;
            return Ok(());
        };

        let outcome = self
            .walk_nodes(
                tenant_id,
                execution_id,
                &definition,
                &order,
                &mut env,
                &mut state,
                &cancellation,
            )
            .await;

        let now = Utc::now();
        match outcome {
            BlockOutcome::Completed | BlockOutcome::StoppedEarly => {
                let output = Value::Object(state.steps.clone());
                execution.finish(ExecutionStatus::Completed, Some(output), None, now)?;
            }
            BlockOutcome::Failed(message) => {
                execution.finish(ExecutionStatus::Failed, None, Some(message), now)?;
            }
        }
        self.store.update_execution(&execution).await?;
        Ok(())
    }

    fn run_boxed<'a>(
        &'a self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        cancellation: Cancellation,
    ) -> Pin<Box<dyn Future<Output = AppResult<()>> + Send + 'a>> {
        Box::pin(self.run(tenant_id, execution_id, cancellation))
    }

    fn is_pruned(&self, node_id: &str, definition: &WorkflowDefinition, state: &WalkState) -> bool {
        let incoming: Vec<&orbitflow_domain::Edge> = definition
            .edges()
            .iter()
            .filter(|edge| edge.target == node_id)
            .collect();

        if incoming.is_empty() {
            return false;
        }

        incoming
            .iter()
            .all(|edge| state.pruned_edges.contains(&edge.id) || state.skipped.contains(&edge.source))
    }

    /// Boxes a `walk_nodes` call; used at every recursive call site
    /// (`control_loop`, `control_try`/`catch`/`finally` bodies) so the
    /// mutual recursion between `walk_nodes` and those handlers resolves to
    /// a finite-sized future.
    fn walk_nodes_boxed<'a>(
        &'a self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        definition: &'a WorkflowDefinition,
        order: &'a [String],
        env: &'a mut Environment,
        state: &'a mut WalkState,
        cancellation: &'a Cancellation,
    ) -> Pin<Box<dyn Future<Output = BlockOutcome> + Send + 'a>> {
        Box::pin(self.walk_nodes(tenant_id, execution_id, definition, order, env, state, cancellation))
    }

    /// Walks `order` (a sub-sequence of the graph's global topological
    /// order), dispatching each node and honoring skip/absorb bookkeeping.
    async fn walk_nodes(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        definition: &WorkflowDefinition,
        order: &[String],
        env: &mut Environment,
        state: &mut WalkState,
        cancellation: &Cancellation,
    ) -> BlockOutcome {
        let mut parallel_waiters: HashMap<String, ParallelWaiter> = HashMap::new();

        for node_id in order {
            if cancellation.is_cancelled() {
                return BlockOutcome::Failed("execution cancelled".to_owned());
            }
            if state.absorbed.contains(node_id) || state.skipped.contains(node_id) {
                continue;
            }

            let Some(node) = definition.node(node_id) else {
                continue;
            };

            if node.kind.is_trigger() {
                state.record_output(env, node_id, env.get_root("trigger").cloned().unwrap_or(Value::Null));
                continue;
            }

            if self.is_pruned(node_id, definition, state) {
                state.skipped.insert(node_id.clone());
                let step = StepExecution::skipped(
                    execution_id,
                    node_id.clone(),
                    node_type_name(node.kind),
                    "branch not taken".to_owned(),
                    Utc::now(),
                );
                if let Err(error) = self.store.create_step_execution(step).await {
                    tracing::warn!(%error, node_id, "failed to persist skipped step record");
                }
                continue;
            }

            match node.kind {
                NodeKind::ControlParallel | NodeKind::ControlFork => {
                    if let Err(message) = self
                        .dispatch_parallel(tenant_id, execution_id, definition, node, env, state, cancellation, &mut parallel_waiters)
                        .await
                    {
                        return BlockOutcome::Failed(message);
                    }
                }
                NodeKind::ControlJoin => {
                    match self.join_parallel(node, env, state, &mut parallel_waiters).await {
                        Ok(()) => {}
                        Err(message) => return BlockOutcome::Failed(message),
                    }
                }
                NodeKind::ControlSubWorkflow => {
                    if let Err(message) = self.run_sub_workflow(tenant_id, node, env, state, cancellation).await {
                        return BlockOutcome::Failed(message);
                    }
                }
                NodeKind::ControlTry => {
                    match self
                        .run_try_catch_finally(tenant_id, execution_id, definition, node, env, state, cancellation)
                        .await
                    {
                        BlockOutcome::Completed => {}
                        other => return other,
                    }
                }
                NodeKind::ControlCatch | NodeKind::ControlFinally => {
                    // Reached only if not already absorbed as part of a try block
                    // (e.g. a catch/finally with no owning control_try), run as a no-op passthrough.
                    state.record_output(env, node_id, Value::Null);
                }
                NodeKind::ControlRetry | NodeKind::ControlCircuitBreaker => {
                    if let Err(message) = self
                        .run_wrapped_node(tenant_id, execution_id, definition, node, env, state, cancellation)
                        .await
                    {
                        return BlockOutcome::Failed(message);
                    }
                }
                NodeKind::ControlIf => {
                    match self.run_conditional(tenant_id, execution_id, definition, node, env, state, cancellation).await {
                        Ok(true) => return BlockOutcome::StoppedEarly,
                        Ok(false) => {}
                        Err(message) => return BlockOutcome::Failed(message),
                    }
                }
                NodeKind::ControlLoop => {
                    if let Err(message) = self
                        .run_loop(tenant_id, execution_id, definition, node, order, env, state, cancellation)
                        .await
                    {
                        return BlockOutcome::Failed(message);
                    }
                }
                _ => {
                    if let Err(message) = self
                        .run_leaf(tenant_id, execution_id, node, env, state, cancellation)
                        .await
                    {
                        return BlockOutcome::Failed(message);
                    }
                }
            }
        }

        BlockOutcome::Completed
    }

    /// Runs one self-contained node (trigger/action/`control_delay`) through
    /// the registry, writing a [`StepExecution`] row around the call.
    async fn run_leaf(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        node: &Node,
        env: &mut Environment,
        state: &mut WalkState,
        cancellation: &Cancellation,
    ) -> Result<(), String> {
        let Some(executor) = self.registry.get(node.kind) else {
            return Err(format!("no handler registered for node kind on node {}", node.id));
        };

        let mut step = StepExecution::start(
            execution_id,
            node.id.clone(),
            node_type_name(node.kind),
            node.config.clone(),
            Utc::now(),
        );
        if let Err(error) = self.store.create_step_execution(step.clone()).await {
            tracing::warn!(%error, node_id = %node.id, "failed to persist step start record");
        }

        let ctx = self.node_ctx(tenant_id, execution_id, &node.id, cancellation);
        let outcome = executor.execute(&ctx, &node.config, env).await;

        match outcome {
            Ok(output) => {
                let _ = step.complete(output.clone(), Utc::now());
                if let Err(error) = self.store.update_step_execution(&step).await {
                    tracing::warn!(%error, node_id = %node.id, "failed to persist step completion");
                }
                if node.kind == NodeKind::ActionFormula
                    && let Some(output_variable) = node.config.get("output_variable").and_then(Value::as_str)
                {
                    env.set(output_variable.to_owned(), output.clone());
                }
                state.record_output(env, &node.id, output);
                Ok(())
            }
            Err(error) => {
                let message = error.to_string();
                let _ = step.fail(message.clone(), Utc::now());
                if let Err(store_error) = self.store.update_step_execution(&step).await {
                    tracing::warn!(%store_error, node_id = %node.id, "failed to persist step failure");
                }
                Err(message)
            }
        }
    }

    /// Evaluates `control_if`, prunes the untaken branch's edges, and
    /// reports whether `stop_on_true`/`stop_on_false` requests an early,
    /// successful finish.
    async fn run_conditional(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        definition: &WorkflowDefinition,
        node: &Node,
        env: &mut Environment,
        state: &mut WalkState,
        cancellation: &Cancellation,
    ) -> Result<bool, String> {
        let Some(executor) = self.registry.get(node.kind) else {
            return Err(format!("no handler registered for node kind on node {}", node.id));
        };
        let ctx = self.node_ctx(tenant_id, execution_id, &node.id, cancellation);

        let result = executor
            .execute(&ctx, &node.config, env)
            .await
            .map_err(|error| error.to_string())?;
        let flag = matches!(result, Value::Bool(true));
        state.record_output(env, &node.id, Value::Bool(flag));

        let taken_label = if flag { "true" } else { "false" };
        for edge in definition.outgoing_edges(&node.id) {
            if edge.label.as_deref() != Some(taken_label) {
                state.pruned_edges.insert(edge.id.clone());
            }
        }

        let stop_field = if flag { "stop_on_true" } else { "stop_on_false" };
        Ok(node.config.get(stop_field).and_then(Value::as_bool).unwrap_or(false))
    }

    /// Reachable node ids strictly downstream of `from`, not crossing any
    /// id in `boundary`, expressed as a filter over the graph's global
    /// topological order (preserving dependency order within the block).
    fn reachable_block(
        &self,
        definition: &WorkflowDefinition,
        from: &str,
        boundary: &HashSet<String>,
        global_order: &[String],
    ) -> Vec<String> {
        let mut reachable = HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        reachable.insert(from.to_owned());
        queue.push_back(from.to_owned());

        while let Some(current) = queue.pop_front() {
            for edge in definition.outgoing_edges(&current) {
                if boundary.contains(&edge.target) || reachable.contains(&edge.target) {
                    continue;
                }
                reachable.insert(edge.target.clone());
                queue.push_back(edge.target.clone());
            }
        }

        global_order.iter().filter(|id| reachable.contains(*id)).cloned().collect()
    }

    /// Iterates `control_loop`'s resolved array, binding `item_variable`/
    /// `index_variable` and re-running the downstream sub-graph once per
    /// element. Per-iteration step outputs overwrite the prior iteration's,
    /// since the flat step model keeps one record per node id, not per
    /// iteration.
    async fn run_loop(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        definition: &WorkflowDefinition,
        node: &Node,
        global_order: &[String],
        env: &mut Environment,
        state: &mut WalkState,
        cancellation: &Cancellation,
    ) -> Result<(), String> {
        let Some(executor) = self.registry.get(node.kind) else {
            return Err(format!("no handler registered for node kind on node {}", node.id));
        };
        let ctx = self.node_ctx(tenant_id, execution_id, &node.id, cancellation);
        let resolved = executor.execute(&ctx, &node.config, env).await.map_err(|error| error.to_string())?;
        let Value::Array(items) = resolved.clone() else {
            return Err(format!("control_loop {} did not resolve to an array", node.id));
        };
        state.record_output(env, &node.id, resolved);

        let item_variable = node.config.get("item_variable").and_then(Value::as_str).unwrap_or("item").to_owned();
        let index_variable = node.config.get("index_variable").and_then(Value::as_str).unwrap_or("index").to_owned();
        let max_iterations = node.config.get("max_iterations").and_then(Value::as_u64).unwrap_or(1000) as usize;
        let stop_on_error = node.config.get("on_error").and_then(Value::as_str) != Some("continue");

        let boundary: HashSet<String> = HashSet::new();
        let body: Vec<String> = definition
            .outgoing_edges(&node.id)
            .into_iter()
            .flat_map(|edge| self.reachable_block(definition, &edge.target, &boundary, global_order))
            .collect();

        for (index, item) in items.into_iter().take(max_iterations).enumerate() {
            if cancellation.is_cancelled() {
                return Err("execution cancelled".to_owned());
            }
            env.set(item_variable.clone(), item);
            env.set(index_variable.clone(), Value::from(index));

            let outcome = self
                .walk_nodes_boxed(tenant_id, execution_id, definition, &body, env, state, cancellation)
                .await;

            if let BlockOutcome::Failed(message) = outcome {
                if stop_on_error {
                    env.unset(&item_variable);
                    env.unset(&index_variable);
                    return Err(message);
                }
                tracing::warn!(node_id = %node.id, %index, %message, "loop iteration failed, continuing per on_error");
            }
        }

        env.unset(&item_variable);
        env.unset(&index_variable);
        for node_id in &body {
            state.absorbed.insert(node_id.clone());
        }
        Ok(())
    }

    /// Dispatches one concurrent branch per outgoing edge of a
    /// `control_parallel`/`control_fork` node, deferring the await until the
    /// matching `control_join` node is reached in the main walk.
    ///
    /// `max_concurrency` (when set) gates branches of this dispatch behind a
    /// semaphore; `failure_mode` is read once per join and governs how
    /// `join_parallel` treats a failing branch.
    async fn dispatch_parallel(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        definition: &WorkflowDefinition,
        node: &Node,
        env: &Environment,
        state: &mut WalkState,
        cancellation: &Cancellation,
        waiters: &mut HashMap<String, ParallelWaiter>,
    ) -> Result<(), String> {
        let join_node_id = node
            .config
            .get("join_node_id")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{} requires a \"join_node_id\"", node.id))?
            .to_owned();

        let boundary: HashSet<String> = HashSet::from([join_node_id.clone()]);
        let global_order = topological_order(definition.nodes(), definition.edges())
            .ok_or_else(|| "workflow graph contains a cycle".to_owned())?;

        let semaphore = node
            .config
            .get("max_concurrency")
            .and_then(Value::as_u64)
            .map(|limit| Arc::new(tokio::sync::Semaphore::new(limit.max(1) as usize)));

        let waiter = waiters.entry(join_node_id.clone()).or_insert_with(|| ParallelWaiter {
            set: tokio::task::JoinSet::new(),
            failure_mode: FailureMode::from_config(&node.config),
        });

        for edge in definition.outgoing_edges(&node.id) {
            let branch = self.reachable_block(definition, &edge.target, &boundary, &global_order);
            for branch_node_id in &branch {
                state.absorbed.insert(branch_node_id.clone());
            }

            let definition = definition.clone();
            let branch_env = env.clone();
            let executor_self = ExecutorHandles {
                store: Arc::clone(&self.store),
                registry: NodeRegistry::new(),
                evaluator: Arc::clone(&self.evaluator),
                http_client: self.http_client.clone(),
            };
            let cancellation = cancellation.clone();
            let semaphore = semaphore.clone();

            waiter.set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => {
                        Some(semaphore.acquire_owned().await.unwrap_or_else(|_| unreachable!("semaphore is never closed")))
                    }
                    None => None,
                };
                executor_self
                    .run_branch(tenant_id, execution_id, &definition, &branch, branch_env, &cancellation)
                    .await
            });
        }

        Ok(())
    }

    /// Awaits the branches dispatched for this join node per its
    /// `wait_mode` (`wait_all` or `wait_n` with `required_count`), merging
    /// successful branches' step outputs back into the shared environment.
    ///
    /// A `stop_all` `failure_mode` fails the join as soon as one branch
    /// fails; `continue` tolerates failing branches and only checks
    /// `required_count` against the successes gathered. `timeout_ms`, when
    /// set, bounds the whole wait; `on_timeout: "continue"` accepts whatever
    /// succeeded before the deadline instead of failing the join.
    async fn join_parallel(
        &self,
        node: &Node,
        env: &mut Environment,
        state: &mut WalkState,
        waiters: &mut HashMap<String, ParallelWaiter>,
    ) -> Result<(), String> {
        let Some(ParallelWaiter { mut set, failure_mode }) = waiters.remove(&node.id) else {
            state.record_output(env, &node.id, Value::Null);
            return Ok(());
        };

        let wait_mode = node.config.get("wait_mode").and_then(Value::as_str).unwrap_or("wait_all");
        let total = set.len();
        let required_count = node
            .config
            .get("required_count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .unwrap_or(total);
        let timeout_ms = node.config.get("timeout_ms").and_then(Value::as_u64);
        let fail_on_timeout = node.config.get("on_timeout").and_then(Value::as_str) != Some("continue");
        let deadline = timeout_ms.map(|millis| tokio::time::Instant::now() + std::time::Duration::from_millis(millis));

        let mut succeeded = 0_usize;
        let mut failed = false;
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => set.join_next().await,
            };

            let Some(result) = next else { break };

            match result {
                Ok(Ok(branch_steps)) => {
                    for (key, value) in branch_steps {
                        state.steps.insert(key, value);
                    }
                    succeeded += 1;
                }
                Ok(Err(error)) => {
                    tracing::warn!(%error, node_id = %node.id, "parallel branch failed");
                    failed = true;
                }
                Err(error) => {
                    tracing::warn!(%error, node_id = %node.id, "parallel branch task panicked");
                    failed = true;
                }
            }

            if failure_mode == FailureMode::StopAll && failed {
                break;
            }
            if wait_mode == "wait_n" && succeeded >= required_count {
                break;
            }
        }

        set.abort_all();
        while set.join_next().await.is_some() {}

        env.set("steps", Value::Object(state.steps.clone()));
        state.record_output(env, &node.id, Value::from(succeeded as u64));

        if timed_out && fail_on_timeout {
            return Err(format!("{} timed out waiting for parallel branches", node.id));
        }
        if failure_mode == FailureMode::StopAll && failed {
            return Err(format!("{} failed: a parallel branch failed under failure_mode stop_all", node.id));
        }
        if wait_mode == "wait_n" && succeeded < required_count && !(timed_out && !fail_on_timeout) {
            return Err(format!(
                "{} only {succeeded}/{required_count} required parallel branches succeeded",
                node.id
            ));
        }

        Ok(())
    }

    /// Runs `control_sub_workflow`, recursing into a fresh execution of the
    /// referenced workflow synchronously or detaching it asynchronously.
    async fn run_sub_workflow(
        &self,
        tenant_id: TenantId,
        node: &Node,
        env: &mut Environment,
        state: &mut WalkState,
        cancellation: &Cancellation,
    ) -> Result<(), String> {
        let workflow_id_text = node
            .config
            .get("workflow_id")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{} requires a \"workflow_id\" string", node.id))?;
        let workflow_id = Uuid::parse_str(workflow_id_text)
            .map(WorkflowId::from_uuid)
            .map_err(|error| format!("{} has an invalid workflow_id: {error}", node.id))?;

        let input_mapping = node.config.get("input_mapping").cloned().unwrap_or(Value::Null);
        let trigger_data = render_value_recursive(&input_mapping, env).unwrap_or(input_mapping);

        let workflow = self
            .store
            .get_workflow(tenant_id, workflow_id)
            .await
            .map_err(|error| error.to_string())?;

        let execution = Execution::new_pending(ExecutionInput {
            tenant_id,
            workflow_id,
            workflow_version: workflow.version(),
            trigger_type: "sub_workflow".to_owned(),
            trigger_data,
            parent_execution_id: None,
            parent_depth: 0,
            created_at: Utc::now(),
        })
        .map_err(|error| error.to_string())?;
        self.store.create_execution(execution.clone()).await.map_err(|error| error.to_string())?;

        let is_async = node.config.get("mode").and_then(Value::as_str) == Some("async");
        if is_async {
            let child_id = execution.id();
            let detached = self.clone();
            let detached_cancellation = cancellation.clone();
            tokio::spawn(async move {
                if let Err(error) = detached.run(tenant_id, child_id, detached_cancellation).await {
                    tracing::warn!(%error, execution_id = %child_id, "detached sub-workflow execution failed");
                }
            });
            state.record_output(env, &node.id, serde_json::json!({ "execution_id": child_id.to_string() }));
            return Ok(());
        }

        self.run_boxed(tenant_id, execution.id(), cancellation.clone())
            .await
            .map_err(|error| error.to_string())?;
        let child = self
            .store
            .get_execution(tenant_id, execution.id())
            .await
            .map_err(|error| error.to_string())?;
        state.record_output(env, &node.id, child.output_data().cloned().unwrap_or(Value::Null));
        Ok(())
    }

    /// Runs a `control_try` block: the body named by `try_node_id`, falling
    /// through to `catch_node_id` on failure (binding `error` in the
    /// environment), then always running `finally_node_id` when present.
    async fn run_try_catch_finally(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        definition: &WorkflowDefinition,
        node: &Node,
        env: &mut Environment,
        state: &mut WalkState,
        cancellation: &Cancellation,
    ) -> BlockOutcome {
        let Some(global_order) = topological_order(definition.nodes(), definition.edges()) else {
            return BlockOutcome::Failed("workflow graph contains a cycle".to_owned());
        };

        let try_node_id = node.config.get("try_node_id").and_then(Value::as_str);
        let catch_node_id = node.config.get("catch_node_id").and_then(Value::as_str);
        let finally_node_id = node.config.get("finally_node_id").and_then(Value::as_str);

        let mut boundary: HashSet<String> = HashSet::new();
        if let Some(id) = catch_node_id {
            boundary.insert(id.to_owned());
        }
        if let Some(id) = finally_node_id {
            boundary.insert(id.to_owned());
        }

        let mut try_failure = None;
        if let Some(try_node_id) = try_node_id {
            let body = self.reachable_block(definition, try_node_id, &boundary, &global_order);
            for id in &body {
                state.absorbed.insert(id.clone());
            }
            if let BlockOutcome::Failed(message) = self.walk_nodes_boxed(tenant_id, execution_id, definition, &body, env, state, cancellation).await {
                try_failure = Some(message);
            }
        }

        if let Some(message) = try_failure {
            if let Some(catch_node_id) = catch_node_id {
                let mut catch_boundary: HashSet<String> = HashSet::new();
                if let Some(id) = finally_node_id {
                    catch_boundary.insert(id.to_owned());
                }
                env.set("error", Value::String(message));
                let body = self.reachable_block(definition, catch_node_id, &catch_boundary, &global_order);
                for id in &body {
                    state.absorbed.insert(id.clone());
                }
                if let BlockOutcome::Failed(message) = self.walk_nodes_boxed(tenant_id, execution_id, definition, &body, env, state, cancellation).await {
                    return BlockOutcome::Failed(message);
                }
                env.unset("error");
            }
        }

        if let Some(finally_node_id) = finally_node_id {
            let body = self.reachable_block(definition, finally_node_id, &HashSet::new(), &global_order);
            for id in &body {
                state.absorbed.insert(id.clone());
            }
            if let BlockOutcome::Failed(message) = self.walk_nodes_boxed(tenant_id, execution_id, definition, &body, env, state, cancellation).await {
                return BlockOutcome::Failed(message);
            }
        }

        BlockOutcome::Completed
    }

    /// Runs `control_retry`/`control_circuit_breaker`, wrapping the inner
    /// node named by `inner_node_id` with the matching decorator.
    async fn run_wrapped_node(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        definition: &WorkflowDefinition,
        node: &Node,
        env: &mut Environment,
        state: &mut WalkState,
        cancellation: &Cancellation,
    ) -> Result<(), String> {
        let inner_node_id = node
            .config
            .get("inner_node_id")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{} requires an \"inner_node_id\"", node.id))?;
        let inner = definition
            .node(inner_node_id)
            .ok_or_else(|| format!("{} references unknown node {inner_node_id}", node.id))?;
        let Some(inner_executor) = self.registry.get(inner.kind) else {
            return Err(format!("no handler registered for node kind on node {inner_node_id}"));
        };

        let mut step = StepExecution::start(
            execution_id,
            node.id.clone(),
            node_type_name(node.kind),
            inner.config.clone(),
            Utc::now(),
        );
        if let Err(error) = self.store.create_step_execution(step.clone()).await {
            tracing::warn!(%error, node_id = %node.id, "failed to persist wrapper step start record");
        }
        let ctx = self.node_ctx(tenant_id, execution_id, &node.id, cancellation);

        let mut retries_used = 0_i32;
        let outcome: Result<Value, EngineError> = match node.kind {
            NodeKind::ControlRetry => {
                let config = RetryConfig {
                    max_attempts: node.config.get("max_attempts").and_then(Value::as_u64).unwrap_or(3) as u32,
                    strategy: match node.config.get("strategy").and_then(Value::as_str) {
                        Some("fixed") => RetryStrategy::Fixed,
                        Some("exponential_jitter") => RetryStrategy::ExponentialJitter,
                        _ => RetryStrategy::Exponential,
                    },
                    initial_delay_ms: node.config.get("initial_delay_ms").and_then(Value::as_u64).unwrap_or(200),
                    multiplier: node.config.get("multiplier").and_then(Value::as_f64).unwrap_or(2.0),
                    max_delay_ms: node.config.get("max_delay_ms").and_then(Value::as_u64).unwrap_or(30_000),
                    retryable_errors: node.config.get("retryable_errors").and_then(Value::as_array).map(|values| {
                        values.iter().filter_map(|value| value.as_str().map(str::to_owned)).collect()
                    }),
                    non_retryable_errors: node.config.get("non_retryable_errors").and_then(Value::as_array).map(|values| {
                        values.iter().filter_map(|value| value.as_str().map(str::to_owned)).collect()
                    }),
                    retryable_status_codes: node.config.get("retryable_status_codes").and_then(Value::as_array).map(|values| {
                        values.iter().filter_map(|value| value.as_u64()).map(|code| code as u16).collect()
                    }),
                };
                let (result, attempts_retried) =
                    Retrying::new(SharedExecutor(inner_executor), config).execute_counted(&ctx, &inner.config, env).await;
                retries_used = attempts_retried as i32;
                result
            }
            NodeKind::ControlCircuitBreaker => {
                let name = node.config.get("name").and_then(Value::as_str).unwrap_or(&node.id).to_owned();
                let breaker = {
                    let mut breakers = self.circuit_breakers.lock();
                    Arc::clone(breakers.entry(name).or_insert_with(|| {
                        Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                            failure_threshold: node.config.get("max_failures").and_then(Value::as_u64).unwrap_or(5) as u32,
                            open_timeout: std::time::Duration::from_millis(
                                node.config.get("timeout_ms").and_then(Value::as_u64).unwrap_or(30_000),
                            ),
                            success_threshold: node.config.get("success_threshold").and_then(Value::as_u64).unwrap_or(1) as u32,
                            max_requests: node.config.get("max_requests").and_then(Value::as_u64).unwrap_or(1) as u32,
                        }))
                    }))
                };
                CircuitBroken::with_breaker(SharedExecutor(inner_executor), breaker)
                    .execute(&ctx, &inner.config, env)
                    .await
            }
            _ => unreachable!("run_wrapped_node only handles retry/circuit_breaker kinds"),
        };

        state.absorbed.insert(inner_node_id.to_owned());
        for _ in 0..retries_used {
            step.record_retry();
        }

        match outcome {
            Ok(output) => {
                let _ = step.complete(output.clone(), Utc::now());
                if let Err(error) = self.store.update_step_execution(&step).await {
                    tracing::warn!(%error, node_id = %node.id, "failed to persist wrapper step completion");
                }
                state.record_output(env, &node.id, output);
                Ok(())
            }
            Err(error) => {
                let message = error.to_string();
                let _ = step.fail(message.clone(), Utc::now());
                if let Err(store_error) = self.store.update_step_execution(&step).await {
                    tracing::warn!(%store_error, node_id = %node.id, "failed to persist wrapper step failure");
                }
                Err(message)
            }
        }
    }
}

/// Thin `NodeExecutor` forwarding to a dynamically dispatched handler, so
/// retry/circuit-breaker decorators (generic over `N: NodeExecutor`) can
/// wrap a registry lookup (`Arc<dyn NodeExecutor>`).
struct SharedExecutor(Arc<dyn NodeExecutor>);

#[async_trait::async_trait]
impl NodeExecutor for SharedExecutor {
    async fn execute(&self, ctx: &NodeContext, config: &Value, env: &Environment) -> Result<Value, EngineError> {
        self.0.execute(ctx, config, env).await
    }
}

/// Stateless collaborator set a spawned parallel/fork branch runs with.
/// Branches dispatch only leaf nodes, so this carries no circuit-breaker
/// registry or control-flow bookkeeping, unlike the owning [`Executor`].
struct ExecutorHandles {
    store: Arc<dyn Store>,
    registry: NodeRegistry,
    evaluator: Arc<Evaluator>,
    http_client: reqwest::Client,
}

impl ExecutorHandles {
    fn node_ctx(&self, tenant_id: TenantId, execution_id: ExecutionId, node_id: &str, cancellation: &Cancellation) -> NodeContext {
        NodeContext {
            tenant_id,
            execution_id,
            node_id: node_id.to_owned(),
            evaluator: Arc::clone(&self.evaluator),
            http_client: self.http_client.clone(),
            cancellation: cancellation.clone(),
        }
    }

    /// Runs a dispatched parallel/fork branch's leaf nodes sequentially,
    /// returning the `steps.<node_id>` outputs it produced. Nested
    /// control-flow nodes (loop/if/parallel) within a branch are not
    /// supported; such graphs should avoid nesting inside a branch.
    async fn run_branch(
        &self,
        tenant_id: TenantId,
        execution_id: ExecutionId,
        definition: &WorkflowDefinition,
        node_ids: &[String],
        mut env: Environment,
        cancellation: &Cancellation,
    ) -> AppResult<Map<String, Value>> {
        let mut produced = Map::new();
        for node_id in node_ids {
            if cancellation.is_cancelled() {
                return Err(orbitflow_core::AppError::Internal("branch cancelled".to_owned()));
            }
            let Some(node) = definition.node(node_id) else { continue };
            let Some(executor) = self.registry.get(node.kind) else { continue };

            let mut step = StepExecution::start(
                execution_id,
                node.id.clone(),
                node_type_name(node.kind),
                node.config.clone(),
                Utc::now(),
            );
            let ctx = self.node_ctx(tenant_id, execution_id, node_id, cancellation);
            match executor.execute(&ctx, &node.config, &env).await {
                Ok(output) => {
                    let _ = step.complete(output.clone(), Utc::now());
                    let _ = self.store.create_step_execution(step).await;
                    produced.insert(node_id.clone(), output.clone());
                    env.set("steps", Value::Object(produced.clone()));
                }
                Err(error) => {
                    let message = error.to_string();
                    let _ = step.fail(message.clone(), Utc::now());
                    let _ = self.store.create_step_execution(step).await;
                    return Err(orbitflow_core::AppError::Internal(message));
                }
            }
        }
        Ok(produced)
    }
}
