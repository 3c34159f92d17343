//! Step executor
//!
//! Handles execution of individual steps, parallel blocks, loops, and conditionals.

use super::{PausedRun, StepContext};
use crate::adapter::{Adapter, AdapterRegistry};
use crate::dsl::{DependencyAnalyzer, Templater};
use crate::event::EventBus;
use crate::registry::RegistryManager;
use crate::storage::Storage;
use crate::{BeemFlowError, Flow, Result, Step};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Step executor
pub struct Executor {
    adapters: Arc<AdapterRegistry>,
    templater: Arc<Templater>,
    event_bus: Arc<dyn EventBus>,
    storage: Arc<dyn Storage>,
    registry_manager: Arc<RegistryManager>,
}

impl Executor {
    /// Create a new executor
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        templater: Arc<Templater>,
        event_bus: Arc<dyn EventBus>,
        storage: Arc<dyn Storage>,
        registry_manager: Arc<RegistryManager>,
    ) -> Self {
        Self {
            adapters,
            templater,
            event_bus,
            storage,
            registry_manager,
        }
    }

    /// Execute steps starting from a given index
    ///
    /// Steps are executed in dependency order (topological sort), not YAML order.
    /// Dependencies are detected from:
    /// 1. Template references: `{{ steps.foo.output }}`
    /// 2. Manual `depends_on` fields
    pub async fn execute_steps(
        &self,
        flow: &Flow,
        step_ctx: &StepContext,
        start_idx: usize,
        run_id: Uuid,
    ) -> Result<HashMap<String, Value>> {
        // Pre-fetch previous run data for template access
        // This enables templates to use {{ runs.previous.outputs.step_name }}
        let runs_data = self.fetch_previous_run_data(&flow.name, run_id).await;
        if let Some(ref prev_data) = runs_data {
            // Store in step context for template rendering
            // Templates can access via {{ runs.previous.outputs.step1 }}
            step_ctx.set_var(
                "runs".to_string(),
                serde_json::to_value(serde_json::json!({"previous": prev_data}))
                    .unwrap_or(Value::Null),
            );
        }

        // Use dependency analyzer to determine execution order
        let analyzer = DependencyAnalyzer::new();
        let sorted_ids = analyzer.topological_sort(flow)?;

        // Create lookup map for steps
        let step_map: HashMap<String, &Step> = flow
            .steps
            .iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        // Determine which step to start from
        // For fresh runs (start_idx=0), execute all steps in sorted order
        // For resumed runs, find the resume point in sorted order
        let sorted_start_idx = if start_idx == 0 {
            // Fresh run - start from beginning of sorted list
            0
        } else if start_idx < flow.steps.len() {
            // Resumed run - find the step to resume from in sorted order
            let start_step_id = &flow.steps[start_idx].id;
            sorted_ids
                .iter()
                .position(|id| id == start_step_id)
                .unwrap_or(0)
        } else {
            return Ok(step_ctx.snapshot().outputs);
        };

        // Execute steps in dependency order (starting from start_idx)
        for step_id in sorted_ids.iter().skip(sorted_start_idx) {
            let step = step_map
                .get(step_id)
                .ok_or_else(|| BeemFlowError::adapter(format!("step not found: {}", step_id)))?;

            // Handle await_event steps
            if step.await_event.is_some() {
                // Find original index for await_event handling
                let idx = flow.steps.iter().position(|s| &s.id == step_id).unwrap();
                return self
                    .handle_await_event(step, flow, step_ctx, idx, run_id)
                    .await;
            }

            // Execute regular step
            self.execute_single_step(step, step_ctx, &step.id).await?;

            // Persist step result
            self.persist_step_result(step, step_ctx, run_id).await?;
        }

        Ok(step_ctx.snapshot().outputs)
    }

    /// Fetch previous run data for template access
    async fn fetch_previous_run_data(
        &self,
        flow_name: &str,
        current_run_id: Uuid,
    ) -> Option<HashMap<String, Value>> {
        let runs_access = super::RunsAccess::new(
            self.storage.clone(),
            Some(current_run_id),
            flow_name.to_string(),
        );

        let prev_data = runs_access.previous().await;
        (!prev_data.is_empty()).then_some(prev_data)
    }

    /// Execute a step (public interface with boxing to avoid recursion issues)
    pub fn execute_step<'a>(
        &'a self,
        step: &'a Step,
        step_ctx: &'a StepContext,
        step_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.execute_single_step(step, step_ctx, step_id).await })
    }

    /// Execute a single step (boxed to handle recursion)
    pub fn execute_single_step<'a>(
        &'a self,
        step: &'a Step,
        step_ctx: &'a StepContext,
        step_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            // Check condition first
            if let Some(ref condition) = step.if_
                && !self.evaluate_condition(condition, step_ctx).await?
            {
                tracing::debug!(
                    "Skipping step {} - condition not met: {}",
                    step_id,
                    condition
                );
                return Ok(());
            }

            // Handle different step types
            if step.parallel == Some(true) && step.steps.is_some() {
                return self.execute_parallel_block(step, step_ctx, step_id).await;
            }

            if step.foreach.is_some() {
                return self.execute_foreach_block(step, step_ctx, step_id).await;
            }

            if step.wait.is_some() {
                return self.execute_wait(step).await;
            }

            if let Some(ref use_) = step.use_ {
                return self.execute_tool_call(use_, step, step_ctx, step_id).await;
            }

            Ok(())
        })
    }

    /// Execute a parallel block
    pub async fn execute_parallel_block(
        &self,
        step: &Step,
        step_ctx: &StepContext,
        step_id: &str,
    ) -> Result<()> {
        let steps = step
            .steps
            .as_ref()
            .ok_or_else(|| BeemFlowError::validation("parallel block must have steps"))?;

        let mut handles = Vec::new();

        for child_step in steps {
            let child = child_step.clone();
            let ctx = step_ctx.clone();
            let adapters = self.adapters.clone();
            let templater = self.templater.clone();
            let storage = self.storage.clone();
            let registry_manager = self.registry_manager.clone();

            let handle = tokio::spawn(async move {
                // Execute tool call directly for parallel steps (no nesting)
                if let Some(ref use_) = child.use_ {
                    let adapter =
                        Self::resolve_adapter_static(&adapters, &registry_manager, use_).await?;
                    let mut inputs = Self::prepare_inputs_static(&templater, &child, &ctx)?;

                    // Add special __use parameter for core and MCP tools
                    if use_.starts_with(crate::constants::ADAPTER_PREFIX_CORE)
                        || use_.starts_with(crate::constants::ADAPTER_PREFIX_MCP)
                    {
                        inputs.insert(
                            crate::constants::PARAM_SPECIAL_USE.to_string(),
                            Value::String(use_.to_string()),
                        );
                    }

                    let exec_ctx = crate::adapter::ExecutionContext::new(storage);
                    let outputs = adapter.execute(inputs, &exec_ctx).await?;
                    ctx.set_output(child.id.clone(), serde_json::to_value(outputs)?);
                }
                Ok::<_, BeemFlowError>((child.id.clone(), ctx.get_output(&child.id)))
            });

            handles.push(handle);
        }

        // Wait for all tasks to complete
        let mut outputs = HashMap::new();
        for handle in handles {
            let (child_id, output) = handle
                .await
                .map_err(|e| BeemFlowError::adapter(format!("parallel task failed: {}", e)))??;
            if let Some(output_val) = output {
                outputs.insert(child_id, output_val);
            }
        }

        step_ctx.set_output(step_id.to_string(), serde_json::to_value(outputs)?);
        Ok(())
    }

    /// Execute a foreach block
    pub async fn execute_foreach_block(
        &self,
        step: &Step,
        step_ctx: &StepContext,
        step_id: &str,
    ) -> Result<()> {
        // Extract required fields or return validation error
        let (foreach_expr, as_var, do_steps) = match (&step.foreach, &step.as_, &step.do_) {
            (Some(expr), Some(var), Some(steps)) => (expr, var, steps),
            (None, _, _) => return Err(BeemFlowError::validation("foreach expression missing")),
            (_, None, _) => return Err(BeemFlowError::validation("foreach must have 'as' field")),
            (_, _, None) => return Err(BeemFlowError::validation("foreach must have 'do' field")),
        };

        // Evaluate foreach expression
        let template_data = step_ctx.template_data();
        let list_val = self
            .templater
            .evaluate_expression(foreach_expr, &template_data)?;

        // Convert to array
        let list = list_val.as_array().ok_or_else(|| {
            BeemFlowError::validation(format!(
                "foreach expression did not evaluate to array: {:?}",
                list_val
            ))
        })?;

        if list.is_empty() {
            step_ctx.set_output(step_id.to_string(), Value::Object(serde_json::Map::new()));
            return Ok(());
        }

        // Execute in parallel or sequential
        if step.parallel == Some(true) {
            self.execute_foreach_parallel(list, as_var, do_steps, step_ctx)
                .await?;
        } else {
            self.execute_foreach_sequential(list, as_var, do_steps, step_ctx)
                .await?;
        }

        step_ctx.set_output(step_id.to_string(), Value::Object(serde_json::Map::new()));
        Ok(())
    }

    /// Execute foreach sequentially
    async fn execute_foreach_sequential(
        &self,
        list: &[Value],
        as_var: &str,
        do_steps: &[Step],
        step_ctx: &StepContext,
    ) -> Result<()> {
        for (index, item) in list.iter().enumerate() {
            // Set loop variables
            step_ctx.set_var(as_var.to_string(), item.clone());
            step_ctx.set_var(format!("{}_index", as_var), Value::Number(index.into()));
            step_ctx.set_var(format!("{}_row", as_var), Value::Number((index + 1).into()));

            // Execute all steps for this iteration
            for inner_step in do_steps {
                // Render step ID
                let template_data = step_ctx.template_data();
                let rendered_id = self
                    .render_value(&Value::String(inner_step.id.clone()), &template_data)?
                    .as_str()
                    .unwrap_or(&inner_step.id)
                    .to_string();

                self.execute_single_step(inner_step, step_ctx, &rendered_id)
                    .await?;
            }
        }

        Ok(())
    }

    /// Execute foreach in parallel
    async fn execute_foreach_parallel(
        &self,
        list: &[Value],
        as_var: &str,
        do_steps: &[Step],
        step_ctx: &StepContext,
    ) -> Result<()> {
        let mut handles = Vec::new();

        for (index, item) in list.iter().enumerate() {
            let item = item.clone();
            let as_var = as_var.to_string();
            let do_steps = do_steps.to_vec();
            let snapshot = step_ctx.snapshot();
            let adapters = self.adapters.clone();
            let templater = self.templater.clone();
            let storage = self.storage.clone();
            let registry_manager = self.registry_manager.clone();

            let handle = tokio::spawn(async move {
                // Create iteration context
                let iter_ctx = StepContext::new(snapshot.event, snapshot.vars, snapshot.secrets);

                // Copy existing outputs using iterator
                snapshot
                    .outputs
                    .into_iter()
                    .for_each(|(k, v)| iter_ctx.set_output(k, v));

                // Set loop variables
                iter_ctx.set_var(as_var.clone(), item);
                iter_ctx.set_var(format!("{}_index", as_var), Value::Number(index.into()));
                iter_ctx.set_var(format!("{}_row", as_var), Value::Number((index + 1).into()));

                // Execute steps - simple tool calls only in parallel foreach
                for inner_step in &do_steps {
                    if let Some(ref use_) = inner_step.use_ {
                        let adapter =
                            Self::resolve_adapter_static(&adapters, &registry_manager, use_)
                                .await?;
                        let mut inputs =
                            Self::prepare_inputs_static(&templater, inner_step, &iter_ctx)?;

                        // Add special __use parameter for core and MCP tools
                        if use_.starts_with(crate::constants::ADAPTER_PREFIX_CORE)
                            || use_.starts_with(crate::constants::ADAPTER_PREFIX_MCP)
                        {
                            inputs.insert(
                                crate::constants::PARAM_SPECIAL_USE.to_string(),
                                Value::String(use_.to_string()),
                            );
                        }

                        let exec_ctx = crate::adapter::ExecutionContext::new(storage.clone());
                        let outputs = adapter.execute(inputs, &exec_ctx).await?;
                        iter_ctx.set_output(inner_step.id.clone(), serde_json::to_value(outputs)?);
                    }
                }

                Ok::<_, BeemFlowError>(iter_ctx.snapshot())
            });

            handles.push(handle);
        }

        // Wait for all iterations
        for handle in handles {
            let snapshot = handle.await.map_err(|e| {
                BeemFlowError::adapter(format!("foreach parallel task failed: {}", e))
            })??;

            // Merge outputs back to main context using iterator
            snapshot
                .outputs
                .into_iter()
                .for_each(|(k, v)| step_ctx.set_output(k, v));
        }

        Ok(())
    }

    /// Execute a tool call
    async fn execute_tool_call(
        &self,
        use_: &str,
        step: &Step,
        step_ctx: &StepContext,
        step_id: &str,
    ) -> Result<()> {
        // Resolve adapter
        let adapter = self.resolve_adapter(use_).await?;

        // Prepare inputs
        let mut inputs = self.prepare_inputs(step, step_ctx).await?;

        // Add special __use parameter for core and MCP tools
        if use_.starts_with(crate::constants::ADAPTER_PREFIX_CORE)
            || use_.starts_with(crate::constants::ADAPTER_PREFIX_MCP)
        {
            inputs.insert(
                crate::constants::PARAM_SPECIAL_USE.to_string(),
                Value::String(use_.to_string()),
            );
        }

        let exec_ctx = crate::adapter::ExecutionContext::new(self.storage.clone());

        // Execute with retry if configured
        let outputs = if let Some(ref retry) = step.retry {
            self.execute_with_retry(&adapter, inputs, retry, &exec_ctx)
                .await?
        } else {
            adapter.execute(inputs, &exec_ctx).await?
        };

        // Store outputs
        step_ctx.set_output(step_id.to_string(), serde_json::to_value(outputs)?);

        Ok(())
    }

    /// Execute with retry logic and exponential backoff
    async fn execute_with_retry(
        &self,
        adapter: &Arc<dyn Adapter>,
        inputs: HashMap<String, Value>,
        retry: &crate::model::RetrySpec,
        ctx: &crate::adapter::ExecutionContext,
    ) -> Result<HashMap<String, Value>> {
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < retry.attempts {
            match adapter.execute(inputs.clone(), ctx).await {
                Ok(outputs) => {
                    if attempts > 0 {
                        tracing::info!(
                            "Step succeeded on attempt {} after {} retries",
                            attempts + 1,
                            attempts
                        );
                    }
                    return Ok(outputs);
                }
                Err(e) => {
                    attempts += 1;
                    last_error = Some(e);

                    if attempts < retry.attempts {
                        let delay = self.calculate_retry_delay(attempts, retry.delay_sec);
                        tracing::debug!(
                            "Retrying step in {} seconds (attempt {} of {})",
                            delay,
                            attempts + 1,
                            retry.attempts
                        );
                        tokio::time::sleep(tokio::time::Duration::from_secs(delay)).await;
                    }
                }
            }
        }

        tracing::error!("Step failed after {} attempts", retry.attempts);
        Err(last_error.unwrap_or_else(|| BeemFlowError::adapter("retry failed")))
    }

    /// Calculate retry delay with exponential backoff
    fn calculate_retry_delay(&self, attempt: u32, base_delay: u64) -> u64 {
        // Exponential backoff: base_delay * 2^(attempt-1)
        // For attempt 1: base_delay * 1
        // For attempt 2: base_delay * 2
        // For attempt 3: base_delay * 4
        // etc.
        // Cap at 5 minutes maximum
        let delay = base_delay * (2_u64.pow(attempt - 1));
        delay.min(300) // Max 5 minutes
    }

    /// Execute a wait step
    pub async fn execute_wait(&self, step: &Step) -> Result<()> {
        if let Some(ref wait) = step.wait
            && let Some(seconds) = wait.seconds
        {
            tokio::time::sleep(tokio::time::Duration::from_secs(seconds)).await;
        }
        Ok(())
    }

    /// Handle await_event step
    async fn handle_await_event(
        &self,
        step: &Step,
        flow: &Flow,
        step_ctx: &StepContext,
        step_idx: usize,
        run_id: Uuid,
    ) -> Result<HashMap<String, Value>> {
        let await_spec = step
            .await_event
            .as_ref()
            .ok_or_else(|| BeemFlowError::validation("missing await_event specification"))?;

        // Extract and render token, falling back to a generated one when `match.token`
        // is absent so a step can always be resumed.
        let token = match await_spec.match_.get(crate::constants::MATCH_KEY_TOKEN) {
            Some(token_val) => {
                let template_data = step_ctx.template_data();
                let rendered_token = self.render_value(token_val, &template_data)?;
                let token = rendered_token
                    .as_str()
                    .ok_or_else(|| BeemFlowError::validation("token must be a string"))?
                    .to_string();

                if token.trim().is_empty() {
                    return Err(BeemFlowError::validation(
                        "await_event token cannot be empty",
                    ));
                }
                token
            }
            None => Uuid::new_v4().to_string(),
        };

        // Set up event subscription with proper event matching, resuming the run directly
        // once a matching event arrives instead of relying on anyone else listening in.
        let token_owned = token.clone();
        let match_criteria = await_spec.match_.clone();
        let adapters = self.adapters.clone();
        let templater = self.templater.clone();
        let event_bus_ref = self.event_bus.clone();
        let storage = self.storage.clone();
        let registry_manager = self.registry_manager.clone();

        let subscription_id = self
            .event_bus
            .subscribe(
                &await_spec.source,
                Arc::new(move |payload| {
                    // Check if this event matches our criteria
                    if Self::matches_event_criteria(&payload, &match_criteria) {
                        tracing::info!("Resume event matched for token: {}", token_owned);

                        let resume_event: HashMap<String, Value> = payload
                            .as_object()
                            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                            .unwrap_or_default();

                        let executor = Executor::new(
                            adapters.clone(),
                            templater.clone(),
                            event_bus_ref.clone(),
                            storage.clone(),
                            registry_manager.clone(),
                        );
                        let token_for_spawn = token_owned.clone();
                        tokio::spawn(async move {
                            if let Err(e) = executor.resume(&token_for_spawn, resume_event).await {
                                tracing::error!(
                                    "Failed to resume run for token {}: {}",
                                    token_for_spawn,
                                    e
                                );
                            }
                        });
                    }
                }),
            )
            .await?;

        // Create paused run, now that we have the subscription id to clean up on resume/timeout.
        let paused = PausedRun {
            flow: flow.clone(),
            step_idx,
            context: step_ctx.clone(),
            outputs: step_ctx.snapshot().outputs,
            token: token.clone(),
            run_id,
            subscription_id,
        };

        // Store paused run in storage (no in-memory cache)
        let paused_value = serde_json::to_value(&paused)?;
        self.storage.save_paused_run(&token, paused_value).await?;

        // Handle timeout if specified: fail the paused run for real instead of just logging.
        if let Some(ref timeout) = await_spec.timeout {
            let timeout_duration = self.parse_timeout(timeout)?;
            let timeout_token = token.clone();
            let adapters = self.adapters.clone();
            let templater = self.templater.clone();
            let event_bus = self.event_bus.clone();
            let storage = self.storage.clone();
            let registry_manager = self.registry_manager.clone();

            tokio::spawn(async move {
                tokio::time::sleep(timeout_duration).await;
                tracing::warn!("Timeout reached for await_event token: {}", timeout_token);

                let executor =
                    Executor::new(adapters, templater, event_bus, storage, registry_manager);
                if let Err(e) = executor.timeout_paused_run(&timeout_token).await {
                    tracing::error!(
                        "Failed to time out paused run for token {}: {}",
                        timeout_token,
                        e
                    );
                }
            });
        }

        Err(BeemFlowError::AwaitEventPause(format!(
            "step '{}' is waiting for event",
            step.id
        )))
    }

    /// Resume a paused run identified by `token`, continuing execution after the
    /// `await_event` step that paused it.
    pub async fn resume(
        &self,
        token: &str,
        resume_event: HashMap<String, Value>,
    ) -> Result<()> {
        tracing::debug!(
            "Resume called for token {} with event: {:?}",
            token,
            resume_event
        );

        let paused_json = self
            .storage
            .fetch_and_delete_paused_run(token)
            .await?
            .ok_or_else(|| {
                BeemFlowError::config(format!("No paused run found for token: {}", token))
            })?;

        let paused: PausedRun = serde_json::from_value(paused_json)?;

        tracing::debug!(
            "Cleaning up subscription {} for resumed token: {}",
            paused.subscription_id,
            token
        );
        if let Err(e) = self
            .event_bus
            .unsubscribe_by_id(paused.subscription_id)
            .await
        {
            tracing::error!("Failed to cleanup subscription on resume: {}", e);
        }

        // Merge resume event with existing event data and create new context
        let snapshot = paused.context.snapshot();
        let mut merged_event = snapshot.event;
        merged_event.extend(resume_event);

        let updated_ctx = StepContext::new(merged_event, snapshot.vars, snapshot.secrets);

        // Restore previous outputs
        for (k, v) in snapshot.outputs {
            updated_ctx.set_output(k, v);
        }

        let result = self
            .execute_steps(
                &paused.flow,
                &updated_ctx,
                paused.step_idx + 1,
                paused.run_id,
            )
            .await;

        self.finalize_resumed_run(&paused.flow, paused.run_id, result)
            .await
    }

    /// Fail a still-paused run because its `await_event` timeout elapsed. No-op if
    /// the run has already been resumed (the paused-run entry will be gone).
    pub async fn timeout_paused_run(&self, token: &str) -> Result<()> {
        let Some(paused_json) = self.storage.fetch_and_delete_paused_run(token).await? else {
            return Ok(());
        };

        let paused: PausedRun = serde_json::from_value(paused_json)?;

        if let Err(e) = self
            .event_bus
            .unsubscribe_by_id(paused.subscription_id)
            .await
        {
            tracing::error!("Failed to cleanup subscription on timeout: {}", e);
        }

        let err = BeemFlowError::timeout(format!(
            "step '{}' timed out waiting for event",
            paused.token
        ));
        self.finalize_resumed_run(&paused.flow, paused.run_id, Err(err))
            .await
    }

    /// Persist the final status of a resumed (or timed-out) run and execute catch
    /// blocks on failure, mirroring what `Engine::execute` does for a fresh run.
    async fn finalize_resumed_run(
        &self,
        flow: &Flow,
        run_id: Uuid,
        result: Result<HashMap<String, Value>>,
    ) -> Result<()> {
        let status = match &result {
            Ok(_) => crate::model::RunStatus::Succeeded,
            Err(_) => crate::model::RunStatus::Failed,
        };

        if let Ok(Some(mut run)) = self.storage.get_run(run_id).await {
            run.status = status;
            run.ended_at = Some(chrono::Utc::now());
            if let Err(e) = self.storage.save_run(&run).await {
                tracing::error!("Failed to save run {} after resume: {}", run_id, e);
            }
        }

        if result.is_err() && flow.catch.is_some() {
            let event = HashMap::new();
            if let Err(e) = self.run_catch_blocks(flow, &event, run_id).await {
                tracing::error!("Catch blocks failed for run {}: {}", run_id, e);
            }
        }

        result.map(|_| ())
    }

    /// Execute a flow's `catch` steps, recording each as a `StepRun` on the run.
    pub async fn run_catch_blocks(
        &self,
        flow: &Flow,
        event: &HashMap<String, Value>,
        run_id: Uuid,
    ) -> Result<HashMap<String, Value>> {
        let catch_steps = flow
            .catch
            .as_ref()
            .ok_or_else(|| BeemFlowError::validation("no catch blocks defined"))?;

        let step_ctx = StepContext::new(event.clone(), flow.vars.clone().unwrap_or_default(), HashMap::new());

        let mut catch_outputs = HashMap::new();
        let mut step_records = Vec::new();

        for step in catch_steps {
            let step_start = chrono::Utc::now();

            match self
                .execute_single_step(step, &step_ctx, &step.id)
                .await
            {
                Ok(_) => {
                    let output = step_ctx.get_output(&step.id);
                    if let Some(ref output_value) = output {
                        catch_outputs.insert(step.id.to_string(), output_value.clone());
                    }

                    step_records.push(crate::model::StepRun {
                        id: Uuid::new_v4(),
                        run_id,
                        step_name: step.id.clone(),
                        status: crate::model::StepStatus::Succeeded,
                        started_at: step_start,
                        ended_at: Some(chrono::Utc::now()),
                        error: None,
                        outputs: output.and_then(|v| {
                            if let Value::Object(map) = v {
                                Some(map.into_iter().collect())
                            } else {
                                None
                            }
                        }),
                    });
                }
                Err(e) => {
                    tracing::error!("Catch block step {} failed: {}", step.id, e);

                    step_records.push(crate::model::StepRun {
                        id: Uuid::new_v4(),
                        run_id,
                        step_name: step.id.clone(),
                        status: crate::model::StepStatus::Failed,
                        started_at: step_start,
                        ended_at: Some(chrono::Utc::now()),
                        error: Some(e.to_string()),
                        outputs: None,
                    });
                }
            }
        }

        if !step_records.is_empty() {
            if let Ok(Some(mut run)) = self.storage.get_run(run_id).await {
                run.steps = Some(step_records);
                if let Err(e) = self.storage.save_run(&run).await {
                    tracing::error!("Failed to save catch block outputs to run: {}", e);
                }
            } else {
                tracing::warn!("Could not fetch run {} to save catch block outputs", run_id);
            }
        }

        Ok(catch_outputs)
    }

    /// Check if an event payload matches the specified criteria
    fn matches_event_criteria(
        payload: &serde_json::Value,
        criteria: &HashMap<String, serde_json::Value>,
    ) -> bool {
        criteria
            .iter()
            .filter(|(key, _)| *key != crate::constants::MATCH_KEY_TOKEN)
            .all(|(key, expected)| payload.get(key) == Some(expected))
    }

    /// Parse timeout string into Duration
    fn parse_timeout(&self, timeout: &str) -> Result<std::time::Duration> {
        // Simple timeout parsing - supports formats like "30s", "5m", "1h"
        let timeout_str = timeout.trim();

        let (value_str, multiplier) = if let Some(s) = timeout_str.strip_suffix('s') {
            (s, 1)
        } else if let Some(m) = timeout_str.strip_suffix('m') {
            (m, 60)
        } else if let Some(h) = timeout_str.strip_suffix('h') {
            (h, 3600)
        } else {
            return Err(BeemFlowError::validation(format!(
                "Unsupported timeout format: {}. Use '30s', '5m', or '1h'",
                timeout
            )));
        };

        value_str
            .parse::<u64>()
            .map(|v| std::time::Duration::from_secs(v * multiplier))
            .map_err(|_| BeemFlowError::validation(format!("Invalid timeout format: {}", timeout)))
    }

    /// Evaluate a conditional expression
    pub async fn evaluate_condition(
        &self,
        condition: &str,
        step_ctx: &StepContext,
    ) -> Result<bool> {
        // Condition must be in {{ }} format
        let trimmed = condition.trim();
        if !trimmed.starts_with("{{") || !trimmed.ends_with("}}") {
            return Err(BeemFlowError::validation(format!(
                "condition must use template syntax: {{{{ expression }}}}, got: {}",
                condition
            )));
        }

        // Use templater's evaluate_expression to get the actual value
        let template_data = step_ctx.template_data();
        let value = self
            .templater
            .evaluate_expression(condition, &template_data)?;

        // Check if it's a boolean
        if let Some(b) = value.as_bool() {
            return Ok(b);
        }

        // If it's a string that looks like a boolean
        if let Some(s) = value.as_str() {
            match s.to_lowercase().as_str() {
                "true" => return Ok(true),
                "false" => return Ok(false),
                _ => {}
            }
        }

        // For numbers, non-zero is truthy
        if let Some(n) = value.as_f64() {
            return Ok(n != 0.0);
        }

        // For arrays/objects, non-empty is truthy
        if value.is_array() {
            return Ok(!value.as_array().map(|a| a.is_empty()).unwrap_or(true));
        }
        if value.is_object() {
            return Ok(!value.as_object().map(|o| o.is_empty()).unwrap_or(true));
        }

        // Null is falsy
        Ok(!value.is_null())
    }

    /// Resolve adapter for a tool
    async fn resolve_adapter(&self, tool_name: &str) -> Result<Arc<dyn Adapter>> {
        Self::resolve_adapter_static(&self.adapters, &self.registry_manager, tool_name).await
    }

    /// Static helper to resolve adapter. Checks adapters already registered
    /// in-process first, then the `mcp.`/`core.` prefixes, then asks the
    /// registry manager (local/remote/federated sources plus the embedded
    /// default registry) for a manifest to build an HTTP adapter from, and
    /// only falls back to the manifestless HTTP adapter if nothing matched.
    async fn resolve_adapter_static(
        adapters: &Arc<AdapterRegistry>,
        registry_manager: &Arc<RegistryManager>,
        tool_name: &str,
    ) -> Result<Arc<dyn Adapter>> {
        // Try exact match first
        if let Some(adapter) = adapters.get(tool_name) {
            return Ok(adapter);
        }

        // Try by prefix
        if tool_name.starts_with(crate::constants::ADAPTER_PREFIX_MCP) {
            if let Some(adapter) = adapters.get(crate::constants::ADAPTER_ID_MCP) {
                return Ok(adapter);
            }
            return Err(BeemFlowError::adapter("MCP adapter not registered"));
        }

        if tool_name.starts_with(crate::constants::ADAPTER_PREFIX_CORE) {
            if let Some(adapter) = adapters.get(crate::constants::ADAPTER_ID_CORE) {
                return Ok(adapter);
            }
            return Err(BeemFlowError::adapter("Core adapter not registered"));
        }

        // Not a pre-baked adapter: ask the registry manager (local, remote,
        // federated, or the embedded default registry) for a tool manifest
        // and register it as an HTTP adapter so it's cached for next time.
        if let Ok(Some(entry)) = registry_manager.get_server(tool_name).await
            && entry.entry_type == "tool"
        {
            let manifest = crate::adapter::ToolManifest {
                name: entry.name.clone(),
                description: entry.description.clone().unwrap_or_default(),
                kind: entry.kind.unwrap_or_else(|| "task".to_string()),
                version: entry.version,
                parameters: entry.parameters.unwrap_or_default(),
                endpoint: entry.endpoint,
                method: entry.method,
                headers: entry.headers,
            };

            let adapter: Arc<dyn Adapter> = Arc::new(crate::adapter::HttpAdapter::new(
                entry.name.clone(),
                Some(manifest),
            ));
            adapters.register(adapter.clone());
            return Ok(adapter);
        }

        // Fallback to HTTP adapter for registry tools (e.g., http.fetch, openai.chat_completion)
        // This matches Go implementation where registry tools default to HTTP adapter
        if let Some(adapter) = adapters.get(crate::constants::HTTP_ADAPTER_ID) {
            return Ok(adapter);
        }

        Err(BeemFlowError::adapter(format!(
            "adapter not found: {} (and HTTP adapter not available)",
            tool_name
        )))
    }

    /// Prepare inputs for tool execution
    async fn prepare_inputs(
        &self,
        step: &Step,
        step_ctx: &StepContext,
    ) -> Result<HashMap<String, Value>> {
        Self::prepare_inputs_static(&self.templater, step, step_ctx)
    }

    /// Static helper to prepare inputs
    fn prepare_inputs_static(
        templater: &Arc<Templater>,
        step: &Step,
        step_ctx: &StepContext,
    ) -> Result<HashMap<String, Value>> {
        let template_data = step_ctx.template_data();

        step.with.as_ref().map_or_else(
            || Ok(HashMap::new()),
            |with| {
                with.iter()
                    .map(|(k, v)| {
                        Self::render_value_static(templater, v, &template_data)
                            .map(|rendered| (k.clone(), rendered))
                    })
                    .collect()
            },
        )
    }

    /// Render a value recursively
    fn render_value(&self, val: &Value, data: &HashMap<String, Value>) -> Result<Value> {
        Self::render_value_static(&self.templater, val, data)
    }

    /// Static helper to render value
    fn render_value_static(
        templater: &Arc<Templater>,
        val: &Value,
        data: &HashMap<String, Value>,
    ) -> Result<Value> {
        match val {
            Value::String(s) => templater.render(s, data).map(Value::String),
            Value::Array(arr) => arr
                .iter()
                .map(|elem| Self::render_value_static(templater, elem, data))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(obj) => obj
                .iter()
                .map(|(k, v)| {
                    Self::render_value_static(templater, v, data)
                        .map(|rendered| (k.clone(), rendered))
                })
                .collect::<Result<serde_json::Map<String, Value>>>()
                .map(Value::Object),
            _ => Ok(val.clone()),
        }
    }

    /// Persist step result to storage
    async fn persist_step_result(
        &self,
        step: &Step,
        step_ctx: &StepContext,
        run_id: Uuid,
    ) -> Result<()> {
        let outputs = step_ctx
            .get_output(&step.id)
            .and_then(|v| serde_json::from_value::<HashMap<String, Value>>(v).ok());

        let step_run = crate::model::StepRun {
            id: Uuid::new_v4(),
            run_id,
            step_name: step.id.clone(),
            status: crate::model::StepStatus::Succeeded,
            started_at: chrono::Utc::now(),
            ended_at: Some(chrono::Utc::now()),
            error: None,
            outputs,
        };

        self.storage.save_step(&step_run).await?;
        Ok(())
    }
}
