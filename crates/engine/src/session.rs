//! The explicit per-session context.
//!
//! A [`Session`] owns the one script engine, the operation queue and result
//! store (through the shared host state), the workflow engine, the active
//! form, and the navigation history. The widget registry is built once and
//! injected. All methods take `&self`/`&mut self`, so actions can never
//! interleave.

use std::{cell::RefCell, fmt, rc::Rc, sync::Arc};

use capsule_registry::{BuiltTree, FailurePolicy, WidgetRegistry, WidgetTreeBuilder, resolve_type_name};
use capsule_types::{
    DeclarativeNode, EntitySchema, OperationId, OperationResult, RuleSet, SchemaBundle, Value, ValueMap, WidgetNode,
};
use capsule_util::{AssetBundle, DrainMode, LogRecord, RuntimeConfig, ScriptLimits, init_tracing, load_asset_dir};
use tracing::{debug, info, warn};

use crate::{
    errors::RuntimeError,
    forms::{FormState, RuleReport, evaluate_rules, evaluate_visibility, merged_values},
    operations::{StorageBackend, drain_batch},
    script::{HostState, ScriptBridge, SharedHost},
    workflow::WorkflowEngine,
};

/// Knobs applied when a session is bootstrapped.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub drain_mode: DrainMode,
    pub log_buffer_capacity: usize,
    pub script_limits: ScriptLimits,
    pub failure_policy: FailurePolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            drain_mode: DrainMode::default(),
            log_buffer_capacity: 500,
            script_limits: ScriptLimits::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl SessionOptions {
    /// Takes the drain mode, buffer size, and engine limits from `config`.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            drain_mode: config.drain_mode,
            log_buffer_capacity: config.log_buffer_capacity,
            script_limits: config.script.clone(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// One running app: assets, script engine, forms, workflows, and navigation.
pub struct Session {
    pub(crate) options: SessionOptions,
    pub(crate) assets: AssetBundle,
    pub(crate) registry: Arc<WidgetRegistry>,
    pub(crate) bridge: ScriptBridge,
    pub(crate) host: SharedHost,
    pub(crate) storage: Option<Arc<dyn StorageBackend>>,
    pub(crate) workflows: WorkflowEngine,
    pub(crate) form: Option<FormState>,
    pub(crate) accumulated: ValueMap,
    pub(crate) current_screen: Option<String>,
    pub(crate) history: Vec<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("current_screen", &self.current_screen)
            .field("history", &self.history)
            .field("form", &self.form.as_ref().map(FormState::entity_name))
            .field("storage_attached", &self.storage.is_some())
            .field("bridge", &self.bridge)
            .finish()
    }
}

impl Session {
    /// Builds a session from parsed assets.
    ///
    /// Any failure here is fatal for the session; calling again retries.
    pub fn bootstrap(
        assets: AssetBundle,
        registry: Arc<WidgetRegistry>,
        options: SessionOptions,
    ) -> Result<Self, RuntimeError> {
        assets.validate()?;
        let workflows = WorkflowEngine::new(assets.workflows.clone())?;

        let host: SharedHost = Rc::new(RefCell::new(HostState::new(options.log_buffer_capacity)));
        let mut bridge = ScriptBridge::new(host.clone(), &options.script_limits);
        bridge.register_host_functions();
        for script in &assets.scripts {
            bridge
                .load_script(script)
                .map_err(|error| RuntimeError::bootstrap(format!("loading script '{}'", script.name), error))?;
        }

        let mut session = Self {
            options,
            assets,
            registry,
            bridge,
            host,
            storage: None,
            workflows,
            form: None,
            accumulated: ValueMap::new(),
            current_screen: None,
            history: Vec::new(),
        };

        if let Some(initial) = session.assets.ui.initial_screen_id().map(str::to_string) {
            session
                .enter_screen(&initial)
                .map_err(|error| RuntimeError::bootstrap("entering the initial screen", error))?;
        }
        info!(
            screens = session.assets.ui.screens.len(),
            entities = session.assets.schema.entities.len(),
            workflows = session.assets.workflows.workflows.len(),
            scripts = session.assets.scripts.len(),
            widgets = session.registry.len(),
            "session bootstrapped"
        );
        Ok(session)
    }

    /// Loads assets from `config.assets_dir` and builds the registry from the
    /// granted capabilities.
    ///
    /// Also installs the tracing subscriber with `config.log_filter` unless
    /// the host application installed one first.
    pub fn bootstrap_from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        if init_tracing(&config.log_filter) {
            debug!(filter = %config.log_filter, "tracing initialised from runtime config");
        }
        let Some(dir) = config.assets_dir.as_deref() else {
            return Err(RuntimeError::bootstrap("locating assets", "no assets directory configured"));
        };
        let assets = load_asset_dir(dir)?;
        let registry = Arc::new(WidgetRegistry::standard(config.capabilities.iter().copied()));
        Self::bootstrap(assets, registry, SessionOptions::from_config(config))
    }

    /// Attaches the backend that later drains execute against.
    pub fn attach_storage(&mut self, storage: Arc<dyn StorageBackend>) {
        debug!("storage backend attached");
        self.storage = Some(storage);
    }

    /// Detaches the backend; later drains record "storage unavailable".
    pub fn detach_storage(&mut self) -> Option<Arc<dyn StorageBackend>> {
        debug!("storage backend detached");
        self.storage.take()
    }

    /// True when a backend is attached.
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Options the session was bootstrapped with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The loaded asset bundle.
    pub fn assets(&self) -> &AssetBundle {
        &self.assets
    }

    /// Rules and visibility expressions from the assets.
    pub fn rules(&self) -> &RuleSet {
        &self.assets.rules
    }

    /// The injected widget registry.
    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    /// The session's script bridge.
    pub fn bridge(&self) -> &ScriptBridge {
        &self.bridge
    }

    /// Mutable access to the script bridge, for ad-hoc evaluation.
    pub fn bridge_mut(&mut self) -> &mut ScriptBridge {
        &mut self.bridge
    }

    /// Workflow definitions and their runs.
    pub fn workflows(&self) -> &WorkflowEngine {
        &self.workflows
    }

    /// Screen currently shown, if any.
    pub fn current_screen(&self) -> Option<&str> {
        self.current_screen.as_deref()
    }

    /// Screens behind the current one, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Form state of the current screen's bound entity.
    pub fn form(&self) -> Option<&FormState> {
        self.form.as_ref()
    }

    /// Mutable form state, for direct edits and subscriptions.
    pub fn form_mut(&mut self) -> Option<&mut FormState> {
        self.form.as_mut()
    }

    /// Values carried across the steps of a multi-step flow.
    pub fn accumulated_values(&self) -> &ValueMap {
        &self.accumulated
    }

    /// Accumulated values overlaid with the active form's values.
    pub fn merged_values(&self) -> ValueMap {
        match &self.form {
            Some(form) => merged_values(&self.accumulated, form.values()),
            None => self.accumulated.clone(),
        }
    }

    /// Enters `screen_id`, recording the current screen in history.
    pub fn navigate(&mut self, screen_id: &str) -> Result<(), RuntimeError> {
        let previous = self.current_screen.clone();
        self.enter_screen(screen_id)?;
        if let Some(previous) = previous.filter(|previous| previous != screen_id) {
            self.history.push(previous);
        }
        Ok(())
    }

    /// Returns to the previous screen, if there is one.
    pub fn navigate_back(&mut self) -> Result<Option<String>, RuntimeError> {
        let Some(previous) = self.history.pop() else {
            return Ok(None);
        };
        self.enter_screen(&previous)?;
        Ok(Some(previous))
    }

    pub(crate) fn enter_screen(&mut self, screen_id: &str) -> Result<(), RuntimeError> {
        let screen = self.assets.ui.screen(screen_id).ok_or_else(|| RuntimeError::UnknownScreen {
            screen_id: screen_id.to_string(),
        })?;
        if let Some(entity) = bound_entity(screen, &self.assets.schema) {
            debug!(screen = screen_id, entity = %entity.name, "form state created");
            self.form = Some(FormState::new(entity.clone()));
        }
        self.current_screen = Some(screen_id.to_string());
        Ok(())
    }

    /// Builds the current screen's widget tree with live form annotations.
    ///
    /// Input nodes bound to a field get `visible`, plus `value` and `error`
    /// when the active form has them.
    pub fn render_current(&mut self) -> Result<BuiltTree, RuntimeError> {
        let Some(screen_id) = self.current_screen.clone() else {
            return Err(RuntimeError::UnknownScreen {
                screen_id: String::new(),
            });
        };
        let screen = self
            .assets
            .ui
            .screen(&screen_id)
            .ok_or_else(|| RuntimeError::UnknownScreen {
                screen_id: screen_id.clone(),
            })?;
        let mut tree = WidgetTreeBuilder::new(&self.registry)
            .with_schema(&self.assets.schema)
            .with_policy(self.options.failure_policy)
            .build_at(screen, &screen_id);
        if !tree.failures.is_empty() {
            warn!(screen = %screen_id, failures = tree.failures.len(), "screen rendered with failures");
        }

        if let Some(root) = tree.root.as_mut() {
            let mut fields = Vec::new();
            root.walk_mut(&mut |node: &mut WidgetNode| {
                if let Some(field) = node.property("field").and_then(Value::as_str) {
                    fields.push(field.to_string());
                }
            });
            let visibility: ValueMap = fields
                .into_iter()
                .map(|field| {
                    let visible = self.is_field_visible(&field);
                    (field, Value::Bool(visible))
                })
                .collect();

            let form = self.form.as_ref();
            root.walk_mut(&mut |node: &mut WidgetNode| {
                let Some(field) = node.property("field").and_then(Value::as_str).map(str::to_string) else {
                    return;
                };
                let visible = visibility.get(&field).cloned().unwrap_or(Value::Bool(true));
                node.properties.insert("visible".to_string(), visible);
                if let Some(form) = form {
                    if let Some(value) = form.value(&field) {
                        node.properties.insert("value".to_string(), value.clone());
                    }
                    if let Some(error) = form.error(&field) {
                        node.properties.insert("error".to_string(), Value::from(error));
                    }
                }
            });
        }
        Ok(tree)
    }

    /// Sets a value on the active form.
    pub fn set_field_value(&mut self, field: &str, value: impl Into<Value>) -> Result<(), RuntimeError> {
        let form = self.form.as_mut().ok_or_else(|| RuntimeError::NoActiveForm {
            action: format!("set '{field}'"),
        })?;
        form.set_value(field, value);
        Ok(())
    }

    /// Fail-open visibility of `field` against the merged values.
    pub fn is_field_visible(&mut self, field: &str) -> bool {
        let variables = self.merged_values();
        let expression = self.assets.rules.visibility_for(field);
        evaluate_visibility(&mut self.bridge, expression, &variables)
    }

    /// Starts `workflow_id` and enters its initial step's screen, if any.
    pub fn start_workflow(&mut self, workflow_id: &str) -> Result<(), RuntimeError> {
        let screen = self.workflows.start(workflow_id)?.screen_id.clone();
        info!(workflow = workflow_id, "workflow started");
        if let Some(screen) = screen {
            self.navigate(&screen)?;
        }
        Ok(())
    }

    /// Attempts a guarded transition using the merged values as context.
    ///
    /// On success the active form's values join the accumulated values and
    /// the target step's screen is entered. A refused transition is
    /// `Ok(false)`, as is a target whose screen is not declared; nothing is
    /// committed in either case.
    pub fn transition_to(&mut self, workflow_id: &str, step_id: &str) -> Result<bool, RuntimeError> {
        let target_screen = self
            .workflows
            .definition(workflow_id)
            .and_then(|definition| definition.step(step_id))
            .and_then(|step| step.screen_id.as_deref());
        if let Some(screen) = target_screen
            && self.assets.ui.screen(screen).is_none()
        {
            warn!(workflow = workflow_id, step = step_id, screen, "transition target shows an unknown screen");
            return Ok(false);
        }

        let context = self.merged_values();
        if !self.workflows.transition_to(workflow_id, step_id, &context) {
            return Ok(false);
        }
        if let Some(form) = &self.form {
            for (key, value) in form.values() {
                self.accumulated.insert(key.clone(), value.clone());
            }
        }
        let screen = self
            .workflows
            .current_step(workflow_id)
            .and_then(|step| step.screen_id.clone());
        if let Some(screen) = screen {
            self.navigate(&screen)?;
        }
        Ok(true)
    }

    /// Runs every rule against the merged values, then drains whatever the
    /// rule actions enqueued and applies their navigation requests.
    pub async fn evaluate_rules(&mut self) -> Result<Vec<RuleReport>, RuntimeError> {
        let variables = self.merged_values();
        let rules = self.assets.rules.rules.clone();
        let reports = evaluate_rules(&mut self.bridge, &rules, &variables);
        self.drain_pending().await;
        self.apply_script_requests()?;
        Ok(reports)
    }

    /// Result committed for `id`, if its batch has drained.
    pub fn operation_result(&self, id: OperationId) -> Option<OperationResult> {
        self.host.borrow().results.get_by_id(id).cloned()
    }

    /// Operations enqueued but not yet drained.
    pub fn pending_operations(&self) -> usize {
        self.host.borrow().queue.len()
    }

    /// Buffered script log records, oldest first.
    pub fn script_logs(&self) -> Vec<LogRecord> {
        self.host.borrow().logs.all()
    }

    /// Hands every buffered script log record to the caller.
    pub fn drain_script_logs(&mut self) -> Vec<LogRecord> {
        self.host.borrow_mut().logs.drain()
    }

    /// Executes everything queued so far and publishes the results.
    pub(crate) async fn drain_pending(&mut self) -> Vec<OperationId> {
        let batch = self.host.borrow_mut().queue.take_batch();
        if batch.is_empty() {
            return Vec::new();
        }
        let drained = drain_batch(batch, self.storage.clone(), self.options.drain_mode).await;
        debug!(operations = drained.len(), failures = drained.failure_count(), "batch drained");
        self.host.borrow_mut().results.commit(drained)
    }
}

/// Entity of the first form-like node in `screen` that the schema knows.
fn bound_entity<'a>(screen: &DeclarativeNode, schema: &'a SchemaBundle) -> Option<&'a EntitySchema> {
    let mut found = None;
    screen.walk(&mut |node: &DeclarativeNode| {
        if found.is_some() {
            return;
        }
        let is_form = resolve_type_name(node).is_some_and(|resolution| resolution.type_name() == "form");
        if is_form && let Some(entity) = node.text_property("entity").and_then(|name| schema.find_entity_ignore_case(name)) {
            found = Some(entity);
        }
    });
    found
}
