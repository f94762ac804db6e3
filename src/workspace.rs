//! The workspace: one explicit context object holding the engine, the parameter table,
//! the dependency graph, the independent-variable links and the function definitions.
//!
//! Every operation validates before it mutates. A failed `submit` leaves all tables
//! exactly as they were.
//!
//! # Example
//!
//! ```
//! use paramflow::workspace::Workspace;
//!
//! let mut ws = Workspace::default();
//! ws.submit("k = 5").unwrap();
//! ws.submit("a = 2k").unwrap();
//! ws.set_value("k", 10.0).unwrap();
//! assert_eq!(ws.parameter("a").unwrap().value, Some(20.0));
//! ```

use tracing::{debug, info, warn};

use crate::binder::{bind_expression, validate_function_calls};
use crate::collision::CollisionDetector;
use crate::config::AutoParameterDefaults;
use crate::engine::{ExpressionEngine, Scope};
use crate::errors::{BindError, CycleError, EngineError, NameOwner, WorkspaceError};
use crate::functions::{Committed, Core, FunctionManager};
use crate::graph::DependencyGraph;
use crate::parameters::ParameterTable;
use crate::snapshot::{Snapshot, SNAPSHOT_VERSION};
use crate::types::{
    Control, ControlKind, Domain, FunctionDefinition, NodeId, Parameter, ParameterId, ParsedLhs,
    ParsedName, Point, Role,
};
use crate::variables::IndependentVariableManager;

/// What a submitted line turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Parameter(ParameterId),
    Function(Committed),
    Points(Vec<Point>),
}

fn slider(domain: Domain) -> Control {
    Control {
        kind: ControlKind::Slider,
        min: domain.min,
        max: domain.max,
        step: domain.step,
    }
}

/// Stages a parameter for a free symbol using the configured defaults.
fn auto_parameter(
    defaults: &AutoParameterDefaults,
    id: ParameterId,
    name: ParsedName,
) -> Result<Parameter, String> {
    let domain = defaults.domain();
    if let Some(problem) = domain.problems().into_iter().next() {
        return Err(problem);
    }
    Ok(Parameter {
        id,
        name,
        value: Some(defaults.value),
        domain: Some(domain),
        control: Some(slider(domain)),
        role: Some(Role::Slider),
        expression: None,
        error: None,
    })
}

#[derive(Debug, Clone)]
pub struct Workspace {
    engine: ExpressionEngine,
    parameters: ParameterTable,
    graph: DependencyGraph,
    variables: IndependentVariableManager,
    functions: FunctionManager,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(ExpressionEngine::default())
    }
}

impl Workspace {
    /// A workspace holding only the default independent variable.
    pub fn new(engine: ExpressionEngine) -> Self {
        let mut workspace = Self::empty(engine);
        let defaults = workspace.engine.config().independent_variable.clone();
        let domain = defaults.domain();
        let id = workspace.parameters.next_id();
        let value = if domain.contains(0.0) { 0.0 } else { domain.min };
        let variable = Parameter {
            id,
            name: ParsedName::new(defaults.name.clone()),
            value: Some(value),
            domain: Some(domain),
            control: Some(slider(domain)),
            role: Some(Role::IndependentVariable),
            expression: None,
            error: None,
        };
        match workspace.parameters.insert(variable) {
            Ok(()) => {
                workspace
                    .graph
                    .add_node(NodeId::Parameter(id), defaults.name, Vec::<String>::new());
                workspace.variables.set_default(Some(id));
            }
            Err(reason) => warn!(%reason, "could not create the default independent variable"),
        }
        workspace
    }

    fn empty(engine: ExpressionEngine) -> Self {
        Self {
            engine,
            parameters: ParameterTable::new(),
            graph: DependencyGraph::new(),
            variables: IndependentVariableManager::new(),
            functions: FunctionManager::new(),
        }
    }

    fn core(&mut self) -> (Core<'_>, &mut FunctionManager) {
        (
            Core {
                engine: &self.engine,
                parameters: &mut self.parameters,
                graph: &mut self.graph,
                variables: &mut self.variables,
            },
            &mut self.functions,
        )
    }

    pub fn engine(&self) -> &ExpressionEngine {
        &self.engine
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn parameter(&self, full_name: &str) -> Option<&Parameter> {
        self.parameters.by_name(full_name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn function(&self, full_name: &str) -> Option<&FunctionDefinition> {
        self.functions.by_name(full_name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.functions.iter()
    }

    pub fn default_variable(&self) -> Option<&Parameter> {
        self.variables
            .default_variable()
            .and_then(|id| self.parameters.get(id))
    }

    fn owner_of(&self, full_name: &str) -> Option<NameOwner> {
        if self.parameters.id_of(full_name).is_some() {
            Some(NameOwner::Parameter)
        } else if self.functions.id_of(full_name).is_some() {
            Some(NameOwner::Function)
        } else {
            None
        }
    }

    fn prepare(&self, text: &str) -> String {
        self.engine
            .insert_implicit_multiplication(&self.engine.normalize(text))
    }

    /// Parameter values and named functions, as seen by expressions.
    pub fn scope(&self) -> Scope {
        self.functions.scope(&self.parameters)
    }

    pub fn evaluate(&self, expr: &str) -> Result<f64, WorkspaceError> {
        Ok(self.engine.evaluate(expr, &self.scope())?)
    }

    /// Calls a named function.
    pub fn call(&self, name: &str, args: &[f64]) -> Result<f64, WorkspaceError> {
        let id = self
            .functions
            .id_of(name)
            .ok_or_else(|| EngineError::domain(format!("unknown function '{}'", name)))?;
        Ok(self
            .functions
            .evaluate(&self.engine, &self.parameters, id, args)?)
    }

    /// Classifies one line of input and commits it.
    pub fn submit(&mut self, text: &str) -> Result<Submission, WorkspaceError> {
        let text = text.trim();
        if self.engine.is_coordinate_tuple(text) {
            let points = self.engine.parse_coordinates(text, &self.scope())?;
            return Ok(Submission::Points(points));
        }
        let definition = self.engine.parse_expression(&self.prepare(text))?;
        match self.engine.parse_lhs_checked(&definition.lhs_text)? {
            ParsedLhs::Parameter(_) => self.define_parameter(text).map(Submission::Parameter),
            ParsedLhs::Function { .. } | ParsedLhs::Anonymous => {
                self.define_function(text).map(Submission::Function)
            }
        }
    }

    /// Defines a function or anonymous plot, auto-creating parameters for free symbols.
    pub fn define_function(&mut self, text: &str) -> Result<Committed, WorkspaceError> {
        let defaults = self.engine.config().auto_parameter.clone();
        let (mut core, functions) = self.core();
        let committed = functions.create_function(&mut core, text, |id, name| {
            auto_parameter(&defaults, id, name)
        })?;
        Ok(committed)
    }

    pub fn update_function(&mut self, name: &str, rhs: &str) -> Result<Committed, WorkspaceError> {
        let id = self
            .functions
            .id_of(name)
            .ok_or_else(|| EngineError::domain(format!("unknown function '{}'", name)))?;
        let defaults = self.engine.config().auto_parameter.clone();
        let (mut core, functions) = self.core();
        let committed = functions.update_expression(&mut core, id, rhs, |id, name| {
            auto_parameter(&defaults, id, name)
        })?;
        Ok(committed)
    }

    pub fn delete_function(&mut self, name: &str) -> Result<FunctionDefinition, WorkspaceError> {
        let id = self
            .functions
            .id_of(name)
            .ok_or_else(|| EngineError::domain(format!("unknown function '{}'", name)))?;
        let (mut core, functions) = self.core();
        Ok(functions.delete_function(&mut core, id)?)
    }

    pub fn change_independent_variable(
        &mut self,
        function: &str,
        variable: &str,
    ) -> Result<(), WorkspaceError> {
        let id = self
            .functions
            .id_of(function)
            .ok_or_else(|| EngineError::domain(format!("unknown function '{}'", function)))?;
        let variable = self
            .parameters
            .id_of(variable)
            .ok_or_else(|| WorkspaceError::ParameterNotFound(variable.to_string()))?;
        let (mut core, functions) = self.core();
        Ok(functions.change_independent_variable(&mut core, id, variable)?)
    }

    /// Defines or redefines a parameter from `name = expr`.
    ///
    /// A right-hand side without free symbols makes a constant; otherwise the parameter is
    /// derived and recomputed whenever something it reads changes.
    pub fn define_parameter(&mut self, text: &str) -> Result<ParameterId, WorkspaceError> {
        let engine = &self.engine;
        let definition = engine.parse_expression(&self.prepare(text))?;
        let lhs = engine.parse_lhs_checked(&definition.lhs_text)?;
        let ParsedLhs::Parameter(name) = &lhs else {
            return Err(EngineError::parse(format!(
                "'{}' does not define a parameter",
                definition.lhs_text
            ))
            .into());
        };
        let problems = engine.validate_lhs(&lhs);
        if !problems.is_empty() {
            return Err(EngineError::Validation(problems).into());
        }
        let full = name.full_name();
        if self.functions.id_of(&full).is_some() {
            CollisionDetector::new(|n: &str| self.owner_of(n)).check(name)?;
        }

        let existing = self.parameters.id_of(&full);
        let id = existing.unwrap_or_else(|| self.parameters.next_id());
        let compiled = engine.compile(&definition.rhs)?;

        let calls = engine.all_function_calls_of(&compiled);
        let call_errors = validate_function_calls(&calls, |n| {
            engine
                .symbols()
                .function_arity(n)
                .or_else(|| self.functions.by_name(n).map(|f| f.formal_params.len()))
        });
        if !call_errors.is_empty() {
            return Err(WorkspaceError::Calls(call_errors));
        }

        let defaults = engine.config().auto_parameter.clone();
        let mut next_id = self.parameters.next_id().0 + u32::from(existing.is_none());
        let bound = bind_expression(
            engine,
            &compiled,
            &[],
            |n| {
                if n == full {
                    Some(NameOwner::Parameter)
                } else {
                    self.owner_of(n)
                }
            },
            |n| {
                let staged = ParameterId(next_id);
                next_id += 1;
                auto_parameter(&defaults, staged, n)
            },
        );
        if !bound.errors.is_empty() {
            return Err(WorkspaceError::Binding(bound.errors));
        }

        let dependencies = engine.graph_dependencies_of(&compiled, &[]);
        let mut scratch = self.graph.clone();
        for parameter in &bound.created {
            scratch.add_node(
                NodeId::Parameter(parameter.id),
                parameter.full_name(),
                Vec::<String>::new(),
            );
        }
        scratch.check_update(NodeId::Parameter(id), full.clone(), dependencies.clone())?;

        let mut scope = self.scope();
        for parameter in &bound.created {
            if let Some(value) = parameter.current_value() {
                scope.set(parameter.full_name(), value);
            }
        }
        let value = engine.evaluate_compiled(&compiled, &scope)?;
        if !value.is_finite() {
            return Err(EngineError::domain(format!("'{}' evaluated to {}", full, value)).into());
        }
        let derived = !dependencies.is_empty();

        let mut parameter = match existing.and_then(|id| self.parameters.get(id)) {
            Some(current) => current.clone(),
            None => Parameter::with_value(id, name.clone(), value),
        };
        if !derived && parameter.domain.is_none() {
            let auto = defaults.domain();
            let domain = Domain::new(auto.min.min(value), auto.max.max(value), auto.step);
            parameter.domain = Some(domain);
            parameter.control = Some(slider(domain));
            parameter.role = Some(Role::Slider);
        }
        if !derived {
            if let Some(domain) = parameter.domain.filter(|d| !d.contains(value)) {
                return Err(EngineError::domain(format!(
                    "{} is outside the domain [{}, {}] of '{}'",
                    value, domain.min, domain.max, full
                ))
                .into());
            }
        }
        parameter.value = Some(value);
        parameter.expression = derived.then(|| compiled.source().to_string());
        parameter.error = None;

        let mut parameters = self.parameters.clone();
        parameters
            .insert(parameter)
            .map_err(EngineError::validation)?;
        let mut insert_errors = Vec::new();
        for staged in &bound.created {
            if let Err(reason) = parameters.insert(staged.clone()) {
                insert_errors.push(BindError {
                    symbol: staged.full_name(),
                    reason,
                });
            }
        }
        if !insert_errors.is_empty() {
            return Err(WorkspaceError::Binding(insert_errors));
        }

        self.parameters = parameters;
        let created = bound.created.len();
        for staged in &bound.created {
            self.graph.add_node(
                NodeId::Parameter(staged.id),
                staged.full_name(),
                Vec::<String>::new(),
            );
        }
        self.graph
            .add_node(NodeId::Parameter(id), full.clone(), dependencies);
        self.propagate(NodeId::Parameter(id));

        debug!(parameter = %full, derived, created, "committed parameter");
        Ok(id)
    }

    /// Sets the value of a constant parameter and recomputes everything downstream.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), WorkspaceError> {
        let id = self
            .parameters
            .id_of(name)
            .ok_or_else(|| WorkspaceError::ParameterNotFound(name.to_string()))?;
        let Some(parameter) = self.parameters.get_mut(id) else {
            return Err(WorkspaceError::ParameterNotFound(name.to_string()));
        };
        if parameter.is_derived() {
            return Err(WorkspaceError::DerivedParameter(name.to_string()));
        }
        if !value.is_finite() {
            return Err(EngineError::domain(format!("{} is not a finite value", value)).into());
        }
        if let Some(domain) = parameter.domain.filter(|d| !d.contains(value)) {
            return Err(EngineError::domain(format!(
                "{} is outside the domain [{}, {}] of '{}'",
                value, domain.min, domain.max, name
            ))
            .into());
        }
        parameter.value = Some(value);
        parameter.error = None;
        self.propagate(NodeId::Parameter(id));
        Ok(())
    }

    /// Replaces the domain of a parameter, clamping its value into the new range.
    pub fn set_domain(&mut self, name: &str, domain: Domain) -> Result<(), WorkspaceError> {
        let problems = domain.problems();
        if !problems.is_empty() {
            return Err(EngineError::Validation(problems).into());
        }
        let id = self
            .parameters
            .id_of(name)
            .ok_or_else(|| WorkspaceError::ParameterNotFound(name.to_string()))?;
        let Some(parameter) = self.parameters.get_mut(id) else {
            return Err(WorkspaceError::ParameterNotFound(name.to_string()));
        };
        parameter.domain = Some(domain);
        if let Some(control) = parameter.control.as_mut() {
            control.min = domain.min;
            control.max = domain.max;
            control.step = domain.step;
        }
        if !parameter.is_derived() {
            parameter.value = parameter.value.map(|v| v.clamp(domain.min, domain.max));
        }
        for function in self.variables.functions_of(id) {
            let (core, functions) = self.core();
            functions.refresh_stats(&core, function);
        }
        self.propagate(NodeId::Parameter(id));
        Ok(())
    }

    /// Deletes a parameter. Whatever read it is kept but carries an error.
    pub fn delete_parameter(&mut self, name: &str) -> Result<Parameter, WorkspaceError> {
        let id = self
            .parameters
            .id_of(name)
            .ok_or_else(|| WorkspaceError::ParameterNotFound(name.to_string()))?;
        let parameter = self
            .parameters
            .remove(id)
            .ok_or_else(|| WorkspaceError::ParameterNotFound(name.to_string()))?;

        for function in self.variables.remove_variable(id) {
            self.functions.detach_variable(function);
        }
        if let Some(node) = self.graph.remove_node(NodeId::Parameter(id)) {
            let message = format!("depends on deleted parameter '{}'", node.name);
            for dependent in node.dependents {
                match dependent {
                    NodeId::Parameter(reader) => {
                        if let Some(reader) = self.parameters.get_mut(reader) {
                            reader.error = Some(message.clone());
                        }
                    }
                    NodeId::Function(reader) => self.functions.mark_error(reader, message.clone()),
                }
            }
        }
        debug!(parameter = %name, "deleted parameter");
        Ok(parameter)
    }

    /// Recomputes derived parameters and function statistics downstream of `origin`.
    ///
    /// New values are computed in evaluation order against a staged scope and applied
    /// afterwards; a parameter that fails to recompute keeps its value and records the
    /// error.
    fn propagate(&mut self, origin: NodeId) {
        let dependents = self.graph.all_dependents(origin);
        if dependents.is_empty() {
            return;
        }
        let order = match self.graph.evaluation_order() {
            Ok(order) => order,
            Err(cycle) => {
                warn!(%cycle, "dependency graph has a cycle, skipping recompute");
                return;
            }
        };

        let mut scope = self.scope();
        let mut staged = Vec::new();
        let mut functions = Vec::new();
        for node in order.into_iter().filter(|node| dependents.contains(node)) {
            match node {
                NodeId::Parameter(id) => {
                    let Some(parameter) = self.parameters.get(id) else {
                        continue;
                    };
                    let Some(expression) = &parameter.expression else {
                        continue;
                    };
                    let outcome = self
                        .engine
                        .evaluate(expression, &scope)
                        .and_then(|value| {
                            if value.is_finite() {
                                Ok(value)
                            } else {
                                Err(EngineError::domain(format!("evaluated to {}", value)))
                            }
                        });
                    if let Ok(value) = outcome {
                        scope.set(parameter.full_name(), value);
                    }
                    staged.push((id, outcome));
                }
                NodeId::Function(id) => functions.push(id),
            }
        }

        for (id, outcome) in staged {
            let Some(parameter) = self.parameters.get_mut(id) else {
                continue;
            };
            match outcome {
                Ok(value) => {
                    parameter.value = Some(value);
                    parameter.error = None;
                }
                Err(err) => {
                    warn!(parameter = %parameter.full_name(), error = %err, "recompute failed");
                    parameter.error = Some(err.to_string());
                }
            }
        }
        for id in functions {
            let (core, manager) = self.core();
            manager.invalidate_stats(id);
            manager.refresh_stats(&core, id);
        }
    }

    /// Names of all parameters and functions, dependencies first.
    pub fn evaluation_order(&self) -> Result<Vec<String>, CycleError> {
        Ok(self
            .graph
            .evaluation_order()?
            .into_iter()
            .filter_map(|id| self.graph.node(id).map(|node| node.name.clone()))
            .collect())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            default_variable: self.variables.default_variable(),
            parameters: self.parameters.iter().cloned().collect(),
            functions: self.functions.iter().cloned().collect(),
        }
    }

    /// Rebuilds a workspace from a snapshot, keeping every stored value as-is.
    pub fn from_snapshot(
        engine: ExpressionEngine,
        snapshot: Snapshot,
    ) -> Result<Self, WorkspaceError> {
        let mut workspace = Self::empty(engine);
        let parameter_count = snapshot.parameters.len();
        let function_count = snapshot.functions.len();

        for parameter in snapshot.parameters {
            parameter.validate().map_err(WorkspaceError::InvalidSnapshot)?;
            let dependencies = match &parameter.expression {
                Some(expression) => {
                    let compiled = workspace.engine.compile(expression)?;
                    workspace.engine.graph_dependencies_of(&compiled, &[])
                }
                None => Vec::new(),
            };
            let node = NodeId::Parameter(parameter.id);
            let name = parameter.full_name();
            workspace
                .parameters
                .insert(parameter)
                .map_err(WorkspaceError::InvalidSnapshot)?;
            workspace.graph.add_node(node, name, dependencies);
        }
        let default = snapshot
            .default_variable
            .filter(|id| workspace.parameters.get(*id).is_some());
        workspace.variables.set_default(default);

        for function in snapshot.functions {
            let name = function.graph_name();
            if workspace.owner_of(&name).is_some() || workspace.graph.id_of(&name).is_some() {
                return Err(WorkspaceError::InvalidSnapshot(format!(
                    "name '{}' is used twice",
                    name
                )));
            }
            let (mut core, functions) = workspace.core();
            functions.restore(&mut core, function)?;
        }
        if let Err(cycle) = workspace.graph.evaluation_order() {
            return Err(WorkspaceError::InvalidSnapshot(cycle.to_string()));
        }

        info!(
            parameters = parameter_count,
            functions = function_count,
            "restored workspace"
        );
        Ok(workspace)
    }

    pub fn to_json(&self) -> Result<String, WorkspaceError> {
        self.snapshot().to_json()
    }

    pub fn from_json(engine: ExpressionEngine, text: &str) -> Result<Self, WorkspaceError> {
        Self::from_snapshot(engine, Snapshot::from_json(text)?)
    }
}
