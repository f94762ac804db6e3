//! Function definitions: creation, editing, deletion and sampling statistics.
//!
//! Every mutating operation plans first and commits last. Planning parses the definition,
//! validates calls, binds free symbols (staging auto-created parameters without inserting
//! them) and checks the dependency graph for cycles on a scratch copy. Only when all of
//! that succeeds are the staged parameters, the graph edges and the definition written.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::binder::{bind_expression, validate_function_calls};
use crate::collision::CollisionDetector;
use crate::engine::{CompiledExpression, ExpressionEngine, Scope, UserFunction};
use crate::errors::{BindError, EngineError, FunctionError, NameOwner};
use crate::graph::DependencyGraph;
use crate::parameters::ParameterTable;
use crate::types::{
    FunctionDefinition, FunctionId, NodeId, Parameter, ParameterId, ParsedLhs, ParsedName, Stats,
    Style, ANONYMOUS_NAME,
};
use crate::variables::IndependentVariableManager;

/// Shared state a function operation reads and, on commit, writes.
pub struct Core<'a> {
    pub engine: &'a ExpressionEngine,
    pub parameters: &'a mut ParameterTable,
    pub graph: &'a mut DependencyGraph,
    pub variables: &'a mut IndependentVariableManager,
}

/// Result of a successful create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub id: FunctionId,
    /// Parameters auto-created for free symbols
    pub created: Vec<ParameterId>,
}

/// A validated right-hand side, ready to commit.
struct Plan {
    compiled: CompiledExpression,
    dependencies: Vec<String>,
    graph_dependencies: Vec<String>,
    created: Vec<Parameter>,
    /// Parameter table with `created` already inserted.
    parameters: ParameterTable,
}

/// Owner of all function definitions.
#[derive(Debug, Clone, Default)]
pub struct FunctionManager {
    functions: BTreeMap<FunctionId, FunctionDefinition>,
    compiled: BTreeMap<FunctionId, CompiledExpression>,
    by_name: BTreeMap<String, FunctionId>,
    next_id: u32,
}

impl FunctionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, id: FunctionId) -> Option<&FunctionDefinition> {
        self.functions.get(&id)
    }

    pub fn id_of(&self, full_name: &str) -> Option<FunctionId> {
        self.by_name.get(full_name).copied()
    }

    pub fn by_name(&self, full_name: &str) -> Option<&FunctionDefinition> {
        self.id_of(full_name).and_then(|id| self.functions.get(&id))
    }

    /// Definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.functions.values()
    }

    fn arity_of(&self, full_name: &str) -> Option<usize> {
        self.by_name(full_name).map(|f| f.formal_params.len())
    }

    /// Values of all parameters plus every named function, callable from expressions.
    pub fn scope(&self, parameters: &ParameterTable) -> Scope {
        let mut scope = Scope::new();
        for (name, value) in parameters.values() {
            scope.set(name, value);
        }
        for (name, id) in &self.by_name {
            if let (Some(def), Some(body)) = (self.functions.get(id), self.compiled.get(id)) {
                scope.define_function(
                    name.clone(),
                    UserFunction {
                        params: def.formal_params.clone(),
                        body: body.clone(),
                    },
                );
            }
        }
        scope
    }

    fn plan<C>(
        &self,
        core: &Core<'_>,
        id: FunctionId,
        graph_name: &str,
        own_signature: Option<(&str, usize)>,
        formal_params: &[String],
        rhs: &str,
        mut create: C,
    ) -> Result<Plan, FunctionError>
    where
        C: FnMut(ParameterId, ParsedName) -> Result<Parameter, String>,
    {
        let engine = core.engine;
        let compiled = engine.compile(rhs)?;

        let calls = engine.all_function_calls_of(&compiled);
        let call_errors = validate_function_calls(&calls, |name| {
            engine
                .symbols()
                .function_arity(name)
                .or_else(|| self.arity_of(name))
                .or_else(|| own_signature.filter(|(own, _)| *own == name).map(|(_, n)| n))
        });
        if !call_errors.is_empty() {
            return Err(FunctionError::Calls(call_errors));
        }

        let mut next_id = core.parameters.next_id().0;
        let bound = bind_expression(
            engine,
            &compiled,
            formal_params,
            |name| {
                if core.parameters.id_of(name).is_some() {
                    Some(NameOwner::Parameter)
                } else if self.id_of(name).is_some()
                    || own_signature.is_some_and(|(own, _)| own == name)
                {
                    Some(NameOwner::Function)
                } else {
                    None
                }
            },
            |name| {
                let id = ParameterId(next_id);
                next_id += 1;
                create(id, name)
            },
        );
        if !bound.errors.is_empty() {
            return Err(FunctionError::Binding(bound.errors));
        }

        let dependencies: Vec<String> = engine
            .dependencies_of(&compiled)
            .into_iter()
            .filter(|name| !formal_params.contains(name))
            .collect();
        let graph_dependencies = engine.graph_dependencies_of(&compiled, formal_params);

        let mut parameters = core.parameters.clone();
        let mut insert_errors = Vec::new();
        for parameter in &bound.created {
            if let Err(reason) = parameters.insert(parameter.clone()) {
                insert_errors.push(BindError {
                    symbol: parameter.full_name(),
                    reason,
                });
            }
        }
        if !insert_errors.is_empty() {
            return Err(FunctionError::Binding(insert_errors));
        }

        let mut scratch = core.graph.clone();
        for parameter in &bound.created {
            scratch.add_node(
                NodeId::Parameter(parameter.id),
                parameter.full_name(),
                Vec::<String>::new(),
            );
        }
        scratch.check_update(NodeId::Function(id), graph_name, graph_dependencies.clone())?;

        Ok(Plan {
            compiled,
            dependencies,
            graph_dependencies,
            created: bound.created,
            parameters,
        })
    }

    /// Writes staged parameters and graph edges; returns the ids of the new parameters.
    fn commit_plan(
        core: &mut Core<'_>,
        id: FunctionId,
        graph_name: &str,
        plan: &mut Plan,
    ) -> Vec<ParameterId> {
        *core.parameters = std::mem::take(&mut plan.parameters);
        let mut created = Vec::with_capacity(plan.created.len());
        for parameter in &plan.created {
            core.graph.add_node(
                NodeId::Parameter(parameter.id),
                parameter.full_name(),
                Vec::<String>::new(),
            );
            created.push(parameter.id);
        }
        core.graph.add_node(
            NodeId::Function(id),
            graph_name,
            plan.graph_dependencies.clone(),
        );
        created
    }

    /// The independent variable for a function whose first formal parameter is `first`.
    fn resolve_variable(
        core: &Core<'_>,
        formal_params: &[String],
    ) -> Result<ParameterId, FunctionError> {
        let matching = formal_params
            .first()
            .and_then(|first| core.parameters.by_name(first))
            .filter(|p| p.is_independent_variable() && p.domain.is_some())
            .map(|p| p.id);
        matching
            .or_else(|| {
                core.variables
                    .default_variable()
                    .filter(|id| core.parameters.get(*id).is_some())
            })
            .ok_or(FunctionError::NoIndependentVariable)
    }

    /// Parses and commits a definition such as `f(x) = sin(k*x)` or `y = 2x`.
    ///
    /// Free symbols are passed to `create` together with the id they will receive.
    pub fn create_function<C>(
        &mut self,
        core: &mut Core<'_>,
        input: &str,
        create: C,
    ) -> Result<Committed, FunctionError>
    where
        C: FnMut(ParameterId, ParsedName) -> Result<Parameter, String>,
    {
        let engine = core.engine;
        let prepared = engine.insert_implicit_multiplication(&engine.normalize(input));
        let definition = engine.parse_expression(&prepared)?;
        let lhs = engine.parse_lhs_checked(&definition.lhs_text)?;

        let formal_params = match &lhs {
            ParsedLhs::Parameter(name) => {
                return Err(FunctionError::NotAFunction(name.full_name()))
            }
            ParsedLhs::Function { formal_params, .. } => formal_params.clone(),
            ParsedLhs::Anonymous => vec![core
                .variables
                .default_name(core.parameters)
                .ok_or(FunctionError::NoIndependentVariable)?],
        };
        let problems = engine.validate_lhs(&lhs);
        if !problems.is_empty() {
            return Err(EngineError::Validation(problems).into());
        }
        if let ParsedLhs::Function { name, .. } = &lhs {
            let parameters = &*core.parameters;
            CollisionDetector::new(|n: &str| {
                if self.id_of(n).is_some() {
                    Some(NameOwner::Function)
                } else if parameters.id_of(n).is_some() {
                    Some(NameOwner::Parameter)
                } else {
                    None
                }
            })
            .check(name)?;
        }

        let id = FunctionId(self.next_id);
        let graph_name = match &lhs {
            ParsedLhs::Anonymous => format!("{}#{}", ANONYMOUS_NAME, id.0),
            named => named.full_name(),
        };
        let own_name = lhs.full_name();
        let own_signature = match &lhs {
            ParsedLhs::Function { formal_params, .. } => {
                Some((own_name.as_str(), formal_params.len()))
            }
            _ => None,
        };
        let mut plan = self.plan(
            core,
            id,
            &graph_name,
            own_signature,
            &formal_params,
            &definition.rhs,
            create,
        )?;
        let variable = Self::resolve_variable(core, &formal_params)?;

        let created = Self::commit_plan(core, id, &graph_name, &mut plan);
        let definition = FunctionDefinition {
            id,
            lhs,
            formal_params,
            expression: plan.compiled.source().to_string(),
            independent_var: Some(variable),
            dependencies: plan.dependencies,
            style: Style {
                visible: true,
                ..Style::default()
            },
            stats: None,
            error: None,
        };
        if !definition.is_anonymous() {
            self.by_name.insert(definition.lhs.full_name(), id);
        }
        self.functions.insert(id, definition);
        self.compiled.insert(id, plan.compiled);
        self.next_id += 1;
        core.variables.link(variable, id);
        self.refresh_stats(core, id);

        debug!(function = %graph_name, created = created.len(), "committed function");
        Ok(Committed { id, created })
    }

    /// Replaces the right-hand side of an existing function.
    pub fn update_expression<C>(
        &mut self,
        core: &mut Core<'_>,
        id: FunctionId,
        rhs: &str,
        create: C,
    ) -> Result<Committed, FunctionError>
    where
        C: FnMut(ParameterId, ParsedName) -> Result<Parameter, String>,
    {
        let current = self.functions.get(&id).ok_or(FunctionError::NotFound(id))?;
        let graph_name = current.graph_name();
        let own_name = current.lhs.full_name();
        let own_signature = current
            .lhs
            .arity()
            .map(|arity| (own_name.as_str(), arity));
        let formal_params = current.formal_params.clone();

        let engine = core.engine;
        let prepared = engine.insert_implicit_multiplication(&engine.normalize(rhs));
        let mut plan = self.plan(
            core,
            id,
            &graph_name,
            own_signature,
            &formal_params,
            &prepared,
            create,
        )?;

        let created = Self::commit_plan(core, id, &graph_name, &mut plan);
        if let Some(definition) = self.functions.get_mut(&id) {
            definition.expression = plan.compiled.source().to_string();
            definition.dependencies = plan.dependencies;
            definition.stats = None;
            definition.error = None;
        }
        self.compiled.insert(id, plan.compiled);
        self.refresh_stats(core, id);

        debug!(function = %graph_name, "updated function expression");
        Ok(Committed { id, created })
    }

    /// Samples `id` over another domain-bearing parameter.
    pub fn change_independent_variable(
        &mut self,
        core: &mut Core<'_>,
        id: FunctionId,
        variable: ParameterId,
    ) -> Result<(), FunctionError> {
        if !self.functions.contains_key(&id) {
            return Err(FunctionError::NotFound(id));
        }
        let usable = core
            .parameters
            .get(variable)
            .is_some_and(|p| p.domain.is_some());
        if !usable {
            return Err(FunctionError::NotAnIndependentVariable(variable));
        }
        if let Some(definition) = self.functions.get_mut(&id) {
            definition.independent_var = Some(variable);
            definition.stats = None;
        }
        core.variables.link(variable, id);
        self.refresh_stats(core, id);
        Ok(())
    }

    /// Removes a function. Functions calling it keep their definition but carry an error.
    pub fn delete_function(
        &mut self,
        core: &mut Core<'_>,
        id: FunctionId,
    ) -> Result<FunctionDefinition, FunctionError> {
        let definition = self.functions.remove(&id).ok_or(FunctionError::NotFound(id))?;
        self.compiled.remove(&id);
        if !definition.is_anonymous() {
            self.by_name.remove(&definition.lhs.full_name());
        }
        core.variables.unlink(id);

        if let Some(node) = core.graph.remove_node(NodeId::Function(id)) {
            for dependent in node.dependents {
                if let NodeId::Function(caller) = dependent {
                    if let Some(caller) = self.functions.get_mut(&caller) {
                        caller.stats = None;
                        caller.error = Some(format!("calls deleted function '{}'", node.name));
                    }
                }
            }
        }
        debug!(function = %definition.graph_name(), "deleted function");
        Ok(definition)
    }

    /// Drops cached statistics of `id`.
    pub fn invalidate_stats(&mut self, id: FunctionId) {
        if let Some(definition) = self.functions.get_mut(&id) {
            definition.stats = None;
        }
    }

    /// Recomputes statistics of `id`, recording a failure on the definition.
    pub fn refresh_stats(&mut self, core: &Core<'_>, id: FunctionId) {
        let outcome = self.compute_stats(core.engine, core.parameters, id);
        if let Some(definition) = self.functions.get_mut(&id) {
            match outcome {
                Ok(stats) => {
                    definition.stats = Some(stats);
                    definition.error = None;
                }
                Err(err) => {
                    definition.stats = None;
                    definition.error = Some(err.to_string());
                }
            }
        }
    }

    /// Evaluates `id` at the given arguments.
    pub fn evaluate(
        &self,
        engine: &ExpressionEngine,
        parameters: &ParameterTable,
        id: FunctionId,
        args: &[f64],
    ) -> Result<f64, FunctionError> {
        let definition = self.functions.get(&id).ok_or(FunctionError::NotFound(id))?;
        let compiled = self.compiled.get(&id).ok_or(FunctionError::NotFound(id))?;
        if args.len() != definition.formal_params.len() {
            return Err(EngineError::domain(format!(
                "'{}' takes {} argument(s), got {}",
                definition.graph_name(),
                definition.formal_params.len(),
                args.len()
            ))
            .into());
        }
        let bindings: Vec<(&str, f64)> = definition
            .formal_params
            .iter()
            .map(String::as_str)
            .zip(args.iter().copied())
            .collect();
        let mut evaluator = engine.evaluator(&self.scope(parameters))?;
        Ok(evaluator.eval(compiled, &bindings)?)
    }

    /// Samples `id` over its independent variable's domain.
    ///
    /// Samples are evaluated in parallel chunks and folded in domain order.
    pub fn compute_stats(
        &self,
        engine: &ExpressionEngine,
        parameters: &ParameterTable,
        id: FunctionId,
    ) -> Result<Stats, FunctionError> {
        let (_, values) = self.sample(engine, parameters, id)?;
        fold_stats(values.iter().map(|(_, y)| *y)).ok_or(FunctionError::NoValidSamples)
    }

    /// `(x, f(x))` over the independent variable's domain; `None` where evaluation failed
    /// or was not finite.
    pub fn sample(
        &self,
        engine: &ExpressionEngine,
        parameters: &ParameterTable,
        id: FunctionId,
    ) -> Result<(ParameterId, Vec<(f64, Option<f64>)>), FunctionError> {
        let definition = self.functions.get(&id).ok_or(FunctionError::NotFound(id))?;
        let compiled = self.compiled.get(&id).ok_or(FunctionError::NotFound(id))?;
        let variable = definition
            .independent_var
            .ok_or(FunctionError::NoIndependentVariable)?;
        let domain = parameters
            .get(variable)
            .ok_or(FunctionError::NoIndependentVariable)?
            .domain
            .ok_or(FunctionError::NotAnIndependentVariable(variable))?;
        let bound = definition
            .formal_params
            .first()
            .cloned()
            .ok_or_else(|| FunctionError::NotAFunction(definition.graph_name()))?;

        let scope = self.scope(parameters);
        // fail early instead of once per chunk
        engine.evaluator(&scope)?;

        let xs = domain.samples(engine.config().max_samples);
        let chunk_size = (xs.len() / (rayon::current_num_threads() * 4)).max(1);
        let values = xs
            .par_chunks(chunk_size)
            .map(|chunk| {
                let mut evaluator = engine.evaluator(&scope).ok();
                chunk
                    .iter()
                    .map(|&x| {
                        let y = evaluator
                            .as_mut()
                            .and_then(|evaluator| evaluator.eval(compiled, &[(bound.as_str(), x)]).ok())
                            .filter(|y| y.is_finite());
                        (x, y)
                    })
                    .collect::<Vec<_>>()
            })
            .flatten()
            .collect();
        Ok((variable, values))
    }

    /// Records a failure on `id` and drops its statistics.
    pub fn mark_error(&mut self, id: FunctionId, message: impl Into<String>) {
        if let Some(definition) = self.functions.get_mut(&id) {
            definition.stats = None;
            definition.error = Some(message.into());
        }
    }

    /// Forgets the independent variable of `id` after that variable was deleted.
    pub fn detach_variable(&mut self, id: FunctionId) {
        if let Some(definition) = self.functions.get_mut(&id) {
            definition.independent_var = None;
        }
        self.mark_error(id, "independent variable was deleted");
    }

    /// Re-registers a stored definition as-is, keeping its id, stats and error.
    pub fn restore(
        &mut self,
        core: &mut Core<'_>,
        definition: FunctionDefinition,
    ) -> Result<(), FunctionError> {
        let compiled = core.engine.compile(&definition.expression)?;
        let graph_dependencies =
            core.engine.graph_dependencies_of(&compiled, &definition.formal_params);
        let id = definition.id;
        core.graph.add_node(
            NodeId::Function(id),
            definition.graph_name(),
            graph_dependencies,
        );
        if let Some(variable) = definition.independent_var {
            core.variables.link(variable, id);
        }
        if !definition.is_anonymous() {
            self.by_name.insert(definition.lhs.full_name(), id);
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.compiled.insert(id, compiled);
        self.functions.insert(id, definition);
        Ok(())
    }
}

/// Folds samples in order; `None` when no sample is finite.
fn fold_stats<I>(values: I) -> Option<Stats>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut zero_crossings = 0usize;
    let mut continuous = true;
    // sign of the last nonzero sample since the last gap; exact zeros keep it
    let mut last_sign: Option<bool> = None;

    for value in values {
        match value {
            Some(y) => {
                count += 1;
                min = min.min(y);
                max = max.max(y);
                sum += y;
                if y != 0.0 {
                    let positive = y > 0.0;
                    if last_sign == Some(!positive) {
                        zero_crossings += 1;
                    }
                    last_sign = Some(positive);
                }
            }
            None => {
                continuous = false;
                last_sign = None;
            }
        }
    }

    (count > 0).then(|| Stats {
        samples: count,
        min,
        max,
        mean: sum / count as f64,
        zero_crossings,
        continuous,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Domain, Role};

    struct Fixture {
        engine: ExpressionEngine,
        parameters: ParameterTable,
        graph: DependencyGraph,
        variables: IndependentVariableManager,
        functions: FunctionManager,
    }

    impl Fixture {
        fn new() -> Self {
            let mut parameters = ParameterTable::new();
            let mut x = Parameter::with_value(ParameterId(0), ParsedName::new("x"), 0.0);
            x.domain = Some(Domain::new(-1.0, 1.0, 0.5));
            x.role = Some(Role::IndependentVariable);
            parameters.insert(x).unwrap();
            let mut graph = DependencyGraph::new();
            graph.add_node(NodeId::Parameter(ParameterId(0)), "x", Vec::<String>::new());
            let mut variables = IndependentVariableManager::new();
            variables.set_default(Some(ParameterId(0)));
            Self {
                engine: ExpressionEngine::default(),
                parameters,
                graph,
                variables,
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

        fn create(&mut self, input: &str) -> Result<Committed, FunctionError> {
            let (mut core, functions) = self.core();
            functions.create_function(&mut core, input, |id, name| {
                Ok(Parameter::with_value(id, name, 1.0))
            })
        }

        fn update(&mut self, id: FunctionId, rhs: &str) -> Result<Committed, FunctionError> {
            let (mut core, functions) = self.core();
            functions.update_expression(&mut core, id, rhs, |id, name| {
                Ok(Parameter::with_value(id, name, 1.0))
            })
        }
    }

    #[test]
    fn test_create_auto_parameterizes_free_symbols() {
        let mut fx = Fixture::new();
        let committed = fx.create("f(x) = sin(kx)").unwrap();
        assert_eq!(committed.created.len(), 1);

        let f = fx.functions.get(committed.id).unwrap();
        assert_eq!(f.dependencies, vec!["k".to_string()]);
        assert_eq!(f.independent_var, Some(ParameterId(0)));
        assert_eq!(f.stats.unwrap().samples, 5);
        assert!(fx.parameters.by_name("k").is_some());
        assert!(fx.graph.id_of("k").is_some());
        assert!(fx.graph.assert_consistent().is_ok());
        assert_eq!(fx.variables.functions_of(ParameterId(0)), vec![committed.id]);
    }

    #[test]
    fn test_failed_create_leaves_no_trace() {
        let mut fx = Fixture::new();
        let before = (fx.parameters.clone(), fx.graph.clone());
        let err = fx.create("f(x) = k*g(x)").unwrap_err();
        assert!(matches!(err, FunctionError::Calls(_)));
        assert_eq!((fx.parameters.clone(), fx.graph.clone()), before);
        assert!(fx.functions.is_empty());
    }

    #[test]
    fn test_duplicate_function_name_is_a_collision() {
        let mut fx = Fixture::new();
        fx.create("f(x) = x").unwrap();
        match fx.create("f(x) = 2x") {
            Err(FunctionError::Collision(collision)) => {
                assert_eq!(collision.owner, NameOwner::Function);
                assert_eq!(collision.suggestions[0], "f_{1}");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_named_like_a_parameter_is_rejected() {
        let mut fx = Fixture::new();
        fx.create("f(x) = ax").unwrap();
        match fx.create("a(x) = x") {
            Err(FunctionError::Collision(collision)) => {
                assert_eq!(collision.owner, NameOwner::Parameter)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_anonymous_plots_take_the_default_variable() {
        let mut fx = Fixture::new();
        let first = fx.create("y = 2x").unwrap();
        let second = fx.create("y = 3x").unwrap();
        let def = fx.functions.get(first.id).unwrap();
        assert!(def.is_anonymous());
        assert_eq!(def.formal_params, vec!["x".to_string()]);
        assert!(def.dependencies.is_empty());
        assert_ne!(first.id, second.id);
        assert_eq!(fx.graph.id_of("anonymous#1"), Some(NodeId::Function(second.id)));
    }

    #[test]
    fn test_recursive_definition_is_a_cycle() {
        let mut fx = Fixture::new();
        match fx.create("f(x) = f(x) + 1") {
            Err(FunctionError::Cycle(cycle)) => assert_eq!(cycle.path, vec!["f", "f"]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fx.graph.len(), 1);
    }

    #[test]
    fn test_parameter_lhs_is_not_a_function() {
        let mut fx = Fixture::new();
        assert!(matches!(
            fx.create("k = 2"),
            Err(FunctionError::NotAFunction(_))
        ));
    }

    #[test]
    fn test_update_expression_recomputes_stats() {
        let mut fx = Fixture::new();
        let id = fx.create("f(x) = x").unwrap().id;
        let committed = fx.update(id, "x^2 + c").unwrap();
        assert_eq!(committed.created.len(), 1);
        let f = fx.functions.get(id).unwrap();
        let stats = f.stats.unwrap();
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 2.0);
        assert_eq!(f.dependencies, vec!["c".to_string()]);
        assert!(fx.graph.assert_consistent().is_ok());
    }

    #[test]
    fn test_stats_track_gaps_and_zero_crossings() {
        let mut fx = Fixture::new();
        let id = fx.create("f(x) = 1/x").unwrap().id;
        let stats = fx.functions.get(id).unwrap().stats.unwrap();
        assert_eq!(stats.samples, 4);
        assert!(!stats.continuous);
        assert_eq!(stats.zero_crossings, 0);

        let id = fx.create("g(x) = x - 0.25").unwrap().id;
        let stats = fx.functions.get(id).unwrap().stats.unwrap();
        assert_eq!(stats.zero_crossings, 1);
        assert!(stats.continuous);
        assert!((stats.mean + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_crossing_through_an_exact_zero_counts_once() {
        let mut fx = Fixture::new();
        // samples -1, -0.5, 0, 0.5, 1
        let id = fx.create("f(x) = x").unwrap().id;
        assert_eq!(fx.functions.get(id).unwrap().stats.unwrap().zero_crossings, 1);

        // touching zero without changing sign is not a crossing
        let id = fx.create("g(x) = x^2").unwrap().id;
        assert_eq!(fx.functions.get(id).unwrap().stats.unwrap().zero_crossings, 0);

        let stats = fold_stats([Some(-1.0), Some(0.0), Some(0.0), Some(2.0), Some(-3.0)]).unwrap();
        assert_eq!(stats.zero_crossings, 2);
    }

    #[test]
    fn test_failed_parameter_insert_leaves_no_trace() {
        let mut fx = Fixture::new();
        let before = (fx.parameters.clone(), fx.graph.clone());
        let (mut core, functions) = fx.core();
        // every staged parameter claims the name of the existing `x`
        let err = functions
            .create_function(&mut core, "f(t) = k*t", |id, _| {
                Ok(Parameter::with_value(id, ParsedName::new("x"), 1.0))
            })
            .unwrap_err();
        match err {
            FunctionError::Binding(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].symbol, "x");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!((fx.parameters.clone(), fx.graph.clone()), before);
        assert!(fx.functions.is_empty());
    }

    #[test]
    fn test_no_valid_samples() {
        let mut fx = Fixture::new();
        let id = fx.create("f(x) = sqrt(-1 - x^2)").unwrap().id;
        assert!(fx.functions.get(id).unwrap().error.is_some());
        assert_eq!(
            fx.functions.compute_stats(&fx.engine, &fx.parameters, id),
            Err(FunctionError::NoValidSamples)
        );
    }

    #[test]
    fn test_delete_marks_callers() {
        let mut fx = Fixture::new();
        let f = fx.create("f(x) = x").unwrap().id;
        let g = fx.create("g(x) = f(x) + 1").unwrap().id;
        assert_eq!(fx.functions.evaluate(&fx.engine, &fx.parameters, g, &[2.0]), Ok(3.0));

        let (mut core, functions) = fx.core();
        functions.delete_function(&mut core, f).unwrap();
        assert!(fx.functions.get(g).unwrap().error.is_some());
        assert!(fx.functions.by_name("f").is_none());
        assert!(fx.variables.is_symmetric());
        assert!(fx.graph.assert_consistent().is_ok());
    }

    #[test]
    fn test_change_independent_variable_requires_a_domain() {
        let mut fx = Fixture::new();
        let id = fx.create("f(x) = ax").unwrap().id;
        let a = fx.parameters.id_of("a").unwrap();
        let (mut core, functions) = fx.core();
        assert_eq!(
            functions.change_independent_variable(&mut core, id, a),
            Err(FunctionError::NotAnIndependentVariable(a))
        );

        let mut t = Parameter::with_value(ParameterId(9), ParsedName::new("t"), 0.0);
        t.domain = Some(Domain::new(0.0, 1.0, 0.25));
        fx.parameters.insert(t).unwrap();
        let (mut core, functions) = fx.core();
        functions
            .change_independent_variable(&mut core, id, ParameterId(9))
            .unwrap();
        assert_eq!(fx.functions.get(id).unwrap().stats.unwrap().samples, 5);
        assert_eq!(fx.variables.functions_of(ParameterId(9)), vec![id]);
        assert!(fx.variables.functions_of(ParameterId(0)).is_empty());
    }
}
