use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use crate::types::{
    normalize_options, Branch, BranchDef, Expression, Field, FieldDef, FieldStore, Rule, RuleDef,
    Schema, SchemaError, Statement,
};

/// Validate a schema and build the field store it describes.
///
/// Keys must be non-empty and unique, `options` must be a list, every
/// dependency must name a field and the dependency graph must be acyclic.
/// Rule lines are parsed here; lines that fail to parse are logged and kept.
pub(crate) fn compile(schema: Schema, separator: &str) -> Result<FieldStore, SchemaError> {
    check_keys(&schema.fields)?;

    let index: HashMap<&str, usize> = schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.key.as_str(), i))
        .collect();

    check_dependencies(&schema.fields, &index)?;
    check_cycles(&schema.fields, &index)?;

    let fields = schema
        .fields
        .into_iter()
        .map(build_field)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FieldStore::new(fields, separator))
}

fn check_keys(defs: &[FieldDef]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for (index, def) in defs.iter().enumerate() {
        if def.key.trim().is_empty() {
            return Err(SchemaError::EmptyKey { index });
        }
        if !seen.insert(def.key.as_str()) {
            return Err(SchemaError::DuplicateField {
                key: def.key.clone(),
            });
        }
    }
    Ok(())
}

fn check_dependencies(defs: &[FieldDef], index: &HashMap<&str, usize>) -> Result<(), SchemaError> {
    for def in defs {
        if let Some(dependency) = def.dependencies.iter().find(|d| !index.contains_key(d.as_str())) {
            return Err(SchemaError::UnknownDependency {
                field: def.key.clone(),
                dependency: dependency.clone(),
            });
        }
    }
    Ok(())
}

/// Kahn's algorithm over dependency edges; a leftover node means a cycle.
fn check_cycles(defs: &[FieldDef], index: &HashMap<&str, usize>) -> Result<(), SchemaError> {
    // dependents[d] = fields that list d as a dependency
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); defs.len()];
    let mut in_degree = vec![0_usize; defs.len()];

    for (i, def) in defs.iter().enumerate() {
        for dep in &def.dependencies {
            if let Some(&d) = index.get(dep.as_str()) {
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..defs.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = 0;

    while let Some(node) = queue.pop_front() {
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
        sorted += 1;
    }

    if sorted == defs.len() {
        Ok(())
    } else {
        Err(SchemaError::CyclicDependency {
            path: find_cycle(defs, index),
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}

/// DFS-based cycle finder for error reporting. The path follows declared
/// dependencies and repeats its first key at the end.
fn find_cycle(defs: &[FieldDef], index: &HashMap<&str, usize>) -> Vec<String> {
    let adjacency: Vec<Vec<usize>> = defs
        .iter()
        .map(|def| {
            def.dependencies
                .iter()
                .filter_map(|dep| index.get(dep.as_str()).copied())
                .collect()
        })
        .collect();

    let mut state = vec![DfsState::Unvisited; defs.len()];
    let mut stack = Vec::new();

    for start in 0..defs.len() {
        if state[start] == DfsState::Unvisited {
            if let Some(cycle) = dfs(start, &adjacency, &mut state, &mut stack) {
                return cycle.into_iter().map(|i| defs[i].key.clone()).collect();
            }
        }
    }
    Vec::new()
}

fn dfs(
    node: usize,
    adjacency: &[Vec<usize>],
    state: &mut [DfsState],
    stack: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    state[node] = DfsState::InStack;
    stack.push(node);

    for &next in &adjacency[node] {
        match state[next] {
            DfsState::InStack => {
                let pos = stack.iter().position(|&n| n == next)?;
                let mut cycle = stack[pos..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            DfsState::Unvisited => {
                if let Some(cycle) = dfs(next, adjacency, state, stack) {
                    return Some(cycle);
                }
            }
            DfsState::Done => {}
        }
    }

    stack.pop();
    state[node] = DfsState::Done;
    None
}

fn build_field(def: FieldDef) -> Result<Field, SchemaError> {
    let options = match &def.options {
        None | Some(Value::Null) => None,
        Some(list @ Value::Array(_)) => Some(normalize_options(list)),
        Some(_) => return Err(SchemaError::InvalidOptions { field: def.key }),
    };
    let rules: Vec<Rule> = def.rules.iter().map(|rule| compile_rule(&def.key, rule)).collect();

    Ok(Field {
        key: def.key,
        name: def.name,
        kind: def.kind,
        data_source: def.data_source,
        options,
        value: def.value,
        dependencies: def.dependencies,
        rules: Arc::from(rules),
        description: def.description,
        visible: def.visible,
        disabled: def.disabled,
        required: def.required,
        errors: def.errors,
        render: def.render,
    })
}

fn compile_rule(field: &str, def: &RuleDef) -> Rule {
    Rule {
        branch: Branch {
            condition: condition(field, def.condition.as_deref()),
            then: statements(field, &def.then),
        },
        elif: def.elif.iter().map(|b| compile_branch(field, b)).collect(),
        otherwise: def.otherwise.as_ref().map(|lines| statements(field, lines)),
        init: statements(field, &def.init),
    }
}

fn compile_branch(field: &str, def: &BranchDef) -> Branch {
    Branch {
        condition: condition(field, def.condition.as_deref()),
        then: statements(field, &def.then),
    }
}

/// A blank condition is the same as no condition.
fn condition(field: &str, source: Option<&str>) -> Option<Expression> {
    let source = source.map(str::trim).filter(|s| !s.is_empty())?;
    let expression = Expression::parse(source);
    if let Err(error) = expression.ast() {
        tracing::warn!(field, condition = source, %error, "condition does not parse; it will never hold");
    }
    Some(expression)
}

fn statements(field: &str, lines: &[String]) -> Vec<Statement> {
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let statement = Statement::parse(line);
            if let Err(error) = &statement.instruction {
                tracing::warn!(field, instruction = %statement.source, %error, "instruction does not parse; it will be skipped");
            }
            statement
        })
        .collect()
}
