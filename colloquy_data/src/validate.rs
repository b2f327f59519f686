use std::collections::HashSet;
use std::fmt;

use crate::*;

/// Validation error for malformed or missing references in a GraphDef.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateId { kind: &'static str, id: String },
    MissingReference { kind: &'static str, id: String, context: String },
    MalformedOperation { context: String, reason: String },
    InvalidValue { context: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateId { kind, id } => {
                write!(f, "duplicate {kind} id '{id}'")
            },
            ValidationError::MissingReference { kind, id, context } => {
                write!(f, "missing {kind} '{id}' ({context})")
            },
            ValidationError::MalformedOperation { context, reason } => {
                write!(f, "malformed operation ({context}): {reason}")
            },
            ValidationError::InvalidValue { context } => {
                write!(f, "invalid value ({context})")
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate cross-references and basic invariants in a GraphDef.
///
/// Every problem found is returned; an empty list means the graph is safe to load.
///
/// ```
/// use colloquy_data::{GraphDef, NodeDef, PlaybackDef, validate_graph};
///
/// let graph = GraphDef {
///     title: "Demo".into(),
///     entry: "start".into(),
///     nodes: vec![NodeDef {
///         id: "start".into(),
///         speaker: None,
///         listener: None,
///         listener_is_speaker: false,
///         text: "Hello.".into(),
///         choices: Vec::new(),
///         branches: Vec::new(),
///         exit_actions: Vec::new(),
///         next: Some("gone".into()),
///         playback: PlaybackDef::default(),
///     }],
///     ..GraphDef::default()
/// };
/// let errors = validate_graph(&graph);
/// assert_eq!(errors.len(), 1);
/// assert_eq!(errors[0].to_string(), "missing node 'gone' (node 'start' next)");
/// ```
pub fn validate_graph(graph: &GraphDef) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut nodes = HashSet::new();

    for node in &graph.nodes {
        if node.id.trim().is_empty() {
            errors.push(ValidationError::InvalidValue {
                context: "node with empty id".to_string(),
            });
        }
        if !nodes.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateId {
                kind: "node",
                id: node.id.clone(),
            });
        }
    }

    if graph.entry.trim().is_empty() {
        errors.push(ValidationError::InvalidValue {
            context: "graph entry node missing".to_string(),
        });
    } else {
        check_ref(&graph.entry, &nodes, "graph entry".to_string(), &mut errors);
    }

    for name in graph.variables.keys() {
        if name.trim().is_empty() {
            errors.push(ValidationError::InvalidValue {
                context: "declared variable with empty name".to_string(),
            });
        }
    }

    for node in &graph.nodes {
        let context = format!("node '{}'", node.id);
        if let Some(next) = &node.next {
            check_ref(next, &nodes, format!("{context} next"), &mut errors);
        }
        for (i, branch) in node.branches.iter().enumerate() {
            let branch_ctx = format!("{context} branch {i} '{}'", branch.name);
            check_ref(&branch.target, &nodes, branch_ctx.clone(), &mut errors);
            for op in &branch.operations {
                validate_operation(op, &branch_ctx, &mut errors);
            }
        }
        for (i, choice) in node.choices.iter().enumerate() {
            let choice_ctx = format!("{context} choice {i}");
            if let Some(target) = &choice.target {
                check_ref(target, &nodes, choice_ctx.clone(), &mut errors);
            }
            for op in &choice.conditions {
                validate_operation(op, &choice_ctx, &mut errors);
            }
            for action in &choice.actions {
                validate_action(action, &choice_ctx, &mut errors);
            }
        }
        for action in &node.exit_actions {
            validate_action(action, &format!("{context} exit action"), &mut errors);
        }
        validate_playback(&node.playback, &context, &mut errors);
    }

    errors
}

fn check_ref(id: &str, set: &HashSet<&str>, context: String, errors: &mut Vec<ValidationError>) {
    if !set.contains(id) {
        errors.push(ValidationError::MissingReference {
            kind: "node",
            id: id.to_string(),
            context,
        });
    }
}

fn validate_operation(op: &OperationDef, context: &str, errors: &mut Vec<ValidationError>) {
    if op.variable.trim().is_empty() {
        errors.push(ValidationError::MalformedOperation {
            context: context.to_string(),
            reason: "empty variable name".to_string(),
        });
    }
    if op.comparator.is_ordering() && op.value.as_number().is_none() {
        errors.push(ValidationError::MalformedOperation {
            context: context.to_string(),
            reason: format!(
                "{:?} on '{}' needs a number, found {}",
                op.comparator,
                op.variable,
                op.value.kind()
            ),
        });
    }
    if op.comparator == ComparatorDef::Contains && op.value.as_text().is_none() {
        errors.push(ValidationError::MalformedOperation {
            context: context.to_string(),
            reason: format!("Contains on '{}' needs text, found {}", op.variable, op.value.kind()),
        });
    }
    if let Value::Number(n) = op.value
        && !n.is_finite()
    {
        errors.push(ValidationError::MalformedOperation {
            context: context.to_string(),
            reason: format!("non-finite literal for '{}'", op.variable),
        });
    }
}

fn validate_action(action: &ActionDef, context: &str, errors: &mut Vec<ValidationError>) {
    if action.variable().trim().is_empty() {
        errors.push(ValidationError::MalformedOperation {
            context: context.to_string(),
            reason: "action with empty variable name".to_string(),
        });
    }
    match action {
        ActionDef::Increment { variable, by } if !by.is_finite() => {
            errors.push(ValidationError::MalformedOperation {
                context: context.to_string(),
                reason: format!("non-finite increment for '{variable}'"),
            });
        },
        ActionDef::Copy { variable, from } if from.trim().is_empty() || from == variable => {
            errors.push(ValidationError::MalformedOperation {
                context: context.to_string(),
                reason: format!("copy into '{variable}' needs a distinct source variable"),
            });
        },
        _ => {},
    }
}

fn validate_playback(playback: &PlaybackDef, context: &str, errors: &mut Vec<ValidationError>) {
    if let Some(delay) = playback.auto_advance_delay
        && !(0.0..=MAX_PLAYBACK_SECS).contains(&delay)
    {
        errors.push(ValidationError::InvalidValue {
            context: format!("{context}: auto advance delay must be 0..={MAX_PLAYBACK_SECS} seconds ({delay})"),
        });
    }
    if let Some(voice) = &playback.voice {
        if voice.clip.trim().is_empty() {
            errors.push(ValidationError::InvalidValue {
                context: format!("{context}: voice clip path empty"),
            });
        }
        if !(0.0..=1.0).contains(&voice.volume) {
            errors.push(ValidationError::InvalidValue {
                context: format!("{context}: voice volume out of range ({})", voice.volume),
            });
        }
        if let Some(duration) = voice.duration_secs
            && !(duration > 0.0 && duration <= MAX_PLAYBACK_SECS)
        {
            errors.push(ValidationError::InvalidValue {
                context: format!("{context}: voice duration must be in (0, {MAX_PLAYBACK_SECS}] seconds ({duration})"),
            });
        }
    }
}
