//! Structural validation for workflow definitions.
//!
//! The validator is the gatekeeper in front of workflow persistence: only
//! definitions that pass every check here may be activated. All findings are
//! collected and returned together rather than failing on the first, with one
//! exception: when structural errors (duplicate ids, dangling edges, bad
//! start/end counts) are present, the cycle and reachability passes are
//! skipped because their results would be misleading cascades.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{NodeType, WorkflowDefinition};

/// Outcome of validating a [`WorkflowDefinition`].
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            ok: errors.is_empty(),
            errors,
        }
    }
}

/// Validate a workflow definition.
///
/// Checks, in order: node presence, duplicate node/edge ids, start/end
/// counts, edge endpoint existence, fork/join arity, cycle detection
/// (Kahn's topological peel), and reachability from the start node (BFS).
pub fn validate(def: &WorkflowDefinition) -> ValidationReport {
    let mut errors: Vec<String> = Vec::new();

    if def.nodes.is_empty() {
        errors.push("Workflow definition has no nodes".to_string());
        return ValidationReport::from_errors(errors);
    }

    // -- Duplicate ids ------------------------------------------------------
    let mut seen_nodes: HashSet<&str> = HashSet::with_capacity(def.nodes.len());
    for node in &def.nodes {
        if !seen_nodes.insert(node.id.as_str()) {
            errors.push(format!("Duplicate node id: \"{}\"", node.id));
        }
    }

    let mut seen_edges: HashSet<&str> = HashSet::with_capacity(def.edges.len());
    for edge in &def.edges {
        if !seen_edges.insert(edge.id.as_str()) {
            errors.push(format!("Duplicate edge id: \"{}\"", edge.id));
        }
    }

    // -- Start / end counts -------------------------------------------------
    let start_count = def
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Start)
        .count();
    if start_count != 1 {
        errors.push(format!(
            "Workflow must have exactly one start node, found {start_count}"
        ));
    }

    let end_count = def
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::End)
        .count();
    if end_count == 0 {
        errors.push("Workflow must have at least one end node".to_string());
    }

    // -- Edge endpoints -----------------------------------------------------
    for edge in &def.edges {
        if !seen_nodes.contains(edge.source.as_str()) {
            errors.push(format!(
                "Edge \"{}\" references undefined source node \"{}\"",
                edge.id, edge.source
            ));
        }
        if !seen_nodes.contains(edge.target.as_str()) {
            errors.push(format!(
                "Edge \"{}\" references undefined target node \"{}\"",
                edge.id, edge.target
            ));
        }
    }

    // -- Fork / join arity --------------------------------------------------
    for node in &def.nodes {
        match node.node_type {
            NodeType::Fork => {
                let out = def.edges.iter().filter(|e| e.source == node.id).count();
                if out < 2 {
                    errors.push(format!(
                        "Fork node \"{}\" must have at least 2 outgoing edges, found {out}",
                        node.id
                    ));
                }
            }
            NodeType::Join => {
                let inn = def.edges.iter().filter(|e| e.target == node.id).count();
                if inn < 2 {
                    errors.push(format!(
                        "Join node \"{}\" must have at least 2 incoming edges, found {inn}",
                        node.id
                    ));
                }
            }
            _ => {}
        }
    }

    // Structural errors make the graph passes meaningless; stop here.
    if !errors.is_empty() {
        return ValidationReport::from_errors(errors);
    }

    // -- Cycle detection (Kahn) ---------------------------------------------
    let mut in_degree: HashMap<&str, usize> =
        def.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for edge in &def.edges {
        *in_degree.get_mut(edge.target.as_str()).unwrap() += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut peeled = 0usize;

    while let Some(id) = queue.pop_front() {
        peeled += 1;
        for edge in def.edges.iter().filter(|e| e.source == id) {
            let deg = in_degree.get_mut(edge.target.as_str()).unwrap();
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(edge.target.as_str());
            }
        }
    }

    if peeled != def.nodes.len() {
        errors.push("Workflow contains a cycle".to_string());
        return ValidationReport::from_errors(errors);
    }

    // -- Reachability from start (BFS) --------------------------------------
    let start = def
        .nodes
        .iter()
        .find(|n| n.node_type == NodeType::Start)
        .expect("start count checked above");

    let mut reached: HashSet<&str> = HashSet::new();
    let mut frontier: VecDeque<&str> = VecDeque::new();
    reached.insert(start.id.as_str());
    frontier.push_back(start.id.as_str());

    while let Some(id) = frontier.pop_front() {
        for edge in def.edges.iter().filter(|e| e.source == id) {
            if reached.insert(edge.target.as_str()) {
                frontier.push_back(edge.target.as_str());
            }
        }
    }

    for node in &def.nodes {
        if !reached.contains(node.id.as_str()) {
            errors.push(format!(
                "Node \"{}\" is not reachable from the start node",
                node.id
            ));
        }
    }

    ValidationReport::from_errors(errors)
}
