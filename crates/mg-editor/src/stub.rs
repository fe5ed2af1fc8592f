//! Local deterministic collaborator.
//!
//! Used offline and as the fallback when the remote collaborator fails. It
//! recognises a small fixed set of topics by keyword, decides whether to
//! grow the active canvas or drill into a child canvas, and narrates what
//! it changed.

use crate::collab::{AiRequest, AiResponse, CollabError, Collaborator};
use crate::ops::{EdgeDraft, NodeDraft, Operation};
use mg_core::id::{CanvasId, NodeId};
use mg_core::store::AnchorTarget;

/// Graphs at least this large expand into child canvases.
pub const DENSE_NODE_COUNT: usize = 12;
/// A focus node with this many neighbours expands into a child canvas.
pub const DENSE_NEIGHBOR_COUNT: usize = 5;
/// Labels listed in the reply before "and more".
const REPLY_LABEL_LIMIT: usize = 6;

/// Where new content goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasStrategy {
    /// Grow the active canvas.
    Main,
    /// Drill into a child canvas of the focus node.
    Child(NodeId),
}

struct Topic {
    keywords: &'static [&'static str],
    /// Hub node used when nothing is selected.
    hub: (&'static str, &'static str),
    intro: &'static str,
    relation: &'static str,
    /// `(id suffix, label, summary)`
    parts: &'static [(&'static str, &'static str, &'static str)],
}

const TOPICS: &[Topic] = &[
    Topic {
        keywords: &["cpu", "processor"],
        hub: ("cpu", "CPU"),
        intro: "The CPU is the core of a computer: it fetches instructions from memory, \
                decodes them and executes them in the arithmetic logic unit, while the \
                control unit coordinates registers and caches.",
        relation: "contains",
        parts: &[
            ("core", "Core", "Executes instructions and drives control flow."),
            ("cache", "Cache", "Speeds up access to recently used data."),
            ("alu", "Arithmetic logic unit", "Performs arithmetic and logic operations."),
        ],
    },
    Topic {
        keywords: &["computer"],
        hub: ("computer", "Computer"),
        intro: "A computer processes information through hardware and software working \
                together: hardware provides compute and storage, software packages \
                algorithms and applications that drive the hardware.",
        relation: "contains",
        parts: &[
            ("mem", "Memory", "Holds data and instructions temporarily."),
            ("storage", "Storage", "Keeps data for the long term."),
            ("io-in", "Input devices", "Keyboard, mouse and the like."),
            ("io-out", "Output devices", "Display, printer and the like."),
        ],
    },
];

const CLEAR_KEYWORDS: &[&str] = &["clear the canvas", "start over"];

fn mentions(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|k| text.contains(k))
}

fn topic_of(message: &str) -> Option<&'static Topic> {
    TOPICS.iter().find(|t| mentions(message, t.keywords))
}

/// Pick where to put new content for `request`.
pub fn choose_strategy(request: &AiRequest) -> CanvasStrategy {
    let Some(focus) = request.focus() else {
        return CanvasStrategy::Main;
    };
    let graph = &request.graph;
    let dense = graph.nodes.len() >= DENSE_NODE_COUNT || graph.neighbors(focus).len() >= DENSE_NEIGHBOR_COUNT;
    let related = topic_of(&request.message).is_some_and(|topic| {
        graph
            .node(focus)
            .is_some_and(|n| mentions(&n.label, topic.keywords))
    });
    if dense || !related {
        CanvasStrategy::Child(focus)
    } else {
        CanvasStrategy::Main
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StubCollaborator;

impl StubCollaborator {
    fn plan(&self, request: &AiRequest) -> Vec<Operation> {
        let mut ops = Vec::new();

        if mentions(&request.message, CLEAR_KEYWORDS) {
            let nodes: Vec<_> = request.graph.nodes.iter().map(|n| n.id).collect();
            let edges: Vec<_> = request.graph.edges.iter().map(|e| e.id).collect();
            if !nodes.is_empty() {
                ops.push(Operation::DeleteNodes { ids: nodes });
            }
            if !edges.is_empty() {
                ops.push(Operation::DeleteEdges { ids: edges });
            }
            return ops;
        }

        let Some(topic) = topic_of(&request.message) else {
            return ops;
        };

        match choose_strategy(request) {
            CanvasStrategy::Child(focus) => {
                let canvas = CanvasId::intern(&format!("c-{focus}"));
                let label = request
                    .graph
                    .node(focus)
                    .map_or_else(|| focus.to_string(), |n| n.label.clone());
                ops.push(Operation::create_child_canvas(
                    AnchorTarget::Node(focus),
                    Some(canvas),
                    format!("{label} - detail"),
                ));

                let ids: Vec<String> = topic.parts.iter().map(|(s, _, _)| format!("{focus}-{s}")).collect();
                let nodes = topic
                    .parts
                    .iter()
                    .zip(&ids)
                    .enumerate()
                    .map(|(i, ((_, label, summary), id))| {
                        NodeDraft::new(id, *label)
                            .with_summary(*summary)
                            .at(300.0 + 220.0 * (i % 2) as f64, 200.0 + 120.0 * (i / 2) as f64)
                    })
                    .collect();
                ops.push(Operation::AddNodes {
                    nodes,
                    attach_to: None,
                    target_canvas: Some(canvas),
                });

                // The first part is the local hub of the child canvas.
                let hub = NodeId::intern(&ids[0]);
                let edges = ids[1..]
                    .iter()
                    .map(|id| {
                        EdgeDraft::new(&format!("e-{hub}-{id}"), hub, NodeId::intern(id)).named(topic.relation)
                    })
                    .collect();
                ops.push(Operation::AddEdges {
                    edges,
                    target_canvas: Some(canvas),
                });
            }
            CanvasStrategy::Main => {
                let root = match request.focus() {
                    Some(focus) => focus,
                    None => {
                        let (id, label) = topic.hub;
                        let hub = NodeId::intern(id);
                        if request.graph.node(hub).is_none() {
                            ops.push(Operation::AddNodes {
                                nodes: vec![NodeDraft::new(id, label)],
                                attach_to: None,
                                target_canvas: None,
                            });
                        }
                        hub
                    }
                };
                let ids: Vec<String> = topic.parts.iter().map(|(s, _, _)| format!("{root}-{s}")).collect();
                let nodes = topic
                    .parts
                    .iter()
                    .zip(&ids)
                    .map(|((_, label, summary), id)| NodeDraft::new(id, *label).with_summary(*summary))
                    .collect();
                ops.push(Operation::AddNodes {
                    nodes,
                    attach_to: Some(root),
                    target_canvas: None,
                });
                let edges = ids
                    .iter()
                    .map(|id| EdgeDraft::new(&format!("e-{id}"), root, NodeId::intern(id)).named(topic.relation))
                    .collect();
                ops.push(Operation::AddEdges {
                    edges,
                    target_canvas: None,
                });
            }
        }
        ops
    }
}

impl Collaborator for StubCollaborator {
    fn respond(&mut self, request: &AiRequest) -> Result<AiResponse, CollabError> {
        let ops = self.plan(request);
        let reply = reply_text(request, &ops);
        Ok(AiResponse { reply, ops })
    }
}

/// Explanatory reply: an introduction for the topic followed by a summary
/// of the changes `ops` make.
pub fn reply_text(request: &AiRequest, ops: &[Operation]) -> String {
    let message = request.message.trim();
    let focus = request
        .focus()
        .map(|id| request.graph.node(id).map_or_else(|| id.to_string(), |n| n.label.clone()));

    let mut intro = if mentions(message, CLEAR_KEYWORDS) {
        "Clearing the current canvas so we can start from a blank page.".to_string()
    } else if let Some(topic) = topic_of(message) {
        topic.intro.to_string()
    } else {
        format!("Understood: {message}. Here is a short explanation, with a few additions to the diagram where useful.")
    };
    if let Some(label) = focus {
        intro.push_str(&format!(" This time the focus is {label}."));
    }

    let mut added_nodes = Vec::new();
    let mut added_edges = 0;
    let mut deleted = 0;
    let mut child = false;
    for op in ops {
        match op {
            Operation::AddNodes { nodes, .. } => {
                added_nodes.extend(nodes.iter().filter_map(|n| n.display_label().map(str::to_string)));
            }
            Operation::AddEdges { edges, .. } => added_edges += edges.len(),
            Operation::DeleteNodes { ids } => deleted += ids.len(),
            Operation::CreateChildCanvas { .. } => child = true,
            _ => {}
        }
    }

    let mut changes = Vec::new();
    if deleted > 0 {
        changes.push(format!("cleared {deleted} old elements"));
    }
    if child {
        changes.push("opened a child canvas to focus on the details".to_string());
    }
    if !added_nodes.is_empty() {
        let mut listed = added_nodes
            .iter()
            .take(REPLY_LABEL_LIMIT)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if added_nodes.len() > REPLY_LABEL_LIMIT {
            listed.push_str(" and more");
        }
        changes.push(format!("added nodes: {listed}"));
    }
    if added_edges > 0 {
        changes.push(format!("added {added_edges} connections"));
    }

    let side = if changes.is_empty() {
        "The diagram needs no changes this time, so I will stick to the text.".to_string()
    } else {
        let place = if request.active_canvas_id.is_root() {
            "main canvas"
        } else {
            "child canvas"
        };
        format!("On the current {place} I also {} so you can keep exploring.", changes.join("; "))
    };
    format!("{intro}\n\n{side}")
}
