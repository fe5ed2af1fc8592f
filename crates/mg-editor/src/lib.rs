pub mod apply;
pub mod assistant;
pub mod collab;
pub mod config;
pub mod edits;
pub mod explain;
pub mod hit;
pub mod input;
pub mod ops;
pub mod stub;
pub mod viewport;

pub use apply::{ApplyError, ApplyReport, OpApplier, SkippedOp};
pub use assistant::{Assistant, Exchange, FAILURE_REPLY, ReplySource};
pub use collab::{AiRequest, AiResponse, CollabError, Collaborator, GraphView};
pub use config::EditorConfig;
pub use edits::{Edit, apply_edit};
pub use explain::{Note, attach_note, explain_prompt};
pub use hit::{Selection, hit_test, hit_test_edge, select_in_rect};
pub use input::{InputEvent, PointerButton};
pub use ops::{EdgeDraft, NodeDraft, Operation};
pub use stub::{CanvasStrategy, StubCollaborator, choose_strategy};
pub use viewport::{ViewState, ViewportConfig, ViewportEngine, ZoomAnchor};
