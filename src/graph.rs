use crate::expr::{ExprArena, ExprId};
use crate::ir::IrBody;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VertexId(pub u32);

/// A vertex of the logical dataflow graph.
///
/// `origin` is the service-call expression that created the vertex; synthetic
/// vertices have none and are left untouched by lowering. `lowered` maps each
/// composed sub-lambda (by node identity) to its instruction list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LVertex {
    pub origin: Option<ExprId>,
    pub lowered: BTreeMap<ExprId, IrBody>,
}

/// The logical graph handed over by the graph builder: the composition's
/// expression arena plus the vertex map. Vertices are kept in a `BTreeMap`
/// so the lowering pass walks them in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LGraph {
    pub exprs: ExprArena,
    pub vertices: BTreeMap<VertexId, LVertex>,
}

impl LGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, id: VertexId, origin: Option<ExprId>) -> &mut LVertex {
        self.vertices.entry(id).or_insert_with(|| LVertex {
            origin,
            lowered: BTreeMap::new(),
        })
    }

    pub fn vertex(&self, id: VertexId) -> Option<&LVertex> {
        self.vertices.get(&id)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut LVertex> {
        self.vertices.get_mut(&id)
    }
}
