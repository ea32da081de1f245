//! 编排拓扑图导出（只读，与运行时状态无关）

pub mod export;
pub mod topology;

pub use export::{
    export, render_png, to_mermaid, write_artifacts, ArtifactReport, GraphError, GraphExport,
    DIAGRAM_FILE, RASTER_FILE,
};
pub use topology::{Edge, Node, NodeKind, Topology};
