//! 拓扑图导出：文件产物

use intellect::graph::{
    export, write_artifacts, GraphError, NodeKind, Topology, DIAGRAM_FILE, RASTER_FILE,
};
use intellect::tools::ToolKind;

#[test]
fn test_write_both_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let report = write_artifacts(&Topology::orchestrator(), dir.path().join("graphs"));

    let diagram = report.diagram.unwrap();
    let raster = report.raster.unwrap();
    assert_eq!(diagram.file_name().unwrap(), DIAGRAM_FILE);
    assert_eq!(raster.file_name().unwrap(), RASTER_FILE);

    let text = std::fs::read_to_string(&diagram).unwrap();
    for tool in ToolKind::ALL {
        assert!(text.contains(tool.name()), "diagram lacks {}", tool.name());
    }
    let bytes = std::fs::read(&raster).unwrap();
    assert!(bytes.starts_with(b"\x89PNG"));
}

#[test]
fn test_regeneration_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_artifacts(&Topology::orchestrator(), dir.path());
    let text_a = std::fs::read_to_string(first.diagram.unwrap()).unwrap();
    let second = write_artifacts(&Topology::orchestrator(), dir.path());
    let text_b = std::fs::read_to_string(second.diagram.unwrap()).unwrap();
    assert_eq!(text_a, text_b);
}

#[test]
fn test_raster_failure_still_writes_diagram() {
    let dir = tempfile::tempdir().unwrap();
    let empty = Topology {
        nodes: vec![],
        edges: vec![],
    };
    let report = write_artifacts(&empty, dir.path());
    assert!(report.diagram.is_ok());
    assert!(matches!(report.raster, Err(GraphError::Raster(_))));
    assert!(!dir.path().join(RASTER_FILE).exists());
}

#[test]
fn test_subset_topology() {
    let topology = Topology::with_tools(&[ToolKind::Calculator, ToolKind::Summarizer]);
    let tools: Vec<_> = topology
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Tool)
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(tools, vec!["calculator", "summarizer"]);

    let out = export(&topology);
    assert!(out.diagram_text.contains("router -->|calculate| calculator"));
    assert!(out.raster.is_ok());
}
