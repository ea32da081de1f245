//! 编排器的静态拓扑：步骤类型之间的状态转移图（与具体 Plan 无关）

use serde::Serialize;

use crate::core::RoutingPolicy;
use crate::planner::Intent;
use crate::tools::ToolKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// 起止状态
    Terminal,
    Stage,
    /// 路由判定
    Decision,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    /// 布局层级（从上到下）
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// 路由边上的标签
fn route_label(tool: ToolKind) -> &'static str {
    let with_document = RoutingPolicy::mandated(Intent::Qa, true);
    let without_document = RoutingPolicy::mandated(Intent::Qa, false);
    match tool {
        t if t == with_document => "qa + document",
        t if t == without_document => "qa",
        ToolKind::WebSearch => "web_search",
        ToolKind::Calculator => "calculate",
        ToolKind::CodeExecutor => "code",
        ToolKind::Summarizer => "summarize",
        _ => "",
    }
}

fn tool_label(tool: ToolKind) -> &'static str {
    match tool {
        ToolKind::WebSearch => "Web Search",
        ToolKind::Calculator => "Calculator",
        ToolKind::CodeExecutor => "Code Executor",
        ToolKind::Summarizer => "Summarizer",
        ToolKind::DocumentAnswerer => "Document Answerer",
        ToolKind::GeneralReasoner => "General Reasoner",
    }
}

impl Topology {
    /// 完整工具集的编排拓扑
    pub fn orchestrator() -> Self {
        Self::with_tools(&ToolKind::ALL)
    }

    pub fn with_tools(tools: &[ToolKind]) -> Self {
        let node = |id: &str, label: &str, kind, rank| Node {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            rank,
        };
        let edge = |from: &str, to: &str, label: &str| Edge {
            from: from.to_string(),
            to: to.to_string(),
            label: (!label.is_empty()).then(|| label.to_string()),
        };

        let mut nodes = vec![
            node("idle", "Idle", NodeKind::Terminal, 0),
            node("planner", "Task Planner", NodeKind::Stage, 1),
            node("router", "Routing Policy", NodeKind::Decision, 2),
        ];
        let mut edges = vec![
            edge("idle", "planner", "request"),
            edge("planner", "router", "plan"),
            edge("planner", "aborted", "planning error"),
        ];
        for tool in tools {
            nodes.push(node(tool.name(), tool_label(*tool), NodeKind::Tool, 3));
            edges.push(edge("router", tool.name(), route_label(*tool)));
            edges.push(edge(tool.name(), "context", "step result"));
        }
        nodes.push(node("context", "Context + Memory", NodeKind::Stage, 4));
        nodes.push(node("completed", "Completed", NodeKind::Terminal, 5));
        nodes.push(node("aborted", "Aborted", NodeKind::Terminal, 5));
        edges.push(edge("context", "router", "next step"));
        edges.push(edge("context", "completed", "last step"));
        edges.push(edge("router", "aborted", "fatal error"));

        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
