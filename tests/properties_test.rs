use proptest::prelude::*;
use serde_json::json;

use intellect::core::{AgentError, RoutingPolicy};
use intellect::memory::{ChunkingConfig, MemoryOptions, MemoryState};
use intellect::planner::{Intent, Plan, PlannerOptions, Step, TaskPlanner};
use intellect::tools::{StepArgs, ToolKind};

const VOCAB: [&str; 8] = [
    "alpha", "beta", "gamma", "delta", "omega", "river", "stone", "cloud",
];

fn calc_step(deps: &[usize]) -> Step {
    let mut args = StepArgs::new();
    args.insert("expression".into(), json!("1 + 1"));
    Step::new(Intent::Calculate, ToolKind::Calculator, args).depends_on(deps.iter().copied())
}

fn small_chunks() -> MemoryOptions {
    MemoryOptions {
        chunking: ChunkingConfig::new(40, 0),
        ..MemoryOptions::default()
    }
}

proptest! {
    // 依赖只能指向更早的步骤；否则在执行前就是规划错误
    #[test]
    fn test_plan_accepts_only_backward_dependencies(
        deps in prop::collection::vec(prop::collection::vec(0usize..8, 0..3), 1..8)
    ) {
        let steps: Vec<Step> = deps.iter().map(|d| calc_step(d)).collect();
        let valid = deps
            .iter()
            .enumerate()
            .all(|(i, d)| d.iter().all(|&k| k < i));

        match Plan::new(steps) {
            Ok(plan) => {
                prop_assert!(valid);
                for (i, step) in plan.steps().iter().enumerate() {
                    prop_assert!(step.depends_on.iter().all(|&k| k < i));
                }
            }
            Err(e) => {
                prop_assert!(!valid);
                prop_assert!(matches!(e, AgentError::Planning(_)));
            }
        }
    }

    #[test]
    fn test_retrieve_is_bounded_ordered_and_deterministic(
        words in prop::collection::vec(prop::sample::select(VOCAB.to_vec()), 1..80),
        query in prop::collection::vec(prop::sample::select(VOCAB.to_vec()), 1..4),
        k in 1usize..6,
    ) {
        let mut memory = MemoryState::new(small_chunks());
        let handle = memory.attach_document(&words.join(" ")).unwrap();
        let query = query.join(" ");

        let first = memory.retrieve(&query, handle, k).unwrap();
        let second = memory.retrieve(&query, handle, k).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(first.len() <= k);
        for pair in first.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                prop_assert!(pair[0].index < pair[1].index);
            }
        }
    }

    // 摘要 + 计算的复合请求：恰好一个摘要步骤、一个计算步骤，且不会落到通用推理工具
    #[test]
    fn test_compound_summarize_and_calculate(
        a in 0u32..1000,
        b in 1u32..1000,
        summary in prop::sample::select(vec![
            "Summarize the document",
            "Give me a summary of the document",
            "summarise this document",
        ]),
        calc in prop::sample::select(vec!["calculate {a} + {b}", "compute {a} * {b}"]),
        connector in prop::sample::select(vec![", then ", " and then ", ". ", " then "]),
        summary_first in any::<bool>(),
    ) {
        let mut memory = MemoryState::default();
        memory
            .attach_document("Quarterly revenue grew because of strong demand in Europe.")
            .unwrap();
        let calc = calc.replace("{a}", &a.to_string()).replace("{b}", &b.to_string());
        let query = if summary_first {
            format!("{summary}{connector}{calc}")
        } else {
            format!("{calc}{connector}{summary}")
        };

        let planner = TaskPlanner::new(RoutingPolicy::all_tools(), PlannerOptions::default());
        let plan = planner.plan(&query, &memory).unwrap();
        let tools = plan.tools();
        prop_assert_eq!(tools.iter().filter(|t| **t == ToolKind::Summarizer).count(), 1);
        prop_assert_eq!(tools.iter().filter(|t| **t == ToolKind::Calculator).count(), 1);
        prop_assert!(!tools.contains(&ToolKind::GeneralReasoner));
        for step in plan.steps() {
            if step.intent == Intent::Summarize {
                prop_assert_eq!(step.tool, ToolKind::Summarizer);
            }
        }
    }
}
