//! Prompt assembly for the language-model planner

use chrono::Local;
use hivemind_provider::Message;
use serde_json::json;

use crate::planner::PlanRequest;

/// Builds the system and user messages for one planning request
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build_messages(request: &PlanRequest) -> Vec<Message> {
        vec![
            Message::system(Self::system_prompt()),
            Message::user(Self::user_prompt(request)),
        ]
    }

    pub fn system_prompt() -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        format!(
            r#"# hivemind planner

You turn a mission goal into an ordered list of steps. Each step calls exactly
one action on one capability provider listed under CAPABILITIES. Steps run one
at a time, in order; later steps may rely on earlier ones having succeeded.

## Current Time
{now}

## Output
Reply with JSON only:
{{"steps": [{{"provider": "<name>", "action": "<action>", "params": {{...}}, "rationale": "<why>"}}]}}

Use only provider/action pairs that are listed, and always supply required
parameters. If the goal cannot be reached with these capabilities, reply
{{"cannot_plan": "<reason>"}}.

When replanning, plan only the work that is still left. Completed steps are
kept; do not repeat them. An empty list means nothing is left to do."#
        )
    }

    pub fn user_prompt(request: &PlanRequest) -> String {
        let mut parts = vec![format!("# GOAL\n\n{}", request.goal)];

        let capabilities = serde_json::to_string_pretty(&request.capabilities)
            .unwrap_or_else(|_| "[]".to_string());
        parts.push(format!("# CAPABILITIES\n\n{}", capabilities));

        if !request.history.is_empty() {
            let lines: Vec<String> = request
                .history
                .iter()
                .map(|s| {
                    let outcome = s.outcome_preview(120).unwrap_or_default();
                    format!(
                        "- [{}] {} ({}/{} steps ok) {}",
                        s.status, s.goal, s.steps_succeeded, s.steps_total, outcome
                    )
                    .trim_end()
                    .to_string()
                })
                .collect();
            parts.push(format!("# RECENT MISSIONS\n\n{}", lines.join("\n")));
        }

        if let Some(failure) = &request.failure {
            let detail = json!({
                "step": failure.step,
                "provider": failure.provider,
                "action": failure.action,
                "params": failure.params,
                "observation": failure.observation,
                "details": failure.details,
                "attempts": failure.attempts,
            });
            let mut section = format!(
                "# FAILED STEP\n\n{}",
                serde_json::to_string_pretty(&detail).unwrap_or_default()
            );
            if !failure.completed.is_empty() {
                section.push_str(&format!("\n\nCompleted:\n{}", failure.completed.join("\n")));
            }
            if !failure.remaining.is_empty() {
                section.push_str(&format!(
                    "\n\nStill pending (will be replaced by your plan):\n{}",
                    failure.remaining.join("\n")
                ));
            }
            parts.push(section);
        }

        if !request.guidance.is_empty() {
            let lines: Vec<String> = request.guidance.iter().map(|g| format!("- {g}")).collect();
            parts.push(format!("# OPERATOR GUIDANCE\n\n{}", lines.join("\n")));
        }

        if let Some(rejection) = &request.rejection {
            parts.push(format!(
                "# PREVIOUS ANSWER REFUSED\n\n{}\nFix this and answer again.",
                rejection
            ));
        }

        parts.join("\n\n---\n\n")
    }
}
