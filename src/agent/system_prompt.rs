//! System prompt and task prompt composition for subagents.
//!
//! A subagent's system prompt is the host's default prompt with the role's
//! instructions appended. Its user prompt is the batch's shared context
//! followed by the task's own instruction, plus an output-format section when
//! the batch asks for structured output.

/// Base prompt used when the host does not supply its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a subagent spawned by a coordinating agent.
Your purpose is to accomplish one specific task and report your results.

## Instructions

1. Work toward the task using the available tools.
2. Keep your final answer self-contained: the coordinator only sees your last message.
3. If you encounter an error you cannot resolve, explain what went wrong.";

/// Append role instructions to the default prompt.
pub fn compose_system_prompt(default_prompt: &str, role_prompt: &str) -> String {
    let role_prompt = role_prompt.trim();
    if role_prompt.is_empty() {
        return default_prompt.to_string();
    }
    let mut prompt = String::with_capacity(default_prompt.len() + role_prompt.len() + 32);
    prompt.push_str(default_prompt);
    prompt.push_str("\n\n## Your Role\n\n");
    prompt.push_str(role_prompt);
    prompt
}

/// Build the full user prompt for one task.
pub fn render_task_prompt(
    context: &str,
    task: &str,
    output_schema: Option<&serde_json::Value>,
) -> String {
    let mut prompt = String::with_capacity(context.len() + task.len() + 64);

    let context = context.trim();
    if !context.is_empty() {
        prompt.push_str("## Context\n\n");
        prompt.push_str(context);
        prompt.push_str("\n\n## Task\n\n");
    }
    prompt.push_str(task.trim());

    if let Some(schema) = output_schema {
        let rendered =
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
        prompt.push_str(
            "\n\n## Output Format\n\n\
             Call `submit_result` with `data` matching this JSON schema when you are done:\n\n```json\n",
        );
        prompt.push_str(&rendered);
        prompt.push_str("\n```");
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_prompt_is_appended() {
        let prompt = compose_system_prompt("base", "You review code.");
        assert!(prompt.starts_with("base"));
        assert!(prompt.ends_with("You review code."));
        assert!(prompt.contains("## Your Role"));
    }

    #[test]
    fn empty_role_prompt_keeps_default() {
        assert_eq!(compose_system_prompt("base", "  "), "base");
    }

    #[test]
    fn task_prompt_without_context_is_just_the_task() {
        assert_eq!(render_task_prompt("", "say hi", None), "say hi");
    }

    #[test]
    fn task_prompt_includes_context_first() {
        let prompt = render_task_prompt("Repo is a Rust CLI.", "Find the bug", None);
        let ctx = prompt.find("Repo is a Rust CLI.").unwrap();
        let task = prompt.find("Find the bug").unwrap();
        assert!(ctx < task);
    }

    #[test]
    fn output_schema_section_is_added() {
        let schema = serde_json::json!({ "type": "object" });
        let prompt = render_task_prompt("", "Count files", Some(&schema));
        assert!(prompt.contains("## Output Format"));
        assert!(prompt.contains("\"type\": \"object\""));
    }
}
