use std::sync::Arc;

use coverly_agent::corpus::CorpusCatalog;
use coverly_agent::llm::{HttpCompletionClient, HttpEmbeddingClient};
use coverly_agent::orchestrator::{Orchestrator, PipelineOutcome, PipelineRun};
use coverly_core::config::{AppConfig, LoadOptions};
use coverly_core::users::{builtin_users, find_user};

use super::CommandResult;

pub fn run(question: &str, user_id: &str, clarify: Option<&str>, json_output: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("ask", "config", error.to_string(), 2),
    };

    let users = builtin_users();
    let Some(user) = find_user(&users, user_id).cloned() else {
        let known = users.iter().map(|u| u.id.as_str()).collect::<Vec<_>>().join(", ");
        return CommandResult::failure(
            "ask",
            "unknown_user",
            format!("unknown demo user `{user_id}` (known users: {known})"),
            2,
        );
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("ask", "runtime", error.to_string(), 1),
    };

    runtime.block_on(async move {
        let embedder = HttpEmbeddingClient::new(&config.embedding);
        let catalog =
            match CorpusCatalog::build(&config.policies.dir, vec![user.clone()], &embedder).await {
                Ok(catalog) => catalog,
                Err(error) => {
                    return CommandResult::failure("ask", "corpus", error.to_string(), 1)
                }
            };
        let Some((user, index)) = catalog.lookup(&user.id) else {
            return CommandResult::failure("ask", "corpus", "user index missing", 1);
        };

        let llm = Arc::new(HttpCompletionClient::new(&config.llm));
        let orchestrator =
            Orchestrator::new(llm, Arc::new(embedder), config.retrieval.top_k);

        let held = user.held_policy_types();
        let result = match clarify {
            Some(answer) => {
                orchestrator.run_with_clarification(question, answer, &held, index).await
            }
            None => orchestrator.run(question, &held, index).await,
        };

        match result {
            Ok(run) => {
                let output = if json_output {
                    serde_json::to_string_pretty(&run)
                        .unwrap_or_else(|error| format!("serialization failed: {error}"))
                } else {
                    render_human(&user.display_name, question, &run)
                };
                CommandResult { exit_code: 0, output }
            }
            Err(failure) => CommandResult::failure(
                "ask",
                "pipeline",
                format!("{} ({})", failure.error.user_message(), failure.error),
                1,
            ),
        }
    })
}

fn render_human(display_name: &str, question: &str, run: &PipelineRun) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Question ({display_name}): {question}"));
    lines.push(String::new());

    match &run.outcome {
        PipelineOutcome::Clarification(request) => {
            lines.push("Clarification needed:".to_string());
            lines.push(format!("  {}", request.prompt));
            lines.push(String::new());
            lines.push(
                "Re-run with --clarify \"<your answer>\" to get a verdict.".to_string(),
            );
        }
        PipelineOutcome::Verdict(verdict) => {
            lines.push(format!("Answer: {}", verdict.answer));
            lines.push(String::new());
            lines.push(verdict.explanation_text.clone());
            if !verdict.cited_sections.is_empty() {
                lines.push(String::new());
                lines.push("Cited sections:".to_string());
                for section in &verdict.cited_sections {
                    lines.push(format!("  - {section}"));
                }
            }
            lines.push(String::new());
            lines.push(verdict.disclaimer_text.clone());
        }
    }

    lines.push(String::new());
    lines.push("Stage trace:".to_string());
    for record in &run.trace {
        lines.push(format!("  {:<12} {}", record.stage.label(), record.summary));
    }

    lines.join("\n")
}
