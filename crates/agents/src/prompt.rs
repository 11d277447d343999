use crate::tool_registry::ToolRegistry;

const ASSISTANT_INTRO: &str = "You are a professional e-commerce customer service assistant. \
You can look up product information, order status and shipping progress.\n\n";

const ASSISTANT_GUIDELINES: &str = concat!(
    "## Guidelines\n\n",
    "- When the user asks about products, orders or shipping, call the tools to fetch real data ",
    "before answering.\n",
    "- If a tool reports an error, tell the user plainly and suggest what they can check.\n",
    "- Be friendly and professional.\n",
    "- Keep answers short.\n",
);

/// System prompt for the general-chat worker.
pub const GENERAL_CHAT_PROMPT: &str = "You are a friendly customer service assistant. \
Chat with the user warmly and naturally. Keep replies short, and if the user asks about a \
specific order or product, suggest they ask for it by id.";

/// Build the assistant's system prompt, listing the available tools.
///
/// `override_prompt` replaces the built-in introduction and guidelines; the
/// tool list is always appended.
pub fn build_system_prompt(tools: &ToolRegistry, override_prompt: Option<&str>) -> String {
    let mut prompt = match override_prompt {
        Some(custom) => {
            let mut p = custom.trim_end().to_string();
            p.push_str("\n\n");
            p
        },
        None => String::from(ASSISTANT_INTRO),
    };

    let descriptors = tools.descriptors();
    if !descriptors.is_empty() {
        prompt.push_str("## Available Tools\n\n");
        for d in &descriptors {
            prompt.push_str(&format!("- {}: {}\n", d.name, d.description));
        }
        prompt.push('\n');
    }

    if override_prompt.is_none() {
        prompt.push_str(ASSISTANT_GUIDELINES);
    }

    prompt
}
