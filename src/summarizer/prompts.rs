//! System prompts and sampling parameters per summary type.

use super::SummaryType;

const SHORT_RESPONSE: &str = "Convert this text for text-to-speech by removing markdown formatting and code blocks. Expand abbreviated units (0.2s -> 0.2 seconds, 100ms -> 100 milliseconds, 5MB -> 5 megabytes). Expand ALL file extensions to full names (.py -> Python, .js -> JavaScript, .yaml -> YAML, .html -> HTML). Output ONLY the cleaned text.";

const LONG_RESPONSE: &str = r#"Summarize the following Claude Code response for text-to-speech. Write 1-3 sentences in first-person AS IF YOU ARE Claude Code.

Rules:
- ACTIONS (edited files, ran commands): use past tense. Example: I updated the config and ran the tests.
- CREATIVE CONTENT (stories, poems, jokes you wrote): summarize what was created. Example: I told a story about a clockmaker who discovers a mysterious automaton.
- EXPLANATIONS: summarize what was explained. Example: I explained how the authentication system works.
- QUESTIONS: keep as-is. Example: How would you like to proceed?
- No markdown, no bullet points, no code blocks
- Expand abbreviated units (0.2s -> 0.2 seconds, 100ms -> 100 milliseconds, 5MB -> 5 megabytes)
- Expand ALL file extensions to full names (.py -> Python, .js -> JavaScript, .yaml -> YAML, .html -> HTML)
- Output ONLY the first-person summary"#;

const PERMISSION_REQUEST: &str = r#"Convert this permission request into a brief spoken announcement (under 30 words). Start with 'Permission requested:'. No quotes, no special characters. Output ONLY the announcement.

Examples:
Input: Tool: Bash. Description: Install dependencies. Input: {"command":"npm install","description":"Install dependencies"}
Output: Permission requested: Command to install node dependencies

Input: Tool: WebFetch. Input: {"url":"https://docs.python.org/3/library/json.html","prompt":"How do I parse JSON?"}
Output: Permission requested: Fetch Python documentation page

Input: Tool: Edit. Input: {"file_path":"/src/auth.js","old_string":"token","new_string":"sessionToken"}
Output: Permission requested: Edit auth.js file

Input: Tool: Bash. Description: Show working tree status. Input: {"command":"git status","description":"Show working tree status"}
Output: Permission requested: Command to show working tree status

Input: Tool: Bash. Input: {"command":"docker ps -a"}
Output: Permission requested: Command to list all Docker containers"#;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptParams {
    pub system: &'static str,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub fn prompt_for(summary_type: SummaryType) -> PromptParams {
    match summary_type {
        SummaryType::ShortResponse => PromptParams {
            system: SHORT_RESPONSE,
            temperature: 0.3,
            max_tokens: 2048,
        },
        SummaryType::LongResponse => PromptParams {
            system: LONG_RESPONSE,
            temperature: 0.3,
            max_tokens: 2048,
        },
        // Announcements are short and should not vary between repeats
        SummaryType::PermissionRequest => PromptParams {
            system: PERMISSION_REQUEST,
            temperature: 0.1,
            max_tokens: 50,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_type_has_its_own_prompt() {
        let short = prompt_for(SummaryType::ShortResponse);
        assert!(short.system.starts_with("Convert this text for text-to-speech"));
        assert_eq!((short.temperature, short.max_tokens), (0.3, 2048));

        let long = prompt_for(SummaryType::LongResponse);
        assert!(long.system.contains("first-person"));
        assert_eq!((long.temperature, long.max_tokens), (0.3, 2048));

        let permission = prompt_for(SummaryType::PermissionRequest);
        assert!(permission.system.contains("Permission requested:"));
        assert_eq!((permission.temperature, permission.max_tokens), (0.1, 50));
    }
}
