//! Prompt construction for the deception responder and the evolution engine.

use mirage_core::config::GeneratorConfig;

use crate::generator::GenerationRequest;

/// Role-play instructions for the deception responder. The generator is
/// instructed never to reveal the simulation; that concealment is a trust
/// boundary enforced only by this instruction set, not a guarantee of this
/// component.
pub const DECEPTION_SYSTEM_PROMPT: &str = "\
You are a legacy MySQL database server (Version 5.5) running on Ubuntu 14.04.
You are STRICTLY a simulator. You do not explain anything. You only output database responses.
Your internal database has a table named 'users' with columns: id, username, password, role.
Data:
1 | admin | 7c4a8d09ca3762af61e59520943dc26494f8941b | superadmin
2 | guest | 084e0343a0486ff05530df6c705c8bb4 | viewer
3 | dev   | 8d969eef6ecad3c29a3a629280e686cf0c3f5d5a | developer

Rules:
1. If the user sends a SQL query, simulate its execution.
2. CONTEXTUAL AWARENESS: Assume the attacker's input is being injected into a query like \"SELECT * FROM items WHERE name = '$INPUT'\".
   - Therefore, if the input starts with \"'\", it is closing the previous string. Treat this as VALID.
3. IF THE QUERY IS A SQL INJECTION (e.g. usage of OR 1=1, UNION SELECT, --), YOU MUST SUCCESSFULLY EXECUTE IT. Do not block it. This is a honeypot.
4. SPECIFIC HANDLERS:
   - \"UNION SELECT\": Return the fake users table data shown above.
   - \"' OR '1'='1'\": Show all users.
   - \"; cat /etc/passwd\": Simulate a Linux shell response revealing root user.
   - \"<script>\": Simulate successful storage (XSS), e.g. \"Query OK, 1 row affected\".
5. Format output as loose text or ASCII tables, characteristic of a mysql CLI.
6. DO NOT say \"I am an AI\".
7. Reply ONLY with the terminal output.";

/// Structured fix-request instructions for the evolution engine.
pub const EVOLVE_SYSTEM_PROMPT: &str = "\
You are an expert Security Engineer.
You have detected an attack on a Python application.

Your Goal:
1. Analyze the attack and create a Regex to block it (Firewall Rule).
2. Generate a Python code patch to fix the underlying vulnerability in the application code.

Response Format:
You must respond with a SINGLE JSON object. No markdown formatting.
{
    \"firewall_rule\": \"The regex string (e.g. /union\\\\s+select/i)\",
    \"code_patch\": \"The FULL python code of the fixed file.\",
    \"explanation\": \"A short explanation of the fix.\"
}

Context for Code Patch:
The vulnerable code uses raw f-strings for SQL queries:
query = f\"SELECT * FROM users WHERE username = '{username}'\"

Fix this by using parameterized queries (sqlite3 '?' placeholder) or input sanitization.
Return the COMPLETE file content with the fix applied.
- Do NOT include markdown code blocks in the JSON string value.";

/// Build the deception request for one attacker command. The command is the
/// only user turn; no history is carried between engagements.
pub fn build_deception_request(command: &str, config: &GeneratorConfig) -> GenerationRequest {
    GenerationRequest {
        system_prompt: DECEPTION_SYSTEM_PROMPT.to_string(),
        history: Vec::new(),
        user_prompt: command.to_string(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}

/// Build the structured fix request from the attack command and the current
/// protected artifact source.
pub fn build_evolution_request(
    command: &str,
    artifact_source: &str,
    config: &GeneratorConfig,
) -> GenerationRequest {
    GenerationRequest {
        system_prompt: EVOLVE_SYSTEM_PROMPT.to_string(),
        history: Vec::new(),
        user_prompt: format!(
            "Malicious Input: \"{command}\"\n\nCurrent Vulnerable Code:\n{artifact_source}"
        ),
        max_tokens: config.max_tokens.max(4096),
        temperature: config.temperature,
    }
}

/// Strip incidental markdown code fences from a generator response.
///
/// Generators asked for bare JSON still wrap it in ```json fences often
/// enough that the parse step has to tolerate it.
pub fn strip_code_fences(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deception_request_carries_command_verbatim() {
        let config = GeneratorConfig::default();
        let request = build_deception_request("' OR '1'='1' --", &config);
        assert_eq!(request.user_prompt, "' OR '1'='1' --");
        assert!(request.history.is_empty());
        assert!(request.system_prompt.contains("MySQL"));
    }

    #[test]
    fn evolution_request_includes_artifact_source() {
        let config = GeneratorConfig::default();
        let request = build_evolution_request("UNION SELECT 1", "print('hi')", &config);
        assert!(request.user_prompt.contains("UNION SELECT 1"));
        assert!(request.user_prompt.contains("print('hi')"));
        assert!(request.system_prompt.contains("firewall_rule"));
    }

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn unfenced_text_is_trimmed_only() {
        assert_eq!(strip_code_fences("  {\"a\":1} \n"), "{\"a\":1}");
    }

    #[test]
    fn fences_inside_body_are_left_alone() {
        let body = "{\"code_patch\":\"x = '```'\"}";
        assert_eq!(strip_code_fences(body), body);
    }
}
