/// 构建安全分析提示词，代码原样嵌入
pub fn build_analysis_prompt(code: &str) -> String {
    format!(
        r#"You are a security code analyzer. Analyze the following code for security vulnerabilities and provide a comprehensive security assessment.

Code to analyze:
```
{code}
```

Respond with exactly one JSON object in the following format:
{{
    "vulnerabilities": [
        {{
            "line": <line_number>,
            "severity": "High|Medium|Low",
            "type": "<vulnerability_type>",
            "description": "<detailed_description>"
        }}
    ],
    "fixes": [
        {{
            "line": <line_number>,
            "original": "<original_code>",
            "fixed": "<fixed_code>",
            "explanation": "<explanation_of_fix>"
        }}
    ],
    "risk_score": "High|Medium|Low",
    "explanation": "<comprehensive_explanation_of_overall_security_assessment>"
}}

Important guidelines:
1. Identify all security vulnerabilities (SQL injection, XSS, authentication issues, insecure dependencies, etc.)
2. Provide specific 1-based line numbers for each vulnerability
3. For each vulnerability, provide a fix with the original and fixed code
4. Assign appropriate severity levels (High, Medium, Low)
5. Calculate the overall risk_score based on the severity and number of vulnerabilities
6. Provide a detailed explanation of the security assessment
7. If no vulnerabilities are found, return empty arrays and set risk_score to "Low"
8. Ensure the response is valid JSON

Return ONLY the JSON object, no additional text or markdown formatting."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_code_verbatim() {
        let code = "def login(u, p):\n    q = \"SELECT * FROM users WHERE name='%s'\" % u\n    return db.execute(q)";
        let prompt = build_analysis_prompt(code);
        assert!(prompt.contains(code));
    }

    #[test]
    fn prompt_names_every_required_key() {
        let prompt = build_analysis_prompt("x = 1");
        for key in [
            "\"vulnerabilities\"",
            "\"fixes\"",
            "\"risk_score\"",
            "\"explanation\"",
            "\"line\"",
            "\"severity\"",
            "\"type\"",
            "\"description\"",
            "\"original\"",
            "\"fixed\"",
        ] {
            assert!(prompt.contains(key), "missing {}", key);
        }
    }

    #[test]
    fn prompt_keeps_braces_in_code() {
        let prompt = build_analysis_prompt("fn main() { println!(\"{}\", 1); }");
        assert!(prompt.contains("fn main() { println!(\"{}\", 1); }"));
    }
}
