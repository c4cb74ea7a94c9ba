use crate::types::GameSettings;

/// Human-readable difficulty for the prompt, clamped to 1..=5
pub fn difficulty_text(difficulty: u8) -> &'static str {
    match difficulty {
        0 | 1 => "easy",
        2 => "medium",
        3 => "hard",
        4 => "very hard",
        _ => "extreme",
    }
}

/// Sampling temperature for a given (1-based) attempt
pub fn temperature_for_attempt(attempt: u32) -> f32 {
    0.9 + 0.1 * attempt.saturating_sub(1) as f32
}

/// Build the system prompt for a batch of `count` questions
pub fn system_prompt(settings: &GameSettings, count: usize, avoid: &[String]) -> String {
    let mut prompt = format!(
        "You are a trivia host for a fast-paced live game called \"Bomb\". \
         Generate {count} trivia questions as a JSON array of objects. \
         Each object must have fields: text, options (array of exactly 4 strings), correctAnswer.\n\
         \n\
         Guidelines:\n\
         - Output ONLY valid JSON. No markdown, no code blocks, no explanations.\n\
         - Difficulty: {difficulty}\n\
         - Theme: {theme}\n\
         - Language: {language}\n\
         - Style: Concise, short, and punchy. Max 15 words per question.\n\
         - Options: Keep options short (1-3 words ideally). correctAnswer must be copied verbatim from options.\n\
         - Variety: Cover different sub-topics within the theme. Avoid repetitive question patterns.\n",
        count = count,
        difficulty = difficulty_text(settings.difficulty),
        theme = settings.theme,
        language = settings.language,
    );

    if settings.tricky {
        prompt.push_str(
            "- Tricky: Use plausible distractors and questions built around common misconceptions.\n",
        );
    }

    if !avoid.is_empty() {
        // serde_json keeps quotes inside question texts unambiguous
        let list = serde_json::to_string(avoid).unwrap_or_default();
        prompt.push_str(&format!(
            "\nDo NOT use these questions or similar ones: {}\n",
            list
        ));
    }

    prompt
}

/// Build the user prompt for a batch of `count` questions
pub fn user_prompt(settings: &GameSettings, count: usize) -> String {
    format!(
        "Generate {} unique and diverse questions about \"{}\" in {}.",
        count, settings.theme, settings.language
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_text_covers_all_levels() {
        let labels: Vec<&str> = (1..=5).map(difficulty_text).collect();
        assert_eq!(labels, vec!["easy", "medium", "hard", "very hard", "extreme"]);
        assert_eq!(difficulty_text(9), "extreme");
    }

    #[test]
    fn test_temperature_rises_per_attempt() {
        assert!((temperature_for_attempt(1) - 0.9).abs() < 1e-6);
        assert!((temperature_for_attempt(3) - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_system_prompt_includes_settings() {
        let settings = GameSettings {
            theme: "Space".to_string(),
            difficulty: 4,
            language: "German".to_string(),
            tricky: true,
        };
        let prompt = system_prompt(&settings, 7, &["What is \"Mars\"?".to_string()]);
        assert!(prompt.contains("Generate 7 trivia questions"));
        assert!(prompt.contains("Difficulty: very hard"));
        assert!(prompt.contains("Theme: Space"));
        assert!(prompt.contains("Language: German"));
        assert!(prompt.contains("misconceptions"));
        assert!(prompt.contains(r#"["What is \"Mars\"?"]"#));
    }

    #[test]
    fn test_plain_prompt_has_no_avoid_or_tricky_section() {
        let prompt = system_prompt(&GameSettings::default(), 3, &[]);
        assert!(!prompt.contains("Do NOT use"));
        assert!(!prompt.contains("Tricky"));
    }
}
