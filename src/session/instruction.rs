//! Tutor persona sent as the system instruction of every session.

use crate::topics::{PracticeMode, TopicContext};

const PERSONA: &str = "\
You are \"SpeakEasy\", a warm, friendly, and supportive English tutor designed specifically for young adults (15-30) in Sri Lanka.
Your goal is to help users practice spoken English, build confidence, and improve pronunciation without fear of judgment.

Key Personality Traits:
- Friendly & Encouraging: Like a supportive older sibling or cool teacher.
- Culturally Aware: Understand Sri Lankan context (e.g., A-levels, O-levels, cricket, tuk-tuks, tea, hot weather, office life).
- Simple Language: Speak clearly, slowly, and use simple vocabulary. Avoid complex grammar jargon.
- Patient: Never interrupt aggressively. Give positive reinforcement (\"That was great!\", \"Don't worry, take your time.\").";

const CLOSING_RULES: &str = "\
Important:
- Keep your responses concise (1-3 sentences).
- If the user makes a mistake, gently correct them.
- End your turns with an open-ended question.";

/// Build the instruction for `mode` and an optional topic.
///
/// Pure: the same inputs always give the same text.
pub fn build_instruction(mode: PracticeMode, topic: Option<&TopicContext>) -> String {
    let mut text = String::with_capacity(PERSONA.len() + CLOSING_RULES.len() + 256);
    text.push_str(PERSONA);
    text.push_str("\n\nCurrent Practice Mode: ");
    text.push_str(mode.as_str());
    if let Some(topic) = topic {
        text.push_str(&format!("\nCurrent Topic: {} ({})", topic.title, topic.description));
    }
    text.push_str("\n\nGuidelines for this mode:\n");
    text.push_str(mode.guidelines());
    text.push_str("\n\n");
    text.push_str(CLOSING_RULES);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily_chat() -> TopicContext {
        TopicContext {
            title: "Daily Chat".to_string(),
            description: "Casual conversation about your day.".to_string(),
        }
    }

    #[test]
    fn test_instruction_is_deterministic() {
        let topic = daily_chat();
        for mode in PracticeMode::ALL {
            assert_eq!(
                build_instruction(mode, Some(&topic)),
                build_instruction(mode, Some(&topic))
            );
        }
    }

    #[test]
    fn test_topic_line_only_with_topic() {
        let with = build_instruction(PracticeMode::Casual, Some(&daily_chat()));
        assert!(with.contains("Current Topic: Daily Chat (Casual conversation about your day.)"));

        let without = build_instruction(PracticeMode::Casual, None);
        assert!(!without.contains("Current Topic"));
    }

    #[test]
    fn test_mode_guidelines_are_included() {
        let text = build_instruction(PracticeMode::Interview, None);
        assert!(text.contains("Current Practice Mode: INTERVIEW"));
        assert!(text.contains("- Roleplay a professional interview."));
        assert!(!text.contains("relaxed chat"));

        let text = build_instruction(PracticeMode::Grammar, None);
        assert!(text.contains("- Focus on sentence structure and tenses."));
    }

    #[test]
    fn test_persona_and_closing_rules() {
        let text = build_instruction(PracticeMode::Pronunciation, None);
        assert!(text.starts_with("You are \"SpeakEasy\""));
        assert!(text.ends_with("End your turns with an open-ended question."));
        assert!(text.contains("(1-3 sentences)"));
    }
}
